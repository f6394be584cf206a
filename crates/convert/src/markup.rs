//! Tolerant extraction of metadata from the relay's embedded XML markup.
//!
//! The markup is semi-structured at best; these parsers pull out the tags
//! they know and default everything else, they never fail.

use std::sync::LazyLock;

use regex::Regex;

// Fixed patterns; compilation cannot fail at runtime.
#[allow(clippy::unwrap_used)]
static AT_USER_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<atuserlist>(.*?)</atuserlist>").unwrap());

#[allow(clippy::unwrap_used)]
static LINK_TITLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<title>(.*?)</title>").unwrap());

#[allow(clippy::unwrap_used)]
static LINK_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<des>(.*?)</des>").unwrap());

#[allow(clippy::unwrap_used)]
static LINK_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<url>(.*?)</url>").unwrap());

/// Metadata of an app/link card. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkInfo {
    pub title: String,
    pub description: String,
    pub url: String,
}

/// Mentioned identities from an `<atuserlist>` tag, in original order.
///
/// Empty entries are filtered out; duplicates are preserved. A missing or
/// malformed tag yields an empty list.
pub fn extract_mentions(markup: &str) -> Vec<String> {
    let Some(captures) = AT_USER_LIST.captures(markup) else {
        return Vec::new();
    };
    let Some(list) = captures.get(1) else {
        return Vec::new();
    };
    list.as_str()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Title, description, and URL of an app/link card.
pub fn extract_link_info(markup: &str) -> LinkInfo {
    LinkInfo {
        title: first_capture(&LINK_TITLE, markup),
        description: first_capture(&LINK_DESCRIPTION, markup),
        url: first_capture(&LINK_URL, markup),
    }
}

fn first_capture(pattern: &Regex, markup: &str) -> String {
    pattern
        .captures(markup)
        .and_then(|captures| captures.get(1))
        .map(|group| group.as_str().to_string())
        .unwrap_or_default()
}
