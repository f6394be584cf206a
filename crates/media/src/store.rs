use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use {reqwest::header::HeaderMap, tracing::debug, url::Url};

use crate::error::{FetchError, Result};

/// How long a cached attachment stays valid.
pub const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Bound on a single download request.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Stored base name when neither the caller, the response headers, nor the
/// URL yield one.
const FALLBACK_BASE: &str = "attachment";

/// Flat directory of downloaded attachments, named
/// `<base>_<timestamp-ms>.<ext>`.
///
/// Validity is recomputed from file mtime on every lookup; there is no
/// in-memory index to drift from the filesystem. Construction does not start
/// the expiry sweep; see [`crate::cleanup::CleanupTask`].
pub struct MediaCache {
    dir: PathBuf,
    client: reqwest::Client,
    retention: Duration,
}

impl MediaCache {
    /// Open (creating if needed) a cache directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            dir,
            client,
            retention: RETENTION,
        })
    }

    /// Override the retention window (used by tests).
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Materialize `url` as a local file and return its path.
    ///
    /// A non-expired file already stored under the resolved name is returned
    /// without a network call. Otherwise the URL is fetched with a bounded
    /// timeout and the body persisted under a timestamp-uniquified name.
    pub async fn fetch(&self, url: &str, suggested_name: Option<&str>) -> Result<PathBuf> {
        // Cache check with the names derivable before any I/O.
        let precheck = non_empty(suggested_name).or_else(|| url_base(url));
        if let Some(base) = &precheck {
            if let Some(hit) = self.lookup(base)? {
                debug!(url, path = %hit.display(), "media cache hit");
                return Ok(hit);
            }
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status(),
            });
        }

        let base = resolve_base(url, suggested_name, response.headers());
        // A name that only materialized from the response headers may still
        // have a cached download from an earlier call.
        if precheck.as_deref() != Some(base.as_str()) {
            if let Some(hit) = self.lookup(&base)? {
                debug!(url, path = %hit.display(), "media cache hit on resolved name");
                return Ok(hit);
            }
        }

        let body = response.bytes().await?;
        let path = self
            .dir
            .join(unique_name(&base, chrono::Utc::now().timestamp_millis()));
        tokio::fs::write(&path, &body).await?;
        debug!(url, path = %path.display(), size = body.len(), "media downloaded");
        Ok(path)
    }

    /// Scan the directory for a non-expired file stored under `base`.
    fn lookup(&self, base: &str) -> Result<Option<PathBuf>> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if matches_base(name, base) && !is_expired(&entry.path(), self.retention) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}

/// Whether the file at `path` has outlived `retention`, judged by mtime.
///
/// A vanished file counts as expired; an unreadable mtime does not.
pub(crate) fn is_expired(path: &Path, retention: Duration) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > retention,
        // mtime in the future: clock skew, keep the file
        Err(_) => false,
    }
}

/// Stored-name resolution: suggested name, then Content-Disposition, then
/// the URL's trailing path segment, then a fixed fallback.
fn resolve_base(url: &str, suggested_name: Option<&str>, headers: &HeaderMap) -> String {
    non_empty(suggested_name)
        .or_else(|| disposition_base(headers))
        .or_else(|| url_base(url))
        .unwrap_or_else(|| FALLBACK_BASE.to_string())
}

fn non_empty(name: Option<&str>) -> Option<String> {
    name.filter(|n| !n.is_empty()).map(str::to_string)
}

/// Trailing non-empty path segment of the URL, query and fragment excluded.
fn url_base(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}

/// Filename carried in a `Content-Disposition` header, if any.
fn disposition_base(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(reqwest::header::CONTENT_DISPOSITION)?
        .to_str()
        .ok()?;
    let (_, value) = raw.split_once("filename=")?;
    let value = value.split(';').next()?;
    let name = value.trim().trim_matches('"').trim();
    non_empty(Some(name))
}

/// `photo.jpg` + `1700000000000` → `photo_1700000000000.jpg`.
fn unique_name(base: &str, timestamp_ms: i64) -> String {
    match split_base(base) {
        (stem, Some(ext)) => format!("{stem}_{timestamp_ms}.{ext}"),
        (stem, None) => format!("{stem}_{timestamp_ms}"),
    }
}

fn split_base(base: &str) -> (&str, Option<&str>) {
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    }
}

/// Whether a stored file name decomposes as `<base-stem>_<digits>[.<base-ext>]`.
fn matches_base(file_name: &str, base: &str) -> bool {
    let (stem, ext) = split_base(base);
    let candidate = match ext {
        Some(ext) => match file_name.strip_suffix(&format!(".{ext}")) {
            Some(rest) => rest,
            None => return false,
        },
        None => file_name,
    };
    match candidate.strip_prefix(&format!("{stem}_")) {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
