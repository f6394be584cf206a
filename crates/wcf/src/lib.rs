//! HTTP client for the upstream WCF relay: login state and the bridge's own
//! account identity.
//!
//! All probes are lenient; a transport fault reads as "not logged in" /
//! "no identity" and is left to the caller to treat as fatal or not.

use std::time::Duration;

use {serde::Deserialize, tracing::warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct LoginState {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    wxid: Option<String>,
}

/// Client for the relay's local HTTP API.
pub struct SourceClient {
    http: reqwest::Client,
    base_url: String,
}

impl SourceClient {
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Whether the relay has an authenticated account session.
    pub async fn is_logged_in(&self) -> bool {
        let url = format!("{}/islogin", self.base_url);
        match self.get_json::<LoginState>(&url).await {
            Some(state) => state.success,
            None => false,
        }
    }

    /// The relay account's own string identity, if it can be fetched.
    pub async fn self_identity(&self) -> Option<String> {
        let url = format!("{}/userinfo", self.base_url);
        self.get_json::<UserInfo>(&url)
            .await?
            .wxid
            .filter(|wxid| !wxid.is_empty())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Option<T> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "source relay request failed");
                return None;
            },
        };
        match response.json().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(url, error = %e, "source relay returned an undecodable body");
                None
            },
        }
    }
}
