use {
    serde::{Deserialize, Serialize},
    tracing::warn,
};

/// Upstream relay (source protocol) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8080,
        }
    }
}

impl SourceConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Downstream OneBot (target protocol) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token sent on the forwarding connection, if the target
    /// requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8081,
            access_token: None,
        }
    }
}

impl TargetConfig {
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Address the bridge's own receiver endpoint binds to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8022,
        }
    }
}

/// Media cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "storage".into(),
        }
    }
}

/// Full bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub listen: ListenConfig,
    pub storage: StorageConfig,
}

impl BridgeConfig {
    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through an arbitrary lookup, letting tests
    /// inject variables without mutating process state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("WCF_HOST") {
            config.source.host = host;
        }
        if let Some(port) = parse_port(&lookup, "WCF_PORT") {
            config.source.port = port;
        }
        if let Some(host) = lookup("ONEBOT_HOST") {
            config.target.host = host;
        }
        if let Some(port) = parse_port(&lookup, "ONEBOT_PORT") {
            config.target.port = port;
        }
        if let Some(token) = lookup("ONEBOT_ACCESS_TOKEN") {
            if !token.is_empty() {
                config.target.access_token = Some(token);
            }
        }
        if let Some(host) = lookup("HOST") {
            config.listen.host = host;
        }
        if let Some(port) = parse_port(&lookup, "PORT") {
            config.listen.port = port;
        }
        if let Some(path) = lookup("STORAGE_PATH") {
            config.storage.path = path;
        }

        config
    }
}

/// Parse a numeric variable; a malformed value is logged and ignored.
fn parse_port(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u16> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(port) => Some(port),
        Err(_) => {
            warn!(key, value = raw, "ignoring unparseable port override");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn defaults_match_documented_schema() {
        let config = BridgeConfig::default();
        assert_eq!(config.source.base_url(), "http://localhost:8080");
        assert_eq!(config.target.ws_url(), "ws://localhost:8081");
        assert_eq!(config.target.access_token, None);
        assert_eq!(config.listen.host, "127.0.0.1");
        assert_eq!(config.listen.port, 8022);
        assert_eq!(config.storage.path, "storage");
    }

    #[test]
    fn env_overrides_apply() {
        let config = BridgeConfig::from_lookup(lookup_from(&[
            ("WCF_HOST", "10.0.0.5"),
            ("WCF_PORT", "9090"),
            ("ONEBOT_PORT", "7700"),
            ("ONEBOT_ACCESS_TOKEN", "s3cret"),
            ("STORAGE_PATH", "/var/cache/onebridge"),
        ]));

        assert_eq!(config.source.base_url(), "http://10.0.0.5:9090");
        assert_eq!(config.target.ws_url(), "ws://localhost:7700");
        assert_eq!(config.target.access_token.as_deref(), Some("s3cret"));
        assert_eq!(config.storage.path, "/var/cache/onebridge");
        // Untouched sections keep their defaults.
        assert_eq!(config.listen.port, 8022);
    }

    #[test]
    fn malformed_port_falls_back_to_default() {
        let config = BridgeConfig::from_lookup(lookup_from(&[("WCF_PORT", "not-a-port")]));
        assert_eq!(config.source.port, 8080);
    }

    #[test]
    fn empty_token_stays_unset() {
        let config = BridgeConfig::from_lookup(lookup_from(&[("ONEBOT_ACCESS_TOKEN", "")]));
        assert_eq!(config.target.access_token, None);
    }
}
