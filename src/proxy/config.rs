use serde::{Deserialize, Serialize};

/// Gateway service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether to accept connections from the local network
    /// - false: only 127.0.0.1 (default)
    /// - true: 0.0.0.0
    #[serde(default)]
    pub allow_lan_access: bool,

    /// Listening port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Backend serving asset accounts and users
    /// http[s]://hostname[:port]
    #[serde(default = "default_matching_engine_url")]
    pub matching_engine_url: String,

    /// Backend serving the withdrawal action
    #[serde(default = "default_withdrawal_service_url")]
    pub withdrawal_service_url: String,

    /// Authorization server used to validate bearer tokens at its userinfo
    /// endpoint. When unset only the presence of a bearer token is checked
    /// and the gateway warns at startup.
    #[serde(default)]
    pub authority: Option<String>,

    /// Reject proxied requests that carry no bearer token
    #[serde(default = "default_require_bearer")]
    pub require_bearer: bool,
}

/// Outbound proxy for CLI traffic
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    /// Whether it is enabled
    pub enabled: bool,
    /// Proxy address (http://, https://, socks5://)
    pub url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allow_lan_access: false,
            port: default_port(),
            matching_engine_url: default_matching_engine_url(),
            withdrawal_service_url: default_withdrawal_service_url(),
            authority: None,
            require_bearer: default_require_bearer(),
        }
    }
}

fn default_port() -> u16 {
    5009
}

fn default_matching_engine_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_withdrawal_service_url() -> String {
    "http://localhost:5010".to_string()
}

fn default_require_bearer() -> bool {
    true
}

impl ProxyConfig {
    /// Get the actual listening address
    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }

    /// Apply `DONUT_*` environment overrides on top of the file configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("DONUT_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(url) = lookup("DONUT_MATCHING_ENGINE_URL") {
            self.matching_engine_url = url;
        }
        if let Some(url) = lookup("DONUT_WITHDRAWAL_SERVICE_URL") {
            self.withdrawal_service_url = url;
        }
        if let Some(authority) = lookup("DONUT_AUTHORITY") {
            self.authority = Some(authority).filter(|a| !a.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: ProxyConfig = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.matching_engine_url, "http://localhost:5000");
        assert!(config.require_bearer);
        assert_eq!(config.get_bind_address(), "127.0.0.1");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ProxyConfig::default();
        config.apply_overrides(|key| match key {
            "DONUT_PORT" => Some("6000".to_string()),
            "DONUT_WITHDRAWAL_SERVICE_URL" => Some("http://wendy:80".to_string()),
            "DONUT_AUTHORITY" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.port, 6000);
        assert_eq!(config.withdrawal_service_url, "http://wendy:80");
        assert_eq!(config.authority, None);
    }
}
