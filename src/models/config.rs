use crate::proxy::config::{ProxyConfig, UpstreamProxyConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTHORITY: &str = "https://auth.lykkecloud.com";
pub const TEST_AUTHORITY: &str = "https://auth-test.lykkecloud.com";
pub const DEFAULT_SERVICE: &str = "http://localhost:5009";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,
    /// Authority used by `login` when none is given
    #[serde(default = "default_authority")]
    pub default_authority: String,
    /// Gateway used by `login` when none is given
    #[serde(default = "default_service")]
    pub default_service: String,
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            upstream_proxy: UpstreamProxyConfig::default(),
            default_authority: default_authority(),
            default_service: default_service(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}
