use crate::error::{AppError, AppResult};
use crate::modules::config::load_app_config;
use crate::proxy::config::UpstreamProxyConfig;
use reqwest::{redirect, Client, Proxy};

const USER_AGENT: &str = concat!("donut/", env!("CARGO_PKG_VERSION"));

/// Client for the console path (authority and gateway calls).
/// Loads the saved configuration and applies its outbound proxy.
pub fn create_client(timeout_secs: u64) -> AppResult<Client> {
    match load_app_config() {
        Ok(config) => create_client_with_proxy(timeout_secs, Some(config.upstream_proxy)),
        Err(e) => {
            tracing::warn!("Ignoring unreadable configuration: {}", e);
            create_client_with_proxy(timeout_secs, None)
        }
    }
}

/// Create an HTTP client with specified proxy configuration.
///
/// Redirects are not followed and no cookie store is kept.
pub fn create_client_with_proxy(
    timeout_secs: u64,
    proxy_config: Option<UpstreamProxyConfig>,
) -> AppResult<Client> {
    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(timeout_secs));

    if let Some(config) = proxy_config.filter(|c| c.enabled && !c.url.is_empty()) {
        let proxy = Proxy::all(&config.url)
            .map_err(|e| AppError::Config(format!("Invalid proxy address {}: {}", config.url, e)))?;
        builder = builder.proxy(proxy);
        tracing::info!("HTTP client upstream proxy enabled: {}", config.url);
    }

    builder
        .build()
        .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))
}
