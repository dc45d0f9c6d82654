use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::modules::oauth::{OidcClient, CLIENT_ID};
use crate::proxy::middleware::BearerPolicy;
use crate::proxy::router::RouteTable;
use crate::proxy::server::{build_router, AppState, AxumServer};
use crate::proxy::upstream::UpstreamClient;
use crate::proxy::ProxyConfig;
use crate::utils::http::create_client;

/// Gateway status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyStatus {
    pub running: bool,
    pub port: u16,
    pub base_url: String,
    pub routes: usize,
}

/// Running gateway
pub struct ProxyServiceInstance {
    pub config: ProxyConfig,
    pub axum_server: AxumServer,
    pub server_handle: tokio::task::JoinHandle<()>,
    routes: usize,
}

impl ProxyServiceInstance {
    pub fn status(&self) -> ProxyStatus {
        ProxyStatus {
            running: !self.server_handle.is_finished(),
            port: self.axum_server.local_addr().port(),
            base_url: format!("http://{}", self.axum_server.local_addr()),
            routes: self.routes,
        }
    }

    /// Stop accepting connections and wait for the accept loop to exit
    pub async fn stop(self) {
        self.axum_server.stop();
        self.server_handle.await.ok();
    }
}

/// Token check applied in front of the proxy
pub async fn bearer_policy(config: &ProxyConfig) -> AppResult<BearerPolicy> {
    if !config.require_bearer {
        tracing::warn!("Bearer tokens are not required; every caller is forwarded");
        return Ok(BearerPolicy::Disabled);
    }

    match config.authority.as_deref() {
        Some(authority) => {
            // Discovery failure stops startup
            let oidc = OidcClient::discover(create_client(30)?, authority, CLIENT_ID).await?;
            tracing::info!("Validating bearer tokens against {}", oidc.authority());
            Ok(BearerPolicy::UserInfo(Arc::new(oidc)))
        }
        None => {
            tracing::warn!(
                "No authority configured; bearer tokens are forwarded unchecked (set `authority` or DONUT_AUTHORITY to validate them)"
            );
            Ok(BearerPolicy::Presence)
        }
    }
}

/// Start the gateway
pub async fn start_proxy_service(config: ProxyConfig) -> AppResult<ProxyServiceInstance> {
    let routes = RouteTable::from_config(&config)?;
    for route in routes.routes() {
        tracing::info!("Route {} -> {}", route.name, route.destination);
    }
    let route_count = routes.routes().len();

    let policy = bearer_policy(&config).await?;
    let state = AppState {
        routes: Arc::new(routes),
        upstream: Arc::new(UpstreamClient::new()?),
    };

    let (axum_server, server_handle) =
        AxumServer::start(config.get_bind_address(), config.port, build_router(state, policy))
            .await?;

    Ok(ProxyServiceInstance {
        config,
        axum_server,
        server_handle,
        routes: route_count,
    })
}

/// Serve until Ctrl-C
pub async fn run_gateway(config: ProxyConfig) -> AppResult<()> {
    let instance = start_proxy_service(config).await?;
    let status = instance.status();
    tracing::info!("Donut gateway listening on {} ({} routes)", status.base_url, status.routes);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    instance.stop().await;
    Ok(())
}
