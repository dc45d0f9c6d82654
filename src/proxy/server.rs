use crate::error::AppResult;
use crate::proxy::forward::ClientGone;
use crate::proxy::middleware::{auth_middleware, cors_layer, BearerPolicy};
use crate::proxy::router::RouteTable;
use crate::proxy::upstream::UpstreamClient;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub upstream: Arc<UpstreamClient>,
}

/// Build and version information served at `/platform`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub title: &'static str,
    pub version: &'static str,
    pub os: String,
    pub process_id: u32,
}

static PLATFORM: Lazy<PlatformInfo> = Lazy::new(|| PlatformInfo {
    title: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
    process_id: std::process::id(),
});

/// Gateway routes: platform info, health, and the proxy fallback.
///
/// CORS covers the gateway's own endpoints only; proxied responses carry the
/// backend's headers as sent.
pub fn build_router(state: AppState, policy: BearerPolicy) -> Router {
    let own = Router::new()
        .route("/platform", get(platform_handler))
        .route("/healthz", get(health_check_handler))
        .layer(cors_layer());

    Router::new()
        .merge(own)
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(policy, auth_middleware))
        .with_state(state)
}

/// Axum server instance
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: std::net::SocketAddr,
}

impl AxumServer {
    /// Start Axum server
    pub async fn start(
        host: &str,
        port: u16,
        app: Router,
    ) -> AppResult<(Self, tokio::task::JoinHandle<()>)> {
        // Bind address
        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Gateway started at http://{}", local_addr);

        // Create shutdown channel
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let server_instance = Self {
            shutdown_tx: Some(shutdown_tx),
            local_addr,
        };

        // Start server in new task
        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let app = app.clone();

                                tokio::task::spawn(async move {
                                    // Fires for every request on this connection once it closes
                                    let (gone_tx, gone) = ClientGone::channel();
                                    let service = hyper::service::service_fn(
                                        move |mut request: hyper::Request<hyper::body::Incoming>| {
                                            request.extensions_mut().insert(gone.clone());
                                            app.clone().oneshot(request)
                                        },
                                    );

                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .with_upgrades()
                                        .await
                                    {
                                        debug!("Connection handling finished or errored: {:?}", err);
                                    }
                                    let _ = gone_tx.send(true);
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Gateway stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((server_instance, handle))
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stop server
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Resolve the destination and relay the call
async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let destination = match state.routes.resolve(&method, &path, request.uri().query()) {
        Ok(destination) => destination,
        Err(e) => {
            debug!("{}", e);
            return e.into_response();
        }
    };

    let gone = request
        .extensions()
        .get::<ClientGone>()
        .cloned()
        .unwrap_or_default();

    match state.upstream.forward(request, &destination, gone).await {
        Ok(forwarded) => {
            tracing::info!(
                "{} {} -> {} [{}]",
                method,
                path,
                destination,
                forwarded.response.status()
            );
            forwarded.response
        }
        Err(e) => e.into_response(),
    }
}

async fn platform_handler() -> Response {
    Json(PLATFORM.clone()).into_response()
}

/// Health check handler
async fn health_check_handler() -> Response {
    Json(serde_json::json!({
        "status": "ok"
    }))
    .into_response()
}
