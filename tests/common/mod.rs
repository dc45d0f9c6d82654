#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};

use donut_lib::proxy::middleware::BearerPolicy;
use donut_lib::proxy::server::{build_router, AppState, AxumServer};
use donut_lib::proxy::upstream::UpstreamClient;
use donut_lib::proxy::{ProxyConfig, RouteTable};

pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A port nothing listens on
pub async fn closed_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Backend that records every call and echoes the body back
#[derive(Clone)]
pub struct Recorder {
    pub status: StatusCode,
    pub calls: Arc<Mutex<Vec<Captured>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Captured> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Captured {
        self.calls().last().cloned().expect("backend was not called")
    }
}

async fn record(State(recorder): State<Recorder>, request: Request) -> impl IntoResponse {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    recorder.calls.lock().unwrap().push(Captured {
        method: parts.method,
        uri: parts.uri.to_string(),
        headers: parts.headers,
        body: body.clone(),
    });
    (recorder.status, [("x-backend", "recorder")], body)
}

pub async fn spawn_recorder(status: StatusCode) -> (SocketAddr, Recorder) {
    let recorder = Recorder {
        status,
        calls: Arc::default(),
    };
    let app = Router::new()
        .fallback(record)
        .with_state(recorder.clone());
    (spawn(app).await, recorder)
}

pub fn gateway_config(engine: SocketAddr, withdrawal: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        matching_engine_url: format!("http://{}", engine),
        withdrawal_service_url: format!("http://{}", withdrawal),
        port: 0,
        ..ProxyConfig::default()
    }
}

pub fn gateway_router(config: &ProxyConfig, policy: BearerPolicy) -> Router {
    let state = AppState {
        routes: Arc::new(RouteTable::from_config(config).unwrap()),
        upstream: Arc::new(UpstreamClient::new().unwrap()),
    };
    build_router(state, policy)
}

/// Gateway listening on an ephemeral port
pub async fn spawn_gateway(config: &ProxyConfig, policy: BearerPolicy) -> (AxumServer, String) {
    let (server, _handle) = AxumServer::start("127.0.0.1", 0, gateway_router(config, policy))
        .await
        .unwrap();
    let base = format!("http://{}", server.local_addr());
    (server, base)
}

/// Authorization server double: discovery, refresh grant, userinfo
#[derive(Clone)]
pub struct MockAuthority {
    pub base: String,
    /// Ordered log shared with other doubles in the same test
    pub events: Arc<Mutex<Vec<String>>>,
    pub refresh_status: StatusCode,
}

impl MockAuthority {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn refreshes(&self) -> usize {
        self.events().iter().filter(|e| *e == "refresh").count()
    }
}

async fn discovery(State(auth): State<MockAuthority>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "issuer": auth.base,
        "authorization_endpoint": format!("{}/connect/authorize", auth.base),
        "token_endpoint": format!("{}/connect/token", auth.base),
        "userinfo_endpoint": format!("{}/connect/userinfo", auth.base),
    }))
}

async fn token(
    State(auth): State<MockAuthority>,
    Form(form): Form<std::collections::HashMap<String, String>>,
) -> axum::response::Response {
    assert_eq!(form.get("grant_type").map(String::as_str), Some("refresh_token"));
    assert_eq!(form.get("client_id").map(String::as_str), Some("donut_console"));
    auth.events.lock().unwrap().push("refresh".to_string());

    if !auth.refresh_status.is_success() {
        return (auth.refresh_status, r#"{"error":"invalid_grant"}"#).into_response();
    }
    Json(serde_json::json!({
        "access_token": "access-2",
        "token_type": "Bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-2",
    }))
    .into_response()
}

async fn userinfo(headers: HeaderMap) -> axum::response::Response {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer access-2") => Json(serde_json::json!({
            "sub": "user-1",
            "name": "Test Operator",
        }))
        .into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

pub async fn spawn_authority(
    events: Arc<Mutex<Vec<String>>>,
    refresh_status: StatusCode,
) -> MockAuthority {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let auth = MockAuthority {
        base: format!("http://{}", listener.local_addr().unwrap()),
        events,
        refresh_status,
    };
    let app = Router::new()
        .route("/.well-known/openid-configuration", get(discovery))
        .route("/connect/token", post(token))
        .route("/connect/userinfo", get(userinfo))
        .with_state(auth.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    auth
}
