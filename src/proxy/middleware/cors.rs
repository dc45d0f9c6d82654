// CORS middleware
use tower_http::cors::{Any, CorsLayer};

/// Any origin, method and header. Applied to `/platform` and `/healthz` only
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
