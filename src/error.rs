use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Request cancelled by client")]
    Cancelled,

    #[error("Authority discovery failed: {0}")]
    AuthDiscoveryFailed(String),

    #[error("Token refresh failed: {0}")]
    AuthRefreshFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl AppError {
    /// Status code the gateway answers with when this error ends a proxied call.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::UpstreamUnreachable(_) | AppError::Network(_) => StatusCode::BAD_GATEWAY,
            // nginx convention; the client is gone and never reads it
            AppError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
            AppError::Unauthorized(_) | AppError::AuthRefreshFailed(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthDiscoveryFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Serialize as the display string so errors can be reported as JSON by the CLI
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (
            status,
            axum::Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                axum::http::header::WWW_AUTHENTICATE,
                axum::http::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
