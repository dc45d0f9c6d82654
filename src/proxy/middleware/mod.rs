// Middleware module - Axum middleware

pub mod auth;
pub mod cors;

pub use auth::{auth_middleware, BearerPolicy};
pub use cors::cors_layer;
