// proxy module - authenticated reverse proxy in front of the backends

pub mod config;
pub mod forward;
pub mod middleware; // Axum middleware
pub mod router; // Route resolution
pub mod server;
pub mod upstream; // Upstream client

pub use config::ProxyConfig;
pub use router::RouteTable;
pub use server::AxumServer;
