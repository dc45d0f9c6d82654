pub mod config;
pub mod logger;
pub mod oauth;
pub mod oauth_server;
pub mod session;

pub use config::{get_data_dir, load_app_config, save_app_config};
pub use logger::init_logger;
pub use session::{FileSessionRepository, SessionRepository};
