// Console-side clients for the gateway
pub mod asset_accounts;
pub mod json;
pub mod service;
pub mod token_manager;
pub mod users;

pub use asset_accounts::AssetAccountsClient;
pub use json::JsonSettings;
pub use service::{PreparedRequest, ServiceClient};
pub use token_manager::{AuthState, TokenManager, TokenRotated};
pub use users::UsersClient;
