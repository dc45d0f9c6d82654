use reqwest::Method;

use crate::client::service::ServiceClient;
use crate::error::AppResult;
use crate::models::User;

#[derive(Clone)]
pub struct UsersClient {
    api: ServiceClient,
}

impl UsersClient {
    pub fn new(api: ServiceClient) -> Self {
        Self { api }
    }

    /// `POST /api/user`
    pub async fn add_user(&self, user: &User) -> AppResult<()> {
        self.api
            .call::<_, serde_json::Value>(Method::POST, &["api", "user"], Some(user))
            .await?;
        Ok(())
    }
}
