// Upstream transport shared by every forwarded request

use axum::extract::Request;
use reqwest::{redirect, Client};
use tokio::time::Duration;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::proxy::forward::{self, ClientGone, Forwarded};

pub struct UpstreamClient {
    http_client: Client,
}

impl UpstreamClient {
    /// Pooled client for backend calls.
    ///
    /// Redirects are handed back to the caller untouched and no overall
    /// timeout is set: a forwarded call ends when the backend finishes or the
    /// client disconnects.
    pub fn new() -> AppResult<Self> {
        let http_client = Client::builder()
            .redirect(redirect::Policy::none())
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create upstream client: {}", e)))?;

        Ok(Self { http_client })
    }

    pub fn from_client(http_client: Client) -> Self {
        Self { http_client }
    }

    /// Forward one inbound request to `destination`
    pub async fn forward(
        &self,
        request: Request,
        destination: &Url,
        gone: ClientGone,
    ) -> AppResult<Forwarded> {
        forward::forward(&self.http_client, request, destination, gone).await
    }
}
