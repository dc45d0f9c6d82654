use std::sync::Arc;

use bytes::Bytes;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::client::json::JsonSettings;
use crate::client::token_manager::TokenManager;
use crate::error::{AppError, AppResult};

/// A call ready to be sent, and re-sent after a token refresh
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Bytes>,
}

/// HTTP capability shared by the domain clients: build a request against
/// the gateway, send it with the session token, and read the reply.
#[derive(Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: Url,
    tokens: Option<Arc<TokenManager>>,
    json: JsonSettings,
}

impl ServiceClient {
    /// `tokens: None` sends calls without an `Authorization` header
    pub fn new(
        http: Client,
        base_url: &str,
        tokens: Option<Arc<TokenManager>>,
        json: JsonSettings,
    ) -> AppResult<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("{} is not a service address", base_url)));
        }

        Ok(Self {
            http,
            base_url,
            tokens,
            json,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute address for `segments` below the service root; each segment
    /// is percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("{} is not a service address", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> AppResult<PreparedRequest> {
        let body = match body {
            Some(value) => Some(Bytes::from(self.json.to_vec(value)?)),
            None => None,
        };

        Ok(PreparedRequest {
            method,
            url: self.endpoint(segments)?,
            body,
        })
    }

    async fn dispatch(
        &self,
        request: &PreparedRequest,
        access_token: Option<String>,
    ) -> AppResult<reqwest::Response> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .header(header::ACCEPT, "application/json");

        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        tracing::debug!("{} {}", request.method, request.url);
        builder
            .send()
            .await
            .map_err(|e| AppError::UpstreamUnreachable(format!("{}: {}", request.url, e)))
    }

    /// Send once; with a session attached a 401 gets one refresh and one retry
    pub async fn send(&self, request: &PreparedRequest) -> AppResult<reqwest::Response> {
        match &self.tokens {
            Some(tokens) => {
                tokens
                    .execute(move |token| self.dispatch(request, Some(token)))
                    .await
            }
            None => self.dispatch(request, None).await,
        }
    }

    /// Fail on non-success statuses; `None` for an empty success body
    pub async fn parse_response<R: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<Option<R>> {
        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::Unauthorized(format!(
                "{} rejected the access token",
                self.base_url
            )));
        }
        if !status.is_success() {
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        self.json.from_slice(&body).map(Some)
    }

    /// build_request, send, parse_response
    pub async fn call<B, R>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> AppResult<Option<R>>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self.build_request(method, segments, body)?;
        let response = self.send(&request).await?;
        self.parse_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ServiceClient {
        ServiceClient::new(Client::new(), base, None, JsonSettings::wire()).unwrap()
    }

    #[test]
    fn test_endpoint_appends_encoded_segments() {
        let api = client("http://localhost:5009");
        let url = api.endpoint(&["api", "assetAccount", "AA 1/2", "close"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5009/api/assetAccount/AA%201%2F2/close"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let api = client("https://gateway.example.com/donut/");
        let url = api.endpoint(&["api", "user"]).unwrap();
        assert_eq!(url.as_str(), "https://gateway.example.com/donut/api/user");
    }

    #[test]
    fn test_bodiless_request_has_no_payload() {
        let api = client("http://localhost:5009");
        let request = api
            .build_request::<()>(Method::DELETE, &["api", "assetAccount", "AA1"], None)
            .unwrap();
        assert!(request.body.is_none());
        assert_eq!(request.method, Method::DELETE);
    }

    #[test]
    fn test_non_base_address_is_rejected() {
        assert!(ServiceClient::new(Client::new(), "mailto:ops@example.com", None, JsonSettings::wire()).is_err());
    }
}
