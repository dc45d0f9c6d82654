use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

// Console client registration on the authorization server
pub const CLIENT_ID: &str = "donut_console";
pub const SCOPES: &str = "openid profile users_api accounts_api offline_access";

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Endpoint metadata published by the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    pub name: Option<String>,
    pub preferred_username: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
}

impl UserInfo {
    /// Get best display name
    pub fn get_display_name(&self) -> String {
        if let Some(name) = self.name.as_ref().filter(|n| !n.trim().is_empty()) {
            return name.clone();
        }
        if let Some(username) = &self.preferred_username {
            return username.clone();
        }
        match (&self.given_name, &self.family_name) {
            (Some(given), Some(family)) => format!("{} {}", given, family),
            (Some(given), None) => given.clone(),
            (None, Some(family)) => family.clone(),
            (None, None) => self.email.clone().unwrap_or_else(|| self.sub.clone()),
        }
    }
}

/// PKCE verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: String) -> Self {
        let digest = Sha256::digest(verifier.as_bytes());
        let challenge = general_purpose::URL_SAFE_NO_PAD.encode(digest);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Client for one authorization server.
///
/// Construction performs discovery, so a value of this type always carries
/// valid endpoint metadata.
#[derive(Debug, Clone)]
pub struct OidcClient {
    http: Client,
    authority: String,
    client_id: String,
    metadata: ProviderMetadata,
}

impl OidcClient {
    /// Fetch the discovery document for `authority`. Not retried.
    pub async fn discover(http: Client, authority: &str, client_id: &str) -> AppResult<Self> {
        let authority = authority.trim_end_matches('/').to_string();
        let url = format!("{}{}", authority, DISCOVERY_PATH);

        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::AuthDiscoveryFailed(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::AuthDiscoveryFailed(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let metadata = response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| AppError::AuthDiscoveryFailed(format!("Invalid discovery document: {}", e)))?;

        tracing::debug!("Discovered token endpoint {}", metadata.token_endpoint);

        Ok(Self {
            http,
            authority,
            client_id: client_id.to_string(),
            metadata,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Generate the authorization code URL for a browser login
    pub fn get_auth_url(&self, redirect_uri: &str, pkce: &Pkce, state: &str) -> AppResult<String> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", SCOPES),
            ("state", state),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
        ];

        let url = url::Url::parse_with_params(&self.metadata.authorization_endpoint, &params)?;
        Ok(url.to_string())
    }

    /// Exchange Authorization Code for Token
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> AppResult<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::OAuth(format!("Token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::OAuth(format!("Token exchange failed: {}", error_text)));
        }

        let token_res = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::OAuth(format!("Token parsing failed: {}", e)))?;

        if token_res.refresh_token.is_none() {
            tracing::warn!("Authorization server did not return a refresh_token; the session will not survive token expiry");
        }

        Ok(token_res)
    }

    /// Refresh access_token using refresh_token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        tracing::info!("Refreshing Token...");

        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::AuthRefreshFailed(format!("Refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::AuthRefreshFailed(error_text));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::AuthRefreshFailed(format!("Refresh data parsing failed: {}", e)))
    }

    /// Raw userinfo call, for callers that handle 401 themselves
    pub async fn request_user_info(&self, access_token: &str) -> AppResult<reqwest::Response> {
        let endpoint = self
            .metadata
            .userinfo_endpoint
            .as_deref()
            .ok_or_else(|| AppError::OAuth("Authorization server has no userinfo endpoint".to_string()))?;

        Ok(self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?)
    }

    /// Get user info
    pub async fn get_user_info(&self, access_token: &str) -> AppResult<UserInfo> {
        let response = self.request_user_info(access_token).await?;
        parse_user_info(response).await
    }
}

pub async fn parse_user_info(response: reqwest::Response) -> AppResult<UserInfo> {
    match response.status() {
        s if s.is_success() => Ok(response.json::<UserInfo>().await?),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Unauthorized(
            "Access token rejected by userinfo endpoint".to_string(),
        )),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_challenge_matches_rfc7636_example() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_generated_verifier_length() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 64);
        assert!(!pkce.challenge.contains('='));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut info = UserInfo {
            sub: "sub-1".to_string(),
            name: Some("  ".to_string()),
            preferred_username: None,
            given_name: Some("Ada".to_string()),
            family_name: Some("Lovelace".to_string()),
            email: None,
        };
        assert_eq!(info.get_display_name(), "Ada Lovelace");
        info.given_name = None;
        info.family_name = None;
        assert_eq!(info.get_display_name(), "sub-1");
    }

    #[test]
    fn test_metadata_tolerates_missing_optional_endpoints() {
        let metadata: ProviderMetadata = serde_json::from_str(
            r#"{"issuer":"https://auth","authorization_endpoint":"https://auth/connect/authorize","token_endpoint":"https://auth/connect/token"}"#,
        )
        .unwrap();
        assert!(metadata.userinfo_endpoint.is_none());
    }
}
