use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::client::{AuthState, TokenManager};
use crate::commands::{persist_to, CLIENT_TIMEOUT_SECS};
use crate::error::{AppError, AppResult};
use crate::models::config::TEST_AUTHORITY;
use crate::models::AppConfig;
use crate::modules::oauth::{parse_user_info, OidcClient, UserInfo, CLIENT_ID};
use crate::modules::oauth_server::run_login_flow;
use crate::modules::session::SessionRepository;
use crate::utils::http::create_client;

#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub service: Option<String>,
    pub authority: Option<String>,
    /// Use the test authority
    pub test: bool,
    /// Forget the stored session and stop
    pub reset: bool,
}

/// What the gateway reports at `/platform`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub os: String,
}

fn absolute_http_url(value: &str, what: &str) -> AppResult<String> {
    let url = Url::parse(value)
        .map_err(|e| AppError::InvalidArgument(format!("{} `{}`: {}", what, value, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::InvalidArgument(format!(
            "{} `{}` must be an absolute http(s) address",
            what, value
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Pick authority and service: explicit option, then `--test`, then the
/// stored session, then configuration.
pub fn resolve_targets(
    options: &LoginOptions,
    stored: Option<&crate::models::TokenState>,
    config: &AppConfig,
) -> AppResult<(String, String)> {
    let authority = match (&options.authority, options.test) {
        (Some(authority), _) => authority.clone(),
        (None, true) => TEST_AUTHORITY.to_string(),
        (None, false) => config.default_authority.clone(),
    };
    let service = options
        .service
        .clone()
        .or_else(|| stored.map(|s| s.service.clone()))
        .unwrap_or_else(|| config.default_service.clone());

    Ok((
        absolute_http_url(&authority, "Authority")?,
        absolute_http_url(&service, "Service")?,
    ))
}

pub async fn check_service(http: &reqwest::Client, service: &str) -> AppResult<ServiceInfo> {
    let url = format!("{}/platform", service);
    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| AppError::UpstreamUnreachable(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(AppError::Upstream {
            status: response.status().as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response.json::<ServiceInfo>().await?)
}

/// Userinfo for the session held by `tokens`, refreshing on 401
async fn current_user(tokens: &TokenManager) -> AppResult<UserInfo> {
    let oidc = tokens.oidc().clone();
    let response = tokens
        .execute(|token| {
            let oidc = oidc.clone();
            async move { oidc.request_user_info(&token).await }
        })
        .await?;
    parse_user_info(response).await
}

pub async fn login(
    session: Arc<dyn SessionRepository>,
    config: &AppConfig,
    options: LoginOptions,
) -> AppResult<()> {
    if options.reset {
        session.clear()?;
        println!("Login details reset");
        return Ok(());
    }

    let stored = session.load()?;
    let (authority, service) = resolve_targets(&options, stored.as_ref(), config)?;
    let http = create_client(CLIENT_TIMEOUT_SECS)?;

    let info = check_service(&http, &service).await?;
    println!("Saving Server Url: {}", service);
    println!(
        "Logging in to {} ({} v{} running on {})...",
        authority, info.title, info.version, info.os
    );

    let oidc = Arc::new(OidcClient::discover(http, &authority, CLIENT_ID).await?);
    let stored = stored.filter(|s| s.is_for_authority(oidc.authority()));
    let tokens = TokenManager::new(oidc.clone(), stored, persist_to(session.clone()));

    if tokens.state() == AuthState::Authenticated {
        match current_user(&tokens).await {
            Ok(user) => {
                if let Some(mut state) = tokens.tokens().filter(|s| s.service != service) {
                    state.service = service.clone();
                    session.save(&state)?;
                }
                println!("Logged in as {}.", user.get_display_name());
                return Ok(());
            }
            Err(e) => {
                tracing::debug!("Stored session is not usable: {}", e);
                tokens.reset();
            }
        }
    }

    let state = tokens
        .login(&service, |oidc| async move { run_login_flow(&oidc).await })
        .await
        .map_err(|e| {
            tracing::error!("Error attempting to log in: {}", e);
            e
        })?;

    let user = oidc.get_user_info(&state.access_token).await?;
    println!("Logged in as {}.", user.get_display_name());
    Ok(())
}
