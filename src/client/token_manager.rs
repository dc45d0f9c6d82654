use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::StatusCode;

use crate::error::{AppError, AppResult};
use crate::models::session::token_prefix;
use crate::models::TokenState;
use crate::modules::oauth::{OidcClient, TokenResponse};

/// Persistence hook run after every token change, before the new access
/// token is used. An error here fails the call that triggered the change.
pub type TokenRotated = Arc<dyn Fn(&TokenState) -> AppResult<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
    /// Refresh failed or the refreshed token was rejected; log in again
    Failed,
}

struct Inner {
    state: AuthState,
    tokens: Option<TokenState>,
}

/// Owns the session tokens of one process.
///
/// Refresh is reactive: a 401 from an outbound call triggers exactly one
/// refresh and one retry. Refreshes are serialized, and a caller whose
/// rejected token was already replaced by a concurrent refresh retries with
/// the replacement instead of refreshing again.
pub struct TokenManager {
    oidc: Arc<OidcClient>,
    inner: Mutex<Inner>,
    refresh_lock: tokio::sync::Mutex<()>,
    on_rotated: TokenRotated,
}

impl TokenManager {
    /// `oidc` has already completed discovery
    pub fn new(oidc: Arc<OidcClient>, tokens: Option<TokenState>, on_rotated: TokenRotated) -> Self {
        let state = if tokens.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };

        Self {
            oidc,
            inner: Mutex::new(Inner { state, tokens }),
            refresh_lock: tokio::sync::Mutex::new(()),
            on_rotated,
        }
    }

    pub fn oidc(&self) -> &Arc<OidcClient> {
        &self.oidc
    }

    pub fn state(&self) -> AuthState {
        self.inner().state
    }

    /// Snapshot of the current tokens
    pub fn tokens(&self) -> Option<TokenState> {
        self.inner().tokens.clone()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: AuthState) {
        self.inner().state = state;
    }

    /// Run an interactive login.
    ///
    /// `authenticate` performs the grant against the discovered authority.
    /// Nothing is stored or persisted unless it succeeds.
    pub async fn login<F, Fut>(&self, service: &str, authenticate: F) -> AppResult<TokenState>
    where
        F: FnOnce(Arc<OidcClient>) -> Fut,
        Fut: Future<Output = AppResult<TokenResponse>>,
    {
        self.set_state(AuthState::Authenticating);

        let response = match authenticate(self.oidc.clone()).await {
            Ok(response) => response,
            Err(e) => {
                self.set_state(AuthState::Failed);
                return Err(e);
            }
        };

        let tokens = TokenState {
            authority: self.oidc.authority().to_string(),
            service: service.to_string(),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        };

        if let Err(e) = (self.on_rotated)(&tokens) {
            self.set_state(AuthState::Failed);
            return Err(e);
        }

        let mut inner = self.inner();
        inner.tokens = Some(tokens.clone());
        inner.state = AuthState::Authenticated;
        tracing::info!("Logged in against {}", tokens.authority);
        Ok(tokens)
    }

    /// Forget the in-memory session
    pub fn reset(&self) {
        let mut inner = self.inner();
        inner.tokens = None;
        inner.state = AuthState::Unauthenticated;
    }

    fn current_access_token(&self) -> AppResult<String> {
        let inner = self.inner();
        match (&inner.state, &inner.tokens) {
            (AuthState::Failed, _) => Err(AppError::Unauthorized(
                "Session expired; run `donut login` again".to_string(),
            )),
            (_, Some(tokens)) => Ok(tokens.access_token.clone()),
            (_, None) => Err(AppError::Unauthorized(
                "Not logged in; run `donut login` first".to_string(),
            )),
        }
    }

    /// Send an authenticated call.
    ///
    /// `send` receives the access token to attach. A 401 leads to one
    /// refresh and one retry; a second 401 terminates the session.
    pub async fn execute<F, Fut>(&self, send: F) -> AppResult<reqwest::Response>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = AppResult<reqwest::Response>>,
    {
        let token = self.current_access_token()?;
        let response = send(token.clone()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!("Access token {} rejected, refreshing", token_prefix(&token));
        let fresh = self.refresh(&token).await?;

        let retried = send(fresh).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            self.set_state(AuthState::Failed);
            return Err(AppError::Unauthorized(
                "Access token rejected again after refresh".to_string(),
            ));
        }
        Ok(retried)
    }

    /// Replace `rejected` with a fresh access token and persist the result.
    pub async fn refresh(&self, rejected: &str) -> AppResult<String> {
        let _guard = self.refresh_lock.lock().await;

        let current = {
            let inner = self.inner();
            if inner.state == AuthState::Failed {
                return Err(AppError::AuthRefreshFailed(
                    "Session already terminated".to_string(),
                ));
            }
            match &inner.tokens {
                // Rotated by a concurrent caller while we waited
                Some(tokens) if tokens.access_token != rejected => {
                    tracing::debug!("Token already refreshed by a concurrent call");
                    return Ok(tokens.access_token.clone());
                }
                Some(tokens) => tokens.clone(),
                None => {
                    return Err(AppError::Unauthorized(
                        "Not logged in; run `donut login` first".to_string(),
                    ))
                }
            }
        };

        let Some(refresh_token) = current.refresh_token.clone() else {
            self.set_state(AuthState::Failed);
            return Err(AppError::AuthRefreshFailed(
                "No refresh token stored; run `donut login` again".to_string(),
            ));
        };

        self.set_state(AuthState::Refreshing);

        let response = match self.oidc.refresh_access_token(&refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Token refresh failed: {}", e);
                self.set_state(AuthState::Failed);
                return Err(match e {
                    e @ AppError::AuthRefreshFailed(_) => e,
                    other => AppError::AuthRefreshFailed(other.to_string()),
                });
            }
        };

        let rotated = TokenState {
            access_token: response.access_token,
            // Servers without rotation keep the old refresh token valid
            refresh_token: response.refresh_token.or(current.refresh_token),
            ..current
        };

        if let Err(e) = (self.on_rotated)(&rotated) {
            tracing::error!("Failed to persist refreshed tokens: {}", e);
            self.set_state(AuthState::Failed);
            return Err(e);
        }

        let access_token = rotated.access_token.clone();
        let mut inner = self.inner();
        inner.tokens = Some(rotated);
        inner.state = AuthState::Authenticated;
        tracing::info!("Access token refreshed");
        Ok(access_token)
    }
}
