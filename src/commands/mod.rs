use std::sync::Arc;

use crate::client::{
    AssetAccountsClient, JsonSettings, ServiceClient, TokenManager, TokenRotated, UsersClient,
};
use crate::error::{AppError, AppResult};
use crate::models::TokenState;
use crate::modules::oauth::{OidcClient, CLIENT_ID};
use crate::modules::session::SessionRepository;
use crate::utils::http::create_client;

pub mod accounts;
pub mod login;
pub mod proxy;
pub mod users;

/// Timeout for console calls against the authority and the gateway
pub const CLIENT_TIMEOUT_SECS: u64 = 60;

/// Writes every token change straight to `session`
pub fn persist_to(session: Arc<dyn SessionRepository>) -> TokenRotated {
    Arc::new(move |state: &TokenState| session.save(state))
}

/// Everything an account or user command needs, built from the stored session
pub struct CommandContext {
    pub session: Arc<dyn SessionRepository>,
    pub tokens: Arc<TokenManager>,
    pub asset_accounts: AssetAccountsClient,
    pub users: UsersClient,
    /// Layout for verbose console dumps
    pub console: JsonSettings,
}

impl CommandContext {
    /// Load the session and discover its authority. Discovery failure is fatal.
    pub async fn connect(session: Arc<dyn SessionRepository>) -> AppResult<Self> {
        let stored = session.load()?.ok_or_else(|| {
            AppError::Unauthorized("Not logged in; run `donut login` first".to_string())
        })?;

        tracing::info!(
            "Executing command against {} (authority {})",
            stored.service,
            stored.authority
        );

        let http = create_client(CLIENT_TIMEOUT_SECS)?;
        let oidc = OidcClient::discover(http.clone(), &stored.authority, CLIENT_ID).await?;
        let service = stored.service.clone();

        let tokens = Arc::new(TokenManager::new(
            Arc::new(oidc),
            Some(stored),
            persist_to(session.clone()),
        ));
        Self::with_tokens(session, tokens, http, &service)
    }

    pub fn with_tokens(
        session: Arc<dyn SessionRepository>,
        tokens: Arc<TokenManager>,
        http: reqwest::Client,
        service: &str,
    ) -> AppResult<Self> {
        let api = ServiceClient::new(http, service, Some(tokens.clone()), JsonSettings::wire())?;

        Ok(Self {
            session,
            tokens,
            asset_accounts: AssetAccountsClient::new(api.clone()),
            users: UsersClient::new(api),
            console: JsonSettings::console(),
        })
    }

    /// Persist the current tokens on clean exit
    pub fn shutdown(&self) -> AppResult<()> {
        match self.tokens.tokens() {
            Some(tokens) => self.session.save(&tokens),
            None => Ok(()),
        }
    }

    pub(crate) fn verbose<T: serde::Serialize + ?Sized>(&self, label: &str, value: &T) {
        match self.console.to_string(value) {
            Ok(text) => tracing::debug!("{}:\n{}", label, text),
            Err(e) => tracing::debug!("{}: <unprintable: {}>", label, e),
        }
    }
}
