use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted login: where it was obtained, which gateway it targets, and the
/// opaque tokens themselves.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    pub authority: String,
    pub service: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenState {
    /// Same authority, compared without trailing slashes or case
    pub fn is_for_authority(&self, authority: &str) -> bool {
        self.authority
            .trim_end_matches('/')
            .eq_ignore_ascii_case(authority.trim_end_matches('/'))
    }
}

pub(crate) fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}...", prefix)
}

// Tokens never reach the logs in full
impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("authority", &self.authority)
            .field("service", &self.service)
            .field("access_token", &token_prefix(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(token_prefix),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TokenState {
        TokenState {
            authority: "https://auth.example.com/".to_string(),
            service: "http://localhost:5009".to_string(),
            access_token: "eyJhbGciOiJSUzI1NiJ9.payload".to_string(),
            refresh_token: None,
        }
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let printed = format!("{:?}", state());
        assert!(printed.contains("eyJhbGci..."));
        assert!(!printed.contains("payload"));
    }

    #[test]
    fn test_camel_case_and_missing_refresh_token() {
        let json = serde_json::to_value(state()).unwrap();
        assert_eq!(json["accessToken"], "eyJhbGciOiJSUzI1NiJ9.payload");
        assert!(json.get("refreshToken").is_none());
    }

    #[test]
    fn test_authority_comparison() {
        assert!(state().is_for_authority("https://AUTH.example.com"));
        assert!(!state().is_for_authority("https://auth-test.example.com"));
    }
}
