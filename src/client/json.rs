use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppResult;

/// Serialization settings handed to every component that writes JSON.
///
/// Field naming and null handling live on the DTOs themselves; this value
/// only decides layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonSettings {
    pub indented: bool,
}

impl JsonSettings {
    /// Compact output for request bodies
    pub fn wire() -> Self {
        Self { indented: false }
    }

    /// Indented output for console reports
    pub fn console() -> Self {
        Self { indented: true }
    }

    pub fn to_vec<T: Serialize + ?Sized>(&self, value: &T) -> AppResult<Vec<u8>> {
        Ok(if self.indented {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        })
    }

    pub fn to_string<T: Serialize + ?Sized>(&self, value: &T) -> AppResult<String> {
        Ok(if self.indented {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }

    pub fn from_slice<T: DeserializeOwned>(&self, bytes: &[u8]) -> AppResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientTier, User};

    fn user() -> User {
        User {
            user_id: "u1".to_string(),
            client_tier: ClientTier::Tier1,
            role: None,
            default_asset_account_id: None,
        }
    }

    #[test]
    fn test_wire_output_is_compact() {
        let text = JsonSettings::wire().to_string(&user()).unwrap();
        assert_eq!(text, r#"{"userId":"u1","clientTier":"TIER_1"}"#);
    }

    #[test]
    fn test_console_output_is_indented() {
        let text = JsonSettings::console().to_string(&user()).unwrap();
        assert!(text.contains("\n  \"userId\": \"u1\""));
    }
}
