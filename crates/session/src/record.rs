//! The persisted session record

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::RefreshedTokens;

/// Session data as persisted under the session key
///
/// Keys other than `token` and `refreshToken` belong to other parts of the
/// application and are written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// The access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// The refresh token
    #[serde(
        rename = "refreshToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionRecord {
    /// Create a complete record from a freshly issued token pair
    pub fn new(token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            refresh_token: Some(refresh_token.into()),
            extra: Map::new(),
        }
    }

    /// A record is only usable when both tokens are present
    pub fn is_complete(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().map_or(false, |v| !v.is_empty());
        present(&self.token) && present(&self.refresh_token)
    }

    /// Overwrite the fields a refresh response carried; a missing refresh
    /// token leaves the stored one as it was.
    pub fn apply_refresh(&mut self, tokens: RefreshedTokens) {
        self.token = Some(tokens.access_token);
        if let Some(refresh_token) = tokens.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }
}

/// Derived session state; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    Valid,
    Refreshing,
    Expired,
    Invalid,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Unknown
    }
}
