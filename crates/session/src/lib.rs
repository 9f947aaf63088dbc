//! Session handling for OptiExtract clients
//!
//! This crate owns the persisted session record, access-token inspection,
//! silent refresh against the Auth API and the guard that decides whether
//! protected content may render.

pub mod api;
pub mod guard;
pub mod notify;
pub mod record;
pub mod store;
pub mod token;

use thiserror::Error;

pub use api::{AuthApi, AuthPaths, LoginTokens, RefreshedTokens, SignUpRequest, TokenRefresher};
pub use guard::{DenyReason, RenderDirective, SessionGuard};
pub use notify::{ChannelNotifier, LogNotifier, Notice, NoticeLevel, Notifier};
pub use record::{SessionRecord, SessionStatus};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStore, DEFAULT_SESSION_KEY};
pub use token::{decode_claims, is_expired, Claims, Clock, FixedClock, SystemClock};

/// Message used when the server gives no usable explanation.
pub const FALLBACK_ERROR_MESSAGE: &str = "Something went wrong";

/// エラー型
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Malformed token: {0}")]
    MalformedToken(#[from] jsonwebtoken::errors::Error),

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl SessionError {
    /// Create a new storage error
    pub fn storage<T: std::fmt::Display>(msg: T) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Create a new validation error
    pub fn validation<T: std::fmt::Display>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
