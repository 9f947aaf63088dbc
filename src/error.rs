//! Error handling for the OptiExtract client

use std::fmt;
use thiserror::Error;

use optiextract_session::SessionError;

/// Unified error type for the OptiExtract client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Session, storage and auth endpoint errors
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The backend answered with a non-2xx status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No access token is stored
    #[error("Not logged in")]
    NotAuthenticated,

    /// A protected request came back 401; the session has been cleared
    #[error("Session expired")]
    SessionExpired,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Error::Api { message, .. } => message.clone(),
            Error::Session(SessionError::Rejected { message, .. }) => message.clone(),
            Error::Session(SessionError::Validation(message)) => message.clone(),
            Error::NotAuthenticated => "Please log in again.".to_string(),
            Error::SessionExpired => optiextract_session::notify::SESSION_EXPIRED.to_string(),
            _ => optiextract_session::FALLBACK_ERROR_MESSAGE.to_string(),
        }
    }
}
