//! Configuration options for the OptiExtract client

use std::env;
use std::time::Duration;

use optiextract_session::{AuthPaths, DEFAULT_SESSION_KEY};

use crate::error::Error;

/// Default backend deployment
pub const DEFAULT_API_URL: &str = "https://invoice-parser-image-669034154292.asia-south1.run.app";

/// Configuration options for the OptiExtract client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The backend base URL
    pub api_url: String,

    /// Storage key of the session record
    pub session_key: String,

    /// Storage key of the cached user profile
    pub profile_key: String,

    /// Relative path of the current-user endpoint
    pub profile_path: String,

    /// Auth endpoint paths
    pub auth_paths: AuthPaths,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Pause between a denial notice and the redirect
    pub redirect_delay: Duration,

    /// Display time of the "session expired" notice
    pub expired_notice_duration: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            session_key: DEFAULT_SESSION_KEY.to_string(),
            profile_key: "userProfile".to_string(),
            profile_path: "users/me".to_string(),
            auth_paths: AuthPaths::default(),
            request_timeout: Some(Duration::from_secs(30)),
            redirect_delay: Duration::from_secs(3),
            expired_notice_duration: Duration::from_secs(3),
        }
    }
}

impl ClientOptions {
    /// Read overrides from the environment (and a `.env` file, if present)
    ///
    /// Recognised variables: `OPTIEXTRACT_API_URL`, `OPTIEXTRACT_STORAGE_KEY`,
    /// `OPTIEXTRACT_REDIRECT_DELAY_MS`, `OPTIEXTRACT_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        let mut options = Self::default();

        if let Ok(url) = env::var("OPTIEXTRACT_API_URL") {
            options = options.with_api_url(&url);
        }
        if let Ok(key) = env::var("OPTIEXTRACT_STORAGE_KEY") {
            options = options.with_session_key(&key);
        }
        if let Ok(ms) = env::var("OPTIEXTRACT_REDIRECT_DELAY_MS") {
            let ms = ms.trim().parse::<u64>().map_err(|e| {
                Error::config(format!("OPTIEXTRACT_REDIRECT_DELAY_MS: {}", e))
            })?;
            options = options.with_redirect_delay(Duration::from_millis(ms));
        }
        if let Ok(secs) = env::var("OPTIEXTRACT_REQUEST_TIMEOUT_SECS") {
            let secs = secs.trim().parse::<u64>().map_err(|e| {
                Error::config(format!("OPTIEXTRACT_REQUEST_TIMEOUT_SECS: {}", e))
            })?;
            let timeout = (secs > 0).then(|| Duration::from_secs(secs));
            options = options.with_request_timeout(timeout);
        }

        options.validate()?;
        Ok(options)
    }

    /// Check that the base URL is usable
    pub fn validate(&self) -> Result<(), Error> {
        let url = url::Url::parse(&self.api_url)?;
        if url.cannot_be_a_base() {
            return Err(Error::config(format!("{} cannot be a base URL", self.api_url)));
        }
        Ok(())
    }

    /// Set the backend base URL
    pub fn with_api_url(mut self, value: &str) -> Self {
        self.api_url = value.trim_end_matches('/').to_string();
        self
    }

    /// Set the session record key
    pub fn with_session_key(mut self, value: &str) -> Self {
        self.session_key = value.to_string();
        self
    }

    /// Set the profile cache key
    pub fn with_profile_key(mut self, value: &str) -> Self {
        self.profile_key = value.to_string();
        self
    }

    /// Set the auth endpoint paths
    pub fn with_auth_paths(mut self, value: AuthPaths) -> Self {
        self.auth_paths = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the pause before redirecting
    pub fn with_redirect_delay(mut self, value: Duration) -> Self {
        self.redirect_delay = value;
        self
    }

    /// Set how long the session-expired notice is shown
    pub fn with_expired_notice_duration(mut self, value: Duration) -> Self {
        self.expired_notice_duration = value;
        self
    }
}
