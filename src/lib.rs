//! OptiExtract Rust Client Library
//!
//! Client-side plumbing for the OptiExtract document processing API: the
//! persisted session, the guard in front of protected views, authenticated
//! requests and the auth endpoints.

pub mod config;
pub mod error;
pub mod fetch;
pub mod profile;
pub mod routes;

pub use optiextract_session as session;

use std::sync::Arc;

use log::info;
use reqwest::Client;

use optiextract_session::{
    AuthApi, Clock, KeyValueStore, Notice, Notifier, SessionGuard, SessionStore, SystemClock,
};

use crate::config::ClientOptions;
use crate::error::Error;
use crate::fetch::AuthedClient;
use crate::profile::ProfileCache;
use crate::routes::{landing_route, Navigator, ProtectedRoute, Route};

/// The main entry point for the OptiExtract client
pub struct OptiExtract {
    options: ClientOptions,
    http_client: Client,
    backend: Arc<dyn KeyValueStore>,
    store: SessionStore,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    clock: Arc<dyn Clock>,
    auth: Arc<AuthApi>,
}

impl OptiExtract {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `options` - Client options
    /// * `backend` - Durable storage shared by the session record and the profile cache
    /// * `notifier` - Sink for user-visible notices
    /// * `navigator` - Performs redirects
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use optiextract_client::{OptiExtract, config::ClientOptions, routes::RecordingNavigator};
    /// use optiextract_client::session::{LogNotifier, MemoryStore};
    ///
    /// let client = OptiExtract::new(
    ///     ClientOptions::default().with_api_url("http://localhost:8000"),
    ///     Arc::new(MemoryStore::new()),
    ///     Arc::new(LogNotifier),
    ///     Arc::new(RecordingNavigator::new()),
    /// ).unwrap();
    /// ```
    pub fn new(
        options: ClientOptions,
        backend: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, Error> {
        options.validate()?;

        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let store = SessionStore::with_key(Arc::clone(&backend), &options.session_key);
        let auth = Arc::new(AuthApi::new(
            &options.api_url,
            http_client.clone(),
            options.auth_paths.clone(),
        ));

        Ok(Self {
            options,
            http_client,
            backend,
            store,
            notifier,
            navigator,
            clock: Arc::new(SystemClock),
            auth,
        })
    }

    /// Replace the wall clock used for expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Get a reference to the auth endpoints
    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// Log in and persist both tokens in one write
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), Error> {
        let tokens = self.auth.login(email, password).await?;

        // Other keys in the record belong to the rest of the app
        let mut record = self.store.load().ok().flatten().unwrap_or_default();
        record.token = Some(tokens.access_token);
        record.refresh_token = Some(tokens.refresh_token);
        self.store.save(&record)?;

        info!("Signed in as {}", email);
        self.notifier.notify(Notice::success("Successfully logged in!"));
        Ok(())
    }

    /// Forget the session and any cached profile
    pub fn sign_out(&self) -> Result<(), Error> {
        self.store.clear()?;
        self.profile().clear()?;
        info!("Signed out");
        Ok(())
    }

    /// Whether a complete session record is stored; says nothing about expiry
    pub fn has_session(&self) -> bool {
        matches!(self.store.load(), Ok(Some(ref record)) if record.is_complete())
    }

    /// A guard for one protected view
    pub fn guard(&self) -> SessionGuard {
        SessionGuard::new(self.store.clone(), self.auth.clone())
            .with_notifier(Arc::clone(&self.notifier))
            .with_clock(Arc::clone(&self.clock))
            .with_expired_notice_duration(self.options.expired_notice_duration)
    }

    /// Wrapper that runs a fresh guard before a protected view
    pub fn protected_route(&self) -> ProtectedRoute {
        ProtectedRoute::new(
            self.guard(),
            Arc::clone(&self.navigator),
            self.options.redirect_delay,
        )
    }

    /// Client for authenticated API calls
    pub fn client(&self) -> AuthedClient {
        AuthedClient::new(
            &self.options.api_url,
            self.http_client.clone(),
            self.store.clone(),
            Arc::clone(&self.notifier),
            Arc::clone(&self.navigator),
        )
        .with_redirect_delay(self.options.redirect_delay)
        .with_expired_notice_duration(self.options.expired_notice_duration)
    }

    pub fn profile(&self) -> ProfileCache {
        ProfileCache::new(
            self.client(),
            Arc::clone(&self.backend),
            &self.options.profile_key,
            &self.options.profile_path,
        )
    }

    /// Where the bare root path should lead
    pub fn landing_route(&self) -> Route {
        landing_route(&self.store)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::ClientOptions;
    pub use crate::error::Error;
    pub use crate::fetch::{ApiRequest, AuthedClient};
    pub use crate::routes::{Navigator, ProtectedRoute, Route, RouteOutcome, RouteView};
    pub use crate::OptiExtract;
    pub use optiextract_session::{RenderDirective, SessionRecord, SessionStatus};
}
