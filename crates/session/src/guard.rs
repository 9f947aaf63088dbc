//! Gatekeeper for protected content
//!
//! [`SessionGuard::evaluate`] reads the persisted record, inspects the access
//! token's expiry, refreshes it at most once, and answers with a
//! [`RenderDirective`]. It never returns an error: every failure ends in a
//! cleared record, a notice, and a redirect.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::api::TokenRefresher;
use crate::notify::{LogNotifier, Notice, Notifier};
use crate::record::SessionStatus;
use crate::store::SessionStore;
use crate::token::{decode_claims, is_expired, Clock, SystemClock};
use crate::SessionError;

/// What the caller should do once evaluation settles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDirective {
    Render,
    RedirectToLogin,
    RedirectToSessionExpired,
}

/// Why access was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No record, or a record lacking one of the tokens
    MissingSession,
    /// The access token could not be decoded
    MalformedToken,
    /// The refresh endpoint answered with an error or an unusable body
    RefreshRejected,
    /// The refresh endpoint could not be reached
    NetworkFailure,
    /// Anything else, including a panic inside evaluation
    Unexpected,
}

impl DenyReason {
    pub fn directive(self) -> RenderDirective {
        match self {
            Self::RefreshRejected | Self::NetworkFailure => RenderDirective::RedirectToSessionExpired,
            Self::MissingSession | Self::MalformedToken | Self::Unexpected => {
                RenderDirective::RedirectToLogin
            }
        }
    }

    fn status(self) -> SessionStatus {
        match self {
            Self::RefreshRejected | Self::NetworkFailure => SessionStatus::Expired,
            Self::MissingSession | Self::MalformedToken | Self::Unexpected => SessionStatus::Invalid,
        }
    }
}

pub struct SessionGuard {
    store: SessionStore,
    refresher: Arc<dyn TokenRefresher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    expired_notice_duration: Duration,
    status: watch::Sender<SessionStatus>,
    torn_down: AtomicBool,
}

impl SessionGuard {
    pub fn new(store: SessionStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        let (status, _) = watch::channel(SessionStatus::Unknown);
        Self {
            store,
            refresher,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            expired_notice_duration: Duration::from_secs(3),
            status,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// How long the "session expired" notice stays visible
    pub fn with_expired_notice_duration(mut self, duration: Duration) -> Self {
        self.expired_notice_duration = duration;
        self
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Receiver for status transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Mark the owning view as gone. An evaluation still in flight finishes
    /// without touching the persisted record.
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Decide whether protected content may render
    ///
    /// Dropping the returned future abandons the evaluation; store writes
    /// only happen after the final await point, so an abandoned evaluation
    /// leaves the record as it was.
    pub async fn evaluate(&self) -> RenderDirective {
        self.set_status(SessionStatus::Unknown);

        let outcome = AssertUnwindSafe(self.resolve()).catch_unwind().await;
        let result = outcome.unwrap_or_else(|_| {
            warn!("Session evaluation panicked");
            Err(DenyReason::Unexpected)
        });

        match result {
            Ok(()) => {
                self.set_status(SessionStatus::Valid);
                RenderDirective::Render
            }
            Err(reason) => self.deny(reason),
        }
    }

    async fn resolve(&self) -> Result<(), DenyReason> {
        let mut record = match self.store.load() {
            Ok(Some(record)) if record.is_complete() => record,
            Ok(Some(_)) => {
                debug!("Session record is incomplete");
                return Err(DenyReason::MissingSession);
            }
            Ok(None) => {
                debug!("No session record");
                return Err(DenyReason::MissingSession);
            }
            Err(SessionError::Serialization(e)) => {
                warn!("Stored session record is unreadable: {}", e);
                return Err(DenyReason::MissingSession);
            }
            Err(e) => {
                warn!("Failed to read session record: {}", e);
                return Err(DenyReason::Unexpected);
            }
        };

        // is_complete() guarantees both tokens
        let (access_token, refresh_token) = match (&record.token, &record.refresh_token) {
            (Some(access), Some(refresh)) => (access.clone(), refresh.clone()),
            _ => return Err(DenyReason::MissingSession),
        };

        let claims = decode_claims(&access_token).map_err(|e| {
            warn!("Access token could not be decoded: {}", e);
            DenyReason::MalformedToken
        })?;

        let now = self.clock.now_unix();
        if !is_expired(&claims, now) {
            debug!("Access token valid for another {}s", claims.exp - now);
            return Ok(());
        }

        info!("Access token expired at {} (now {}), refreshing", claims.exp, now);
        self.set_status(SessionStatus::Refreshing);

        let tokens = self.refresher.refresh(&refresh_token).await.map_err(|e| {
            warn!("Token refresh failed: {}", e);
            match e {
                SessionError::Network(ref err) if !err.is_decode() => DenyReason::NetworkFailure,
                _ => DenyReason::RefreshRejected,
            }
        })?;

        if self.is_torn_down() {
            debug!("Guard torn down during refresh; not persisting new tokens");
            return Ok(());
        }

        record.apply_refresh(tokens);
        self.store.save(&record).map_err(|e| {
            warn!("Failed to persist refreshed session: {}", e);
            DenyReason::Unexpected
        })?;

        info!("Access token refreshed");
        Ok(())
    }

    fn deny(&self, reason: DenyReason) -> RenderDirective {
        self.set_status(reason.status());

        if self.is_torn_down() {
            debug!("Guard torn down; leaving session record untouched ({:?})", reason);
            return reason.directive();
        }

        self.store.clear_quietly();

        let notice = match reason {
            DenyReason::MissingSession => Notice::sign_in_required(),
            DenyReason::MalformedToken | DenyReason::Unexpected => Notice::invalid_session(),
            DenyReason::RefreshRejected | DenyReason::NetworkFailure => {
                Notice::session_expired(self.expired_notice_duration)
            }
        };
        self.notifier.notify(notice);

        info!("Access denied: {:?}", reason);
        reason.directive()
    }

    fn set_status(&self, status: SessionStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!("Session status {:?} -> {:?}", previous, status);
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("store", &self.store)
            .field("status", &self.status())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
