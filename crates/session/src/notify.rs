//! User-visible notifications

use std::time::Duration;

use log::{error, info, trace};
use tokio::sync::mpsc;

pub const SIGN_IN_REQUIRED: &str = "Please sign in to continue.";
pub const INVALID_SESSION: &str = "Invalid session. Please sign in again.";
pub const SESSION_EXPIRED: &str = "Your session has expired.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A toast-style message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// How long the message stays up; `None` leaves it to the UI default
    pub duration: Option<Duration>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            duration: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            duration: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn sign_in_required() -> Self {
        Self::info(SIGN_IN_REQUIRED)
    }

    pub fn invalid_session() -> Self {
        Self::error(INVALID_SESSION)
    }

    pub fn session_expired(duration: Duration) -> Self {
        Self::error(SESSION_EXPIRED).with_duration(duration)
    }
}

/// Fire-and-forget notification sink; must never block the caller
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => error!("{}", notice.message),
            NoticeLevel::Info | NoticeLevel::Success => info!("{}", notice.message),
        }
    }
}

/// Hands notices to whoever drains the receiving half
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // Nobody listening is not an error for a toast
        if let Err(e) = self.tx.send(notice) {
            trace!("Dropped notice, receiver gone: {}", e.0.message);
        }
    }
}
