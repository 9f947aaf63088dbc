//! Application routes and the protected-route wrapper

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::time::sleep;

use optiextract_session::{RenderDirective, SessionGuard, SessionStore};

/// Every view the application can navigate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    VerifyEmail,
    ResetPassword,
    SessionExpired,
    Dashboard,
    Documents,
    DocumentReview,
    Templates,
    CreateTemplate,
    ParsingStatus,
    Upload,
    UploadBulk,
    UploadSingle,
}

impl Route {
    pub const ALL: [Route; 14] = [
        Route::Login,
        Route::Register,
        Route::VerifyEmail,
        Route::ResetPassword,
        Route::SessionExpired,
        Route::Dashboard,
        Route::Documents,
        Route::DocumentReview,
        Route::Templates,
        Route::CreateTemplate,
        Route::ParsingStatus,
        Route::Upload,
        Route::UploadBulk,
        Route::UploadSingle,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/auth/login",
            Route::Register => "/auth/register",
            Route::VerifyEmail => "/auth/verify-email",
            Route::ResetPassword => "/auth/reset-password",
            Route::SessionExpired => "/session-expired",
            Route::Dashboard => "/dashboard",
            Route::Documents => "/documents",
            Route::DocumentReview => "/documents/review",
            Route::Templates => "/templates",
            Route::CreateTemplate => "/templates/create",
            Route::ParsingStatus => "/templates/processing-status",
            Route::Upload => "/document/upload",
            Route::UploadBulk => "/document/upload/bulk",
            Route::UploadSingle => "/document/upload/single",
        }
    }

    /// Resolve a path; the bare root shows the dashboard
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Some(Route::Dashboard);
        }
        Route::ALL.into_iter().find(|route| route.path() == trimmed)
    }

    /// Whether the route sits behind the session guard
    pub fn is_protected(self) -> bool {
        !matches!(
            self,
            Route::Login
                | Route::Register
                | Route::VerifyEmail
                | Route::ResetPassword
                | Route::SessionExpired
        )
    }

    /// Destination for a denial, `None` when content may render
    pub fn for_directive(directive: RenderDirective) -> Option<Route> {
        match directive {
            RenderDirective::Render => None,
            RenderDirective::RedirectToLogin => Some(Route::Login),
            RenderDirective::RedirectToSessionExpired => Some(Route::SessionExpired),
        }
    }
}

/// Performs navigation on behalf of the library
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only remembers where it was sent
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Route> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn current(&self) -> Option<Route> {
        self.history().last().copied()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        info!("Navigating to {}", route.path());
        if let Ok(mut history) = self.history.lock() {
            history.push(route);
        }
    }
}

/// Where to send a visitor of the bare root path
pub fn landing_route(store: &SessionStore) -> Route {
    match store.load() {
        Ok(Some(record)) if record.is_complete() => Route::Dashboard,
        _ => Route::Login,
    }
}

/// What a protected view should currently show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteView {
    /// Guard still running; nothing interactive may show
    Loading,
    Content,
    Redirecting(Route),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome<T> {
    Rendered(T),
    Redirected(Route),
}

/// Runs the session guard before any protected content
pub struct ProtectedRoute {
    guard: SessionGuard,
    navigator: Arc<dyn Navigator>,
    redirect_delay: Duration,
    view: watch::Sender<RouteView>,
}

impl ProtectedRoute {
    pub fn new(guard: SessionGuard, navigator: Arc<dyn Navigator>, redirect_delay: Duration) -> Self {
        let (view, _) = watch::channel(RouteView::Loading);
        Self {
            guard,
            navigator,
            redirect_delay,
            view,
        }
    }

    pub fn guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn view(&self) -> RouteView {
        *self.view.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RouteView> {
        self.view.subscribe()
    }

    /// The view is going away; see [`SessionGuard::teardown`]
    pub fn teardown(&self) {
        self.guard.teardown();
    }

    /// Evaluate the session, then either produce the content or redirect
    ///
    /// `content` is not called until evaluation, including any refresh, has
    /// finished with [`RenderDirective::Render`]. Redirects wait for the
    /// configured delay so the denial notice can be read, then always happen.
    pub async fn enter<F, Fut, T>(&self, content: F) -> RouteOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.view.send_replace(RouteView::Loading);

        let directive = self.guard.evaluate().await;
        match Route::for_directive(directive) {
            None => {
                self.view.send_replace(RouteView::Content);
                RouteOutcome::Rendered(content().await)
            }
            Some(route) => {
                self.view.send_replace(RouteView::Redirecting(route));
                if !self.redirect_delay.is_zero() {
                    debug!("Redirecting to {} in {:?}", route.path(), self.redirect_delay);
                    sleep(self.redirect_delay).await;
                }
                self.navigator.navigate(route);
                RouteOutcome::Redirected(route)
            }
        }
    }
}

impl std::fmt::Debug for ProtectedRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedRoute")
            .field("guard", &self.guard)
            .field("redirect_delay", &self.redirect_delay)
            .field("view", &self.view())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optiextract_session::{MemoryStore, SessionRecord};

    #[test]
    fn test_paths_roundtrip() {
        for route in Route::ALL {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
        assert_eq!(Route::from_path("/"), Some(Route::Dashboard));
        assert_eq!(Route::from_path("/templates/"), Some(Route::Templates));
        assert_eq!(
            Route::from_path("/auth/verify-email?token=abc"),
            Some(Route::VerifyEmail)
        );
        assert_eq!(Route::from_path("/nowhere"), None);
    }

    #[test]
    fn test_protection() {
        assert!(!Route::Login.is_protected());
        assert!(!Route::SessionExpired.is_protected());
        assert!(Route::Dashboard.is_protected());
        assert!(Route::UploadBulk.is_protected());
    }

    #[test]
    fn test_landing_route() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(landing_route(&store), Route::Login);

        store
            .save(&SessionRecord {
                token: Some("T1".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(landing_route(&store), Route::Login);

        store.save(&SessionRecord::new("T1", "R1")).unwrap();
        assert_eq!(landing_route(&store), Route::Dashboard);
    }

    #[test]
    fn test_recording_navigator() {
        let navigator = RecordingNavigator::new();
        assert_eq!(navigator.current(), None);
        navigator.navigate(Route::Login);
        navigator.navigate(Route::Dashboard);
        assert_eq!(navigator.history(), vec![Route::Login, Route::Dashboard]);
        assert_eq!(navigator.current(), Some(Route::Dashboard));
    }
}
