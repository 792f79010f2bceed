//! Access control in front of protected views.

use std::sync::Arc;

use serde::Serialize;

use super::monitor::MonitorEvent;
use super::store::{Session, SessionStore};
use crate::clock::Clock;

/// Default login entry point
pub const DEFAULT_LOGIN_PATH: &str = "/auth/login";

/// Where to send an unauthenticated visitor, and where they were going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Redirect {
    pub to: String,
    /// The originally requested location, so login can return there.
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted(Session),
    Redirect(Redirect),
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Access::Granted(_))
    }
}

/// Outcome of rendering through the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Rendered(T),
    Redirect(Redirect),
}

/// Synchronous gate: reads the store, never polls time on its own.
#[derive(Clone)]
pub struct RouteGuard {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    login_path: String,
}

impl RouteGuard {
    pub fn new(store: SessionStore, clock: Arc<dyn Clock>) -> Self {
        Self::with_login_path(store, clock, DEFAULT_LOGIN_PATH)
    }

    pub fn with_login_path(
        store: SessionStore,
        clock: Arc<dyn Clock>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            login_path: login_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Evaluate access to `requested` against the current session.
    pub fn check(&self, requested: &str) -> Access {
        match self.store.current(self.clock.now()) {
            Some(session) => Access::Granted(session),
            None => Access::Redirect(self.redirect(requested)),
        }
    }

    /// Render `view` if access is granted; otherwise hand back the redirect.
    pub fn guard<T>(&self, requested: &str, view: impl FnOnce(&Session) -> T) -> Guarded<T> {
        match self.check(requested) {
            Access::Granted(session) => Guarded::Rendered(view(&session)),
            Access::Redirect(redirect) => Guarded::Redirect(redirect),
        }
    }

    /// Re-evaluate after a monitor event. Only session-ending events can
    /// change the answer, and only when the store agrees the session is gone.
    pub fn reevaluate(&self, event: &MonitorEvent, requested: &str) -> Option<Redirect> {
        if !event.ends_session() {
            return None;
        }
        match self.check(requested) {
            Access::Granted(_) => None,
            Access::Redirect(redirect) => Some(redirect),
        }
    }

    fn redirect(&self, requested: &str) -> Redirect {
        Redirect {
            to: self.login_path.clone(),
            from: requested.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::RenewalError;
    use chrono::Duration;

    fn guard_with(offset: Option<Duration>) -> (RouteGuard, SessionStore, ManualClock) {
        let clock = ManualClock::default();
        let store = SessionStore::in_memory();
        if let Some(offset) = offset {
            store
                .set_session(&Session::new("tok-1", clock.now() + offset))
                .unwrap();
        }
        let guard = RouteGuard::new(store.clone(), Arc::new(clock.clone()));
        (guard, store, clock)
    }

    #[test]
    fn test_no_session_redirects_with_return_context() {
        let (guard, _, _) = guard_with(None);
        assert_eq!(
            guard.check("/profile"),
            Access::Redirect(Redirect {
                to: "/auth/login".to_string(),
                from: "/profile".to_string(),
            })
        );
    }

    #[test]
    fn test_valid_session_renders_content() {
        let (guard, _, _) = guard_with(Some(Duration::hours(1)));
        let rendered = guard.guard("/admin", |session| session.credential.as_str().len());
        assert_eq!(rendered, Guarded::Rendered(5));
    }

    #[test]
    fn test_expired_session_redirects_even_before_monitor_runs() {
        let (guard, _, _) = guard_with(Some(Duration::milliseconds(-1)));
        assert!(!guard.check("/profile").is_granted());
    }

    #[test]
    fn test_reevaluate_on_expired_event() {
        let (guard, store, _) = guard_with(Some(Duration::hours(1)));
        assert_eq!(guard.reevaluate(&MonitorEvent::Expired, "/profile"), None);

        store.clear_session().unwrap();
        let redirect = guard
            .reevaluate(&MonitorEvent::Expired, "/profile")
            .unwrap();
        assert_eq!(redirect.from, "/profile");

        let failed = MonitorEvent::RenewalFailed {
            error: RenewalError::InvalidState,
        };
        assert!(guard.reevaluate(&failed, "/pets/7").is_some());
    }

    #[test]
    fn test_custom_login_path() {
        let clock = ManualClock::default();
        let guard =
            RouteGuard::with_login_path(SessionStore::in_memory(), Arc::new(clock), "/login");
        match guard.check("/") {
            Access::Redirect(r) => assert_eq!(r.to, "/login"),
            Access::Granted(_) => panic!("expected redirect"),
        }
    }
}
