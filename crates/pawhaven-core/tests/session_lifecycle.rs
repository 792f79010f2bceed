//! End-to-end tests for the running session monitor.
//!
//! Tokio time is paused so the interval is driven deterministically; the
//! session clock is a `ManualClock` moved alongside it.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::time::{sleep, timeout};

use pawhaven_core::session::{MonitorConfig, MonitorStatus};
use pawhaven_core::testing::MockAuthService;
use pawhaven_core::{
    Clock, ManualClock, MonitorEvent, MonitorHandle, MonitorState, RenewalError, RenewalFlow,
    RenewalState, RouteGuard, Session, SessionMonitor, SessionStore,
};

struct Harness {
    store: SessionStore,
    clock: ManualClock,
    service: MockAuthService,
    guard: RouteGuard,
}

impl Harness {
    fn new(service: MockAuthService) -> Self {
        let store = SessionStore::in_memory();
        let clock = ManualClock::default();
        let guard = RouteGuard::new(store.clone(), Arc::new(clock.clone()));
        Self {
            store,
            clock,
            service,
            guard,
        }
    }

    fn with_session(self, expires_in: Duration) -> Self {
        self.store
            .set_session(&Session::new("tok-1", self.clock.now() + expires_in))
            .unwrap();
        self
    }

    fn start(&self, auto_renew: bool) -> MonitorHandle {
        let clock = Arc::new(self.clock.clone());
        let renewal = RenewalFlow::new(
            Arc::new(self.service.clone()),
            self.store.clone(),
            clock.clone(),
            Duration::hours(1),
        );
        let config = MonitorConfig {
            auto_renew,
            ..MonitorConfig::default()
        };
        SessionMonitor::new(self.store.clone(), clock, config).start(renewal)
    }

    /// Move the session clock and let the monitor tick once per second
    /// covered.
    async fn elapse(&self, by: StdDuration) {
        self.clock.advance(Duration::from_std(by).unwrap());
        sleep(by + StdDuration::from_millis(10)).await;
    }
}

/// Let spawned tasks run without crossing a tick boundary.
async fn settle() {
    sleep(StdDuration::from_millis(10)).await;
}

async fn next(handle: &mut MonitorHandle) -> MonitorEvent {
    timeout(StdDuration::from_secs(30), handle.next_event())
        .await
        .expect("monitor event within 30s")
        .expect("monitor still running")
}

#[tokio::test(start_paused = true)]
async fn test_expired_session_is_cleared_on_first_tick() {
    let h = Harness::new(MockAuthService::refreshing_to("tok-2"))
        .with_session(Duration::milliseconds(-1));

    let mut handle = h.start(false);
    let event = next(&mut handle).await;

    assert!(matches!(event, MonitorEvent::Expired));
    assert!(h.store.get_session().is_none());
    assert_eq!(handle.state(), MonitorState::Expired);

    let redirect = h.guard.reevaluate(&event, "/profile").unwrap();
    assert_eq!(redirect.to, "/auth/login");
    assert_eq!(redirect.from, "/profile");
    assert_eq!(h.service.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_expires_while_mounted() {
    let h = Harness::new(MockAuthService::refreshing_to("tok-2"))
        .with_session(Duration::seconds(3));
    let mut handle = h.start(false);

    // Already inside the warning window when mounted.
    assert!(matches!(
        next(&mut handle).await,
        MonitorEvent::WarningRaised { .. }
    ));
    assert!(h.guard.check("/profile").is_granted());

    h.elapse(StdDuration::from_secs(3)).await;

    assert!(matches!(handle.try_next_event(), Some(MonitorEvent::Expired)));
    assert!(!h.guard.check("/profile").is_granted());
}

#[tokio::test(start_paused = true)]
async fn test_warning_raised_once_per_crossing() {
    let h = Harness::new(MockAuthService::refreshing_to("tok-2"))
        .with_session(Duration::minutes(6));
    let mut handle = h.start(false);
    settle().await;
    assert!(handle.try_next_event().is_none());

    h.elapse(StdDuration::from_secs(60)).await;
    match handle.try_next_event() {
        Some(MonitorEvent::WarningRaised { remaining }) => {
            assert!(remaining <= Duration::minutes(5));
            assert!(remaining > Duration::minutes(4));
        }
        other => panic!("expected a warning, got {:?}", other),
    }

    h.elapse(StdDuration::from_secs(10)).await;
    assert!(handle.try_next_event().is_none());
    assert_eq!(
        handle.status(),
        MonitorStatus {
            monitor: MonitorState::WarningShown,
            renewal: RenewalState::WarningShown,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_auto_renew_replaces_session() {
    let h = Harness::new(MockAuthService::refreshing_to("tok-2"))
        .with_session(Duration::minutes(4));
    let mut handle = h.start(true);

    assert!(matches!(
        next(&mut handle).await,
        MonitorEvent::WarningRaised { .. }
    ));
    let expiry = match next(&mut handle).await {
        MonitorEvent::Renewed { expiry } => expiry,
        other => panic!("expected renewal, got {:?}", other),
    };

    let session = h.store.get_session().unwrap();
    assert_eq!(session.credential.as_str(), "tok-2");
    assert_eq!(session.expiry, h.clock.now() + Duration::hours(1));
    assert_eq!(session.expiry, expiry);
    assert_eq!(h.service.refresh_calls(), 1);
    assert_eq!(h.service.last_refresh_credential().as_deref(), Some("tok-1"));
    assert_eq!(handle.renewal_state(), RenewalState::Idle);
    assert_eq!(handle.state(), MonitorState::Idle);

    // The renewed session is healthy: no further events.
    h.elapse(StdDuration::from_secs(5)).await;
    assert!(handle.try_next_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_renewal_clears_session() {
    let h = Harness::new(MockAuthService::rejecting(401)).with_session(Duration::minutes(4));
    let mut handle = h.start(true);

    assert!(matches!(
        next(&mut handle).await,
        MonitorEvent::WarningRaised { .. }
    ));
    let event = next(&mut handle).await;
    match &event {
        MonitorEvent::RenewalFailed { error } => {
            assert!(matches!(error, RenewalError::Rejected(_)));
            assert_eq!(error.status(), Some(401));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    assert!(h.store.get_session().is_none());
    assert_eq!(handle.renewal_state(), RenewalState::Failed);
    assert_eq!(handle.state(), MonitorState::Expired);
    assert!(h.guard.reevaluate(&event, "/pets/7").is_some());

    // No retry on later ticks.
    h.elapse(StdDuration::from_secs(5)).await;
    assert_eq!(h.service.refresh_calls(), 1);
    assert!(handle.try_next_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_service_is_a_transport_failure() {
    let h = Harness::new(MockAuthService::unreachable()).with_session(Duration::minutes(4));
    let mut handle = h.start(true);

    let _warning = next(&mut handle).await;
    match next(&mut handle).await {
        MonitorEvent::RenewalFailed { error } => {
            assert!(matches!(error, RenewalError::Transport(_)));
            assert_eq!(error.status(), None);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(h.store.get_session().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fresh_login_restarts_monitor_after_failure() {
    let h = Harness::new(MockAuthService::rejecting(401)).with_session(Duration::minutes(4));
    let mut handle = h.start(true);
    let _warning = next(&mut handle).await;
    let _failed = next(&mut handle).await;

    h.store
        .set_session(&Session::new("tok-3", h.clock.now() + Duration::hours(1)))
        .unwrap();
    h.elapse(StdDuration::from_secs(1)).await;

    assert_eq!(
        handle.status(),
        MonitorStatus {
            monitor: MonitorState::Idle,
            renewal: RenewalState::Idle,
        }
    );
    assert!(h.guard.check("/profile").is_granted());
}

#[tokio::test(start_paused = true)]
async fn test_confirmed_renewal_is_not_duplicated() {
    let service = MockAuthService::refreshing_to("tok-2").with_delay(StdDuration::from_secs(5));
    let h = Harness::new(service).with_session(Duration::minutes(4));
    let mut handle = h.start(false);

    assert!(matches!(
        next(&mut handle).await,
        MonitorEvent::WarningRaised { .. }
    ));
    assert_eq!(handle.renewal_state(), RenewalState::WarningShown);

    assert!(handle.request_renewal());
    settle().await;
    assert_eq!(handle.renewal_state(), RenewalState::Renewing);

    assert!(handle.request_renewal());
    settle().await;
    assert_eq!(h.service.refresh_calls(), 1);

    assert!(matches!(
        next(&mut handle).await,
        MonitorEvent::Renewed { .. }
    ));
    assert_eq!(h.service.refresh_calls(), 1);
    assert_eq!(handle.renewal_state(), RenewalState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_without_session_makes_no_call() {
    let h = Harness::new(MockAuthService::refreshing_to("tok-2"));
    let mut handle = h.start(false);

    assert!(handle.request_renewal());
    match next(&mut handle).await {
        MonitorEvent::RenewalFailed { error } => {
            assert!(matches!(error, RenewalError::InvalidState))
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.service.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_during_renewal_discards_result() {
    let service = MockAuthService::refreshing_to("tok-2").with_delay(StdDuration::from_secs(10));
    let h = Harness::new(service).with_session(Duration::minutes(2));
    let mut handle = h.start(false);
    let _warning = next(&mut handle).await;

    assert!(handle.request_renewal());
    settle().await;
    assert_eq!(handle.renewal_state(), RenewalState::Renewing);

    h.elapse(StdDuration::from_secs(120)).await;
    assert!(matches!(handle.try_next_event(), Some(MonitorEvent::Expired)));
    assert_eq!(handle.renewal_state(), RenewalState::Idle);

    // The detached exchange finishes but nobody stores its credential.
    sleep(StdDuration::from_secs(15)).await;
    assert_eq!(h.service.refresh_calls(), 1);
    assert!(h.store.get_session().is_none());
    assert!(handle.try_next_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_the_timer() {
    let h = Harness::new(MockAuthService::refreshing_to("tok-2"));
    let handle = h.start(false);
    settle().await;
    assert!(handle.is_running());

    handle.stop().await;

    h.store
        .set_session(&Session::new("tok-1", h.clock.now() - Duration::seconds(1)))
        .unwrap();
    sleep(StdDuration::from_secs(5)).await;
    assert!(h.store.get_session().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_handle_unmounts() {
    let h = Harness::new(MockAuthService::refreshing_to("tok-2"));
    let handle = h.start(false);
    settle().await;
    drop(handle);
    settle().await;

    h.store
        .set_session(&Session::new("tok-1", h.clock.now() - Duration::seconds(1)))
        .unwrap();
    sleep(StdDuration::from_secs(5)).await;
    assert!(h.store.get_session().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_unmount_during_renewal_discards_result() {
    let service = MockAuthService::refreshing_to("tok-2").with_delay(StdDuration::from_secs(5));
    let h = Harness::new(service).with_session(Duration::minutes(4));
    let mut handle = h.start(false);
    let _warning = next(&mut handle).await;

    assert!(handle.request_renewal());
    settle().await;
    assert_eq!(handle.renewal_state(), RenewalState::Renewing);

    handle.stop().await;
    sleep(StdDuration::from_secs(6)).await;

    assert_eq!(h.service.refresh_calls(), 1);
    let session = h.store.get_session().unwrap();
    assert_eq!(session.credential.as_str(), "tok-1");
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_renewal_stays_logged_out() {
    let service = MockAuthService::refreshing_to("tok-2").with_delay(StdDuration::from_secs(5));
    let h = Harness::new(service).with_session(Duration::minutes(4));
    let mut handle = h.start(false);
    let _warning = next(&mut handle).await;

    assert!(handle.request_renewal());
    settle().await;
    h.store.clear_session().unwrap();
    sleep(StdDuration::from_secs(6)).await;

    assert_eq!(h.service.refresh_calls(), 1);
    assert!(h.store.get_session().is_none());
    assert_eq!(handle.renewal_state(), RenewalState::Idle);
    assert!(handle.try_next_event().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_renewal_failure_keeps_fresh_login() {
    let service = MockAuthService::rejecting(401).with_delay(StdDuration::from_secs(5));
    let h = Harness::new(service).with_session(Duration::minutes(4));
    let mut handle = h.start(false);
    let _warning = next(&mut handle).await;

    assert!(handle.request_renewal());
    settle().await;
    let fresh = Session::new("tok-fresh", h.clock.now() + Duration::hours(1));
    h.store.set_session(&fresh).unwrap();
    sleep(StdDuration::from_secs(6)).await;

    assert_eq!(h.store.get_session(), Some(fresh));
    assert!(h.guard.check("/profile").is_granted());
    assert_eq!(
        handle.status(),
        MonitorStatus {
            monitor: MonitorState::Idle,
            renewal: RenewalState::Idle,
        }
    );
    assert!(handle.try_next_event().is_none());
}
