//! Timed expiry checks for the active session.
//!
//! [`SessionMonitor`] is the synchronous state machine: every
//! [`SessionMonitor::tick`] takes one timestamp, compares it with the stored
//! expiry and moves between `Idle`, `WarningShown` and `Expired`.
//!
//! [`SessionMonitor::start`] runs it on a tokio interval for as long as the
//! returned [`MonitorHandle`] lives. Dropping the handle (the owning view
//! unmounting, on any exit path) stops the timer. Events reach the view over
//! a bounded channel; renewals requested through the handle run as child
//! tasks and are applied by the monitor task itself.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::renewal::{RenewalError, RenewalFlow, RenewalState};
use super::store::{Credential, Session, SessionStore};
use crate::clock::Clock;

/// Default interval between expiry checks
pub const DEFAULT_TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Default lead time before expiry at which the renewal warning is raised
pub const DEFAULT_WARNING_THRESHOLD_MS: i64 = 300_000;

/// Buffer size for monitor events. Events are rare (a handful per session).
const EVENT_BUFFER_SIZE: usize = 16;

/// Buffer size for commands from the owning view.
const COMMAND_BUFFER_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum MonitorState {
    #[default]
    Idle,
    WarningShown,
    /// Terminal for the session that expired; a fresh session restarts at
    /// `Idle`.
    Expired,
}

/// State changes produced by a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Entered the warning window with this much time left.
    EnteredWarning { remaining: Duration },
    /// Left the warning window because the session was extended elsewhere.
    LeftWarning,
    /// The session expired and was cleared.
    Expired,
}

/// Notifications delivered to the owning view.
#[derive(Debug)]
pub enum MonitorEvent {
    WarningRaised { remaining: Duration },
    Expired,
    Renewed { expiry: DateTime<Utc> },
    RenewalFailed { error: RenewalError },
}

impl MonitorEvent {
    /// True when the view should route to the login entry point.
    pub fn ends_session(&self) -> bool {
        match self {
            MonitorEvent::Expired => true,
            MonitorEvent::RenewalFailed { error } => !matches!(
                error,
                RenewalError::InProgress | RenewalError::Superseded
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub tick_interval: StdDuration,
    pub warning_threshold: Duration,
    /// Start a renewal on entering the warning window instead of waiting
    /// for the user to confirm.
    pub auto_renew: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            warning_threshold: Duration::milliseconds(DEFAULT_WARNING_THRESHOLD_MS),
            auto_renew: false,
        }
    }
}

pub struct SessionMonitor {
    store: SessionStore,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    state: MonitorState,
    /// The session instance that expired; only a different one restarts us.
    ended: Option<Session>,
}

impl SessionMonitor {
    pub fn new(store: SessionStore, clock: Arc<dyn Clock>, config: MonitorConfig) -> Self {
        Self {
            store,
            clock,
            config,
            state: MonitorState::Idle,
            ended: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one check against a single snapshot of "now".
    ///
    /// No stored session means nothing to do. The warning transition fires
    /// once per crossing into the window.
    pub fn tick(&mut self) -> Option<Transition> {
        let now = self.clock.now();
        let session = self.store.get_session()?;

        if self.state == MonitorState::Expired {
            if self.ended.as_ref() == Some(&session) {
                // The clear on expiry did not stick; try again quietly.
                if let Err(e) = self.store.clear_session() {
                    warn!(error = %e, "Failed to clear expired session");
                }
                return None;
            }
            debug!("Fresh session observed, monitor restarted");
            self.state = MonitorState::Idle;
            self.ended = None;
        }

        let ms_left = session.time_left(now).num_milliseconds();
        trace!(ms_left, state = ?self.state, "Session tick");

        if ms_left <= 0 {
            if let Err(e) = self.store.clear_session() {
                warn!(error = %e, "Failed to clear expired session");
            }
            info!("Session expired");
            self.end(Some(session));
            return Some(Transition::Expired);
        }

        if ms_left <= self.config.warning_threshold.num_milliseconds() {
            if self.state == MonitorState::Idle {
                self.state = MonitorState::WarningShown;
                debug!(ms_left, "Session nearing expiry");
                return Some(Transition::EnteredWarning {
                    remaining: Duration::milliseconds(ms_left),
                });
            }
            return None;
        }

        if self.state == MonitorState::WarningShown {
            self.state = MonitorState::Idle;
            return Some(Transition::LeftWarning);
        }
        None
    }

    /// A renewal replaced the session.
    fn renewed(&mut self) {
        self.state = MonitorState::Idle;
        self.ended = None;
    }

    /// The session is gone (expired, or cleared after a failed renewal).
    fn end(&mut self, session: Option<Session>) {
        self.state = MonitorState::Expired;
        self.ended = session;
    }

    /// Spawn the monitor on the current tokio runtime.
    ///
    /// The first check runs immediately, then once per tick interval.
    pub fn start(self, renewal: RenewalFlow) -> MonitorHandle {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (status_tx, status_rx) = watch::channel(MonitorStatus {
            monitor: self.state,
            renewal: renewal.state(),
        });

        let task = tokio::spawn(
            MonitorTask {
                monitor: self,
                renewal,
                events: event_tx,
                status: status_tx,
                renewals: JoinSet::new(),
            }
            .run(command_rx),
        );
        info!("Session monitor started");

        MonitorHandle {
            commands: command_tx,
            events: event_rx,
            status: status_rx,
            task,
        }
    }
}

/// Snapshot of both state machines, published after every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct MonitorStatus {
    pub monitor: MonitorState,
    pub renewal: RenewalState,
}

#[derive(Debug)]
enum MonitorCommand {
    Renew,
}

struct MonitorTask {
    monitor: SessionMonitor,
    renewal: RenewalFlow,
    events: mpsc::Sender<MonitorEvent>,
    status: watch::Sender<MonitorStatus>,
    renewals: JoinSet<Result<Session, RenewalError>>,
}

impl MonitorTask {
    async fn run(mut self, mut commands: mpsc::Receiver<MonitorCommand>) {
        let mut interval = time::interval(self.monitor.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.on_tick(),
                command = commands.recv() => match command {
                    Some(MonitorCommand::Renew) => self.start_renewal(),
                    None => break,
                },
                Some(joined) = self.renewals.join_next() => {
                    let outcome = joined
                        .unwrap_or_else(|e| Err(RenewalError::Interrupted(e.to_string())));
                    self.on_renewal_finished(outcome);
                }
            }
            self.publish();
        }

        // The view is gone: let an outstanding exchange finish on its own,
        // but nobody applies its result.
        if !self.renewals.is_empty() {
            debug!("Detaching in-flight renewal");
            self.renewals.detach_all();
        }
        info!("Session monitor stopped");
    }

    fn on_tick(&mut self) {
        let was_ended = self.monitor.state() == MonitorState::Expired;
        let transition = self.monitor.tick();
        if was_ended && self.monitor.state() != MonitorState::Expired {
            self.renewal.reset();
        }

        match transition {
            Some(Transition::EnteredWarning { remaining }) => {
                self.renewal.show_warning();
                self.emit(MonitorEvent::WarningRaised { remaining });
                if self.monitor.config.auto_renew {
                    self.start_renewal();
                }
            }
            Some(Transition::LeftWarning) => self.renewal.dismiss_warning(),
            Some(Transition::Expired) => {
                if !self.renewals.is_empty() {
                    debug!("Session expired during renewal, discarding the exchange");
                    self.renewals.detach_all();
                }
                self.renewal.reset();
                self.emit(MonitorEvent::Expired);
            }
            None => {}
        }
    }

    fn start_renewal(&mut self) {
        // No session surfaces as InvalidState, without a network call.
        let credential = self
            .monitor
            .store
            .get_session()
            .map(|session| session.credential)
            .unwrap_or_else(|| Credential::new(""));

        match self.renewal.begin(credential) {
            Ok(exchange) => {
                self.renewals.spawn(exchange);
            }
            Err(RenewalError::InProgress) => {
                debug!("Renewal already in flight, ignoring request");
            }
            Err(error) => self.emit(MonitorEvent::RenewalFailed { error }),
        }
    }

    fn on_renewal_finished(&mut self, outcome: Result<Session, RenewalError>) {
        let previous = self.monitor.store.get_session();
        match self.renewal.finish(outcome) {
            Ok(session) => {
                self.monitor.renewed();
                self.emit(MonitorEvent::Renewed {
                    expiry: session.expiry,
                });
            }
            // The store moved on without us; the next tick picks it up.
            Err(RenewalError::Superseded) => {}
            Err(error) => {
                self.monitor.end(previous);
                self.emit(MonitorEvent::RenewalFailed { error });
            }
        }
    }

    fn emit(&self, event: MonitorEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!(error = %e, "Dropping monitor event");
        }
    }

    fn publish(&self) {
        self.status.send_replace(MonitorStatus {
            monitor: self.monitor.state(),
            renewal: self.renewal.state(),
        });
    }
}

/// A running monitor, owned by the view that mounted it.
///
/// Dropping the handle stops the timer. Use [`MonitorHandle::stop`] to also
/// wait for the task to wind down.
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    events: mpsc::Receiver<MonitorEvent>,
    status: watch::Receiver<MonitorStatus>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Ask for a renewal (the user confirmed the warning). Returns false if
    /// the monitor is no longer running or is saturated with requests.
    pub fn request_renewal(&self) -> bool {
        self.commands.try_send(MonitorCommand::Renew).is_ok()
    }

    /// Next pending event, without waiting.
    pub fn try_next_event(&mut self) -> Option<MonitorEvent> {
        self.events.try_recv().ok()
    }

    /// Wait for the next event. `None` once the monitor has stopped.
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        self.events.recv().await
    }

    pub fn status(&self) -> MonitorStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> MonitorState {
        self.status().monitor
    }

    pub fn renewal_state(&self) -> RenewalState {
        self.status().renewal
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the monitor and wait for its task to finish.
    pub async fn stop(self) {
        let MonitorHandle {
            commands, task, ..
        } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "Session monitor task failed");
        }
    }
}
