//! Exchanging a soon-to-expire credential for a fresh one.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backend::StoreError;
use super::store::{Credential, Session, SessionStore};
use crate::api::{ApiError, AuthService};
use crate::clock::Clock;

/// Where the renewal dialog stands. In memory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum RenewalState {
    #[default]
    Idle,
    WarningShown,
    Renewing,
    Failed,
}

#[derive(Error, Debug)]
pub enum RenewalError {
    /// Renewal was asked for without a credential. A caller bug.
    #[error("Renewal requested without a credential")]
    InvalidState,

    /// Another renewal is still outstanding.
    #[error("A renewal is already in progress")]
    InProgress,

    #[error("Could not reach the authentication service: {0}")]
    Transport(#[source] ApiError),

    #[error("Authentication service rejected the renewal: {0}")]
    Rejected(#[source] ApiError),

    #[error("Renewed session could not be stored: {0}")]
    Storage(#[from] StoreError),

    #[error("Renewal task ended unexpectedly: {0}")]
    Interrupted(String),

    /// The stored session changed (logout, or a new login) while the
    /// exchange was outstanding. Its outcome was discarded.
    #[error("Session changed during renewal")]
    Superseded,
}

impl RenewalError {
    fn from_api(error: ApiError) -> Self {
        if error.is_transport() {
            RenewalError::Transport(error)
        } else {
            RenewalError::Rejected(error)
        }
    }

    /// HTTP status of a rejection, for diagnostics.
    pub fn status(&self) -> Option<u16> {
        match self {
            RenewalError::Rejected(e) => e.status(),
            _ => None,
        }
    }
}

/// Drives [`RenewalState`] and applies renewal outcomes to the store.
///
/// On success the new session replaces the old one; on any failure the
/// session is cleared and the state becomes `Failed`. There is no retry: the
/// server decides whether a credential is still good.
pub struct RenewalFlow {
    service: Arc<dyn AuthService>,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    validity_window: Duration,
    state: RenewalState,
    /// Credential the outstanding exchange was started from.
    pending: Option<Credential>,
}

impl RenewalFlow {
    pub fn new(
        service: Arc<dyn AuthService>,
        store: SessionStore,
        clock: Arc<dyn Clock>,
        validity_window: Duration,
    ) -> Self {
        Self {
            service,
            store,
            clock,
            validity_window,
            state: RenewalState::Idle,
            pending: None,
        }
    }

    pub fn state(&self) -> RenewalState {
        self.state
    }

    /// Idle -> WarningShown. Other states are left alone.
    pub fn show_warning(&mut self) {
        if self.state == RenewalState::Idle {
            self.state = RenewalState::WarningShown;
        }
    }

    /// WarningShown -> Idle, for when the session stopped being near expiry
    /// without this flow's help.
    pub fn dismiss_warning(&mut self) {
        if self.state == RenewalState::WarningShown {
            self.state = RenewalState::Idle;
        }
    }

    /// Back to Idle, abandoning any outstanding exchange.
    pub fn reset(&mut self) {
        self.state = RenewalState::Idle;
        self.pending = None;
    }

    /// Renew and apply the outcome.
    pub async fn renew(&mut self, credential: &Credential) -> Result<Session, RenewalError> {
        let exchange = self.begin(credential.clone())?;
        let outcome = exchange.await;
        self.finish(outcome)
    }

    /// Renew whatever credential the store currently holds.
    pub async fn renew_current(&mut self) -> Result<Session, RenewalError> {
        let credential = self
            .store
            .get_session()
            .map(|s| s.credential)
            .unwrap_or_else(|| Credential::new(""));
        self.renew(&credential).await
    }

    /// Enter `Renewing` and return the network exchange to run.
    ///
    /// Fails without touching the network for an empty credential, and
    /// while another exchange is outstanding. The returned future owns
    /// everything it needs so it can be spawned; its result must be handed
    /// back to [`RenewalFlow::finish`].
    pub fn begin(
        &mut self,
        credential: Credential,
    ) -> Result<impl Future<Output = Result<Session, RenewalError>> + Send + 'static, RenewalError>
    {
        if credential.is_empty() {
            warn!("Renewal requested with an empty credential");
            return Err(RenewalError::InvalidState);
        }
        if self.state == RenewalState::Renewing {
            return Err(RenewalError::InProgress);
        }
        self.state = RenewalState::Renewing;
        self.pending = Some(credential.clone());
        debug!("Renewal started");

        let service = Arc::clone(&self.service);
        let clock = Arc::clone(&self.clock);
        let window = self.validity_window;
        Ok(async move {
            let fresh = service
                .refresh_token(&credential)
                .await
                .map_err(RenewalError::from_api)?;
            Ok(Session::issued(fresh, clock.now(), window))
        })
    }

    /// Apply the result of an exchange started with [`RenewalFlow::begin`].
    ///
    /// The outcome only applies while the store still holds the credential
    /// the exchange started from. Otherwise nothing is written or cleared,
    /// the state returns to `Idle` and the result is `Superseded`.
    pub fn finish(
        &mut self,
        outcome: Result<Session, RenewalError>,
    ) -> Result<Session, RenewalError> {
        let started_from = self.pending.take();
        let current = self.store.get_session().map(|s| s.credential);
        if started_from.is_none() || current != started_from {
            debug!("Stored session changed during renewal, discarding the outcome");
            self.state = RenewalState::Idle;
            return Err(RenewalError::Superseded);
        }

        let stored = outcome.and_then(|session| {
            self.store.set_session(&session)?;
            Ok(session)
        });

        match stored {
            Ok(session) => {
                self.state = RenewalState::Idle;
                info!(expiry = %session.expiry, "Session renewed");
                Ok(session)
            }
            Err(error) => {
                match &error {
                    RenewalError::Transport(e) => warn!(error = %e, "Renewal failed: transport"),
                    RenewalError::Rejected(e) => {
                        warn!(error = %e, status = ?e.status(), "Renewal failed: rejected")
                    }
                    other => warn!(error = %other, "Renewal failed"),
                }
                if let Err(e) = self.store.clear_session() {
                    warn!(error = %e, "Failed to clear session after renewal failure");
                }
                self.state = RenewalState::Failed;
                Err(error)
            }
        }
    }
}
