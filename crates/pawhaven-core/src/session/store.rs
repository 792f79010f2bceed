//! The session store: single accessor for the persisted (credential, expiry)
//! pair.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{MemoryBackend, StorageBackend, StoreError};
use crate::auth::TokenClaims;

/// Storage key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// Storage key holding the expiry as epoch milliseconds
pub const EXPIRY_KEY: &str = "tokenExpiry";

/// An opaque bearer token. `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            write!(f, "Credential(<{} chars>)", self.0.len())
        }
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub credential: Credential,
    pub expiry: DateTime<Utc>,
}

impl Session {
    pub fn new(credential: impl Into<Credential>, expiry: DateTime<Utc>) -> Self {
        Self {
            credential: credential.into(),
            expiry,
        }
    }

    /// Build the session for a freshly issued credential.
    ///
    /// The expiry is the token's own `exp` claim when it decodes to an
    /// instant after `issued_at`, otherwise `issued_at + validity_window`.
    pub fn issued(
        credential: impl Into<Credential>,
        issued_at: DateTime<Utc>,
        validity_window: Duration,
    ) -> Self {
        let credential = credential.into();
        let expiry = TokenClaims::decode(credential.as_str())
            .and_then(|claims| claims.expires_at())
            .filter(|exp| *exp > issued_at)
            .unwrap_or(issued_at + validity_window);
        Self { credential, expiry }
    }

    pub fn expiry_millis(&self) -> i64 {
        self.expiry.timestamp_millis()
    }

    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        self.expiry - now
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.credential.is_empty() && now < self.expiry
    }
}

/// Reads and writes the session pair through a [`StorageBackend`].
///
/// Clones share the same backend.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
}

impl SessionStore {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Persist the pair. The credential is written before the expiry, so an
    /// interrupted write can leave a credential without an expiry (read back
    /// as absent) but never the reverse.
    pub fn set_session(&self, session: &Session) -> Result<(), StoreError> {
        self.backend
            .set_item(TOKEN_KEY, session.credential.as_str())?;
        self.backend
            .set_item(EXPIRY_KEY, &session.expiry_millis().to_string())?;
        debug!(expiry = %session.expiry, "Session stored");
        Ok(())
    }

    /// Read the pair back. Missing, unreadable or unparsable entries all
    /// mean "no session".
    pub fn get_session(&self) -> Option<Session> {
        let token = self.read(TOKEN_KEY)?;
        let raw_expiry = self.read(EXPIRY_KEY)?;
        if token.is_empty() {
            return None;
        }
        let expiry = match raw_expiry
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
        {
            Some(expiry) => expiry,
            None => {
                warn!(value = %raw_expiry, "Ignoring unparsable session expiry");
                return None;
            }
        };
        Some(Session::new(token, expiry))
    }

    /// Remove both entries, expiry first, so an interrupted clear leaves
    /// at most a bare credential (read back as absent). Clearing an empty
    /// store is a no-op.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.backend.remove_item(EXPIRY_KEY)?;
        self.backend.remove_item(TOKEN_KEY)?;
        debug!("Session cleared");
        Ok(())
    }

    /// The stored session, only if it is still valid at `now`.
    pub fn current(&self, now: DateTime<Utc>) -> Option<Session> {
        self.get_session().filter(|s| s.is_valid_at(now))
    }

    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.current(now).is_some()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, key, "Failed to read session storage");
                None
            }
        }
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}
