//! Client-side session lifecycle.
//!
//! This module provides:
//! - `SessionStore`: the persisted (credential, expiry) pair over a
//!   pluggable `StorageBackend`
//! - `SessionMonitor`: 1 s expiry checks, renewal warning, forced clear
//! - `RouteGuard`: redirect to login when no valid session exists
//! - `RenewalFlow`: refresh-token exchange with no retry on failure
//!
//! Sessions are created by the account flows in `crate::auth`, replaced by
//! renewal, and destroyed on logout, renewal failure or expiry.

pub mod backend;
pub mod guard;
pub mod monitor;
pub mod renewal;
pub mod store;

pub use backend::{FileBackend, KeyringBackend, MemoryBackend, StorageBackend, StoreError};
pub use guard::{Access, Guarded, Redirect, RouteGuard};
pub use monitor::{
    MonitorConfig, MonitorEvent, MonitorHandle, MonitorState, MonitorStatus, SessionMonitor,
    Transition,
};
pub use renewal::{RenewalError, RenewalFlow, RenewalState};
pub use store::{Credential, Session, SessionStore};
