//! Core library for the PawHaven pet adoption client.
//!
//! This crate owns the client-side session lifecycle:
//!
//! - [`session::SessionStore`]: durable (credential, expiry) pair
//! - [`session::SessionMonitor`]: timed expiry check and renewal warning
//! - [`session::RouteGuard`]: gate in front of protected views
//! - [`session::RenewalFlow`]: token refresh against the auth service
//!
//! plus the HTTP clients for the PawHaven API ([`api`]), the account flows
//! that populate the session ([`auth`]) and client configuration
//! ([`config`]).

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod models;
pub mod session;
pub mod testing;

pub use api::{ApiClient, ApiError, AuthService, HttpAuthService};
pub use auth::{Authenticator, TokenClaims};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, StorageKind};
pub use session::{
    Access, Credential, MonitorEvent, MonitorHandle, MonitorState, RenewalError, RenewalFlow,
    RenewalState, RouteGuard, Session, SessionMonitor, SessionStore,
};
