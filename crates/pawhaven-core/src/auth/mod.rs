//! Account flows and credential inspection.
//!
//! This module provides:
//! - `Authenticator`: login, registration, logout and password reset
//! - `TokenClaims`: unverified reads of a JWT credential's payload
//! - form validation shared by the account flows

pub mod claims;
pub mod flows;
pub mod validation;

pub use claims::TokenClaims;
pub use flows::{AuthFlowError, Authenticator};
pub use validation::ValidationError;
