//! HTTP clients for the PawHaven API.
//!
//! - `AuthService` / `HttpAuthService`: login, registration, password reset
//!   and token refresh
//! - `ApiClient`: bearer-authorized calls for the protected areas
//!
//! The API uses JWT bearer tokens issued by the login, registration and
//! refresh endpoints.

pub mod client;
pub mod error;
pub mod service;

pub use client::ApiClient;
pub use error::ApiError;
pub use service::{http_client, AuthService, HttpAuthService};
