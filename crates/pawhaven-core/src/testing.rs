//! In-memory test double for the authentication service.
//!
//! `MockAuthService` answers every endpoint from canned responses and counts
//! calls, so session lifecycle tests can assert that no network call was
//! made. Clones share their counters.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::api::{ApiError, AuthService};
use crate::session::Credential;

#[derive(Debug, Clone)]
enum Reply {
    Token(String),
    Status(u16),
    Unreachable,
}

#[derive(Debug, Default)]
struct Calls {
    login: usize,
    register: usize,
    refresh: usize,
    other: usize,
    last_refresh_credential: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MockAuthService {
    reply: Reply,
    delay: Duration,
    calls: Arc<Mutex<Calls>>,
}

impl MockAuthService {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    /// Every token-issuing endpoint returns `token`.
    pub fn refreshing_to(token: &str) -> Self {
        Self::with_reply(Reply::Token(token.to_string()))
    }

    /// Every endpoint answers with HTTP `status` and an empty body.
    pub fn rejecting(status: u16) -> Self {
        Self::with_reply(Reply::Status(status))
    }

    /// Every endpoint fails before any response is received.
    pub fn unreachable() -> Self {
        Self::with_reply(Reply::Unreachable)
    }

    /// Make each call take `delay` (tokio time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.calls.lock().map(|c| c.refresh).unwrap_or(0)
    }

    pub fn login_calls(&self) -> usize {
        self.calls.lock().map(|c| c.login).unwrap_or(0)
    }

    pub fn register_calls(&self) -> usize {
        self.calls.lock().map(|c| c.register).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|c| c.login + c.register + c.refresh + c.other)
            .unwrap_or(0)
    }

    pub fn last_refresh_credential(&self) -> Option<String> {
        self.calls
            .lock()
            .ok()
            .and_then(|c| c.last_refresh_credential.clone())
    }

    fn record(&self, f: impl FnOnce(&mut Calls)) {
        if let Ok(mut calls) = self.calls.lock() {
            f(&mut calls);
        }
    }

    async fn answer(&self) -> Result<String, ApiError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Reply::Token(token) => Ok(token.clone()),
            Reply::Status(code) => {
                let status =
                    StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Err(ApiError::from_status(status, ""))
            }
            Reply::Unreachable => Err(transport_error()),
        }
    }
}

/// A reqwest error that never saw a response. Built from a request with an
/// unparsable URL, so nothing leaves the process.
fn transport_error() -> ApiError {
    match reqwest::Client::new().get("http://[unreachable").build() {
        Err(e) => ApiError::NetworkError(e),
        Ok(_) => ApiError::InvalidResponse("expected a request build error".to_string()),
    }
}

#[async_trait]
impl AuthService for MockAuthService {
    async fn login(&self, _email: &str, _password: &str) -> Result<Credential, ApiError> {
        self.record(|c| c.login += 1);
        self.answer().await.map(Credential::new)
    }

    async fn register(
        &self,
        _username: &str,
        _email: &str,
        _password: &str,
    ) -> Result<Credential, ApiError> {
        self.record(|c| c.register += 1);
        self.answer().await.map(Credential::new)
    }

    async fn verify_email(&self, _email: &str, _code: &str) -> Result<(), ApiError> {
        self.record(|c| c.other += 1);
        self.answer().await.map(|_| ())
    }

    async fn forgot_password(&self, _email: &str) -> Result<String, ApiError> {
        self.record(|c| c.other += 1);
        self.answer().await.map(|_| "Reset code sent".to_string())
    }

    async fn reset_password(
        &self,
        _email: &str,
        _token: &str,
        _new_password: &str,
    ) -> Result<(), ApiError> {
        self.record(|c| c.other += 1);
        self.answer().await.map(|_| ())
    }

    async fn refresh_token(&self, credential: &Credential) -> Result<Credential, ApiError> {
        let presented = credential.as_str().to_string();
        self.record(|c| {
            c.refresh += 1;
            c.last_refresh_credential = Some(presented);
        });
        self.answer().await.map(Credential::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_is_classified_as_transport() {
        let err = transport_error();
        assert!(err.is_transport());
        assert!(err.status().is_none());
    }

    #[tokio::test]
    async fn test_rejecting_maps_status() {
        let mock = MockAuthService::rejecting(403);
        let err = mock.refresh_token(&Credential::new("t")).await.unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied(_)));
        assert_eq!(mock.refresh_calls(), 1);
    }
}
