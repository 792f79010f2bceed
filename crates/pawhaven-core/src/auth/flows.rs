//! Account flows that create and destroy the session.

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use tracing::{error, info};

use super::validation::{
    validate_email, validate_login, validate_new_password, validate_registration,
    ValidationError,
};
use crate::api::{ApiError, AuthService};
use crate::clock::Clock;
use crate::session::{Credential, Session, SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum AuthFlowError {
    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Could not save the session: {0}")]
    Storage(#[from] StoreError),
}

impl AuthFlowError {
    /// A message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            AuthFlowError::Invalid(e) => e.to_string(),
            AuthFlowError::Api(e) => e.user_message(),
            AuthFlowError::Storage(e) => format!("Could not save the session: {}", e),
        }
    }
}

pub struct Authenticator {
    service: Arc<dyn AuthService>,
    store: SessionStore,
    clock: Arc<dyn Clock>,
    validity_window: Duration,
}

impl Authenticator {
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
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthFlowError> {
        validate_login(email, password)?;
        let credential = self.service.login(email, password).await.map_err(|e| {
            error!(error = %e, "Login failed");
            e
        })?;
        let session = self.establish(credential)?;
        info!(expiry = %session.expiry, "Login successful");
        Ok(session)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<Session, AuthFlowError> {
        validate_registration(username, email, password, confirm)?;
        let credential = self
            .service
            .register(username.trim(), email, password)
            .await
            .map_err(|e| {
                error!(error = %e, "Registration failed");
                e
            })?;
        let session = self.establish(credential)?;
        info!(expiry = %session.expiry, "Registration successful");
        Ok(session)
    }

    pub async fn verify_email(&self, email: &str, code: &str) -> Result<(), AuthFlowError> {
        validate_email(email)?;
        if code.trim().is_empty() {
            return Err(ValidationError::CodeEmpty.into());
        }
        self.service.verify_email(email, code.trim()).await?;
        Ok(())
    }

    /// Ask for a reset code. Has no effect on the session.
    pub async fn forgot_password(&self, email: &str) -> Result<String, AuthFlowError> {
        validate_email(email)?;
        Ok(self.service.forgot_password(email).await?)
    }

    /// Set a new password with an emailed code. Has no effect on the session.
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        password: &str,
        confirm: &str,
    ) -> Result<(), AuthFlowError> {
        validate_email(email)?;
        if code.trim().is_empty() {
            return Err(ValidationError::CodeEmpty.into());
        }
        validate_new_password(password, confirm)?;
        self.service
            .reset_password(email, code.trim(), password)
            .await?;
        info!("Password reset accepted");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.store.clear_session()?;
        info!("Logged out");
        Ok(())
    }

    fn establish(&self, credential: Credential) -> Result<Session, StoreError> {
        let session = Session::issued(credential, self.clock.now(), self.validity_window);
        self.store.set_session(&session)?;
        Ok(session)
    }
}
