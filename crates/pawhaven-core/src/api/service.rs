//! Client for the PawHaven authentication endpoints.
//!
//! [`AuthService`] is the seam the session lifecycle talks through;
//! [`HttpAuthService`] is the reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use super::ApiError;
use crate::session::Credential;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait AuthService: Send + Sync {
    /// `POST /users/login`
    async fn login(&self, email: &str, password: &str) -> Result<Credential, ApiError>;

    /// `POST /users/`
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Credential, ApiError>;

    /// `POST /users/verify`
    async fn verify_email(&self, email: &str, code: &str) -> Result<(), ApiError>;

    /// `POST /auth/forgot-password`, returning the server's message.
    async fn forgot_password(&self, email: &str) -> Result<String, ApiError>;

    /// `POST /auth/reset-password`
    async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), ApiError>;

    /// `POST /auth/refresh-token` with the current credential as bearer.
    async fn refresh_token(&self, credential: &Credential) -> Result<Credential, ApiError>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    email: &'a str,
    verification_code: &'a str,
}

#[derive(Debug, Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest<'a> {
    email: &'a str,
    token: &'a str,
    new_password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    data: TokenResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

/// Build the shared reqwest client. Clone is cheap - reqwest::Client uses
/// Arc internally for connection pooling.
pub fn http_client() -> Result<Client, ApiError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?)
}

/// Check if response is successful, returning an error with body if not.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

/// Join a base URL and an endpoint path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Clone, Debug)]
pub struct HttpAuthService {
    client: Client,
    base_url: String,
}

impl HttpAuthService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self::with_client(http_client()?, base_url))
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = join_url(&self.base_url, path);
        debug!(url = %url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))
    }

    async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = join_url(&self.base_url, path);
        debug!(url = %url, "POST");
        let response = self.client.post(&url).json(body).send().await?;
        check_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn login(&self, email: &str, password: &str) -> Result<Credential, ApiError> {
        let response: TokenResponse = self
            .post_json("users/login", &LoginRequest { email, password })
            .await?;
        info!("Login accepted");
        Ok(Credential::new(response.token))
    }

    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Credential, ApiError> {
        // The collection endpoint keeps its trailing slash.
        let response: RegisterResponse = self
            .post_json(
                "users/",
                &RegisterRequest {
                    username,
                    email,
                    password,
                },
            )
            .await?;
        info!("Registration accepted");
        Ok(Credential::new(response.data.token))
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<(), ApiError> {
        self.post_unit(
            "users/verify",
            &VerifyRequest {
                email,
                verification_code: code,
            },
        )
        .await
    }

    async fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        let response: MessageResponse = self
            .post_json("auth/forgot-password", &ForgotPasswordRequest { email })
            .await?;
        Ok(response.message)
    }

    async fn reset_password(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        self.post_unit(
            "auth/reset-password",
            &ResetPasswordRequest {
                email,
                token,
                new_password,
            },
        )
        .await
    }

    async fn refresh_token(&self, credential: &Credential) -> Result<Credential, ApiError> {
        let url = join_url(&self.base_url, "auth/refresh-token");
        debug!(url = %url, "POST (refresh)");
        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.as_str())
            .send()
            .await?;
        let response = check_response(response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", url, e)))?;
        if body.token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "refresh returned an empty token".to_string(),
            ));
        }
        Ok(Credential::new(body.token))
    }
}
