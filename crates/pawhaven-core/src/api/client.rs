//! Authorized client for the PawHaven REST API.
//!
//! Every request carries `Authorization: Bearer <credential>` taken from the
//! session store at call time. Callers are expected to sit behind the route
//! guard; a missing session still fails fast here without a network call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::warn;

use super::service::{check_response, http_client, join_url};
use super::ApiError;
use crate::clock::Clock;
use crate::models::{Pet, UserProfile};
use crate::session::SessionStore;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: SessionStore,
    clock: Arc<dyn Clock>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        store: SessionStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ApiError> {
        Ok(Self::with_client(http_client()?, base_url, store, clock))
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        store: SessionStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            store,
            clock,
        }
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let session = self
            .store
            .current(self.clock.now())
            .ok_or(ApiError::NotAuthenticated)?;
        let mut headers = header::HeaderMap::new();
        let value = header::HeaderValue::from_str(&format!(
            "Bearer {}",
            session.credential.as_str()
        ))
        .map_err(|_| ApiError::InvalidResponse("credential is not a valid header value".into()))?;
        headers.insert(header::AUTHORIZATION, value);
        Ok(headers)
    }

    /// GET `path`, retrying with exponential backoff while rate limited.
    async fn send(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let url = join_url(&self.base_url, path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(&url)
                .headers(self.auth_headers()?)
                .send()
                .await?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            return check_response(response).await;
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(path).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    // ===== Profile area =====

    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        self.get_json("users/profile").await
    }

    pub async fn fetch_my_pets(&self) -> Result<Vec<Pet>, ApiError> {
        self.get_json("pets/mine").await
    }
}
