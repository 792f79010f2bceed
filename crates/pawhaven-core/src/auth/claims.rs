//! Unverified reads of the JWT payload carried in a credential.
//!
//! The client never validates signatures; the server is the authority on
//! validity. The payload is only read for the expiry instant and the user id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Expiration time (Unix seconds).
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issued at (Unix seconds).
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "_id")]
    underscore_id: Option<Value>,
    #[serde(default, rename = "userId")]
    user_id: Option<Value>,
}

impl TokenClaims {
    /// Decode the payload segment of `header.payload.signature`.
    ///
    /// Returns `None` for anything that is not a three-part token with a
    /// base64url JSON payload.
    pub fn decode(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        // Some issuers pad the segment anyway.
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// The user id, taken from `id`, `_id` or `userId`, in that order.
    pub fn user_id(&self) -> Option<String> {
        [&self.id, &self.underscore_id, &self.user_id]
            .into_iter()
            .flatten()
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_decode_exp_and_id() {
        let token = token_with(r#"{"id":"64f0c2","exp":1750003600,"iat":1750000000}"#);
        let claims = TokenClaims::decode(&token).unwrap();
        assert_eq!(claims.exp, Some(1_750_003_600));
        assert_eq!(claims.user_id().as_deref(), Some("64f0c2"));
        assert_eq!(
            claims.expires_at().unwrap().timestamp(),
            1_750_003_600
        );
    }

    #[test]
    fn test_user_id_fallback_order() {
        let token = token_with(r#"{"_id":"mongo-id","userId":42}"#);
        let claims = TokenClaims::decode(&token).unwrap();
        assert_eq!(claims.user_id().as_deref(), Some("mongo-id"));

        let token = token_with(r#"{"userId":42}"#);
        let claims = TokenClaims::decode(&token).unwrap();
        assert_eq!(claims.user_id().as_deref(), Some("42"));
    }

    #[test]
    fn test_opaque_tokens_do_not_decode() {
        assert!(TokenClaims::decode("tok-2").is_none());
        assert!(TokenClaims::decode("").is_none());
        assert!(TokenClaims::decode("a.b").is_none());
        assert!(TokenClaims::decode("a.!!!.c").is_none());
        assert!(TokenClaims::decode("a.b.c.d").is_none());
    }

    #[test]
    fn test_missing_exp() {
        let claims = TokenClaims::decode(&token_with(r#"{"id":"x"}"#)).unwrap();
        assert!(claims.expires_at().is_none());
    }
}
