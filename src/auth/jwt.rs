//! Client-side access token expiry hint.
//!
//! Decodes the JWT payload without verifying the signature. The resource
//! server stays authoritative; this only decides whether a stored session
//! is worth presenting as signed in.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Whether `token` is expired at the current time.
///
/// Anything that cannot be decoded counts as expired.
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, Utc::now().timestamp())
}

/// Whether `token` is expired at `now` (seconds since the epoch).
pub fn is_token_expired_at(token: &str, now: i64) -> bool {
    match decode_expiry(token) {
        Some(Some(exp)) => exp < now as f64,
        // Decodable claims without `exp`: nothing says it expired.
        Some(None) => false,
        None => true,
    }
}

/// `None` when the claims cannot be decoded, `Some(None)` when there is no `exp`.
fn decode_expiry(token: &str) -> Option<Option<f64>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .ok()?;
    let claims: ExpiryClaims = serde_json::from_slice(&bytes).ok()?;
    Some(claims.exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let signature = URL_SAFE_NO_PAD.encode(b"fake_signature");
        format!("{}.{}.{}", header, payload, signature)
    }

    #[test]
    fn test_future_exp_is_not_expired() {
        let token = make_jwt(&serde_json::json!({ "exp": Utc::now().timestamp() + 3600 }));
        assert!(!is_token_expired(&token));
    }

    #[test]
    fn test_past_exp_is_expired() {
        let token = make_jwt(&serde_json::json!({ "exp": Utc::now().timestamp() - 3600 }));
        assert!(is_token_expired(&token));
    }

    #[test]
    fn test_boundary() {
        let token = make_jwt(&serde_json::json!({ "exp": 1_000 }));
        assert!(!is_token_expired_at(&token, 1_000));
        assert!(is_token_expired_at(&token, 1_001));
    }

    #[test]
    fn test_garbage_is_expired() {
        assert!(is_token_expired("not-a-jwt"));
        assert!(is_token_expired("a.!!!.c"));
        assert!(is_token_expired(""));

        let not_json = format!("x.{}.y", URL_SAFE_NO_PAD.encode("plain text"));
        assert!(is_token_expired(&not_json));
    }

    #[test]
    fn test_missing_exp_is_not_expired() {
        let token = make_jwt(&serde_json::json!({ "sub": "user-1" }));
        assert!(!is_token_expired(&token));
    }
}
