//! Unverified decoding of access token claims.
//!
//! The client never validates signatures; it only reads `exp` to decide when
//! to renew. Anything that does not look like a JWT decodes to `None`.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    /// Expiry as seconds since the Unix epoch.
    pub exp: Option<i64>,
    pub user_id: Option<i64>,
    pub token_type: Option<String>,
}

impl AccessClaims {
    pub fn decode(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let (_header, payload) = (parts.next()?, parts.next()?);
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }
}

/// Expiry instant of an access token, if it carries one.
pub fn access_expiry(token: &str) -> Option<DateTime<Utc>> {
    AccessClaims::decode(token).and_then(|c| c.expires_at())
}

/// How long to wait before renewing: `max(0, expiry - now - skew)`.
pub fn renewal_delay(expires_at: DateTime<Utc>, now: DateTime<Utc>, skew: Duration) -> Duration {
    let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
    (expires_at - now - skew)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Build an unsigned JWT-shaped token with the given expiry.
    pub(crate) fn token_expiring_at(exp: i64, tag: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            json!({"token_type": "access", "exp": exp, "user_id": 7, "jti": tag}).to_string(),
        );
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_decode_claims() {
        let token = token_expiring_at(1_700_000_000, "a");
        let claims = AccessClaims::decode(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.user_id, Some(7));
        assert_eq!(claims.token_type.as_deref(), Some("access"));
        assert_eq!(
            access_expiry(&token),
            Utc.timestamp_opt(1_700_000_000, 0).single()
        );
    }

    #[test]
    fn test_decode_accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":5}"#);
        let token = format!("h.{}.s", payload);
        assert_eq!(AccessClaims::decode(&token).and_then(|c| c.exp), Some(5));
    }

    #[test]
    fn test_decode_rejects_opaque_tokens() {
        assert_eq!(AccessClaims::decode("A1"), None);
        assert_eq!(AccessClaims::decode("a.!!!.c"), None);
        assert_eq!(access_expiry("h.e30.s"), None); // `{}` has no exp
    }

    #[test]
    fn test_renewal_delay() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let skew = Duration::from_secs(30);

        let exp = Utc.timestamp_opt(1_600, 0).unwrap();
        assert_eq!(renewal_delay(exp, now, skew), Duration::from_secs(570));

        // Inside the skew window or already expired: renew immediately
        let exp = Utc.timestamp_opt(1_010, 0).unwrap();
        assert_eq!(renewal_delay(exp, now, skew), Duration::ZERO);
        let exp = Utc.timestamp_opt(500, 0).unwrap();
        assert_eq!(renewal_delay(exp, now, skew), Duration::ZERO);
    }
}
