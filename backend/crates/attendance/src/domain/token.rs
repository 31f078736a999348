//! Redeem Token Codec
//!
//! Token layout: `<session_id>.<issued_at_ms>.<tag>` where `tag` is the
//! unpadded base64url HMAC-SHA256 of `<session_id>.<issued_at_ms>` under the
//! server secret. The token carries its own redemption window so it stays
//! time-bounded independently of the session store.

use crate::domain::entities::duration_ms;
use crate::domain::value_objects::SessionId;
use platform::crypto::{constant_time_eq, from_base64_url, hmac_sha256, to_base64_url};
use std::time::Duration;
use thiserror::Error;

/// Accepted clock drift for tokens that appear issued in the future
pub const DEFAULT_FUTURE_SKEW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token redemption window has passed")]
    Expired,

    #[error("token is issued in the future")]
    NotYetValid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub session_id: SessionId,
    pub issued_at_ms: i64,
}

/// Signs and verifies redeem tokens
#[derive(Clone)]
pub struct TokenCodec {
    secret: [u8; 32],
    window_ms: i64,
    skew_ms: i64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("window_ms", &self.window_ms)
            .field("skew_ms", &self.skew_ms)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: [u8; 32], window: Duration, skew: Duration) -> Self {
        Self {
            secret,
            window_ms: duration_ms(window),
            skew_ms: duration_ms(skew),
        }
    }

    pub fn encode(&self, session_id: &SessionId, issued_at_ms: i64) -> String {
        let payload = format!("{}.{}", session_id.as_str(), issued_at_ms);
        let tag = hmac_sha256(&self.secret, payload.as_bytes());
        format!("{payload}.{}", to_base64_url(&tag))
    }

    pub fn decode(&self, token: &str, now_ms: i64) -> Result<DecodedToken, TokenError> {
        let mut parts = token.trim().split('.');
        let (Some(id), Some(issued), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let session_id = SessionId::parse(id).ok_or(TokenError::Malformed)?;
        if issued.is_empty() || !issued.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenError::Malformed);
        }
        let issued_at_ms: i64 = issued.parse().map_err(|_| TokenError::Malformed)?;
        let provided = from_base64_url(tag).map_err(|_| TokenError::Malformed)?;

        let payload_len = id.len() + 1 + issued.len();
        let payload = &token.trim()[..payload_len];
        let expected = hmac_sha256(&self.secret, payload.as_bytes());
        if !constant_time_eq(&provided, &expected) {
            return Err(TokenError::BadSignature);
        }

        if issued_at_ms.saturating_sub(now_ms) > self.skew_ms {
            return Err(TokenError::NotYetValid);
        }
        if now_ms.saturating_sub(issued_at_ms) > self.window_ms {
            return Err(TokenError::Expired);
        }

        Ok(DecodedToken {
            session_id,
            issued_at_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new([9u8; 32], Duration::from_secs(180), DEFAULT_FUTURE_SKEW)
    }

    #[test]
    fn test_encode_decode() {
        let id = SessionId::generate();
        let token = codec().encode(&id, 1_000);

        let decoded = codec().decode(&token, 1_000).unwrap();
        assert_eq!(decoded.session_id, id);
        assert_eq!(decoded.issued_at_ms, 1_000);
    }

    #[test]
    fn test_redemption_window_edges() {
        let token = codec().encode(&SessionId::generate(), 0);
        assert!(codec().decode(&token, 180_000).is_ok());
        assert_eq!(codec().decode(&token, 180_001), Err(TokenError::Expired));
    }

    #[test]
    fn test_future_skew() {
        let token = codec().encode(&SessionId::generate(), 10_000);
        assert!(codec().decode(&token, 5_000).is_ok());
        assert_eq!(codec().decode(&token, 4_999), Err(TokenError::NotYetValid));
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = codec().encode(&SessionId::generate(), 0);
        let other = TokenCodec::new([8u8; 32], Duration::from_secs(180), DEFAULT_FUTURE_SKEW);
        assert_eq!(other.decode(&token, 0), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tampered_issued_at_rejected() {
        let id = SessionId::generate();
        let token = codec().encode(&id, 1_000);
        let forged = token.replacen(".1000.", ".2000.", 1);
        assert_eq!(codec().decode(&forged, 2_000), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_malformed_shapes() {
        let c = codec();
        let id = SessionId::generate();
        let good = c.encode(&id, 1);
        let tag = good.rsplit('.').next().unwrap();

        for bad in [
            String::new(),
            "a.b".to_string(),
            format!("{good}.extra"),
            format!("short.1.{tag}"),
            format!("{id}.-1.{tag}"),
            format!("{id}.+1.{tag}"),
            format!("{id}.1.{tag}="),
            format!("{id}.99999999999999999999.{tag}"),
        ] {
            assert_eq!(c.decode(&bad, 1), Err(TokenError::Malformed), "{bad}");
        }
    }

    #[test]
    fn test_huge_window_does_not_wrap_to_expired() {
        let wide = TokenCodec::new([9u8; 32], Duration::from_secs(u64::MAX), DEFAULT_FUTURE_SKEW);
        let token = wide.encode(&SessionId::generate(), 0);
        assert!(wide.decode(&token, 1_760_000_000_000).is_ok());
    }
}
