//! Access token inspection

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::Result;

/// Claims carried by an access token; only `exp` is required
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, unix seconds; fractional values are floored
    #[serde(deserialize_with = "deserialize_exp")]
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn deserialize_exp<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|exp| exp.floor() as i64))
        .ok_or_else(|| D::Error::custom(format!("exp out of range: {}", number)))
}

/// Decode the payload of an access token
///
/// The signature is not checked here: the backend verifies every token it
/// receives, the client only needs the expiry.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// A token expiring at exactly `now` counts as expired
pub fn is_expired(claims: &Claims, now: i64) -> bool {
    claims.exp <= now
}

/// Source of wall-clock time in whole unix seconds
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs() as i64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionError;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn mint(payload: Value) -> String {
        encode(
            &Header::default(),
            &payload,
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_reads_exp_without_the_secret() {
        let token = mint(json!({ "exp": 1_700_000_000, "sub": "user-1", "role": "admin" }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, 1_700_000_000);
        assert_eq!(claims.sub.as_deref(), Some("user-1"));
        assert_eq!(claims.extra.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn test_decode_ignores_expiry_and_audience() {
        let token = mint(json!({ "exp": 10, "aud": "someone-else" }));
        assert_eq!(decode_claims(&token).unwrap().exp, 10);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for token in ["", "not-a-jwt", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.!!!.sig"] {
            assert!(matches!(
                decode_claims(token),
                Err(SessionError::MalformedToken(_))
            ));
        }
    }

    #[test]
    fn test_decode_requires_exp() {
        let token = mint(json!({ "sub": "user-1" }));
        assert!(matches!(
            decode_claims(&token),
            Err(SessionError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_decode_floors_fractional_exp() {
        let token = mint(json!({ "exp": 1_700_000_000.7 }));
        assert_eq!(decode_claims(&token).unwrap().exp, 1_700_000_000);

        let token = mint(json!({ "exp": "tomorrow" }));
        assert!(matches!(
            decode_claims(&token),
            Err(SessionError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_expiry_boundary() {
        let claims = Claims {
            exp: 100,
            sub: None,
            extra: Map::new(),
        };
        assert!(!is_expired(&claims, 99));
        assert!(is_expired(&claims, 100));
        assert!(is_expired(&claims, 101));
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(50);
        clock.advance(10);
        assert_eq!(clock.now_unix(), 60);
        clock.set(5);
        assert_eq!(clock.now_unix(), 5);
    }
}
