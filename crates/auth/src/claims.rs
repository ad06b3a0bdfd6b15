use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use flowrack_core::UserId;

use crate::Role;

/// JWT claims model (transport-agnostic).
///
/// Timestamps are seconds since the Unix epoch, as registered JWT claims are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the authenticated user.
    pub sub: UserId,

    /// Role at the time the token was issued.
    pub role: Role,

    /// Token id, the key used for revocation.
    pub jti: Uuid,

    /// Issued-at timestamp.
    pub iat: i64,

    /// Expiration timestamp.
    pub exp: i64,
}

impl JwtClaims {
    pub fn new(sub: UserId, role: Role, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub,
            role,
            jti: Uuid::now_v7(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("token has been revoked")]
    Revoked,

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Deterministically validate JWT claims against `now`.
///
/// Signature verification happens in [`crate::jwt`]; this checks the time
/// window only. A small skew is tolerated on `iat`.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    const CLOCK_SKEW_SECS: i64 = 30;

    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now.timestamp() + CLOCK_SKEW_SECS < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap()
    }

    #[test]
    fn window_checks() {
        let claims = JwtClaims::new(UserId::new(1), Role::User, now(), Duration::minutes(10));
        assert!(validate_claims(&claims, now()).is_ok());
        assert_eq!(
            validate_claims(&claims, now() + Duration::minutes(10)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&claims, now() - Duration::minutes(5)),
            Err(TokenValidationError::NotYetValid)
        );

        let mut broken = claims.clone();
        broken.exp = broken.iat;
        assert_eq!(validate_claims(&broken, now()), Err(TokenValidationError::InvalidTimeWindow));
    }

    #[test]
    fn every_token_gets_its_own_id() {
        let a = JwtClaims::new(UserId::new(1), Role::User, now(), Duration::minutes(1));
        let b = JwtClaims::new(UserId::new(1), Role::User, now(), Duration::minutes(1));
        assert_ne!(a.jti, b.jti);
        assert_eq!(a.expires_at(), now() + Duration::minutes(1));
    }

    #[test]
    fn wire_shape_uses_registered_claim_names() {
        let claims = JwtClaims::new(UserId::new(42), Role::Operator, now(), Duration::minutes(1));
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["sub"], 42);
        assert_eq!(value["role"], "operator");
        assert_eq!(value["iat"], now().timestamp());
        assert!(value["jti"].is_string());
    }
}
