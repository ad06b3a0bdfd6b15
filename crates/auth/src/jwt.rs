//! HS256 token signing and verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

/// Verifies a bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// Signs claims into a bearer token.
pub trait JwtIssuer: Send + Sync {
    fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError>;
}

/// Shared-secret HS256 implementation of both sides.
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256Jwt {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks run in `validate_claims` against an explicit clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256Jwt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256Jwt").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "bearer token failed to decode");
                TokenValidationError::Malformed(e.to_string())
            })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

impl JwtIssuer for Hs256Jwt {
    fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use chrono::Duration;
    use flowrack_core::UserId;

    #[test]
    fn issued_tokens_validate_with_the_same_secret_only() {
        let now = Utc::now();
        let jwt = Hs256Jwt::new("secret-a");
        let claims = JwtClaims::new(UserId::new(7), Role::Operator, now, Duration::minutes(5));
        let token = jwt.issue(&claims).unwrap();

        let decoded = jwt.validate(&token, now).unwrap();
        assert_eq!(decoded, claims);

        let other = Hs256Jwt::new("secret-b");
        assert!(matches!(other.validate(&token, now), Err(TokenValidationError::Malformed(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let now = Utc::now();
        let jwt = Hs256Jwt::new("secret");
        let claims = JwtClaims::new(UserId::new(7), Role::User, now, Duration::minutes(5));
        let token = jwt.issue(&claims).unwrap();
        assert_eq!(
            jwt.validate(&token, now + Duration::minutes(6)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let jwt = Hs256Jwt::new("secret");
        assert!(matches!(jwt.validate("not-a-token", Utc::now()), Err(TokenValidationError::Malformed(_))));
    }
}
