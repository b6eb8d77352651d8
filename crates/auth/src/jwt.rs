//! Token decoding/verification.
//!
//! The trait keeps the API layer independent of the signing scheme; the HS256
//! implementation covers the shipped deployment.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::claims::{validate_claims, JwtClaims, TokenValidationError};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("token could not be decoded: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verify and decode a bearer token into [`JwtClaims`].
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// HS256 (shared-secret) validator.
pub struct Hs256JwtValidator {
    key: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            key: DecodingKey::from_secret(&secret),
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Claims carry their own time window; expiry is checked below against
        // the caller-supplied clock so it stays deterministic in tests.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};

    use quillerp_core::TenantId;

    use crate::{PrincipalId, Role};

    fn mint(secret: &str, issued: DateTime<Utc>, expires: DateTime<Utc>) -> String {
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::new("admin")],
            issued_at: issued,
            expires_at: expires,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn roundtrip_with_matching_secret() {
        let now = Utc::now();
        let token = mint("s3cret", now, now + Duration::minutes(5));
        let validator = Hs256JwtValidator::new(b"s3cret".to_vec());
        let claims = validator.validate(&token, now).unwrap();
        assert_eq!(claims.roles, vec![Role::new("admin")]);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let token = mint("s3cret", now, now + Duration::minutes(5));
        let validator = Hs256JwtValidator::new(b"other".to_vec());
        assert!(matches!(
            validator.validate(&token, now),
            Err(JwtError::Decode(_))
        ));
    }

    #[test]
    fn expired_claims_are_rejected_after_decode() {
        let now = Utc::now();
        let token = mint("s3cret", now - Duration::minutes(10), now - Duration::minutes(5));
        let validator = Hs256JwtValidator::new(b"s3cret".to_vec());
        assert!(matches!(
            validator.validate(&token, now),
            Err(JwtError::Claims(TokenValidationError::Expired))
        ));
    }
}
