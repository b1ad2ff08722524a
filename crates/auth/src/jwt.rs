//! Bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

pub trait JwtValidator: Send + Sync {
    /// Verify the signature, decode the claims, and check their time window
    /// against `now`.
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator over a shared secret.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry lives in `expires_at`, checked by `validate_claims`.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            match e.kind() {
                ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
                _ => TokenValidationError::Malformed(e.to_string()),
            }
        })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use consignment_core::TenantId;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use crate::{PrincipalId, Role};

    fn mint(secret: &str, issued_at: DateTime<Utc>) -> (String, JwtClaims) {
        let claims = JwtClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::new(),
            roles: vec![Role::accountant()],
            issued_at,
            expires_at: issued_at + Duration::minutes(10),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (token, claims)
    }

    #[test]
    fn accepts_a_token_signed_with_the_same_secret() {
        let now = Utc::now();
        let (token, claims) = mint("s3cret", now);
        let decoded = Hs256JwtValidator::new("s3cret").validate(&token, now).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn rejects_another_secret_and_garbage() {
        let now = Utc::now();
        let (token, _) = mint("s3cret", now);
        let validator = Hs256JwtValidator::new("other");
        assert_eq!(
            validator.validate(&token, now),
            Err(TokenValidationError::InvalidSignature)
        );
        assert!(matches!(
            validator.validate("not.a.jwt", now),
            Err(TokenValidationError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_expired_tokens() {
        let issued = Utc::now() - Duration::hours(1);
        let (token, _) = mint("s3cret", issued);
        assert_eq!(
            Hs256JwtValidator::new("s3cret").validate(&token, Utc::now()),
            Err(TokenValidationError::Expired)
        );
    }
}
