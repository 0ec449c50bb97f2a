//! Signed bearer tokens (HS256 JWT)

use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey,
    Header, Validation,
};
use natours_core::{internal_error, AuthConfig, Clock, NatoursResult, PrincipalId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// JWT claims. Registered times are whole seconds since the epoch; `iat_us`
/// repeats the issue time at the resolution password changes are stored at.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (principal id)
    pub sub: String,
    /// Issued at
    pub iat: i64,
    /// Issued at, in microseconds
    pub iat_us: i64,
    /// Expiration time
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
}

/// Contents of a token that passed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedToken {
    pub principal_id: PrincipalId,
    pub issued_at: i64,
    /// Issue time in microseconds since the epoch
    pub issued_at_us: i64,
    pub expires_at: i64,
}

/// Issues and verifies bearer tokens with a server-held key
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self::from_secret(config.jwt_secret.as_bytes(), config.token_lifetime(), clock)
    }

    pub fn from_secret(secret: &[u8], lifetime: Duration, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock in `verify`
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime,
            clock,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, principal_id: PrincipalId) -> NatoursResult<String> {
        let now = self.clock.now();
        let claims = Claims {
            sub: principal_id.to_string(),
            iat: now.timestamp(),
            iat_us: now.timestamp_micros(),
            exp: (now + self.lifetime).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| internal_error!("Failed to sign token", "token", e))
    }

    /// A token is valid until the second named by its `exp` claim
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                JwtErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            }
        })?;
        let claims = data.claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }

        let principal_id = claims
            .sub
            .parse::<PrincipalId>()
            .map_err(|_| TokenError::Malformed)?;

        Ok(VerifiedToken {
            principal_id,
            issued_at: claims.iat,
            issued_at_us: claims.iat_us,
            expires_at: claims.exp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natours_core::ManualClock;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec(clock: &ManualClock) -> TokenCodec {
        TokenCodec::from_secret(SECRET, Duration::hours(1), Arc::new(clock.clone()))
    }

    #[test]
    fn test_issue_then_verify() {
        let clock = ManualClock::default();
        let codec = codec(&clock);
        let id = PrincipalId::new();

        let verified = codec.verify(&codec.issue(id).unwrap()).unwrap();
        assert_eq!(verified.principal_id, id);
        assert_eq!(verified.issued_at, clock.now().timestamp());
        assert_eq!(verified.issued_at_us, clock.now().timestamp_micros());
        assert_eq!(verified.expires_at - verified.issued_at, 3600);
    }

    #[test]
    fn test_expired_token() {
        let clock = ManualClock::default();
        let codec = codec(&clock);
        let token = codec.issue(PrincipalId::new()).unwrap();

        clock.advance(Duration::minutes(59));
        assert!(codec.verify(&token).is_ok());

        clock.advance(Duration::minutes(1));
        assert_eq!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_foreign_key_is_rejected() {
        let clock = ManualClock::default();
        let other = TokenCodec::from_secret(
            b"ffffffffffffffffffffffffffffffff",
            Duration::hours(1),
            Arc::new(clock.clone()),
        );
        let token = other.issue(PrincipalId::new()).unwrap();

        assert_eq!(codec(&clock).verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let clock = ManualClock::default();
        let codec = codec(&clock);
        let token = codec.issue(PrincipalId::new()).unwrap();

        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let forged = codec.issue(PrincipalId::new()).unwrap();
        parts[1] = forged.split('.').nth(1).unwrap().to_string();

        assert_eq!(codec.verify(&parts.join(".")), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let clock = ManualClock::default();
        let codec = codec(&clock);

        assert_eq!(codec.verify(""), Err(TokenError::Malformed));
        assert_eq!(codec.verify("not.a.jwt"), Err(TokenError::Malformed));
    }

    #[test]
    fn test_missing_expiry_is_malformed() {
        #[derive(Serialize)]
        struct NoExpiry {
            sub: String,
            iat: i64,
        }

        let clock = ManualClock::default();
        let token = encode(
            &Header::default(),
            &NoExpiry {
                sub: PrincipalId::new().to_string(),
                iat: clock.now().timestamp(),
            },
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(codec(&clock).verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_other_algorithms_are_rejected() {
        let clock = ManualClock::default();
        let claims = Claims {
            sub: PrincipalId::new().to_string(),
            iat: clock.now().timestamp(),
            iat_us: clock.now().timestamp_micros(),
            exp: clock.now().timestamp() + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert_eq!(codec(&clock).verify(&token), Err(TokenError::Malformed));
    }
}
