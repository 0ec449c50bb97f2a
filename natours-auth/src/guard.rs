//! Request authentication and role gating

use crate::error::{AuthError, AuthResult, UnauthenticatedReason};
use crate::token::{TokenCodec, TokenError};
use natours_core::{Principal, PrincipalStore, Projection, Role};
use std::sync::Arc;
use tracing::debug;

/// Cookie carrying the bearer token when no header is sent
pub const TOKEN_COOKIE: &str = "jwt";

/// Raw token carriers of one request
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    /// Value of the `Authorization` header
    pub authorization: Option<&'a str>,
    /// Value of the token cookie
    pub cookie: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    pub fn bearer(header: &'a str) -> Self {
        Self {
            authorization: Some(header),
            cookie: None,
        }
    }

    /// The token to verify. A present header must use the Bearer scheme;
    /// the cookie is only consulted without one.
    pub fn token(&self) -> Result<&'a str, UnauthenticatedReason> {
        if let Some(header) = self.authorization {
            let (scheme, token) = header
                .trim()
                .split_once(' ')
                .ok_or(UnauthenticatedReason::MalformedHeader)?;
            let token = token.trim();
            if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
                return Err(UnauthenticatedReason::MalformedHeader);
            }
            return Ok(token);
        }

        self.cookie
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(UnauthenticatedReason::MissingToken)
    }
}

/// Turns a presented token into a live principal
#[derive(Clone)]
pub struct AccessGuard {
    codec: Arc<TokenCodec>,
    store: Arc<dyn PrincipalStore>,
}

impl AccessGuard {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn PrincipalStore>) -> Self {
        Self { codec, store }
    }

    pub async fn authenticate(&self, credentials: Credentials<'_>) -> AuthResult<Principal> {
        let token = credentials.token().map_err(reject)?;
        self.authenticate_token(token).await
    }

    pub async fn authenticate_token(&self, token: &str) -> AuthResult<Principal> {
        let verified = self.codec.verify(token).map_err(|e| {
            debug!(error = %e, "Token rejected");
            reject(match e {
                TokenError::Expired => UnauthenticatedReason::ExpiredToken,
                TokenError::Malformed | TokenError::BadSignature => {
                    UnauthenticatedReason::InvalidToken
                }
            })
        })?;

        let principal = self
            .store
            .find_by_id(&verified.principal_id, Projection::Default)
            .await?
            .ok_or_else(|| reject(UnauthenticatedReason::PrincipalGone))?;

        if principal.password_changed_after(verified.issued_at_us) {
            debug!(principal_id = %principal.id(), "Token predates the last password change");
            return Err(reject(UnauthenticatedReason::PasswordChanged));
        }

        Ok(principal)
    }
}

/// Admit `principal` iff its role is one of `allowed`
pub fn authorize(principal: &Principal, allowed: &[Role]) -> AuthResult<()> {
    if allowed.contains(&principal.role()) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

fn reject(reason: UnauthenticatedReason) -> AuthError {
    AuthError::Unauthenticated(reason)
}
