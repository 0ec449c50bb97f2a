//! Single-use password reset secrets
//!
//! Only the SHA-256 of a secret is stored. Every write that ends a reset is
//! conditioned on the stored hash still being the one it read, so a secret
//! can be spent at most once and a newer `begin` always wins.

use crate::error::{AuthError, AuthResult};
use crate::hasher::SecretHasher;
use chrono::Duration;
use natours_core::{
    internal_error, Clock, Principal, PrincipalId, PrincipalStore, SaveCondition, SaveOutcome,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes of entropy in a reset secret
pub const RESET_SECRET_BYTES: usize = 32;

/// Plaintext reset secret, handed out once
#[derive(Clone, PartialEq, Eq)]
pub struct ResetSecret(String);

impl ResetSecret {
    fn generate() -> Self {
        let mut bytes = [0u8; RESET_SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn token_hash(&self) -> String {
        hash_reset_secret(&self.0)
    }
}

impl fmt::Debug for ResetSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResetSecret(<redacted>)")
    }
}

/// Stored form of a reset secret
pub fn hash_reset_secret(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

pub struct ResetTokenManager {
    store: Arc<dyn PrincipalStore>,
    hasher: SecretHasher,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl ResetTokenManager {
    pub fn new(
        store: Arc<dyn PrincipalStore>,
        hasher: SecretHasher,
        clock: Arc<dyn Clock>,
        lifetime: Duration,
    ) -> Self {
        Self {
            store,
            hasher,
            clock,
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Start a reset for `principal`, superseding any earlier one
    pub async fn begin(&self, principal: &Principal) -> AuthResult<ResetSecret> {
        let secret = ResetSecret::generate();
        let expires_at = self.clock.now() + self.lifetime;

        let mut updated = principal.clone().without_password_hash();
        updated.begin_reset(secret.token_hash(), expires_at);

        match self
            .store
            .save_credentials(&updated, SaveCondition::Always)
            .await?
        {
            SaveOutcome::Saved => {
                info!(principal_id = %principal.id(), %expires_at, "Password reset started");
                Ok(secret)
            }
            SaveOutcome::Stale => Err(internal_error!(
                format!("Principal {} vanished while starting a reset", principal.id()),
                "reset"
            )
            .into()),
        }
    }

    /// Undo a `begin` whose secret could not be delivered. Leaves any newer
    /// reset in place.
    pub async fn rollback(&self, principal: &Principal, secret: &ResetSecret) -> AuthResult<()> {
        let token_hash = secret.token_hash();
        let mut cleared = principal.clone().without_password_hash();
        cleared.clear_reset();

        let outcome = self
            .store
            .save_credentials(&cleared, SaveCondition::ResetHashEquals(Some(token_hash)))
            .await?;
        if outcome == SaveOutcome::Stale {
            debug!(
                principal_id = %principal.id(),
                "Reset already superseded, nothing to roll back"
            );
        }
        Ok(())
    }

    /// Spend `secret` to set a new password. Wrong, expired, superseded and
    /// already-spent secrets all fail with [`AuthError::InvalidOrExpired`].
    pub async fn consume(&self, secret: &str, new_password: &str) -> AuthResult<Principal> {
        let token_hash = hash_reset_secret(secret);
        let now = self.clock.now();

        let mut principal = match self.store.find_by_reset_hash(&token_hash).await? {
            Some(principal) if principal.reset_is_live(&token_hash, now) => principal,
            _ => return Err(AuthError::InvalidOrExpired),
        };

        let digest = self.hasher.hash_blocking(new_password.to_string()).await?;
        principal.replace_password(digest, self.clock.now());

        match self
            .store
            .save_credentials(&principal, SaveCondition::ResetHashEquals(Some(token_hash)))
            .await?
        {
            SaveOutcome::Saved => {
                info!(principal_id = %principal.id(), "Password reset completed");
                Ok(principal.without_password_hash())
            }
            SaveOutcome::Stale => {
                warn!(principal_id = %principal.id(), "Reset secret was spent concurrently");
                Err(AuthError::InvalidOrExpired)
            }
        }
    }

    /// Whether `principal_id` currently has a live reset for `secret`
    pub async fn is_pending(
        &self,
        principal_id: &PrincipalId,
        secret: &ResetSecret,
    ) -> AuthResult<bool> {
        let now = self.clock.now();
        let principal = self
            .store
            .find_by_id(principal_id, natours_core::Projection::Default)
            .await?;
        Ok(principal.is_some_and(|p| p.reset_is_live(&secret.token_hash(), now)))
    }
}
