//! Contracts for the external collaborators of the credential subsystem

use crate::error::NatoursResult;
use crate::types::{Email, Principal, PrincipalId};
use async_trait::async_trait;
use std::fmt;

/// Which fields a read returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Everything except the password digest
    Default,
    /// Include the password digest
    WithPasswordHash,
}

/// Precondition for [`PrincipalStore::save`], checked at write time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveCondition {
    Always,
    /// Only write while the stored reset hash still equals this value
    /// (`None` meaning no reset in flight)
    ResetHashEquals(Option<String>),
}

/// Result of a [`PrincipalStore::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The condition no longer held or the principal is gone; nothing was written
    Stale,
}

/// Persistent principal storage
///
/// Implementations must apply each write atomically with respect to its
/// condition. Writing a principal whose `password_hash` is `None` keeps the
/// stored digest, and the stored `password_changed_at` never moves back.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    /// Persist a new principal. Fails with `Conflict` when the email is taken.
    async fn insert(&self, principal: &Principal) -> NatoursResult<()>;

    async fn find_by_id(
        &self,
        id: &PrincipalId,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>>;

    async fn find_by_email(
        &self,
        email: &Email,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>>;

    /// Find the principal whose reset hash equals `token_hash`, expired or not
    async fn find_by_reset_hash(&self, token_hash: &str) -> NatoursResult<Option<Principal>>;

    /// Write every field of `principal`
    async fn save(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome>;

    /// Write only the credential fields of `principal`: password digest,
    /// `password_changed_at` and the reset hash and expiry. Name, email and
    /// role stay as stored.
    async fn save_credentials(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome>;
}

/// Outbound message to a principal
#[derive(Clone)]
pub struct Notification {
    pub to: Email,
    pub subject: String,
    pub body: String,
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The body can carry a reset secret
        f.debug_struct("Notification")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Out-of-band delivery channel (email or similar)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> NatoursResult<()>;
}
