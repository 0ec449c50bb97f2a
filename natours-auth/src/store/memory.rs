//! In-process principal store

use async_trait::async_trait;
use natours_core::{
    ErrorContext, Email, NatoursError, NatoursResult, Principal, PrincipalId, PrincipalRecord,
    PrincipalStore, Projection, SaveCondition, SaveOutcome,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{apply_projection, latest};

#[derive(Default)]
struct Inner {
    by_id: HashMap<PrincipalId, PrincipalRecord>,
    by_email: HashMap<Email, PrincipalId>,
}

/// Principal store held in memory. Conditional saves are checked and applied
/// under one write lock.
#[derive(Default)]
pub struct MemoryPrincipalStore {
    inner: RwLock<Inner>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn email_taken(email: &Email) -> NatoursError {
    NatoursError::Conflict {
        message: "Email is already registered".to_string(),
        context: ErrorContext::new("memory_store")
            .with_operation("insert")
            .with_metadata("email", email.as_str()),
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn insert(&self, principal: &Principal) -> NatoursResult<()> {
        let mut inner = self.inner.write().await;
        if inner.by_email.contains_key(principal.email()) {
            return Err(email_taken(principal.email()));
        }

        inner
            .by_email
            .insert(principal.email().clone(), principal.id());
        inner.by_id.insert(principal.id(), principal.to_record());
        debug!(principal_id = %principal.id(), "Principal inserted");
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PrincipalId,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .get(id)
            .map(|record| apply_projection(record.clone(), projection))
            .transpose()
    }

    async fn find_by_email(
        &self,
        email: &Email,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>> {
        let inner = self.inner.read().await;
        inner
            .by_email
            .get(email)
            .and_then(|id| inner.by_id.get(id))
            .map(|record| apply_projection(record.clone(), projection))
            .transpose()
    }

    async fn find_by_reset_hash(&self, token_hash: &str) -> NatoursResult<Option<Principal>> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .values()
            .find(|record| record.reset_token_hash.as_deref() == Some(token_hash))
            .map(|record| apply_projection(record.clone(), Projection::Default))
            .transpose()
    }

    async fn save(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.by_id.get(&principal.id()) else {
            return Ok(SaveOutcome::Stale);
        };

        if !condition_holds(stored, &condition) {
            return Ok(SaveOutcome::Stale);
        }

        let mut record = principal.to_record();
        if record.password_hash.is_none() {
            record.password_hash = stored.password_hash.clone();
        }
        record.password_changed_at = latest(stored.password_changed_at, record.password_changed_at);

        if record.email != stored.email {
            if inner.by_email.contains_key(&record.email) {
                return Err(email_taken(&record.email));
            }
            let previous = stored.email.clone();
            inner.by_email.remove(&previous);
            inner.by_email.insert(record.email.clone(), record.id);
        }

        inner.by_id.insert(record.id, record);
        Ok(SaveOutcome::Saved)
    }

    async fn save_credentials(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.by_id.get_mut(&principal.id()) else {
            return Ok(SaveOutcome::Stale);
        };
        if !condition_holds(stored, &condition) {
            return Ok(SaveOutcome::Stale);
        }

        if let Some(digest) = principal.password_hash() {
            stored.password_hash = Some(digest.clone());
        }
        stored.password_changed_at =
            latest(stored.password_changed_at, principal.password_changed_at());
        stored.reset_token_hash = principal.reset().map(|r| r.token_hash.clone());
        stored.reset_token_expires_at = principal.reset().map(|r| r.expires_at);
        Ok(SaveOutcome::Saved)
    }
}

fn condition_holds(stored: &PrincipalRecord, condition: &SaveCondition) -> bool {
    match condition {
        SaveCondition::Always => true,
        SaveCondition::ResetHashEquals(expected) => stored.reset_token_hash == *expected,
    }
}
