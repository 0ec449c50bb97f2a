//! Store wrapper that lets a concurrent writer in after every lookup

use async_trait::async_trait;
use natours_core::{
    Email, NatoursResult, Principal, PrincipalId, PrincipalStore, Projection, SaveCondition,
    SaveOutcome,
};

use super::MemoryPrincipalStore;

/// Applies `interfere` to the stored principal right after each lookup and
/// writes it back, so the caller holds a stale snapshot
pub(crate) struct RacingStore {
    pub inner: MemoryPrincipalStore,
    pub interfere: fn(&mut Principal),
}

impl RacingStore {
    pub fn new(interfere: fn(&mut Principal)) -> Self {
        Self {
            inner: MemoryPrincipalStore::new(),
            interfere,
        }
    }

    async fn race(&self, found: &Option<Principal>) -> NatoursResult<()> {
        let Some(principal) = found else {
            return Ok(());
        };
        let current = self
            .inner
            .find_by_id(&principal.id(), Projection::WithPasswordHash)
            .await?;
        if let Some(mut current) = current {
            (self.interfere)(&mut current);
            self.inner.save(&current, SaveCondition::Always).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PrincipalStore for RacingStore {
    async fn insert(&self, principal: &Principal) -> NatoursResult<()> {
        self.inner.insert(principal).await
    }

    async fn find_by_id(
        &self,
        id: &PrincipalId,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>> {
        let found = self.inner.find_by_id(id, projection).await?;
        self.race(&found).await?;
        Ok(found)
    }

    async fn find_by_email(
        &self,
        email: &Email,
        projection: Projection,
    ) -> NatoursResult<Option<Principal>> {
        let found = self.inner.find_by_email(email, projection).await?;
        self.race(&found).await?;
        Ok(found)
    }

    async fn find_by_reset_hash(&self, token_hash: &str) -> NatoursResult<Option<Principal>> {
        let found = self.inner.find_by_reset_hash(token_hash).await?;
        self.race(&found).await?;
        Ok(found)
    }

    async fn save(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome> {
        self.inner.save(principal, condition).await
    }

    async fn save_credentials(
        &self,
        principal: &Principal,
        condition: SaveCondition,
    ) -> NatoursResult<SaveOutcome> {
        self.inner.save_credentials(principal, condition).await
    }
}
