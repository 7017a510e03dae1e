use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::OutboxRecord;
use super::store::OutboxStore;
use crate::error::StoreError;
use crate::store::MemoryBackend;
use crate::transaction::RepositoryContext;

/// Transaction-aware in-memory outbox, the default store for tests and
/// single-process deployments. Clones share the same records.
#[derive(Clone)]
pub struct InMemoryOutboxStore {
    backend: MemoryBackend<OutboxRecord>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        InMemoryOutboxStore {
            backend: MemoryBackend::new("outbox"),
        }
    }

    /// Store that rejects every operation, for exercising failure paths.
    pub fn failing() -> Self {
        InMemoryOutboxStore {
            backend: MemoryBackend::failing("outbox"),
        }
    }
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn save(
        &self,
        record: &OutboxRecord,
        ctx: &RepositoryContext,
    ) -> Result<(), StoreError> {
        self.backend.insert(&record.id, record.clone(), ctx).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<OutboxRecord>, StoreError> {
        self.backend.get(id)
    }

    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
        let mut records: Vec<OutboxRecord> = self
            .backend
            .values("find_unprocessed")?
            .into_iter()
            .filter(|record| !record.processed())
            .collect();
        // Oldest first; id breaks ties so repeated queries agree.
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn delete_processed_before(
        &self,
        cutoff: DateTime<Utc>,
        ctx: &RepositoryContext,
    ) -> Result<usize, StoreError> {
        let expired: Vec<String> = self
            .backend
            .values("delete_processed")?
            .into_iter()
            .filter(|record| record.processed_before(cutoff))
            .map(|record| record.id)
            .collect();

        let mut deleted = 0;
        for id in &expired {
            if self.backend.remove(id, ctx).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn remove(&self, id: &str, ctx: &RepositoryContext) -> Result<(), StoreError> {
        self.backend.remove(id, ctx).await?;
        Ok(())
    }

    async fn clear(&self, ctx: &RepositoryContext) -> Result<(), StoreError> {
        self.backend.clear(ctx).await
    }
}
