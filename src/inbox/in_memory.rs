use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::{InboxRecord, InboxStatus};
use super::store::InboxStore;
use crate::error::StoreError;
use crate::store::MemoryBackend;
use crate::transaction::RepositoryContext;

/// Transaction-aware in-memory inbox store. Clones share the same records.
#[derive(Clone)]
pub struct InMemoryInboxStore {
    backend: MemoryBackend<InboxRecord>,
}

impl InMemoryInboxStore {
    pub fn new() -> Self {
        InMemoryInboxStore {
            backend: MemoryBackend::new("inbox"),
        }
    }

    /// Store that rejects every operation, for exercising failure paths.
    pub fn failing() -> Self {
        InMemoryInboxStore {
            backend: MemoryBackend::failing("inbox"),
        }
    }

    fn sorted_oldest_first(mut records: Vec<InboxRecord>) -> Vec<InboxRecord> {
        records.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }
}

impl Default for InMemoryInboxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InboxStore for InMemoryInboxStore {
    async fn save(
        &self,
        record: &InboxRecord,
        ctx: &RepositoryContext,
    ) -> Result<(), StoreError> {
        self.backend.insert(&record.id, record.clone(), ctx).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<InboxRecord>, StoreError> {
        self.backend.get(id)
    }

    async fn find_pending(&self, limit: usize) -> Result<Vec<InboxRecord>, StoreError> {
        let pending = self
            .backend
            .values("find_pending")?
            .into_iter()
            .filter(|record| record.can_process())
            .collect();
        let mut records = Self::sorted_oldest_first(pending);
        records.truncate(limit);
        Ok(records)
    }

    async fn find_by_status(
        &self,
        status: InboxStatus,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, StoreError> {
        let matching = self
            .backend
            .values("find_by_status")?
            .into_iter()
            .filter(|record| record.status == status)
            .collect();
        let mut records = Self::sorted_oldest_first(matching);
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
