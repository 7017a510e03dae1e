use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::OutboxRecord;
use crate::error::StoreError;
use crate::transaction::RepositoryContext;

/// Persistence contract for staged outbox records.
///
/// Mutations accept a [`RepositoryContext`] so the store can join an open
/// transaction; reads never enroll. `save` upserts, so the pump uses it for
/// both staging and status updates.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn save(
        &self,
        record: &OutboxRecord,
        ctx: &RepositoryContext,
    ) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<OutboxRecord>, StoreError>;

    /// Unprocessed records, oldest `created_at` first, at most `limit`.
    async fn find_unprocessed(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Deletes records processed strictly before `cutoff`, returning how
    /// many were removed. Unprocessed records are never touched.
    async fn delete_processed_before(
        &self,
        cutoff: DateTime<Utc>,
        ctx: &RepositoryContext,
    ) -> Result<usize, StoreError>;

    async fn remove(&self, id: &str, ctx: &RepositoryContext) -> Result<(), StoreError>;

    async fn clear(&self, ctx: &RepositoryContext) -> Result<(), StoreError>;
}
