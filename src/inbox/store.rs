use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::{InboxRecord, InboxStatus};
use crate::error::StoreError;
use crate::transaction::RepositoryContext;

/// Persistence contract for inbound message records.
///
/// Same shape as the outbox side: mutations can join a transaction through
/// the [`RepositoryContext`], reads never enroll, `save` upserts.
#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn save(&self, record: &InboxRecord, ctx: &RepositoryContext)
        -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<InboxRecord>, StoreError>;

    /// Pending records, oldest `received_at` first, at most `limit`.
    async fn find_pending(&self, limit: usize) -> Result<Vec<InboxRecord>, StoreError>;

    /// Records in the given status, oldest `received_at` first.
    async fn find_by_status(
        &self,
        status: InboxStatus,
        limit: usize,
    ) -> Result<Vec<InboxRecord>, StoreError>;

    /// Deletes records that reached `processed` strictly before `cutoff`,
    /// returning how many were removed. Failed and duplicate records are
    /// kept for inspection.
    async fn delete_processed_before(
        &self,
        cutoff: DateTime<Utc>,
        ctx: &RepositoryContext,
    ) -> Result<usize, StoreError>;

    async fn remove(&self, id: &str, ctx: &RepositoryContext) -> Result<(), StoreError>;

    async fn clear(&self, ctx: &RepositoryContext) -> Result<(), StoreError>;
}
