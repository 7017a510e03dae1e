use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::transaction::{RepositoryContext, SnapshotParticipant};

static STORE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Keyed in-memory storage shared by the outbox and inbox stores.
///
/// Cloning shares the underlying map, so a pump and the code staging
/// records can hold separate handles to the same data. Each backend owns a
/// unique participant key; the first mutation inside a transaction snapshots
/// the whole map and registers a [`SnapshotParticipant`] under that key, and
/// later mutations find the key already taken and skip the capture.
#[derive(Clone)]
pub struct MemoryBackend<T> {
    items: Arc<RwLock<HashMap<String, T>>>,
    participant_key: String,
    should_fail: bool,
}

impl<T: Clone + Send + Sync + 'static> MemoryBackend<T> {
    pub fn new(namespace: &str) -> Self {
        MemoryBackend {
            items: Arc::new(RwLock::new(HashMap::new())),
            participant_key: next_key(namespace),
            should_fail: false,
        }
    }

    /// Backend that rejects every operation, for exercising failure paths.
    pub fn failing(namespace: &str) -> Self {
        MemoryBackend {
            items: Arc::new(RwLock::new(HashMap::new())),
            participant_key: next_key(namespace),
            should_fail: true,
        }
    }

    fn check_available(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.should_fail {
            return Err(StoreError::Unavailable(operation));
        }
        Ok(())
    }

    /// Joins the surrounding transaction, capturing the pre-image on first
    /// contact. Runs before availability checks so even a store that is
    /// about to refuse the write can still be rolled back.
    async fn enlist(&self, ctx: &RepositoryContext) -> Result<(), StoreError> {
        let Some(transaction) = ctx.transaction.as_deref() else {
            return Ok(());
        };
        if transaction.get(&self.participant_key).await.is_some() {
            return Ok(());
        }

        let image = self
            .items
            .read()
            .map_err(|_| StoreError::LockPoisoned("snapshot"))?
            .clone();
        transaction
            .register(
                self.participant_key.clone(),
                Arc::new(SnapshotParticipant::new(Arc::clone(&self.items), image)),
            )
            .await;
        Ok(())
    }

    pub async fn insert(
        &self,
        id: &str,
        item: T,
        ctx: &RepositoryContext,
    ) -> Result<(), StoreError> {
        self.enlist(ctx).await?;
        self.check_available("save")?;
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::LockPoisoned("save"))?;
        items.insert(id.to_string(), item);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.check_available("find_by_id")?;
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::LockPoisoned("find_by_id"))?;
        Ok(items.get(id).cloned())
    }

    pub fn values(&self, operation: &'static str) -> Result<Vec<T>, StoreError> {
        self.check_available(operation)?;
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::LockPoisoned(operation))?;
        Ok(items.values().cloned().collect())
    }

    pub async fn remove(&self, id: &str, ctx: &RepositoryContext) -> Result<bool, StoreError> {
        self.enlist(ctx).await?;
        self.check_available("remove")?;
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::LockPoisoned("remove"))?;
        Ok(items.remove(id).is_some())
    }

    pub async fn clear(&self, ctx: &RepositoryContext) -> Result<(), StoreError> {
        self.enlist(ctx).await?;
        self.check_available("clear")?;
        let mut items = self
            .items
            .write()
            .map_err(|_| StoreError::LockPoisoned("clear"))?;
        items.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.check_available("len")?;
        let items = self
            .items
            .read()
            .map_err(|_| StoreError::LockPoisoned("len"))?;
        Ok(items.len())
    }
}

fn next_key(namespace: &str) -> String {
    format!("{}#{}", namespace, STORE_SEQ.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionContext;

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let backend: MemoryBackend<String> = MemoryBackend::new("test");
        backend
            .insert("a", "first".to_string(), &RepositoryContext::none())
            .await
            .unwrap();

        assert_eq!(backend.get("a").unwrap(), Some("first".to_string()));
        assert_eq!(backend.get("missing").unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_the_same_map() {
        let backend: MemoryBackend<String> = MemoryBackend::new("test");
        let other = backend.clone();

        backend
            .insert("a", "shared".to_string(), &RepositoryContext::none())
            .await
            .unwrap();

        assert_eq!(other.get("a").unwrap(), Some("shared".to_string()));
    }

    #[tokio::test]
    async fn distinct_backends_get_distinct_participant_keys() {
        let first: MemoryBackend<String> = MemoryBackend::new("test");
        let second: MemoryBackend<String> = MemoryBackend::new("test");
        assert_ne!(first.participant_key, second.participant_key);
    }

    #[tokio::test]
    async fn failing_backend_rejects_operations() {
        let backend: MemoryBackend<String> = MemoryBackend::failing("test");
        let err = backend
            .insert("a", "nope".to_string(), &RepositoryContext::none())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable("save")));
        assert!(backend.get("a").is_err());
        assert!(matches!(backend.len(), Err(StoreError::Unavailable("len"))));
    }

    #[tokio::test]
    async fn rollback_undoes_writes_made_inside_a_transaction() {
        let backend: MemoryBackend<String> = MemoryBackend::new("test");
        backend
            .insert("kept", "before".to_string(), &RepositoryContext::none())
            .await
            .unwrap();

        let transaction = Arc::new(TransactionContext::new());
        let ctx = RepositoryContext::with_transaction(Arc::clone(&transaction));

        backend
            .insert("kept", "dirty".to_string(), &ctx)
            .await
            .unwrap();
        backend
            .insert("added", "dirty".to_string(), &ctx)
            .await
            .unwrap();
        transaction.rollback().await.unwrap();

        assert_eq!(backend.get("kept").unwrap(), Some("before".to_string()));
        assert_eq!(backend.get("added").unwrap(), None);
    }

    #[tokio::test]
    async fn enlist_captures_the_pre_image_only_once() {
        let backend: MemoryBackend<String> = MemoryBackend::new("test");
        let transaction = Arc::new(TransactionContext::new());
        let ctx = RepositoryContext::with_transaction(Arc::clone(&transaction));

        backend
            .insert("a", "first write".to_string(), &ctx)
            .await
            .unwrap();
        // Second write must not re-snapshot the now-dirty map.
        backend
            .insert("a", "second write".to_string(), &ctx)
            .await
            .unwrap();
        transaction.rollback().await.unwrap();

        assert_eq!(backend.get("a").unwrap(), None);
    }

    #[tokio::test]
    async fn failing_backend_still_enlists_for_rollback() {
        let backend: MemoryBackend<String> = MemoryBackend::failing("test");
        let transaction = Arc::new(TransactionContext::new());
        let ctx = RepositoryContext::with_transaction(Arc::clone(&transaction));

        let result = backend.insert("a", "nope".to_string(), &ctx).await;
        assert!(result.is_err());
        assert!(transaction.get(&backend.participant_key).await.is_some());
    }

    #[tokio::test]
    async fn remove_reports_whether_anything_was_there() {
        let backend: MemoryBackend<String> = MemoryBackend::new("test");
        backend
            .insert("a", "first".to_string(), &RepositoryContext::none())
            .await
            .unwrap();

        assert!(backend.remove("a", &RepositoryContext::none()).await.unwrap());
        assert!(!backend.remove("a", &RepositoryContext::none()).await.unwrap());
    }

    #[tokio::test]
    async fn clear_empties_the_map() {
        let backend: MemoryBackend<String> = MemoryBackend::new("test");
        backend
            .insert("a", "one".to_string(), &RepositoryContext::none())
            .await
            .unwrap();
        backend
            .insert("b", "two".to_string(), &RepositoryContext::none())
            .await
            .unwrap();

        backend.clear(&RepositoryContext::none()).await.unwrap();
        assert_eq!(backend.len().unwrap(), 0);
    }
}
