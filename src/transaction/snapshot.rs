use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::anyhow;
use async_trait::async_trait;

use super::participant::TransactionParticipant;

/// Compensating participant for a keyed in-memory store.
///
/// Holds the store's full pre-image, captured when the store's first
/// mutation inside the transaction enrolled it. Writes keep going to the
/// live map; rollback swaps the pre-image back in, commit and dispose just
/// drop it.
pub struct SnapshotParticipant<T> {
    storage: Arc<RwLock<HashMap<String, T>>>,
    image: Mutex<Option<HashMap<String, T>>>,
}

impl<T> SnapshotParticipant<T> {
    pub fn new(storage: Arc<RwLock<HashMap<String, T>>>, image: HashMap<String, T>) -> Self {
        SnapshotParticipant {
            storage,
            image: Mutex::new(Some(image)),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> TransactionParticipant for SnapshotParticipant<T> {
    async fn commit(&self) -> anyhow::Result<()> {
        // Writes already landed in the live store; just release the pre-image.
        self.image
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        let image = self
            .image
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(image) = image {
            let mut storage = self
                .storage
                .write()
                .map_err(|_| anyhow!("store lock poisoned during rollback"))?;
            *storage = image;
        }
        Ok(())
    }

    async fn dispose(&self) {
        self.image
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
