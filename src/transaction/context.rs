use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::participant::TransactionParticipant;

/// Lifecycle of a [`TransactionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Pending => "pending",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolledBack",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("cannot commit a transaction that has already been rolled back")]
    AlreadyRolledBack,
    #[error("participant '{key}' failed to commit: {source}")]
    Commit { key: String, source: anyhow::Error },
    #[error("participant '{key}' failed to roll back: {source}")]
    Rollback { key: String, source: anyhow::Error },
}

/// The participants enrolled in one unit of work, plus its lifecycle state.
///
/// Registration is first-wins per key and order-preserving: repeated
/// mutations from the same store reuse one participant, and commit/rollback
/// sweep participants in the order they joined.
///
/// The state flips only after a full sweep succeeds, so a participant
/// failure during `commit` leaves the context pending and rollback stays
/// legal.
pub struct TransactionContext {
    id: String,
    inner: Mutex<Inner>,
}

struct Inner {
    state: TransactionState,
    participants: Vec<(String, Arc<dyn TransactionParticipant>)>,
}

impl TransactionContext {
    pub fn new() -> Self {
        TransactionContext {
            id: Uuid::new_v4().to_string(),
            inner: Mutex::new(Inner {
                state: TransactionState::Pending,
                participants: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn state(&self) -> TransactionState {
        self.inner.lock().await.state
    }

    /// Look up a participant by key.
    pub async fn get(&self, key: &str) -> Option<Arc<dyn TransactionParticipant>> {
        let inner = self.inner.lock().await;
        inner
            .participants
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, participant)| Arc::clone(participant))
    }

    /// Register a participant under `key`.
    ///
    /// The first registration per key wins; a repeat returns the already
    /// registered participant and discards the new one.
    pub async fn register(
        &self,
        key: impl Into<String>,
        participant: Arc<dyn TransactionParticipant>,
    ) -> Arc<dyn TransactionParticipant> {
        let key = key.into();
        let mut inner = self.inner.lock().await;
        if let Some((_, existing)) = inner.participants.iter().find(|(k, _)| *k == key) {
            return Arc::clone(existing);
        }
        inner.participants.push((key, Arc::clone(&participant)));
        participant
    }

    /// Commit every participant in registration order.
    ///
    /// A no-op when already committed; an error when already rolled back.
    /// The first participant failure stops the sweep and is returned with
    /// the context still pending.
    pub async fn commit(&self) -> Result<(), TransactionError> {
        let participants = {
            let inner = self.inner.lock().await;
            match inner.state {
                TransactionState::Committed => return Ok(()),
                TransactionState::RolledBack => return Err(TransactionError::AlreadyRolledBack),
                TransactionState::Pending => inner.participants.clone(),
            }
        };

        for (key, participant) in &participants {
            participant
                .commit()
                .await
                .map_err(|source| TransactionError::Commit {
                    key: key.clone(),
                    source,
                })?;
        }

        self.inner.lock().await.state = TransactionState::Committed;
        Ok(())
    }

    /// Roll back every participant in registration order.
    ///
    /// A no-op when already rolled back. Rolling back after a commit is
    /// allowed and sweeps participants that have nothing left to restore.
    pub async fn rollback(&self) -> Result<(), TransactionError> {
        let participants = {
            let inner = self.inner.lock().await;
            if inner.state == TransactionState::RolledBack {
                return Ok(());
            }
            inner.participants.clone()
        };

        for (key, participant) in &participants {
            participant
                .rollback()
                .await
                .map_err(|source| TransactionError::Rollback {
                    key: key.clone(),
                    source,
                })?;
        }

        self.inner.lock().await.state = TransactionState::RolledBack;
        Ok(())
    }

    /// Dispose every participant, regardless of outcome.
    pub async fn dispose(&self) {
        let participants = {
            let inner = self.inner.lock().await;
            inner.participants.clone()
        };
        for (_, participant) in &participants {
            participant.dispose().await;
        }
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque context threaded through repository calls so adapters can join a
/// unit of work without the domain layer knowing about them.
#[derive(Clone, Default)]
pub struct RepositoryContext {
    pub transaction: Option<Arc<TransactionContext>>,
}

impl RepositoryContext {
    /// A context outside of any transaction.
    pub fn none() -> Self {
        RepositoryContext { transaction: None }
    }

    pub fn with_transaction(transaction: Arc<TransactionContext>) -> Self {
        RepositoryContext {
            transaction: Some(transaction),
        }
    }
}
