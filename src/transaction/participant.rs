use async_trait::async_trait;

/// One storage adapter's share of a unit of work.
///
/// A participant is registered on a [`TransactionContext`] the first time its
/// store mutates anything inside the transaction, and the coordinator drives
/// it from there. The contract is deliberately shaped so a real database
/// transaction fits behind it: `commit`/`rollback` wrap the driver's own
/// commit and rollback, and `dispose` releases the handle.
///
/// The in-memory stores in this crate satisfy it with a
/// [`SnapshotParticipant`](crate::SnapshotParticipant): writes go to the live
/// store eagerly, and rollback restores a pre-image captured on the first
/// mutation (apply-then-compensate, not copy-then-swap).
///
/// [`TransactionContext`]: crate::TransactionContext
#[async_trait]
pub trait TransactionParticipant: Send + Sync {
    /// Make the participant's writes final.
    async fn commit(&self) -> anyhow::Result<()>;

    /// Undo the participant's writes.
    ///
    /// Keep this side-effect free beyond the undo itself: a rollback failure
    /// propagates out of the coordinator and can mask the error that caused
    /// the rollback in the first place.
    async fn rollback(&self) -> anyhow::Result<()>;

    /// Release anything held for the transaction. Runs in every outcome.
    async fn dispose(&self);
}
