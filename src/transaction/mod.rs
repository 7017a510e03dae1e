//! Local transaction coordination.
//!
//! A [`TransactionContext`] collects participants as stores are touched and
//! sweeps them on commit or rollback. [`Transaction::run`] wraps the whole
//! lifecycle for a single unit of work. Changes are applied to live storage
//! as they happen; rollback compensates from pre-images rather than
//! replaying a log.

mod context;
mod coordinator;
mod participant;
mod snapshot;

pub use context::{RepositoryContext, TransactionContext, TransactionError, TransactionState};
pub use coordinator::Transaction;
pub use participant::TransactionParticipant;
pub use snapshot::SnapshotParticipant;
