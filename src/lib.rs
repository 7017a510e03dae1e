//! Reliable event delivery for a single process: a transactional outbox,
//! a deduplicating inbox, and a snapshot-based local transaction
//! coordinator tying stores together.
//!
//! Staged events and state changes are saved under one [`Transaction::run`]
//! unit of work, an [`OutboxPump`] delivers them at least once, and an
//! [`InboxPump`] on the consuming side accepts each message exactly once
//! before dispatching it to registered handlers.

mod clock;
mod error;
mod inbox;
mod message;
mod outbox;
mod pump;
mod store;
mod transaction;

pub use clock::{Clock, ManualClock, SystemClock, NEVER};
pub use error::{StoreError, ValidationError};
pub use inbox::{
    HandlerRegistry, InMemoryInboxStore, InboxDrainReport, InboxHandler, InboxPump,
    InboxPumpConfig, InboxPumpStats, InboxRecord, InboxStatus, InboxStore, Receipt,
};
pub use message::Message;
pub use outbox::{
    EventPublisher, FailingPublisher, InMemoryOutboxStore, OutboxDrainReport, OutboxPump,
    OutboxPumpConfig, OutboxPumpStats, OutboxRecord, OutboxStore, PublishError,
    RecordingPublisher, DEFAULT_MAX_RETRIES,
};
pub use pump::PumpHandle;
pub use store::MemoryBackend;
pub use transaction::{
    RepositoryContext, SnapshotParticipant, Transaction, TransactionContext, TransactionError,
    TransactionParticipant, TransactionState,
};

#[cfg(feature = "emitter")]
pub use outbox::LocalEmitterPublisher;

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
