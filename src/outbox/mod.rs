//! Transactional outbox: stage events with your state change, deliver later.

mod in_memory;
mod publisher;
mod pump;
mod record;
mod store;

// Records
pub use record::{OutboxRecord, DEFAULT_MAX_RETRIES};

// Stores
pub use in_memory::InMemoryOutboxStore;
pub use store::OutboxStore;

// Publishers
pub use publisher::{EventPublisher, FailingPublisher, PublishError, RecordingPublisher};
#[cfg(feature = "emitter")]
pub use publisher::LocalEmitterPublisher;

// Pump
pub use pump::{OutboxDrainReport, OutboxPump, OutboxPumpConfig, OutboxPumpStats};
