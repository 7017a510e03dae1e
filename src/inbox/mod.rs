//! Deduplicating inbox: accept each message once, dispatch to handlers.

mod in_memory;
mod pump;
mod record;
mod registry;
mod store;

// Records
pub use record::{InboxRecord, InboxStatus};

// Stores
pub use in_memory::InMemoryInboxStore;
pub use store::InboxStore;

// Handlers
pub use registry::{HandlerRegistry, InboxHandler};

// Pump
pub use pump::{InboxDrainReport, InboxPump, InboxPumpConfig, InboxPumpStats, Receipt};
