//! Storage building blocks shared by the outbox and inbox.

mod memory;

pub use memory::MemoryBackend;
