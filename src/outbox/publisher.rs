use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "emitter")]
use crate::EventEmitter;

/// Trait for publishing staged events to the transport of choice.
///
/// Implementations decide what a topic means for their broker. A failed
/// `publish` leaves the record in the outbox for the next drain cycle, so
/// implementations should only return `Ok` once the event is actually
/// accepted downstream.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    type Error: fmt::Display + Send;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish buffer poisoned")]
    BufferPoisoned,
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Publisher that appends every event to a shared buffer. Useful in tests
/// and single-process setups where delivery means handing the payload to
/// whoever holds the other end of the buffer.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    buffer: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, as `(topic, payload)` pairs.
    pub fn published(&self) -> Vec<(String, String)> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    type Error = PublishError;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Self::Error> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| PublishError::BufferPoisoned)?;
        buffer.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Publisher that refuses the first `n` attempts, or every attempt, for
/// exercising retry and give-up paths.
#[derive(Clone)]
pub struct FailingPublisher {
    fail_first: Option<u32>,
    attempts: Arc<AtomicU32>,
    delivered: Arc<Mutex<Vec<(String, String)>>>,
}

impl FailingPublisher {
    /// Rejects every publish.
    pub fn new() -> Self {
        FailingPublisher {
            fail_first: None,
            attempts: Arc::new(AtomicU32::new(0)),
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Rejects the first `n` publishes, then starts delivering.
    pub fn fail_times(n: u32) -> Self {
        FailingPublisher {
            fail_first: Some(n),
            ..Self::new()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for FailingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    type Error = PublishError;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Self::Error> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fail_first {
            Some(n) if attempt > n => {
                let mut delivered = self
                    .delivered
                    .lock()
                    .map_err(|_| PublishError::BufferPoisoned)?;
                delivered.push((topic.to_string(), payload.to_string()));
                Ok(())
            }
            _ => Err(PublishError::Rejected(format!(
                "attempt {attempt} refused"
            ))),
        }
    }
}

/// Publisher that emits events for in-process subscribers, with the topic
/// as the emitter's event name.
#[cfg(feature = "emitter")]
pub struct LocalEmitterPublisher {
    emitter: Mutex<EventEmitter>,
}

#[cfg(feature = "emitter")]
impl LocalEmitterPublisher {
    pub fn new(emitter: EventEmitter) -> Self {
        LocalEmitterPublisher {
            emitter: Mutex::new(emitter),
        }
    }
}

#[cfg(feature = "emitter")]
#[async_trait]
impl EventPublisher for LocalEmitterPublisher {
    type Error = PublishError;

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), Self::Error> {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| PublishError::BufferPoisoned)?;
        emitter.emit(topic, payload.to_string());
        Ok(())
    }
}
