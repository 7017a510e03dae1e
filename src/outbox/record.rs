use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::NEVER;
use crate::error::{require_json, require_non_empty, ValidationError};

/// Retries granted to a record when the caller does not pick a budget.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const MIN_MAX_RETRIES: u32 = 1;
const MAX_MAX_RETRIES: u32 = 10;

/// A staged event waiting in the outbox for delivery.
///
/// Serializes with camelCase field names so the stored shape matches what
/// external stores and dashboards already expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRecord {
    pub id: String,
    pub event_name: String,
    pub topic: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// [`NEVER`] until the record has been published.
    pub processed_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl OutboxRecord {
    /// Builds an unprocessed record, validating identity, routing, and that
    /// the payload parses as JSON.
    pub fn new(
        id: &str,
        event_name: &str,
        topic: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        require_non_empty("id", id)?;
        require_non_empty("eventName", event_name)?;
        require_non_empty("topic", topic)?;
        require_json(payload)?;

        Ok(OutboxRecord {
            id: id.to_string(),
            event_name: event_name.to_string(),
            topic: topic.to_string(),
            payload: payload.to_string(),
            created_at: now,
            updated_at: now,
            processed_at: NEVER,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Overrides the retry budget, clamped to a sane range.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.clamp(MIN_MAX_RETRIES, MAX_MAX_RETRIES);
        self
    }

    pub fn processed(&self) -> bool {
        self.processed_at != NEVER
    }

    pub fn processed_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.processed() && self.processed_at < cutoff
    }

    /// Whether another delivery attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries && !self.processed()
    }

    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.processed_at = now;
        self.updated_at = now;
    }

    /// Counts a failed attempt. Refuses to grow past the budget so an
    /// exhausted record cannot be silently retried forever.
    pub fn increment_retry(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if !self.can_retry() {
            return Err(ValidationError::RetryExhausted {
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.retry_count += 1;
        self.updated_at = now;
        Ok(())
    }
}
