use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::NEVER;
use crate::error::{require_json, require_non_empty, ValidationError};

/// Processing state of an inbound message.
///
/// Transitions are one-way: `pending -> processing -> processed | failed`,
/// with `duplicate` as a separate terminal branch off `pending`. Nothing
/// moves backwards, so a record that reached a terminal state stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Duplicate,
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxStatus::Pending => "pending",
            InboxStatus::Processing => "processing",
            InboxStatus::Processed => "processed",
            InboxStatus::Failed => "failed",
            InboxStatus::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for InboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound message keyed by its original id.
///
/// The id comes from the producer, not from this store, which is what makes
/// a second delivery of the same message detectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxRecord {
    pub id: String,
    pub event_name: String,
    pub topic: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
    /// [`NEVER`] until the record reaches `processed` or `duplicate`.
    pub processed_at: DateTime<Utc>,
    pub status: InboxStatus,
}

impl InboxRecord {
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

        Ok(InboxRecord {
            id: id.to_string(),
            event_name: event_name.to_string(),
            topic: topic.to_string(),
            payload: payload.to_string(),
            received_at: now,
            processed_at: NEVER,
            status: InboxStatus::Pending,
        })
    }

    pub fn can_process(&self) -> bool {
        self.status == InboxStatus::Pending
    }

    pub fn processed(&self) -> bool {
        self.status == InboxStatus::Processed
    }

    pub fn processed_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.processed() && self.processed_at < cutoff
    }

    pub fn mark_processing(&mut self) -> Result<(), ValidationError> {
        if !self.can_process() {
            return Err(invalid_transition(self.status, InboxStatus::Processing));
        }
        self.status = InboxStatus::Processing;
        Ok(())
    }

    pub fn mark_processed(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.status != InboxStatus::Processing {
            return Err(invalid_transition(self.status, InboxStatus::Processed));
        }
        self.status = InboxStatus::Processed;
        self.processed_at = now;
        Ok(())
    }

    pub fn mark_failed(&mut self) -> Result<(), ValidationError> {
        if !matches!(self.status, InboxStatus::Pending | InboxStatus::Processing) {
            return Err(invalid_transition(self.status, InboxStatus::Failed));
        }
        self.status = InboxStatus::Failed;
        Ok(())
    }

    /// Flags a record the caller decided not to reprocess. Only a record
    /// still waiting can be flagged; anything in flight or settled keeps
    /// its state.
    pub fn mark_duplicate(&mut self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.status != InboxStatus::Pending {
            return Err(invalid_transition(self.status, InboxStatus::Duplicate));
        }
        self.status = InboxStatus::Duplicate;
        self.processed_at = now;
        Ok(())
    }
}

fn invalid_transition(from: InboxStatus, to: InboxStatus) -> ValidationError {
    ValidationError::InvalidTransition {
        from: from.as_str(),
        to: to.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record() -> InboxRecord {
        InboxRecord::new("msg-1", "user.created", "users", r#"{"id":"u-1"}"#, fixed_now())
            .unwrap()
    }

    #[test]
    fn new_record_is_pending_and_never_processed() {
        let record = record();
        assert_eq!(record.status, InboxStatus::Pending);
        assert!(record.can_process());
        assert!(!record.processed());
        assert_eq!(record.processed_at, NEVER);
    }

    #[test]
    fn rejects_blank_fields_and_bad_payload() {
        assert!(InboxRecord::new("", "e", "t", "{}", fixed_now()).is_err());
        assert!(InboxRecord::new("msg-1", "", "t", "{}", fixed_now()).is_err());
        assert!(InboxRecord::new("msg-1", "e", "", "{}", fixed_now()).is_err());
        assert!(InboxRecord::new("msg-1", "e", "t", "oops", fixed_now()).is_err());
    }

    #[test]
    fn happy_path_walks_pending_processing_processed() {
        let mut record = record();
        let later = fixed_now() + chrono::Duration::seconds(3);

        record.mark_processing().unwrap();
        assert_eq!(record.status, InboxStatus::Processing);
        assert!(!record.can_process());

        record.mark_processed(later).unwrap();
        assert_eq!(record.status, InboxStatus::Processed);
        assert_eq!(record.processed_at, later);
    }

    #[test]
    fn processed_requires_processing_first() {
        let mut record = record();
        let err = record.mark_processed(fixed_now()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidTransition {
                from: "pending",
                to: "processed",
            }
        );
    }

    #[test]
    fn failed_is_reachable_from_pending_and_processing() {
        let mut from_pending = record();
        from_pending.mark_failed().unwrap();
        assert_eq!(from_pending.status, InboxStatus::Failed);

        let mut from_processing = record();
        from_processing.mark_processing().unwrap();
        from_processing.mark_failed().unwrap();
        assert_eq!(from_processing.status, InboxStatus::Failed);
    }

    #[test]
    fn terminal_states_stay_terminal() {
        let mut failed = record();
        failed.mark_failed().unwrap();
        assert!(failed.mark_processing().is_err());
        assert!(failed.mark_failed().is_err());
        assert!(failed.mark_duplicate(fixed_now()).is_err());

        let mut processed = record();
        processed.mark_processing().unwrap();
        processed.mark_processed(fixed_now()).unwrap();
        assert!(processed.mark_processing().is_err());
        assert!(processed.mark_failed().is_err());
    }

    #[test]
    fn duplicate_flags_only_pending_records_and_stamps_the_time() {
        let mut record = record();
        record.mark_duplicate(fixed_now()).unwrap();
        assert_eq!(record.status, InboxStatus::Duplicate);
        assert_eq!(record.processed_at, fixed_now());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["eventName"], "user.created");
        assert!(json.get("receivedAt").is_some());

        let mut processing = record();
        processing.mark_processing().unwrap();
        let json = serde_json::to_value(processing).unwrap();
        assert_eq!(json["status"], "processing");
    }
}
