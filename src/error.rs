use thiserror::Error;

/// Errors raised while constructing or mutating a record.
///
/// These surface synchronously to the caller and are never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("payload is not valid JSON: {reason}")]
    MalformedPayload { reason: String },
    #[error("retry count {retry_count} cannot grow beyond max retries {max_retries}")]
    RetryExhausted { retry_count: u32, max_retries: u32 },
    #[error("cannot transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("store unavailable during {0}")]
    Unavailable(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Whitespace-only counts as empty.
pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Empty { field })
    } else {
        Ok(())
    }
}

pub(crate) fn require_json(payload: &str) -> Result<(), ValidationError> {
    serde_json::from_str::<serde_json::Value>(payload)
        .map(|_| ())
        .map_err(|err| ValidationError::MalformedPayload {
            reason: err.to_string(),
        })
}
