use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed envelope of an inbound integration message.
///
/// `id` and `name` are mandatory; everything else a peer put in the envelope
/// survives either in the typed fields or in `data`, so a handler can reach
/// the original payload without re-parsing the raw string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Event-specific fields that are not part of the common envelope.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Message {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            name: name.into(),
            topic: None,
            version: None,
            occurred_on: None,
            metadata: Map::new(),
            data: Map::new(),
        }
    }

    /// Attach an event-specific field to the envelope.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_envelope() {
        let payload = r#"{
            "id": "msg-1",
            "name": "UserCreated",
            "topic": "users",
            "version": "1.0",
            "occurredOn": "2024-03-01T12:00:00Z",
            "metadata": {"traceId": "t-1"},
            "userId": "u-42",
            "email": "alice@example.com"
        }"#;

        let message = Message::parse(payload).unwrap();
        assert_eq!(message.id, "msg-1");
        assert_eq!(message.name, "UserCreated");
        assert_eq!(message.topic.as_deref(), Some("users"));
        assert_eq!(message.version.as_deref(), Some("1.0"));
        assert_eq!(message.metadata["traceId"], json!("t-1"));
        assert_eq!(message.data["userId"], json!("u-42"));
        assert_eq!(message.data["email"], json!("alice@example.com"));
    }

    #[test]
    fn optional_fields_default() {
        let message = Message::parse(r#"{"id": "msg-2", "name": "Ping"}"#).unwrap();
        assert!(message.topic.is_none());
        assert!(message.occurred_on.is_none());
        assert!(message.metadata.is_empty());
        assert!(message.data.is_empty());
    }

    #[test]
    fn missing_id_fails_to_parse() {
        assert!(Message::parse(r#"{"name": "Ping"}"#).is_err());
    }

    #[test]
    fn round_trips_through_payload() {
        let message = Message::new("msg-3", "OrderPlaced").with_field("total", json!(99));
        let payload = message.to_payload().unwrap();
        let parsed = Message::parse(&payload).unwrap();
        assert_eq!(parsed, message);
    }
}
