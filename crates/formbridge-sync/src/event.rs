//! Inbound webhook event payloads.

use std::fmt;

use serde_json::Value;

use crate::error::{SyncError, SyncOpResult};
use crate::store::ExternalFields;

/// What happened to the external record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One webhook-delivered change for a single external record.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    /// External record identifier.
    pub record_id: String,
    /// Defaults to `Update` when the payload names no action.
    pub action: EventAction,
    /// Changed fields inlined in the payload, when the store sends them.
    /// Absent fields mean the record must be fetched.
    pub fields: Option<ExternalFields>,
}

/// Accepted spellings of the record-id key across store webhook formats.
const RECORD_ID_KEYS: &[&str] = &["record_id", "_recordId", "id"];

impl WebhookEvent {
    /// Parse a raw webhook body into an event.
    ///
    /// Expects a JSON object carrying a record id (under `record_id`,
    /// `_recordId`, or `id`), an optional `action`, and optionally the
    /// changed record under `fields`.
    pub fn parse(raw_payload: &[u8]) -> SyncOpResult<Self> {
        let document: Value = serde_json::from_slice(raw_payload)
            .map_err(|e| SyncError::invalid_payload(format!("not valid JSON: {e}")))?;
        let object = document
            .as_object()
            .ok_or_else(|| SyncError::invalid_payload("payload is not a JSON object"))?;

        let record_id = RECORD_ID_KEYS
            .iter()
            .find_map(|key| object.get(*key))
            .and_then(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| SyncError::invalid_payload("payload carries no record id"))?;

        let action = match object.get("action").and_then(Value::as_str) {
            None => EventAction::Update,
            Some("create") => EventAction::Create,
            Some("update") => EventAction::Update,
            Some("delete") => EventAction::Delete,
            Some(other) => {
                return Err(SyncError::invalid_payload(format!(
                    "unknown action '{other}'"
                )))
            }
        };

        let fields = object
            .get("fields")
            .and_then(Value::as_object)
            .cloned();

        Ok(Self {
            record_id,
            action,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_and_string_record_ids() {
        let event = WebhookEvent::parse(br#"{"record_id": 42}"#).unwrap();
        assert_eq!(event.record_id, "42");
        assert_eq!(event.action, EventAction::Update);
        assert!(event.fields.is_none());

        let event = WebhookEvent::parse(br#"{"_recordId": "a-7", "action": "create"}"#).unwrap();
        assert_eq!(event.record_id, "a-7");
        assert_eq!(event.action, EventAction::Create);
    }

    #[test]
    fn parses_inline_fields() {
        let event =
            WebhookEvent::parse(br#"{"id": 1, "action": "update", "fields": {"1001": "A"}}"#)
                .unwrap();
        let fields = event.fields.unwrap();
        assert_eq!(fields.get("1001").unwrap(), "A");
    }

    #[test]
    fn delete_action_is_recognized() {
        let event = WebhookEvent::parse(br#"{"record_id": 9, "action": "delete"}"#).unwrap();
        assert_eq!(event.action, EventAction::Delete);
    }

    #[test]
    fn rejects_unusable_payloads() {
        assert!(WebhookEvent::parse(b"not json").is_err());
        assert!(WebhookEvent::parse(b"[1, 2]").is_err());
        assert!(WebhookEvent::parse(br#"{"action": "update"}"#).is_err());
        assert!(WebhookEvent::parse(br#"{"record_id": 1, "action": "explode"}"#).is_err());
    }
}
