//! Wire event model for one identification stream.
//!
//! A single identification is an ordered sequence of named events
//! over one long-lived response: optional `debug`, repeatable `field`
//! (confidence always last), at most one `escalating`, exactly one of
//! `result`/`error`, and always `done` last so the client can close
//! deterministically.

use crate::confidence::IdentifyAction;
use crate::error::IdentifyError;
use crate::tier::EscalationMeta;
use crate::wine::ParsedWine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// How the request arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Image,
}

/// A near-duplicate wine already present in the caller's catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    pub wine_id: i64,
    pub producer: Option<String>,
    pub wine_name: String,
    pub vintage: Option<u16>,
    /// 0.0..=1.0, higher ranks first
    pub similarity: f64,
}

/// Token/cost accounting for the surfaced tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub tokens: u32,
    pub cost_usd: f64,
}

/// Terminal success payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyResult {
    #[serde(rename = "inputType")]
    pub input_type: InputType,
    pub intent: String,
    pub parsed: ParsedWine,
    pub confidence: u8,
    pub action: IdentifyAction,
    pub candidates: Vec<DuplicateMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferences_applied: Option<Vec<String>>,
    pub streamed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated: Option<bool>,
}

/// One event in the identification stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Debug { message: String },
    Field { field: String, value: Value },
    Escalating { message: String },
    Result(Box<IdentifyResult>),
    Error(IdentifyError),
    Done,
}

impl StreamEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debug { .. } => "debug",
            Self::Field { .. } => "field",
            Self::Escalating { .. } => "escalating",
            Self::Result(_) => "result",
            Self::Error(_) => "error",
            Self::Done => "done",
        }
    }

    /// SSE data payload
    pub fn payload(&self) -> Value {
        match self {
            Self::Debug { message } => json!({ "message": message }),
            Self::Field { field, value } => json!({ "field": field, "value": value }),
            Self::Escalating { message } => json!({ "message": message }),
            Self::Result(result) => serde_json::to_value(result).unwrap_or_else(|_| json!({})),
            Self::Error(err) => json!({
                "type": err.kind(),
                "message": err.to_string(),
                "retryable": err.retryable(),
            }),
            Self::Done => json!({}),
        }
    }

    /// Parse a received SSE frame back into an event. Unknown names
    /// are dropped by callers; malformed payloads map to None.
    pub fn from_wire(name: &str, data: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(data).ok()?;
        match name {
            "debug" => Some(Self::Debug {
                message: value.get("message")?.as_str()?.to_string(),
            }),
            "field" => Some(Self::Field {
                field: value.get("field")?.as_str()?.to_string(),
                value: value.get("value")?.clone(),
            }),
            "escalating" => Some(Self::Escalating {
                message: value.get("message")?.as_str()?.to_string(),
            }),
            "result" => serde_json::from_value::<IdentifyResult>(value)
                .ok()
                .map(|r| Self::Result(Box::new(r))),
            "error" => {
                let message = value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                let err = match value.get("type").and_then(|t| t.as_str()) {
                    Some("classification_error") => IdentifyError::Classification(message),
                    Some("processing_error") => IdentifyError::Processing(message),
                    Some("timeout") => IdentifyError::Timeout(message),
                    Some("rate_limit") => IdentifyError::RateLimit(message),
                    Some("server_error") => IdentifyError::Server(message),
                    Some("overloaded") => IdentifyError::Overloaded(message),
                    _ => IdentifyError::Unknown(message),
                };
                Some(Self::Error(err))
            }
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_payload_shape() {
        let event = StreamEvent::Error(IdentifyError::RateLimit("slow down".into()));
        let payload = event.payload();
        assert_eq!(payload["type"], "rate_limit");
        assert_eq!(payload["retryable"], true);
        assert_eq!(event.name(), "error");
    }

    #[test]
    fn test_field_round_trip() {
        let event = StreamEvent::Field {
            field: "vintage".to_string(),
            value: json!(2018),
        };
        let parsed = StreamEvent::from_wire(event.name(), &event.payload().to_string()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_done_has_empty_payload() {
        assert_eq!(StreamEvent::Done.payload(), json!({}));
        assert_eq!(
            StreamEvent::from_wire("done", "{}"),
            Some(StreamEvent::Done)
        );
    }

    #[test]
    fn test_unknown_event_name_skipped() {
        assert_eq!(StreamEvent::from_wire("heartbeat", "{}"), None);
    }
}
