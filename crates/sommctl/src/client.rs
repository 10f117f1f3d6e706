//! HTTP client for the somm daemon.
//!
//! The identify endpoints answer with a long-lived SSE response; this
//! client parses `event:`/`data:` frames out of the byte stream and
//! hands typed events to a callback. The stream is abandoned as soon
//! as `done` arrives.

use crate::fault::Fault;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use somm_common::{IdentifyError, StreamEvent};
use std::time::Duration;
use tracing::{debug, warn};

/// The daemon capability the dispatch engine depends on. Tests swap
/// in a scripted implementation.
#[async_trait]
pub trait IdentifyApi: Send + Sync {
    async fn identify_text(
        &self,
        text: &str,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), Fault>;

    async fn identify_image(
        &self,
        image_b64: &str,
        mime_type: &str,
        supplementary_text: Option<&str>,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), Fault>;
}

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7878";

/// Identification can run multiple model tiers back to back; allow
/// for the slowest configured tier plus escalation before giving up
/// locally.
const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Fault> {
        let http = reqwest::Client::builder()
            .timeout(STREAM_TIMEOUT)
            .build()
            .map_err(|e| Fault::Connection(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    pub async fn health(&self) -> Result<HealthReport, Fault> {
        let url = format!("{}/v1/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(classify_transport)?;
        response
            .json::<HealthReport>()
            .await
            .map_err(|e| Fault::Unknown(format!("malformed health payload: {}", e)))
    }

    async fn stream_identify(
        &self,
        body: serde_json::Value,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), Fault> {
        let url = format!("{}/v1/identify", self.base_url);
        debug!("  [>] POST {}", url);

        let mut response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            // Classification errors come back as plain JSON before any
            // stream opens.
            let payload = response.text().await.unwrap_or_default();
            return Err(Fault::Api(decode_error_payload(&payload)));
        }

        let mut parser = SseParser::default();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Fault::Connection(e.to_string()))?
        {
            for event in parser.feed(&String::from_utf8_lossy(&chunk)) {
                let is_done = event == StreamEvent::Done;
                on_event(event);
                if is_done {
                    debug!("  [<] stream closed");
                    return Ok(());
                }
            }
        }
        // Connection dropped before `done`
        warn!("  [<] stream ended without done event");
        Err(Fault::Connection(
            "stream ended before completion".to_string(),
        ))
    }
}

#[async_trait]
impl IdentifyApi for ApiClient {
    async fn identify_text(
        &self,
        text: &str,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), Fault> {
        self.stream_identify(json!({ "text": text }), on_event).await
    }

    async fn identify_image(
        &self,
        image_b64: &str,
        mime_type: &str,
        supplementary_text: Option<&str>,
        on_event: &mut (dyn FnMut(StreamEvent) + Send),
    ) -> Result<(), Fault> {
        let mut body = json!({ "image": image_b64, "mimeType": mime_type });
        if let Some(text) = supplementary_text {
            body["supplementaryText"] = json!(text);
        }
        self.stream_identify(body, on_event).await
    }
}

fn classify_transport(err: reqwest::Error) -> Fault {
    if err.is_timeout() {
        Fault::Api(IdentifyError::Timeout(err.to_string()))
    } else {
        Fault::Connection(err.to_string())
    }
}

fn decode_error_payload(payload: &str) -> IdentifyError {
    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return IdentifyError::Unknown(payload.to_string()),
    };
    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("request rejected")
        .to_string();
    match value.get("type").and_then(|t| t.as_str()) {
        Some("classification_error") => IdentifyError::Classification(message),
        Some("rate_limit") => IdentifyError::RateLimit(message),
        Some("overloaded") => IdentifyError::Overloaded(message),
        Some("timeout") => IdentifyError::Timeout(message),
        Some("server_error") => IdentifyError::Server(message),
        Some("processing_error") => IdentifyError::Processing(message),
        _ => IdentifyError::Unknown(message),
    }
}

/// Incremental SSE frame parser. Frames are `event: <name>` then one
/// or more `data:` lines, terminated by a blank line; a frame may be
/// split across chunks at any byte.
#[derive(Default)]
struct SseParser {
    line_buffer: String,
    event_name: Option<String>,
    data: String,
}

impl SseParser {
    fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.line_buffer.push_str(chunk);
        while let Some(newline) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(event) = self.complete_frame() {
                    events.push(event);
                }
            } else if let Some(name) = line.strip_prefix("event:") {
                self.event_name = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(data.trim_start());
            }
            // Comment lines and unknown fields are ignored
        }
        events
    }

    fn complete_frame(&mut self) -> Option<StreamEvent> {
        let name = self.event_name.take()?;
        let data = std::mem::take(&mut self.data);
        let event = StreamEvent::from_wire(&name, &data);
        if event.is_none() {
            warn!("  [-] unparseable {} frame dropped", name);
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_parser_whole_frame() {
        let mut parser = SseParser::default();
        let events = parser.feed("event: field\ndata: {\"field\":\"vintage\",\"value\":2018}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "field");
    }

    #[test]
    fn test_sse_parser_split_mid_line() {
        let mut parser = SseParser::default();
        assert!(parser.feed("event: do").is_empty());
        assert!(parser.feed("ne\ndata: {").is_empty());
        let events = parser.feed("}\n\n");
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_sse_parser_drops_unknown_event() {
        let mut parser = SseParser::default();
        let events = parser.feed("event: heartbeat\ndata: {}\n\nevent: done\ndata: {}\n\n");
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn test_error_payload_decoding() {
        let err = decode_error_payload(
            r#"{"type":"classification_error","message":"too short","retryable":false}"#,
        );
        assert_eq!(err.kind(), "classification_error");
        assert!(!err.retryable());
    }
}
