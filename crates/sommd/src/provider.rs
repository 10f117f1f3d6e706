//! Model provider client.
//!
//! Talks to an Ollama-compatible chat API. The `ModelClient` trait is
//! the seam the orchestrator is tested through: production uses
//! `OllamaClient`, tests inject scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use somm_common::IdentifyError;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One completion call, fully specified by the orchestrator
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Which template this call came from, for logs and audit
    pub prompt_key: &'static str,
    pub model: String,
    pub system: String,
    pub user: String,
    /// Base64 image payload for vision models
    pub image: Option<String>,
    pub timeout: Duration,
    /// USD per 1000 tokens for this model
    pub cost_per_1k_tokens: f64,
}

/// Successful completion with accounting
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Non-streaming completion.
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, IdentifyError>;

    /// Streaming completion; `on_chunk` receives each raw text
    /// fragment as it arrives. Returns the same accounting as
    /// `complete` once the stream finishes.
    async fn complete_streaming(
        &self,
        req: &CompletionRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Completion, IdentifyError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Ollama-compatible chat client
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            // Per-request timeouts are set on each call; the client
            // itself stays unbounded.
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn build_request(req: &CompletionRequest, stream: bool) -> ChatRequest {
        ChatRequest {
            model: req.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: req.system.clone(),
                    images: None,
                },
                ChatMessage {
                    role: "user",
                    content: req.user.clone(),
                    images: req.image.clone().map(|i| vec![i]),
                },
            ],
            stream,
            format: "json",
        }
    }

    /// Map transport and HTTP failures onto the error taxonomy.
    fn classify_error(err: reqwest::Error) -> IdentifyError {
        if err.is_timeout() {
            IdentifyError::Timeout(err.to_string())
        } else if err.is_connect() {
            IdentifyError::Server(format!("provider unreachable: {}", err))
        } else {
            IdentifyError::Unknown(err.to_string())
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> IdentifyError {
        if status.as_u16() == 429 {
            IdentifyError::RateLimit(format!("provider returned 429: {}", body))
        } else if status.as_u16() == 529 || body.to_lowercase().contains("overload") {
            IdentifyError::Overloaded(format!("provider overloaded: {}", body))
        } else if status.is_server_error() {
            IdentifyError::Server(format!("provider returned {}: {}", status, body))
        } else {
            IdentifyError::Processing(format!("provider returned {}: {}", status, body))
        }
    }

    fn cost_for(tokens: u32, per_1k: f64) -> f64 {
        (tokens as f64 / 1000.0) * per_1k
    }

    /// Check provider reachability (health endpoint).
    pub async fn is_available(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, IdentifyError> {
        let start = Instant::now();
        info!("[>]  model call [{}] key={}", req.model, req.prompt_key);

        let response = self
            .http
            .post(self.chat_url())
            .timeout(req.timeout)
            .json(&Self::build_request(req, false))
            .send()
            .await
            .map_err(Self::classify_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("[-]  model call failed: {} {}", status, body);
            return Err(Self::classify_status(status, &body));
        }

        let chunk: ChatChunk = response
            .json()
            .await
            .map_err(|e| IdentifyError::Processing(format!("bad provider response: {}", e)))?;

        let content = chunk.message.map(|m| m.content).unwrap_or_default();
        let tokens = chunk.prompt_eval_count.unwrap_or(0) + chunk.eval_count.unwrap_or(0);
        let latency_ms = start.elapsed().as_millis() as u64;
        info!(
            "[<]  model response [{}] {} chars, {} tokens, {}ms",
            req.model,
            content.len(),
            tokens,
            latency_ms
        );

        Ok(Completion {
            content,
            tokens,
            cost_usd: Self::cost_for(tokens, req.cost_per_1k_tokens),
            latency_ms,
        })
    }

    async fn complete_streaming(
        &self,
        req: &CompletionRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<Completion, IdentifyError> {
        let start = Instant::now();
        info!(
            "[>]  streaming model call [{}] key={}",
            req.model, req.prompt_key
        );

        let mut response = self
            .http
            .post(self.chat_url())
            .timeout(req.timeout)
            .json(&Self::build_request(req, true))
            .send()
            .await
            .map_err(Self::classify_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("[-]  streaming model call failed: {} {}", status, body);
            return Err(Self::classify_status(status, &body));
        }

        // Provider streams NDJSON: one chat chunk per line.
        let mut content = String::new();
        let mut tokens = 0u32;
        let mut line_buffer = String::new();
        while let Some(bytes) = response.chunk().await.map_err(Self::classify_error)? {
            line_buffer.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(newline) = line_buffer.find('\n') {
                let line: String = line_buffer.drain(..=newline).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ChatChunk>(line) {
                    Ok(chunk) => {
                        if let Some(message) = chunk.message {
                            if !message.content.is_empty() {
                                content.push_str(&message.content);
                                on_chunk(&message.content);
                            }
                        }
                        if chunk.done {
                            tokens = chunk.prompt_eval_count.unwrap_or(0)
                                + chunk.eval_count.unwrap_or(0);
                        }
                    }
                    Err(e) => warn!("Skipping unparseable stream line: {}", e),
                }
            }
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        info!(
            "[<]  stream finished [{}] {} chars, {} tokens, {}ms",
            req.model,
            content.len(),
            tokens,
            latency_ms
        );

        Ok(Completion {
            content,
            tokens,
            cost_usd: Self::cost_for(tokens, req.cost_per_1k_tokens),
            latency_ms,
        })
    }
}

/// Extract the outermost JSON object from a completion that may be
/// wrapped in prose or code fences.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_direct() {
        let v = extract_json(r#"{"confidence": 90}"#).unwrap();
        assert_eq!(v["confidence"], 90);
    }

    #[test]
    fn test_extract_json_wrapped_in_prose() {
        let v = extract_json("Here is the result:\n```json\n{\"producer\": \"Gaja\"}\n```").unwrap();
        assert_eq!(v["producer"], "Gaja");
    }

    #[test]
    fn test_extract_json_garbage() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("} backwards {").is_none());
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;
        assert_eq!(
            OllamaClient::classify_status(StatusCode::TOO_MANY_REQUESTS, "").kind(),
            "rate_limit"
        );
        assert_eq!(
            OllamaClient::classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").kind(),
            "server_error"
        );
        assert_eq!(
            OllamaClient::classify_status(StatusCode::SERVICE_UNAVAILABLE, "model overloaded")
                .kind(),
            "overloaded"
        );
        assert_eq!(
            OllamaClient::classify_status(StatusCode::BAD_REQUEST, "nope").kind(),
            "processing_error"
        );
    }

    #[test]
    fn test_cost_accounting() {
        assert!((OllamaClient::cost_for(1500, 0.002) - 0.003).abs() < 1e-12);
        assert_eq!(OllamaClient::cost_for(1500, 0.0), 0.0);
    }
}
