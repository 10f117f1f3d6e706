//! API routes for sommd.
//!
//! One long-lived SSE response per identification. Input validation
//! failures never open a stream: they come back as a plain HTTP 400
//! with a classification error body.

use crate::orchestrator::IdentifyInput;
use crate::server::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use somm_common::{IdentifyError, ImageIdentifyRequest, StreamEvent, TextIdentifyRequest};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::info;

type AppStateArc = Arc<AppState>;
type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

// ============================================================================
// Identify Routes
// ============================================================================

pub fn identify_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/identify", post(identify))
}

/// Text and image requests share the endpoint; the image shape is
/// tried first since it has the stricter field set.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdentifyRequestBody {
    Image(ImageIdentifyRequest),
    Text(TextIdentifyRequest),
}

fn classification_response(err: &IdentifyError) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "type": err.kind(),
            "message": err.to_string(),
            "retryable": err.retryable(),
        })),
    )
}

async fn identify(
    State(state): State<AppStateArc>,
    Json(body): Json<IdentifyRequestBody>,
) -> Result<Sse<EventStream>, (StatusCode, Json<Value>)> {
    let input = match &body {
        IdentifyRequestBody::Text(req) => {
            let text = req.validate().map_err(|e| classification_response(&e))?;
            info!("  Identify request (text, {} chars)", text.len());
            IdentifyInput::Text { text }
        }
        IdentifyRequestBody::Image(req) => {
            req.validate().map_err(|e| classification_response(&e))?;
            info!("  Identify request (image, {})", req.mime_type);
            IdentifyInput::Image {
                image: req.image.clone(),
                supplementary_text: req.supplementary_text.clone(),
            }
        }
    };

    let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
    let engine = state.engine.clone();
    // The task owns the per-request detector state; a dropped receiver
    // (client went away) just makes the remaining sends no-ops.
    tokio::spawn(async move {
        engine.identify(input, tx).await;
    });

    let stream: EventStream = Box::pin(UnboundedReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .event(event.name())
            .data(event.payload().to_string()))
    }));
    Ok(Sse::new(stream))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
