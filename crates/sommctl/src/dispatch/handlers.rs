//! Base action handlers, innermost ring of the middleware chain.
//!
//! By the time these run the validator has already vetted phase and
//! prerequisites; handlers only perform the work and move the phase
//! machine along the transition table.

use crate::client::IdentifyApi;
use crate::dispatch::context::{AddFlowState, DispatchContext};
use crate::dispatch::middleware::Handler;
use crate::dispatch::phase::{next_phase, Phase};
use crate::dispatch::validator;
use crate::dispatch::Action;
use crate::fault::Fault;
use somm_common::{
    AgentMessage, Chip, IdentifyAction, IdentifyError, MessagePayload, Role, StreamEvent,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub const GREETING: &str =
    "Hi! Describe a wine or share a label photo and I'll identify it for you.";

/// Build the production base handler around an API client.
pub fn base_handler(client: Arc<dyn IdentifyApi>) -> Handler {
    Arc::new(move |ctx, action| {
        let client = client.clone();
        Box::pin(async move { handle(client.as_ref(), &ctx, action).await })
    })
}

async fn handle(
    client: &dyn IdentifyApi,
    ctx: &Arc<DispatchContext>,
    action: Action,
) -> Result<(), Fault> {
    match action {
        Action::SubmitText { text } => {
            ctx.push_message(AgentMessage::user_text(&text));
            advance(ctx, "submit_text");
            run_identification(client, ctx, Submission::Text(&text)).await
        }
        Action::SubmitImage {
            image,
            mime_type,
            supplementary_text,
        } => {
            ctx.push_message(AgentMessage::new(
                Role::User,
                MessagePayload::Image {
                    caption: supplementary_text.clone(),
                },
            ));
            advance(ctx, "submit_image");
            run_identification(
                client,
                ctx,
                Submission::Image {
                    image: &image,
                    mime_type: &mime_type,
                    supplementary_text: supplementary_text.as_deref(),
                },
            )
            .await
        }
        Action::SelectChip {
            message_id,
            chip_id,
        } => select_chip(ctx, message_id, &chip_id),
        Action::AddToCellar => add_to_cellar(ctx),
        Action::RejectIdentification => {
            advance(ctx, "reject_identification");
            ctx.clear_flow_state();
            ctx.push_message(AgentMessage::agent_text(
                "No problem. Tell me a bit more about the label and I'll try again.",
            ));
            Ok(())
        }
        Action::RequestEnrichment => request_enrichment(ctx),
        Action::Retry => retry(ctx),
        Action::StartOver => start_over(ctx),
    }
}

/// Move the phase machine if the transition table has an entry.
fn advance(ctx: &DispatchContext, action_kind: &str) {
    if let Some(next) = next_phase(ctx.phase(), action_kind) {
        ctx.set_phase(next);
    }
}

enum Submission<'a> {
    Text(&'a str),
    Image {
        image: &'a str,
        mime_type: &'a str,
        supplementary_text: Option<&'a str>,
    },
}

/// Drive one identification stream, surfacing fields into the
/// transcript as they arrive.
async fn run_identification(
    client: &dyn IdentifyApi,
    ctx: &Arc<DispatchContext>,
    submission: Submission<'_>,
) -> Result<(), Fault> {
    let typing_id = ctx.push_message(AgentMessage::new(Role::Agent, MessagePayload::Typing));

    let mut lines: Vec<String> = Vec::new();
    let mut failure: Option<IdentifyError> = None;
    let mut result = None;

    let mut on_event = |event: StreamEvent| match event {
        StreamEvent::Debug { message } => info!("  [<] daemon: {}", message),
        StreamEvent::Field { field, value } => {
            if let Some(line) = format_field(&field, &value) {
                lines.push(line);
            }
            let text = lines.join("\n");
            ctx.update_message(typing_id, |m| {
                m.payload = MessagePayload::Text { text };
                m.is_streaming = true;
            });
        }
        StreamEvent::Escalating { message } => {
            ctx.push_message(AgentMessage::agent_text(message));
        }
        StreamEvent::Result(r) => result = Some(*r),
        StreamEvent::Error(err) => failure = Some(err),
        StreamEvent::Done => {}
    };

    let outcome = match submission {
        Submission::Text(text) => client.identify_text(text, &mut on_event).await,
        Submission::Image {
            image,
            mime_type,
            supplementary_text,
        } => {
            client
                .identify_image(image, mime_type, supplementary_text, &mut on_event)
                .await
        }
    };
    drop(on_event);

    // Settle the streaming message whatever happened
    ctx.update_message(typing_id, |m| {
        m.is_streaming = false;
        m.is_new = false;
    });
    outcome?;

    if let Some(err) = failure {
        return Err(Fault::Api(err));
    }
    let result = result.ok_or_else(|| {
        Fault::Unknown("stream completed without a result or error".to_string())
    })?;

    info!(
        "  [<] identified with confidence {} ({})",
        result.confidence, result.action
    );
    ctx.set_identification(result.clone());
    ctx.set_phase(Phase::Confirming);

    if result.action == IdentifyAction::Disambiguate && !result.candidates.is_empty() {
        let mut listing = String::from("This might already be in your cellar:");
        for candidate in &result.candidates {
            listing.push_str(&format!(
                "\n  * {}{}",
                candidate.wine_name,
                candidate
                    .vintage
                    .map(|v| format!(" ({})", v))
                    .unwrap_or_default()
            ));
        }
        ctx.push_message(AgentMessage::agent_text(listing));
    } else if result.action == IdentifyAction::Suggest {
        ctx.push_message(AgentMessage::agent_text(
            "I'm not fully certain about this one. Does it look right?",
        ));
    }
    ctx.push_message(confirm_chips(true));
    Ok(())
}

fn select_chip(ctx: &Arc<DispatchContext>, message_id: Uuid, chip_id: &str) -> Result<(), Fault> {
    // First pick wins: mark processing before anything else so a
    // second rapid pick fails validation.
    ctx.update_message(message_id, |m| {
        if let MessagePayload::Chips {
            processing, chips, ..
        } = &mut m.payload
        {
            *processing = true;
            for chip in chips.iter_mut() {
                chip.disabled = true;
            }
        }
    });
    match chip_id {
        "add_to_cellar" => ctx.queue(Action::AddToCellar),
        "reject" => ctx.queue(Action::RejectIdentification),
        "enrich" => ctx.queue(Action::RequestEnrichment),
        "retry" => ctx.queue(Action::Retry),
        "start_over" => ctx.queue(Action::StartOver),
        other => {
            return Err(Fault::Unknown(format!("unknown chip id {}", other)));
        }
    }
    Ok(())
}

fn add_to_cellar(ctx: &Arc<DispatchContext>) -> Result<(), Fault> {
    let identification = ctx
        .identification()
        .ok_or_else(|| Fault::Unknown("add_to_cellar without identification".to_string()))?;
    advance(ctx, "add_to_cellar");
    ctx.set_add_flow(AddFlowState {
        wine: identification.parsed.clone(),
        submitted: true,
    });
    let label = identification
        .parsed
        .wine_name
        .or(identification.parsed.producer)
        .unwrap_or_else(|| "that wine".to_string());
    ctx.push_message(AgentMessage::agent_text(format!(
        "{} is in your cellar. Enjoy!",
        label
    )));
    ctx.set_phase(Phase::Complete);
    Ok(())
}

fn request_enrichment(ctx: &Arc<DispatchContext>) -> Result<(), Fault> {
    let identification = ctx
        .identification()
        .ok_or_else(|| Fault::Unknown("request_enrichment without identification".to_string()))?;
    advance(ctx, "request_enrichment");
    let wine = &identification.parsed;
    let mut parts = Vec::new();
    if let Some(wine_type) = wine.wine_type {
        parts.push(format!("a {} wine", wine_type));
    }
    if let Some(region) = &wine.region {
        parts.push(format!("from {}", region));
    }
    if !wine.grapes.is_empty() {
        parts.push(format!("made with {}", wine.grapes.join(", ")));
    }
    let summary = if parts.is_empty() {
        "I don't have much more on this one yet.".to_string()
    } else {
        format!("This is {}.", parts.join(" "))
    };
    ctx.set_enrichment(summary.clone());
    ctx.push_message(AgentMessage::new(
        Role::Agent,
        MessagePayload::Enrichment { summary },
    ));
    ctx.push_message(confirm_chips(false));
    Ok(())
}

fn retry(ctx: &Arc<DispatchContext>) -> Result<(), Fault> {
    let recorded = ctx
        .retry
        .last_action()
        .ok_or_else(|| Fault::Unknown("nothing to retry".to_string()))?;
    info!("  [>] retrying {}", recorded.kind());
    // Reset to a phase the replayed action is allowed in, then let it
    // run through the full chain again.
    if let Some(phases) = validator::prerequisites(recorded.kind()).phases {
        if let Some(first) = phases.first() {
            ctx.set_phase(*first);
        }
    }
    ctx.push_message(AgentMessage::agent_text("Let's try that again."));
    ctx.queue(recorded);
    Ok(())
}

fn start_over(ctx: &Arc<DispatchContext>) -> Result<(), Fault> {
    ctx.clear_flow_state();
    ctx.retry.clear();
    ctx.clear_transcript();
    ctx.push_message(AgentMessage::agent_text(GREETING));
    ctx.set_phase(Phase::Greeting);
    Ok(())
}

/// Chips offered once an identification is on the table.
fn confirm_chips(offer_enrichment: bool) -> AgentMessage {
    let mut chips = vec![Chip::new("add_to_cellar", "Add to my cellar")];
    if offer_enrichment {
        chips.push(Chip::new("enrich", "Tell me more"));
    }
    chips.push(Chip::new("reject", "Not quite right"));
    chips.push(Chip::new("start_over", "Start over"));
    AgentMessage::new(
        Role::Agent,
        MessagePayload::Chips {
            prompt: "What would you like to do?".to_string(),
            chips,
            processing: false,
        },
    )
}

fn format_field(field: &str, value: &serde_json::Value) -> Option<String> {
    let label = match field {
        "producer" => "Producer",
        "wineName" => "Wine",
        "vintage" => "Vintage",
        "region" => "Region",
        "country" => "Country",
        "wineType" => "Type",
        "grapes" => "Grapes",
        "confidence" => "Confidence",
        _ => return None,
    };
    let rendered = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) if s.is_empty() => return None,
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return None;
            }
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
        other => other.to_string(),
    };
    Some(format!("{}: {}", label, rendered))
}
