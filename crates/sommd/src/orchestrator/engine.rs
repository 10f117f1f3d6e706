//! Tier runner and escalation state machine.
//!
//! One engine instance serves all requests; everything per-request
//! (detector, accumulated fields, escalation bookkeeping) lives on
//! the stack of a single `identify` call. The caller owns the event
//! channel and the contract is strict: `field` events with confidence
//! always last, at most one `escalating`, exactly one of
//! `result`/`error`, and `done` after everything else.

use crate::catalog::WineCatalog;
use crate::config::{EscalationConfig, ModelsConfig, TierModelConfig};
use crate::prompts;
use crate::provider::{extract_json, Completion, CompletionRequest, ModelClient};
use chrono::Utc;
use serde_json::Value;
use somm_common::{
    normalize_with_inferences, ConfidencePolicy, EscalationMeta, IdentifyError, IdentifyResult,
    InputType, ParsedWine, StreamEvent, StreamFieldDetector, Tier, TierResult, Usage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Engine knobs, distilled from the daemon config
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub models: ModelsConfig,
    pub escalation: EscalationConfig,
    pub policy: ConfidencePolicy,
    /// Emit a `debug` diagnostic event at stream start
    pub debug_events: bool,
}

/// One identification request
#[derive(Debug, Clone)]
pub enum IdentifyInput {
    Text {
        text: String,
    },
    Image {
        image: String,
        supplementary_text: Option<String>,
    },
}

impl IdentifyInput {
    fn input_type(&self) -> InputType {
        match self {
            Self::Text { .. } => InputType::Text,
            Self::Image { .. } => InputType::Image,
        }
    }

    /// Text shown to escalation tiers describing the original ask.
    fn describe(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Image {
                supplementary_text, ..
            } => supplementary_text.as_deref().unwrap_or("(label photo)"),
        }
    }
}

/// Output of one executed tier, before the winner is chosen
struct TierOutcome {
    tier: Tier,
    model: String,
    parsed: ParsedWine,
    raw: Value,
    inferences: Vec<String>,
    completion: Completion,
}

pub struct IdentifyEngine {
    model: Arc<dyn ModelClient>,
    catalog: Arc<dyn WineCatalog>,
    config: EngineConfig,
}

impl IdentifyEngine {
    pub fn new(
        model: Arc<dyn ModelClient>,
        catalog: Arc<dyn WineCatalog>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model,
            catalog,
            config,
        }
    }

    /// Run one identification, emitting events on `tx`. Always ends
    /// with `done`, whatever happened before it.
    pub async fn identify(&self, input: IdentifyInput, tx: UnboundedSender<StreamEvent>) {
        if let Err(err) = self.run(input, &tx).await {
            warn!("Identification failed: {} ({})", err, err.kind());
            let _ = tx.send(StreamEvent::Error(err));
        }
        let _ = tx.send(StreamEvent::Done);
    }

    async fn run(
        &self,
        input: IdentifyInput,
        tx: &UnboundedSender<StreamEvent>,
    ) -> Result<(), IdentifyError> {
        let input_type = input.input_type();
        let (first_tier, tier_config) = match input_type {
            InputType::Text => (Tier::Tier1, &self.config.models.tier1),
            InputType::Image => (Tier::Tier2, &self.config.models.tier2),
        };

        if self.config.debug_events {
            let _ = tx.send(StreamEvent::Debug {
                message: format!("{} via {}", first_tier, tier_config.model),
            });
        }

        let mut meta = EscalationMeta::default();

        // First tier streams through the detector; confidence is held
        // back so it can stay the final field whatever happens next.
        let first = self
            .run_streaming_tier(first_tier, tier_config, &input, tx)
            .await?;
        meta.record(first.tier, tier_result(&first));

        let mut escalated = false;
        let winner = if self.config.escalation.enabled
            && self.config.policy.should_escalate(first.parsed.confidence)
        {
            let _ = tx.send(StreamEvent::Escalating {
                message: "Taking a closer look to be sure...".to_string(),
            });
            match self.run_escalation_tier(&input, &first).await {
                Ok(second) => {
                    meta.record(second.tier, tier_result(&second));
                    if second.parsed.confidence > first.parsed.confidence {
                        info!(
                            "Escalation improved confidence {} -> {}",
                            first.parsed.confidence, second.parsed.confidence
                        );
                        escalated = true;
                        self.replay_fields(&second.parsed, tx).await;
                        second
                    } else {
                        info!(
                            "Escalation did not improve ({} <= {}), keeping tier-1 output",
                            second.parsed.confidence, first.parsed.confidence
                        );
                        self.emit_confidence(&first.parsed, tx);
                        first
                    }
                }
                Err(err) if first.parsed.is_usable() => {
                    // A usable lower-tier result beats surfacing the
                    // escalation failure.
                    warn!("Escalation tier failed ({}), falling back to tier 1", err);
                    self.emit_confidence(&first.parsed, tx);
                    first
                }
                Err(err) => return Err(err),
            }
        } else {
            self.emit_confidence(&first.parsed, tx);
            first
        };
        meta.finish(winner.tier);

        let confidence = winner.parsed.confidence;
        let candidates = if self.config.policy.should_escalate(confidence) {
            self.catalog.find_candidates(&winner.parsed).await?
        } else {
            Vec::new()
        };
        let action = self.config.policy.action(confidence, !candidates.is_empty());

        let result = IdentifyResult {
            input_type,
            intent: "identify_wine".to_string(),
            parsed: winner.parsed.clone(),
            confidence,
            action,
            candidates,
            usage: Some(Usage {
                tokens: winner.completion.tokens,
                cost_usd: winner.completion.cost_usd,
            }),
            escalation: Some(meta),
            inferences_applied: if winner.inferences.is_empty() {
                None
            } else {
                Some(winner.inferences.clone())
            },
            streamed: true,
            escalated: Some(escalated),
        };
        info!(
            "Identification done: action={} confidence={} escalated={}",
            action, confidence, escalated
        );
        let _ = tx.send(StreamEvent::Result(Box::new(result)));
        Ok(())
    }

    /// Stream the first tier through the field detector, forwarding
    /// every completed field except confidence.
    async fn run_streaming_tier(
        &self,
        tier: Tier,
        tier_config: &TierModelConfig,
        input: &IdentifyInput,
        tx: &UnboundedSender<StreamEvent>,
    ) -> Result<TierOutcome, IdentifyError> {
        let request = self.build_request(tier_config, input, None);
        let mut detector = StreamFieldDetector::new(ParsedWine::field_order());
        let mut accumulated = serde_json::Map::new();

        let completion = self
            .model
            .complete_streaming(&request, &mut |chunk| {
                detector.process_chunk(
                    chunk,
                    &mut |field, value| {
                        accumulated.insert(field.to_string(), value.clone());
                        if field != "confidence" {
                            let _ = tx.send(StreamEvent::Field {
                                field: field.to_string(),
                                value,
                            });
                        }
                    },
                    None,
                );
            })
            .await?;

        // The detector's per-field view is authoritative for what was
        // emitted; the full completion is authoritative for parsing.
        let raw = extract_json(&completion.content).unwrap_or(Value::Object(accumulated));
        let (parsed, inferences) = normalize_with_inferences(&raw);
        Ok(TierOutcome {
            tier,
            model: request.model.clone(),
            parsed,
            raw,
            inferences,
            completion,
        })
    }

    /// Non-streaming escalation pass carrying the lower tier's output
    /// as context.
    async fn run_escalation_tier(
        &self,
        input: &IdentifyInput,
        first: &TierOutcome,
    ) -> Result<TierOutcome, IdentifyError> {
        let tier_config = &self.config.models.tier1_5;
        let context = prompts::escalation_context(input.describe(), &first.raw);
        let mut request = self.build_request(tier_config, input, Some(context));
        request.prompt_key = "identify_escalation";
        request.system = prompts::TIER1_5_SYSTEM.to_string();
        // Escalation runs on a text model. The first pass already read
        // the label; its output travels in the escalation context.
        request.image = None;

        let completion = self.model.complete(&request).await?;
        let raw = extract_json(&completion.content).ok_or_else(|| {
            IdentifyError::Processing("escalation tier returned no parseable JSON".to_string())
        })?;
        let (parsed, inferences) = normalize_with_inferences(&raw);
        Ok(TierOutcome {
            tier: Tier::Tier1_5,
            model: request.model.clone(),
            parsed,
            raw,
            inferences,
            completion,
        })
    }

    /// Replay an escalated result field by field with a small pause,
    /// so the caller's UI sees the same progressive reveal as a live
    /// stream. Confidence comes last, after every other field.
    async fn replay_fields(&self, parsed: &ParsedWine, tx: &UnboundedSender<StreamEvent>) {
        let delay = Duration::from_millis(self.config.escalation.replay_delay_ms);
        for field in ParsedWine::field_order() {
            if *field == "confidence" {
                continue;
            }
            if let Some(value) = parsed.field_value(field) {
                let _ = tx.send(StreamEvent::Field {
                    field: field.to_string(),
                    value,
                });
                tokio::time::sleep(delay).await;
            }
        }
        self.emit_confidence(parsed, tx);
    }

    fn emit_confidence(&self, parsed: &ParsedWine, tx: &UnboundedSender<StreamEvent>) {
        let _ = tx.send(StreamEvent::Field {
            field: "confidence".to_string(),
            value: Value::from(parsed.confidence),
        });
    }

    fn build_request(
        &self,
        tier_config: &TierModelConfig,
        input: &IdentifyInput,
        user_override: Option<String>,
    ) -> CompletionRequest {
        let (prompt_key, system, user, image) = match input {
            IdentifyInput::Text { text } => (
                "identify_text",
                prompts::TIER1_SYSTEM.to_string(),
                text.clone(),
                None,
            ),
            IdentifyInput::Image {
                image,
                supplementary_text,
            } => (
                "identify_image",
                prompts::TIER2_VISION_SYSTEM.to_string(),
                supplementary_text
                    .clone()
                    .unwrap_or_else(|| "Identify the wine on this label.".to_string()),
                Some(image.clone()),
            ),
        };
        CompletionRequest {
            prompt_key,
            model: tier_config.model.clone(),
            system,
            user: user_override.unwrap_or(user),
            image,
            timeout: Duration::from_secs(tier_config.timeout_secs),
            cost_per_1k_tokens: tier_config.cost_per_1k_tokens,
        }
    }
}

fn tier_result(outcome: &TierOutcome) -> TierResult {
    TierResult {
        model: outcome.model.clone(),
        confidence: outcome.parsed.confidence,
        cost_usd: outcome.completion.cost_usd,
        latency_ms: outcome.completion.latency_ms,
        timestamp: Utc::now(),
    }
}
