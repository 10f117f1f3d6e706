//! Action prerequisite table.
//!
//! Checked by the validation middleware before any handler runs. In
//! warn mode (the default) an action that fails its checks is dropped
//! with a log line; strict mode raises a validation fault instead.

use crate::dispatch::context::DispatchContext;
use crate::dispatch::phase::Phase;
use crate::dispatch::Action;
use somm_common::MessagePayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidatorMode {
    #[default]
    Warn,
    Strict,
}

/// What must already be true for an action kind to run
pub struct Prerequisites {
    /// None means any phase is acceptable
    pub phases: Option<&'static [Phase]>,
    pub requires_identification: bool,
    pub requires_add_flow: bool,
}

pub fn prerequisites(kind: &str) -> Prerequisites {
    match kind {
        "submit_text" | "submit_image" => Prerequisites {
            phases: Some(&[Phase::Greeting, Phase::AwaitingInput]),
            requires_identification: false,
            requires_add_flow: false,
        },
        "add_to_cellar" => Prerequisites {
            phases: Some(&[Phase::Confirming, Phase::Enriching]),
            requires_identification: true,
            requires_add_flow: false,
        },
        "reject_identification" | "request_enrichment" => Prerequisites {
            phases: Some(&[Phase::Confirming]),
            requires_identification: true,
            requires_add_flow: false,
        },
        "retry" => Prerequisites {
            phases: Some(&[Phase::Error]),
            requires_identification: false,
            requires_add_flow: false,
        },
        // select_chip is gated on the target message, not the phase
        _ => Prerequisites {
            phases: None,
            requires_identification: false,
            requires_add_flow: false,
        },
    }
}

/// Full prerequisite check, including per-action predicates the table
/// cannot express.
pub fn check(ctx: &DispatchContext, action: &Action) -> Result<(), String> {
    let prereqs = prerequisites(action.kind());

    if let Some(phases) = prereqs.phases {
        let current = ctx.phase();
        if !phases.contains(&current) {
            return Err(format!(
                "{} not allowed in phase {}",
                action.kind(),
                current
            ));
        }
    }
    if prereqs.requires_identification && ctx.identification().is_none() {
        return Err(format!("{} requires an identification", action.kind()));
    }
    if prereqs.requires_add_flow && ctx.add_flow().is_none() {
        return Err(format!("{} requires an active add flow", action.kind()));
    }

    match action {
        // Double-pick guard: once a chip was selected the message is
        // marked processing and further picks are invalid.
        Action::SelectChip { message_id, .. } => ctx.with_transcript(|transcript| {
            let message = transcript
                .messages()
                .iter()
                .find(|m| m.id == *message_id)
                .ok_or_else(|| "select_chip target message not found".to_string())?;
            match &message.payload {
                MessagePayload::Chips { processing, .. } => {
                    if *processing {
                        Err("chips already processing".to_string())
                    } else {
                        Ok(())
                    }
                }
                _ => Err("select_chip target is not a chips message".to_string()),
            }
        }),
        Action::Retry => {
            if ctx.retry.last_action().is_none() {
                Err("nothing to retry".to_string())
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}
