//! Conversation phase machine.
//!
//! Exactly one phase is current at any time and only the dispatch
//! engine moves it. The transition table is total over (phase, action
//! kind): anything not listed is a no-op for the phase machine, which
//! lets handlers run without accidentally wandering the state space.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Greeting,
    AwaitingInput,
    Identifying,
    Confirming,
    AddingWine,
    Enriching,
    Error,
    Complete,
}

impl Phase {
    /// Terminal-per-request phases, exited only via an explicit action
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Greeting => "greeting",
            Self::AwaitingInput => "awaiting_input",
            Self::Identifying => "identifying",
            Self::Confirming => "confirming",
            Self::AddingWine => "adding_wine",
            Self::Enriching => "enriching",
            Self::Error => "error",
            Self::Complete => "complete",
        };
        write!(f, "{}", name)
    }
}

/// Where an action kind takes the conversation from the given phase.
/// `None` means the action does not move the phase machine.
pub fn next_phase(current: Phase, action_kind: &str) -> Option<Phase> {
    match (current, action_kind) {
        // start_over resets from anywhere
        (_, "start_over") => Some(Phase::Greeting),

        (Phase::Greeting | Phase::AwaitingInput, "submit_text" | "submit_image") => {
            Some(Phase::Identifying)
        }
        // Retrying from error re-enters identification
        (Phase::Error, "retry") => Some(Phase::Identifying),

        (Phase::Confirming, "add_to_cellar") => Some(Phase::AddingWine),
        (Phase::Confirming, "reject_identification") => Some(Phase::AwaitingInput),
        (Phase::Confirming, "request_enrichment") => Some(Phase::Enriching),
        (Phase::Enriching, "add_to_cellar") => Some(Phase::AddingWine),

        _ => None,
    }
}
