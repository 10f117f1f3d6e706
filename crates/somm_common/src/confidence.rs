//! Confidence banding and the score → action mapping.
//!
//! The numeric score itself is opaque model evidence: the
//! recognized-real-wine gating lives in the tier prompts, not here.
//! This module only decides what the caller should do with a score.

use serde::{Deserialize, Serialize};

/// What the caller should do with an identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifyAction {
    /// High confidence in a real, recognizable wine: fill the form
    AutoPopulate,
    /// Recognized producer or ambiguous input: ask for confirmation
    Suggest,
    /// Near-duplicate catalog entries exist: offer a choice
    Disambiguate,
}

impl std::fmt::Display for IdentifyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoPopulate => write!(f, "auto_populate"),
            Self::Suggest => write!(f, "suggest"),
            Self::Disambiguate => write!(f, "disambiguate"),
        }
    }
}

/// Confidence thresholds, configurable per deployment
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidencePolicy {
    /// At or above: auto-populate (also the tier-1 escalation trigger)
    #[serde(default = "default_high")]
    pub high: u8,
    /// At or above (below high): suggest
    #[serde(default = "default_medium")]
    pub medium: u8,
}

fn default_high() -> u8 {
    85
}

fn default_medium() -> u8 {
    50
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
        }
    }
}

impl ConfidencePolicy {
    /// True when the score is below the escalation trigger.
    pub fn should_escalate(&self, confidence: u8) -> bool {
        confidence < self.high
    }

    /// Map a score to an action. Low and medium scores disambiguate
    /// when catalog candidates exist; a high score always
    /// auto-populates regardless of candidates.
    pub fn action(&self, confidence: u8, has_candidates: bool) -> IdentifyAction {
        if confidence >= self.high {
            IdentifyAction::AutoPopulate
        } else if has_candidates {
            IdentifyAction::Disambiguate
        } else {
            IdentifyAction::Suggest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_score_auto_populates() {
        let policy = ConfidencePolicy::default();
        assert_eq!(policy.action(92, false), IdentifyAction::AutoPopulate);
        assert_eq!(policy.action(85, true), IdentifyAction::AutoPopulate);
    }

    #[test]
    fn test_medium_without_candidates_suggests() {
        let policy = ConfidencePolicy::default();
        assert_eq!(policy.action(60, false), IdentifyAction::Suggest);
    }

    #[test]
    fn test_low_and_medium_with_candidates_disambiguate() {
        let policy = ConfidencePolicy::default();
        assert_eq!(policy.action(60, true), IdentifyAction::Disambiguate);
        assert_eq!(policy.action(20, true), IdentifyAction::Disambiguate);
    }

    #[test]
    fn test_escalation_trigger() {
        let policy = ConfidencePolicy::default();
        assert!(policy.should_escalate(84));
        assert!(!policy.should_escalate(85));
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(IdentifyAction::AutoPopulate.to_string(), "auto_populate");
        assert_eq!(IdentifyAction::Disambiguate.to_string(), "disambiguate");
    }
}
