//! Closed action vocabulary for the dispatch engine.
//!
//! Every user- or system-triggered transition enters through exactly
//! one of these variants, so the validator's prerequisite table and
//! the phase transition table stay exhaustive.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SubmitText {
        text: String,
    },
    SubmitImage {
        /// Base64-encoded image payload
        image: String,
        mime_type: String,
        supplementary_text: Option<String>,
    },
    /// Pick a chip attached to a transcript message
    SelectChip {
        message_id: Uuid,
        chip_id: String,
    },
    AddToCellar,
    RejectIdentification,
    RequestEnrichment,
    Retry,
    StartOver,
}

impl Action {
    /// Stable kind string used by the validator table, retry
    /// allow-list, and phase transition table.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubmitText { .. } => "submit_text",
            Self::SubmitImage { .. } => "submit_image",
            Self::SelectChip { .. } => "select_chip",
            Self::AddToCellar => "add_to_cellar",
            Self::RejectIdentification => "reject_identification",
            Self::RequestEnrichment => "request_enrichment",
            Self::Retry => "retry",
            Self::StartOver => "start_over",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}
