//! Somm Common - shared types for the wine identification pipeline.
//!
//! Everything the daemon and the CLI agree on lives here: the parsed
//! wine record, the stream field detector, response normalization,
//! confidence banding, tier accounting, the wire event model, and the
//! conversation transcript.

pub mod confidence;
pub mod error;
pub mod events;
pub mod normalize;
pub mod request;
pub mod stream_fields;
pub mod tier;
pub mod transcript;
pub mod wine;

pub use confidence::{ConfidencePolicy, IdentifyAction};
pub use error::IdentifyError;
pub use events::{DuplicateMatch, IdentifyResult, InputType, StreamEvent, Usage};
pub use normalize::{normalize_response, normalize_with_inferences};
pub use request::{ImageIdentifyRequest, TextIdentifyRequest};
pub use stream_fields::StreamFieldDetector;
pub use tier::{EscalationMeta, Tier, TierResult};
pub use transcript::{AgentMessage, Chip, MessagePayload, Role, Transcript};
pub use wine::{ParsedWine, WineType};
