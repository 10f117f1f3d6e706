//! Identification orchestration: tier selection, escalation, and the
//! event stream each request produces.

mod engine;

pub use engine::{EngineConfig, IdentifyEngine, IdentifyInput};
