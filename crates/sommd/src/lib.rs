//! Somm daemon - wine identification service.
//!
//! Streams identifications over SSE, escalating to a stronger model
//! when the first pass is not confident enough.

pub mod catalog;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod provider;
pub mod routes;
pub mod server;
