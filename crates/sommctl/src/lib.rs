//! sommctl - terminal client for the somm identification daemon.

pub mod client;
pub mod dispatch;
pub mod fault;
pub mod output;
