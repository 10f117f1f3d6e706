//! Client dispatch engine.
//!
//! A single `dispatch(action)` entry point wrapped by a fixed
//! middleware chain (error handling, retry tracking, validation,
//! outermost first) and backed by the conversation phase machine.
//! Actions run to completion one at a time; a handler that needs a
//! follow-up queues it on the context and the engine drains the queue
//! before returning.

pub mod action;
pub mod context;
pub mod handlers;
pub mod middleware;
pub mod phase;
pub mod retry;
pub mod validator;

pub use action::Action;
pub use context::{AddFlowState, DispatchContext, StateChange};
pub use phase::Phase;
pub use validator::ValidatorMode;

use middleware::{production_chain, Handler};
use std::sync::Arc;
use tracing::debug;

pub struct DispatchEngine {
    ctx: Arc<DispatchContext>,
    handler: Handler,
}

impl DispatchEngine {
    /// Wire the given base handler into the production middleware
    /// chain. Tests inject their own base to avoid the network.
    pub fn new(ctx: Arc<DispatchContext>, base: Handler, mode: ValidatorMode) -> Self {
        Self {
            handler: production_chain(mode, base),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<DispatchContext> {
        &self.ctx
    }

    /// Process an action to completion, including any follow-ups it
    /// queued. The outer error-handling layer guarantees this never
    /// fails; faults become transcript messages and the error phase.
    pub async fn dispatch(&self, action: Action) {
        let mut next = Some(action);
        while let Some(action) = next.take() {
            debug!("  [>] dispatch {}", action.kind());
            let _ = (self.handler)(self.ctx.clone(), action).await;
            next = self.ctx.take_queued();
        }
    }
}
