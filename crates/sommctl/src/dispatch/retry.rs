//! Last-action bookkeeping for the retry affordance.

use crate::dispatch::Action;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Action kinds worth replaying after a transient failure
pub const RETRYABLE_ACTIONS: &[&str] = &["submit_text", "submit_image", "add_to_cellar"];

pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct LastAction {
    pub action: Action,
    pub at: Instant,
    pub succeeded: bool,
}

/// The only state shared across dispatch calls. Writes fully replace
/// the prior record; reads never block on a handler in flight.
pub struct RetryTracker {
    expiry: Duration,
    last: Mutex<Option<LastAction>>,
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY)
    }
}

impl RetryTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            last: Mutex::new(None),
        }
    }

    pub fn is_tracked(kind: &str) -> bool {
        RETRYABLE_ACTIONS.contains(&kind)
    }

    /// Record before the handler runs, with succeeded=false so a
    /// crash mid-handler still leaves a replayable record.
    pub fn record(&self, action: Action) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = Some(LastAction {
            action,
            at: Instant::now(),
            succeeded: false,
        });
    }

    pub fn mark_succeeded(&self) {
        if let Some(last) = self
            .last
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_mut()
        {
            last.succeeded = true;
        }
    }

    /// The recorded action, unless the expiry window has elapsed.
    pub fn last_action(&self) -> Option<Action> {
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        match last.as_ref() {
            Some(record) if record.at.elapsed() < self.expiry => Some(record.action.clone()),
            _ => None,
        }
    }

    pub fn clear(&self) {
        *self.last.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}
