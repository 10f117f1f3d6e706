//! Shared conversation state owned by the dispatch engine.
//!
//! No ambient globals: everything a handler can touch lives on this
//! context object and is passed in explicitly. Renderers observe it
//! through the subscription interface and never mutate it. Locks are
//! plain std mutexes and are never held across an await point.

use crate::dispatch::phase::Phase;
use crate::dispatch::retry::RetryTracker;
use crate::dispatch::Action;
use somm_common::{AgentMessage, IdentifyResult, ParsedWine, Transcript};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// What the add-to-cellar flow has gathered so far
#[derive(Debug, Clone, PartialEq)]
pub struct AddFlowState {
    pub wine: ParsedWine,
    pub submitted: bool,
}

/// Notification emitted after a state mutation lands
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    PhaseChanged(Phase),
    MessageAppended(Uuid),
    MessageUpdated(Uuid),
    FlowStateCleared,
}

pub type Subscriber = Box<dyn Fn(&DispatchContext, &StateChange) + Send + Sync>;

pub struct DispatchContext {
    transcript: Mutex<Transcript>,
    phase: Mutex<Phase>,
    identification: Mutex<Option<IdentifyResult>>,
    add_flow: Mutex<Option<AddFlowState>>,
    enrichment: Mutex<Option<String>>,
    pub retry: RetryTracker,
    /// Follow-up action queued by a handler, drained by the engine
    /// after the current action completes
    queued: Mutex<Option<Action>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            transcript: Mutex::new(Transcript::default()),
            phase: Mutex::new(Phase::Greeting),
            identification: Mutex::new(None),
            add_flow: Mutex::new(None),
            enrichment: Mutex::new(None),
            retry: RetryTracker::default(),
            queued: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl DispatchContext {
    pub fn with_retry(retry: RetryTracker) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(subscriber);
    }

    fn notify(&self, change: StateChange) {
        let subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        for subscriber in subscribers.iter() {
            subscriber(self, &change);
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_phase(&self, next: Phase) {
        {
            let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
            if *phase == next {
                return;
            }
            debug!("  [-] phase {} -> {}", phase, next);
            *phase = next;
        }
        self.notify(StateChange::PhaseChanged(next));
    }

    pub fn push_message(&self, message: AgentMessage) -> Uuid {
        let id = {
            let mut transcript = self.transcript.lock().unwrap_or_else(|p| p.into_inner());
            transcript.push(message)
        };
        self.notify(StateChange::MessageAppended(id));
        id
    }

    /// Mutate one message in place. Returns false when the id is gone
    /// (dropped past the transcript cap).
    pub fn update_message(&self, id: Uuid, f: impl FnOnce(&mut AgentMessage)) -> bool {
        let found = {
            let mut transcript = self.transcript.lock().unwrap_or_else(|p| p.into_inner());
            match transcript.get_mut(id) {
                Some(message) => {
                    f(message);
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify(StateChange::MessageUpdated(id));
        }
        found
    }

    pub fn with_transcript<R>(&self, f: impl FnOnce(&Transcript) -> R) -> R {
        let transcript = self.transcript.lock().unwrap_or_else(|p| p.into_inner());
        f(&transcript)
    }

    pub fn clear_transcript(&self) {
        self.transcript
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    pub fn settle_transcript(&self) {
        self.transcript
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .settle();
    }

    pub fn identification(&self) -> Option<IdentifyResult> {
        self.identification
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set_identification(&self, result: IdentifyResult) {
        *self
            .identification
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(result);
    }

    pub fn add_flow(&self) -> Option<AddFlowState> {
        self.add_flow
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set_add_flow(&self, state: AddFlowState) {
        *self.add_flow.lock().unwrap_or_else(|p| p.into_inner()) = Some(state);
    }

    pub fn enrichment(&self) -> Option<String> {
        self.enrichment
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set_enrichment(&self, summary: String) {
        *self.enrichment.lock().unwrap_or_else(|p| p.into_inner()) = Some(summary);
    }

    /// Drop everything derived from a prior identification. Used by
    /// start_over; the transcript is handled separately.
    pub fn clear_flow_state(&self) {
        *self
            .identification
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = None;
        *self.add_flow.lock().unwrap_or_else(|p| p.into_inner()) = None;
        *self.enrichment.lock().unwrap_or_else(|p| p.into_inner()) = None;
        self.notify(StateChange::FlowStateCleared);
    }

    pub fn queue(&self, action: Action) {
        *self.queued.lock().unwrap_or_else(|p| p.into_inner()) = Some(action);
    }

    pub fn take_queued(&self) -> Option<Action> {
        self.queued
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }
}
