//! Conversation transcript model.
//!
//! Ordered, append-only log of `AgentMessage` records. Only the
//! client dispatch engine mutates it; renderers read through the
//! engine's subscription interface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Size cap keeps a runaway conversation from growing unbounded.
/// Oldest messages are dropped past this point.
pub const MAX_TRANSCRIPT_MESSAGES: usize = 200;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

/// A selectable quick-response affordance attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chip {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub disabled: bool,
}

impl Chip {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            disabled: false,
        }
    }
}

/// Message payload, tagged by category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum MessagePayload {
    Text {
        text: String,
    },
    Chips {
        prompt: String,
        chips: Vec<Chip>,
        /// Set once a chip was picked so a second rapid pick is ignored
        #[serde(default)]
        processing: bool,
    },
    Image {
        caption: Option<String>,
    },
    Error {
        kind: String,
        message: String,
        retryable: bool,
    },
    Typing,
    Enrichment {
        summary: String,
    },
}

impl MessagePayload {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Chips { .. } => "chips",
            Self::Image { .. } => "image",
            Self::Error { .. } => "error",
            Self::Typing => "typing",
            Self::Enrichment { .. } => "enrichment",
        }
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: Uuid,
    pub role: Role,
    pub payload: MessagePayload,
    /// Still animating in the UI; dependent actions wait on it
    pub is_new: bool,
    pub disabled: bool,
    pub is_streaming: bool,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(role: Role, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            payload,
            is_new: true,
            disabled: false,
            is_streaming: false,
            timestamp: Utc::now(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessagePayload::Text { text: text.into() })
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, MessagePayload::Text { text: text.into() })
    }

    pub fn streaming(mut self) -> Self {
        self.is_streaming = true;
        self
    }
}

/// Append-only message log with a size cap
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<AgentMessage>,
}

impl Transcript {
    pub fn push(&mut self, message: AgentMessage) -> Uuid {
        let id = message.id;
        self.messages.push(message);
        if self.messages.len() > MAX_TRANSCRIPT_MESSAGES {
            let overflow = self.messages.len() - MAX_TRANSCRIPT_MESSAGES;
            self.messages.drain(..overflow);
        }
        id
    }

    pub fn messages(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut AgentMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&AgentMessage> {
        self.messages.last()
    }

    /// True while any message is still animating; chips stay inert
    /// until the transcript settles.
    pub fn any_animating(&self) -> bool {
        self.messages.iter().any(|m| m.is_new)
    }

    pub fn settle(&mut self) {
        for m in &mut self.messages {
            m.is_new = false;
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
