//! In-memory transcript and per-message lifecycle management.
//!
//! The transcript owns the ordered message list for the active conversation
//! view. Each message carries a typed [`Lifecycle`] tag:
//!
//! - `Ephemeral` - transient progress narration ("Getting your location..."),
//!   removed by identity before the turn settles, never durably stored
//! - `Pending` - optimistically displayed, durable write not yet confirmed
//! - `Committed` - persisted
//! - `Error` - displayed terminally, no automatic retry
//!
//! Removal of ephemeral entries is by id or by lifecycle tag predicate,
//! never by content pattern matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Per-message lifecycle tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Transient progress narration; must not survive its turn
    Ephemeral,
    /// Optimistically displayed, not yet durably stored
    Pending,
    /// Durably persisted
    Committed,
    /// Terminal failure display
    Error,
}

/// Message body: prose text or a serialized structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain or markdown prose
    Text { text: String },
    /// Structured payload rendered by a dedicated view (entity lists,
    /// air quality records, directions, time zones)
    Structured {
        kind: String,
        payload: serde_json::Value,
    },
}

impl MessageContent {
    /// Text content constructor.
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    /// Structured content constructor.
    pub fn structured(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        MessageContent::Structured {
            kind: kind.into(),
            payload,
        }
    }

    /// The prose text, if this is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            MessageContent::Structured { .. } => None,
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier (ULID, sortable by creation time)
    pub id: Ulid,
    /// Author role
    pub role: Role,
    /// Message body
    pub content: MessageContent,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Lifecycle tag
    pub lifecycle: Lifecycle,
    /// Whether this message is still receiving streamed chunks
    pub streaming: bool,
}

/// Turn-level phases of the orchestrator state machine.
///
/// `Idle -> Submitting -> Classifying -> (GeoResolving) -> Dispatching ->
/// (Streaming | Awaiting) -> Settling -> Idle`. Any failure routes directly
/// to `Settling`; `Idle` is always re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Submitting,
    Classifying,
    GeoResolving,
    Dispatching,
    Streaming,
    Awaiting,
    Settling,
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::Classifying => "classifying",
            Self::GeoResolving => "geo_resolving",
            Self::Dispatching => "dispatching",
            Self::Streaming => "streaming",
            Self::Awaiting => "awaiting",
            Self::Settling => "settling",
        };
        write!(f, "{}", name)
    }
}

/// Ordered, in-memory message list for the active conversation.
///
/// Mutated only by the single active turn's control flow; ordering is
/// monotonic by creation time (ULIDs are monotonic within a process).
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its id.
    pub fn push(&mut self, role: Role, content: MessageContent, lifecycle: Lifecycle) -> Ulid {
        let message = Message {
            id: Ulid::new(),
            role,
            content,
            created_at: Utc::now(),
            lifecycle,
            streaming: false,
        };
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Append an ephemeral progress message and return its id.
    pub fn push_ephemeral(&mut self, text: impl Into<String>) -> Ulid {
        self.push(
            Role::Assistant,
            MessageContent::text(text),
            Lifecycle::Ephemeral,
        )
    }

    /// Remove one message by identity. Returns true when it was present.
    pub fn remove(&mut self, id: Ulid) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Remove every message tagged `Ephemeral`. Returns the removed count.
    ///
    /// This is the settle-path guarantee: removal is by lifecycle tag, not by
    /// content heuristics, and runs on every exit path of a turn.
    pub fn clear_ephemeral(&mut self) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| m.lifecycle != Lifecycle::Ephemeral);
        before - self.messages.len()
    }

    /// Update a message's lifecycle tag in place.
    pub fn set_lifecycle(&mut self, id: Ulid, lifecycle: Lifecycle) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.lifecycle = lifecycle;
        }
    }

    /// Replace a message's content in place (streaming accumulation).
    pub fn set_content(&mut self, id: Ulid, content: MessageContent) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.content = content;
        }
    }

    /// Update a message's streaming flag.
    pub fn set_streaming(&mut self, id: Ulid, streaming: bool) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.streaming = streaming;
        }
    }

    /// All messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Look up a message by id.
    pub fn get(&self, id: Ulid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Number of messages currently displayed.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of committed (durable) messages.
    pub fn committed_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.lifecycle == Lifecycle::Committed)
            .count()
    }

    /// True when any ephemeral entry remains. Must be false after settle.
    pub fn has_ephemeral(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.lifecycle == Lifecycle::Ephemeral)
    }
}
