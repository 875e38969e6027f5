//! Question, reply, and outcome types shared by both backends.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single question put to the human.
///
/// Serialized as the local backend's `<sessionId>.json` question file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    /// Unique question identifier (distinct from the session id).
    pub id: String,
    /// Question text.
    pub text: String,
    /// Selectable options; empty means free-form.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Question {
    /// Create a question with a freshly generated identifier.
    #[must_use]
    pub fn new(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            options,
        }
    }

    /// Turn a typed reply into an answer.
    ///
    /// A number from `1` to `options.len()` selects that option; anything
    /// else is taken as free text.
    #[must_use]
    pub fn resolve_input(&self, input: &str) -> String {
        let input = input.trim();
        input
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| self.options.get(index))
            .map_or_else(|| input.to_owned(), Clone::clone)
    }
}

/// Value a pending remote question resolves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The human answered.
    Answer(String),
    /// The deadline elapsed first.
    Timeout,
    /// The manager was torn down (or the session stopped) while pending.
    Cleanup,
}

impl Reply {
    /// Sentinel text for [`Reply::Timeout`].
    pub const TIMEOUT_SENTINEL: &'static str = "__TIMEOUT__";
    /// Sentinel text for [`Reply::Cleanup`].
    pub const CLEANUP_SENTINEL: &'static str = "__CLEANUP__";

    /// Answer text, or the sentinel for non-answers.
    #[must_use]
    pub fn as_text(&self) -> &str {
        match self {
            Self::Answer(text) => text,
            Self::Timeout => Self::TIMEOUT_SENTINEL,
            Self::Cleanup => Self::CLEANUP_SENTINEL,
        }
    }
}

/// Normalized result of an `ask` through the exchange facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "answer", rename_all = "snake_case")]
pub enum AskOutcome {
    /// The human answered with this text.
    Answered(String),
    /// No answer before the deadline.
    TimedOut,
    /// The exchange was cancelled by a stop or shutdown while pending.
    Cancelled,
    /// Unknown, stopped, or dead session.
    NotFound,
}

impl From<Reply> for AskOutcome {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Answer(text) => Self::Answered(text),
            Reply::Timeout => Self::TimedOut,
            Reply::Cleanup => Self::Cancelled,
        }
    }
}

/// Result of stopping a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// This call stopped the session.
    Stopped,
    /// The session had already been stopped.
    AlreadyStopped,
    /// No such session.
    NotFound,
}
