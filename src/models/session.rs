//! Session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel (backend) through which a session's questions are delivered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Detached terminal prompt process on this machine.
    Local,
    /// Slack bot conversation with an allow-listed user.
    Remote,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// A related run of question/answer turns sharing lifecycle and channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Backend that owns the session.
    pub channel: ChannelKind,
    /// Human-readable title shown when the session starts.
    pub title: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// `false` once stopped; never flips back.
    pub is_active: bool,
}

impl Session {
    /// Construct a new active session.
    #[must_use]
    pub fn new(id: String, channel: ChannelKind, title: String) -> Self {
        Self {
            id,
            channel,
            title,
            created_at: Utc::now(),
            is_active: true,
        }
    }

    /// Mark the session stopped.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn deactivate(&mut self) -> bool {
        std::mem::replace(&mut self.is_active, false)
    }
}
