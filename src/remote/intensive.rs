//! Intensive chat: a remote session of many sequential questions.
//!
//! Keeps the ordered question/answer history so a summary can be sent to
//! the bound endpoint when the session stops.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::remote::transport::DeliveryRef;

/// One question/answer turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Pending-question id of this turn.
    pub question_id: String,
    /// Question text.
    pub question: String,
    /// Answer text, once received.
    pub answer: Option<String>,
    /// Delivered message carrying the question.
    pub delivery: Option<DeliveryRef>,
}

/// State of one intensive chat session.
#[derive(Debug, Clone)]
pub struct IntensiveChat {
    /// Session id.
    pub session_id: String,
    /// Endpoint (user id) the session is bound to.
    pub endpoint: String,
    /// Session title.
    pub title: String,
    /// Label of the asking agent.
    pub recipient_label: String,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Cleared on stop; never set again.
    pub active: bool,
    /// Ordered turns.
    pub history: Vec<Turn>,
}

impl IntensiveChat {
    /// New active session bound to `endpoint`.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        endpoint: impl Into<String>,
        title: impl Into<String>,
        recipient_label: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            endpoint: endpoint.into(),
            title: title.into(),
            recipient_label: recipient_label.into(),
            started_at: Utc::now(),
            active: true,
            history: Vec::new(),
        }
    }

    /// Append an unanswered turn.
    pub fn push_turn(&mut self, question_id: impl Into<String>, question: impl Into<String>) {
        self.history.push(Turn {
            question_id: question_id.into(),
            question: question.into(),
            answer: None,
            delivery: None,
        });
    }

    /// Record the delivered message for a turn.
    pub fn record_delivery(&mut self, question_id: &str, delivery: DeliveryRef) {
        if let Some(turn) = self.turn_mut(question_id) {
            turn.delivery = Some(delivery);
        }
    }

    /// Fill the answer of a turn. Returns `false` if the turn is unknown or
    /// already answered.
    pub fn record_answer(&mut self, question_id: &str, answer: &str) -> bool {
        match self.turn_mut(question_id) {
            Some(turn) if turn.answer.is_none() => {
                turn.answer = Some(answer.to_owned());
                true
            }
            _ => false,
        }
    }

    /// Fill the answer of the most recent unanswered turn.
    ///
    /// Returns the question id of the filled turn.
    pub fn record_latest_unanswered(&mut self, answer: &str) -> Option<String> {
        let turn = self
            .history
            .iter_mut()
            .rev()
            .find(|turn| turn.answer.is_none())?;
        turn.answer = Some(answer.to_owned());
        Some(turn.question_id.clone())
    }

    /// Human-readable summary of every turn.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!("**Session ended: {}**\n", self.title);
        if self.history.is_empty() {
            out.push_str("\n_No questions were asked._");
            return out;
        }
        for (index, turn) in self.history.iter().enumerate() {
            let answer = turn.answer.as_deref().unwrap_or("_no answer_");
            let _ = write!(
                out,
                "\n{}. **Q:** {}\n   **A:** {}",
                index + 1,
                turn.question,
                answer
            );
        }
        out
    }

    fn turn_mut(&mut self, question_id: &str) -> Option<&mut Turn> {
        self.history
            .iter_mut()
            .find(|turn| turn.question_id == question_id)
    }
}
