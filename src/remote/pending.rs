//! Registry of unresolved remote questions.
//!
//! Every outstanding question owns a `oneshot::Sender<Reply>`. Resolution
//! removes the entry under the registry lock before sending, so whichever
//! of answer, callback, timeout, or cleanup gets there first wins and every
//! later attempt finds nothing to resolve.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::debug;

use crate::models::question::Reply;
use crate::remote::countdown::CountdownHandle;
use crate::remote::transport::{DeliveryRef, OutboundMessage};

/// One outstanding question.
#[derive(Debug)]
struct PendingQuestion {
    session_id: Option<String>,
    endpoints: Vec<String>,
    deliveries: Vec<DeliveryRef>,
    message: OutboundMessage,
    deadline_at: Instant,
    seq: u64,
    resolver: oneshot::Sender<Reply>,
    countdown: Option<CountdownHandle>,
}

/// What the winner of a resolution race gets back.
#[derive(Debug)]
pub struct Resolved {
    /// Resolved question id.
    pub question_id: String,
    /// Owning intensive-chat session, if any.
    pub session_id: Option<String>,
    /// Messages that carried the question.
    pub deliveries: Vec<DeliveryRef>,
    /// The question as it was sent.
    pub message: OutboundMessage,
}

#[derive(Debug, Default)]
struct State {
    next_seq: u64,
    questions: HashMap<String, PendingQuestion>,
    by_delivery: HashMap<String, String>,
}

impl State {
    fn take(&mut self, question_id: &str) -> Option<PendingQuestion> {
        let pending = self.questions.remove(question_id)?;
        for delivery in &pending.deliveries {
            self.by_delivery.remove(&delivery.key());
        }
        Some(pending)
    }
}

/// Registration details for a new question.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Question id.
    pub question_id: String,
    /// Owning intensive-chat session, if any.
    pub session_id: Option<String>,
    /// Endpoints the question is sent to.
    pub endpoints: Vec<String>,
    /// The outbound message.
    pub message: OutboundMessage,
    /// When the question expires.
    pub deadline_at: Instant,
}

/// Shared registry of pending questions.
#[derive(Debug, Clone, Default)]
pub struct PendingRegistry {
    state: Arc<Mutex<State>>,
}

impl PendingRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a question and return the receiver its answer arrives on.
    ///
    /// Registration happens before any delivery, so a reply racing the send
    /// always finds its question.
    pub async fn register(&self, registration: Registration) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().await;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.questions.insert(
            registration.question_id,
            PendingQuestion {
                session_id: registration.session_id,
                endpoints: registration.endpoints,
                deliveries: Vec::new(),
                message: registration.message,
                deadline_at: registration.deadline_at,
                seq,
                resolver: tx,
                countdown: None,
            },
        );
        rx
    }

    /// Record a delivered message for a question.
    ///
    /// Returns `false` when the question has already been resolved.
    pub async fn attach_delivery(&self, question_id: &str, delivery: DeliveryRef) -> bool {
        let mut state = self.state.lock().await;
        let key = delivery.key();
        let Some(pending) = state.questions.get_mut(question_id) else {
            return false;
        };
        pending.deliveries.push(delivery);
        state.by_delivery.insert(key, question_id.to_owned());
        true
    }

    /// Attach the countdown task that belongs to a question.
    ///
    /// If the question is already resolved the handle is dropped, which
    /// cancels the countdown.
    pub async fn attach_countdown(&self, question_id: &str, countdown: CountdownHandle) {
        let mut state = self.state.lock().await;
        if let Some(pending) = state.questions.get_mut(question_id) {
            pending.countdown = Some(countdown);
        }
    }

    /// Resolve a question by id.
    ///
    /// Returns `None` if it was already resolved.
    pub async fn resolve(&self, question_id: &str, reply: Reply) -> Option<Resolved> {
        let pending = self.state.lock().await.take(question_id)?;
        Some(finish(question_id.to_owned(), pending, reply))
    }

    /// Resolve the question a pressed message belongs to.
    ///
    /// `endpoint` must be one of the endpoints the question was sent to, and
    /// the question's deadline must not have passed. An expired question is
    /// left for its timeout to resolve.
    pub async fn resolve_by_delivery(
        &self,
        key: &str,
        endpoint: &str,
        reply: Reply,
    ) -> Option<Resolved> {
        let (question_id, pending) = {
            let mut state = self.state.lock().await;
            let question_id = state.by_delivery.get(key)?.clone();
            let now = Instant::now();
            let answerable = state.questions.get(&question_id).is_some_and(|pending| {
                pending.deadline_at > now && pending.endpoints.iter().any(|e| e == endpoint)
            });
            if !answerable {
                return None;
            }
            let pending = state.take(&question_id)?;
            (question_id, pending)
        };
        Some(finish(question_id, pending, reply))
    }

    /// Resolve the oldest unexpired question that was sent to `endpoint`.
    pub async fn resolve_first_for_endpoint(
        &self,
        endpoint: &str,
        reply: Reply,
    ) -> Option<Resolved> {
        let (question_id, pending) = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let question_id = state
                .questions
                .iter()
                .filter(|(_, pending)| pending.deadline_at > now)
                .filter(|(_, pending)| pending.endpoints.iter().any(|e| e == endpoint))
                .min_by_key(|(_, pending)| pending.seq)
                .map(|(id, _)| id.clone())?;
            let pending = state.take(&question_id)?;
            (question_id, pending)
        };
        Some(finish(question_id, pending, reply))
    }

    /// Resolve every question belonging to an intensive-chat session.
    pub async fn resolve_session(&self, session_id: &str, reply: &Reply) -> Vec<Resolved> {
        let taken: Vec<(String, PendingQuestion)> = {
            let mut state = self.state.lock().await;
            let ids: Vec<String> = state
                .questions
                .iter()
                .filter(|(_, pending)| pending.session_id.as_deref() == Some(session_id))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| state.take(&id).map(|pending| (id, pending)))
                .collect()
        };
        taken
            .into_iter()
            .map(|(id, pending)| finish(id, pending, reply.clone()))
            .collect()
    }

    /// Resolve every pending question.
    pub async fn resolve_all(&self, reply: &Reply) -> Vec<Resolved> {
        let taken: Vec<(String, PendingQuestion)> = {
            let mut state = self.state.lock().await;
            state.by_delivery.clear();
            state.questions.drain().collect()
        };
        taken
            .into_iter()
            .map(|(id, pending)| finish(id, pending, reply.clone()))
            .collect()
    }

    /// Number of unresolved questions.
    pub async fn len(&self) -> usize {
        self.state.lock().await.questions.len()
    }

    /// Whether nothing is pending.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.questions.is_empty()
    }
}

fn finish(question_id: String, pending: PendingQuestion, reply: Reply) -> Resolved {
    if let Some(countdown) = pending.countdown {
        countdown.cancel();
    }
    if pending.resolver.send(reply).is_err() {
        debug!(question_id, "resolved question had no waiter");
    }
    Resolved {
        question_id,
        session_id: pending.session_id,
        deliveries: pending.deliveries,
        message: pending.message,
    }
}
