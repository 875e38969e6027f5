//! Remote channel manager: questions multiplexed over one inbound stream.
//!
//! Owns the pending-question registry, countdown tasks, and intensive chat
//! history. Outbound traffic goes through a [`ChannelTransport`]; inbound
//! traffic arrives as [`InboundEvent`]s and is routed by
//! [`RemoteChannelManager::handle_inbound`], normally from the task started
//! by [`RemoteChannelManager::spawn_router`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::question::Reply;
use crate::remote::countdown::{spawn_countdown, CountdownSchedule};
use crate::remote::intensive::{IntensiveChat, Turn};
use crate::remote::pending::{PendingRegistry, Registration, Resolved};
use crate::remote::transport::{
    delivery_key, ChannelTransport, DeliveryRef, InboundEvent, InboundPayload, OutboundMessage,
};

/// What happened to an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Sender is not on the allow-list.
    Dropped,
    /// Text was kept in an intensive chat's history without resolving a question.
    Recorded,
    /// The event resolved this question.
    Resolved(String),
    /// Nothing was waiting for the event.
    Unmatched,
}

/// Result of one dispatched question.
#[derive(Debug)]
struct Dispatched {
    reply: Reply,
    deliveries: Vec<DeliveryRef>,
}

/// Thread-safe map of intensive chats keyed by session id.
type Chats = Arc<Mutex<HashMap<String, IntensiveChat>>>;

/// Remote backend core.
#[derive(Clone)]
pub struct RemoteChannelManager {
    transport: Arc<dyn ChannelTransport>,
    allowed: Arc<Vec<String>>,
    pending: PendingRegistry,
    chats: Chats,
    schedule: CountdownSchedule,
    cancel: CancellationToken,
}

impl RemoteChannelManager {
    /// Create a manager that delivers to `allowed` endpoints through `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        allowed: Vec<String>,
        schedule: CountdownSchedule,
    ) -> Self {
        Self {
            transport,
            allowed: Arc::new(allowed),
            pending: PendingRegistry::new(),
            chats: Arc::new(Mutex::new(HashMap::new())),
            schedule,
            cancel: CancellationToken::new(),
        }
    }

    /// Whether `endpoint` is on the allow-list.
    #[must_use]
    pub fn is_allowed(&self, endpoint: &str) -> bool {
        self.allowed.iter().any(|id| id == endpoint)
    }

    /// Ask every allow-listed endpoint and wait for the first reply.
    ///
    /// Resolves with the answer, [`Reply::Timeout`] when `timeout` elapses,
    /// or [`Reply::Cleanup`] if the manager is torn down while waiting.
    pub async fn send_input(
        &self,
        recipient_label: &str,
        message: &str,
        timeout: Duration,
        options: Vec<String>,
    ) -> Reply {
        if self.allowed.is_empty() {
            warn!("remote allow-list is empty; question will time out");
        }
        let question_id = Uuid::new_v4().to_string();
        let text = format_question(recipient_label, message);
        self.dispatch(None, &self.allowed, &question_id, text, options, timeout)
            .await
            .reply
    }

    /// Fire-and-forget message to every allow-listed endpoint.
    ///
    /// Returns how many endpoints it reached.
    pub async fn send_notification(&self, recipient_label: &str, message: &str) -> usize {
        let outbound = OutboundMessage::text(format!("**{recipient_label}**: {message}"));
        let sends = self
            .allowed
            .iter()
            .map(|endpoint| self.transport.send(endpoint, &outbound));
        let results = join_all(sends).await;

        let mut reached = 0;
        for (endpoint, result) in self.allowed.iter().zip(results) {
            match result {
                Ok(_) => reached += 1,
                Err(err) => warn!(%err, endpoint, "notification delivery failed"),
            }
        }
        reached
    }

    /// Open an intensive chat bound to the first allow-listed endpoint.
    ///
    /// Returns `false` if the allow-list is empty, the session id is taken,
    /// or the announcement cannot be delivered.
    pub async fn start_intensive_chat(
        &self,
        session_id: &str,
        recipient_label: &str,
        title: &str,
    ) -> bool {
        let Some(endpoint) = self.allowed.first().cloned() else {
            warn!(session_id, "cannot start intensive chat: allow-list is empty");
            return false;
        };
        if self.chats.lock().await.contains_key(session_id) {
            warn!(session_id, "intensive chat already exists");
            return false;
        }

        let announcement = OutboundMessage::text(format!(
            "**{recipient_label}** started a session: **{title}**\n\
             Questions will follow here. Reply to each one as it arrives."
        ));
        if let Err(err) = self.transport.send(&endpoint, &announcement).await {
            warn!(%err, session_id, endpoint, "intensive chat announcement failed");
            return false;
        }

        self.chats.lock().await.insert(
            session_id.to_owned(),
            IntensiveChat::new(session_id, endpoint.clone(), title, recipient_label),
        );
        info!(session_id, endpoint, "intensive chat started");
        true
    }

    /// Ask a question inside an intensive chat.
    ///
    /// Returns `None` when the session is unknown or stopped.
    pub async fn ask_in_intensive_chat(
        &self,
        session_id: &str,
        question: &str,
        options: Vec<String>,
        timeout: Duration,
    ) -> Option<Reply> {
        let question_id = Uuid::new_v4().to_string();
        let (endpoint, text) = {
            let mut chats = self.chats.lock().await;
            let chat = chats.get_mut(session_id).filter(|chat| chat.active)?;
            chat.push_turn(question_id.clone(), question);
            let number = chat.history.len();
            (
                chat.endpoint.clone(),
                format!("**Q{number}** from **{}**:\n\n{question}", chat.recipient_label),
            )
        };

        let dispatched = self
            .dispatch(
                Some(session_id),
                &[endpoint],
                &question_id,
                text,
                options,
                timeout,
            )
            .await;

        if let Some(chat) = self.chats.lock().await.get_mut(session_id) {
            if let Some(delivery) = dispatched.deliveries.first() {
                chat.record_delivery(&question_id, delivery.clone());
            }
            if let Reply::Answer(ref answer) = dispatched.reply {
                chat.record_answer(&question_id, answer);
            }
        }
        Some(dispatched.reply)
    }

    /// Stop an intensive chat and send its summary.
    ///
    /// Still-pending questions of the session resolve with
    /// [`Reply::Cleanup`]. Returns `true` if the session existed, whether or
    /// not the summary could be delivered.
    pub async fn stop_intensive_chat(&self, session_id: &str) -> bool {
        let snapshot = {
            let mut chats = self.chats.lock().await;
            let Some(chat) = chats.get_mut(session_id) else {
                return false;
            };
            chat.active = false;
            chat.clone()
        };

        let span = info_span!("stop_intensive_chat", session_id);
        async {
            for resolved in self.pending.resolve_session(session_id, &Reply::Cleanup).await {
                self.settle(&resolved, "\u{1f6d1} Session ended").await;
            }

            let summary = OutboundMessage::text(snapshot.summary());
            if let Err(err) = self.transport.send(&snapshot.endpoint, &summary).await {
                warn!(%err, "failed to deliver session summary");
            }

            self.chats.lock().await.remove(session_id);
            info!(turns = snapshot.history.len(), "intensive chat stopped");
        }
        .instrument(span)
        .await;
        true
    }

    /// Route one inbound event.
    pub async fn handle_inbound(&self, event: InboundEvent) -> RouteOutcome {
        let endpoint = event.endpoint_id;
        if !self.is_allowed(&endpoint) {
            warn!(
                endpoint_id = %endpoint,
                "inbound event from unauthorized endpoint (silently ignored)"
            );
            return RouteOutcome::Dropped;
        }

        match event.payload {
            InboundPayload::Text(text) => self.route_text(&endpoint, &text).await,
            InboundPayload::Callback {
                channel,
                message_id,
                value,
            } => {
                let key = delivery_key(&channel, &message_id);
                let Some(resolved) = self
                    .pending
                    .resolve_by_delivery(&key, &endpoint, Reply::Answer(value.clone()))
                    .await
                else {
                    debug!(endpoint_id = %endpoint, key, "callback for a question that is no longer pending");
                    return RouteOutcome::Unmatched;
                };
                info!(question_id = %resolved.question_id, endpoint_id = %endpoint, "question answered by selection");
                self.record_chat_answer(&resolved, &value).await;
                self.settle(&resolved, &format!("\u{2705} Selected: **{value}**"))
                    .await;
                RouteOutcome::Resolved(resolved.question_id)
            }
        }
    }

    async fn route_text(&self, endpoint: &str, text: &str) -> RouteOutcome {
        // The active chat's latest open turn takes the text first, even when
        // that turn has already timed out.
        let recorded = self
            .chats
            .lock()
            .await
            .values_mut()
            .find(|chat| chat.active && chat.endpoint == endpoint)
            .and_then(|chat| chat.record_latest_unanswered(text));
        if let Some(ref question_id) = recorded {
            debug!(question_id = %question_id, endpoint_id = endpoint, "text recorded in chat history");
        }

        if let Some(resolved) = self
            .pending
            .resolve_first_for_endpoint(endpoint, Reply::Answer(text.to_owned()))
            .await
        {
            info!(question_id = %resolved.question_id, endpoint_id = endpoint, "question answered by text");
            self.record_chat_answer(&resolved, text).await;
            self.settle(&resolved, "\u{2705} Answered").await;
            return RouteOutcome::Resolved(resolved.question_id);
        }

        if recorded.is_some() {
            RouteOutcome::Recorded
        } else {
            debug!(endpoint_id = endpoint, "text message with nothing pending");
            RouteOutcome::Unmatched
        }
    }

    /// Process inbound events until the channel closes or `cancel` fires.
    #[must_use]
    pub fn spawn_router(
        &self,
        mut inbound: mpsc::Receiver<InboundEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("inbound router shutting down");
                        break;
                    }
                    event = inbound.recv() => {
                        let Some(event) = event else {
                            info!("inbound stream closed");
                            break;
                        };
                        manager.handle_inbound(event).await;
                    }
                }
            }
        })
    }

    /// Resolve everything with [`Reply::Cleanup`] and stop all countdowns.
    ///
    /// Called once at shutdown.
    pub async fn cleanup(&self) {
        let resolved = self.pending.resolve_all(&Reply::Cleanup).await;
        self.cancel.cancel();
        let mut chats = self.chats.lock().await;
        for chat in chats.values_mut() {
            chat.active = false;
        }
        info!(
            questions = resolved.len(),
            chats = chats.len(),
            "remote channel cleaned up"
        );
    }

    /// Number of unresolved questions.
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    /// History of an intensive chat.
    pub async fn chat_history(&self, session_id: &str) -> Option<Vec<Turn>> {
        self.chats
            .lock()
            .await
            .get(session_id)
            .map(|chat| chat.history.clone())
    }

    /// Whether an intensive chat exists and is active.
    pub async fn is_chat_active(&self, session_id: &str) -> bool {
        self.chats
            .lock()
            .await
            .get(session_id)
            .is_some_and(|chat| chat.active)
    }

    async fn dispatch(
        &self,
        session_id: Option<&str>,
        endpoints: &[String],
        question_id: &str,
        text: String,
        options: Vec<String>,
        timeout: Duration,
    ) -> Dispatched {
        if self.cancel.is_cancelled() {
            return Dispatched {
                reply: Reply::Cleanup,
                deliveries: Vec::new(),
            };
        }

        let span = info_span!("remote_ask", question_id = %question_id, session_id);
        async {
            let message = OutboundMessage::with_options(text, options);
            let deadline = Instant::now() + timeout;
            let mut rx = self
                .pending
                .register(Registration {
                    question_id: question_id.to_owned(),
                    session_id: session_id.map(str::to_owned),
                    endpoints: endpoints.to_vec(),
                    message: message.clone(),
                    deadline_at: deadline,
                })
                .await;

            let sends = endpoints
                .iter()
                .map(|endpoint| self.transport.send(endpoint, &message));
            let results = join_all(sends).await;

            let mut deliveries = Vec::new();
            for (endpoint, result) in endpoints.iter().zip(results) {
                match result {
                    Ok(delivery) => {
                        self.pending
                            .attach_delivery(question_id, delivery.clone())
                            .await;
                        deliveries.push(delivery);
                    }
                    Err(err) => warn!(%err, endpoint, "question delivery failed"),
                }
            }

            if deliveries.is_empty() {
                warn!("question reached no endpoint; waiting for timeout");
            } else {
                let marks = self.schedule.marks(timeout.as_secs());
                let countdown = spawn_countdown(
                    Arc::clone(&self.transport),
                    question_id,
                    deliveries.clone(),
                    message.clone(),
                    deadline,
                    marks,
                    self.cancel.child_token(),
                );
                self.pending.attach_countdown(question_id, countdown).await;
            }

            let reply = match tokio::time::timeout_at(deadline, &mut rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_closed)) => Reply::Cleanup,
                Err(_elapsed) => {
                    if let Some(resolved) = self.pending.resolve(question_id, Reply::Timeout).await {
                        info!(timeout_secs = timeout.as_secs(), "remote question timed out");
                        self.settle(&resolved, "\u{231b} Expired with no answer").await;
                    }
                    // Whoever won the race has already sent.
                    rx.await.unwrap_or(Reply::Cleanup)
                }
            };

            Dispatched { reply, deliveries }
        }
        .instrument(span)
        .await
    }

    async fn record_chat_answer(&self, resolved: &Resolved, answer: &str) {
        let Some(ref session_id) = resolved.session_id else {
            return;
        };
        if let Some(chat) = self.chats.lock().await.get_mut(session_id) {
            chat.record_answer(&resolved.question_id, answer);
        }
    }

    /// Best-effort edit of every delivered copy to its final state.
    async fn settle(&self, resolved: &Resolved, footer: &str) {
        let update = resolved.message.settled(footer);
        let edits = resolved
            .deliveries
            .iter()
            .map(|delivery| self.transport.edit(delivery, &update));
        for (delivery, result) in resolved.deliveries.iter().zip(join_all(edits).await) {
            if let Err(err) = result {
                warn!(%err, endpoint = %delivery.endpoint, "failed to update resolved question");
            }
        }
    }
}

fn format_question(recipient_label: &str, message: &str) -> String {
    format!("**{recipient_label}** asks:\n\n{message}")
}
