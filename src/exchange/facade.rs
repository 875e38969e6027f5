//! Exchange facade: the single entry point for asking, starting, and
//! stopping sessions.
//!
//! Looks up which manager owns a session and forwards to it, normalizing
//! every ask to an [`AskOutcome`].

use std::time::Duration;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::exchange::store::{Deactivation, SessionStore};
use crate::local::{LocalChannelManager, LocalReply};
use crate::models::question::{AskOutcome, Question, StopOutcome};
use crate::models::session::{ChannelKind, Session};
use crate::remote::RemoteChannelManager;
use crate::{AppError, Result};

/// Title given to the temporary session behind a one-off local ask.
const ONE_OFF_TITLE: &str = "Question";

/// One question put through the facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskRequest {
    /// Channel for a one-off ask; ignored when `session_id` is set.
    pub channel: ChannelKind,
    /// Existing session to ask in.
    pub session_id: Option<String>,
    /// Question text.
    pub question: String,
    /// Selectable options; empty means free-form.
    pub options: Vec<String>,
    /// Per-question timeout; the configured default applies when absent.
    pub timeout: Option<Duration>,
}

impl AskRequest {
    /// Free-form one-off question on `channel`.
    #[must_use]
    pub fn new(channel: ChannelKind, question: impl Into<String>) -> Self {
        Self {
            channel,
            session_id: None,
            question: question.into(),
            options: Vec::new(),
            timeout: None,
        }
    }

    /// Ask inside an existing session.
    #[must_use]
    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Offer selectable options.
    #[must_use]
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Routes exchanges to the local or remote manager.
#[derive(Clone)]
pub struct Exchange {
    store: SessionStore,
    local: LocalChannelManager,
    remote: Option<RemoteChannelManager>,
    ask_timeout: Duration,
    session_timeout: Duration,
    recipient_label: String,
    removal_delay: Duration,
}

impl Exchange {
    /// Assemble the facade from its managers.
    #[must_use]
    pub fn new(
        config: &GlobalConfig,
        local: LocalChannelManager,
        remote: Option<RemoteChannelManager>,
    ) -> Self {
        Self {
            store: SessionStore::new(),
            local,
            remote,
            ask_timeout: config.ask_timeout(),
            session_timeout: Duration::from_secs(config.timeouts.session_seconds),
            recipient_label: config
                .slack
                .as_ref()
                .map_or_else(|| "agent".to_owned(), |slack| slack.recipient_label.clone()),
            removal_delay: config.local.removal_delay(),
        }
    }

    /// Shared session store.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Local manager.
    #[must_use]
    pub fn local(&self) -> &LocalChannelManager {
        &self.local
    }

    /// Remote manager, when the remote channel is configured.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteChannelManager> {
        self.remote.as_ref()
    }

    fn require_remote(&self) -> Result<&RemoteChannelManager> {
        self.remote
            .as_ref()
            .ok_or_else(|| AppError::Config("remote channel is not configured".into()))
    }

    /// Start a session on `channel`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Launch`/`AppError::Io` when a local prompt cannot be
    /// started, `AppError::Config` when the remote channel is not configured,
    /// and `AppError::Delivery` when the remote session cannot be announced.
    pub async fn start_session(
        &self,
        channel: ChannelKind,
        title: &str,
        timeout_seconds: Option<u64>,
    ) -> Result<String> {
        let session_id = match channel {
            ChannelKind::Local => {
                let timeout = timeout_seconds.unwrap_or(self.session_timeout.as_secs());
                self.local.start_session(title, Some(timeout)).await?
            }
            ChannelKind::Remote => {
                let remote = self.require_remote()?;
                let session_id = Uuid::new_v4().to_string();
                if !remote
                    .start_intensive_chat(&session_id, &self.recipient_label, title)
                    .await
                {
                    return Err(AppError::Delivery(
                        "could not start a remote session with any allow-listed user".into(),
                    ));
                }
                session_id
            }
        };

        self.store
            .insert(Session::new(session_id.clone(), channel, title.to_owned()))
            .await;
        info!(session_id, %channel, "session started");
        Ok(session_id)
    }

    /// Ask a question and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error only when the exchange could not be attempted at
    /// all (prompt launch failure, question file write failure, remote
    /// channel not configured). Timeouts and unknown sessions are outcomes.
    pub async fn ask(&self, request: AskRequest) -> Result<AskOutcome> {
        let span = info_span!(
            "ask",
            session_id = request.session_id.as_deref().unwrap_or("-"),
            channel = %request.channel
        );
        async {
            match request.session_id {
                Some(ref session_id) => self.ask_in_session(session_id, &request).await,
                None => self.ask_once(&request).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn ask_in_session(&self, session_id: &str, request: &AskRequest) -> Result<AskOutcome> {
        let Some(channel) = self.store.active_channel(session_id).await else {
            return Ok(AskOutcome::NotFound);
        };

        match channel {
            ChannelKind::Local => {
                let question = Question::new(request.question.clone(), request.options.clone());
                let reply = self.local.ask(session_id, &question, request.timeout).await?;
                Ok(local_outcome(reply))
            }
            ChannelKind::Remote => {
                let remote = self.require_remote()?;
                let timeout = request.timeout.unwrap_or(self.session_timeout);
                Ok(remote
                    .ask_in_intensive_chat(
                        session_id,
                        &request.question,
                        request.options.clone(),
                        timeout,
                    )
                    .await
                    .map_or(AskOutcome::NotFound, AskOutcome::from))
            }
        }
    }

    async fn ask_once(&self, request: &AskRequest) -> Result<AskOutcome> {
        let timeout = request.timeout.unwrap_or(self.ask_timeout);
        match request.channel {
            ChannelKind::Local => {
                let session_id = self
                    .local
                    .start_session(ONE_OFF_TITLE, Some(timeout.as_secs()))
                    .await?;
                let question = Question::new(request.question.clone(), request.options.clone());
                let reply = self.local.ask(&session_id, &question, Some(timeout)).await;
                self.local.stop_session(&session_id).await;
                Ok(local_outcome(reply?))
            }
            ChannelKind::Remote => {
                let remote = self.require_remote()?;
                let reply = remote
                    .send_input(
                        &self.recipient_label,
                        &request.question,
                        timeout,
                        request.options.clone(),
                    )
                    .await;
                Ok(reply.into())
            }
        }
    }

    /// Stop a session.
    ///
    /// The store entry is marked inactive at once (so concurrent asks see
    /// "not found"), the owning manager tears the session down, and the
    /// entry is removed after the removal delay.
    pub async fn stop_session(&self, session_id: &str) -> StopOutcome {
        let channel = match self.store.deactivate(session_id).await {
            Deactivation::Unknown => return StopOutcome::NotFound,
            Deactivation::AlreadyInactive => return StopOutcome::AlreadyStopped,
            Deactivation::Deactivated(channel) => channel,
        };

        match channel {
            ChannelKind::Local => {
                if !self.local.stop_session(session_id).await {
                    warn!(session_id, "local manager had already released the session");
                }
            }
            ChannelKind::Remote => match self.remote {
                Some(ref remote) => {
                    remote.stop_intensive_chat(session_id).await;
                }
                None => warn!(session_id, "remote session without a remote manager"),
            },
        }

        let store = self.store.clone();
        let delay = self.removal_delay;
        let id = session_id.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.remove(&id).await;
        });

        info!(session_id, %channel, "session stopped");
        StopOutcome::Stopped
    }

    /// Fire-and-forget notice to every remote endpoint.
    ///
    /// Returns how many endpoints were reached (zero without a remote channel).
    pub async fn notify(&self, message: &str) -> usize {
        match self.remote {
            Some(ref remote) => remote.send_notification(&self.recipient_label, message).await,
            None => {
                warn!("notification dropped: remote channel is not configured");
                0
            }
        }
    }

    /// Stop every local session and clean up the remote channel.
    pub async fn shutdown(&self) {
        for session_id in self.store.active_ids(ChannelKind::Local).await {
            self.store.deactivate(&session_id).await;
        }
        for session_id in self.store.active_ids(ChannelKind::Remote).await {
            self.store.deactivate(&session_id).await;
        }
        self.local.shutdown().await;
        if let Some(ref remote) = self.remote {
            remote.cleanup().await;
        }
        info!("exchange shut down");
    }
}

fn local_outcome(reply: LocalReply) -> AskOutcome {
    match reply {
        LocalReply::Answered(text) => AskOutcome::Answered(text),
        LocalReply::Closed => AskOutcome::TimedOut,
        LocalReply::Gone => AskOutcome::NotFound,
    }
}
