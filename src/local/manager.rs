//! Local channel manager: prompt processes talking through session directories.
//!
//! Each session owns a private directory under the system temp dir and a
//! detached prompt process. Questions are published as files and answers
//! are polled for; liveness is judged from the heartbeat file's mtime, so
//! the prompt never has to speak a structured liveness protocol.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::LocalConfig;
use crate::local::launcher::{self, LaunchedProcess};
use crate::local::mailbox::FileMailbox;
use crate::local::payload::StartupPayload;
use crate::models::question::Question;
use crate::{AppError, Result};

/// Prefix of every session directory (and therefore every local session id).
pub const SESSION_DIR_PREFIX: &str = "agent-inquiry-";

/// Outcome of a local `ask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalReply {
    /// The prompt process wrote an answer.
    Answered(String),
    /// The poll window elapsed; the prompt is treated as closed.
    Closed,
    /// The session is unknown, stopped, or its process stopped heartbeating.
    Gone,
}

/// Tracked state of one local session.
#[derive(Debug)]
struct LocalSession {
    mailbox: FileMailbox,
    timeout: Duration,
    created_at: DateTime<Utc>,
    is_active: bool,
    last_heartbeat_at: Option<DateTime<Utc>>,
    process: Option<LaunchedProcess>,
    /// Serializes asks: the session has a single question file.
    ask_lock: Arc<Mutex<()>>,
}

/// Thread-safe map of local sessions keyed by session id.
type LocalSessions = Arc<Mutex<HashMap<String, LocalSession>>>;

/// Owns prompt processes, session directories, and liveness checks.
#[derive(Debug, Clone)]
pub struct LocalChannelManager {
    config: Arc<LocalConfig>,
    default_timeout: Duration,
    root: PathBuf,
    sessions: LocalSessions,
}

impl LocalChannelManager {
    /// Create a manager whose session directories live in the system temp dir.
    #[must_use]
    pub fn new(config: LocalConfig, default_timeout: Duration) -> Self {
        Self::with_root(config, default_timeout, std::env::temp_dir())
    }

    /// Create a manager whose session directories live under `root`.
    #[must_use]
    pub fn with_root(config: LocalConfig, default_timeout: Duration, root: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            default_timeout,
            root,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a session: create its directory and launch the prompt process.
    ///
    /// Returns once the process is launched and the fixed startup grace
    /// delay has passed; readiness is established later via heartbeat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory cannot be created or
    /// `AppError::Launch` if no launch strategy succeeds.
    pub async fn start_session(&self, title: &str, timeout_seconds: Option<u64>) -> Result<String> {
        let session_id = format!("{SESSION_DIR_PREFIX}{}", Uuid::new_v4().simple());
        let dir = self.root.join(&session_id);
        let span = info_span!("local_start_session", session_id = %session_id);

        async {
            create_private_dir(&dir).await?;

            let timeout = timeout_seconds.map_or(self.default_timeout, Duration::from_secs);
            let payload = StartupPayload {
                session_id: session_id.clone(),
                title: title.to_owned(),
                output_dir: dir.clone(),
                timeout_seconds: Some(timeout.as_secs()),
            }
            .encode()?;

            let program = self.config.resolve_prompt_command();
            let process = match launcher::launch(&program, &payload, self.config.launch) {
                Ok(process) => process,
                Err(err) => {
                    remove_dir(&dir).await;
                    return Err(err);
                }
            };

            self.sessions.lock().await.insert(
                session_id.clone(),
                LocalSession {
                    mailbox: FileMailbox::new(dir.clone(), session_id.clone()),
                    timeout,
                    created_at: Utc::now(),
                    is_active: true,
                    last_heartbeat_at: None,
                    process: Some(process),
                    ask_lock: Arc::new(Mutex::new(())),
                },
            );

            tokio::time::sleep(self.config.startup_grace()).await;
            info!(dir = %dir.display(), "local session started");
            Ok(session_id.clone())
        }
        .instrument(span)
        .await
    }

    /// Ask a question in a session and wait for the prompt's answer.
    ///
    /// Polls for the response file every poll interval until the session's
    /// timeout (or `timeout_override`) elapses. Returns [`LocalReply::Gone`]
    /// as soon as the session is found not live.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the question file cannot be written.
    pub async fn ask(
        &self,
        session_id: &str,
        question: &Question,
        timeout_override: Option<Duration>,
    ) -> Result<LocalReply> {
        let (mailbox, timeout, ask_lock) = {
            let guard = self.sessions.lock().await;
            match guard.get(session_id) {
                Some(session) if session.is_active => (
                    session.mailbox.clone(),
                    timeout_override.unwrap_or(session.timeout),
                    Arc::clone(&session.ask_lock),
                ),
                _ => return Ok(LocalReply::Gone),
            }
        };

        let span = info_span!("local_ask", session_id, question_id = %question.id);
        // Wall-clock from dispatch, including any wait for a previous turn.
        let deadline = Instant::now() + timeout;
        async {
            let Ok(_turn) = tokio::time::timeout_at(deadline, ask_lock.lock()).await else {
                info!(timeout_secs = timeout.as_secs(), "local question timed out behind an earlier one");
                return Ok(LocalReply::Closed);
            };

            mailbox.put(question).await?;

            loop {
                match mailbox.poll(&question.id).await {
                    Ok(Some(answer)) => {
                        mailbox.retract().await;
                        info!("local question answered");
                        return Ok(LocalReply::Answered(answer));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(%err, "response poll failed; continuing to wait");
                    }
                }

                if !self.is_live(session_id).await {
                    mailbox.retract().await;
                    warn!("prompt process is no longer live; abandoning question");
                    return Ok(LocalReply::Gone);
                }

                let now = Instant::now();
                if now >= deadline {
                    mailbox.retract().await;
                    info!(timeout_secs = timeout.as_secs(), "local question timed out");
                    return Ok(LocalReply::Closed);
                }

                tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;
            }
        }
        .instrument(span)
        .await
    }

    /// Whether a session's prompt process is alive.
    ///
    /// Live iff the heartbeat file was touched within the recency window.
    /// A missing heartbeat counts as "still starting" until the configured
    /// startup timeout has passed since the session was created, unless the
    /// prompt has already exited with a failure.
    pub async fn is_live(&self, session_id: &str) -> bool {
        let (mailbox, created_at) = {
            let guard = self.sessions.lock().await;
            match guard.get(session_id) {
                Some(session) if session.is_active => {
                    (session.mailbox.clone(), session.created_at)
                }
                _ => return false,
            }
        };

        match mailbox.heartbeat_age().await {
            Ok(Some(age)) => {
                let live = age <= self.config.heartbeat_window();
                if live {
                    if let Some(session) = self.sessions.lock().await.get_mut(session_id) {
                        session.last_heartbeat_at = Some(Utc::now());
                    }
                }
                live
            }
            Ok(None) => {
                let failed = self
                    .sessions
                    .lock()
                    .await
                    .get_mut(session_id)
                    .and_then(|session| session.process.as_mut())
                    .and_then(launcher::exit_failure);
                if let Some(status) = failed {
                    warn!(session_id, ?status, "prompt exited before its first heartbeat");
                    return false;
                }
                let waited = (Utc::now() - created_at).to_std().unwrap_or(Duration::ZERO);
                let starting = waited <= self.config.startup_timeout();
                if !starting {
                    warn!(session_id, waited_secs = waited.as_secs(), "prompt never produced a heartbeat");
                }
                starting
            }
            Err(err) => {
                warn!(session_id, %err, "heartbeat check failed; assuming live");
                true
            }
        }
    }

    /// Last time a heartbeat was observed fresh, if ever.
    pub async fn last_heartbeat_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .and_then(|session| session.last_heartbeat_at)
    }

    /// Stop a session.
    ///
    /// Marks it inactive immediately, signals the prompt to close, gives it
    /// the stop grace period to exit, then kills it (and its process group).
    /// Directory and registry entry are removed after the removal delay.
    /// Returns `false` for unknown or already-stopped sessions.
    pub async fn stop_session(&self, session_id: &str) -> bool {
        let (mailbox, process) = {
            let mut guard = self.sessions.lock().await;
            match guard.get_mut(session_id) {
                Some(session) if session.is_active => {
                    session.is_active = false;
                    (session.mailbox.clone(), session.process.take())
                }
                _ => return false,
            }
        };

        let span = info_span!("local_stop_session", session_id);
        async {
            if let Err(err) = mailbox.signal_close().await {
                warn!(%err, "failed to write close signal");
            }

            if let Some(mut process) = process {
                match tokio::time::timeout(self.config.stop_grace(), process.child.wait()).await {
                    Ok(Ok(status)) => info!(?status, "prompt process exited gracefully"),
                    Ok(Err(err)) => warn!(%err, "error waiting for prompt process"),
                    Err(_elapsed) => {
                        warn!("prompt process did not exit within grace period, forcing kill");
                    }
                }
                // The terminal strategy's direct child may exit before the
                // prompt it opened, so the group is always killed.
                launcher::terminate(&mut process).await;
            }

            self.schedule_removal(session_id.to_owned());
            info!("local session stopped");
        }
        .instrument(span)
        .await;

        true
    }

    /// Check every active session and reap the ones that are not live.
    ///
    /// Returns the ids of reaped sessions.
    pub async fn sweep(&self) -> Vec<String> {
        let ids: Vec<String> = {
            let guard = self.sessions.lock().await;
            guard
                .iter()
                .filter(|(_, session)| session.is_active)
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut reaped = Vec::new();
        for id in ids {
            if self.is_live(&id).await {
                continue;
            }
            let Some(mut session) = self.sessions.lock().await.remove(&id) else {
                continue;
            };
            warn!(session_id = %id, "reaping dead local session");
            if let Some(ref mut process) = session.process {
                launcher::terminate(process).await;
            }
            remove_dir(session.mailbox.dir()).await;
            reaped.push(id);
        }
        reaped
    }

    /// Stop every active session. Used at shutdown.
    pub async fn shutdown(&self) {
        let ids = self.active_session_ids().await;
        let stops = ids.iter().map(|id| self.stop_session(id));
        futures_util::future::join_all(stops).await;
    }

    /// Ids of all active sessions.
    pub async fn active_session_ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .await
            .iter()
            .filter(|(_, session)| session.is_active)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Whether the manager tracks `session_id` (active or awaiting removal).
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    /// Session directory of a tracked session.
    pub async fn session_dir(&self, session_id: &str) -> Option<PathBuf> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|session| session.mailbox.dir().to_path_buf())
    }

    fn schedule_removal(&self, session_id: String) {
        let sessions = Arc::clone(&self.sessions);
        let delay = self.config.removal_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let removed = sessions.lock().await.remove(&session_id);
            if let Some(session) = removed {
                remove_dir(session.mailbox.dir()).await;
                info!(session_id, "local session resources released");
            }
        });
    }
}

async fn create_private_dir(dir: &std::path::Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| AppError::Io(format!("failed to create session dir: {err}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }

    Ok(())
}

async fn remove_dir(dir: &std::path::Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(%err, dir = %dir.display(), "failed to remove session dir"),
    }
}
