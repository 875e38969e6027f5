//! File-backed request/response mailbox for local sessions.
//!
//! The session directory is the message bus between the core and the
//! prompt process:
//!
//! | File                        | Writer  | Meaning                          |
//! |-----------------------------|---------|----------------------------------|
//! | `<sessionId>.json`          | core    | current question                 |
//! | `response-<questionId>.txt` | prompt  | raw answer text                  |
//! | `heartbeat.txt`             | prompt  | liveness, judged by mtime        |
//! | `close-session.txt`         | core    | graceful stop request            |
//!
//! Every write goes to a temporary sibling first and is renamed into
//! place, so a reader never observes a half-written file. Response names
//! carry the question id, so answers to different questions never collide.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::debug;

use crate::models::question::Question;
use crate::Result;

/// Heartbeat file touched by the prompt process.
pub const HEARTBEAT_FILE: &str = "heartbeat.txt";

/// Sentinel file requesting a graceful prompt exit.
pub const CLOSE_SIGNAL_FILE: &str = "close-session.txt";

/// Name of the question file for a session.
#[must_use]
pub fn question_file_name(session_id: &str) -> String {
    format!("{session_id}.json")
}

/// Name of the response file for a question.
#[must_use]
pub fn response_file_name(question_id: &str) -> String {
    format!("response-{question_id}.txt")
}

/// Both sides of the file protocol for one session directory.
#[derive(Debug, Clone)]
pub struct FileMailbox {
    dir: PathBuf,
    session_id: String,
}

impl FileMailbox {
    /// Attach to a session directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            session_id: session_id.into(),
        }
    }

    /// The session directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn question_path(&self) -> PathBuf {
        self.dir.join(question_file_name(&self.session_id))
    }

    fn response_path(&self, question_id: &str) -> PathBuf {
        self.dir.join(response_file_name(question_id))
    }

    // ── Core side ────────────────────────────────────────

    /// Publish a question for the prompt process.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be written.
    pub async fn put(&self, question: &Question) -> Result<()> {
        let body = serde_json::to_vec(question)?;
        write_atomic(&self.question_path(), &body).await
    }

    /// Take the response for `question_id` if it has been written.
    ///
    /// The response file is deleted once read, so each answer is consumed
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` for failures other than "not written yet".
    pub async fn poll(&self, question_id: &str) -> Result<Option<String>> {
        let path = self.response_path(question_id);
        match fs::read_to_string(&path).await {
            Ok(answer) => {
                remove_if_exists(&path).await?;
                Ok(Some(answer.trim_end_matches(['\r', '\n']).to_owned()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Withdraw the current question file. Best effort.
    pub async fn retract(&self) {
        if let Err(err) = remove_if_exists(&self.question_path()).await {
            debug!(%err, dir = %self.dir.display(), "failed to remove question file");
        }
    }

    /// Age of the heartbeat file; `None` when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the file metadata cannot be read.
    pub async fn heartbeat_age(&self) -> Result<Option<Duration>> {
        match fs::metadata(self.dir.join(HEARTBEAT_FILE)).await {
            Ok(meta) => {
                let modified = meta.modified()?;
                // A timestamp in the future counts as fresh.
                let age = SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or(Duration::ZERO);
                Ok(Some(age))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Ask the prompt process to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the signal file cannot be written.
    pub async fn signal_close(&self) -> Result<()> {
        write_atomic(&self.dir.join(CLOSE_SIGNAL_FILE), b"close").await
    }

    // ── Prompt side ──────────────────────────────────────

    /// Read the current question, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` or `AppError::Payload` for unreadable files.
    pub async fn read_question(&self) -> Result<Option<Question>> {
        match fs::read(self.question_path()).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Write the answer to `question_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be written.
    pub async fn respond(&self, question_id: &str, answer: &str) -> Result<()> {
        write_atomic(&self.response_path(question_id), answer.as_bytes()).await
    }

    /// Refresh the heartbeat file's modification time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be written.
    pub async fn touch_heartbeat(&self) -> Result<()> {
        let stamp = chrono::Utc::now().to_rfc3339();
        fs::write(self.dir.join(HEARTBEAT_FILE), stamp).await?;
        Ok(())
    }

    /// Whether the core has requested a graceful exit.
    pub async fn close_requested(&self) -> bool {
        fs::try_exists(self.dir.join(CLOSE_SIGNAL_FILE))
            .await
            .unwrap_or(false)
    }
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
