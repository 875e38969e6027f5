//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which Slack credentials are stored.
pub const KEYRING_SERVICE: &str = "agent-inquiry";

/// Name of the prompt binary launched for local sessions.
pub const PROMPT_BINARY: &str = "agent-inquiry-prompt";

/// Nested Slack configuration for Socket Mode connectivity.
///
/// Tokens are loaded at runtime via OS keychain or environment variables,
/// never from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Label shown in outbound message headers (who is asking).
    #[serde(default = "default_recipient_label")]
    pub recipient_label: String,
    /// Post a notice to every allow-listed user when the server shuts down.
    #[serde(default = "default_true")]
    pub notify_on_shutdown: bool,
    /// App-level token used for Socket Mode (populated at runtime).
    #[serde(skip)]
    pub app_token: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

fn default_recipient_label() -> String {
    "agent".into()
}

fn default_true() -> bool {
    true
}

/// Configurable timeout values (seconds) for blocking asks.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Default per-question timeout when the caller does not pass one.
    #[serde(default = "default_ask_seconds")]
    pub ask_seconds: u64,
    /// Default timeout for questions asked inside a local session.
    #[serde(default = "default_session_seconds")]
    pub session_seconds: u64,
}

fn default_ask_seconds() -> u64 {
    600
}

fn default_session_seconds() -> u64 {
    1800
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ask_seconds: default_ask_seconds(),
            session_seconds: default_session_seconds(),
        }
    }
}

/// How the local prompt process is started.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStrategy {
    /// Open a new terminal window, falling back to a direct spawn.
    #[default]
    Terminal,
    /// Spawn the prompt binary directly as a detached process.
    Direct,
}

/// Local (terminal prompt) backend settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LocalConfig {
    /// Prompt binary; defaults to `agent-inquiry-prompt` next to the server binary.
    #[serde(default)]
    pub prompt_command: Option<PathBuf>,
    /// Preferred launch strategy.
    #[serde(default)]
    pub launch: LaunchStrategy,
    /// Interval between response-file polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum heartbeat age for a session to count as live.
    #[serde(default = "default_heartbeat_window_ms")]
    pub heartbeat_window_ms: u64,
    /// Interval of the background liveness sweep.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    /// Fixed delay after launching before `start_session` returns.
    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
    /// Time a stopping prompt process is given to exit before it is killed.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Delay before a stopped session's directory and entry are removed.
    #[serde(default = "default_removal_delay_ms")]
    pub removal_delay_ms: u64,
    /// How long a session without any heartbeat file is still considered starting.
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_heartbeat_window_ms() -> u64 {
    2000
}

fn default_sweep_interval_seconds() -> u64 {
    5
}

fn default_startup_grace_ms() -> u64 {
    500
}

fn default_stop_grace_ms() -> u64 {
    1000
}

fn default_removal_delay_ms() -> u64 {
    1000
}

fn default_startup_timeout_seconds() -> u64 {
    30
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            prompt_command: None,
            launch: LaunchStrategy::default(),
            poll_interval_ms: default_poll_interval_ms(),
            heartbeat_window_ms: default_heartbeat_window_ms(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            startup_grace_ms: default_startup_grace_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            removal_delay_ms: default_removal_delay_ms(),
            startup_timeout_seconds: default_startup_timeout_seconds(),
        }
    }
}

impl LocalConfig {
    /// Interval between response-file polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Maximum heartbeat age for a live session.
    #[must_use]
    pub fn heartbeat_window(&self) -> Duration {
        Duration::from_millis(self.heartbeat_window_ms)
    }

    /// Interval of the background liveness sweep.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Delay after launch before `start_session` returns.
    #[must_use]
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    /// Grace period for a graceful prompt exit on stop.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Delay before a stopped session's resources are released.
    #[must_use]
    pub fn removal_delay(&self) -> Duration {
        Duration::from_millis(self.removal_delay_ms)
    }

    /// Upper bound on the "still starting" tolerance for a missing heartbeat.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }

    /// Resolve the prompt binary path.
    ///
    /// Uses `prompt_command` when set, otherwise the `agent-inquiry-prompt`
    /// binary sitting next to the current executable, otherwise the bare
    /// binary name (resolved through `PATH`).
    #[must_use]
    pub fn resolve_prompt_command(&self) -> PathBuf {
        if let Some(ref command) = self.prompt_command {
            return command.clone();
        }
        let file_name = format!("{PROMPT_BINARY}{}", env::consts::EXE_SUFFIX);
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
            .filter(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(file_name))
    }
}

/// Remaining-time checkpoints at which a pending remote question is re-rendered.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CountdownConfig {
    /// Coarse checkpoints in seconds remaining.
    #[serde(default = "default_checkpoints")]
    pub checkpoints: Vec<u64>,
    /// Below this many seconds the message is updated every second.
    #[serde(default = "default_final_seconds")]
    pub final_seconds: u64,
}

fn default_checkpoints() -> Vec<u64> {
    vec![30, 15]
}

fn default_final_seconds() -> u64 {
    10
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            checkpoints: default_checkpoints(),
            final_seconds: default_final_seconds(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Slack user IDs allowed to answer questions (the remote allow-list).
    #[serde(default)]
    pub authorized_user_ids: Vec<String>,
    /// Slack connectivity settings; the remote backend is disabled when absent.
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    /// Timeout configuration for blocking asks.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Local prompt backend settings.
    #[serde(default)]
    pub local: LocalConfig,
    /// Countdown checkpoints for remote questions.
    #[serde(default)]
    pub countdown: CountdownConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load Slack credentials from OS keychain with env-var fallback.
    ///
    /// No-op when the `[slack]` section is absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// the required tokens.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if let Some(ref mut slack) = self.slack {
            slack.app_token = load_credential("slack_app_token", "SLACK_APP_TOKEN").await?;
            slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        }
        Ok(())
    }

    /// Whether a Slack user is on the allow-list.
    #[must_use]
    pub fn is_authorized(&self, user_id: &str) -> bool {
        self.authorized_user_ids.iter().any(|id| id == user_id)
    }

    /// Default per-question timeout.
    #[must_use]
    pub fn ask_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.ask_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.timeouts.ask_seconds == 0 || self.timeouts.session_seconds == 0 {
            return Err(AppError::Config("timeouts must be greater than zero".into()));
        }

        if self.local.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "local.poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.local.heartbeat_window_ms == 0 || self.local.sweep_interval_seconds == 0 {
            return Err(AppError::Config(
                "local liveness intervals must be greater than zero".into(),
            ));
        }

        if self.slack.is_some() && self.authorized_user_ids.is_empty() {
            warn!("slack configured with an empty authorized_user_ids list; remote questions cannot be answered");
        }

        let before = self.authorized_user_ids.len();
        let mut seen = std::collections::HashSet::new();
        self.authorized_user_ids.retain(|id| seen.insert(id.clone()));
        if self.authorized_user_ids.len() != before {
            warn!("duplicate entries removed from authorized_user_ids");
        }

        self.countdown.checkpoints.sort_unstable_by(|a, b| b.cmp(a));
        self.countdown.checkpoints.dedup();

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
