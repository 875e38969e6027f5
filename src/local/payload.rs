//! Startup payload handed to the prompt process on its command line.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Everything the prompt process needs to attach to its session directory.
///
/// Travels as base64-encoded JSON so it survives terminal launchers that
/// re-quote their arguments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartupPayload {
    /// Session identifier.
    pub session_id: String,
    /// Title shown at the top of the prompt window.
    pub title: String,
    /// Session directory shared with the core.
    pub output_dir: PathBuf,
    /// Per-question timeout shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl StartupPayload {
    /// Encode as base64 JSON.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Payload` if serialization fails.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode from base64 JSON.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Payload` for invalid base64 or JSON.
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = STANDARD.decode(raw.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
