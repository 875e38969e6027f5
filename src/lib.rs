#![forbid(unsafe_code)]

//! `agent-inquiry`: ask a human a question and block until the answer
//! arrives, through a local terminal prompt or a Slack bot.

pub mod config;
pub mod errors;
pub mod exchange;
pub mod ipc;
pub mod local;
pub mod models;
pub mod remote;
pub mod slack;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
