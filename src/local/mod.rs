//! Local channel: a prompt process on this machine, spoken to through files.

pub mod launcher;
pub mod mailbox;
pub mod manager;
pub mod monitor;
pub mod payload;

pub use manager::{LocalChannelManager, LocalReply};
