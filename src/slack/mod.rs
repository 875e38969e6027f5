//! Slack transport for the remote channel.

pub mod blocks;
pub mod client;
pub mod events;
pub mod markup;
