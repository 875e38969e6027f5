//! Remote channel: allow-listed chat users answering through a bot.

pub mod countdown;
pub mod intensive;
pub mod manager;
pub mod pending;
pub mod transport;

pub use manager::{RemoteChannelManager, RouteOutcome};
