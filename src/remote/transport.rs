//! Messaging transport seam for the remote channel.
//!
//! The manager never talks to Slack directly: it sends and edits messages
//! through [`ChannelTransport`] and receives inbound traffic as
//! [`InboundEvent`] values on an mpsc channel. Slack implements the trait
//! in production; tests substitute an in-memory fake.

use std::future::Future;
use std::pin::Pin;

use crate::Result;

/// Boxed future returned by transport methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Handle to a message that was delivered to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryRef {
    /// Endpoint (user id) the message was delivered to.
    pub endpoint: String,
    /// Conversation the message lives in.
    pub channel: String,
    /// Transport-assigned message id (Slack `ts`).
    pub message_id: String,
}

impl DeliveryRef {
    /// Lookup key combining conversation and message id.
    #[must_use]
    pub fn key(&self) -> String {
        delivery_key(&self.channel, &self.message_id)
    }
}

/// Lookup key for a `(channel, message_id)` pair.
#[must_use]
pub fn delivery_key(channel: &str, message_id: &str) -> String {
    format!("{channel}:{message_id}")
}

/// A message to send or to replace an earlier one with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Main body (Markdown).
    pub text: String,
    /// Quick-reply option labels rendered as buttons.
    pub options: Vec<String>,
    /// Trailing status line (countdown, selection, expiry).
    pub footer: Option<String>,
}

impl OutboundMessage {
    /// Plain message with no options.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Message carrying quick-reply options.
    #[must_use]
    pub fn with_options(text: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            text: text.into(),
            options,
            footer: None,
        }
    }

    /// Copy of this message with `footer` set and the buttons kept.
    #[must_use]
    pub fn footed(&self, footer: impl Into<String>) -> Self {
        Self {
            footer: Some(footer.into()),
            ..self.clone()
        }
    }

    /// Copy of this message with `footer` set and the buttons removed.
    #[must_use]
    pub fn settled(&self, footer: impl Into<String>) -> Self {
        Self {
            text: self.text.clone(),
            options: Vec::new(),
            footer: Some(footer.into()),
        }
    }
}

/// What an endpoint sent us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    /// Free-form text reply.
    Text(String),
    /// Button press on a delivered message.
    Callback {
        /// Conversation of the pressed message.
        channel: String,
        /// Id of the pressed message.
        message_id: String,
        /// Button value (the option label).
        value: String,
    },
}

/// An inbound message or callback, tagged with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Sender's endpoint (user id).
    pub endpoint_id: String,
    /// Event body.
    pub payload: InboundPayload,
}

/// Outbound half of a remote messaging transport.
pub trait ChannelTransport: Send + Sync {
    /// Deliver `message` to `endpoint` (a direct message to that user).
    fn send<'a>(
        &'a self,
        endpoint: &'a str,
        message: &'a OutboundMessage,
    ) -> TransportFuture<'a, DeliveryRef>;

    /// Replace a delivered message's content.
    fn edit<'a>(
        &'a self,
        delivery: &'a DeliveryRef,
        message: &'a OutboundMessage,
    ) -> TransportFuture<'a, ()>;
}
