//! Socket Mode event callbacks.
//!
//! Translates direct messages and button clicks into [`InboundEvent`]s and
//! forwards them to the remote manager's router over the mpsc sender kept
//! in the listener's user state. The allow-list check happens in the
//! manager, so every event from a human sender is forwarded here.

use std::sync::Arc;

use slack_morphism::prelude::{
    SlackClient, SlackClientEventsUserState, SlackClientHyperHttpsConnector,
    SlackEventCallbackBody, SlackInteractionEvent, SlackPushEventCallback,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::remote::transport::{InboundEvent, InboundPayload};

async fn inbound_sender(state: &SlackClientEventsUserState) -> Option<mpsc::Sender<InboundEvent>> {
    let guard = state.read().await;
    guard.get_user_state::<mpsc::Sender<InboundEvent>>().cloned()
}

async fn forward(state: &SlackClientEventsUserState, event: InboundEvent) {
    let Some(tx) = inbound_sender(state).await else {
        warn!("inbound sender not available; dropping slack event");
        return;
    };
    if let Err(err) = tx.send(event).await {
        warn!(%err, "inbound router is gone; dropping slack event");
    }
}

/// Handle push events; only human-authored messages are forwarded.
///
/// # Errors
///
/// Never fails; forwarding problems are logged.
pub async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackEventCallbackBody::Message(message) = event.event else {
        debug!("non-message push event ignored");
        return Ok(());
    };

    // Bot echoes (including our own posts) and edits/joins carry one of these.
    if message.sender.bot_id.is_some() || message.subtype.is_some() {
        return Ok(());
    }
    let Some(user) = message.sender.user else {
        return Ok(());
    };
    let Some(text) = message.content.and_then(|content| content.text) else {
        return Ok(());
    };

    forward(
        &state,
        InboundEvent {
            endpoint_id: user.to_string(),
            payload: InboundPayload::Text(text),
        },
    )
    .await;
    Ok(())
}

/// Handle interactive payloads; option button clicks become callbacks.
///
/// # Errors
///
/// Never fails; malformed payloads are logged and dropped.
pub async fn handle_interaction(
    event: SlackInteractionEvent,
    _client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    state: SlackClientEventsUserState,
) -> slack_morphism::UserCallbackResult<()> {
    let SlackInteractionEvent::BlockActions(block_event) = event else {
        debug!("non-block-action interaction ignored");
        return Ok(());
    };

    let Some(user_id) = block_event.user.as_ref().map(|u| u.id.to_string()) else {
        warn!("block action with no user; ignoring");
        return Ok(());
    };
    let (Some(channel), Some(message)) = (block_event.channel.as_ref(), block_event.message.as_ref())
    else {
        warn!(user_id, "block action without channel or message; ignoring");
        return Ok(());
    };

    for action in block_event.actions.iter().flatten() {
        let Some(ref value) = action.value else {
            continue;
        };
        forward(
            &state,
            InboundEvent {
                endpoint_id: user_id.clone(),
                payload: InboundPayload::Callback {
                    channel: channel.id.to_string(),
                    message_id: message.origin.ts.to_string(),
                    value: value.clone(),
                },
            },
        )
        .await;
    }
    Ok(())
}
