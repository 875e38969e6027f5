//! Slack Socket Mode client and the remote channel transport built on it.

use std::sync::Arc;
use std::time::Duration;

use slack_morphism::prelude::{
    SlackApiChatPostMessageRequest, SlackApiChatPostMessageResponse, SlackApiChatUpdateRequest,
    SlackApiToken, SlackApiTokenType, SlackApiTokenValue, SlackChannelId, SlackClient,
    SlackClientEventsListenerEnvironment, SlackClientHyperHttpsConnector, SlackClientSession,
    SlackClientSocketModeConfig, SlackClientSocketModeListener, SlackMessageContent,
    SlackSocketModeListenerCallbacks, SlackTs,
};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{error, info, warn};

use crate::remote::transport::{
    ChannelTransport, DeliveryRef, InboundEvent, OutboundMessage, TransportFuture,
};
use crate::slack::{blocks, events};
use crate::{config::SlackConfig, AppError, Result};

const MAX_POST_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Slack Web API client plus the Socket Mode listener feeding inbound events.
pub struct SlackService {
    client: Arc<SlackClient<SlackClientHyperHttpsConnector>>,
    bot_token: SlackApiToken,
}

/// Join handles for Slack background tasks.
pub struct SlackRuntime {
    /// Socket Mode listener task.
    pub socket_task: JoinHandle<()>,
}

impl SlackService {
    /// Start the Slack client and the Socket Mode listener.
    ///
    /// Inbound direct messages and button clicks are forwarded to
    /// `inbound_tx`; authorization is left to the receiver.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the HTTPS connector cannot be created.
    pub fn start(
        config: &SlackConfig,
        inbound_tx: mpsc::Sender<InboundEvent>,
    ) -> Result<(Self, SlackRuntime)> {
        let connector = SlackClientHyperHttpsConnector::new()
            .map_err(|err| AppError::Slack(format!("failed to init slack connector: {err}")))?;
        let client = Arc::new(SlackClient::new(connector));
        let bot_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.bot_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::Bot),
        };
        let app_token = SlackApiToken {
            token_value: SlackApiTokenValue(config.app_token.clone()),
            cookie: None,
            team_id: None,
            scope: None,
            token_type: Some(SlackApiTokenType::App),
        };

        let socket_task = Self::spawn_socket_mode(&client, app_token, inbound_tx);

        info!("slack service started in socket mode");

        Ok((Self { client, bot_token }, SlackRuntime { socket_task }))
    }

    fn spawn_socket_mode(
        client: &Arc<SlackClient<SlackClientHyperHttpsConnector>>,
        app_token: SlackApiToken,
        inbound_tx: mpsc::Sender<InboundEvent>,
    ) -> JoinHandle<()> {
        let listener_env = Arc::new(
            SlackClientEventsListenerEnvironment::new(Arc::clone(client))
                .with_error_handler(|err, _client, _state| {
                    error!(?err, "socket mode error");
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                })
                .with_user_state(inbound_tx),
        );
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_hello_events(|event, _client, _state| async move {
                info!(?event, "socket hello");
            })
            .with_interaction_events(events::handle_interaction)
            .with_push_events(events::handle_push_event);
        let config = SlackClientSocketModeConfig {
            max_connections_count: SlackClientSocketModeConfig::DEFAULT_CONNECTIONS_COUNT,
            debug_connections: SlackClientSocketModeConfig::DEFAULT_DEBUG_CONNECTIONS,
            initial_backoff_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_INITIAL_BACKOFF_IN_SECONDS,
            reconnect_timeout_in_seconds:
                SlackClientSocketModeConfig::DEFAULT_RECONNECT_TIMEOUT_IN_SECONDS,
            ping_interval_in_seconds: SlackClientSocketModeConfig::DEFAULT_PING_INTERVAL_IN_SECONDS,
            ping_failure_threshold_times:
                SlackClientSocketModeConfig::DEFAULT_PING_FAILURE_THRESHOLD_TIMES,
        };

        let listener = SlackClientSocketModeListener::new(&config, listener_env, callbacks);
        tokio::spawn(async move {
            if let Err(error) = listener.listen_for(&app_token).await {
                error!(?error, "socket mode listen failed");
                return;
            }

            listener.serve().await;
            info!("socket mode listener exited");
        })
    }

    /// Create an HTTP session for direct API calls using the bot token.
    #[must_use]
    pub fn http_session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.bot_token)
    }

    /// Post a message, retrying rate-limit and transient failures a few times.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Delivery` once every attempt has failed.
    pub async fn post_message(
        &self,
        channel: SlackChannelId,
        message: &OutboundMessage,
    ) -> Result<SlackApiChatPostMessageResponse> {
        let request = SlackApiChatPostMessageRequest::new(channel, content_for(message));
        let session = self.http_session();
        let mut backoff = INITIAL_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match session.chat_post_message(&request).await {
                Ok(response) => return Ok(response),
                Err(error) if attempt < MAX_POST_ATTEMPTS => {
                    let delay = match &error {
                        slack_morphism::errors::SlackClientError::RateLimitError(rate) => {
                            rate.retry_after.unwrap_or(backoff)
                        }
                        _ => backoff,
                    };
                    warn!(?error, attempt, delay = ?delay, "slack post failed; retrying");
                    sleep(delay).await;
                    backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                    attempt += 1;
                }
                Err(error) => {
                    return Err(AppError::Delivery(format!(
                        "failed to post slack message after {attempt} attempts: {error}"
                    )));
                }
            }
        }
    }

    /// Replace the content of an existing Slack message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Slack` if the Slack API call fails.
    pub async fn update_message(
        &self,
        channel: SlackChannelId,
        ts: SlackTs,
        message: &OutboundMessage,
    ) -> Result<()> {
        let request = SlackApiChatUpdateRequest::new(channel, content_for(message), ts);
        self.http_session()
            .chat_update(&request)
            .await
            .map_err(|err| AppError::Slack(format!("failed to update message: {err}")))?;
        Ok(())
    }
}

impl ChannelTransport for SlackService {
    fn send<'a>(
        &'a self,
        endpoint: &'a str,
        message: &'a OutboundMessage,
    ) -> TransportFuture<'a, DeliveryRef> {
        Box::pin(async move {
            // Posting to a user id opens (or reuses) the bot's DM with them.
            let response = self
                .post_message(SlackChannelId(endpoint.to_owned()), message)
                .await?;
            Ok(DeliveryRef {
                endpoint: endpoint.to_owned(),
                channel: response.channel.0,
                message_id: response.ts.0,
            })
        })
    }

    fn edit<'a>(
        &'a self,
        delivery: &'a DeliveryRef,
        message: &'a OutboundMessage,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.update_message(
                SlackChannelId(delivery.channel.clone()),
                SlackTs(delivery.message_id.clone()),
                message,
            )
            .await
        })
    }
}

fn content_for(message: &OutboundMessage) -> SlackMessageContent {
    SlackMessageContent {
        text: Some(blocks::fallback_text(message)),
        blocks: Some(blocks::message_blocks(message)),
        attachments: None,
        upload: None,
        files: None,
        reactions: None,
        metadata: None,
    }
}
