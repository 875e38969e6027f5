//! NDJSON request server over a pair of byte streams (stdin/stdout in the
//! binary).
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"id": 1, "op": "ask", "channel": "local", "question": "Deploy?", "options": ["yes", "no"]}
//! {"id": 2, "op": "start_session", "channel": "remote", "title": "Release checklist"}
//! {"id": 3, "op": "ask", "session_id": "…", "question": "Tag now?", "timeout_seconds": 60}
//! {"id": 4, "op": "stop_session", "session_id": "…"}
//! {"id": 5, "op": "notify", "message": "Build finished"}
//! ```
//!
//! Response (one JSON object per line, echoing the request `id`):
//! ```json
//! {"id": 1, "ok": true, "data": {"status": "answered", "answer": "yes"}}
//! {"id": 4, "ok": false, "error": "payload: unknown op"}
//! ```
//!
//! Each request runs on its own task, so a long `ask` never holds up the
//! requests behind it; responses may therefore arrive out of order.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::exchange::{AskRequest, Exchange};
use crate::ipc::codec::NdjsonCodec;
use crate::models::session::ChannelKind;
use crate::{AppError, Result};

const RESPONSE_QUEUE: usize = 64;

/// Request verbs; the `id` field rides alongside and is echoed back.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    Ask {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        channel: Option<ChannelKind>,
        question: String,
        #[serde(default)]
        options: Vec<String>,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    StartSession {
        channel: ChannelKind,
        title: String,
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    StopSession {
        session_id: String,
    },
    Notify {
        message: String,
    },
}

impl Command {
    fn op(&self) -> &'static str {
        match self {
            Self::Ask { .. } => "ask",
            Self::StartSession { .. } => "start_session",
            Self::StopSession { .. } => "stop_session",
            Self::Notify { .. } => "notify",
        }
    }
}

/// Outbound response.
#[derive(Debug, Serialize)]
struct IpcResponse {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IpcResponse {
    fn from_result(id: Value, result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self {
                id,
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self {
                id,
                ok: false,
                data: None,
                error: Some(err.to_string()),
            },
        }
    }
}

/// Serve requests from `reader` until EOF or cancellation.
///
/// On EOF every in-flight request is allowed to finish and its response is
/// written before returning. On cancellation reading stops at once; in-flight
/// requests are expected to be resolved by the exchange's shutdown.
///
/// # Errors
///
/// Returns `AppError::Io` if the request stream fails.
pub async fn serve<R, W>(
    exchange: Exchange,
    reader: R,
    writer: W,
    ct: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<IpcResponse>(RESPONSE_QUEUE);
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut lines = FramedRead::new(reader, NdjsonCodec::new());
    let mut in_flight = JoinSet::new();
    let mut outcome = Ok(());

    let span = info_span!("ipc_server");
    async {
        loop {
            tokio::select! {
                () = ct.cancelled() => {
                    info!("request server shutting down");
                    break;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                next = lines.next() => {
                    match next {
                        None => {
                            info!("request stream closed");
                            break;
                        }
                        Some(Ok(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let exchange = exchange.clone();
                            let tx = tx.clone();
                            in_flight.spawn(async move {
                                let response = handle_line(&exchange, &line).await;
                                if tx.send(response).await.is_err() {
                                    warn!("response writer is gone");
                                }
                            });
                        }
                        Some(Err(AppError::Payload(msg))) => {
                            warn!(%msg, "oversized request rejected");
                            let response = IpcResponse::from_result(Value::Null, Err(AppError::Payload(msg)));
                            if tx.send(response).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            warn!(%err, "request stream failed");
                            outcome = Err(err);
                            break;
                        }
                    }
                }
            }
        }

        // Shutdown resolves every pending exchange, so this drains quickly
        // on cancellation as well.
        while in_flight.join_next().await.is_some() {}
    }
    .instrument(span)
    .await;

    drop(tx);
    if let Err(err) = writer_task.await {
        warn!(%err, "response writer task failed");
    }
    outcome
}

async fn write_responses<W>(writer: W, mut rx: mpsc::Receiver<IpcResponse>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut sink = FramedWrite::new(writer, NdjsonCodec::new());
    while let Some(response) = rx.recv().await {
        let line = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"id":null,"ok":false,"error":"serialization failed"}"#.to_owned());
        if let Err(err) = sink.send(line).await {
            warn!(%err, "failed to write response");
            break;
        }
    }
}

/// Parse and execute one request line.
async fn handle_line(exchange: &Exchange, line: &str) -> IpcResponse {
    let raw: Value = match serde_json::from_str(line) {
        Ok(raw) => raw,
        Err(err) => return IpcResponse::from_result(Value::Null, Err(err.into())),
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let command: Command = match serde_json::from_value(raw) {
        Ok(command) => command,
        Err(err) => {
            return IpcResponse::from_result(
                id,
                Err(AppError::Payload(format!("invalid request: {err}"))),
            );
        }
    };

    let span = info_span!("ipc_request", op = command.op(), id = %id);
    let result = dispatch(exchange, command).instrument(span).await;
    if let Err(ref err) = result {
        warn!(%err, "request failed");
    } else {
        debug!("request completed");
    }
    IpcResponse::from_result(id, result)
}

async fn dispatch(exchange: &Exchange, command: Command) -> Result<Value> {
    match command {
        Command::Ask {
            session_id,
            channel,
            question,
            options,
            timeout_seconds,
        } => {
            let request = AskRequest {
                channel: channel.unwrap_or(ChannelKind::Local),
                session_id,
                question,
                options,
                timeout: timeout_seconds.map(Duration::from_secs),
            };
            let outcome = exchange.ask(request).await?;
            Ok(serde_json::to_value(outcome)?)
        }
        Command::StartSession {
            channel,
            title,
            timeout_seconds,
        } => {
            let session_id = exchange
                .start_session(channel, &title, timeout_seconds)
                .await?;
            Ok(json!({ "session_id": session_id }))
        }
        Command::StopSession { session_id } => {
            let outcome = exchange.stop_session(&session_id).await;
            Ok(json!({ "status": outcome }))
        }
        Command::Notify { message } => {
            let delivered = exchange.notify(&message).await;
            Ok(json!({ "delivered": delivered }))
        }
    }
}
