#![forbid(unsafe_code)]

//! `agent-inquiry`: human-in-the-loop question server.
//!
//! Loads configuration, starts the Slack Socket Mode connection (when
//! configured), the local liveness sweep, and the NDJSON request server on
//! stdin/stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_inquiry::config::GlobalConfig;
use agent_inquiry::exchange::Exchange;
use agent_inquiry::ipc::server;
use agent_inquiry::local::monitor::spawn_liveness_monitor;
use agent_inquiry::local::LocalChannelManager;
use agent_inquiry::remote::countdown::CountdownSchedule;
use agent_inquiry::remote::transport::ChannelTransport;
use agent_inquiry::remote::RemoteChannelManager;
use agent_inquiry::slack::client::SlackService;
use agent_inquiry::{AppError, Result};

/// Capacity of the inbound Slack event queue.
const INBOUND_QUEUE: usize = 256;

/// Upper bound on waiting for the request server to flush after shutdown.
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-inquiry", about = "Human-in-the-loop question server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-inquiry server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.load_credentials().await?;
    info!(
        remote = config.slack.is_some(),
        allow_listed = config.authorized_user_ids.len(),
        "configuration loaded"
    );

    let ct = CancellationToken::new();

    // ── Remote channel ──────────────────────────────────
    let mut router_handle = None;
    let mut slack_runtime = None;
    let remote = match config.slack {
        Some(ref slack_config) => {
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
            let (service, runtime) = SlackService::start(slack_config, inbound_tx).map_err(|err| {
                error!(%err, "slack service start failed");
                err
            })?;
            let transport: Arc<dyn ChannelTransport> = Arc::new(service);
            let remote = RemoteChannelManager::new(
                transport,
                config.authorized_user_ids.clone(),
                CountdownSchedule::new(&config.countdown.checkpoints, config.countdown.final_seconds),
            );
            router_handle = Some(remote.spawn_router(inbound_rx, ct.clone()));
            slack_runtime = Some(runtime);
            info!("remote channel ready");
            Some(remote)
        }
        None => {
            info!("slack not configured; running in local-only mode");
            None
        }
    };

    // ── Local channel ───────────────────────────────────
    let local = LocalChannelManager::new(
        config.local.clone(),
        Duration::from_secs(config.timeouts.session_seconds),
    );
    let exchange = Exchange::new(&config, local.clone(), remote);
    let monitor_handle = spawn_liveness_monitor(
        local,
        exchange.store().clone(),
        config.local.sweep_interval(),
        ct.clone(),
    );

    // ── Request server ──────────────────────────────────
    let server_ct = ct.clone();
    let server_exchange = exchange.clone();
    let mut server_handle = tokio::spawn(async move {
        if let Err(err) = server::serve(
            server_exchange,
            tokio::io::stdin(),
            tokio::io::stdout(),
            server_ct,
        )
        .await
        {
            error!(%err, "request server failed");
        }
    });
    info!("agent-inquiry ready");

    // ── Wait for shutdown signal or end of input ────────
    let server_finished = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            false
        }
        _ = &mut server_handle => {
            info!("request stream ended");
            true
        }
    };

    if config.slack.as_ref().is_some_and(|slack| slack.notify_on_shutdown) {
        exchange.notify("agent-inquiry is shutting down.").await;
    }
    exchange.shutdown().await;
    ct.cancel();

    if !server_finished && tokio::time::timeout(SERVER_DRAIN_TIMEOUT, server_handle).await.is_err() {
        warn!("request server did not drain in time");
    }
    if let Err(err) = monitor_handle.await {
        warn!(%err, "liveness monitor task failed");
    }
    if let Some(runtime) = slack_runtime {
        runtime.socket_task.abort();
    }
    if let Some(handle) = router_handle {
        if let Err(err) = handle.await {
            warn!(%err, "inbound router task failed");
        }
    }

    info!("agent-inquiry shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the request protocol.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
