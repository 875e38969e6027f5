#![forbid(unsafe_code)]

//! `agent-inquiry-prompt`: terminal prompt for a local session.
//!
//! Launched by the server with a base64 startup payload. Touches the
//! session heartbeat every second, shows each question the server
//! publishes, and writes the typed answer back. Exits when the server asks
//! it to close or when stdin ends.

use std::io::Write as _;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use agent_inquiry::local::mailbox::FileMailbox;
use agent_inquiry::local::payload::StartupPayload;
use agent_inquiry::models::question::Question;
use agent_inquiry::{AppError, Result};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(
    name = "agent-inquiry-prompt",
    about = "Terminal prompt for agent-inquiry local sessions",
    version,
    long_about = None
)]
struct Cli {
    /// Base64-encoded startup payload supplied by the server.
    payload: String,
}

/// Why a displayed question stopped waiting for input.
enum Withdrawal {
    /// The server removed the question (answered elsewhere or timed out).
    Retracted,
    /// The server asked the prompt to exit.
    Closed,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;

    let payload = StartupPayload::decode(&args.payload)?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(payload))
}

async fn run(payload: StartupPayload) -> Result<()> {
    let mailbox = FileMailbox::new(payload.output_dir.clone(), payload.session_id.clone());

    mailbox.touch_heartbeat().await?;
    let heartbeat = tokio::spawn({
        let mailbox = mailbox.clone();
        async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(err) = mailbox.touch_heartbeat().await {
                    warn!(%err, "heartbeat write failed");
                }
            }
        }
    });

    println!("=== {} ===", payload.title);
    if let Some(secs) = payload.timeout_seconds {
        println!("(each question waits up to {secs}s for an answer)");
    }
    println!("Waiting for questions...");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut last_seen: Option<String> = None;

    'session: loop {
        if mailbox.close_requested().await {
            break;
        }

        let question = match mailbox.read_question().await {
            Ok(Some(question)) if last_seen.as_deref() != Some(question.id.as_str()) => question,
            Ok(_) => {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
            Err(err) => {
                warn!(%err, "unreadable question file");
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }
        };
        last_seen = Some(question.id.clone());
        show(&question);

        loop {
            tokio::select! {
                line = stdin.next_line() => {
                    let Ok(Some(line)) = line else {
                        break 'session;
                    };
                    if line.trim().is_empty() {
                        prompt_marker();
                        continue;
                    }
                    let answer = question.resolve_input(&line);
                    if let Err(err) = mailbox.respond(&question.id, &answer).await {
                        warn!(%err, "failed to write answer");
                        println!("Could not deliver the answer: {err}");
                    } else {
                        println!("Sent: {answer}");
                    }
                    break;
                }
                withdrawal = wait_for_withdrawal(&mailbox, &question.id) => {
                    match withdrawal {
                        Withdrawal::Retracted => {
                            println!("(question withdrawn)");
                            break;
                        }
                        Withdrawal::Closed => break 'session,
                    }
                }
            }
        }
    }

    heartbeat.abort();
    println!("Session closed.");
    Ok(())
}

fn show(question: &Question) {
    println!();
    println!("{}", question.text);
    for (index, option) in question.options.iter().enumerate() {
        println!("  {}. {option}", index + 1);
    }
    if !question.options.is_empty() {
        println!("Type a number to choose, or any other text to answer freely.");
    }
    prompt_marker();
}

fn prompt_marker() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn wait_for_withdrawal(mailbox: &FileMailbox, question_id: &str) -> Withdrawal {
    loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        if mailbox.close_requested().await {
            return Withdrawal::Closed;
        }
        match mailbox.read_question().await {
            Ok(Some(current)) if current.id == question_id => {}
            Ok(_) => return Withdrawal::Retracted,
            Err(err) => warn!(%err, "unreadable question file"),
        }
    }
}
