//! End-to-end tests for local sessions through the exchange facade.
//!
//! A background task plays the prompt process: it heartbeats, reads the
//! question file, and writes the response file.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::test_helpers::{fast_local_config, local_manager};
use agent_inquiry::config::GlobalConfig;
use agent_inquiry::exchange::{AskRequest, Exchange};
use agent_inquiry::local::mailbox::FileMailbox;
use agent_inquiry::local::manager::SESSION_DIR_PREFIX;
use agent_inquiry::local::LocalReply;
use agent_inquiry::models::question::{AskOutcome, Question, StopOutcome};
use agent_inquiry::models::session::ChannelKind;
use tokio::task::JoinHandle;

/// What the simulated prompt does with each question.
#[derive(Clone, Copy)]
enum Behaviour {
    /// Type the given reply.
    Reply(&'static str),
    /// Type the question text back.
    Echo,
    /// Heartbeat but never answer.
    Ignore,
}

fn simulated_prompt(dir: PathBuf, session_id: String, behaviour: Behaviour) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mailbox = FileMailbox::new(dir, session_id);
        let mut answered = None;
        for _ in 0..200 {
            if mailbox.close_requested().await || !mailbox.dir().exists() {
                return;
            }
            let _ = mailbox.touch_heartbeat().await;
            if !matches!(behaviour, Behaviour::Ignore) {
                if let Ok(Some(question)) = mailbox.read_question().await {
                    if answered.as_ref() != Some(&question.id) {
                        let answer = match behaviour {
                            Behaviour::Reply(input) => question.resolve_input(input),
                            _ => question.text.clone(),
                        };
                        mailbox.respond(&question.id, &answer).await.expect("respond");
                        answered = Some(question.id);
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
}

fn exchange(root: &Path) -> Exchange {
    let config = GlobalConfig {
        local: fast_local_config(),
        ..GlobalConfig::default()
    };
    Exchange::new(&config, local_manager(root.to_path_buf()), None)
}

#[tokio::test]
async fn session_round_trip_then_stop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exchange = exchange(temp.path());

    let session_id = exchange
        .start_session(ChannelKind::Local, "Checklist", None)
        .await
        .expect("start");
    let dir = exchange.local().session_dir(&session_id).await.expect("dir");
    let prompt = simulated_prompt(dir.clone(), session_id.clone(), Behaviour::Reply("2"));

    let outcome = exchange
        .ask(
            AskRequest::new(ChannelKind::Local, "Proceed?")
                .in_session(&session_id)
                .with_options(vec!["yes".into(), "no".into()])
                .with_timeout(Duration::from_secs(5)),
        )
        .await
        .expect("ask");
    assert_eq!(outcome, AskOutcome::Answered("no".into()));

    let second = exchange
        .ask(
            AskRequest::new(ChannelKind::Local, "Anything else?")
                .in_session(&session_id)
                .with_timeout(Duration::from_secs(5)),
        )
        .await
        .expect("ask");
    assert_eq!(second, AskOutcome::Answered("2".into()), "free-form keeps the text");

    assert_eq!(exchange.stop_session(&session_id).await, StopOutcome::Stopped);
    assert_eq!(exchange.stop_session(&session_id).await, StopOutcome::AlreadyStopped);

    let after = exchange
        .ask(AskRequest::new(ChannelKind::Local, "Still?").in_session(&session_id))
        .await
        .expect("ask");
    assert_eq!(after, AskOutcome::NotFound);

    tokio::time::timeout(Duration::from_secs(2), prompt)
        .await
        .expect("prompt sees the close signal")
        .expect("join");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!dir.exists(), "directory removed after the delay");
    assert_eq!(exchange.stop_session(&session_id).await, StopOutcome::NotFound);
}

#[tokio::test]
async fn unanswered_local_question_times_out() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exchange = exchange(temp.path());
    let session_id = exchange
        .start_session(ChannelKind::Local, "Quiet", None)
        .await
        .expect("start");
    let dir = exchange.local().session_dir(&session_id).await.expect("dir");
    let _prompt = simulated_prompt(dir.clone(), session_id.clone(), Behaviour::Ignore);

    let outcome = exchange
        .ask(
            AskRequest::new(ChannelKind::Local, "Hello?")
                .in_session(&session_id)
                .with_timeout(Duration::from_millis(300)),
        )
        .await
        .expect("ask");
    assert_eq!(outcome, AskOutcome::TimedOut);
    assert!(
        !dir.join(format!("{session_id}.json")).exists(),
        "question file withdrawn on timeout"
    );
    exchange.stop_session(&session_id).await;
}

#[tokio::test]
async fn queued_local_ask_times_out_from_dispatch() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exchange = exchange(temp.path());
    let session_id = exchange
        .start_session(ChannelKind::Local, "Busy", None)
        .await
        .expect("start");
    let dir = exchange.local().session_dir(&session_id).await.expect("dir");
    let _prompt = simulated_prompt(dir, session_id.clone(), Behaviour::Ignore);

    let local = exchange.local();
    let timeout = Some(Duration::from_secs(1));
    let first = Question::new("First?", Vec::new());
    let second = Question::new("Second?", Vec::new());
    let dispatched = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        local.ask(&session_id, &first, timeout),
        local.ask(&session_id, &second, timeout),
    );
    let elapsed = dispatched.elapsed();

    assert_eq!(first.expect("first"), LocalReply::Closed);
    assert_eq!(second.expect("second"), LocalReply::Closed);
    assert!(
        elapsed < Duration::from_millis(1500),
        "queued ask waited {elapsed:?} past its own window"
    );
    exchange.stop_session(&session_id).await;
}

#[tokio::test]
async fn concurrent_asks_are_answered_in_turn() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exchange = exchange(temp.path());
    let session_id = exchange
        .start_session(ChannelKind::Local, "Pair", None)
        .await
        .expect("start");
    let dir = exchange.local().session_dir(&session_id).await.expect("dir");
    let _prompt = simulated_prompt(dir, session_id.clone(), Behaviour::Echo);

    let local = exchange.local();
    let timeout = Some(Duration::from_secs(5));
    let first = Question::new("first", Vec::new());
    let second = Question::new("second", Vec::new());
    let (first, second) = tokio::join!(
        local.ask(&session_id, &first, timeout),
        local.ask(&session_id, &second, timeout),
    );

    assert_eq!(first.expect("first"), LocalReply::Answered("first".into()));
    assert_eq!(second.expect("second"), LocalReply::Answered("second".into()));
    exchange.stop_session(&session_id).await;
}

#[tokio::test]
async fn dead_prompt_reports_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exchange = exchange(temp.path());
    let session_id = exchange
        .start_session(ChannelKind::Local, "Crashed", None)
        .await
        .expect("start");

    let outcome = exchange
        .ask(
            AskRequest::new(ChannelKind::Local, "Anyone?")
                .in_session(&session_id)
                .with_timeout(Duration::from_secs(5)),
        )
        .await
        .expect("ask");
    assert_eq!(outcome, AskOutcome::NotFound, "never heartbeated past startup");
}

#[tokio::test]
async fn one_off_ask_uses_a_temporary_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_path_buf();
    let exchange = exchange(&root);

    let finder = tokio::spawn({
        let root = root.clone();
        async move {
            for _ in 0..100 {
                let found = std::fs::read_dir(&root).ok().and_then(|entries| {
                    entries
                        .filter_map(std::result::Result::ok)
                        .map(|entry| entry.file_name().to_string_lossy().into_owned())
                        .find(|name| name.starts_with(SESSION_DIR_PREFIX))
                });
                if let Some(session_id) = found {
                    return simulated_prompt(root.join(&session_id), session_id, Behaviour::Reply("ok"));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("no session directory appeared");
        }
    });

    let outcome = exchange
        .ask(AskRequest::new(ChannelKind::Local, "Quick one?").with_timeout(Duration::from_secs(5)))
        .await
        .expect("ask");
    assert_eq!(outcome, AskOutcome::Answered("ok".into()));

    let prompt = finder.await.expect("join");
    tokio::time::timeout(Duration::from_secs(2), prompt)
        .await
        .expect("temporary session is closed")
        .expect("join");
    assert!(exchange.local().active_session_ids().await.is_empty());
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exchange = exchange(temp.path());
    let outcome = exchange
        .ask(AskRequest::new(ChannelKind::Local, "?").in_session("agent-inquiry-missing"))
        .await
        .expect("ask");
    assert_eq!(outcome, AskOutcome::NotFound);
    assert_eq!(exchange.stop_session("agent-inquiry-missing").await, StopOutcome::NotFound);
}

#[tokio::test]
async fn remote_requests_without_remote_channel_are_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let exchange = exchange(temp.path());

    let err = exchange
        .start_session(ChannelKind::Remote, "Nope", None)
        .await
        .expect_err("remote not configured");
    assert!(err.to_string().starts_with("config:"));
    assert_eq!(exchange.notify("hi").await, 0);
}
