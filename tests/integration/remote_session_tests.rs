//! Remote sessions through the exchange facade.

use std::time::Duration;

use super::test_helpers::{local_manager, remote_manager, FakeTransport};
use agent_inquiry::config::GlobalConfig;
use agent_inquiry::exchange::{AskRequest, Exchange};
use agent_inquiry::models::question::{AskOutcome, StopOutcome};
use agent_inquiry::models::session::ChannelKind;
use agent_inquiry::remote::transport::{InboundEvent, InboundPayload};
use agent_inquiry::remote::RouteOutcome;

#[tokio::test]
async fn remote_session_lifecycle() {
    let temp = tempfile::tempdir().expect("tempdir");
    let transport = FakeTransport::new();
    let remote = remote_manager(&transport, &["U1"]);
    let exchange = Exchange::new(
        &GlobalConfig::default(),
        local_manager(temp.path().to_path_buf()),
        Some(remote.clone()),
    );

    let session_id = exchange
        .start_session(ChannelKind::Remote, "Deploy", None)
        .await
        .expect("start");
    assert_eq!(
        exchange.store().active_channel(&session_id).await,
        Some(ChannelKind::Remote)
    );

    let asking = tokio::spawn({
        let exchange = exchange.clone();
        let session_id = session_id.clone();
        async move {
            exchange
                .ask(
                    AskRequest::new(ChannelKind::Remote, "Roll out?")
                        .in_session(session_id)
                        .with_timeout(Duration::from_secs(5)),
                )
                .await
        }
    });
    transport.wait_for_sends(2).await;

    let reply = InboundEvent {
        endpoint_id: "U1".into(),
        payload: InboundPayload::Text("go ahead".into()),
    };
    assert!(matches!(remote.handle_inbound(reply).await, RouteOutcome::Resolved(_)));
    assert_eq!(
        asking.await.expect("join").expect("ask"),
        AskOutcome::Answered("go ahead".into())
    );

    assert_eq!(exchange.stop_session(&session_id).await, StopOutcome::Stopped);
    assert_eq!(exchange.stop_session(&session_id).await, StopOutcome::AlreadyStopped);
    let after = exchange
        .ask(AskRequest::new(ChannelKind::Remote, "More?").in_session(&session_id))
        .await
        .expect("ask");
    assert_eq!(after, AskOutcome::NotFound);
}

#[tokio::test]
async fn one_off_remote_ask_times_out() {
    let temp = tempfile::tempdir().expect("tempdir");
    let transport = FakeTransport::new();
    let exchange = Exchange::new(
        &GlobalConfig::default(),
        local_manager(temp.path().to_path_buf()),
        Some(remote_manager(&transport, &["U1"])),
    );

    let outcome = exchange
        .ask(AskRequest::new(ChannelKind::Remote, "Hello?").with_timeout(Duration::from_millis(150)))
        .await
        .expect("ask");
    assert_eq!(outcome, AskOutcome::TimedOut);
    assert!(transport.sent()[0].message.text.starts_with("**agent** asks:"));
}

#[tokio::test]
async fn shutdown_cancels_pending_remote_asks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let transport = FakeTransport::new();
    let exchange = Exchange::new(
        &GlobalConfig::default(),
        local_manager(temp.path().to_path_buf()),
        Some(remote_manager(&transport, &["U1"])),
    );

    let asking = tokio::spawn({
        let exchange = exchange.clone();
        async move {
            exchange
                .ask(AskRequest::new(ChannelKind::Remote, "Wait").with_timeout(Duration::from_secs(30)))
                .await
        }
    });
    transport.wait_for_sends(1).await;

    exchange.shutdown().await;
    let outcome = tokio::time::timeout(Duration::from_secs(2), asking)
        .await
        .expect("released")
        .expect("join")
        .expect("ask");
    assert_eq!(outcome, AskOutcome::Cancelled);
}

#[tokio::test]
async fn remote_start_fails_when_nobody_is_reachable() {
    let temp = tempfile::tempdir().expect("tempdir");
    let transport = FakeTransport::new();
    let exchange = Exchange::new(
        &GlobalConfig::default(),
        local_manager(temp.path().to_path_buf()),
        Some(remote_manager(&transport, &[])),
    );

    let err = exchange
        .start_session(ChannelKind::Remote, "Empty", None)
        .await
        .expect_err("no endpoint");
    assert!(err.to_string().starts_with("delivery:"));
    assert!(exchange.store().is_empty().await);
}
