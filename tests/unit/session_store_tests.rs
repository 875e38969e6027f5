use agent_inquiry::exchange::store::{Deactivation, SessionStore};
use agent_inquiry::models::session::{ChannelKind, Session};

#[tokio::test]
async fn inserted_session_is_active() {
    let store = SessionStore::new();
    store
        .insert(Session::new("s1".into(), ChannelKind::Local, "Title".into()))
        .await;

    assert_eq!(store.active_channel("s1").await, Some(ChannelKind::Local));
    assert_eq!(store.len().await, 1);
    assert!(store.get("s1").await.expect("present").is_active);
}

#[tokio::test]
async fn deactivation_is_one_way() {
    let store = SessionStore::new();
    store
        .insert(Session::new("s1".into(), ChannelKind::Remote, "Title".into()))
        .await;

    assert_eq!(
        store.deactivate("s1").await,
        Deactivation::Deactivated(ChannelKind::Remote)
    );
    assert_eq!(store.deactivate("s1").await, Deactivation::AlreadyInactive);
    assert_eq!(store.active_channel("s1").await, None);
    assert!(!store.is_empty().await, "entry stays until removal");
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let store = SessionStore::new();
    assert_eq!(store.deactivate("nope").await, Deactivation::Unknown);
    assert_eq!(store.active_channel("nope").await, None);
}

#[tokio::test]
async fn active_ids_filter_by_channel_and_state() {
    let store = SessionStore::new();
    store.insert(Session::new("l1".into(), ChannelKind::Local, "a".into())).await;
    store.insert(Session::new("l2".into(), ChannelKind::Local, "b".into())).await;
    store.insert(Session::new("r1".into(), ChannelKind::Remote, "c".into())).await;
    store.deactivate("l2").await;

    assert_eq!(store.active_ids(ChannelKind::Local).await, vec!["l1".to_owned()]);
    assert_eq!(store.active_ids(ChannelKind::Remote).await, vec!["r1".to_owned()]);
}

#[tokio::test]
async fn remove_drops_the_entry() {
    let store = SessionStore::new();
    store.insert(Session::new("s1".into(), ChannelKind::Local, "a".into())).await;
    assert!(store.remove("s1").await.is_some());
    assert!(store.is_empty().await);
    assert_eq!(store.deactivate("s1").await, Deactivation::Unknown);
}
