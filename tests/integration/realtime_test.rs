//! Registry and gateway behavior seen from clients

use axum::extract::ws::Message;
use chatline::backend::realtime::gateway::DEFAULT_QUEUE_CAPACITY;
use chatline::backend::realtime::SessionState;
use chatline::backend::store::Store;
use chatline::shared::messaging::NewMessage;
use serde_json::json;

use crate::common::Harness;

#[tokio::test]
async fn test_every_tab_of_a_user_receives_events() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut tab1 = harness.connect("bob").await;
    let mut tab2 = harness.connect("bob").await;
    let mut alice = harness.connect("alice").await;
    assert_eq!(harness.registry.member_count("bob"), 2);

    alice
        .send(json!({"source": "message.send", "connectionId": connection, "message": "hi"}))
        .await;

    alice.recv_kind("message.send").await;
    for tab in [&mut tab1, &mut tab2] {
        let data = tab.recv_kind("message.send").await;
        assert_eq!(data["message"]["text"], "hi");
        assert_eq!(data["message"]["is_me"], false);
    }
}

#[tokio::test]
async fn test_close_leaves_group_once() {
    let harness = Harness::new(&["alice"]).await;
    let first = harness.connect("alice").await;
    let second = harness.connect("alice").await;

    assert_eq!(first.close().await, SessionState::Closed);
    assert_eq!(harness.registry.member_count("alice"), 1);
    assert_eq!(second.close().await, SessionState::Closed);
    assert_eq!(harness.registry.group_count(), 0);
}

#[tokio::test]
async fn test_bad_frames_keep_the_session_open() {
    let harness = Harness::new(&["alice"]).await;
    let mut alice = harness.connect("alice").await;

    alice.send_raw("{not json").await;
    alice.send_raw(r#"{"no":"source"}"#).await;
    alice.send(json!({"source": "call.start"})).await;
    alice.send(json!({"source": "message.list", "connectionId": "four"})).await;
    alice.send_frame(Message::Binary(vec![1, 2, 3].into())).await;
    alice.expect_silence().await;

    alice.send(json!({"source": "friend.list"})).await;
    let data = alice.recv_kind("friend.list").await;
    assert_eq!(data, json!([]));
}

#[tokio::test]
async fn test_ping_is_answered() {
    let harness = Harness::new(&["alice"]).await;
    let mut alice = harness.connect("alice").await;
    alice.send_frame(Message::Ping(vec![7u8].into())).await;
    match alice.recv_frame().await {
        Message::Pong(payload) => assert_eq!(payload.to_vec(), vec![7u8]),
        other => panic!("expected pong, got {:?}", other),
    }
}

#[tokio::test]
async fn test_offline_user_gets_nothing_and_sender_is_unaffected() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let mut alice = harness.connect("alice").await;

    alice.send(json!({"source": "message.type", "username": "bob"})).await;
    alice.send(json!({"source": "friend.list"})).await;
    alice.recv_kind("friend.list").await;
    assert_eq!(harness.registry.member_count("bob"), 0);
}

#[tokio::test]
async fn test_typing_reaches_only_target() {
    let harness = Harness::new(&["alice", "bob", "carol"]).await;
    let alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;
    let mut carol = harness.connect("carol").await;

    alice.send(json!({"source": "message.type", "username": "bob"})).await;
    let data = bob.recv_kind("message.type").await;
    assert_eq!(data, json!({"username": "alice"}));
    carol.expect_silence().await;
}

#[tokio::test]
async fn test_bulk_forward_beyond_queue_capacity_reaches_both_parties() {
    let harness = Harness::new(&["alice", "bob", "carol"]).await;
    let source = harness.befriend("alice", "bob").await;
    let target = harness.befriend("alice", "carol").await;
    let mut alice = harness.connect("alice").await;
    let mut carol = harness.connect("carol").await;

    let total = DEFAULT_QUEUE_CAPACITY + 16;
    let mut ids = Vec::new();
    for i in 0..total {
        let message = harness
            .store
            .create_message(NewMessage::text(source, "alice", Some(format!("m{}", i))))
            .await
            .unwrap();
        ids.push(message.id);
    }

    alice
        .send(json!({
            "source": "message.forward",
            "fromConnectionId": source,
            "toConnectionId": target,
            "messageIds": ids,
        }))
        .await;

    for client in [&mut alice, &mut carol] {
        for i in 0..total {
            let data = client.recv_kind("message.send").await;
            assert_eq!(data["message"]["text"], format!("m{}", i));
        }
        client.expect_silence().await;
    }
    assert_eq!(
        harness.store.count_messages(target).await.unwrap(),
        total as u64
    );
    assert_eq!(harness.registry.member_count("alice"), 1);
    assert_eq!(harness.registry.member_count("carol"), 1);
}
