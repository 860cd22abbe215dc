//! Message lifecycle over sockets

use chatline::backend::store::Store;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::Harness;

#[tokio::test]
async fn test_text_message_is_delivered_to_both_views() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;

    alice
        .send(json!({"source": "message.send", "connectionId": connection, "message": "hi"}))
        .await;

    let mine = alice.recv_kind("message.send").await;
    let theirs = bob.recv_kind("message.send").await;
    assert_eq!(mine["message"]["is_me"], true);
    assert_eq!(theirs["message"]["is_me"], false);
    assert_eq!(mine["friend"]["username"], "bob");
    assert_eq!(theirs["friend"]["username"], "alice");
    assert_eq!(mine["message"]["id"], theirs["message"]["id"]);

    for view in [&mine["message"], &theirs["message"]] {
        assert_eq!(view["delivered"], true);
        assert_eq!(view["seen"], false);
        for field in ["image", "voice", "waveform", "video_url", "video_thumb_url", "video_duration"] {
            assert!(view[field].is_null(), "{} should be empty", field);
        }
    }
}

#[tokio::test]
async fn test_first_page_is_newest_fifteen() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;

    for i in 0..15 {
        alice
            .send(json!({"source": "message.send", "connectionId": connection, "message": format!("m{}", i)}))
            .await;
        alice.recv_kind("message.send").await;
    }
    alice.send(json!({"source": "message.list", "connectionId": connection})).await;
    let page = alice.recv_kind("message.list").await;
    assert_eq!(page["messages"].as_array().unwrap().len(), 15);
    assert!(page["next"].is_null());

    alice
        .send(json!({"source": "message.send", "connectionId": connection, "message": "m15"}))
        .await;
    alice.recv_kind("message.send").await;
    alice
        .send(json!({"source": "message.list", "connectionId": connection, "page": 0}))
        .await;
    let page = alice.recv_kind("message.list").await;
    let messages = page["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 15);
    assert_eq!(page["next"], 1);
    assert_eq!(messages[0]["text"], "m15");
    assert_eq!(messages[14]["text"], "m1");
    let ids: Vec<i64> = messages.iter().map(|m| m["id"].as_i64().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn test_list_of_foreign_connection_is_silent() {
    let harness = Harness::new(&["alice", "bob", "mallory"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut mallory = harness.connect("mallory").await;

    mallory.send(json!({"source": "message.list", "connectionId": connection})).await;
    mallory.send(json!({"source": "message.list", "connectionId": 999})).await;
    mallory.expect_silence().await;
}

#[tokio::test]
async fn test_seen_by_author_is_noop() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;

    alice
        .send(json!({"source": "message.send", "connectionId": connection, "message": "hi"}))
        .await;
    let id = alice.recv_kind("message.send").await["message"]["id"].as_i64().unwrap();
    bob.recv_kind("message.send").await;

    alice.send(json!({"source": "message.seen", "messageId": id})).await;
    alice.expect_silence().await;
    assert!(!harness.store.get_message(id).await.unwrap().unwrap().seen);

    bob.send(json!({"source": "message.seen", "messageId": id})).await;
    let alice_view = alice.recv_kind("message.seen").await;
    let bob_view = bob.recv_kind("message.seen").await;
    assert_eq!(alice_view["seen"], true);
    assert_eq!(alice_view["is_me"], true);
    assert_eq!(bob_view["is_me"], false);
    assert!(harness.store.get_message(id).await.unwrap().unwrap().seen);
}

#[tokio::test]
async fn test_delete_by_author_removes_message_and_files() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;

    alice
        .send(json!({
            "source": "message.send",
            "connectionId": connection,
            "image": "data:image/png;base64,aGVsbG8=",
            "image_filename": "photo.PNG",
        }))
        .await;
    let sent = alice.recv_kind("message.send").await;
    bob.recv_kind("message.send").await;
    let id = sent["message"]["id"].as_i64().unwrap();
    let image = harness.media_path(sent["message"]["image"].as_str().unwrap());
    assert!(image.exists());
    assert_eq!(image.extension().unwrap(), "png");

    let delete = json!({"source": "message.delete", "connectionId": connection, "messageId": id});
    bob.send(delete.clone()).await;
    bob.expect_silence().await;
    assert!(harness.store.get_message(id).await.unwrap().is_some());

    alice.send(delete).await;
    assert_eq!(alice.recv_kind("message.deleted").await, json!({"messageId": id}));
    assert_eq!(bob.recv_kind("message.deleted").await, json!({"messageId": id}));
    assert!(harness.store.get_message(id).await.unwrap().is_none());
    assert!(!image.exists());
}

#[tokio::test]
async fn test_forward_skips_missing_ids() {
    let harness = Harness::new(&["alice", "bob", "carol"]).await;
    let source = harness.befriend("alice", "bob").await;
    let target = harness.befriend("carol", "alice").await;
    let mut alice = harness.connect("alice").await;
    let mut carol = harness.connect("carol").await;

    let mut ids = Vec::new();
    for text in ["one", "two"] {
        alice
            .send(json!({"source": "message.send", "connectionId": source, "message": text}))
            .await;
        ids.push(alice.recv_kind("message.send").await["message"]["id"].as_i64().unwrap());
    }
    ids.push(424242);

    alice
        .send(json!({
            "source": "message.forward",
            "fromConnectionId": source,
            "toConnectionId": target,
            "messageIds": ids,
        }))
        .await;

    for expected in ["one", "two"] {
        let mine = alice.recv_kind("message.send").await;
        let theirs = carol.recv_kind("message.send").await;
        assert_eq!(mine["message"]["text"], expected);
        assert_eq!(mine["connection_id"], target);
        assert_eq!(mine["message"]["is_me"], true);
        assert_eq!(theirs["message"]["is_me"], false);
    }
    assert_eq!(harness.store.count_messages(target).await.unwrap(), 2);
    let copies = harness.store.list_messages(target, 0, 15).await.unwrap();
    assert!(copies.iter().all(|m| m.user == "alice"));
}

#[tokio::test]
async fn test_forward_into_foreign_connection_is_rejected() {
    let harness = Harness::new(&["alice", "bob", "carol", "dave"]).await;
    let source = harness.befriend("alice", "bob").await;
    let foreign = harness.befriend("carol", "dave").await;
    let mut alice = harness.connect("alice").await;

    alice
        .send(json!({"source": "message.send", "connectionId": source, "message": "secret"}))
        .await;
    let id = alice.recv_kind("message.send").await["message"]["id"].as_i64().unwrap();

    alice
        .send(json!({
            "source": "message.forward",
            "fromConnectionId": source,
            "toConnectionId": foreign,
            "messageIds": [id],
        }))
        .await;
    alice.expect_silence().await;
    assert_eq!(harness.store.count_messages(foreign).await.unwrap(), 0);
}

#[tokio::test]
async fn test_thumbnail_updates_profile() {
    let harness = Harness::new(&["alice"]).await;
    let mut alice = harness.connect("alice").await;

    alice
        .send(json!({"source": "thumbnail", "base64": "aGVsbG8=", "filename": "me.jpeg"}))
        .await;
    let data = alice.recv_kind("thumbnail").await;
    assert_eq!(data["username"], "alice");
    assert_eq!(data["name"], "Alice Tester");
    assert_eq!(data["thumbnail"], "http://chat.test/media/thumbnails/alice.jpeg");
    assert!(harness.dir.path().join("thumbnails/alice.jpeg").exists());
}
