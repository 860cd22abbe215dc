//! Attachments and background metadata over sockets

use std::sync::Arc;

use chatline::backend::store::Store;
use serde_json::json;

use crate::common::{BrokenTranscoder, Harness, FIXED_DURATION, FIXED_WAVEFORM};

#[tokio::test]
async fn test_voice_waveform_arrives_as_update() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;

    alice
        .send(json!({
            "source": "message.send",
            "connectionId": connection,
            "voice": "aGVsbG8=",
            "voice_filename": "note.m4a",
        }))
        .await;

    let sent = alice.recv_kind("message.send").await;
    assert!(sent["message"]["voice"].as_str().unwrap().ends_with(".m4a"));
    bob.recv_kind("message.send").await;

    for client in [&mut alice, &mut bob] {
        let updated = client.recv_kind("message.updated").await;
        assert_eq!(updated["message"]["id"], sent["message"]["id"]);
        let waveform: Vec<f32> = serde_json::from_value(updated["message"]["waveform"].clone()).unwrap();
        assert_eq!(waveform, FIXED_WAVEFORM.to_vec());
    }
}

#[tokio::test]
async fn test_video_metadata_and_thumbnail() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;

    alice
        .send(json!({
            "source": "message.send",
            "connectionId": connection,
            "message": "look",
            "video": "data:video/mp4;base64,aGVsbG8=",
            "video_filename": "clip.mp4",
        }))
        .await;
    let sent = alice.recv_kind("message.send").await;
    assert!(sent["message"]["video_duration"].is_null());

    let updated = alice.recv_kind("message.updated").await;
    assert_eq!(updated["message"]["video_duration"], FIXED_DURATION);
    let thumb = harness.media_path(updated["message"]["video_thumb_url"].as_str().unwrap());
    assert!(thumb.exists());
    assert!(thumb.to_string_lossy().contains("/thumbs/"));
}

#[tokio::test]
async fn test_failed_transcoding_keeps_message() {
    let harness = Harness::with_transcoder(&["alice", "bob"], Arc::new(BrokenTranscoder)).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;

    alice
        .send(json!({
            "source": "message.send",
            "connectionId": connection,
            "video": "aGVsbG8=",
            "video_filename": "clip.mp4",
        }))
        .await;
    let sent = alice.recv_kind("message.send").await;
    harness.media.drain().await;
    alice.expect_silence().await;

    let id = sent["message"]["id"].as_i64().unwrap();
    let message = harness.store.get_message(id).await.unwrap().unwrap();
    assert!(message.media.video.is_some());
    assert!(message.media.video_duration.is_none());
    assert!(message.media.video_thumbnail.is_none());
    assert!(harness.media_path(sent["message"]["video_url"].as_str().unwrap()).exists());
}

#[tokio::test]
async fn test_undecodable_attachment_creates_nothing() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let mut alice = harness.connect("alice").await;

    alice
        .send(json!({
            "source": "message.send",
            "connectionId": connection,
            "message": "with a broken picture",
            "image": "***",
            "image_filename": "x.png",
        }))
        .await;
    alice.expect_silence().await;
    assert_eq!(harness.store.count_messages(connection).await.unwrap(), 0);
}

#[tokio::test]
async fn test_forwarded_voice_keeps_waveform_without_rerun() {
    let harness = Harness::new(&["alice", "bob", "carol"]).await;
    let source = harness.befriend("alice", "bob").await;
    let target = harness.befriend("alice", "carol").await;
    let mut alice = harness.connect("alice").await;

    alice
        .send(json!({
            "source": "message.send",
            "connectionId": source,
            "voice": "aGVsbG8=",
            "voice_filename": "note.ogg",
        }))
        .await;
    let id = alice.recv_kind("message.send").await["message"]["id"].as_i64().unwrap();
    alice.recv_kind("message.updated").await;

    alice
        .send(json!({
            "source": "message.forward",
            "fromConnectionId": source,
            "toConnectionId": target,
            "messageIds": [id],
        }))
        .await;
    let copy = alice.recv_kind("message.send").await;
    assert_eq!(copy["connection_id"], target);
    assert!(!copy["message"]["waveform"].is_null());
    harness.media.drain().await;
    alice.expect_silence().await;
}
