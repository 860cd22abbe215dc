//! Connection requests, friend list and search over sockets

use chatline::backend::store::Store;
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::Harness;

#[tokio::test]
async fn test_connect_twice_then_accept_once() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;

    let connect = json!({"source": "request.connect", "username": "bob"});
    alice.send(connect.clone()).await;
    alice.send(connect).await;
    let first = alice.recv_kind("request.connect").await;
    let second = alice.recv_kind("request.connect").await;
    assert_eq!(first["id"], second["id"]);
    bob.recv_kind("request.connect").await;
    bob.recv_kind("request.connect").await;
    assert_eq!(harness.store.list_connections("alice").await.unwrap().len(), 1);

    bob.send(json!({"source": "request.list"})).await;
    let pending = bob.recv_kind("request.list").await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["sender"]["username"], "alice");

    bob.send(json!({"source": "request.accept", "username": "alice"})).await;
    for (client, friend) in [(&mut alice, "bob"), (&mut bob, "alice")] {
        let accepted = client.recv_kind("request.accept").await;
        assert_eq!(accepted["id"], first["id"]);
        let new_friend = client.recv_kind("friend.new").await;
        assert_eq!(new_friend["friend"]["username"], friend);
        assert_eq!(new_friend["preview"], "New connection!");
    }

    let edge = harness.store.find_connection("alice", "bob").await.unwrap().unwrap();
    assert!(edge.accepted);

    bob.send(json!({"source": "request.list"})).await;
    assert_eq!(bob.recv_kind("request.list").await, json!([]));
}

#[tokio::test]
async fn test_connect_to_unknown_user_is_silent() {
    let harness = Harness::new(&["alice"]).await;
    let mut alice = harness.connect("alice").await;
    alice.send(json!({"source": "request.connect", "username": "ghost"})).await;
    alice.expect_silence().await;
    assert!(harness.store.list_connections("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_friend_list_each_connection_once_by_activity() {
    let harness = Harness::new(&["alice", "bob", "carol", "dave"]).await;
    let with_bob = harness.befriend("alice", "bob").await;
    let with_carol = harness.befriend("carol", "alice").await;
    harness.store.get_or_create_connection("alice", "dave").await.unwrap();
    let mut alice = harness.connect("alice").await;

    alice
        .send(json!({"source": "message.send", "connectionId": with_bob, "message": "latest"}))
        .await;
    alice.recv_kind("message.send").await;

    alice.send(json!({"source": "friend.list"})).await;
    let friends = alice.recv_kind("friend.list").await;
    let friends = friends.as_array().unwrap();
    let ids: Vec<i64> = friends.iter().map(|f| f["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![with_bob, with_carol]);
    assert_eq!(friends[0]["preview"], "latest");
    assert_eq!(friends[1]["preview"], "New connection!");
    assert_eq!(friends[1]["friend"]["username"], "carol");
}

#[tokio::test]
async fn test_search_classifies_relationships() {
    let harness = Harness::new(&["alice", "john", "joan", "jo", "jolene", "bob"]).await;
    harness.store.get_or_create_connection("alice", "john").await.unwrap();
    harness.store.get_or_create_connection("joan", "alice").await.unwrap();
    harness.befriend("jolene", "alice").await;
    let mut alice = harness.connect("alice").await;

    alice.send(json!({"source": "search", "query": "JO"})).await;
    let results = alice.recv_kind("search").await;
    let statuses: Vec<(String, String)> = results
        .as_array()
        .unwrap()
        .iter()
        .map(|r| {
            (
                r["username"].as_str().unwrap().to_string(),
                r["status"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    let status_of = |name: &str| {
        statuses
            .iter()
            .find(|(u, _)| u == name)
            .map(|(_, s)| s.as_str())
    };

    assert_eq!(status_of("john"), Some("pending-them"));
    assert_eq!(status_of("joan"), Some("pending-me"));
    assert_eq!(status_of("jolene"), Some("connected"));
    assert_eq!(status_of("jo"), Some("no-connection"));
    assert_eq!(status_of("alice"), None);
    assert_eq!(status_of("bob"), None);
}

#[tokio::test]
async fn test_accepting_an_accepted_edge_notifies_again() {
    let harness = Harness::new(&["alice", "bob"]).await;
    let connection = harness.befriend("alice", "bob").await;
    let before = harness.store.get_connection(connection).await.unwrap().unwrap();
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    bob.send(json!({"source": "request.accept", "username": "alice"})).await;
    for (client, friend) in [(&mut alice, "bob"), (&mut bob, "alice")] {
        let accepted = client.recv_kind("request.accept").await;
        assert_eq!(accepted["id"], connection);
        let new_friend = client.recv_kind("friend.new").await;
        assert_eq!(new_friend["friend"]["username"], friend);
    }

    let after = harness.store.get_connection(connection).await.unwrap().unwrap();
    assert!(after.accepted);
    assert!(after.updated > before.updated);
    assert_eq!(harness.store.list_connections("alice").await.unwrap().len(), 1);
}
