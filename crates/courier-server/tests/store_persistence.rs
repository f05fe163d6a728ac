use axum::{body::Body, http::{Request, StatusCode}};
use courier_common::{paths, Identity};
use courier_server::config::CourierConfig;
use courier_server::store::{ConversationStore, JsonConversationStore, NewMessage};
use courier_server::{build_state, router};
use std::fs;
use tempfile::tempdir;
use tower::ServiceExt;

#[tokio::test]
async fn test_conversation_survives_restart() {
    let dir = tempdir().unwrap();
    let alice = Identity::new("u1", "Alice");

    let message_id = {
        // 1. Create a conversation and add a message in a scoped block
        let store = JsonConversationStore::new(dir.path()).await.unwrap();
        store.add_member("c1", "u1").await.unwrap();
        store.add_member("c1", "u2").await.unwrap();
        let message = store
            .append_message(
                "c1",
                &alice,
                NewMessage {
                    content: "Hello Integrity!".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.mark_read(&message.id, "u2").await.unwrap();
        message.id
        // store is dropped here
    };

    let record_path = paths::conversations_dir(dir.path()).join("c1.json");
    assert!(record_path.exists(), "Conversation JSON file should exist");

    // 2. Reload from disk through a fresh instance
    let store = JsonConversationStore::new(dir.path()).await.unwrap();
    assert_eq!(store.members("c1").await.unwrap().unwrap(), vec!["u1", "u2"]);

    let message = store.get_message(&message_id).await.unwrap().unwrap();
    assert_eq!(message.content, "Hello Integrity!");
    assert_eq!(message.sender.name, "Alice");
    assert!(message.read_by.contains("u2"));
}

#[tokio::test]
async fn test_corrupt_record_is_skipped() {
    let dir = tempdir().unwrap();

    {
        let store = JsonConversationStore::new(dir.path()).await.unwrap();
        store.add_member("good", "u1").await.unwrap();
        store.add_member("bad", "u1").await.unwrap();
    }

    let bad_path = paths::conversations_dir(dir.path()).join("bad.json");
    fs::write(&bad_path, "{ malformed json ...").unwrap();

    let store = JsonConversationStore::new(dir.path()).await.unwrap();
    assert_eq!(store.conversation_count().await, 1);
    assert!(store.members("good").await.unwrap().is_some());
    assert!(store.members("bad").await.unwrap().is_none());
}

#[tokio::test]
async fn test_no_temp_files_left_behind() {
    let dir = tempdir().unwrap();
    let store = JsonConversationStore::new(dir.path()).await.unwrap();
    store.add_member("c1", "u1").await.unwrap();

    let leftovers = fs::read_dir(paths::tmp_dir(dir.path())).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_traversal_ids_never_touch_disk() {
    let dir = tempdir().unwrap();
    let config = CourierConfig::default()
        .with_data_dir(dir.path().join("data"))
        .with_token("t1", Identity::new("u1", "Alice"));
    let state = build_state(config).await.unwrap();
    let app = router(state.clone());

    for uri in [
        "/api/conversations/..%2F..%2Fescaped/join",
        "/api/conversations/..%2F..%2Fescaped/messages",
        "/api/messages/..%2F..%2Fescaped/read",
    ] {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("cookie", "courier_session=t1")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"content":"hi"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    assert!(!dir.path().join("escaped.json").exists());
    assert_eq!(state.store.members("../../escaped").await.ok().flatten(), None);

    // The store refuses the id on its own too.
    let store = JsonConversationStore::new(dir.path().join("direct")).await.unwrap();
    assert!(store.add_member("../../escaped", "u1").await.is_err());
    assert!(!dir.path().join("escaped.json").exists());
}

#[tokio::test]
async fn test_failed_write_leaves_cache_unchanged() {
    let dir = tempdir().unwrap();
    let alice = Identity::new("u1", "Alice");
    let store = JsonConversationStore::new(dir.path()).await.unwrap();
    store.add_member("c1", "u1").await.unwrap();
    store
        .append_message(
            "c1",
            &alice,
            NewMessage {
                content: "kept".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Every persist stages through tmp/, so writes now fail.
    fs::remove_dir_all(paths::tmp_dir(dir.path())).unwrap();

    let lost = NewMessage {
        content: "lost".into(),
        ..Default::default()
    };
    assert!(store.append_message("c1", &alice, lost).await.is_err());
    let messages = store.list_messages("c1").await.unwrap().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "kept");

    assert!(store.add_member("c1", "u2").await.is_err());
    assert_eq!(store.members("c1").await.unwrap().unwrap(), vec!["u1"]);

    assert!(store.remove_member("c1", "u1").await.is_err());
    assert_eq!(store.members("c1").await.unwrap().unwrap(), vec!["u1"]);

    assert!(store.add_member("fresh", "u1").await.is_err());
    assert!(store.members("fresh").await.unwrap().is_none());
    assert_eq!(store.conversation_count().await, 1);
}
