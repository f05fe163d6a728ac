use courier_client::{
    ChannelHandler, ClientError, HttpApi, RealtimeApi, StaticIdentity, Transport,
    TransportConfig, TransportEvent,
};
use courier_common::Identity;
use courier_server::{build_state, config::CourierConfig, router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

async fn spawn_server() -> String {
    let config = CourierConfig::default()
        .in_memory()
        .with_token("t1", Identity::new("u1", "Alice"))
        .with_token("t2", Identity::new("u2", "Bob"));
    let app = router(build_state(config).await.unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config(base_url: &str, token: &str) -> TransportConfig {
    TransportConfig::new(base_url)
        .with_poll_interval(Duration::from_millis(50))
        .with_wait_budget(Duration::from_millis(200))
        .with_session_token(token)
}

fn client(
    base_url: &str,
    token: &str,
    user_id: &str,
    name: &str,
) -> (Transport, UnboundedReceiver<TransportEvent>) {
    let (handler, rx) = ChannelHandler::new();
    let transport = Transport::http(
        config(base_url, token),
        Arc::new(StaticIdentity::signed_in(user_id, name)),
        Arc::new(handler),
    )
    .unwrap();
    (transport, rx)
}

async fn next_matching(
    rx: &mut UnboundedReceiver<TransportEvent>,
    pred: impl Fn(&TransportEvent) -> bool,
) -> TransportEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("handler channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_send_reaches_other_member_once() {
    let base = spawn_server().await;
    let (alice, mut alice_rx) = client(&base, "t1", "u1", "Alice");
    let (bob, mut bob_rx) = client(&base, "t2", "u2", "Bob");

    assert!(bob.join_conversation("c1").await);
    assert!(alice.join_conversation("c1").await);
    bob.connect();
    alice.connect();

    let joined = next_matching(&mut bob_rx, |e| {
        matches!(e, TransportEvent::Joined(c) if c.user_id == "u1")
    })
    .await;
    assert!(matches!(joined, TransportEvent::Joined(c) if c.conversation_id == "c1"));

    assert!(alice.send_message("c1", "hello", None).await);

    // Optimistic copy first, then its authoritative replacement.
    let optimistic = next_matching(&mut alice_rx, |e| matches!(e, TransportEvent::Message(_))).await;
    let TransportEvent::Message(optimistic) = optimistic else {
        unreachable!()
    };
    assert!(optimistic.is_optimistic());
    let reconciled =
        next_matching(&mut alice_rx, |e| matches!(e, TransportEvent::Reconciled { .. })).await;
    let TransportEvent::Reconciled { temp_id, message } = reconciled else {
        unreachable!()
    };
    assert_eq!(temp_id, optimistic.id);
    assert!(!message.is_optimistic());

    let delivered = next_matching(&mut bob_rx, |e| matches!(e, TransportEvent::Message(_))).await;
    let TransportEvent::Message(delivered) = delivered else {
        unreachable!()
    };
    assert_eq!(delivered.id, message.id);
    assert_eq!(delivered.sender_id, "u1");
    assert_eq!(delivered.content, "hello");

    assert!(bob.mark_message_as_read(&delivered.id).await);
    let read = next_matching(&mut alice_rx, |e| matches!(e, TransportEvent::Read(_))).await;
    assert!(matches!(read, TransportEvent::Read(r) if r.reader_id == "u2"));

    // Several more poll cycles: the sender never sees a second copy.
    tokio::time::sleep(Duration::from_millis(300)).await;
    while let Ok(event) = alice_rx.try_recv() {
        assert!(
            !matches!(event, TransportEvent::Message(_)),
            "unexpected message: {:?}",
            event
        );
    }

    alice.disconnect();
    bob.disconnect();
}

#[tokio::test]
async fn test_empty_poll_returns_within_budget() {
    let base = spawn_server().await;
    let api = HttpApi::new(&config(&base, "t1")).unwrap();

    let started = std::time::Instant::now();
    let events = api.poll("u1", Duration::from_millis(150), None).await.unwrap();

    assert!(events.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_poll_as_someone_else_is_unauthorized() {
    let base = spawn_server().await;

    let bob = HttpApi::new(&config(&base, "t2")).unwrap();
    let err = bob.poll("u1", Duration::from_millis(10), None).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(403)));
    assert!(err.is_terminal());

    let stranger = HttpApi::new(&config(&base, "bogus")).unwrap();
    let err = stranger.join("c1").await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized(401)));
}

#[tokio::test]
async fn test_send_to_unknown_conversation_fails_cleanly() {
    let base = spawn_server().await;
    let (alice, mut rx) = client(&base, "t1", "u1", "Alice");

    assert!(!alice.send_message("nowhere", "hello", None).await);

    let failed = next_matching(&mut rx, |e| matches!(e, TransportEvent::SendFailed { .. })).await;
    assert!(matches!(failed, TransportEvent::SendFailed { .. }));
    assert!(alice.last_error().unwrap().contains("404"));
}
