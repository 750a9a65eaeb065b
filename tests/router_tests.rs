use direct_chat_service::websocket::message_types::{ChatMessage, Envelope};
use direct_chat_service::websocket::{
    ConnectionHandle, ConnectionRegistry, DeliveryOutcome, MessageRouter,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

fn conn() -> (ConnectionHandle, UnboundedReceiver<String>) {
    let (tx, rx) = unbounded_channel();
    (ConnectionHandle::new(tx), rx)
}

fn chat(sender: &str, receiver: &str, text: &str) -> ChatMessage {
    ChatMessage {
        sender: sender.into(),
        receiver: receiver.into(),
        message: text.into(),
        content_type: "text".into(),
        timestamp: "2026-01-01T00:00:00Z".into(),
    }
}

fn recv_envelope(rx: &mut UnboundedReceiver<String>) -> Envelope {
    let frame = rx.try_recv().expect("expected a frame on this connection");
    serde_json::from_str(&frame).expect("frame parses as an envelope")
}

fn assert_no_frame(rx: &mut UnboundedReceiver<String>) {
    assert!(rx.try_recv().is_err(), "expected no frame on this connection");
}

#[tokio::test]
async fn full_delivery_when_receiver_views_sender() {
    let registry = ConnectionRegistry::new();
    let presence = registry.presence();
    let router = MessageRouter::new(registry.clone());

    let (a1, mut a1_rx) = conn();
    let (a2, mut a2_rx) = conn();
    let (b1, mut b1_rx) = conn();
    registry.register("alice", a1).await;
    registry.register("alice", a2).await;
    registry.register("bob", b1).await;
    presence.set_active_chat("bob", Some("alice")).await;

    let msg = chat("alice", "bob", "hi");
    let outcome = router.deliver(&msg).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    // Both of alice's tabs and bob's connection get the unmodified message.
    for rx in [&mut a1_rx, &mut a2_rx, &mut b1_rx] {
        assert_eq!(recv_envelope(rx), Envelope::Chat(msg.clone()));
        assert_no_frame(rx);
    }
}

#[tokio::test]
async fn notification_when_receiver_views_someone_else() {
    let registry = ConnectionRegistry::new();
    let presence = registry.presence();
    let router = MessageRouter::new(registry.clone());

    let (a1, mut a1_rx) = conn();
    let (b1, mut b1_rx) = conn();
    registry.register("alice", a1).await;
    registry.register("bob", b1).await;
    presence.set_active_chat("bob", Some("carol")).await;

    let msg = chat("alice", "bob", "the secret plan");
    let outcome = router.deliver(&msg).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Notified);

    assert_eq!(recv_envelope(&mut a1_rx), Envelope::Chat(msg.clone()));

    // Bob gets a notification naming alice but never the message content.
    let frame = b1_rx.try_recv().unwrap();
    assert!(!frame.contains("the secret plan"));
    match serde_json::from_str::<Envelope>(&frame).unwrap() {
        Envelope::Notification { from, message } => {
            assert_eq!(from, "alice");
            assert!(message.contains("alice"));
        }
        other => panic!("expected notification, got {other:?}"),
    }
}

#[tokio::test]
async fn notification_when_receiver_views_no_conversation() {
    let registry = ConnectionRegistry::new();
    let router = MessageRouter::new(registry.clone());

    let (a1, mut a1_rx) = conn();
    let (b1, mut b1_rx) = conn();
    registry.register("alice", a1).await;
    registry.register("bob", b1).await;
    // bob never opened a conversation; his active chat is none.

    let outcome = router.deliver(&chat("alice", "bob", "hi")).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Notified);

    assert!(matches!(
        recv_envelope(&mut a1_rx),
        Envelope::Chat(_)
    ));
    assert!(matches!(
        recv_envelope(&mut b1_rx),
        Envelope::Notification { .. }
    ));
}

#[tokio::test]
async fn offline_receiver_still_gets_sender_echo() {
    let registry = ConnectionRegistry::new();
    let router = MessageRouter::new(registry.clone());

    let (a1, mut a1_rx) = conn();
    registry.register("alice", a1).await;
    // dave has zero connections.

    let msg = chat("alice", "dave", "anyone there?");
    let outcome = router.deliver(&msg).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::ReceiverOffline);

    assert_eq!(recv_envelope(&mut a1_rx), Envelope::Chat(msg));
    assert_no_frame(&mut a1_rx);
}

#[tokio::test]
async fn fan_out_reaches_every_connection_of_a_user() {
    let registry = ConnectionRegistry::new();
    let presence = registry.presence();
    let router = MessageRouter::new(registry.clone());

    let (a1, _a1_rx) = conn();
    registry.register("alice", a1).await;

    let mut bob_rxs = Vec::new();
    for _ in 0..3 {
        let (b, rx) = conn();
        registry.register("bob", b).await;
        bob_rxs.push(rx);
    }
    presence.set_active_chat("bob", Some("alice")).await;

    let msg = chat("alice", "bob", "to all tabs");
    router.deliver(&msg).await.unwrap();

    for rx in &mut bob_rxs {
        assert_eq!(recv_envelope(rx), Envelope::Chat(msg.clone()));
    }
}

#[tokio::test]
async fn send_failure_is_isolated_and_evicts_the_dead_connection() {
    let registry = ConnectionRegistry::new();
    let presence = registry.presence();
    let router = MessageRouter::new(registry.clone());

    let (a1, mut a1_rx) = conn();
    registry.register("alice", a1).await;

    let (b1, b1_rx) = conn();
    let (b2, mut b2_rx) = conn();
    registry.register("bob", b1).await;
    registry.register("bob", b2).await;
    presence.set_active_chat("bob", Some("alice")).await;

    // Simulate a dead transport: bob's first connection can no longer
    // receive.
    drop(b1_rx);

    let msg = chat("alice", "bob", "still getting through");
    let outcome = router.deliver(&msg).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    // The healthy connections were unaffected.
    assert_eq!(recv_envelope(&mut a1_rx), Envelope::Chat(msg.clone()));
    assert_eq!(recv_envelope(&mut b2_rx), Envelope::Chat(msg));

    // The dead connection was evicted, and bob is still online via b2.
    assert_eq!(registry.connection_count("bob").await, 1);
    assert_eq!(registry.online_users().await, vec!["alice", "bob"]);
}

#[tokio::test]
async fn send_failure_on_a_sender_connection_does_not_break_the_echo() {
    let registry = ConnectionRegistry::new();
    let presence = registry.presence();
    let router = MessageRouter::new(registry.clone());

    // One of alice's two tabs has a dead transport.
    let (a1, a1_rx) = conn();
    let (a2, mut a2_rx) = conn();
    registry.register("alice", a1).await;
    registry.register("alice", a2).await;
    drop(a1_rx);

    let (b1, mut b1_rx) = conn();
    registry.register("bob", b1).await;
    presence.set_active_chat("bob", Some("alice")).await;

    let msg = chat("alice", "bob", "echo survives");
    let outcome = router.deliver(&msg).await.unwrap();
    assert_eq!(outcome, DeliveryOutcome::Delivered);

    // The echo reaches alice's healthy tab and bob still gets the message.
    assert_eq!(recv_envelope(&mut a2_rx), Envelope::Chat(msg.clone()));
    assert_eq!(recv_envelope(&mut b1_rx), Envelope::Chat(msg));

    // The dead sender connection was evicted; alice stays online via a2.
    assert_eq!(registry.connection_count("alice").await, 1);
    assert_eq!(registry.online_users().await, vec!["alice", "bob"]);
}

#[tokio::test]
async fn evicting_the_last_connection_takes_the_user_offline() {
    let registry = ConnectionRegistry::new();
    let presence = registry.presence();
    let router = MessageRouter::new(registry.clone());

    let (a1, _a1_rx) = conn();
    registry.register("alice", a1).await;

    let (b1, b1_rx) = conn();
    registry.register("bob", b1).await;
    presence.set_active_chat("bob", Some("alice")).await;
    drop(b1_rx);

    router.deliver(&chat("alice", "bob", "hello?")).await.unwrap();

    assert_eq!(registry.online_users().await, vec!["alice"]);
    assert_eq!(presence.active_chat_of("bob").await, None);
}

#[tokio::test]
async fn user_list_broadcast_reaches_every_connection_of_every_user() {
    let registry = ConnectionRegistry::new();
    let router = MessageRouter::new(registry.clone());

    let (a1, mut a1_rx) = conn();
    let (a2, mut a2_rx) = conn();
    let (b1, mut b1_rx) = conn();
    registry.register("alice", a1).await;
    registry.register("alice", a2).await;
    registry.register("bob", b1).await;

    router.broadcast_user_list().await.unwrap();

    for rx in [&mut a1_rx, &mut a2_rx, &mut b1_rx] {
        match recv_envelope(rx) {
            Envelope::UserList { users } => assert_eq!(users, vec!["alice", "bob"]),
            other => panic!("expected user_list, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn messages_for_one_pair_arrive_in_call_order() {
    let registry = ConnectionRegistry::new();
    let presence = registry.presence();
    let router = MessageRouter::new(registry.clone());

    let (a1, _a1_rx) = conn();
    let (b1, mut b1_rx) = conn();
    registry.register("alice", a1).await;
    registry.register("bob", b1).await;
    presence.set_active_chat("bob", Some("alice")).await;

    for i in 0..5 {
        router
            .deliver(&chat("alice", "bob", &format!("msg-{i}")))
            .await
            .unwrap();
    }

    for i in 0..5 {
        match recv_envelope(&mut b1_rx) {
            Envelope::Chat(m) => assert_eq!(m.message, format!("msg-{i}")),
            other => panic!("expected chat, got {other:?}"),
        }
    }
}
