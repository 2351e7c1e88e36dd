//! Driver-level tests: connection accounting, handshake edge cases, and
//! session lifecycle, below the application scenarios.

mod common;

use std::time::Duration;

use common::{single_frame, Harness};
use renju_proto::{Frame, MsgType, Packet, Status, IV_LEN};
use renju_server::{DriverConfig, ServerAction, ServerEvent};

#[test]
fn connections_over_capacity_are_closed() {
    let mut harness = Harness::with_config(DriverConfig {
        max_connections: 2,
        ..DriverConfig::default()
    });

    assert!(harness.driver.process_event(ServerEvent::ConnectionAccepted { conn_id: 1 }).is_empty());
    assert!(harness.driver.process_event(ServerEvent::ConnectionAccepted { conn_id: 2 }).is_empty());

    let actions = harness.driver.process_event(ServerEvent::ConnectionAccepted { conn_id: 3 });
    assert!(matches!(
        &actions[..],
        [ServerAction::Close { conn_id: 3, .. }]
    ));
    assert_eq!(harness.driver.connection_count(), 2);
}

#[test]
fn frames_on_unknown_connections_are_ignored() {
    let mut harness = Harness::new();
    let frame = Frame::control(Status::Hello, 0, Vec::new());

    let actions =
        harness.driver.process_event(ServerEvent::FrameReceived { conn_id: 99, frame });
    assert!(actions.is_empty());
    assert_eq!(harness.driver.session_count(), 0);
}

#[test]
fn first_frame_opens_a_session_with_a_nonzero_id() {
    let mut harness = Harness::new();
    harness.driver.process_event(ServerEvent::ConnectionAccepted { conn_id: 1 });

    let hello = Frame::control(Status::Hello, 0, Vec::new());
    let actions =
        harness.driver.process_event(ServerEvent::FrameReceived { conn_id: 1, frame: hello });

    let reply = single_frame(&actions, 1);
    assert_eq!(reply.status, Status::NewSession);
    assert_ne!(reply.session_id, 0);
    assert_eq!(harness.driver.session_count(), 1);
}

#[test]
fn bad_peer_key_destroys_the_session() {
    let mut harness = Harness::new();
    harness.driver.process_event(ServerEvent::ConnectionAccepted { conn_id: 1 });

    let hello = Frame::control(Status::Hello, 0, Vec::new());
    harness.driver.process_event(ServerEvent::FrameReceived { conn_id: 1, frame: hello });

    // Wrong-length public value.
    let pending = Frame::control(Status::Pending, 0, vec![1, 2, 3]);
    let actions =
        harness.driver.process_event(ServerEvent::FrameReceived { conn_id: 1, frame: pending });

    assert!(actions.iter().any(|a| matches!(
        a,
        ServerAction::SendFrame { frame, .. } if frame.status == Status::Error
    )));
    assert!(actions.iter().any(|a| matches!(a, ServerAction::Close { conn_id: 1, .. })));
    assert_eq!(harness.driver.session_count(), 0);
}

#[test]
fn active_frame_before_handshake_gets_inactive() {
    let mut harness = Harness::new();
    harness.driver.process_event(ServerEvent::ConnectionAccepted { conn_id: 1 });

    let frame = Frame::active(0, [0u8; IV_LEN], vec![0xAA; 16]);
    let actions =
        harness.driver.process_event(ServerEvent::FrameReceived { conn_id: 1, frame });

    let reply = single_frame(&actions, 1);
    assert_eq!(reply.status, Status::Inactive);
}

#[test]
fn garbage_ciphertext_gets_error_frame_but_keeps_session() {
    let mut harness = Harness::new();
    let client = harness.connect();

    let frame = Frame::active(client.session_id, [0u8; IV_LEN], vec![0xAA; 32]);
    let actions = harness
        .driver
        .process_event(ServerEvent::FrameReceived { conn_id: client.conn_id, frame });

    let reply = single_frame(&actions, client.conn_id);
    assert_eq!(reply.status, Status::Error);
    assert_eq!(harness.driver.session_count(), 1);
}

#[test]
fn connection_close_destroys_session_and_bindings() {
    let mut harness = Harness::new();
    let client = harness.connect();

    harness.request(
        &client,
        &Packet::new(0, MsgType::SignIn).with("username", "a").with("password", "p"),
    );
    let user_id = harness.store.user_by_username("a").unwrap().id;
    assert_eq!(harness.store.session_for_user(user_id), Some(client.session_id));

    harness.close(&client);

    assert_eq!(harness.driver.session_count(), 0);
    assert_eq!(harness.driver.connection_count(), 0);
    assert_eq!(harness.store.session_for_user(user_id), None);
    assert_eq!(harness.store.user_for_session(client.session_id), None);
}

#[test]
fn session_ids_are_unique_across_connections() {
    let mut harness = Harness::new();
    let mut seen = std::collections::HashSet::new();

    for _ in 0..32 {
        let client = harness.connect();
        assert!(seen.insert(client.session_id), "session id reused");
        harness.close(&client);
    }
}

#[test]
fn pushes_to_closed_sessions_are_dropped() {
    let mut harness = Harness::new();
    let a = harness.connect();
    let b = harness.connect();

    harness.request(
        &a,
        &Packet::new(0, MsgType::SignIn).with("username", "a").with("password", "p"),
    );
    harness.request(
        &b,
        &Packet::new(0, MsgType::SignIn).with("username", "b").with("password", "p"),
    );
    harness.request(&a, &Packet::new(0, MsgType::CreateRoom));
    harness.request(&b, &Packet::new(0, MsgType::JoinRoom).with("roomId", 1u64));

    // B's socket dies; A's next room event must not try to reach B.
    harness.close(&b);

    let actions = harness
        .send(&a, &Packet::new(0, MsgType::ChatMessage).with("message", "anyone there?"));
    assert!(
        actions.iter().all(|action| !matches!(
            action,
            ServerAction::SendFrame { conn_id, .. } if *conn_id == b.conn_id
        )),
        "no frame may target the closed connection: {actions:?}"
    );
}

#[test]
fn expiry_rearms_while_the_session_is_active() {
    let mut harness = Harness::with_config(DriverConfig {
        session_timeout: Duration::from_secs(3),
        ..DriverConfig::default()
    });
    let client = harness.connect();

    // Two quiet seconds: the first check fires at slot 3 with 2s elapsed,
    // finds the session alive, and re-arms.
    harness.env.advance(Duration::from_secs(2));
    for _ in 0..3 {
        assert!(harness.tick().is_empty());
    }
    assert_eq!(harness.driver.session_count(), 1);

    // Another two seconds with no traffic crosses the timeout.
    harness.env.advance(Duration::from_secs(2));
    let mut actions = Vec::new();
    for _ in 0..3 {
        actions.extend(harness.tick());
    }
    assert!(actions
        .iter()
        .any(|a| matches!(a, ServerAction::Close { conn_id, .. } if *conn_id == client.conn_id)));
    assert_eq!(harness.driver.session_count(), 0);
}

#[test]
fn unknown_message_types_get_an_error_packet() {
    let mut harness = Harness::new();
    let client = harness.connect();

    let mut packet = Packet::new(0, MsgType::Heartbeat);
    packet.msg_type = 777;
    let replies = harness.request(&client, &packet);

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].msg_type, MsgType::Error.to_u16());
    assert_eq!(replies[0].get_str("error"), Some("Unknown message type"));
}

#[test]
fn malformed_packet_inside_valid_frame_gets_error_packet() {
    let mut harness = Harness::new();
    let client = harness.connect();

    // Well-encrypted plaintext that is not a valid packet body.
    let iv = [9u8; IV_LEN];
    let frame = client.seal_raw(&[0xFF, 0xFF, 0xFF], iv);

    let actions = harness
        .driver
        .process_event(ServerEvent::FrameReceived { conn_id: client.conn_id, frame });
    let replies = client.unseal_all(&actions);

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].msg_type, MsgType::Error.to_u16());
    assert!(replies[0].get_str("error").unwrap().starts_with("Malformed packet"));
}
