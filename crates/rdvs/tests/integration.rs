mod common;

use common::*;
use rdv_common::wire::{Message, MSG_REGISTRATION_REQUEST};
use rdv_common::{ClientInfo, ErrorCode};
use std::net::Ipv4Addr;
use std::time::Duration;

fn expected(name: &str, udp_port: u16) -> ClientInfo {
    ClientInfo::new(Ipv4Addr::new(127, 0, 0, 1), udp_port, name).unwrap()
}

#[tokio::test]
async fn lone_registration_sees_itself() {
    let (addr, _state) = start_server().await;

    let (_alice, roster) = TestClient::register(&addr, 7778, "alice").await;
    assert_eq!(roster, vec![expected("alice", 7778)]);
}

#[tokio::test]
async fn second_registration_fans_out() {
    let (addr, _state) = start_server().await;

    let (mut alice, _) = TestClient::register(&addr, 7778, "alice").await;
    let (_bob, mut roster) = TestClient::register(&addr, 7779, "bob").await;

    roster.sort_by(|a, b| a.name().cmp(b.name()));
    assert_eq!(roster, vec![expected("alice", 7778), expected("bob", 7779)]);

    match alice.recv().await {
        Message::NewClientConnected { client } => {
            assert_eq!(client, expected("bob", 7779));
        }
        other => panic!("expected NewClientConnected, got {other:?}"),
    }
}

#[tokio::test]
async fn broadcast_reaches_everyone_including_sender() {
    let (addr, _state) = start_server().await;

    let (mut alice, _) = TestClient::register(&addr, 7778, "alice").await;
    let (mut bob, _) = TestClient::register(&addr, 7779, "bob").await;
    // drain alice's join notification for bob
    alice.recv().await;

    alice.send(&Message::broadcast(&b"hi"[..]).unwrap()).await;

    for client in [&mut alice, &mut bob] {
        match client.recv().await {
            Message::Broadcast { body } => assert_eq!(body, b"hi"),
            other => panic!("expected Broadcast, got {other:?}"),
        }
        // exactly once
        assert!(client.recv_timeout(Duration::from_millis(200)).await.is_none());
    }
}

#[tokio::test]
async fn graceful_leave_notifies_others() {
    let (addr, state) = start_server().await;

    let (mut alice, _) = TestClient::register(&addr, 7778, "alice").await;
    let (mut bob, _) = TestClient::register(&addr, 7779, "bob").await;
    alice.recv().await;

    alice.send(&Message::DisconnectC2S).await;

    match bob.recv().await {
        Message::ClientDisconnected { name } => assert_eq!(name, "alice"),
        other => panic!("expected ClientDisconnected, got {other:?}"),
    }

    // the departed member never hears its own leave
    assert!(alice.recv_timeout(Duration::from_millis(200)).await.is_none());

    let members = state.directory.members().await;
    assert_eq!(members, vec![expected("bob", 7779)]);
}

#[tokio::test]
async fn abrupt_close_is_an_implicit_disconnect() {
    let (addr, state) = start_server().await;

    let (alice, _) = TestClient::register(&addr, 7778, "alice").await;
    let (mut bob, _) = TestClient::register(&addr, 7779, "bob").await;

    drop(alice);

    match bob.recv().await {
        Message::ClientDisconnected { name } => assert_eq!(name, "alice"),
        other => panic!("expected ClientDisconnected, got {other:?}"),
    }

    // eventual eviction from the membership map
    for _ in 0..50 {
        if state.directory.len().await == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("departed member never evicted");
}

#[tokio::test]
async fn duplicate_name_refused() {
    let (addr, _state) = start_server().await;

    let (_alice, _) = TestClient::register(&addr, 7778, "alice").await;

    let request = Message::RegistrationRequest {
        client: expected("alice", 7779),
    }
    .encode();
    let reply = TestClient::raw_handshake(&addr, &request).await;
    assert_eq!(
        reply,
        Message::Error {
            code: ErrorCode::NameNotUnique,
        }
    );
}

#[tokio::test]
async fn duplicate_endpoint_refused() {
    let (addr, _state) = start_server().await;

    let (_alice, _) = TestClient::register(&addr, 7778, "alice").await;

    // same source host, same advertised UDP port, different name
    let request = Message::RegistrationRequest {
        client: expected("bob", 7778),
    }
    .encode();
    let reply = TestClient::raw_handshake(&addr, &request).await;
    assert_eq!(
        reply,
        Message::Error {
            code: ErrorCode::IpPortNotUnique,
        }
    );
}

#[tokio::test]
async fn zero_length_name_refused() {
    let (addr, _state) = start_server().await;

    let request = [MSG_REGISTRATION_REQUEST, 127, 0, 0, 1, 0x1E, 0x62, 0];
    let reply = TestClient::raw_handshake(&addr, &request).await;
    assert_eq!(
        reply,
        Message::Error {
            code: ErrorCode::NameLengthZero,
        }
    );
}

#[tokio::test]
async fn invalid_utf8_name_refused() {
    let (addr, _state) = start_server().await;

    let request = [MSG_REGISTRATION_REQUEST, 127, 0, 0, 1, 0x1E, 0x62, 2, 0xFF, 0xFE];
    let reply = TestClient::raw_handshake(&addr, &request).await;
    assert_eq!(
        reply,
        Message::Error {
            code: ErrorCode::NameNotUtf8,
        }
    );
}

#[tokio::test]
async fn non_registration_first_frame_refused() {
    let (addr, _state) = start_server().await;

    let reply =
        TestClient::raw_handshake(&addr, &Message::broadcast(&b"hi"[..]).unwrap().encode()).await;
    assert_eq!(
        reply,
        Message::Error {
            code: ErrorCode::InvalidMessageId,
        }
    );
}

#[tokio::test]
async fn unknown_id_post_registration_is_not_fatal() {
    use tokio::io::AsyncWriteExt;

    let (addr, _state) = start_server().await;

    let (mut alice, _) = TestClient::register(&addr, 7778, "alice").await;

    alice.writer.write_all(&[0xEE]).await.unwrap();
    match alice.recv().await {
        Message::Error { code } => assert_eq!(code, ErrorCode::InvalidMessageId),
        other => panic!("expected Error, got {other:?}"),
    }

    // the connection is still registered and serviceable
    alice.send(&Message::broadcast(&b"alive"[..]).unwrap()).await;
    match alice.recv().await {
        Message::Broadcast { body } => assert_eq!(body, b"alive"),
        other => panic!("expected Broadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn error_frame_from_client_is_recorded_not_fatal() {
    let (addr, _state) = start_server().await;

    let (mut alice, _) = TestClient::register(&addr, 7778, "alice").await;

    alice
        .send(&Message::Error {
            code: ErrorCode::NoError,
        })
        .await;

    alice.send(&Message::broadcast(&b"still here"[..]).unwrap()).await;
    match alice.recv().await {
        Message::Broadcast { body } => assert_eq!(body, b"still here"),
        other => panic!("expected Broadcast, got {other:?}"),
    }
}

#[tokio::test]
async fn departed_name_is_reusable_over_the_wire() {
    let (addr, _state) = start_server().await;

    let (mut alice, _) = TestClient::register(&addr, 7778, "alice").await;
    alice.send(&Message::DisconnectC2S).await;
    // give the handler time to evict
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (_alice2, roster) = TestClient::register(&addr, 7780, "alice").await;
    assert_eq!(roster, vec![expected("alice", 7780)]);
}

#[tokio::test]
async fn max_body_broadcast_round_trips() {
    let (addr, _state) = start_server().await;

    let (mut alice, _) = TestClient::register(&addr, 7778, "alice").await;

    let body = vec![0x42u8; 65_535];
    alice.send(&Message::broadcast(body.clone()).unwrap()).await;
    match alice.recv().await {
        Message::Broadcast { body: got } => assert_eq!(got, body),
        other => panic!("expected Broadcast, got {other:?}"),
    }
}
