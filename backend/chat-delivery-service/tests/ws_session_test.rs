//! Live sessions over a real socket: upgrade, inbound frames, pushes and
//! disconnect handling.

mod common;

use awc::error::WsProtocolError;
use awc::{ws, Client};
use chat_delivery_service::ephemeral::InMemoryEphemeralStore;
use chat_delivery_service::models::NewMessage;
use common::{eventually, start_server, Harness};
use event_schema::{topics, ChatEventPayload};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn connect(
    addr: SocketAddr,
    user_id: &str,
) -> impl Stream<Item = Result<ws::Frame, WsProtocolError>>
       + Sink<ws::Message, Error = WsProtocolError>
       + Unpin {
    let (_resp, connection) = Client::new()
        .ws(format!("http://{addr}/ws?device_id=web"))
        .header("x-user-id", user_id)
        .connect()
        .await
        .expect("connect websocket client");
    connection
}

/// Next text frame of type `kind`, answering pings and skipping other pushes
async fn next_of_type<C>(connection: &mut C, kind: &str) -> Value
where
    C: Stream<Item = Result<ws::Frame, WsProtocolError>>
        + Sink<ws::Message, Error = WsProtocolError>
        + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), connection.next())
            .await
            .unwrap_or_else(|_| panic!("no {kind} frame in time"))
            .expect("connection open")
            .expect("frame data");
        match frame {
            ws::Frame::Text(bytes) => {
                let value: Value = serde_json::from_slice(&bytes).expect("frame is JSON");
                if value["type"] == kind {
                    return value;
                }
            }
            ws::Frame::Ping(payload) => {
                connection.send(ws::Message::Pong(payload)).await.unwrap();
            }
            _ => {}
        }
    }
}

async fn send_json<C>(connection: &mut C, value: Value)
where
    C: Sink<ws::Message, Error = WsProtocolError> + Unpin,
{
    connection
        .send(ws::Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

#[actix_web::test]
async fn test_ack_reaches_sender_as_status_push() {
    let h = Harness::new();
    h.bus.spawn_dispatcher(h.engine.clone());
    let (addr, server) = start_server(h.state.clone()).await.unwrap();

    let mut u1 = connect(addr, "u1").await;
    let mut u2 = connect(addr, "u2").await;

    h.state
        .chat
        .send_message(NewMessage::new("u1", "u2", "hi").with_message_id("m-ws"))
        .await
        .unwrap();

    let pushed = next_of_type(&mut u2, "message.new").await;
    assert_eq!(pushed["message"]["message_id"], "m-ws");

    send_json(
        &mut u2,
        json!({ "type": "ack", "message_id": "m-ws", "peer_id": "u1", "status": "seen" }),
    )
    .await;

    let receipt = next_of_type(&mut u1, "message.status").await;
    assert_eq!(receipt["message_id"], "m-ws");
    assert_eq!(receipt["status"], "seen");

    server.stop(true).await;
}

#[actix_web::test]
async fn test_inbound_typing_reaches_target() {
    let h = Harness::new();
    h.bus.spawn_dispatcher(h.engine.clone());
    let (addr, server) = start_server(h.state.clone()).await.unwrap();

    let mut u1 = connect(addr, "u1").await;
    let mut u2 = connect(addr, "u2").await;

    send_json(&mut u1, json!({ "type": "typing", "target_user_id": "u2", "typing": true })).await;

    let typing = next_of_type(&mut u2, "typing").await;
    assert_eq!(typing["user_id"], "u1");
    assert_eq!(typing["conversation_key"], "u1_u2");
    assert_eq!(typing["typing"], true);

    server.stop(true).await;
}

#[actix_web::test]
async fn test_bad_frames_get_error_replies() {
    let h = Harness::new();
    let (addr, server) = start_server(h.state.clone()).await.unwrap();
    let mut u1 = connect(addr, "u1").await;

    u1.send(ws::Message::Text("{not json".into())).await.unwrap();
    let error = next_of_type(&mut u1, "error").await;
    assert_eq!(error["code"], "VALIDATION_ERROR");

    send_json(
        &mut u1,
        json!({ "type": "ack", "message_id": "missing", "peer_id": "u2", "status": "delivered" }),
    )
    .await;
    let error = next_of_type(&mut u1, "error").await;
    assert_eq!(error["code"], "MESSAGE_NOT_FOUND");

    send_json(&mut u1, json!({ "type": "ping" })).await;
    next_of_type(&mut u1, "pong").await;

    server.stop(true).await;
}

#[actix_web::test]
async fn test_upgrade_without_identity_is_rejected() {
    let h = Harness::new();
    let (addr, server) = start_server(h.state.clone()).await.unwrap();

    let result = Client::new()
        .ws(format!("http://{addr}/ws"))
        .connect()
        .await;
    assert!(result.is_err());
    assert_eq!(h.state.registry.session_count(), 0);
    assert!(h.bus.published().await.is_empty());

    server.stop(true).await;
}

#[actix_web::test]
async fn test_closing_one_of_two_sessions_keeps_user_online() {
    let h = Harness::new();
    let (addr, server) = start_server(h.state.clone()).await.unwrap();

    let mut phone = connect(addr, "u2").await;
    let mut laptop = connect(addr, "u2").await;
    assert_eq!(h.state.registry.session_count(), 2);
    assert!(h.state.presence.get_presence("u2").await.unwrap().online);

    phone.send(ws::Message::Close(None)).await.unwrap();
    let registry = h.state.registry.clone();
    assert!(eventually(|| { let r = registry.clone(); async move { r.session_count() == 1 } }).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.state.registry.is_online("u2").await);
    assert!(h.state.presence.get_presence("u2").await.unwrap().online);

    laptop.send(ws::Message::Close(None)).await.unwrap();
    let presence = h.state.presence.clone();
    assert!(
        eventually(|| {
            let p = presence.clone();
            async move { !p.get_presence("u2").await.unwrap().online }
        })
        .await
    );
    assert!(!h.state.registry.is_online("u2").await);

    server.stop(true).await;
}

#[actix_web::test]
async fn test_leaving_one_instance_does_not_mark_user_offline() {
    let shared = Arc::new(InMemoryEphemeralStore::new());
    let a = Harness::with_store(shared.clone());
    let b = Harness::with_store(shared);
    let (addr, server) = start_server(a.state.clone()).await.unwrap();

    // u2 stays connected to instance b throughout
    let (_held, _rx) = b.state.registry.add("u2").await;

    let mut on_a = connect(addr, "u2").await;
    on_a.send(ws::Message::Close(None)).await.unwrap();
    let registry = a.state.registry.clone();
    assert!(eventually(|| { let r = registry.clone(); async move { r.session_count() == 0 } }).await);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(a.state.registry.is_online("u2").await);
    assert!(a.state.presence.get_presence("u2").await.unwrap().online);

    let went_offline = a
        .bus
        .published_on(topics::PRESENCE_EVENTS)
        .await
        .into_iter()
        .any(|p| matches!(p.event.payload, ChatEventPayload::UserOffline(_)));
    assert!(!went_offline);

    server.stop(true).await;
}
