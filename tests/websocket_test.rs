//! WebSocket channel tests
//!
//! Runs the service on an ephemeral port and drives it with real WebSocket clients:
//! handshake authentication, fan-out to every handle of both participants, rejection of
//! outsiders, heartbeat expiry, and a full round trip through the client session library.
//!
//! Run: cargo test --test websocket_test

use chat_client::{ClientSession, ConnectionState, SessionConfig, SessionEvent, WsConnector};
use event_schema::{ClientFrame, ServerFrame};
use futures_util::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use taskboard_chat::config::{Config, WebSocketConfig};
use taskboard_chat::services::ConversationStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

mod test_harness;
use test_harness::{eventually, next_frame, next_text, TestEnvironment, WsClient};

async fn send_frame(ws: &mut WsClient, frame: &ClientFrame) {
    ws.send(WsMessage::Text(frame.encode().unwrap().into()))
        .await
        .unwrap();
}

#[actix_rt::test]
async fn test_valid_token_registers_one_handle() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();

    let mut ws = server.connect(&env.token(&env.user)).await;
    assert_eq!(env.state.registry.connection_count(env.user.id).await, 1);
    assert_eq!(env.state.registry.total_connections().await, 1);

    ws.close(None).await.unwrap();
    let registry = env.state.registry.clone();
    let user_id = env.user.id;
    assert!(eventually(|| {
        let registry = registry.clone();
        async move { registry.connection_count(user_id).await == 0 }
    })
    .await);

    server.stop().await;
}

#[actix_rt::test]
async fn test_bad_credentials_close_with_policy_violation() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();

    let urls = [
        server.ws_url(),
        format!("{}?token=garbage", server.ws_url()),
        format!("{}?token=", server.ws_url()),
    ];
    for url in urls {
        let (mut ws, _) = connect_async(url).await.unwrap();
        match next_frame(&mut ws, Duration::from_secs(5)).await {
            Some(WsMessage::Close(Some(frame))) => assert_eq!(u16::from(frame.code), 1008),
            other => panic!("expected policy close, got {other:?}"),
        }
    }

    assert_eq!(env.state.registry.total_connections().await, 0);
    server.stop().await;
}

#[actix_rt::test]
async fn test_message_fans_out_to_every_handle_of_both_participants() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();
    let (conversation, _) = env
        .state
        .conversations
        .with_admin(&env.user)
        .await
        .unwrap();

    let admin_token = env.token(&env.admin);
    let mut admin_tab_a = server.connect(&admin_token).await;
    let mut admin_tab_b = server.connect(&admin_token).await;
    let mut user_tab = server.connect(&env.token(&env.user)).await;
    let mut outsider = server.connect(&env.token(&env.other)).await;
    assert_eq!(env.state.registry.connection_count(env.admin.id).await, 2);

    send_frame(&mut user_tab, &ClientFrame::new(conversation.id, "status update")).await;

    let echo = next_text(&mut user_tab).await;
    let tab_a = next_text(&mut admin_tab_a).await;
    let tab_b = next_text(&mut admin_tab_b).await;
    assert_eq!(echo, tab_a);
    assert_eq!(tab_a, tab_b);

    let ServerFrame::Message(envelope) = ServerFrame::decode(&tab_a).unwrap() else {
        panic!("expected message frame");
    };
    assert_eq!(envelope.sender, env.user.id);
    assert_eq!(envelope.conversation_id, conversation.id);
    assert_ne!(envelope.content, "status update");
    assert_eq!(
        env.cipher().decrypt(&envelope.content).unwrap(),
        "status update"
    );

    assert!(next_frame(&mut outsider, Duration::from_millis(300))
        .await
        .is_none());

    let stored = env.conversations.list_messages(conversation.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, envelope.id);

    server.stop().await;
}

#[actix_rt::test]
async fn test_outsider_send_is_rejected_without_side_effects() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();
    let (conversation, _) = env
        .state
        .conversations
        .with_admin(&env.user)
        .await
        .unwrap();

    let mut admin = server.connect(&env.token(&env.admin)).await;
    let mut outsider = server.connect(&env.token(&env.other)).await;

    // Claiming to be the user does not help
    let frame = ClientFrame::new(conversation.id, "let me in").with_sender(env.user.id);
    send_frame(&mut outsider, &frame).await;

    let reply = ServerFrame::decode(&next_text(&mut outsider).await).unwrap();
    assert_eq!(
        reply,
        ServerFrame::error("not a participant of this conversation")
    );
    assert!(next_frame(&mut admin, Duration::from_millis(300))
        .await
        .is_none());
    assert!(env
        .conversations
        .list_messages(conversation.id)
        .await
        .unwrap()
        .is_empty());

    // The connection stays usable after an error frame
    assert_eq!(env.state.registry.connection_count(env.other.id).await, 1);
    server.stop().await;
}

#[actix_rt::test]
async fn test_malformed_frame_keeps_connection_open() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();
    let (conversation, _) = env
        .state
        .conversations
        .with_admin(&env.user)
        .await
        .unwrap();
    let mut ws = server.connect(&env.token(&env.user)).await;

    ws.send(WsMessage::Text("{not json".into())).await.unwrap();
    let reply = ServerFrame::decode(&next_text(&mut ws).await).unwrap();
    assert_eq!(reply, ServerFrame::error("invalid message format"));

    let unknown = ClientFrame {
        conversation_id: "not-a-uuid".into(),
        content: "hello".into(),
        sender: None,
    };
    send_frame(&mut ws, &unknown).await;
    let reply = ServerFrame::decode(&next_text(&mut ws).await).unwrap();
    assert_eq!(reply, ServerFrame::error("conversation not found"));

    send_frame(&mut ws, &ClientFrame::new(conversation.id, "still here")).await;
    let ServerFrame::Message(envelope) = ServerFrame::decode(&next_text(&mut ws).await).unwrap()
    else {
        panic!("expected message frame");
    };
    assert_eq!(env.cipher().decrypt(&envelope.content).unwrap(), "still here");

    server.stop().await;
}

#[actix_rt::test]
async fn test_messages_from_one_connection_persist_in_send_order() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();
    let (conversation, _) = env
        .state
        .conversations
        .with_admin(&env.user)
        .await
        .unwrap();
    let mut ws = server.connect(&env.token(&env.user)).await;

    let texts: Vec<String> = (0..20).map(|i| format!("message {i}")).collect();
    for text in &texts {
        send_frame(&mut ws, &ClientFrame::new(conversation.id, text.as_str())).await;
    }
    for _ in &texts {
        next_text(&mut ws).await;
    }

    let stored = env.conversations.list_messages(conversation.id).await.unwrap();
    let contents: Vec<String> = stored.iter().map(|m| m.content.clone()).collect();
    assert_eq!(contents, texts);
    assert!(stored.windows(2).all(|w| w[0].seq < w[1].seq));

    server.stop().await;
}

#[actix_rt::test]
async fn test_client_session_round_trip() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();
    let (conversation, _) = env
        .state
        .conversations
        .with_admin(&env.user)
        .await
        .unwrap();
    let mut admin = server.connect(&env.token(&env.admin)).await;

    let mut config = SessionConfig::new(server.ws_url());
    config.user_id = Some(env.user.id);
    let mut session = ClientSession::spawn(
        config,
        Some(&env.token(&env.user)),
        env.cipher(),
        Arc::new(WsConnector),
    )
    .unwrap();

    // Sent before the socket opens: queued, then flushed
    session.send(conversation.id, "from the session").unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .unwrap();
    let Some(SessionEvent::Message(echo)) = event else {
        panic!("expected echoed message, got {event:?}");
    };
    assert_eq!(echo.content, "from the session");
    assert_eq!(echo.sender, env.user.id);
    assert!(!echo.decrypt_failed);
    assert_eq!(session.state(), ConnectionState::Connected);

    let ServerFrame::Message(seen_by_admin) =
        ServerFrame::decode(&next_text(&mut admin).await).unwrap()
    else {
        panic!("expected message frame");
    };
    assert_eq!(seen_by_admin.id, echo.id);

    // A reply from the admin reaches the session decrypted
    send_frame(&mut admin, &ClientFrame::new(conversation.id, "got it")).await;
    let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .unwrap();
    let Some(SessionEvent::Message(reply)) = event else {
        panic!("expected reply, got {event:?}");
    };
    assert_eq!(reply.content, "got it");
    assert_eq!(reply.sender, env.admin.id);

    session.shutdown().await;
    server.stop().await;
}

#[actix_rt::test]
async fn test_client_session_stops_on_refused_credential() {
    let env = TestEnvironment::new().await;
    let server = env.spawn_server();

    let mut session = ClientSession::spawn(
        SessionConfig::new(server.ws_url()),
        Some("expired-or-garbage"),
        env.cipher(),
        Arc::new(WsConnector),
    )
    .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
        .await
        .unwrap();
    assert!(
        matches!(event, Some(SessionEvent::AuthenticationFailed { .. })),
        "expected authentication failure, got {event:?}"
    );
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(env.state.registry.total_connections().await, 0);

    session.shutdown().await;
    server.stop().await;
}

#[actix_rt::test]
async fn test_silent_connection_is_dropped_after_heartbeat_timeout() {
    let mut config = Config::test_defaults();
    config.websocket = WebSocketConfig {
        heartbeat_interval: Duration::from_millis(100),
        client_timeout: Duration::from_millis(300),
    };
    let env = TestEnvironment::with_config(config).await;
    let server = env.spawn_server();

    // Raw upgrade with no WebSocket library behind it, so pings go unanswered
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let request = format!(
        "GET /ws?token={} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        env.token(&env.user),
        server.addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 101"));
    assert_eq!(env.state.registry.connection_count(env.user.id).await, 1);

    let registry = env.state.registry.clone();
    let user_id = env.user.id;
    assert!(eventually(|| {
        let registry = registry.clone();
        async move { registry.connection_count(user_id).await == 0 }
    })
    .await);

    drop(stream);
    server.stop().await;
}
