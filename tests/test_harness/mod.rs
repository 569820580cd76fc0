//! Test Harness Module
//!
//! Builds the chat service against in-memory stores and a no-op mailer:
//! - seeded admin and two users with signed access tokens
//! - an `App` for request-level tests
//! - a real listener for WebSocket tests

#![allow(dead_code)]

use actix_web::{dev::ServerHandle, web, App, HttpServer};
use crypto_core::{JwtKeys, MessageCipher};
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use taskboard_chat::config::Config;
use taskboard_chat::models::{Identity, Role};
use taskboard_chat::routes;
use taskboard_chat::services::{
    EmailService, InMemoryConversationStore, InMemoryTaskStore, InMemoryUserDirectory,
};
use taskboard_chat::state::{AppState, Stores};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test Environment
pub struct TestEnvironment {
    pub config: Arc<Config>,
    pub state: AppState,
    pub conversations: Arc<InMemoryConversationStore>,
    pub tasks: Arc<InMemoryTaskStore>,
    pub admin: Identity,
    pub user: Identity,
    pub other: Identity,
    keys: JwtKeys,
}

impl TestEnvironment {
    pub async fn new() -> Self {
        Self::with_config(Config::test_defaults()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let config = Arc::new(config);
        let conversations = Arc::new(InMemoryConversationStore::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let tasks = Arc::new(InMemoryTaskStore::new());

        let admin = Identity::new("admin@taskboard.test", Role::Admin);
        let user = Identity::new("user@taskboard.test", Role::User);
        let other = Identity::new("other@taskboard.test", Role::User);
        for identity in [&admin, &user, &other] {
            users.insert(identity.clone()).await;
        }

        let stores = Stores {
            conversations: conversations.clone(),
            users,
            tasks: tasks.clone(),
        };
        let notifier = Arc::new(EmailService::new(&config.smtp).expect("no-op mailer"));
        let state = AppState::new(config.clone(), stores, notifier).expect("app state");
        let keys = JwtKeys::from_secret(&config.jwt_secret).expect("jwt keys");

        Self {
            config,
            state,
            conversations,
            tasks,
            admin,
            user,
            other,
            keys,
        }
    }

    pub fn token(&self, identity: &Identity) -> String {
        self.keys
            .generate_access_token(identity.id, &identity.email, identity.role.as_str())
            .expect("token")
    }

    pub fn bearer(&self, identity: &Identity) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.token(identity)))
    }

    pub fn cipher(&self) -> MessageCipher {
        MessageCipher::from_secret(&self.config.encryption_key).expect("cipher")
    }

    pub fn app(
        &self,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(web::Data::new(self.state.clone()))
            .configure(routes::configure)
    }

    /// Bind an ephemeral port and serve the full route table on it.
    pub fn spawn_server(&self) -> TestServer {
        let state = self.state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(routes::configure)
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind test server");

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_rt::spawn(server);

        TestServer { addr, handle }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    handle: ServerHandle,
}

impl TestServer {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let (ws, _) = connect_async(format!("{}?token={token}", self.ws_url()))
            .await
            .expect("websocket handshake");
        ws
    }

    pub async fn stop(self) {
        self.handle.stop(false).await;
    }
}

/// Next non-control frame, or `None` after `wait` elapses.
pub async fn next_frame(ws: &mut WsClient, wait: Duration) -> Option<WsMessage> {
    tokio::time::timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
                Some(Ok(msg)) => return Some(msg),
                _ => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

pub async fn next_text(ws: &mut WsClient) -> String {
    match next_frame(ws, Duration::from_secs(5)).await {
        Some(WsMessage::Text(text)) => text.as_str().to_owned(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
