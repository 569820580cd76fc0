//! Client Session: one per open tab.
//!
//! A single driver task owns the transport, the pending queue and the backoff state. Outbound
//! sends, inbound frames and the reconnect timer are all events consumed by that one task, so the
//! state machine below never runs concurrently with itself:
//!
//! ```text
//! Connecting --open--> Connected --close/error--> Disconnected --backoff--> Connecting ...
//!      \                                                \
//!       +--fail--> Disconnected                          +--attempts exhausted--> Closed
//! ```
//!
//! While not connected, sends go to the pending queue; on every successful open the queue is
//! flushed in FIFO order before any new send. [`ClientSession::shutdown`] closes the transport,
//! cancels the reconnect timer and moves to `Closed`, after which nothing else happens.
//!
//! A close with code 1008 means the server refused the credential. Retrying with the same token
//! cannot succeed, so the session closes and returns every frame the server did not accept in
//! [`SessionEvent::AuthenticationFailed`].
//!
//! Delivery confirmation is the server's echo: the server fans a message out to the sender's own
//! handles too, so the sending tab receives it as a [`SessionEvent::Message`]. Nothing is rendered
//! optimistically.

use chrono::{DateTime, Utc};
use crypto_core::MessageCipher;
use event_schema::{ClientFrame, MessageEnvelope, ServerFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backoff::{Backoff, DEFAULT_CEILING, DEFAULT_FLOOR};
use crate::queue::{OverflowPolicy, PendingQueue, PushOutcome, DEFAULT_CAPACITY};
use crate::transport::{Connector, Transport, TransportError};

/// Shown in place of a message body that could not be decrypted.
pub const DECRYPT_PLACEHOLDER: &str = "Error decrypting message";

// How long a failed write waits for a pending close frame
const CLOSE_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// No credential token: the session never attempts a connection.
    #[error("no credential token; not connecting")]
    MissingCredential,

    #[error("message content must not be empty")]
    EmptyMessage,

    #[error("session is closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint, without the token.
    pub url: String,
    /// Advisory `sender` attached to outbound frames.
    pub user_id: Option<Uuid>,
    pub backoff_floor: Duration,
    pub backoff_ceiling: Duration,
    /// Reconnect attempts since the last successful open before giving up. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: None,
            backoff_floor: DEFAULT_FLOOR,
            backoff_ceiling: DEFAULT_CEILING,
            max_reconnect_attempts: None,
            queue_capacity: DEFAULT_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }

    fn url_with_token(&self, token: &str) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}token={}",
            self.url,
            separator,
            urlencoding::encode(token)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal: shut down, gave up, or the credential was refused.
    Closed,
}

/// A message received from the server, already decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    /// Plaintext, or [`DECRYPT_PLACEHOLDER`] when `decrypt_failed`.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub decrypt_failed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message(InboundMessage),
    /// `{error}` frame from the server: the send was rejected, the connection stays up.
    ServerError(String),
    /// A queued frame was discarded because the pending queue was full.
    QueueOverflow { dropped: ClientFrame },
    /// Reconnect attempts exhausted; the session is now closed.
    GaveUp { attempts: u32 },
    /// The server refused the credential. The session is closed and hands back every frame the
    /// server never accepted, in send order.
    AuthenticationFailed { unsent: Vec<ClientFrame> },
}

#[derive(Debug)]
enum Command {
    Send(ClientFrame),
    Shutdown,
}

pub struct ClientSession {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    user_id: Option<Uuid>,
    driver: JoinHandle<()>,
}

impl ClientSession {
    /// Mount a session. Starts connecting immediately.
    pub fn spawn(
        config: SessionConfig,
        token: Option<&str>,
        cipher: MessageCipher,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SessionError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::MissingCredential)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            url: config.url_with_token(token),
            connector,
            cipher,
            queue: PendingQueue::new(config.queue_capacity, config.overflow_policy),
            backoff: Backoff::new(config.backoff_floor, config.backoff_ceiling),
            max_reconnect_attempts: config.max_reconnect_attempts,
            commands: command_rx,
            state: state_tx,
            events: event_tx,
            unconfirmed: None,
        };

        Ok(Self {
            commands: command_tx,
            state: state_rx,
            events: event_rx,
            user_id: config.user_id,
            driver: tokio::spawn(driver.run()),
        })
    }

    /// Send `content` to a conversation, or queue it until the transport is open.
    pub fn send(&self, conversation_id: Uuid, content: &str) -> Result<(), SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let mut frame = ClientFrame::new(conversation_id, content);
        if let Some(user_id) = self.user_id {
            frame = frame.with_sender(user_id);
        }
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| SessionError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Next inbound message or session notice. `None` once the session has stopped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Unmount: close the transport, cancel any reconnect timer and wait for the driver to stop.
    pub async fn shutdown(self) {
        // Already gone if the driver gave up
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.driver.await {
            tracing::warn!(error = %e, "session driver panicked");
        }
    }
}

enum Exit {
    Disconnected,
    Rejected,
    Shutdown,
}

// Outcome of racing a pending operation against the command channel
enum Step<T> {
    Ready(T),
    Command(Option<Command>),
}

struct Driver {
    url: String,
    connector: Arc<dyn Connector>,
    cipher: MessageCipher,
    queue: PendingQueue,
    backoff: Backoff,
    max_reconnect_attempts: Option<u32>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    // Frames written since open, kept until the server sends anything on the connection
    unconfirmed: Option<Vec<ClientFrame>>,
}

impl Driver {
    async fn run(mut self) {
        let mut attempts: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            let connector = self.connector.clone();
            let url = self.url.clone();
            let connect = async move { connector.connect(&url).await };
            tokio::pin!(connect);

            let opened = loop {
                let step = tokio::select! {
                    result = &mut connect => Step::Ready(result),
                    command = self.commands.recv() => Step::Command(command),
                };
                match step {
                    Step::Ready(result) => break result,
                    Step::Command(command) => {
                        if !self.absorb(command) {
                            return self.close();
                        }
                    }
                }
            };

            match opened {
                Ok(transport) => {
                    attempts = 0;
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    tracing::debug!(queued = self.queue.len(), "connected");

                    match self.run_connected(transport).await {
                        Exit::Shutdown => return self.close(),
                        Exit::Rejected => {
                            self.reject_credential();
                            return self.close();
                        }
                        Exit::Disconnected => {}
                    }
                }
                Err(e) => tracing::warn!(error = %e, "connection attempt failed"),
            }

            self.set_state(ConnectionState::Disconnected);

            attempts += 1;
            if let Some(max) = self.max_reconnect_attempts {
                if attempts > max {
                    tracing::warn!(attempts = max, "giving up on reconnecting");
                    self.emit(SessionEvent::GaveUp { attempts: max });
                    return self.close();
                }
            }

            let delay = self.backoff.next_delay();
            tracing::debug!(attempt = attempts, ?delay, "reconnect scheduled");

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                let step = tokio::select! {
                    _ = &mut sleep => Step::Ready(()),
                    command = self.commands.recv() => Step::Command(command),
                };
                match step {
                    Step::Ready(()) => break,
                    Step::Command(command) => {
                        if !self.absorb(command) {
                            return self.close();
                        }
                    }
                }
            }
        }
    }

    async fn run_connected(&mut self, mut transport: Box<dyn Transport>) -> Exit {
        self.unconfirmed = Some(Vec::new());

        // Queued frames go out before anything sent from now on
        while let Some(frame) = self.queue.pop_front() {
            if let Err(e) = self.transmit(&mut transport, frame).await {
                tracing::warn!(error = %e, "flush interrupted");
                return self.after_send_failure(&mut transport).await;
            }
        }

        loop {
            let step = tokio::select! {
                inbound = transport.recv() => Step::Ready(inbound),
                command = self.commands.recv() => Step::Command(command),
            };

            match step {
                Step::Ready(Some(Ok(text))) => {
                    self.unconfirmed = None;
                    self.handle_inbound(&text);
                }
                Step::Ready(Some(Err(e))) if e.is_credential_rejected() => {
                    tracing::warn!(error = %e, "server rejected the credential");
                    return Exit::Rejected;
                }
                Step::Ready(Some(Err(e))) => {
                    tracing::warn!(error = %e, "transport error");
                    transport.close().await;
                    return Exit::Disconnected;
                }
                Step::Ready(None) => {
                    tracing::debug!("transport closed");
                    return Exit::Disconnected;
                }
                Step::Command(Some(Command::Send(frame))) => {
                    if let Err(e) = self.transmit(&mut transport, frame).await {
                        tracing::warn!(error = %e, "send failed; message requeued");
                        return self.after_send_failure(&mut transport).await;
                    }
                }
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => {
                    transport.close().await;
                    return Exit::Shutdown;
                }
            }
        }
    }

    /// Send one frame; on failure it goes back to the head of the queue.
    async fn transmit(
        &mut self,
        transport: &mut Box<dyn Transport>,
        frame: ClientFrame,
    ) -> Result<(), TransportError> {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "dropping unencodable frame");
                return Ok(());
            }
        };

        if let Err(e) = transport.send(text).await {
            if let Some(dropped) = self.queue.requeue(frame) {
                self.emit(SessionEvent::QueueOverflow { dropped });
            }
            return Err(e);
        }
        if let Some(written) = self.unconfirmed.as_mut() {
            written.push(frame);
        }
        Ok(())
    }

    /// A write failed. Before the server has said anything, that may be the socket it is
    /// closing over a refused credential, so look for its close frame first.
    async fn after_send_failure(&mut self, transport: &mut Box<dyn Transport>) -> Exit {
        if self.unconfirmed.is_some() {
            if let Ok(Some(Err(e))) = tokio::time::timeout(CLOSE_GRACE, transport.recv()).await {
                if e.is_credential_rejected() {
                    return Exit::Rejected;
                }
            }
        }
        transport.close().await;
        Exit::Disconnected
    }

    /// Collect everything the server never accepted: frames written on the refused connection,
    /// then the pending queue, then sends still waiting in the command channel.
    fn reject_credential(&mut self) {
        self.commands.close();

        let mut unsent = self.unconfirmed.take().unwrap_or_default();
        unsent.extend(std::iter::from_fn(|| self.queue.pop_front()));
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Send(frame) = command {
                unsent.push(frame);
            }
        }

        tracing::warn!(unsent = unsent.len(), "credential rejected; not reconnecting");
        self.emit(SessionEvent::AuthenticationFailed { unsent });
    }

    /// Handle a command while not connected. Returns false on shutdown.
    fn absorb(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Send(frame)) => {
                if let PushOutcome::Dropped(dropped) = self.queue.push(frame) {
                    tracing::warn!("pending queue full; frame dropped");
                    self.emit(SessionEvent::QueueOverflow { dropped });
                }
                true
            }
            Some(Command::Shutdown) | None => false,
        }
    }

    fn handle_inbound(&mut self, text: &str) {
        match ServerFrame::decode(text) {
            Ok(ServerFrame::Message(envelope)) => {
                let message = self.open_envelope(envelope);
                self.emit(SessionEvent::Message(message));
            }
            Ok(ServerFrame::Error(frame)) => {
                tracing::debug!(error = %frame.error, "server rejected a send");
                self.emit(SessionEvent::ServerError(frame.error));
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unrecognized frame"),
        }
    }

    fn open_envelope(&self, envelope: MessageEnvelope) -> InboundMessage {
        let (content, decrypt_failed) = match self.cipher.decrypt(&envelope.content) {
            Ok(plaintext) => (plaintext, false),
            Err(e) => {
                tracing::warn!(message_id = %envelope.id, error = %e, "failed to decrypt message");
                (DECRYPT_PLACEHOLDER.to_string(), true)
            }
        };
        InboundMessage {
            id: envelope.id,
            conversation_id: envelope.conversation_id,
            sender: envelope.sender,
            content,
            timestamp: envelope.timestamp,
            decrypt_failed,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        // Receiver gone means the session handle was dropped
        let _ = self.events.send(event);
    }

    fn close(&mut self) {
        self.set_state(ConnectionState::Closed);
        self.commands.close();
    }
}
