//! Client side of the taskboard chat channel.
//!
//! [`ClientSession`] keeps one tab's connection alive: it authenticates with a bearer token,
//! queues sends while offline, reconnects with exponential backoff and decrypts inbound
//! messages with the shared [`crypto_core::MessageCipher`].

pub mod backoff;
pub mod queue;
pub mod session;
pub mod transport;

pub use backoff::Backoff;
pub use queue::{OverflowPolicy, PendingQueue, PushOutcome};
pub use session::{
    ClientSession, ConnectionState, InboundMessage, SessionConfig, SessionError, SessionEvent,
    DECRYPT_PLACEHOLDER,
};
pub use transport::{Connector, Transport, TransportError, WsConnector};
