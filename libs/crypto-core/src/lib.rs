//! Shared crypto primitives for the chat service and its clients.
//!
//! - [`jwt`]: bearer credential validation (HS256)
//! - [`cipher`]: symmetric transit encryption of message bodies

pub mod cipher;
pub mod jwt;

pub use cipher::{CryptoError, MessageCipher};
pub use jwt::{Claims, JwtError, JwtKeys};
