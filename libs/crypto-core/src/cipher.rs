//! Transit encryption of chat message bodies.
//!
//! Every message that leaves the server (live broadcast frames and history responses) carries
//! its body encrypted under one shared secret. Clients hold the same secret and decrypt on
//! receipt.
//!
//! ## Format
//!
//! `base64( nonce (12 bytes) || AES-256-GCM ciphertext || tag (16 bytes) )`
//!
//! The AES key is HKDF-SHA256 of the configured secret, so any passphrase length works.
//! A fresh random nonce is drawn per message, so equal plaintexts produce different ciphertexts.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_INFO: &[u8] = b"taskboard-chat/message-transit/v1";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption secret must not be empty")]
    EmptySecret,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    EncryptionFailed,

    /// Ciphertext is malformed or was produced under a different secret.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

/// Symmetric codec for message bodies.
#[derive(Clone)]
pub struct MessageCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}

impl MessageCipher {
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }

        let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(KEY_INFO, &mut key)
            .map_err(|_| CryptoError::KeyDerivation)?;

        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivation)?;
        Ok(Self { cipher })
    }

    /// Encrypt a message body.
    ///
    /// Only fails for inputs beyond the AES-GCM length limit, which no chat message reaches.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Decrypt a body produced by [`MessageCipher::encrypt`].
    ///
    /// Failures are message-scoped: callers render a placeholder or skip the message, they never
    /// tear down the connection over it.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid base64: {e}")))?;

        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed(
                "ciphertext too short".to_string(),
            ));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(format!("invalid UTF-8: {e}")))
    }
}
