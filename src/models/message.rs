use chrono::{DateTime, Utc};
use event_schema::MessageEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted chat message. Append-only; `seq` is strictly increasing per conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub seq: i64,
    pub sender_id: Uuid,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Wire form with the already-encrypted body.
    pub fn to_envelope(&self, ciphertext: String) -> MessageEnvelope {
        MessageEnvelope {
            id: self.id,
            conversation_id: self.conversation_id,
            sender: self.sender_id,
            content: ciphertext,
            timestamp: self.sent_at,
        }
    }
}
