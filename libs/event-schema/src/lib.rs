//! Wire envelopes exchanged over the chat WebSocket.
//!
//! Every text frame is JSON. Client → server frames are [`ClientFrame`]; server → client frames
//! are [`ServerFrame`], either a delivered message or a structured error. Decoding happens in
//! exactly one place on each side ([`ClientFrame::decode`], [`ServerFrame::decode`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outbound frame (client → server): send a message to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    pub conversation_id: String,
    pub content: String,
    /// Advisory only. The server always uses the identity bound to the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl ClientFrame {
    pub fn new(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            content: content.into(),
            sender: None,
        }
    }

    pub fn with_sender(mut self, sender: Uuid) -> Self {
        self.sender = Some(sender.to_string());
        self
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A persisted message as it travels to clients. `content` is always ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Uuid,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
}

/// Inbound frame (server → client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Message(MessageEnvelope),
    Error(ErrorFrame),
}

impl ServerFrame {
    pub fn error(reason: impl Into<String>) -> Self {
        ServerFrame::Error(ErrorFrame {
            error: reason.into(),
        })
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_frame_uses_camel_case_fields() {
        let conversation_id = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let frame = ClientFrame::new(conversation_id, "hi").with_sender(sender);
        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "conversationId": conversation_id.to_string(),
                "content": "hi",
                "sender": sender.to_string(),
            })
        );
    }

    #[test]
    fn client_frame_sender_is_optional() {
        let frame = ClientFrame::decode(r#"{"conversationId":"abc","content":"x"}"#).unwrap();
        assert_eq!(frame.sender, None);
        assert_eq!(frame.conversation_id, "abc");
    }

    #[test]
    fn client_frame_rejects_missing_content() {
        assert!(ClientFrame::decode(r#"{"conversationId":"abc"}"#).is_err());
    }

    #[test]
    fn server_frame_distinguishes_error_from_message() {
        let err = ServerFrame::decode(r#"{"error":"conversation not found"}"#).unwrap();
        assert_eq!(err, ServerFrame::error("conversation not found"));

        let envelope = MessageEnvelope {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender: Uuid::new_v4(),
            content: "Y2lwaGVy".into(),
            timestamp: Utc::now(),
        };
        let text = ServerFrame::Message(envelope.clone()).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("conversationId").is_some());
        assert!(value.get("timestamp").unwrap().as_str().unwrap().contains('T'));
        assert_eq!(
            ServerFrame::decode(&text).unwrap(),
            ServerFrame::Message(envelope)
        );
    }
}
