//! Message Router: received → authorized → persisted → broadcast.
//!
//! A send is authorized against the conversation's participant pair using the identity bound to
//! the connection (the frame's `sender` field is ignored), appended to the store, and only then
//! encrypted and pushed to every live handle of both participants. The sender's own handles are
//! part of that set, so the sending tab receives its own message back as confirmation.

use crypto_core::MessageCipher;
use event_schema::{ClientFrame, MessageEnvelope, ServerFrame};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Identity};
use crate::services::conversation_store::ConversationStore;
use crate::websocket::ConnectionRegistry;

/// Outcome of a successful send.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub envelope: MessageEnvelope,
    /// Live handles found for the two participants at broadcast time.
    pub attempted: usize,
    /// Handles the frame was actually queued on.
    pub delivered: usize,
}

#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn ConversationStore>,
    cipher: Arc<MessageCipher>,
    registry: ConnectionRegistry,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        cipher: Arc<MessageCipher>,
        registry: ConnectionRegistry,
    ) -> Self {
        Self {
            store,
            cipher,
            registry,
        }
    }

    /// Route a decoded frame from an authenticated connection.
    pub async fn route(&self, sender: &Identity, frame: ClientFrame) -> AppResult<DeliveryReport> {
        if let Some(claimed) = frame.sender.as_deref() {
            if claimed != sender.id.to_string() {
                tracing::debug!(
                    user_id = %sender.id,
                    claimed_sender = %claimed,
                    "ignoring claimed sender in frame"
                );
            }
        }

        // Unparseable ids cannot name an existing conversation
        let conversation_id = Uuid::parse_str(frame.conversation_id.trim())
            .map_err(|_| AppError::ConversationNotFound(Uuid::nil()))?;

        self.send(sender, conversation_id, &frame.content).await
    }

    /// Run the pipeline for `content` sent by `sender` to `conversation_id`.
    pub async fn send(
        &self,
        sender: &Identity,
        conversation_id: Uuid,
        content: &str,
    ) -> AppResult<DeliveryReport> {
        let conversation = self.authorize(sender, conversation_id).await?;

        if content.trim().is_empty() {
            return Err(AppError::BadRequest("message content must not be empty".into()));
        }

        // Durable before any broadcast attempt
        let message = self
            .store
            .append_message(conversation.id, sender.id, content)
            .await?;

        let ciphertext = self.cipher.encrypt(&message.content)?;
        let envelope = message.to_envelope(ciphertext);
        let frame = ServerFrame::Message(envelope.clone())
            .encode()
            .map_err(|e| AppError::Encryption(format!("encode frame: {e}")))?;

        let handles = self
            .registry
            .handles_for_all(&conversation.participants.as_array())
            .await;

        let attempted = handles.len();
        let delivered = handles
            .iter()
            .filter(|handle| {
                let ok = handle.push(frame.clone());
                if !ok {
                    tracing::debug!(
                        handle_id = %handle.id(),
                        user_id = %handle.user_id(),
                        "handle closed during fan-out"
                    );
                }
                ok
            })
            .count();

        tracing::debug!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            seq = message.seq,
            attempted,
            delivered,
            "message broadcast"
        );

        Ok(DeliveryReport {
            envelope,
            attempted,
            delivered,
        })
    }

    async fn authorize(&self, sender: &Identity, conversation_id: Uuid) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::ConversationNotFound(conversation_id))?;

        if !conversation.is_participant(sender.id) {
            tracing::warn!(
                user_id = %sender.id,
                conversation_id = %conversation_id,
                "rejected send from non-participant"
            );
            return Err(AppError::NotAParticipant);
        }
        Ok(conversation)
    }
}
