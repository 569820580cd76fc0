use crypto_core::MessageCipher;
use event_schema::MessageEnvelope;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Identity, ParticipantPair};
use crate::services::conversation_store::ConversationStore;
use crate::services::user_directory::UserDirectory;

/// Conversation lookups behind the HTTP surface: get-or-create, listing and encrypted history.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn UserDirectory>,
    cipher: Arc<MessageCipher>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        directory: Arc<dyn UserDirectory>,
        cipher: Arc<MessageCipher>,
    ) -> Self {
        Self {
            store,
            directory,
            cipher,
        }
    }

    /// Conversation between `caller` and `participant_id`, created on first contact.
    ///
    /// The boolean is true when this call created it.
    pub async fn get_or_create(
        &self,
        caller: &Identity,
        participant_id: Uuid,
    ) -> AppResult<(Conversation, bool)> {
        let pair = ParticipantPair::new(caller.id, participant_id)?;

        if self.directory.find_user(participant_id).await?.is_none() {
            return Err(AppError::NotFound("user"));
        }

        if let Some(existing) = self.store.find_conversation(pair).await? {
            return Ok((existing, false));
        }

        let (conversation, created) = self.store.create_conversation(pair).await?;
        if created {
            tracing::info!(
                conversation_id = %conversation.id,
                user_id = %caller.id,
                participant_id = %participant_id,
                "conversation created"
            );
        }
        Ok((conversation, created))
    }

    /// The caller's conversation with the admin.
    pub async fn with_admin(&self, caller: &Identity) -> AppResult<(Conversation, bool)> {
        if caller.is_admin() {
            return Err(AppError::BadRequest(
                "the admin has no admin conversation".into(),
            ));
        }
        let admin = self
            .directory
            .find_admin()
            .await?
            .ok_or(AppError::NotFound("admin"))?;
        self.get_or_create(caller, admin.id).await
    }

    pub async fn list_for(&self, caller: &Identity) -> AppResult<Vec<Conversation>> {
        self.store.list_conversations_for(caller.id).await
    }

    /// Ordered history with every body encrypted, participants only.
    pub async fn history(
        &self,
        caller: &Identity,
        conversation_id: Uuid,
    ) -> AppResult<Vec<MessageEnvelope>> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::ConversationNotFound(conversation_id))?;

        if !conversation.is_participant(caller.id) {
            return Err(AppError::NotAParticipant);
        }

        self.store
            .list_messages(conversation.id)
            .await?
            .into_iter()
            .map(|message| -> AppResult<MessageEnvelope> {
                let ciphertext = self.cipher.encrypt(&message.content)?;
                Ok(message.to_envelope(ciphertext))
            })
            .collect()
    }
}
