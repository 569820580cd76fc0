//! Conversation Store: conversation records and their ordered message history.
//!
//! The store is an external persistence collaborator. [`InMemoryConversationStore`] backs tests
//! and database-less runs; `postgres::PgConversationStore` backs production.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, ParticipantPair};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_conversation(&self, pair: ParticipantPair) -> AppResult<Option<Conversation>>;

    /// Get-or-create. Returns the conversation and whether this call created it; a pair that
    /// already has a conversation never gets a second one.
    async fn create_conversation(&self, pair: ParticipantPair) -> AppResult<(Conversation, bool)>;

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// Conversations `user_id` participates in, newest first.
    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    /// Append atomically with respect to other appends on the same conversation. The returned
    /// message is durable when this resolves.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        plaintext: &str,
    ) -> AppResult<Message>;

    /// Full history in append order.
    async fn list_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;
}

struct ConversationRecord {
    conversation: Conversation,
    // Per-conversation ordering lock
    messages: Mutex<Vec<Message>>,
}

#[derive(Default)]
struct Tables {
    conversations: HashMap<Uuid, Arc<ConversationRecord>>,
    by_pair: HashMap<ParticipantPair, Uuid>,
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    tables: RwLock<Tables>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, conversation_id: Uuid) -> AppResult<Arc<ConversationRecord>> {
        self.tables
            .read()
            .await
            .conversations
            .get(&conversation_id)
            .cloned()
            .ok_or(AppError::ConversationNotFound(conversation_id))
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn find_conversation(&self, pair: ParticipantPair) -> AppResult<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_pair
            .get(&pair)
            .and_then(|id| tables.conversations.get(id))
            .map(|record| record.conversation.clone()))
    }

    async fn create_conversation(&self, pair: ParticipantPair) -> AppResult<(Conversation, bool)> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .by_pair
            .get(&pair)
            .and_then(|id| tables.conversations.get(id))
        {
            return Ok((existing.conversation.clone(), false));
        }

        let conversation = Conversation::new(pair);
        tables.by_pair.insert(pair, conversation.id);
        tables.conversations.insert(
            conversation.id,
            Arc::new(ConversationRecord {
                conversation: conversation.clone(),
                messages: Mutex::new(Vec::new()),
            }),
        );
        Ok((conversation, true))
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self
            .tables
            .read()
            .await
            .conversations
            .get(&id)
            .map(|record| record.conversation.clone()))
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let tables = self.tables.read().await;
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|record| record.conversation.is_participant(user_id))
            .map(|record| record.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        plaintext: &str,
    ) -> AppResult<Message> {
        let record = self.record(conversation_id).await?;
        let mut messages = record.messages.lock().await;

        // Keep sent_at monotonic even if the wall clock steps backwards
        let now = Utc::now();
        let sent_at = match messages.last() {
            Some(last) if last.sent_at > now => last.sent_at,
            _ => now,
        };

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            seq: messages.len() as i64 + 1,
            sender_id,
            content: plaintext.to_string(),
            sent_at,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let record = self.record(conversation_id).await?;
        let messages = record.messages.lock().await;
        Ok(messages.clone())
    }
}
