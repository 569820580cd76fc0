//! Postgres-backed stores over a shared deadpool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, Identity, Message, ParticipantPair, Role, Task, TaskStatus, TaskUpdate,
};
use crate::services::conversation_store::ConversationStore;
use crate::services::task_store::TaskStore;
use crate::services::user_directory::UserDirectory;

fn conversation_from_row(row: &Row) -> AppResult<Conversation> {
    let a: Uuid = row.get("participant_a");
    let b: Uuid = row.get("participant_b");
    let participants = ParticipantPair::new(a, b)
        .map_err(|_| AppError::Database("conversation row has identical participants".into()))?;
    Ok(Conversation {
        id: row.get("id"),
        participants,
        created_at: row.get("created_at"),
    })
}

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        seq: row.get("seq"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        sent_at: row.get("sent_at"),
    }
}

fn identity_from_row(row: &Row) -> AppResult<Identity> {
    let role: String = row.get("role");
    Ok(Identity {
        id: row.get("id"),
        email: row.get("email"),
        role: Role::from_db(&role)
            .ok_or_else(|| AppError::Database(format!("unknown role in users table: {role}")))?,
    })
}

fn task_from_row(row: &Row) -> AppResult<Task> {
    let status: String = row.get("status");
    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: TaskStatus::from_db(&status)
            .ok_or_else(|| AppError::Database(format!("unknown task status: {status}")))?,
        due_date: row.get("due_date"),
        last_updated_by: row.get("last_updated_by"),
        updated_at: row.get("updated_at"),
    })
}

const CONVERSATION_COLUMNS: &str = "id, participant_a, participant_b, created_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, seq, sender_id, content, sent_at";

#[derive(Clone)]
pub struct PgConversationStore {
    db: Pool,
}

impl PgConversationStore {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn find_conversation(&self, pair: ParticipantPair) -> AppResult<Option<Conversation>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE participant_a = $1 AND participant_b = $2"
                ),
                &[&pair.first(), &pair.second()],
            )
            .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn create_conversation(&self, pair: ParticipantPair) -> AppResult<(Conversation, bool)> {
        let client = self.db.get().await?;

        // The unique pair constraint arbitrates concurrent creators
        let inserted = client
            .query_opt(
                &format!(
                    "INSERT INTO conversations (id, participant_a, participant_b) \
                     VALUES ($1, $2, $3) \
                     ON CONFLICT (participant_a, participant_b) DO NOTHING \
                     RETURNING {CONVERSATION_COLUMNS}"
                ),
                &[&Uuid::new_v4(), &pair.first(), &pair.second()],
            )
            .await?;

        if let Some(row) = inserted {
            return Ok((conversation_from_row(&row)?, true));
        }

        let row = client
            .query_one(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE participant_a = $1 AND participant_b = $2"
                ),
                &[&pair.first(), &pair.second()],
            )
            .await?;
        Ok((conversation_from_row(&row)?, false))
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"),
                &[&id],
            )
            .await?;
        row.as_ref().map(conversation_from_row).transpose()
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE participant_a = $1 OR participant_b = $1 \
                     ORDER BY created_at DESC"
                ),
                &[&user_id],
            )
            .await?;
        rows.iter().map(conversation_from_row).collect()
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        plaintext: &str,
    ) -> AppResult<Message> {
        let mut client = self.db.get().await?;
        let tx = client.transaction().await?;

        // Row lock serializes appends per conversation
        let seq: i64 = tx
            .query_opt(
                "SELECT next_seq FROM conversations WHERE id = $1 FOR UPDATE",
                &[&conversation_id],
            )
            .await?
            .ok_or(AppError::ConversationNotFound(conversation_id))?
            .get(0);

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO messages (id, conversation_id, seq, sender_id, content, sent_at) \
                     VALUES ($1, $2, $3, $4, $5, \
                        GREATEST(NOW(), COALESCE((SELECT MAX(sent_at) FROM messages WHERE conversation_id = $2), NOW()))) \
                     RETURNING {MESSAGE_COLUMNS}"
                ),
                &[&Uuid::new_v4(), &conversation_id, &seq, &sender_id, &plaintext],
            )
            .await?;

        tx.execute(
            "UPDATE conversations SET next_seq = next_seq + 1 WHERE id = $1",
            &[&conversation_id],
        )
        .await?;

        tx.commit().await?;
        Ok(message_from_row(&row))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let client = self.db.get().await?;

        let exists = client
            .query_opt("SELECT 1 FROM conversations WHERE id = $1", &[&conversation_id])
            .await?
            .is_some();
        if !exists {
            return Err(AppError::ConversationNotFound(conversation_id));
        }

        let rows = client
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages \
                     WHERE conversation_id = $1 ORDER BY seq ASC"
                ),
                &[&conversation_id],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    db: Pool,
}

impl PgUserDirectory {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, user_id: Uuid) -> AppResult<Option<Identity>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt("SELECT id, email, role FROM users WHERE id = $1", &[&user_id])
            .await?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_admin(&self) -> AppResult<Option<Identity>> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                "SELECT id, email, role FROM users WHERE role = 'admin' \
                 ORDER BY created_at ASC LIMIT 1",
                &[],
            )
            .await?;
        row.as_ref().map(identity_from_row).transpose()
    }
}

const TASK_COLUMNS: &str =
    "id, title, description, status, due_date, last_updated_by, updated_at";

#[derive(Clone)]
pub struct PgTaskStore {
    db: Pool,
}

impl PgTaskStore {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn update(
        &self,
        task_id: Uuid,
        update: TaskUpdate,
        updated_by: Uuid,
    ) -> AppResult<Option<Task>> {
        let client = self.db.get().await?;
        let status = update.status.map(|s| s.as_str());
        let due_date: Option<DateTime<Utc>> = update.due_date;

        let row = client
            .query_opt(
                &format!(
                    "UPDATE tasks SET \
                        title = COALESCE($2, title), \
                        description = COALESCE($3, description), \
                        status = COALESCE($4, status), \
                        due_date = COALESCE($5, due_date), \
                        last_updated_by = $6, \
                        updated_at = NOW() \
                     WHERE id = $1 \
                     RETURNING {TASK_COLUMNS}"
                ),
                &[
                    &task_id,
                    &update.title,
                    &update.description,
                    &status,
                    &due_date,
                    &updated_by,
                ],
            )
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }
}
