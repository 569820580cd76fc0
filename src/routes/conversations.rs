use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::Conversation;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub participant_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub created_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationResponse {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            participants: c.participants.as_array(),
            created_at: c.created_at,
        }
    }
}

fn conversation_reply(conversation: Conversation, created: bool) -> HttpResponse {
    let body = ConversationResponse::from(conversation);
    if created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

#[get("/api/chat")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let conversations: Vec<ConversationResponse> = state
        .conversations
        .list_for(&user.0)
        .await?
        .into_iter()
        .map(ConversationResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(conversations))
}

#[post("/api/chat")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let (conversation, created) = state
        .conversations
        .get_or_create(&user.0, body.participant_id)
        .await?;
    Ok(conversation_reply(conversation, created))
}

#[get("/api/chat/user-admin")]
pub async fn conversation_with_admin(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let (conversation, created) = state.conversations.with_admin(&user.0).await?;
    Ok(conversation_reply(conversation, created))
}

#[get("/api/chat/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let history = state
        .conversations
        .history(&user.0, path.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Same pipeline as a WebSocket send; live handles of both participants receive the message.
#[post("/api/chat/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let report = state
        .router
        .send(&user.0, path.into_inner(), &body.content)
        .await?;
    Ok(HttpResponse::Created().json(report.envelope))
}
