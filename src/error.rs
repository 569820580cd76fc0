use crate::middleware::error_handling;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use uuid::Uuid;

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing, malformed, expired or unknown credential.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("conversation not found")]
    ConversationNotFound(Uuid),

    #[error("not a participant of this conversation")]
    NotAParticipant,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("database error: {0}")]
    Database(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("internal server error")]
    Internal,
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<crypto_core::CryptoError> for AppError {
    fn from(e: crypto_core::CryptoError) -> Self {
        AppError::Encryption(e.to_string())
    }
}

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden | AppError::NotAParticipant => 403,
            AppError::ConversationNotFound(_) | AppError::NotFound(_) => 404,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Encryption(_)
            | AppError::Notification(_)
            | AppError::Internal => 500,
        }
    }

    /// Reason text carried in a WebSocket error frame.
    ///
    /// Server-side failures are reported without internal detail.
    pub fn frame_reason(&self) -> String {
        match self {
            AppError::Database(_) => "failed to store message".to_string(),
            AppError::Encryption(_) => "failed to encrypt message".to_string(),
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Notification(_)
            | AppError::Internal => "error processing message".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::Unauthorized.status_code(), 401);
        assert_eq!(AppError::NotAParticipant.status_code(), 403);
        assert_eq!(AppError::ConversationNotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(AppError::Database("boom".into()).status_code(), 500);
    }

    #[test]
    fn frame_reason_hides_internal_detail() {
        let reason = AppError::Database("connection refused at 10.0.0.3".into()).frame_reason();
        assert!(!reason.contains("10.0.0.3"));
        assert_eq!(
            AppError::NotAParticipant.frame_reason(),
            "not a participant of this conversation"
        );
    }
}
