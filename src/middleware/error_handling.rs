use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

// Map domain errors to HTTP responses
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::BadRequest(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_REQUEST),
        AppError::Unauthorized => (
            kinds::AUTHENTICATION_ERROR,
            error_codes::INVALID_CREDENTIALS,
        ),
        AppError::Forbidden => (kinds::AUTHORIZATION_ERROR, error_codes::FORBIDDEN),
        AppError::NotAParticipant => (
            kinds::AUTHORIZATION_ERROR,
            error_codes::NOT_CONVERSATION_MEMBER,
        ),
        AppError::ConversationNotFound(_) => {
            (kinds::NOT_FOUND_ERROR, error_codes::CONVERSATION_NOT_FOUND)
        }
        AppError::NotFound("user") => (kinds::NOT_FOUND_ERROR, error_codes::USER_NOT_FOUND),
        AppError::NotFound("task") => (kinds::NOT_FOUND_ERROR, error_codes::TASK_NOT_FOUND),
        AppError::NotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::NOT_FOUND),
        AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::Encryption(_) => (kinds::SERVER_ERROR, error_codes::ENCRYPTION_ERROR),
        AppError::Config(_)
        | AppError::StartServer(_)
        | AppError::Notification(_)
        | AppError::Internal => (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR),
    };

    // Server errors are logged with detail and returned without it
    let message = if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
        "internal server error".to_string()
    } else {
        err.to_string()
    };

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_participant_maps_to_403() {
        let (status, body) = map_error(&AppError::NotAParticipant);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, error_codes::NOT_CONVERSATION_MEMBER);
        assert_eq!(body.error, "Forbidden");
    }

    #[test]
    fn database_error_detail_not_leaked() {
        let (status, body) = map_error(&AppError::Database("password=hunter2".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.message.contains("hunter2"));
    }
}
