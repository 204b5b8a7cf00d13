//! Application error type mapping to HTTP status codes and envelope format.
//!
//! The REST fallback surfaces the same error taxonomy as the chat
//! transport: conflicts are recoverable (resume instead of start, refresh
//! the queue after a lost claim), and validation failures never affect
//! other sessions.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use hostdesk_types::error::ChatError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Chat operation errors, carrying the wire-level error code.
    Chat(ChatError),
    /// Authentication failure.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Chat(err) => {
                let status = match err {
                    ChatError::SessionConflict { .. } | ChatError::AlreadyAssigned => {
                        StatusCode::CONFLICT
                    }
                    ChatError::SessionNotFound => StatusCode::NOT_FOUND,
                    ChatError::NotAParticipant | ChatError::AdminRequired => StatusCode::FORBIDDEN,
                    ChatError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
                    ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), err.to_string())
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let body = json!({
            "data": null,
            "meta": {
                "timestamp": chrono::Utc::now().to_rfc3339(),
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn conflict_maps_to_409() {
        let resp = AppError::Chat(ChatError::SessionConflict {
            session_id: Uuid::now_v7(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_a_participant_maps_to_403() {
        let resp = AppError::Chat(ChatError::NotAParticipant).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn session_not_found_maps_to_404() {
        let resp = AppError::Chat(ChatError::SessionNotFound).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
