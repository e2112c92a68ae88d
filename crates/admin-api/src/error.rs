//! Error type for the HTTP control plane.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Errors surfaced to operators as `{error: message}` JSON bodies.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Database error.
    #[error(transparent)]
    Database(#[from] database::DatabaseError),

    /// Session lifecycle error (not paired, binding failure, ...).
    #[error(transparent)]
    Session(#[from] session::SessionError),

    /// Delivery error from an operator-initiated send.
    #[error(transparent)]
    Send(#[from] sender::SendError),

    /// Malformed or incomplete request.
    #[error("{0}")]
    BadRequest(String),

    /// Referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Session(err) if err.is_pairing_unsupported() => {
                StatusCode::NOT_IMPLEMENTED
            }
            AdminError::Session(_) | AdminError::Send(_) | AdminError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Database(err) => {
                tracing::error!("database error: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AdminError::Internal(message) => {
                tracing::error!("internal error: {message}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Result type for handler functions.
pub type Result<T> = std::result::Result<T, AdminError>;
