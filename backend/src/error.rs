use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::schema::MatchId;

/// Faults inside the persistence layer. Never a business outcome: a failed
/// predicate is reported as `Ok(None)` by the store, not as one of these.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored match {id} is corrupt: {reason}")]
    Corrupt { id: MatchId, reason: String },
}

/// Everything a caller-facing operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("the match {0} cannot be found")]
    NotFound(MatchId),
    #[error("the operation is invalid: {0}")]
    InvalidOperation(String),
    #[error("not authorised to operate on the match {0}")]
    Unauthorized(MatchId),
    #[error("not authenticated: {0}")]
    Unauthenticated(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MatchError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        MatchError::InvalidOperation(detail.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            MatchError::NotFound(_) => "MATCH_NOT_FOUND",
            MatchError::InvalidOperation(_) => "INVALID_MATCH_OPERATION",
            MatchError::Unauthorized(_) | MatchError::Unauthenticated(_) => "AUTH_FAILED",
            MatchError::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, MatchError::Store(_))
    }

    fn status(&self) -> StatusCode {
        match self {
            MatchError::NotFound(_) => StatusCode::NOT_FOUND,
            MatchError::InvalidOperation(_) => StatusCode::CONFLICT,
            MatchError::Unauthorized(_) => StatusCode::FORBIDDEN,
            MatchError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            MatchError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error payload as it travels to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppError {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<&MatchError> for AppError {
    fn from(err: &MatchError) -> Self {
        let (message, detail) = match err {
            MatchError::NotFound(id) => (
                format!("The match {id} cannot be found."),
                None,
            ),
            MatchError::InvalidOperation(detail) => {
                ("The operation is invalid.".to_string(), Some(detail.clone()))
            }
            MatchError::Unauthorized(id) => (
                "You are not authorised to operate this operation.".to_string(),
                Some(format!("You are not authorised to operate on the match {id}.")),
            ),
            MatchError::Unauthenticated(detail) => (
                "You are not authenticated to operate this operation.".to_string(),
                Some(detail.clone()),
            ),
            MatchError::Store(_) => ("Something went wrong, please retry.".to_string(), None),
        };
        AppError {
            code: err.code(),
            message,
            detail,
        }
    }
}

impl IntoResponse for MatchError {
    fn into_response(self) -> Response {
        if self.is_internal() {
            tracing::error!(error = %self, "request failed");
        }
        (self.status(), Json(AppError::from(&self))).into_response()
    }
}
