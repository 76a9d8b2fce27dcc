//! Error kinds returned by every core operation and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::auth::repo_types::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed input (400)
    #[error("{0}")]
    Validation(String),

    /// Uniqueness violation on register/update (409)
    #[error("{0}")]
    Conflict(String),

    /// Unknown identifier or wrong password; deliberately not told apart (401)
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Missing, malformed, tampered or expired token (401)
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Account gone or deactivated since the token was issued (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated but the role is not allowed (403)
    #[error("Access denied. Insufficient permissions.")]
    Forbidden,

    #[error("Resource not found")]
    NotFound,

    /// Backing store failure (500); detail is logged, never returned
    #[error("Storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    /// Hashing, signing or provider failure (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Storage(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation",
            AuthError::Conflict(_) => "conflict",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Unauthorized => "unauthorized",
            AuthError::Forbidden => "forbidden",
            AuthError::NotFound => "not_found",
            AuthError::Storage(_) => "storage",
            AuthError::Internal(_) => "internal",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AuthError::Validation(msg.into())
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation(field) => {
                AuthError::Conflict(format!("A user with this {} already exists", field.label()))
            }
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Unavailable(e) => AuthError::Storage(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::Storage(e) => {
                error!(error = %e, "storage failure");
                "Service temporarily unavailable".to_string()
            }
            AuthError::Internal(e) => {
                error!(error = %e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.kind(),
            "message": message,
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
