use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    // Operation-scoped failures surfaced to callers
    Auth(String),
    ProfileLookup(String),
    Mutation(String),
    Query(String),
    // Request-level errors
    NotFound(String),
    Validation(String),
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
    // Backing services
    Database(String),
    Storage(String),
    Configuration(String),
    Internal(String),
}

impl AppError {
    /// Re-tag a store failure as a read-path error. Request-level errors pass through.
    pub fn into_query(self) -> Self {
        match self {
            AppError::Database(msg) | AppError::Internal(msg) => AppError::Query(msg),
            other => other,
        }
    }

    /// Re-tag a store failure as a write-path error. Request-level errors pass through.
    pub fn into_mutation(self) -> Self {
        match self {
            AppError::Database(msg) | AppError::Internal(msg) => AppError::Mutation(msg),
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::ProfileLookup(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Mutation(_)
            | AppError::Query(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Configuration(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Auth(msg) => write!(f, "{}", msg),
            AppError::ProfileLookup(msg) => write!(f, "Profile lookup failed: {}", msg),
            AppError::Mutation(msg) => write!(f, "Mutation failed: {}", msg),
            AppError::Query(msg) => write!(f, "Query failed: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            AppError::Database(msg) | AppError::Internal(msg) | AppError::Configuration(msg) => {
                tracing::error!("Internal failure: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Mutation(msg) | AppError::Query(msg) | AppError::Storage(msg) => {
                tracing::warn!("{}", self);
                msg.clone()
            }
            // Auth messages are surfaced literally
            AppError::Auth(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
