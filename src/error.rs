use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Fixed message returned whenever no document store is connected.
pub const STORAGE_UNAVAILABLE_MESSAGE: &str = "Database not available";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{}", STORAGE_UNAVAILABLE_MESSAGE)]
    StorageUnavailable,

    #[error("Validation error: {0}")]
    Validation(String),

    /// Request could not be extracted (bad query string, malformed body).
    /// Keeps the status the extractor chose.
    #[error("Invalid request: {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Rejected { status, .. } => *status,
            ApiError::StorageUnavailable | ApiError::Storage(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (error_code, message) = match self {
            ApiError::StorageUnavailable => {
                tracing::warn!("Request rejected: document store is not configured");
                ("DATABASE_UNAVAILABLE", STORAGE_UNAVAILABLE_MESSAGE.to_string())
            }
            ApiError::Validation(ref message) => {
                tracing::debug!("Validation error: {}", message);
                ("VALIDATION_ERROR", message.clone())
            }
            ApiError::Rejected { ref message, .. } => {
                tracing::debug!("Request rejected: {}", message);
                ("INVALID_REQUEST", message.clone())
            }
            ApiError::Storage(ref err) => {
                if err.contains("timeout") {
                    tracing::warn!("Document store operation timeout: {}", err);
                } else {
                    tracing::error!("Document store error: {}", err);
                }

                // Keep driver details out of the response body
                let user_message = if err.contains("timeout") {
                    "Database operation timed out, please try again"
                } else if err.contains("unavailable") || err.contains("connection") {
                    "Database service is temporarily unavailable"
                } else {
                    "A database error occurred"
                };

                ("DATABASE_ERROR", user_message.to_string())
            }
            ApiError::Internal(ref err) => {
                tracing::error!("Internal server error: {:#}", err);
                ("INTERNAL_ERROR", "An internal server error occurred".to_string())
            }
        };

        let body = Json(json!({
            "detail": message,
            "error": {
                "code": error_code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            tracing::error!("PostgreSQL connection closed: {}", err);
            return ApiError::Storage("Database connection unavailable".to_string());
        }

        match err.code() {
            Some(code) => {
                tracing::error!("PostgreSQL error: {} (code: {:?})", err, code);
                ApiError::Storage(format!("Database operation failed: {}", err))
            }
            None => {
                tracing::error!("PostgreSQL client error: {}", err);
                ApiError::Storage(format!("Database connection error: {}", err))
            }
        }
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                tracing::warn!("Database connection pool timeout: {}", err);
                ApiError::Storage("Database connection timeout".to_string())
            }
            deadpool_postgres::PoolError::Closed => {
                tracing::error!("Database connection pool is closed: {}", err);
                ApiError::Storage("Database service unavailable".to_string())
            }
            deadpool_postgres::PoolError::NoRuntimeSpecified => {
                tracing::error!("Database pool runtime error: {}", err);
                ApiError::Internal(anyhow::anyhow!("Database configuration error"))
            }
            _ => {
                tracing::error!("Database connection pool error: {}", err);
                ApiError::Storage(format!("Database connection unavailable: {}", err))
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
