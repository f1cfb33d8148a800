use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or invalid session")]
    Unauthorized,
    #[error("only the author may {0} this message")]
    NotAuthor(&'static str),
    #[error("requested object doesn't exist")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("file exceeds the {limit_mb} MB upload limit")]
    PayloadTooLarge { limit_mb: usize },
    #[error("embedding provider error: {0}")]
    Embedding(anyhow::Error),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized | Self::NotAuthor(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Self::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
            Self::Embedding(e) => {
                error!("embedding provider failed: {e:#}");
                (StatusCode::BAD_GATEWAY, "embedding provider unavailable".to_string())
            }
            Self::Internal(e) => {
                error!("received internal error for user request: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
