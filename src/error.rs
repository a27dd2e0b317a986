use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors.
///
/// Validation failures surface synchronously as 400 before any side effect;
/// everything else is a dependency or pipeline failure and maps to a generic
/// 500. Worker-side errors are retried internally and never reach a caller.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("score store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("metadata provider error: {0}")]
    Metadata(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("poison message {req_id}: {reason}")]
    Poison { req_id: String, reason: String },
}

impl AppError {
    /// True when retrying the same operation could succeed (broker or store
    /// hiccup), false for errors that are deterministic for a given message.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DependencyUnavailable(_)
                | AppError::Store(_)
                | AppError::Queue(_)
                | AppError::Metadata(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({ "error": message }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_is_not_retryable() {
        let err = AppError::InvalidRequest("bad action".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn dependency_errors_are_retryable() {
        let err = AppError::DependencyUnavailable("broker down".to_string());
        assert!(err.is_retryable());
        let err = AppError::Queue("send failed".to_string());
        assert!(err.is_retryable());
    }

    #[test]
    fn poison_is_not_retryable() {
        let err = AppError::Poison {
            req_id: "r-1".to_string(),
            reason: "failed validation twice".to_string(),
        };
        assert!(!err.is_retryable());
    }
}
