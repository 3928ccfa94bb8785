//! Error taxonomy
//!
//! Every error the core can surface to a caller belongs to one of the
//! namespaces below. Each carries a stable machine `code`, a human
//! `message`, optional `details`, and a correlation id so a client never
//! sees a stack trace or an internal identifier.

use serde::Serialize;
use serde_json::Value;

/// Top-level error surfaced across both the WebSocket and REST planes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Auth {
        code: &'static str,
        message: String,
        correlation_id: Option<String>,
    },
    #[error("{message}")]
    Session {
        code: &'static str,
        message: String,
        correlation_id: Option<String>,
    },
    #[error("{message}")]
    Connection {
        code: &'static str,
        message: String,
        correlation_id: Option<String>,
    },
    #[error("{message}")]
    Audio {
        code: &'static str,
        message: String,
        correlation_id: Option<String>,
    },
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        correlation_id: Option<String>,
    },
    #[error("{message} (retry after {retry_after_ms}ms)")]
    RateLimit {
        code: &'static str,
        message: String,
        retry_after_ms: u64,
        correlation_id: Option<String>,
    },
    #[error("{message}")]
    Internal {
        code: &'static str,
        message: String,
        correlation_id: Option<String>,
    },
}

/// Wire shape of the outbound `error` message / REST error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Auth { code, .. }
            | ApiError::Session { code, .. }
            | ApiError::Connection { code, .. }
            | ApiError::Audio { code, .. }
            | ApiError::Validation { code, .. }
            | ApiError::RateLimit { code, .. }
            | ApiError::Internal { code, .. } => code,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            ApiError::Auth { correlation_id, .. }
            | ApiError::Session { correlation_id, .. }
            | ApiError::Connection { correlation_id, .. }
            | ApiError::Audio { correlation_id, .. }
            | ApiError::Validation { correlation_id, .. }
            | ApiError::RateLimit { correlation_id, .. }
            | ApiError::Internal { correlation_id, .. } => correlation_id.as_deref(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let details = match self {
            ApiError::RateLimit { retry_after_ms, .. } => {
                Some(serde_json::json!({ "retryAfterMs": retry_after_ms }))
            }
            _ => None,
        };
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            details,
            correlation_id: self.correlation_id().map(|s| s.to_string()),
        }
    }

    /// HTTP status that mirrors the semantics of the namespace, used by
    /// the REST surface; the WebSocket `error` message ignores this.
    pub fn http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ApiError::Auth { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Session { .. } | ApiError::Connection { .. } => StatusCode::NOT_FOUND,
            ApiError::Audio { .. } | ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn auth(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Auth { code, message: message.into(), correlation_id: None }
    }
    pub fn session(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Session { code, message: message.into(), correlation_id: None }
    }
    pub fn connection(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Connection { code, message: message.into(), correlation_id: None }
    }
    pub fn audio(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Audio { code, message: message.into(), correlation_id: None }
    }
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation { code, message: message.into(), correlation_id: None }
    }
    pub fn rate_limit(code: &'static str, message: impl Into<String>, retry_after_ms: u64) -> Self {
        ApiError::RateLimit { code, message: message.into(), retry_after_ms, correlation_id: None }
    }
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Internal { code, message: message.into(), correlation_id: None }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        let id = Some(id.into());
        match &mut self {
            ApiError::Auth { correlation_id, .. }
            | ApiError::Session { correlation_id, .. }
            | ApiError::Connection { correlation_id, .. }
            | ApiError::Audio { correlation_id, .. }
            | ApiError::Validation { correlation_id, .. }
            | ApiError::RateLimit { correlation_id, .. }
            | ApiError::Internal { correlation_id, .. } => *correlation_id = id,
        }
        self
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.http_status();
        (status, axum::Json(self.to_body())).into_response()
    }
}

/// Errors from the key-value store abstraction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("conditional write failed")]
    ConditionFailed,
    #[error("decrement would make the counter negative")]
    NegativeCount,
    #[error("item not found")]
    NotFound,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::session("SESSION_NOT_FOUND", "session not found"),
            StoreError::NegativeCount => {
                ApiError::internal("INTERNAL_NEGATIVE_COUNT", "listener count invariant violated")
            }
            StoreError::ConditionFailed => {
                ApiError::internal("INTERNAL_CONDITION_FAILED", "conditional write failed")
            }
            StoreError::Transient(msg) => ApiError::internal("INTERNAL_STORE_UNAVAILABLE", msg),
        }
    }
}
