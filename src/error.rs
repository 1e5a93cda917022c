use crate::snowflake::InvalidSnowflake;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Error body returned by the API on 4xx/5xx responses, surfaced unaltered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    /// HTTP status of the response that carried this body.
    #[serde(skip)]
    pub status: u16,
    /// Application error code (e.g. 10003 "Unknown Channel").
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: String,
    /// Field-level validation detail, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl ApiError {
    /// Parse an error body. `None` when the body is not a JSON error object.
    pub fn parse(status: StatusCode, body: &[u8]) -> Option<Self> {
        let mut err: ApiError = serde_json::from_slice(body).ok()?;
        if err.code.is_none() && err.message.is_empty() && err.errors.is_none() {
            return None;
        }
        err.status = status.as_u16();
        Some(err)
    }

    /// Error built from a body that carried no structured payload.
    pub fn from_text(status: StatusCode, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body).trim().to_string();
        let message = if text.is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            text
        };
        Self {
            status: status.as_u16(),
            code: None,
            message,
            errors: None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {}): {}", self.status, code, self.message),
            None => write!(f, "{}: {}", self.status, self.message),
        }
    }
}

/// Stable classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    Validation,
    Rejected,
    RateLimitExhausted,
    ServerError,
    Network,
    Cancelled,
    InvalidIdentifier,
    Config,
    Decode,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation",
            ErrorKind::Rejected => "rejected",
            ErrorKind::RateLimitExhausted => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidIdentifier => "invalid_identifier",
            ErrorKind::Config => "config",
            ErrorKind::Decode => "decode",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure of one logical operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(ApiError),

    #[error("unauthorized: {0}")]
    Unauthorized(ApiError),

    #[error("forbidden: {0}")]
    Forbidden(ApiError),

    #[error("validation failed: {0}")]
    Validation(ApiError),

    /// Any other non-retryable 4xx (405, 409, 413, ...).
    #[error("request rejected: {0}")]
    Rejected(ApiError),

    #[error("rate limited for {waited:?}, next retry in {retry_after:?} exceeds the ceiling")]
    RateLimitExhausted {
        waited: Duration,
        retry_after: Duration,
    },

    #[error("server error after {attempts} attempts: {error}")]
    ServerError { attempts: u32, error: ApiError },

    #[error("network error after {attempts} attempts: {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidSnowflake),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Compact, serializable shape of an error for tool output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub retriable: bool,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Rejected(_) => ErrorKind::Rejected,
            Error::RateLimitExhausted { .. } => ErrorKind::RateLimitExhausted,
            Error::ServerError { .. } => ErrorKind::ServerError,
            Error::Network { .. } => ErrorKind::Network,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Error::Config(_) => ErrorKind::Config,
            Error::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Server-provided payload, when the failure came from a response.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::NotFound(e)
            | Error::Unauthorized(e)
            | Error::Forbidden(e)
            | Error::Validation(e)
            | Error::Rejected(e)
            | Error::ServerError { error: e, .. } => Some(e),
            _ => None,
        }
    }

    /// Application error code from the response body, if any.
    pub fn code(&self) -> Option<u64> {
        self.api_error().and_then(|e| e.code)
    }

    /// Wait that would have preceded the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimitExhausted { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the same call could succeed if issued again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimitExhausted | ErrorKind::ServerError | ErrorKind::Network
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.kind().as_str().to_string(),
            message: self.to_string(),
            retriable: self.is_retryable(),
        }
    }
}

/// Classify a final, non-success, non-429 response.
pub fn classify_status(status: StatusCode, body: &[u8], attempts: u32) -> Error {
    let parsed = ApiError::parse(status, body);
    let structured = parsed.is_some();
    let err = parsed.unwrap_or_else(|| ApiError::from_text(status, body));
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(err),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(err),
        StatusCode::FORBIDDEN => Error::Forbidden(err),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY if structured => {
            Error::Validation(err)
        }
        s if s.is_server_error() => Error::ServerError {
            attempts,
            error: err,
        },
        _ => Error::Rejected(err),
    }
}
