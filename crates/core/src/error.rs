// Error taxonomy shared by the catalog, the invocation pipeline and the dispatcher

use serde::{Deserialize, Serialize};

/// Category of a failed invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed envelope, tool name or arguments (rejected before any side effect)
    InvalidRequest,
    /// Unknown tool or method
    NotFound,
    /// Admission denied by the rate limiter
    RateLimited,
    /// The underlying operation failed (after retries, if retryable)
    ExecutionFailed,
    /// Unexpected fault inside the pipeline itself
    Internal,
}

impl ErrorKind {
    /// JSON-RPC error code reported for this kind
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidRequest => -32600,
            Self::NotFound => -32601,
            Self::RateLimited => 429,
            Self::ExecutionFailed | Self::Internal => -32603,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ExecutionFailed => "execution_failed",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned by the invocation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct InvocationError {
    pub kind: ErrorKind,
    pub message: String,
    /// Type name of the underlying failure, when one was recorded
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl InvocationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            type_name: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn not_found(tool: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("tool not found: {}", tool))
    }

    pub fn rate_limited(tool: &str) -> Self {
        Self::new(
            ErrorKind::RateLimited,
            format!("rate limit exceeded for {}", tool),
        )
        .with_type("RateLimitExceeded")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

/// Failure raised by an underlying operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OperationError {
    /// Name of the failure type as reported by the operation (e.g. `HttpError`)
    pub type_name: String,
    pub message: String,
}

impl OperationError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Generic failure without a more specific type
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("OperationError", message)
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::new(
            "Timeout",
            format!("timeout: execution exceeded {}s", seconds),
        )
    }
}

impl From<OperationError> for InvocationError {
    fn from(err: OperationError) -> Self {
        InvocationError::new(ErrorKind::ExecutionFailed, err.message).with_type(err.type_name)
    }
}
