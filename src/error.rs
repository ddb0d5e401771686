use thiserror::Error;

/// Maximum characters to include in error message body for debugging.
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 200;

/// Errors that can occur while building, signing, or executing operations.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The operation name is not present in the loaded catalog.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// A supplied parameter name is not declared by the operation.
    #[error("operation {operation} has no parameter named {name}")]
    InvalidParameter { operation: String, name: String },

    /// A parameter failed its required/type/format constraint.
    #[error("parameter validation error: {0}")]
    Validation(String),

    /// Credential not found, expired, or structurally invalid.
    #[error("credential error: {0}")]
    Credential(String),

    /// Catalog or configuration problem.
    #[error("config error: {0}")]
    Config(String),

    /// Network-level failure (timeout, connect, broken transfer). Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Service asked us to slow down. Retryable.
    #[error("throttled by service ({code}): {message}")]
    Throttling {
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// A declared (or at least code-carrying) service error.
    #[error("service error {kind} (HTTP {http_status}): {message}")]
    Service {
        kind: String,
        http_status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// Unexpected HTTP response with no recognizable service error body.
    #[error("HTTP {status} with body: {body}")]
    Http { status: u16, body: String },

    /// Response deserialization error.
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// Waiter exhausted its attempt budget without reaching a terminal state.
    #[error("waiter for {operation} timed out after {attempts} attempts")]
    Timeout { operation: String, attempts: u32 },
}

impl SdkError {
    /// Returns `true` if the error is potentially recoverable by retrying.
    ///
    /// Retryable: transport failures, throttling, and 5xx/429 responses
    /// that carried no recognizable service error code. Everything else
    /// (validation, credentials, declared service errors) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SdkError::Transport(_) | SdkError::Throttling { .. } => true,
            SdkError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns the service request ID if the error carries one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            SdkError::Service { request_id, .. } | SdkError::Throttling { request_id, .. } => {
                request_id.as_deref()
            }
            _ => None,
        }
    }

    /// Returns the service error code if the error carries one.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            SdkError::Service { code, .. } => Some(code),
            SdkError::Throttling { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns the HTTP status of the failing response, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            SdkError::Service { http_status, .. } => Some(*http_status),
            SdkError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A specialized Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Truncates a string to at most `max_chars` characters on a valid UTF-8 boundary.
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
