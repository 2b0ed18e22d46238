//! Error types for Ollama Relay

use serde::Serialize;
use thiserror::Error;

/// Hint shown when the upstream host cannot be reached
pub const CONNECTION_HINT: &str = "Try removing the OLLAMA_HOST environment variable or setting it to http://127.0.0.1:11434";

/// Hint shown for every other classified upstream failure
pub const UPSTREAM_HINT: &str = "Check if Ollama is running and accessible";

/// Failure of a single relay invocation before its stream was handed out
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    /// The upstream answered with an application-level error
    #[error("{0}")]
    Upstream(String),

    /// The upstream host could not be reached (DNS, refused, unreachable)
    #[error(
        "Connection error: Could not connect to Ollama at {host}. If you have set the OLLAMA_HOST environment variable, try removing it or ensuring it points to a valid Ollama instance."
    )]
    Connection { host: String },

    /// The request deadline elapsed before the upstream responded
    #[error("Request timed out waiting for the upstream service")]
    Timeout,

    /// Unexpected local failure while setting up the request
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Stable category name, used in logs and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Upstream(_) => "upstream",
            RelayError::Connection { .. } => "connection",
            RelayError::Timeout => "timeout",
            RelayError::Internal(_) => "internal",
        }
    }

    /// Remediation hint for the end user, if one applies
    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            RelayError::Connection { .. } => Some(CONNECTION_HINT),
            RelayError::Upstream(_) | RelayError::Timeout => Some(UPSTREAM_HINT),
            RelayError::Internal(_) => None,
        }
    }

    /// Whether this failure came from the upstream side rather than the relay itself
    pub fn is_upstream_side(&self) -> bool {
        !matches!(self, RelayError::Internal(_))
    }

    /// Structured form handed to callers that render the error
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
            suggestion: self.remediation_hint().map(str::to_string),
        }
    }
}

/// Serializable error surface: `{kind, message, suggestion?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Errors raised by the application shell around the relay
#[derive(Error, Debug)]
pub enum RelayAppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Relay invocation errors
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Result type alias for Ollama Relay operations
pub type Result<T> = std::result::Result<T, RelayAppError>;
