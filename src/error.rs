use std::io;
use std::path::PathBuf;

/// Why an inbound webhook signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing signature header")]
    MissingHeader,

    #[error("Missing signature")]
    EmptySignature,

    #[error("Invalid signature header")]
    MalformedHeader,

    #[error("Invalid signature algorithm: '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("Invalid signature encoding")]
    InvalidHex,

    #[error("Invalid Github signature")]
    DigestMismatch,
}

/// Why a webhook payload could not be turned into a repository reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid Github payload: {0}")]
    MalformedPayload(String),

    #[error("'{0}' field not present in payload")]
    MissingField(&'static str),
}

/// Failure to hand a payload to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("topic '{0}' is not accepting messages")]
    Closed(String),

    #[error("topic '{0}' is at capacity")]
    Full(String),

    #[error("{0}")]
    Transport(String),
}

/// Crate-wide error type for pipeline_relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Payload validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Failed to publish event: {0}")]
    Publish(#[from] PublishError),

    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source operation failed: {operation}\n{output}")]
    Source { operation: String, output: String },

    #[error("Failed to serialize SCM descriptor: {0}")]
    Serialization(String),

    #[error("Failed to execute command '{command}': {output}")]
    Execution {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RelayError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Only source checkout failures are worth another delivery; everything
    /// else fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Source { .. })
    }
}

/// Helper type for Results that use RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
