//! Shared error type across cometd crates.

use thiserror::Error;

/// Stable error codes (safe to match on and to log).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Missing or invalid configuration.
    Config,
    /// Malformed arguments to a public operation.
    BadArgument,
    /// Operation not allowed in the current connection status.
    InvalidState,
    /// `end_batch` without a matching `start_batch`.
    UnbalancedBatch,
    /// No transport in common with the server.
    Negotiation,
    /// A second long-poll while one is outstanding.
    ConcurrentLongPoll,
    /// Transport / network level failure.
    Transport,
    /// JSON encode/decode failure.
    Codec,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and failure messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Config => "CONFIG",
            ErrorCode::BadArgument => "BAD_ARGUMENT",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::UnbalancedBatch => "UNBALANCED_BATCH",
            ErrorCode::Negotiation => "NEGOTIATION",
            ErrorCode::ConcurrentLongPoll => "CONCURRENT_LONG_POLL",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Codec => "CODEC",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CometdError>;

/// Boxed error returned by user supplied callbacks and extensions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum CometdError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("calls to start_batch() and end_batch() are not paired")]
    UnbalancedBatch,
    #[error("could not negotiate transport with server; client {client:?}, server {server:?}")]
    Negotiation {
        client: Vec<String>,
        server: Vec<String>,
    },
    #[error("concurrent long-poll requests not allowed, request {0} not yet completed")]
    ConcurrentLongPoll(u64),
    #[error("transport: {0}")]
    Transport(String),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl CometdError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CometdError::Config(_) => ErrorCode::Config,
            CometdError::BadArgument(_) => ErrorCode::BadArgument,
            CometdError::InvalidState(_) => ErrorCode::InvalidState,
            CometdError::UnbalancedBatch => ErrorCode::UnbalancedBatch,
            CometdError::Negotiation { .. } => ErrorCode::Negotiation,
            CometdError::ConcurrentLongPoll(_) => ErrorCode::ConcurrentLongPoll,
            CometdError::Transport(_) => ErrorCode::Transport,
            CometdError::Codec(_) => ErrorCode::Codec,
            CometdError::Internal(_) => ErrorCode::Internal,
        }
    }
}
