//! # Relay Errors
//!
//! A single error type covers the gateway's failure taxonomy. Variants carry
//! rendered messages rather than source errors so they can be cloned into
//! error envelopes and diagnostics without lifetime trouble.

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type RelayResult<T> = Result<T, RelayError>;

/// Every failure the gateway distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The connect handshake carried a missing or wrong bearer secret.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// A connection was attempted after shutdown began.
    #[error("connection rejected: the gateway is closing")]
    ClosingRejection,

    /// A targeted send named a session that is not registered.
    #[error("session {0} is not registered")]
    Addressing(String),

    /// An inbound payload could not be decoded.
    #[error("failed to decode message: {0}")]
    Decode(String),

    /// A request handler failed while processing a routed message.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// A network or socket level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A fetch failed more times than the retry budget allows.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Total attempts made, including the final one.
        attempts: u32,
        /// Rendered form of the final failure.
        last: String,
    },

    /// A record looked up by key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The feed store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(String),

    /// Fetched content could not be turned into feed items.
    #[error("parse error: {0}")]
    Parse(String),

    /// The supplied configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Decode(e.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}
