//! Custom error types for Switchboard
//!
//! Provides a unified error handling system across all modules.

use thiserror::Error;

/// Main error type for Switchboard operations
#[derive(Error, Debug)]
pub enum SwitchboardError {
    /// Model provider connection or API errors
    #[error("Provider error: {0}")]
    Provider(String),

    /// Failure while consuming a streamed response
    #[error("Stream error: {0}")]
    Stream(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An agent id that is not part of the catalog
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// No turn with this id in the conversation
    #[error("Turn '{0}' not found")]
    TurnNotFound(String),

    /// The turn has already been finalized and can no longer change
    #[error("Turn '{0}' is already finalized")]
    TurnFinalized(String),

    /// A submission arrived while another turn was still streaming
    #[error("A response is already in progress")]
    TurnInFlight,

    /// Nothing to send (no text and no attachments)
    #[error("Nothing to send")]
    EmptySubmission,

    /// A single round exceeded its wall-clock budget
    #[error("Round timed out after {0}s")]
    RoundTimeout(u64),

    /// The model kept requesting tools past the round limit
    #[error("Tool round limit of {0} reached")]
    RoundLimit(usize),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed endpoint URLs
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for Switchboard operations
pub type Result<T> = std::result::Result<T, SwitchboardError>;

impl SwitchboardError {
    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
