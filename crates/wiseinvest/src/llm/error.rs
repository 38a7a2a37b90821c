//! Completion client error types.

use thiserror::Error;

/// Result type for completion operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors that can occur talking to the upstream model.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A completed call carried no choices.
    #[error("no choices returned from provider")]
    EmptyChoices,

    /// Failed to parse a response or stream chunk.
    #[error("failed to parse provider response: {0}")]
    ParseError(String),

    /// Transport failure while reading the stream.
    #[error("stream error: {0}")]
    Stream(String),

    /// The stream closed without the end-of-stream marker.
    #[error("stream ended before completion")]
    StreamEndedEarly,
}
