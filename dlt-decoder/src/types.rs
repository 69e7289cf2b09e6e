//! Core types for the DLT decoder library
//!
//! This module defines the error type shared by every codec and the timestamp
//! alias used on trace lines.

use chrono::{DateTime, Utc};

/// Timestamp type used throughout the decoder
pub type Timestamp = DateTime<Utc>;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;

/// The logger timestamp assigned to lines that carry none (Unix epoch)
pub fn default_timestamp() -> Timestamp {
    Timestamp::default()
}

/// Errors that can occur while decoding or encoding DLT data
///
/// Malformed input on the decode path never reaches the caller as one of
/// these; the stream decoder turns it into skipped-byte lines instead.
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    #[error("Insufficient buffer: need {needed} bytes, have {available}")]
    InsufficientBuffer { needed: usize, available: usize },

    #[error("Encoding not supported: {0}")]
    EncodeNotSupported(String),

    #[error("Undefined control payload for {0}")]
    UndefinedControlPayload(String),

    #[error("Invalid usage: {0}")]
    Usage(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Duplicate frame in frame map: {0}")]
    DuplicateFrame(String),

    #[error("Failed to parse frame map: {0}")]
    FrameMapParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DecoderError {
    /// Shorthand for an insufficient destination buffer
    pub(crate) fn buffer(needed: usize, available: usize) -> Self {
        DecoderError::InsufficientBuffer { needed, available }
    }

    /// Shorthand for invalid input data
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DecoderError::InvalidData(msg.into())
    }
}
