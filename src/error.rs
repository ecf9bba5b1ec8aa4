//! Error types for media I/O, sequence parsing and frame queues
//!
//! Open failures are fatal to one session only and are delivered to every
//! caller waiting on that session's info, so `IoError` is `Clone`.
//! Per-frame decode failures are reported through session events and the
//! log; the decode loop never stops on them.

use std::path::PathBuf;

use thiserror::Error;

/// Media I/O error scoped to a single read or write session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IoError {
    /// The source could not be opened or its header could not be parsed.
    #[error("{message}: {path}")]
    Open { path: PathBuf, message: String },

    /// No registered plugin handles this file.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A single frame failed to decode.
    #[error("Decode error at frame {frame}: {message}")]
    Decode { frame: i64, message: String },

    /// A single frame failed to encode or write.
    #[error("Write error at frame {frame}: {message}")]
    Write { frame: i64, message: String },

    /// The session was closed before the request completed.
    #[error("Session closed")]
    Closed,

    /// Plugin options JSON did not match the plugin's option schema.
    #[error("Invalid plugin options: {0}")]
    InvalidOptions(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e.to_string())
    }
}

/// Malformed frame sequence or sequence file name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty sequence token in '{0}'")]
    EmptyToken(String),

    #[error("Invalid frame number '{token}' in '{input}'")]
    InvalidNumber { token: String, input: String },

    #[error("Invalid frame range '{0}'")]
    InvalidRange(String),
}

/// Why a blocking push into a frame queue did not complete.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was cleared or interrupted while the producer waited.
    #[error("Queue interrupted")]
    Interrupted,

    /// The frame belongs to a generation that was already discarded.
    #[error("Stale frame generation")]
    Stale,

    /// The queue was closed; no more frames are accepted.
    #[error("Queue closed")]
    Closed,

    #[error("Timed out waiting for queue space")]
    Timeout,
}
