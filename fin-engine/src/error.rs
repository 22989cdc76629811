//! Structured error types for the seams the session state machine branches on.
//!
//! Framing and internal-I/O failures are reported through `anyhow` at the
//! connection-handler level; these two enums exist specifically where the
//! caller needs to match on *which* thing went wrong (R3's NACK reason, the
//! "no block 4" structural failure) rather than just log-and-drop it.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrailerError {
    #[error("Missing Block 5 trailer")]
    MissingTrailer,
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("MAC mismatch: expected {expected}, got {actual}")]
    MacMismatch { expected: String, actual: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("framed message has no block 4")]
    MissingBlock4,
}
