//! Error types for the decode pipeline.

use thiserror::Error;

/// Errors that can occur while decoding a single log, blob or calldata.
///
/// Always non-fatal to a batch: the pipeline records the failure next to
/// the raw input and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Insufficient data: need {needed} bytes, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Invalid offset {offset} into {len}-byte buffer")]
    InvalidOffset { offset: usize, len: usize },

    #[error("Malformed array at offset {offset}: declared length {declared} exceeds available data")]
    MalformedArray { offset: usize, declared: String },

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Unknown function selector 0x{0}")]
    UnknownSelector(String),

    #[error("Missing topic {index}")]
    MissingTopic { index: usize },

    #[error("ABI decode failed: {0}")]
    Abi(String),

    #[error("Unexpected shape: expected {expected}")]
    UnexpectedShape { expected: String },
}

impl From<hex::FromHexError> for DecodeError {
    fn from(e: hex::FromHexError) -> Self {
        Self::InvalidHex(e.to_string())
    }
}
