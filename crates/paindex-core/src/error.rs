//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that abort an ingestion cycle.
///
/// Per-record decode problems never surface here: they are kept as
/// [`DecodeFailure`](crate::entities::DecodeFailure) rows and the batch
/// carries on. Everything in this enum leaves the cursor untouched.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// RPC or HTTP failure talking to the upstream provider.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A write or read against the persistent store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Batch-level decode failure (e.g. unparsable log metadata).
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Retries for a (network, contract) pair were exhausted.
    #[error("Ingestion stalled after {attempts} attempts: {reason}")]
    Stalled { attempts: u32, reason: String },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if a later attempt with the same cursor may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Rpc { .. } | Self::Persistence(_) | Self::Decode(_)
        )
    }
}
