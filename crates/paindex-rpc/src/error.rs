//! Transport-level error types.

use paindex_core::IndexerError;
use thiserror::Error;

use crate::request::JsonRpcError;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, non-2xx status, unreadable body.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Rate limited on '{key}', retry after {retry_after_ms}ms")]
    RateLimited { key: String, retry_after_ms: u64 },

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Transient failures worth retrying at the transport level.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Rpc(e) => e.is_rate_limit(),
            Self::Deserialization(_) | Self::Other(_) => false,
        }
    }
}

impl From<TransportError> for IndexerError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Rpc(err) => IndexerError::Rpc {
                code: err.code,
                message: err.message,
            },
            other => IndexerError::Transport(other.to_string()),
        }
    }
}
