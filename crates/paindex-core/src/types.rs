//! Shared types for the ingestion pipeline.

use serde::{Deserialize, Serialize};

// ─── RawLog ──────────────────────────────────────────────────────────────────

/// A raw EVM log as returned by `eth_getLogs`, optionally enriched with the
/// parent transaction's input and the block timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
    /// Some providers include the block timestamp directly in the log.
    #[serde(rename = "blockTimestamp", default)]
    pub block_timestamp: Option<String>,
    /// Parent transaction input (`0x…`), filled in by the fetcher.
    #[serde(rename = "transactionInput", default)]
    pub tx_input: Option<String>,
}

impl RawLog {
    /// Returns the block number, or `None` if the field is not valid hex.
    pub fn block_number_u64(&self) -> Option<u64> {
        parse_hex_u64(&self.block_number)
    }

    /// Returns the log index, or `None` if the field is not valid hex.
    pub fn log_index_u32(&self) -> Option<u32> {
        parse_hex_u64(&self.log_index).and_then(|v| u32::try_from(v).ok())
    }

    /// Returns the block timestamp carried by the log, if any.
    pub fn block_timestamp_i64(&self) -> Option<i64> {
        self.block_timestamp
            .as_deref()
            .and_then(parse_hex_u64)
            .and_then(|v| i64::try_from(v).ok())
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }

    /// The first topic (event signature hash), if present.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

// ─── Hex helpers ─────────────────────────────────────────────────────────────

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

/// Normalise a hex identifier to lowercase with a single `0x` prefix.
///
/// Tags, roots, hashes and addresses are compared as map keys after
/// passing through this function.
pub fn normalize_hex(s: &str) -> String {
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    format!("0x{}", body.to_ascii_lowercase())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
