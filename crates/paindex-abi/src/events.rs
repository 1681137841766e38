//! Per-event decoders.
//!
//! Each adapter event has a fixed layout, so decoding is a direct walk over
//! the words in `data` plus the indexed topics. One function per
//! [`EventKind`] variant; [`decode_log`] dispatches exhaustively.

use paindex_core::{normalize_hex, PayloadKind, RawLog};
use serde::{Deserialize, Serialize};

use crate::classifier::EventKind;
use crate::error::DecodeError;
use crate::primitives::{
    decode_address_from_topic, decode_bytes_at, decode_hex, decode_offset, decode_word_array_at,
    parse_topic, to_hex, word_at, word_to_u64, WORD_SIZE,
};

/// Position of a log on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMeta {
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u32,
    /// Emitting contract.
    pub contract: String,
    pub timestamp: Option<i64>,
}

impl LogMeta {
    pub fn from_log(log: &RawLog) -> Result<Self, DecodeError> {
        let block_number = log
            .block_number_u64()
            .ok_or_else(|| DecodeError::InvalidHex(format!("blockNumber '{}'", log.block_number)))?;
        let log_index = log
            .log_index_u32()
            .ok_or_else(|| DecodeError::InvalidHex(format!("logIndex '{}'", log.log_index)))?;
        Ok(Self {
            tx_hash: normalize_hex(&log.tx_hash),
            block_number,
            log_index,
            contract: normalize_hex(&log.address),
            timestamp: log.block_timestamp_i64(),
        })
    }
}

/// The typed content of one adapter event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EventRecord {
    TransactionExecuted {
        tags: Vec<String>,
        logic_refs: Vec<String>,
    },
    ActionExecuted {
        action_tree_root: String,
        tag_count: u64,
    },
    /// Any of the four `*Payload` events.
    Payload {
        kind: PayloadKind,
        tag: String,
        index: u64,
        blob: String,
    },
    CommitmentTreeRootAdded {
        root: String,
    },
    ForwarderCallExecuted {
        forwarder: String,
        input: String,
        output: String,
    },
}

/// A successfully decoded log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedLog {
    pub kind: EventKind,
    pub meta: LogMeta,
    pub record: EventRecord,
}

/// Decode `log`, already classified as `kind`.
pub fn decode_log(kind: EventKind, log: &RawLog) -> Result<DecodedLog, DecodeError> {
    let meta = LogMeta::from_log(log)?;
    let data = decode_hex(&log.data)?;
    let record = match kind {
        EventKind::TransactionExecuted => decode_transaction_executed(&data)?,
        EventKind::ActionExecuted => decode_action_executed(&data)?,
        EventKind::ForwarderCallExecuted => decode_forwarder_call(&log.topics, &data)?,
        EventKind::ResourcePayload
        | EventKind::DiscoveryPayload
        | EventKind::ExternalPayload
        | EventKind::ApplicationPayload => decode_payload(kind, &log.topics, &data)?,
        EventKind::CommitmentTreeRootAdded => decode_root_added(&data)?,
    };
    Ok(DecodedLog { kind, meta, record })
}

fn topic(topics: &[String], index: usize) -> Result<Vec<u8>, DecodeError> {
    let raw = topics.get(index).ok_or(DecodeError::MissingTopic { index })?;
    Ok(parse_topic(raw)?.to_vec())
}

fn hex_words(words: Vec<alloy_primitives::B256>) -> Vec<String> {
    words.iter().map(|w| to_hex(w.as_slice())).collect()
}

// `TransactionExecuted(bytes32[] tags, bytes32[] logicRefs)`
fn decode_transaction_executed(data: &[u8]) -> Result<EventRecord, DecodeError> {
    let tags = decode_word_array_at(data, decode_offset(data, 0)?)?;
    let logic_refs = decode_word_array_at(data, decode_offset(data, WORD_SIZE)?)?;
    Ok(EventRecord::TransactionExecuted {
        tags: hex_words(tags),
        logic_refs: hex_words(logic_refs),
    })
}

// `ActionExecuted(bytes32 actionTreeRoot, uint256 actionTagCount)`
fn decode_action_executed(data: &[u8]) -> Result<EventRecord, DecodeError> {
    let root = word_at(data, 0)?;
    let count = word_at(data, WORD_SIZE)?;
    let tag_count = word_to_u64(&count).ok_or_else(|| DecodeError::UnexpectedShape {
        expected: "actionTagCount within u64".into(),
    })?;
    Ok(EventRecord::ActionExecuted {
        action_tree_root: to_hex(root.as_slice()),
        tag_count,
    })
}

// `*Payload(bytes32 indexed tag, uint256 index, bytes blob)`
fn decode_payload(
    kind: EventKind,
    topics: &[String],
    data: &[u8],
) -> Result<EventRecord, DecodeError> {
    let payload_kind = kind.payload_kind().ok_or_else(|| DecodeError::UnexpectedShape {
        expected: format!("payload event, got {kind}"),
    })?;
    let tag = topic(topics, 1)?;
    let index = word_at(data, 0)?;
    let index = word_to_u64(&index).ok_or_else(|| DecodeError::UnexpectedShape {
        expected: "payload index within u64".into(),
    })?;
    let blob = decode_bytes_at(data, decode_offset(data, WORD_SIZE)?)?;
    Ok(EventRecord::Payload {
        kind: payload_kind,
        tag: to_hex(&tag),
        index,
        blob: to_hex(&blob),
    })
}

// `CommitmentTreeRootAdded(bytes32 root)`
fn decode_root_added(data: &[u8]) -> Result<EventRecord, DecodeError> {
    let root = word_at(data, 0)?;
    Ok(EventRecord::CommitmentTreeRootAdded {
        root: to_hex(root.as_slice()),
    })
}

// `ForwarderCallExecuted(address indexed untrustedForwarder, bytes input, bytes output)`
fn decode_forwarder_call(topics: &[String], data: &[u8]) -> Result<EventRecord, DecodeError> {
    let forwarder = decode_address_from_topic(&topic(topics, 1)?)?;
    let input = decode_bytes_at(data, decode_offset(data, 0)?)?;
    let output = decode_bytes_at(data, decode_offset(data, WORD_SIZE)?)?;
    Ok(EventRecord::ForwarderCallExecuted {
        forwarder: to_hex(forwarder.as_slice()),
        input: to_hex(&input),
        output: to_hex(&output),
    })
}
