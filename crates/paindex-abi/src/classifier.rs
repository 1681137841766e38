//! Event classification by signature hash.
//!
//! topic[0] of every non-anonymous EVM log is keccak256 of the canonical
//! event signature, e.g.
//!   keccak256("CommitmentTreeRootAdded(bytes32)")
//!   → 0x0a2dc548ed950accb40d5d78541f3954c5e182a8ecf19e581a4f2263f61f59d2

use std::collections::HashMap;

use paindex_core::{normalize_hex, PayloadKind};
use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

/// Compute the keccak256 hash of an ABI signature as a `0x…` hex string.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

/// Events emitted by the protocol adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TransactionExecuted,
    ActionExecuted,
    ForwarderCallExecuted,
    ResourcePayload,
    DiscoveryPayload,
    ExternalPayload,
    ApplicationPayload,
    CommitmentTreeRootAdded,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::TransactionExecuted,
        EventKind::ActionExecuted,
        EventKind::ForwarderCallExecuted,
        EventKind::ResourcePayload,
        EventKind::DiscoveryPayload,
        EventKind::ExternalPayload,
        EventKind::ApplicationPayload,
        EventKind::CommitmentTreeRootAdded,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TransactionExecuted => "TransactionExecuted",
            Self::ActionExecuted => "ActionExecuted",
            Self::ForwarderCallExecuted => "ForwarderCallExecuted",
            Self::ResourcePayload => "ResourcePayload",
            Self::DiscoveryPayload => "DiscoveryPayload",
            Self::ExternalPayload => "ExternalPayload",
            Self::ApplicationPayload => "ApplicationPayload",
            Self::CommitmentTreeRootAdded => "CommitmentTreeRootAdded",
        }
    }

    /// Canonical ABI signature (indexed-ness does not change it).
    pub fn signature(&self) -> &'static str {
        match self {
            Self::TransactionExecuted => "TransactionExecuted(bytes32[],bytes32[])",
            Self::ActionExecuted => "ActionExecuted(bytes32,uint256)",
            Self::ForwarderCallExecuted => "ForwarderCallExecuted(address,bytes,bytes)",
            Self::ResourcePayload => "ResourcePayload(bytes32,uint256,bytes)",
            Self::DiscoveryPayload => "DiscoveryPayload(bytes32,uint256,bytes)",
            Self::ExternalPayload => "ExternalPayload(bytes32,uint256,bytes)",
            Self::ApplicationPayload => "ApplicationPayload(bytes32,uint256,bytes)",
            Self::CommitmentTreeRootAdded => "CommitmentTreeRootAdded(bytes32)",
        }
    }

    /// The payload stream this event belongs to, for the four `*Payload` events.
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        match self {
            Self::ResourcePayload => Some(PayloadKind::Resource),
            Self::DiscoveryPayload => Some(PayloadKind::Discovery),
            Self::ExternalPayload => Some(PayloadKind::External),
            Self::ApplicationPayload => Some(PayloadKind::Application),
            _ => None,
        }
    }

    pub fn topic0(&self) -> String {
        keccak256_signature(self.signature())
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed lookup table topic0 → [`EventKind`].
#[derive(Debug, Clone)]
pub struct EventClassifier {
    by_topic: HashMap<String, EventKind>,
}

impl EventClassifier {
    pub fn new() -> Self {
        let by_topic = EventKind::ALL
            .iter()
            .map(|kind| (kind.topic0(), *kind))
            .collect();
        Self { by_topic }
    }

    /// Classify a log by its first topic. Comparison ignores hex case.
    ///
    /// `None` means the log is not one of ours and should be dropped.
    pub fn classify(&self, topic0: &str) -> Option<EventKind> {
        self.by_topic.get(&normalize_hex(topic0)).copied()
    }

    /// All known topic hashes, for the `eth_getLogs` topic filter.
    pub fn topics(&self) -> Vec<String> {
        EventKind::ALL.iter().map(EventKind::topic0).collect()
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new()
    }
}
