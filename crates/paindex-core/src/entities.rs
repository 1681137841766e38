//! The normalized entity graph and its merge rules.
//!
//! Entities are created the first time any record references them and are
//! enriched by later records. [`Merge::merge`] is the only way an existing
//! entity changes: it fills absent fields, and only the fields sourced from
//! `TransactionExecuted` (`index`, `is_consumed` on [`Resource`]) may be
//! overwritten. Merging the same value twice is a no-op, which is what makes
//! re-processing a block range idempotent.

use serde::{Deserialize, Serialize};

/// Enrich `self` with the information carried by `incoming`.
pub trait Merge {
    fn merge(&mut self, incoming: &Self);
}

/// Fill an empty slot; never clear or replace a known value.
fn fill<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if slot.is_none() {
        if let Some(v) = incoming {
            *slot = Some(v.clone());
        }
    }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// One per `TransactionExecuted` event. Keyed by (chainId, txHash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub chain_id: u64,
    pub tx_hash: String,
    pub contract_address: String,
    pub block_number: u64,
    pub timestamp: Option<i64>,
    /// Log index of the `TransactionExecuted` event.
    pub log_index: u32,
    pub tags: Vec<String>,
    pub logic_refs: Vec<String>,
    /// Only known when the calldata decoded.
    pub delta_proof: Option<String>,
    pub aggregation_proof: Option<String>,
}

impl Transaction {
    pub fn key(chain_id: u64, tx_hash: &str) -> String {
        format!("{chain_id}_{tx_hash}")
    }

    pub fn id(&self) -> String {
        Self::key(self.chain_id, &self.tx_hash)
    }
}

impl Merge for Transaction {
    fn merge(&mut self, incoming: &Self) {
        if !incoming.tags.is_empty() {
            self.tags = incoming.tags.clone();
            self.logic_refs = incoming.logic_refs.clone();
        }
        self.block_number = incoming.block_number;
        self.log_index = incoming.log_index;
        fill(&mut self.timestamp, &incoming.timestamp);
        fill(&mut self.delta_proof, &incoming.delta_proof);
        fill(&mut self.aggregation_proof, &incoming.aggregation_proof);
    }
}

// ─── Action ──────────────────────────────────────────────────────────────────

/// One per `ActionExecuted` event. Keyed by (chainId, txHash, logIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub chain_id: u64,
    pub tx_hash: String,
    pub log_index: u32,
    /// Ordinal among the transaction's `ActionExecuted` events.
    pub index: u32,
    pub block_number: u64,
    pub action_tree_root: String,
    pub tag_count: u64,
    pub transaction_id: String,
    /// `true` once compliance units and logic inputs have been attached.
    pub calldata_matched: bool,
}

impl Action {
    pub fn key(chain_id: u64, tx_hash: &str, log_index: u32) -> String {
        format!("{chain_id}_{tx_hash}_{log_index}")
    }

    pub fn id(&self) -> String {
        Self::key(self.chain_id, &self.tx_hash, self.log_index)
    }
}

impl Merge for Action {
    fn merge(&mut self, incoming: &Self) {
        self.index = incoming.index;
        self.calldata_matched |= incoming.calldata_matched;
    }
}

// ─── ComplianceUnit ──────────────────────────────────────────────────────────

/// Derived from calldata. Pairs one consumed and one created resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceUnit {
    pub chain_id: u64,
    pub action_id: String,
    pub index: u32,
    pub consumed_nullifier: String,
    pub consumed_logic_ref: String,
    pub consumed_commitment_tree_root: String,
    pub created_commitment: String,
    pub created_logic_ref: String,
    pub unit_delta_x: String,
    pub unit_delta_y: String,
    pub proof: Option<String>,
    pub consumed_resource_id: String,
    pub created_resource_id: String,
}

impl ComplianceUnit {
    pub fn key(action_id: &str, index: u32) -> String {
        format!("{action_id}_cu_{index}")
    }

    pub fn id(&self) -> String {
        Self::key(&self.action_id, self.index)
    }
}

impl Merge for ComplianceUnit {
    fn merge(&mut self, incoming: &Self) {
        fill(&mut self.proof, &incoming.proof);
    }
}

// ─── LogicInput ──────────────────────────────────────────────────────────────

/// Derived from calldata. One per resource touched by an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicInput {
    pub chain_id: u64,
    pub action_id: String,
    pub index: u32,
    pub tag: String,
    pub verifying_key: String,
    /// Even position among the action's logic inputs.
    pub is_consumed: bool,
    pub resource_payload_count: u32,
    pub discovery_payload_count: u32,
    pub external_payload_count: u32,
    pub application_payload_count: u32,
    pub proof: Option<String>,
    pub resource_id: String,
}

impl LogicInput {
    pub fn key(action_id: &str, index: u32) -> String {
        format!("{action_id}_li_{index}")
    }

    pub fn id(&self) -> String {
        Self::key(&self.action_id, self.index)
    }
}

impl Merge for LogicInput {
    fn merge(&mut self, incoming: &Self) {
        fill(&mut self.proof, &incoming.proof);
    }
}

// ─── Resource ────────────────────────────────────────────────────────────────

/// Progress of decoding a resource's value fields from its payload blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecodingStatus {
    #[default]
    Pending,
    Failed,
    Success,
}

impl DecodingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Success => "success",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for DecodingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic state unit. Keyed by (chainId, tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub chain_id: u64,
    pub tag: String,
    /// Position within the transaction's tag list.
    pub index: Option<u32>,
    pub is_consumed: Option<bool>,
    pub block_number: Option<u64>,
    pub logic_ref: Option<String>,
    pub label_ref: Option<String>,
    pub value_ref: Option<String>,
    pub nullifier_key_commitment: Option<String>,
    pub nonce: Option<String>,
    pub rand_seed: Option<String>,
    /// Decimal string; the on-chain field is wider than u64.
    pub quantity: Option<String>,
    pub ephemeral: Option<bool>,
    pub decoding_status: DecodingStatus,
    pub decoding_error: Option<String>,
    pub transaction_id: Option<String>,
    pub compliance_unit_id: Option<String>,
    pub logic_input_id: Option<String>,
}

impl Resource {
    pub fn key(chain_id: u64, tag: &str) -> String {
        format!("{chain_id}_{tag}")
    }

    pub fn id(&self) -> String {
        Self::key(self.chain_id, &self.tag)
    }

    /// A resource known only by its tag.
    pub fn stub(chain_id: u64, tag: impl Into<String>) -> Self {
        Self {
            chain_id,
            tag: tag.into(),
            index: None,
            is_consumed: None,
            block_number: None,
            logic_ref: None,
            label_ref: None,
            value_ref: None,
            nullifier_key_commitment: None,
            nonce: None,
            rand_seed: None,
            quantity: None,
            ephemeral: None,
            decoding_status: DecodingStatus::Pending,
            decoding_error: None,
            transaction_id: None,
            compliance_unit_id: None,
            logic_input_id: None,
        }
    }
}

impl Merge for Resource {
    fn merge(&mut self, incoming: &Self) {
        // TransactionExecuted is authoritative for position and parity.
        if incoming.index.is_some() {
            self.index = incoming.index;
        }
        if incoming.is_consumed.is_some() {
            self.is_consumed = incoming.is_consumed;
        }

        if incoming.decoding_status > self.decoding_status {
            self.decoding_status = incoming.decoding_status;
            self.decoding_error = incoming.decoding_error.clone();
        }

        fill(&mut self.block_number, &incoming.block_number);
        fill(&mut self.logic_ref, &incoming.logic_ref);
        fill(&mut self.label_ref, &incoming.label_ref);
        fill(&mut self.value_ref, &incoming.value_ref);
        fill(&mut self.nullifier_key_commitment, &incoming.nullifier_key_commitment);
        fill(&mut self.nonce, &incoming.nonce);
        fill(&mut self.rand_seed, &incoming.rand_seed);
        fill(&mut self.quantity, &incoming.quantity);
        fill(&mut self.ephemeral, &incoming.ephemeral);
        fill(&mut self.transaction_id, &incoming.transaction_id);
        fill(&mut self.compliance_unit_id, &incoming.compliance_unit_id);
        fill(&mut self.logic_input_id, &incoming.logic_input_id);
    }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Resource,
    Discovery,
    External,
    Application,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Discovery => "discovery",
            Self::External => "external",
            Self::Application => "application",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "resource" => Some(Self::Resource),
            "discovery" => Some(Self::Discovery),
            "external" => Some(Self::External),
            "application" => Some(Self::Application),
            _ => None,
        }
    }
}

/// One per payload event. Keyed by (chainId, txHash, logIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub chain_id: u64,
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    pub kind: PayloadKind,
    pub tag: String,
    /// Position within the resource's payload stream of this kind.
    pub index: u64,
    pub blob: String,
    pub resource_id: String,
    pub transaction_id: String,
}

impl Payload {
    pub fn key(chain_id: u64, tx_hash: &str, log_index: u32) -> String {
        format!("{chain_id}_{tx_hash}_{log_index}")
    }

    pub fn id(&self) -> String {
        Self::key(self.chain_id, &self.tx_hash, self.log_index)
    }
}

impl Merge for Payload {
    fn merge(&mut self, _incoming: &Self) {}
}

// ─── CommitmentTreeRoot ──────────────────────────────────────────────────────

/// One per `CommitmentTreeRootAdded` event. Keyed by (chainId, root).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentTreeRoot {
    pub chain_id: u64,
    pub root: String,
    pub block_number: u64,
    pub tx_hash: String,
    pub log_index: u32,
    pub timestamp: Option<i64>,
}

impl CommitmentTreeRoot {
    pub fn key(chain_id: u64, root: &str) -> String {
        format!("{chain_id}_{root}")
    }

    pub fn id(&self) -> String {
        Self::key(self.chain_id, &self.root)
    }
}

impl Merge for CommitmentTreeRoot {
    fn merge(&mut self, incoming: &Self) {
        fill(&mut self.timestamp, &incoming.timestamp);
    }
}

// ─── ForwarderCall ───────────────────────────────────────────────────────────

/// One per `ForwarderCallExecuted` event. Keyed by (chainId, txHash, logIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwarderCall {
    pub chain_id: u64,
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    pub forwarder: String,
    pub input: String,
    pub output: String,
    pub transaction_id: String,
}

impl ForwarderCall {
    pub fn key(chain_id: u64, tx_hash: &str, log_index: u32) -> String {
        format!("{chain_id}_{tx_hash}_{log_index}")
    }

    pub fn id(&self) -> String {
        Self::key(self.chain_id, &self.tx_hash, self.log_index)
    }
}

impl Merge for ForwarderCall {
    fn merge(&mut self, _incoming: &Self) {}
}

// ─── DecodeFailure ───────────────────────────────────────────────────────────

/// What was being decoded when a [`DecodeFailure`] was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureSource {
    /// An event log of the named kind.
    Event(String),
    /// The enclosing transaction's `execute` calldata.
    Calldata,
}

impl FailureSource {
    pub fn label(&self) -> &str {
        match self {
            Self::Event(kind) => kind,
            Self::Calldata => "calldata",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "calldata" => Self::Calldata,
            kind => Self::Event(kind.to_string()),
        }
    }
}

/// A record that could not be decoded, kept with its raw form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeFailure {
    pub chain_id: u64,
    pub tx_hash: String,
    pub log_index: u32,
    pub block_number: u64,
    pub source: FailureSource,
    pub reason: String,
    pub topics: Vec<String>,
    pub data: String,
}

impl DecodeFailure {
    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.chain_id,
            self.tx_hash,
            self.log_index,
            self.source.label()
        )
    }
}

impl Merge for DecodeFailure {
    fn merge(&mut self, incoming: &Self) {
        self.reason = incoming.reason.clone();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
