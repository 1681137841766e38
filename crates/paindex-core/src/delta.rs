//! `GraphDelta`, the unit of work committed by one ingestion cycle, and
//! `EntityGraph`, the materialised state it is applied to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::{
    Action, CommitmentTreeRoot, ComplianceUnit, DecodeFailure, ForwarderCall, LogicInput, Merge,
    Payload, Resource, Transaction,
};

/// Entity upserts produced by decoding a batch of logs.
///
/// Rows are applied in order with [`Merge`] semantics, so a delta may carry
/// several partial upserts of the same entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDelta {
    pub transactions: Vec<Transaction>,
    pub actions: Vec<Action>,
    pub compliance_units: Vec<ComplianceUnit>,
    pub logic_inputs: Vec<LogicInput>,
    pub resources: Vec<Resource>,
    pub payloads: Vec<Payload>,
    pub commitment_tree_roots: Vec<CommitmentTreeRoot>,
    pub forwarder_calls: Vec<ForwarderCall>,
    pub decode_failures: Vec<DecodeFailure>,
}

impl GraphDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append all rows of `other`.
    pub fn extend(&mut self, other: GraphDelta) {
        self.transactions.extend(other.transactions);
        self.actions.extend(other.actions);
        self.compliance_units.extend(other.compliance_units);
        self.logic_inputs.extend(other.logic_inputs);
        self.resources.extend(other.resources);
        self.payloads.extend(other.payloads);
        self.commitment_tree_roots.extend(other.commitment_tree_roots);
        self.forwarder_calls.extend(other.forwarder_calls);
        self.decode_failures.extend(other.decode_failures);
    }

    /// Total number of upserts across all entity kinds.
    pub fn len(&self) -> usize {
        self.transactions.len()
            + self.actions.len()
            + self.compliance_units.len()
            + self.logic_inputs.len()
            + self.resources.len()
            + self.payloads.len()
            + self.commitment_tree_roots.len()
            + self.forwarder_calls.len()
            + self.decode_failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Materialised entity state keyed by natural key.
///
/// Used by the in-memory store and by tests comparing final states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityGraph {
    pub transactions: BTreeMap<String, Transaction>,
    pub actions: BTreeMap<String, Action>,
    pub compliance_units: BTreeMap<String, ComplianceUnit>,
    pub logic_inputs: BTreeMap<String, LogicInput>,
    pub resources: BTreeMap<String, Resource>,
    pub payloads: BTreeMap<String, Payload>,
    pub commitment_tree_roots: BTreeMap<String, CommitmentTreeRoot>,
    pub forwarder_calls: BTreeMap<String, ForwarderCall>,
    pub decode_failures: BTreeMap<String, DecodeFailure>,
}

fn upsert<T: Merge + Clone>(map: &mut BTreeMap<String, T>, id: String, row: &T) {
    map.entry(id)
        .and_modify(|existing| existing.merge(row))
        .or_insert_with(|| row.clone());
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every upsert of `delta` with merge semantics.
    pub fn apply(&mut self, delta: &GraphDelta) {
        for row in &delta.transactions {
            upsert(&mut self.transactions, row.id(), row);
        }
        for row in &delta.actions {
            upsert(&mut self.actions, row.id(), row);
        }
        for row in &delta.compliance_units {
            upsert(&mut self.compliance_units, row.id(), row);
        }
        for row in &delta.logic_inputs {
            upsert(&mut self.logic_inputs, row.id(), row);
        }
        for row in &delta.resources {
            upsert(&mut self.resources, row.id(), row);
        }
        for row in &delta.payloads {
            upsert(&mut self.payloads, row.id(), row);
        }
        for row in &delta.commitment_tree_roots {
            upsert(&mut self.commitment_tree_roots, row.id(), row);
        }
        for row in &delta.forwarder_calls {
            upsert(&mut self.forwarder_calls, row.id(), row);
        }
        for row in &delta.decode_failures {
            upsert(&mut self.decode_failures, row.id(), row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DecodingStatus;

    #[test]
    fn applying_twice_is_idempotent() {
        let mut delta = GraphDelta::new();
        let mut r = Resource::stub(1, "0xaa");
        r.index = Some(0);
        r.is_consumed = Some(true);
        delta.resources.push(r);
        delta.resources.push(Resource::stub(1, "0xbb"));

        let mut once = EntityGraph::new();
        once.apply(&delta);
        let mut twice = once.clone();
        twice.apply(&delta);

        assert_eq!(once, twice);
        assert_eq!(twice.resources.len(), 2);
    }

    #[test]
    fn duplicate_rows_in_one_delta_merge() {
        let mut delta = GraphDelta::new();
        let mut decoded = Resource::stub(1, "0xaa");
        decoded.decoding_status = DecodingStatus::Success;
        let mut positioned = Resource::stub(1, "0xaa");
        positioned.index = Some(3);
        delta.resources.push(decoded);
        delta.resources.push(positioned);

        let mut graph = EntityGraph::new();
        graph.apply(&delta);
        let r = &graph.resources[&Resource::key(1, "0xaa")];
        assert_eq!(r.index, Some(3));
        assert_eq!(r.decoding_status, DecodingStatus::Success);
    }

    #[test]
    fn delta_len_counts_all_kinds() {
        let mut a = GraphDelta::new();
        a.resources.push(Resource::stub(1, "0x01"));
        let mut b = GraphDelta::new();
        b.resources.push(Resource::stub(1, "0x02"));
        a.extend(b);
        assert_eq!(a.len(), 2);
        assert!(!a.is_empty());
        assert!(GraphDelta::new().is_empty());
    }
}
