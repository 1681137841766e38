//! Per-transaction graph builder.
//!
//! Input: every decoded adapter event of one transaction, plus the decoded
//! `execute` calldata when available. Output: a [`GraphDelta`] of upserts.
//!
//! Resources are never looked up, only upserted. Every place that learns
//! something about a tag (the transaction's tag list, a compliance unit, a
//! logic input, a payload) emits a partial `Resource` row, and the store
//! merges them. Back-links from a resource to its compliance unit and logic
//! input therefore land regardless of which record arrived first.

use paindex_abi::{
    decode_resource_blob, DecodedAction, DecodedLog, DecodedTransaction, EventRecord,
};
use paindex_core::{
    Action, CommitmentTreeRoot, ComplianceUnit, DecodingStatus, ForwarderCall, GraphDelta,
    LogicInput, Payload, PayloadKind, Resource, Transaction,
};
use tracing::debug;

use crate::matching::match_actions;

/// Build the upserts for one transaction.
///
/// `logs` must all belong to the same transaction; their order does not
/// matter.
pub fn build_transaction(
    chain_id: u64,
    logs: &[DecodedLog],
    calldata: Option<&DecodedTransaction>,
) -> GraphDelta {
    let mut delta = GraphDelta::new();
    let Some(first) = logs.first() else {
        return delta;
    };
    let tx_hash = first.meta.tx_hash.as_str();
    let transaction_id = Transaction::key(chain_id, tx_hash);

    let mut ordered: Vec<&DecodedLog> = logs.iter().collect();
    ordered.sort_by_key(|log| log.meta.log_index);

    let mut action_logs = Vec::new();
    for log in &ordered {
        let meta = &log.meta;
        match &log.record {
            EventRecord::TransactionExecuted { tags, logic_refs } => {
                delta.transactions.push(Transaction {
                    chain_id,
                    tx_hash: tx_hash.to_string(),
                    contract_address: meta.contract.clone(),
                    block_number: meta.block_number,
                    timestamp: meta.timestamp,
                    log_index: meta.log_index,
                    tags: tags.clone(),
                    logic_refs: logic_refs.clone(),
                    delta_proof: calldata.map(|c| c.delta_proof.clone()),
                    aggregation_proof: calldata.map(|c| c.aggregation_proof.clone()),
                });
                // Tag Index Convention: even position consumed, odd created.
                for (i, tag) in tags.iter().enumerate() {
                    let mut resource = Resource::stub(chain_id, tag.as_str());
                    resource.index = u32::try_from(i).ok();
                    resource.is_consumed = Some(i % 2 == 0);
                    resource.logic_ref = logic_refs.get(i).cloned();
                    resource.block_number = Some(meta.block_number);
                    resource.transaction_id = Some(transaction_id.clone());
                    delta.resources.push(resource);
                }
            }
            EventRecord::ActionExecuted { .. } => action_logs.push(*log),
            EventRecord::Payload {
                kind,
                tag,
                index,
                blob,
            } => {
                let resource_id = Resource::key(chain_id, tag);
                delta.payloads.push(Payload {
                    chain_id,
                    tx_hash: tx_hash.to_string(),
                    log_index: meta.log_index,
                    block_number: meta.block_number,
                    kind: *kind,
                    tag: tag.clone(),
                    index: *index,
                    blob: blob.clone(),
                    resource_id,
                    transaction_id: transaction_id.clone(),
                });
                let mut resource = payload_resource(chain_id, *kind, tag, blob);
                resource.block_number = Some(meta.block_number);
                resource.transaction_id = Some(transaction_id.clone());
                delta.resources.push(resource);
            }
            EventRecord::CommitmentTreeRootAdded { root } => {
                delta.commitment_tree_roots.push(CommitmentTreeRoot {
                    chain_id,
                    root: root.clone(),
                    block_number: meta.block_number,
                    tx_hash: tx_hash.to_string(),
                    log_index: meta.log_index,
                    timestamp: meta.timestamp,
                });
            }
            EventRecord::ForwarderCallExecuted {
                forwarder,
                input,
                output,
            } => {
                delta.forwarder_calls.push(ForwarderCall {
                    chain_id,
                    tx_hash: tx_hash.to_string(),
                    log_index: meta.log_index,
                    block_number: meta.block_number,
                    forwarder: forwarder.clone(),
                    input: input.clone(),
                    output: output.clone(),
                    transaction_id: transaction_id.clone(),
                });
            }
        }
    }

    let tag_counts: Vec<u64> = action_logs
        .iter()
        .map(|log| match &log.record {
            EventRecord::ActionExecuted { tag_count, .. } => *tag_count,
            _ => 0,
        })
        .collect();
    let decoded_actions = calldata.map(|c| c.actions.as_slice()).unwrap_or(&[]);
    let matches = match_actions(&tag_counts, decoded_actions);

    for (ordinal, (log, matched)) in action_logs.iter().zip(matches).enumerate() {
        let EventRecord::ActionExecuted {
            action_tree_root,
            tag_count,
        } = &log.record
        else {
            continue;
        };
        let action_id = Action::key(chain_id, tx_hash, log.meta.log_index);
        let decoded = matched.and_then(|j| decoded_actions.get(j));
        delta.actions.push(Action {
            chain_id,
            tx_hash: tx_hash.to_string(),
            log_index: log.meta.log_index,
            index: u32::try_from(ordinal).unwrap_or(u32::MAX),
            block_number: log.meta.block_number,
            action_tree_root: action_tree_root.clone(),
            tag_count: *tag_count,
            transaction_id: transaction_id.clone(),
            calldata_matched: decoded.is_some(),
        });
        match decoded {
            Some(action) => {
                attach_action(&mut delta, chain_id, &action_id, &transaction_id, action)
            }
            None if calldata.is_some() => {
                debug!(tx_hash, log_index = log.meta.log_index, "no decoded action left to match")
            }
            None => {}
        }
    }

    delta
}

/// A resource row learnt from a payload event.
fn payload_resource(chain_id: u64, kind: PayloadKind, tag: &str, blob: &str) -> Resource {
    if kind != PayloadKind::Resource {
        return Resource::stub(chain_id, tag);
    }
    match decode_resource_blob(blob) {
        Ok(value) => value.to_resource(chain_id, tag),
        Err(e) => {
            debug!(tag, error = %e, "resource blob did not decode");
            let mut resource = Resource::stub(chain_id, tag);
            resource.decoding_status = DecodingStatus::Failed;
            resource.decoding_error = Some(e.to_string());
            resource
        }
    }
}

/// Compliance units and logic inputs of a matched action, with the resource
/// back-links they imply.
fn attach_action(
    delta: &mut GraphDelta,
    chain_id: u64,
    action_id: &str,
    transaction_id: &str,
    action: &DecodedAction,
) {
    let linked = |tag: &str| {
        let mut resource = Resource::stub(chain_id, tag);
        resource.transaction_id = Some(transaction_id.to_string());
        resource
    };

    for (i, cvi) in action.compliance_verifier_inputs.iter().enumerate() {
        let index = u32::try_from(i).unwrap_or(u32::MAX);
        let unit_id = ComplianceUnit::key(action_id, index);
        delta.compliance_units.push(ComplianceUnit {
            chain_id,
            action_id: action_id.to_string(),
            index,
            consumed_nullifier: cvi.consumed_nullifier.clone(),
            consumed_logic_ref: cvi.consumed_logic_ref.clone(),
            consumed_commitment_tree_root: cvi.consumed_commitment_tree_root.clone(),
            created_commitment: cvi.created_commitment.clone(),
            created_logic_ref: cvi.created_logic_ref.clone(),
            unit_delta_x: cvi.unit_delta_x.clone(),
            unit_delta_y: cvi.unit_delta_y.clone(),
            proof: Some(cvi.proof.clone()),
            consumed_resource_id: Resource::key(chain_id, &cvi.consumed_nullifier),
            created_resource_id: Resource::key(chain_id, &cvi.created_commitment),
        });

        let mut consumed = linked(&cvi.consumed_nullifier);
        consumed.logic_ref = Some(cvi.consumed_logic_ref.clone());
        consumed.compliance_unit_id = Some(unit_id.clone());
        delta.resources.push(consumed);

        let mut created = linked(&cvi.created_commitment);
        created.logic_ref = Some(cvi.created_logic_ref.clone());
        created.compliance_unit_id = Some(unit_id);
        delta.resources.push(created);
    }

    for (i, lvi) in action.logic_verifier_inputs.iter().enumerate() {
        let index = u32::try_from(i).unwrap_or(u32::MAX);
        let input_id = LogicInput::key(action_id, index);
        let count = |list: &[paindex_abi::ExpirableBlob]| u32::try_from(list.len()).unwrap_or(u32::MAX);
        delta.logic_inputs.push(LogicInput {
            chain_id,
            action_id: action_id.to_string(),
            index,
            tag: lvi.tag.clone(),
            verifying_key: lvi.verifying_key.clone(),
            is_consumed: i % 2 == 0,
            resource_payload_count: count(&lvi.app_data.resource_payload),
            discovery_payload_count: count(&lvi.app_data.discovery_payload),
            external_payload_count: count(&lvi.app_data.external_payload),
            application_payload_count: count(&lvi.app_data.application_payload),
            proof: Some(lvi.proof.clone()),
            resource_id: Resource::key(chain_id, &lvi.tag),
        });

        let mut resource = linked(&lvi.tag);
        resource.logic_input_id = Some(input_id);
        delta.resources.push(resource);
    }
}
