//! `execute(Transaction)` calldata decoder.
//!
//! # How it works
//! - First 4 bytes of calldata = keccak256(signature)[:4] (the selector)
//! - Remaining bytes = ABI-encoded `(Transaction)` parameter tuple
//!
//! The transaction is a deeply nested tuple of dynamic arrays, so the
//! head/tail walk is delegated to `alloy-core`'s dyn-abi decoder and the
//! resulting [`DynSolValue`] tree is mapped onto typed structs.
//!
//! ```text
//! Transaction             = (Action[] actions, bytes deltaProof, bytes aggregationProof)
//! Action                  = (LogicVerifierInput[], ComplianceVerifierInput[])
//! LogicVerifierInput      = (bytes32 tag, bytes32 verifyingKey, AppData, bytes proof)
//! AppData                 = 4 × ExpirableBlob[]  (resource, discovery, external, application)
//! ExpirableBlob           = (uint8 deletionCriterion, bytes blob)
//! ComplianceVerifierInput = (bytes proof, Instance)
//! Instance                = ((nullifier, logicRef, commitmentTreeRoot),
//!                            (commitment, logicRef), unitDeltaX, unitDeltaY)
//! ```

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::classifier::keccak256_signature;
use crate::error::DecodeError;
use crate::primitives::{decode_hex, to_hex};

/// Canonical signature of the adapter's entry point.
pub const EXECUTE_SIGNATURE: &str = "execute((((bytes32,bytes32,((uint8,bytes)[],(uint8,bytes)[],(uint8,bytes)[],(uint8,bytes)[]),bytes)[],(bytes,((bytes32,bytes32,bytes32),(bytes32,bytes32),bytes32,bytes32))[])[],bytes,bytes))";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirableBlob {
    pub deletion_criterion: u8,
    pub blob: String,
}

/// The four application-defined payload lists of a logic input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    pub resource_payload: Vec<ExpirableBlob>,
    pub discovery_payload: Vec<ExpirableBlob>,
    pub external_payload: Vec<ExpirableBlob>,
    pub application_payload: Vec<ExpirableBlob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicVerifierInput {
    pub tag: String,
    pub verifying_key: String,
    pub app_data: AppData,
    pub proof: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerifierInput {
    pub proof: String,
    pub consumed_nullifier: String,
    pub consumed_logic_ref: String,
    pub consumed_commitment_tree_root: String,
    pub created_commitment: String,
    pub created_logic_ref: String,
    pub unit_delta_x: String,
    pub unit_delta_y: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedAction {
    pub logic_verifier_inputs: Vec<LogicVerifierInput>,
    pub compliance_verifier_inputs: Vec<ComplianceVerifierInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedTransaction {
    pub actions: Vec<DecodedAction>,
    pub delta_proof: String,
    pub aggregation_proof: String,
}

/// Decoder for the adapter's `execute` calldata.
#[derive(Debug, Clone)]
pub struct CalldataDecoder {
    params: DynSolType,
    selector: [u8; 4],
}

impl CalldataDecoder {
    pub fn new() -> Self {
        let hash = keccak256_signature(EXECUTE_SIGNATURE);
        let mut selector = [0u8; 4];
        // keccak256_signature always yields 0x + 64 hex chars
        if let Ok(bytes) = hex::decode(&hash[2..10]) {
            selector.copy_from_slice(&bytes);
        }
        Self {
            params: DynSolType::Tuple(vec![transaction_type()]),
            selector,
        }
    }

    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    /// Decode raw calldata.
    ///
    /// Returns `Ok(None)` when the input is not an `execute` call (other
    /// functions share the block range and are ignored).
    pub fn decode(&self, calldata: &[u8]) -> Result<Option<DecodedTransaction>, DecodeError> {
        match self.decode_strict(calldata) {
            Ok(tx) => Ok(Some(tx)),
            Err(DecodeError::UnknownSelector(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Decode hex calldata (`0x…`).
    pub fn decode_hex(&self, calldata: &str) -> Result<Option<DecodedTransaction>, DecodeError> {
        self.decode(&decode_hex(calldata)?)
    }

    /// Like [`decode`](Self::decode) but a selector mismatch is an error.
    pub fn decode_strict(&self, calldata: &[u8]) -> Result<DecodedTransaction, DecodeError> {
        if calldata.len() < 4 || calldata[..4] != self.selector {
            let prefix = &calldata[..calldata.len().min(4)];
            return Err(DecodeError::UnknownSelector(hex::encode(prefix)));
        }
        let decoded = self
            .params
            .abi_decode_params(&calldata[4..])
            .map_err(|e| DecodeError::Abi(format!("execute input decode: {e}")))?;
        let mut params = into_tuple(decoded, 1, "execute params")?;
        transaction_from(params.remove(0))
    }
}

impl Default for CalldataDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Type tree ───────────────────────────────────────────────────────────────

fn bytes32() -> DynSolType {
    DynSolType::FixedBytes(32)
}

fn array(inner: DynSolType) -> DynSolType {
    DynSolType::Array(Box::new(inner))
}

pub(crate) fn transaction_type() -> DynSolType {
    let expirable_blob = DynSolType::Tuple(vec![DynSolType::Uint(8), DynSolType::Bytes]);
    let app_data = DynSolType::Tuple(vec![array(expirable_blob); 4]);
    let logic_input = DynSolType::Tuple(vec![bytes32(), bytes32(), app_data, DynSolType::Bytes]);
    let instance = DynSolType::Tuple(vec![
        DynSolType::Tuple(vec![bytes32(), bytes32(), bytes32()]),
        DynSolType::Tuple(vec![bytes32(), bytes32()]),
        bytes32(),
        bytes32(),
    ]);
    let compliance_input = DynSolType::Tuple(vec![DynSolType::Bytes, instance]);
    let action = DynSolType::Tuple(vec![array(logic_input), array(compliance_input)]);
    DynSolType::Tuple(vec![array(action), DynSolType::Bytes, DynSolType::Bytes])
}

// ─── Value tree → typed structs ─────────────────────────────────────────────

fn shape(expected: &str) -> DecodeError {
    DecodeError::UnexpectedShape {
        expected: expected.to_string(),
    }
}

fn into_tuple(value: DynSolValue, arity: usize, what: &str) -> Result<Vec<DynSolValue>, DecodeError> {
    match value {
        DynSolValue::Tuple(fields) if fields.len() == arity => Ok(fields),
        _ => Err(shape(&format!("{what}: tuple of {arity}"))),
    }
}

fn into_array(value: DynSolValue, what: &str) -> Result<Vec<DynSolValue>, DecodeError> {
    match value {
        DynSolValue::Array(items) => Ok(items),
        _ => Err(shape(&format!("{what}: array"))),
    }
}

fn into_word(value: DynSolValue, what: &str) -> Result<String, DecodeError> {
    match value {
        DynSolValue::FixedBytes(word, 32) => Ok(to_hex(word.as_slice())),
        _ => Err(shape(&format!("{what}: bytes32"))),
    }
}

fn into_bytes(value: DynSolValue, what: &str) -> Result<String, DecodeError> {
    match value {
        DynSolValue::Bytes(bytes) => Ok(to_hex(&bytes)),
        _ => Err(shape(&format!("{what}: bytes"))),
    }
}

fn into_u8(value: DynSolValue, what: &str) -> Result<u8, DecodeError> {
    match value {
        DynSolValue::Uint(v, _) if v <= U256::from(u8::MAX) => Ok(v.to::<u8>()),
        _ => Err(shape(&format!("{what}: uint8"))),
    }
}

fn transaction_from(value: DynSolValue) -> Result<DecodedTransaction, DecodeError> {
    let mut it = into_tuple(value, 3, "Transaction")?.into_iter();
    let (actions, delta, aggregation) = (next(&mut it)?, next(&mut it)?, next(&mut it)?);
    Ok(DecodedTransaction {
        actions: into_array(actions, "actions")?
            .into_iter()
            .map(action_from)
            .collect::<Result<_, _>>()?,
        delta_proof: into_bytes(delta, "deltaProof")?,
        aggregation_proof: into_bytes(aggregation, "aggregationProof")?,
    })
}

fn action_from(value: DynSolValue) -> Result<DecodedAction, DecodeError> {
    let mut it = into_tuple(value, 2, "Action")?.into_iter();
    let (logic, compliance) = (next(&mut it)?, next(&mut it)?);
    Ok(DecodedAction {
        logic_verifier_inputs: into_array(logic, "logicVerifierInputs")?
            .into_iter()
            .map(logic_input_from)
            .collect::<Result<_, _>>()?,
        compliance_verifier_inputs: into_array(compliance, "complianceVerifierInputs")?
            .into_iter()
            .map(compliance_input_from)
            .collect::<Result<_, _>>()?,
    })
}

fn logic_input_from(value: DynSolValue) -> Result<LogicVerifierInput, DecodeError> {
    let mut it = into_tuple(value, 4, "LogicVerifierInput")?.into_iter();
    let (tag, key, app_data, proof) =
        (next(&mut it)?, next(&mut it)?, next(&mut it)?, next(&mut it)?);
    Ok(LogicVerifierInput {
        tag: into_word(tag, "tag")?,
        verifying_key: into_word(key, "verifyingKey")?,
        app_data: app_data_from(app_data)?,
        proof: into_bytes(proof, "proof")?,
    })
}

fn app_data_from(value: DynSolValue) -> Result<AppData, DecodeError> {
    let mut lists = into_tuple(value, 4, "AppData")?
        .into_iter()
        .map(|list| {
            into_array(list, "payload list")?
                .into_iter()
                .map(blob_from)
                .collect::<Result<Vec<_>, _>>()
        });
    let mut take = || lists.next().unwrap_or_else(|| Ok(Vec::new()));
    Ok(AppData {
        resource_payload: take()?,
        discovery_payload: take()?,
        external_payload: take()?,
        application_payload: take()?,
    })
}

fn blob_from(value: DynSolValue) -> Result<ExpirableBlob, DecodeError> {
    let mut it = into_tuple(value, 2, "ExpirableBlob")?.into_iter();
    let (criterion, blob) = (next(&mut it)?, next(&mut it)?);
    Ok(ExpirableBlob {
        deletion_criterion: into_u8(criterion, "deletionCriterion")?,
        blob: into_bytes(blob, "blob")?,
    })
}

fn compliance_input_from(value: DynSolValue) -> Result<ComplianceVerifierInput, DecodeError> {
    let mut it = into_tuple(value, 2, "ComplianceVerifierInput")?.into_iter();
    let (proof, instance) = (next(&mut it)?, next(&mut it)?);

    let mut inst = into_tuple(instance, 4, "Instance")?.into_iter();
    let (consumed, created, dx, dy) =
        (next(&mut inst)?, next(&mut inst)?, next(&mut inst)?, next(&mut inst)?);

    let mut consumed = into_tuple(consumed, 3, "ConsumedRefs")?.into_iter();
    let mut created = into_tuple(created, 2, "CreatedRefs")?.into_iter();

    Ok(ComplianceVerifierInput {
        proof: into_bytes(proof, "proof")?,
        consumed_nullifier: into_word(next(&mut consumed)?, "nullifier")?,
        consumed_logic_ref: into_word(next(&mut consumed)?, "logicRef")?,
        consumed_commitment_tree_root: into_word(next(&mut consumed)?, "commitmentTreeRoot")?,
        created_commitment: into_word(next(&mut created)?, "commitment")?,
        created_logic_ref: into_word(next(&mut created)?, "logicRef")?,
        unit_delta_x: into_word(dx, "unitDeltaX")?,
        unit_delta_y: into_word(dy, "unitDeltaY")?,
    })
}

fn next(it: &mut impl Iterator<Item = DynSolValue>) -> Result<DynSolValue, DecodeError> {
    it.next().ok_or_else(|| shape("another tuple field"))
}
