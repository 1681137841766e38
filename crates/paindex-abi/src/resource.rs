//! Resource blobs carried by `ResourcePayload` events.
//!
//! The blob is the ABI encoding of the static resource struct:
//!
//! ```text
//! (bytes32 logicRef, bytes32 labelRef, uint128 quantity, bytes32 valueRef,
//!  bool ephemeral, bytes32 nonce, bytes32 nullifierKeyCommitment, bytes32 randSeed)
//! ```
//!
//! Eight head words, no tail. Trailing bytes are ignored.

use alloy_primitives::{B256, U256};
use paindex_core::{DecodingStatus, Resource};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::primitives::{decode_hex, to_hex, word_at, WORD_SIZE};

const RESOURCE_WORDS: usize = 8;

/// Decoded value fields of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceValue {
    pub logic_ref: String,
    pub label_ref: String,
    /// Decimal rendering of the `uint128` quantity.
    pub quantity: String,
    pub value_ref: String,
    pub ephemeral: bool,
    pub nonce: String,
    pub nullifier_key_commitment: String,
    pub rand_seed: String,
}

impl ResourceValue {
    /// A resource row carrying these fields with `decodingStatus = success`.
    pub fn to_resource(&self, chain_id: u64, tag: &str) -> Resource {
        let mut resource = Resource::stub(chain_id, tag);
        resource.logic_ref = Some(self.logic_ref.clone());
        resource.label_ref = Some(self.label_ref.clone());
        resource.quantity = Some(self.quantity.clone());
        resource.value_ref = Some(self.value_ref.clone());
        resource.ephemeral = Some(self.ephemeral);
        resource.nonce = Some(self.nonce.clone());
        resource.nullifier_key_commitment = Some(self.nullifier_key_commitment.clone());
        resource.rand_seed = Some(self.rand_seed.clone());
        resource.decoding_status = DecodingStatus::Success;
        resource
    }
}

/// Decode a resource blob given as `0x…` hex.
pub fn decode_resource_blob(blob: &str) -> Result<ResourceValue, DecodeError> {
    let bytes = decode_hex(blob)?;
    let needed = RESOURCE_WORDS * WORD_SIZE;
    if bytes.len() < needed {
        return Err(DecodeError::InsufficientData {
            needed,
            available: bytes.len(),
        });
    }
    let word = |i: usize| word_at(&bytes, i * WORD_SIZE);
    let hex_word = |w: B256| to_hex(w.as_slice());

    let quantity = word(2)?;
    if quantity.as_slice()[..16].iter().any(|b| *b != 0) {
        return Err(DecodeError::UnexpectedShape {
            expected: "quantity within uint128".into(),
        });
    }
    let ephemeral = match U256::from_be_bytes(word(4)?.0) {
        v if v.is_zero() => false,
        v if v == U256::from(1u8) => true,
        _ => {
            return Err(DecodeError::UnexpectedShape {
                expected: "ephemeral bool word of 0 or 1".into(),
            })
        }
    };

    Ok(ResourceValue {
        logic_ref: hex_word(word(0)?),
        label_ref: hex_word(word(1)?),
        quantity: U256::from_be_bytes(quantity.0).to_string(),
        value_ref: hex_word(word(3)?),
        ephemeral,
        nonce: hex_word(word(5)?),
        nullifier_key_commitment: hex_word(word(6)?),
        rand_seed: hex_word(word(7)?),
    })
}
