//! Solidity ABI primitives.
//!
//! An ABI parameter block is a sequence of 32-byte words. Static values sit
//! in the head directly; dynamic values are referenced by a big-endian offset
//! (relative to the start of the block) pointing at a tail that starts with a
//! 32-byte length followed by the content:
//!
//! ```text
//! head:  [offset_a][offset_b]
//! tail:  [len_a][a_0]..[a_n]  [len_b][b_0]..[b_m]
//! ```

use alloy_primitives::{Address, B256, U256};

use crate::error::DecodeError;

pub const WORD_SIZE: usize = 32;

/// Decode a hex string (with or without `0x`) to bytes.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, DecodeError> {
    let body = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    Ok(hex::decode(body)?)
}

/// Lowercase `0x…` rendering used for every identifier leaving this crate.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Read the first word of `buf`.
pub fn decode_word(buf: &[u8]) -> Result<B256, DecodeError> {
    if buf.len() < WORD_SIZE {
        return Err(DecodeError::InsufficientData {
            needed: WORD_SIZE,
            available: buf.len(),
        });
    }
    Ok(B256::from_slice(&buf[..WORD_SIZE]))
}

/// Read the word starting at byte `pos`.
pub fn word_at(buf: &[u8], pos: usize) -> Result<B256, DecodeError> {
    let end = pos.checked_add(WORD_SIZE).ok_or(DecodeError::InvalidOffset {
        offset: pos,
        len: buf.len(),
    })?;
    if end > buf.len() {
        return Err(DecodeError::InsufficientData {
            needed: end,
            available: buf.len(),
        });
    }
    decode_word(&buf[pos..])
}

/// Interpret a word as a big-endian integer that fits in `u64`.
pub fn word_to_u64(word: &B256) -> Option<u64> {
    let bytes = word.as_slice();
    if bytes[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&bytes[24..]);
    Some(u64::from_be_bytes(low))
}

fn word_to_usize(word: &B256) -> Option<usize> {
    word_to_u64(word).and_then(|v| usize::try_from(v).ok())
}

/// Read the offset word at head position `pos` and validate it against `buf`.
pub fn decode_offset(buf: &[u8], pos: usize) -> Result<usize, DecodeError> {
    let word = word_at(buf, pos)?;
    match word_to_usize(&word) {
        Some(offset) if offset < buf.len() => Ok(offset),
        Some(offset) => Err(DecodeError::InvalidOffset {
            offset,
            len: buf.len(),
        }),
        None => Err(DecodeError::InvalidOffset {
            offset: usize::MAX,
            len: buf.len(),
        }),
    }
}

/// Read a length word at `offset` and check that `len * elem_size` bytes follow.
fn tail_length(buf: &[u8], offset: usize, elem_size: usize) -> Result<(usize, usize), DecodeError> {
    if offset >= buf.len() {
        return Err(DecodeError::InvalidOffset {
            offset,
            len: buf.len(),
        });
    }
    let len_word = word_at(buf, offset)?;
    let malformed = || DecodeError::MalformedArray {
        offset,
        declared: U256::from_be_bytes(len_word.0).to_string(),
    };
    let declared = word_to_usize(&len_word).ok_or_else(malformed)?;
    let start = offset + WORD_SIZE;
    let end = declared
        .checked_mul(elem_size)
        .and_then(|n| n.checked_add(start))
        .ok_or_else(malformed)?;
    if end > buf.len() {
        return Err(malformed());
    }
    Ok((declared, start))
}

/// Decode a dynamic `bytes32[]` whose tail starts at `offset`.
pub fn decode_word_array_at(buf: &[u8], offset: usize) -> Result<Vec<B256>, DecodeError> {
    let (len, start) = tail_length(buf, offset, WORD_SIZE)?;
    (0..len)
        .map(|i| word_at(buf, start + i * WORD_SIZE))
        .collect()
}

/// Decode a dynamic `bytes` whose tail starts at `offset`.
pub fn decode_bytes_at(buf: &[u8], offset: usize) -> Result<Vec<u8>, DecodeError> {
    let (len, start) = tail_length(buf, offset, 1)?;
    Ok(buf[start..start + len].to_vec())
}

/// An indexed address: the low 20 bytes of the topic word.
///
/// The 12 high bytes are zero padding on-chain; they are not validated.
pub fn decode_address_from_topic(topic: &[u8]) -> Result<Address, DecodeError> {
    let word = decode_word(topic)?;
    Ok(Address::from_slice(&word.as_slice()[12..]))
}

/// Parse a `0x…` topic string into a word.
pub fn parse_topic(topic: &str) -> Result<B256, DecodeError> {
    let bytes = decode_hex(topic)?;
    if bytes.len() != WORD_SIZE {
        return Err(DecodeError::InsufficientData {
            needed: WORD_SIZE,
            available: bytes.len(),
        });
    }
    Ok(B256::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::dyn_abi::DynSolValue;

    fn word(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    fn uint_word(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    #[test]
    fn decode_word_needs_32_bytes() {
        assert!(matches!(
            decode_word(&[0u8; 31]),
            Err(DecodeError::InsufficientData { needed: 32, available: 31 })
        ));
        assert_eq!(decode_word(&word(7)).unwrap(), B256::from(word(7)));
    }

    #[test]
    fn two_array_layout_follows_offsets() {
        // offset1 = 0x40, offset2 = 0xa0, with an unused word at 0x80.
        let tag_a = word(0xaa);
        let ref_a = word(0xbb);
        let mut buf = Vec::new();
        buf.extend_from_slice(&uint_word(0x40));
        buf.extend_from_slice(&uint_word(0xa0));
        buf.extend_from_slice(&uint_word(1));
        buf.extend_from_slice(&tag_a);
        buf.extend_from_slice(&[0u8; 32]);
        buf.extend_from_slice(&uint_word(1));
        buf.extend_from_slice(&ref_a);

        let tags = decode_word_array_at(&buf, decode_offset(&buf, 0).unwrap()).unwrap();
        let refs = decode_word_array_at(&buf, decode_offset(&buf, 32).unwrap()).unwrap();
        assert_eq!(tags, vec![B256::from(tag_a)]);
        assert_eq!(refs, vec![B256::from(ref_a)]);
    }

    #[test]
    fn decode_then_reencode_reproduces_bytes() {
        let samples: Vec<(Vec<[u8; 32]>, Vec<[u8; 32]>)> = vec![
            (vec![], vec![]),
            (vec![word(1), word(2)], vec![word(3), word(4)]),
            (vec![word(9); 5], vec![word(8)]),
        ];
        for (tags, refs) in samples {
            let to_value = |ws: &[[u8; 32]]| {
                DynSolValue::Array(
                    ws.iter()
                        .map(|w| DynSolValue::FixedBytes(B256::from(*w), 32))
                        .collect(),
                )
            };
            let encoded =
                DynSolValue::Tuple(vec![to_value(&tags), to_value(&refs)]).abi_encode_params();

            let got_tags = decode_word_array_at(&encoded, decode_offset(&encoded, 0).unwrap()).unwrap();
            let got_refs = decode_word_array_at(&encoded, decode_offset(&encoded, 32).unwrap()).unwrap();

            let as_arrays = |ws: Vec<B256>| ws.into_iter().map(|w| w.0).collect::<Vec<_>>();
            let reencoded = DynSolValue::Tuple(vec![
                to_value(&as_arrays(got_tags)),
                to_value(&as_arrays(got_refs)),
            ])
            .abi_encode_params();
            assert_eq!(reencoded, encoded);
        }
    }

    #[test]
    fn array_length_beyond_buffer_is_malformed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&uint_word(5));
        buf.extend_from_slice(&word(1));
        assert!(matches!(
            decode_word_array_at(&buf, 0),
            Err(DecodeError::MalformedArray { offset: 0, .. })
        ));
    }

    #[test]
    fn huge_length_is_malformed_not_overflow() {
        let buf = [0xffu8; 64];
        assert!(matches!(
            decode_bytes_at(&buf, 0),
            Err(DecodeError::MalformedArray { .. })
        ));
    }

    #[test]
    fn offset_past_end_is_invalid() {
        let buf = uint_word(0x40);
        assert!(matches!(
            decode_offset(&buf, 0),
            Err(DecodeError::InvalidOffset { offset: 0x40, len: 32 })
        ));
        assert!(matches!(
            decode_bytes_at(&buf, 32),
            Err(DecodeError::InvalidOffset { offset: 32, len: 32 })
        ));
    }

    #[test]
    fn bytes_at_reads_exact_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&uint_word(3));
        let mut content = [0u8; 32];
        content[..3].copy_from_slice(&[0xde, 0xad, 0xbe]);
        buf.extend_from_slice(&content);
        assert_eq!(decode_bytes_at(&buf, 0).unwrap(), vec![0xde, 0xad, 0xbe]);
    }

    #[test]
    fn address_is_low_twenty_bytes() {
        let mut topic = [0u8; 32];
        topic[12..].copy_from_slice(&[0x11; 20]);
        let addr = decode_address_from_topic(&topic).unwrap();
        assert_eq!(to_hex(addr.as_slice()), format!("0x{}", "11".repeat(20)));
    }

    #[test]
    fn hex_helpers() {
        assert_eq!(decode_hex("0xABcd").unwrap(), vec![0xab, 0xcd]);
        assert!(matches!(decode_hex("0xabc"), Err(DecodeError::InvalidHex(_))));
        assert_eq!(to_hex(&[0xAB, 0x01]), "0xab01");
        assert!(parse_topic("0x1234").is_err());
    }
}
