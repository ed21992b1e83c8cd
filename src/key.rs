//! Key and row-id byte encodings.
//!
//! The tree compares everything as unsigned byte strings, so both user
//! keys and row ids are put through small order-preserving transforms
//! before they are stored.

use smallvec::SmallVec;

/// Identifies a row in the indexed table.
pub type RowId = i64;

/// Serialized width of a row id inside nested subtrees.
pub(crate) const ROW_ID_LEN: usize = 8;

/// Encodes a row id as a big-endian byte string.
///
/// The sign bit is flipped so that unsigned byte-wise comparison matches
/// signed integer order.
#[inline]
pub(crate) fn encode_row_id(row: RowId) -> [u8; ROW_ID_LEN] {
	((row as u64) ^ (1 << 63)).to_be_bytes()
}

/// Decodes the result of [`encode_row_id`].
#[inline]
pub(crate) fn decode_row_id(bytes: [u8; ROW_ID_LEN]) -> RowId {
	(u64::from_be_bytes(bytes) ^ (1 << 63)) as RowId
}

/// Encodes a logical key for storage.
///
/// Zero bytes are escaped (`0x00` becomes `0x00 0x01`) and a `0x00 0x00`
/// terminator is appended. The transform preserves unsigned lexicographic
/// order, and it guarantees that no stored key is a prefix of another
/// stored key or of an encoded search key. The traversal relies on that
/// guarantee: a descent either diverges from the search key within the
/// search key's length or matches it completely.
pub(crate) fn encode_key(raw: &[u8]) -> SmallVec<[u8; 24]> {
	let mut stored = SmallVec::with_capacity(raw.len() + 2);
	for &byte in raw {
		stored.push(byte);
		if byte == 0 {
			stored.push(1);
		}
	}
	stored.push(0);
	stored.push(0);
	stored
}
