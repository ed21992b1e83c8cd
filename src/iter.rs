//! Range cursor over the adaptive radix tree.
//!
//! The cursor walks the tree with an explicit stack, rebuilding the key
//! byte-by-byte as it descends and ascends. Below a gate it switches to
//! assembling row-id bytes into a fixed-width staging buffer instead of
//! extending the key.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::key::{decode_row_id, encode_key, RowId, ROW_ID_LEN};
use crate::node::{Node, NodeKind, Repr};
use crate::Art;

/// Byte buffer holding the key path from the root to the cursor position.
///
/// Bytes consumed below a gate are not part of the key; they go into the
/// cursor's row-id buffer instead, so this buffer always spells a user
/// key.
pub(crate) struct IteratorKey {
	bytes: SmallVec<[u8; 64]>,
}

impl IteratorKey {
	fn new() -> IteratorKey {
		IteratorKey {
			bytes: SmallVec::new(),
		}
	}

	#[inline]
	fn push(&mut self, byte: u8) {
		self.bytes.push(byte);
	}

	#[inline]
	fn pop(&mut self, count: usize) {
		debug_assert!(count <= self.bytes.len());
		self.bytes.truncate(self.bytes.len() - count);
	}

	#[inline]
	pub(crate) fn len(&self) -> usize {
		self.bytes.len()
	}

	fn clear(&mut self) {
		self.bytes.clear();
	}

	/// True iff this buffer starts with all of `key`.
	pub(crate) fn contains(&self, key: &[u8]) -> bool {
		self.bytes.len() >= key.len() && self.bytes[..key.len()] == *key
	}

	/// Compares the buffer against `key` as unsigned byte strings.
	///
	/// With `equal` set, reports strictly-greater: equal content compares
	/// as not greater. Without `equal`, equal content also reports true,
	/// relaxing the comparison to greater-or-equal. If one operand is a
	/// proper prefix of the other, the longer one is the greater.
	pub(crate) fn greater_than(&self, key: &[u8], equal: bool) -> bool {
		let shared = self.bytes.len().min(key.len());
		for pos in 0..shared {
			if self.bytes[pos] > key[pos] {
				return true;
			}
			if self.bytes[pos] < key[pos] {
				return false;
			}
		}
		if equal {
			self.bytes.len() > key.len()
		} else {
			self.bytes.len() >= key.len()
		}
	}
}

/// One level of the descent stack: a node and the child byte last taken.
///
/// Prefix levels carry no child byte; their frames store zero.
struct Frame<'t> {
	node: &'t Node,
	byte: u8,
}

/// Resume position inside a partially emitted leaf.
enum EmitFrom {
	Start,
	List(usize),
	ByteSet(u16),
}

/// Stateful cursor yielding row ids in ascending key order.
///
/// Position the cursor once with [`RawIter::find_minimum`] or
/// [`RawIter::lower_bound`], then drain it with [`RawIter::scan`]. A
/// `scan` that returns `false` stopped at the output cap; calling it
/// again resumes exactly where it left off, including in the middle of a
/// multi-row leaf.
pub struct RawIter<'t> {
	art: &'t Art,
	current_key: IteratorKey,
	nodes: SmallVec<[Frame<'t>; 32]>,
	last_leaf: Option<&'t Node>,
	row_id: [u8; ROW_ID_LEN],
	nested_depth: usize,
	inside_gate: bool,
	emit: EmitFrom,
}

impl<'t> RawIter<'t> {
	pub(crate) fn new(art: &'t Art) -> RawIter<'t> {
		RawIter {
			art,
			current_key: IteratorKey::new(),
			nodes: SmallVec::new(),
			last_leaf: None,
			row_id: [0; ROW_ID_LEN],
			nested_depth: 0,
			inside_gate: false,
			emit: EmitFrom::Start,
		}
	}

	fn reset(&mut self) {
		self.current_key.clear();
		self.nodes.clear();
		self.last_leaf = None;
		self.row_id = [0; ROW_ID_LEN];
		self.nested_depth = 0;
		self.inside_gate = false;
		self.emit = EmitFrom::Start;
	}

	/// Positions the cursor at the smallest key in the tree.
	///
	/// Returns `false` if the tree is empty.
	pub fn find_minimum(&mut self) -> bool {
		self.reset();
		match self.art.root.as_ref() {
			Some(root) => {
				self.descend_minimum(root);
				true
			}
			None => false,
		}
	}

	/// Positions the cursor at the smallest key `>=` the given key, or
	/// strictly `>` when `equal` is `false`.
	///
	/// Returns `false` if no key in the tree meets the bound.
	pub fn lower_bound(&mut self, key: &[u8], equal: bool) -> bool {
		self.reset();
		let Some(root) = self.art.root.as_ref() else {
			return false;
		};
		let stored = encode_key(key);
		self.lower_bound_in(root, &stored, equal)
	}

	/// Streams row ids from the cursor position into `row_ids`.
	///
	/// Stops when the key passes `upper_bound` (`equal` decides whether
	/// the bound itself is included), when `row_ids` reaches `max_count`
	/// entries, or when the tree is exhausted. Returns `true` when the
	/// range is complete and `false` when the cap cut the scan short; in
	/// the latter case the next call resumes where this one stopped. A
	/// row id assembled from an inlined tail is pushed even when it lands
	/// on the cap, so the buffer can exceed `max_count` by one row.
	pub fn scan(
		&mut self,
		upper_bound: Option<&[u8]>,
		max_count: usize,
		row_ids: &mut Vec<RowId>,
		equal: bool,
	) -> Result<bool> {
		let stored_upper = upper_bound.map(|bound| encode_key(bound));
		loop {
			let Some(leaf) = self.last_leaf else {
				return Ok(true);
			};

			// Below a gate the key buffer holds the gated key in full, so
			// the bound test stays valid there.
			if let Some(upper) = &stored_upper {
				if self.current_key.greater_than(upper, equal) {
					return Ok(true);
				}
			}

			match &leaf.repr {
				Repr::LeafInlined(row) => {
					if row_ids.len() + 1 > max_count {
						return Ok(false);
					}
					row_ids.push(*row);
				}
				Repr::Leaf(rows) => {
					let start = match self.emit {
						EmitFrom::List(pos) => pos,
						_ => 0,
					};
					for pos in start..rows.len() {
						if row_ids.len() + 1 > max_count {
							self.emit = EmitFrom::List(pos);
							return Ok(false);
						}
						row_ids.push(rows[pos]);
					}
					self.emit = EmitFrom::Start;
				}
				Repr::Node16Leaf(_) | Repr::Node256Leaf(_) => {
					if !self.inside_gate || self.nested_depth != ROW_ID_LEN - 1 {
						return Err(Error::Corrupt("byte-set leaf outside a complete row-id path"));
					}
					let mut from = match self.emit {
						EmitFrom::ByteSet(byte) => byte,
						_ => 0,
					};
					while from <= u8::MAX as u16 {
						let mut byte = from as u8;
						if !leaf.next_byte(&mut byte) {
							break;
						}
						if row_ids.len() + 1 > max_count {
							self.emit = EmitFrom::ByteSet(byte as u16);
							return Ok(false);
						}
						self.row_id[ROW_ID_LEN - 1] = byte;
						row_ids.push(decode_row_id(self.row_id));
						from = byte as u16 + 1;
					}
					self.emit = EmitFrom::Start;
				}
				Repr::PrefixInlined(bytes) => {
					if !self.inside_gate || self.nested_depth + bytes.len() != ROW_ID_LEN {
						return Err(Error::Corrupt("inlined tail does not complete a row id"));
					}
					for (pos, &byte) in bytes.iter().enumerate() {
						self.row_id[self.nested_depth + pos] = byte;
					}
					row_ids.push(decode_row_id(self.row_id));
				}
				_ => return Err(Error::InvalidLeaf),
			}

			if !self.next() {
				return Ok(true);
			}
		}
	}

	/// Advances to the next leaf in key order.
	///
	/// Returns `false` once the tree is exhausted; the stack is empty and
	/// the cursor holds no leaf afterwards.
	pub fn next(&mut self) -> bool {
		self.emit = EmitFrom::Start;
		loop {
			let (node, last_byte) = match self.nodes.last() {
				Some(top) => (top.node, top.byte),
				None => break,
			};
			debug_assert!(!node.is_any_leaf());

			// A prefix has a single child, which has been visited.
			if node.kind() == NodeKind::Prefix {
				self.pop_node();
				continue;
			}

			if last_byte == u8::MAX {
				self.pop_node();
				continue;
			}

			let mut byte = last_byte + 1;
			let Some(child) = node.next_child(&mut byte) else {
				self.pop_node();
				continue;
			};

			// Replace the byte this level contributed and descend.
			let top = self.nodes.len() - 1;
			self.nodes[top].byte = byte;
			if self.inside_gate {
				self.row_id[self.nested_depth - 1] = byte;
			} else {
				self.current_key.pop(1);
				self.current_key.push(byte);
			}
			self.descend_minimum(child);
			return true;
		}
		self.last_leaf = None;
		false
	}

	/// Descends to the smallest leaf below `node`, recording the path.
	fn descend_minimum(&mut self, mut node: &'t Node) {
		loop {
			if node.is_any_leaf() {
				self.last_leaf = Some(node);
				return;
			}

			if node.is_gate() {
				debug_assert!(!self.inside_gate, "nested subtrees do not nest");
				self.inside_gate = true;
				self.nested_depth = 0;
			}

			if let Repr::Prefix(prefix) = &node.repr {
				if self.inside_gate {
					for &byte in prefix.bytes.iter() {
						self.row_id[self.nested_depth] = byte;
						self.nested_depth += 1;
					}
				} else {
					for &byte in prefix.bytes.iter() {
						self.current_key.push(byte);
					}
				}
				self.nodes.push(Frame {
					node,
					byte: 0,
				});
				node = &*prefix.child;
				continue;
			}

			let mut byte = 0;
			let child = node.next_child(&mut byte).expect("fan-out node has at least one child");
			if self.inside_gate {
				self.row_id[self.nested_depth] = byte;
				self.nested_depth += 1;
			} else {
				self.current_key.push(byte);
			}
			self.nodes.push(Frame {
				node,
				byte,
			});
			node = child;
		}
	}

	/// Positions at the smallest leaf whose stored key meets the bound.
	fn lower_bound_in(&mut self, mut node: &'t Node, key: &[u8], equal: bool) -> bool {
		let mut depth = 0;
		loop {
			if node.is_any_leaf() || node.is_gate() {
				debug_assert!(!self.inside_gate);
				debug_assert_eq!(self.current_key.len(), key.len());
				// An exact match only satisfies an exclusive bound via its
				// successor.
				if !equal && self.current_key.contains(key) {
					return self.next();
				}
				if node.is_gate() {
					self.descend_minimum(node);
				} else {
					self.last_leaf = Some(node);
				}
				return true;
			}

			if let Repr::Prefix(prefix) = &node.repr {
				for &byte in prefix.bytes.iter() {
					self.current_key.push(byte);
				}
				self.nodes.push(Frame {
					node,
					byte: 0,
				});
				for (pos, &byte) in prefix.bytes.iter().enumerate() {
					if byte < key[depth + pos] {
						// Everything below sorts before the key; rewind to
						// the next subtree.
						return self.next();
					}
					if byte > key[depth + pos] {
						// Everything below sorts after the key.
						self.descend_minimum(&*prefix.child);
						return true;
					}
				}
				depth += prefix.bytes.len();
				node = &*prefix.child;
				continue;
			}

			let mut byte = key[depth];
			let Some(child) = node.next_child(&mut byte) else {
				// The key is greater than any key in this subtree.
				return self.next();
			};
			self.current_key.push(byte);
			self.nodes.push(Frame {
				node,
				byte,
			});
			if byte > key[depth] {
				self.descend_minimum(child);
				return true;
			}
			depth += 1;
			node = child;
		}
	}

	/// Pops the top frame, unwinding its key or row-id bytes.
	fn pop_node(&mut self) {
		let frame = self.nodes.pop().expect("stack is not empty");
		let count = match frame.node.kind() {
			NodeKind::Prefix => frame.node.prefix_bytes().len(),
			_ => 1,
		};
		if frame.node.is_gate() {
			debug_assert!(self.inside_gate);
			// The nested root's bytes live in the row-id buffer, which is
			// abandoned wholesale on the way out of the gate.
			self.inside_gate = false;
		} else if self.inside_gate {
			self.nested_depth -= count;
		} else {
			self.current_key.pop(count);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key_of(bytes: &[u8]) -> IteratorKey {
		let mut key = IteratorKey::new();
		for &byte in bytes {
			key.push(byte);
		}
		key
	}

	#[test]
	fn contains_matches_prefixes_only() {
		let key = key_of(&[1, 2, 3]);
		assert!(key.contains(&[]));
		assert!(key.contains(&[1, 2]));
		assert!(key.contains(&[1, 2, 3]));
		assert!(!key.contains(&[1, 3]));
		assert!(!key.contains(&[1, 2, 3, 4]));
	}

	#[test]
	fn greater_than_on_diverging_content() {
		let key = key_of(&[5, 9]);
		assert!(key.greater_than(&[5, 8], true));
		assert!(key.greater_than(&[5, 8], false));
		assert!(!key.greater_than(&[5, 10], true));
		assert!(!key.greater_than(&[5, 10], false));
	}

	#[test]
	fn greater_than_on_equal_content_tracks_the_flag() {
		let key = key_of(&[5, 9]);
		// With `equal`, the bound itself is still in range.
		assert!(!key.greater_than(&[5, 9], true));
		// Without it, the bound is already out of range.
		assert!(key.greater_than(&[5, 9], false));
	}

	#[test]
	fn greater_than_treats_longer_as_greater() {
		let key = key_of(&[5, 9]);
		assert!(key.greater_than(&[5], true));
		assert!(!key.greater_than(&[5, 9, 0], true));
		assert!(!key_of(&[5]).greater_than(&[5, 9], false));
	}
}
