//! Implementation of an in-memory adaptive radix tree used as a secondary index,
//! mapping byte-string keys to 64-bit row identifiers.
//!
//! Keys are stored byte-wise with path compression; fan-out nodes grow through
//! capacities 4/16/48/256 as they fill. A key mapped to more than one row id
//! keeps its row ids in a nested subtree below the key, spelled out as
//! fixed-width byte strings. The [`iter::RawIter`] cursor walks keys in
//! ascending order and streams row ids into a bounded output buffer, resuming
//! across calls.
//!
//! ```
//! use larch::Art;
//!
//! let mut art = Art::new();
//!
//! art.insert(b"some", 7);
//! art.insert(b"data", 3);
//!
//! assert_eq!(art.lookup(b"some"), vec![7]);
//! ```

use std::ops::Bound;

use smallvec::SmallVec;

pub mod error;
pub mod iter;
mod key;
mod node;
#[cfg(test)]
pub mod util;

pub use error::{Error, Result};
pub use iter::RawIter;
pub use key::RowId;

use key::{decode_row_id, encode_key, encode_row_id, ROW_ID_LEN};
use node::{FanNode, Node, NodeKind, PrefixNode, Repr, PREFIX_CAPACITY};

/// Adaptive radix tree mapping byte-string keys to row ids.
///
/// The tree is insert-only: entries are added with [`Art::insert`] and read
/// back through [`Art::lookup`], [`Art::scan_range`], or a [`RawIter`]
/// cursor. One writer at a time; scans borrow the tree immutably.
#[derive(Debug, Default)]
pub struct Art {
	pub(crate) root: Option<Node>,
	len: usize,
}

impl Art {
	/// Makes a new, empty tree.
	pub fn new() -> Art {
		Art {
			root: None,
			len: 0,
		}
	}

	/// Inserts a `(key, row id)` pair.
	///
	/// Returns `true` if the pair was new. Mapping an existing key to a
	/// further row id nests the row ids below the key; re-inserting an
	/// existing pair is a no-op.
	pub fn insert(&mut self, key: &[u8], row: RowId) -> bool {
		let stored = encode_key(key);
		let added = match self.root.as_mut() {
			Some(root) => insert_in(root, &stored, 0, row),
			None => {
				self.root = Some(new_tail(&stored, Node::new(Repr::LeafInlined(row))));
				true
			}
		};
		if added {
			self.len += 1;
		}
		added
	}

	/// Plants a legacy list leaf holding `rows` under `key`.
	///
	/// Trees read from the old storage format keep their row-id lists out
	/// of line; this constructor exists so that leaf format can still be
	/// exercised. [`Art::insert`] never produces it. The key must not be
	/// present yet.
	pub fn insert_legacy_leaf(&mut self, key: &[u8], rows: &[RowId]) {
		let mut sorted = rows.to_vec();
		sorted.sort_unstable();
		sorted.dedup();
		if sorted.is_empty() {
			return;
		}
		self.len += sorted.len();

		let stored = encode_key(key);
		let leaf = Node::new(Repr::Leaf(sorted));
		match self.root.as_mut() {
			Some(root) => plant_in(root, &stored, 0, leaf),
			None => self.root = Some(new_tail(&stored, leaf)),
		}
	}

	/// Collects the row ids stored under `key`, in ascending order.
	pub fn lookup(&self, key: &[u8]) -> Vec<RowId> {
		let stored = encode_key(key);
		let mut rows = Vec::new();
		let Some(mut node) = self.root.as_ref() else {
			return rows;
		};
		let mut depth = 0;
		loop {
			if node.is_gate() {
				debug_assert_eq!(depth, stored.len());
				let mut buffer = [0; ROW_ID_LEN];
				collect_nested(node, &mut buffer, 0, &mut rows);
				return rows;
			}
			match &node.repr {
				Repr::LeafInlined(row) => {
					debug_assert_eq!(depth, stored.len());
					rows.push(*row);
					return rows;
				}
				Repr::Leaf(list) => {
					debug_assert_eq!(depth, stored.len());
					rows.extend_from_slice(list);
					return rows;
				}
				Repr::Prefix(prefix) => {
					let bytes = &prefix.bytes;
					if stored.len() - depth < bytes.len()
						|| stored[depth..depth + bytes.len()] != bytes[..]
					{
						return rows;
					}
					depth += bytes.len();
					node = &*prefix.child;
				}
				Repr::Node4(_) | Repr::Node16(_) | Repr::Node48(_) | Repr::Node256(_) => {
					let mut byte = stored[depth];
					match node.next_child(&mut byte) {
						Some(child) if byte == stored[depth] => {
							depth += 1;
							node = child;
						}
						_ => return rows,
					}
				}
				_ => return rows,
			}
		}
	}

	/// Streams the row ids of every key inside the given bounds into
	/// `row_ids`, in ascending key order.
	///
	/// Returns `true` if the range was drained and `false` if `max_count`
	/// cut the scan short.
	pub fn scan_range(
		&self,
		lower: Bound<&[u8]>,
		upper: Bound<&[u8]>,
		max_count: usize,
		row_ids: &mut Vec<RowId>,
	) -> Result<bool> {
		let mut iter = self.raw_iter();
		let positioned = match lower {
			Bound::Unbounded => iter.find_minimum(),
			Bound::Included(key) => iter.lower_bound(key, true),
			Bound::Excluded(key) => iter.lower_bound(key, false),
		};
		if !positioned {
			return Ok(true);
		}
		match upper {
			Bound::Unbounded => iter.scan(None, max_count, row_ids, true),
			Bound::Included(key) => iter.scan(Some(key), max_count, row_ids, true),
			Bound::Excluded(key) => iter.scan(Some(key), max_count, row_ids, false),
		}
	}

	/// Returns a cursor over the tree.
	pub fn raw_iter(&self) -> RawIter<'_> {
		RawIter::new(self)
	}

	/// Returns the number of `(key, row id)` pairs in the tree.
	pub fn len(&self) -> usize {
		self.len
	}

	/// Returns `true` if the tree holds no entries.
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Panics if any structural invariant of the tree is violated.
	pub fn assert_invariants(&self) {
		if let Some(root) = self.root.as_ref() {
			assert!(!root.is_gate(), "nested subtrees hang below whole keys");
			node::check_subtree(root, false, 0);
		}
	}
}

/// Inserts `row` under the stored key, starting at `node` with `depth`
/// key bytes already consumed. Returns `true` if the pair was new.
fn insert_in(node: &mut Node, key: &[u8], depth: usize, row: RowId) -> bool {
	if node.is_gate() {
		// The whole key matched; the row id goes into the nested subtree.
		debug_assert_eq!(depth, key.len());
		return insert_nested(node, &encode_row_id(row), 0);
	}
	match node.kind() {
		NodeKind::LeafInlined => {
			debug_assert_eq!(depth, key.len());
			let existing = node.row_id();
			if existing == row {
				return false;
			}
			*node = new_gate(existing, row);
			true
		}
		NodeKind::Leaf => {
			debug_assert_eq!(depth, key.len());
			let Repr::Leaf(rows) = &mut node.repr else {
				unreachable!();
			};
			match rows.binary_search(&row) {
				Ok(_) => false,
				Err(pos) => {
					rows.insert(pos, row);
					true
				}
			}
		}
		NodeKind::Prefix => {
			let (mismatch, len) = {
				let Repr::Prefix(prefix) = &node.repr else {
					unreachable!();
				};
				let mismatch = prefix
					.bytes
					.iter()
					.zip(&key[depth..])
					.position(|(&ours, &theirs)| ours != theirs);
				(mismatch, prefix.bytes.len())
			};
			match mismatch {
				None => {
					debug_assert!(key.len() - depth >= len, "stored keys are prefix-free");
					let Repr::Prefix(prefix) = &mut node.repr else {
						unreachable!();
					};
					insert_in(&mut prefix.child, key, depth + len, row)
				}
				Some(pos) => {
					let fork = depth + pos;
					let branch = new_tail(&key[fork + 1..], Node::new(Repr::LeafInlined(row)));
					split_prefix(node, pos, key[fork], branch);
					true
				}
			}
		}
		NodeKind::Node4 | NodeKind::Node16 | NodeKind::Node48 | NodeKind::Node256 => {
			let byte = key[depth];
			if let Some(child) = node.find_child_mut(byte) {
				return insert_in(child, key, depth + 1, row);
			}
			node.insert_child(byte, new_tail(&key[depth + 1..], Node::new(Repr::LeafInlined(row))));
			true
		}
		NodeKind::PrefixInlined | NodeKind::Node16Leaf | NodeKind::Node256Leaf => {
			unreachable!("nested node kinds only occur below a nested root")
		}
	}
}

/// Inserts one encoded row id into a nested subtree.
fn insert_nested(node: &mut Node, rid: &[u8; ROW_ID_LEN], depth: usize) -> bool {
	match node.kind() {
		NodeKind::PrefixInlined => {
			let mismatch = {
				let Repr::PrefixInlined(tail) = &node.repr else {
					unreachable!();
				};
				tail.iter().zip(&rid[depth..]).position(|(&ours, &theirs)| ours != theirs)
			};
			let Some(pos) = mismatch else {
				// Same row id.
				return false;
			};
			let fork = depth + pos;
			let old = std::mem::replace(&mut node.repr, Repr::LeafInlined(0));
			let Repr::PrefixInlined(tail) = old else {
				unreachable!();
			};
			let mut branched = if fork == ROW_ID_LEN - 1 {
				let mut leaf = Node::new(Repr::Node16Leaf(SmallVec::new()));
				leaf.insert_leaf_byte(tail[pos]);
				leaf.insert_leaf_byte(rid[fork]);
				leaf
			} else {
				let mut fan = Node::new(Repr::Node4(FanNode::new()));
				fan.insert_child(
					tail[pos],
					Node::new(Repr::PrefixInlined(tail[pos + 1..].iter().copied().collect())),
				);
				fan.insert_child(
					rid[fork],
					Node::new(Repr::PrefixInlined(rid[fork + 1..].iter().copied().collect())),
				);
				fan
			};
			if pos > 0 {
				branched = Node::new(Repr::Prefix(PrefixNode {
					bytes: tail[..pos].iter().copied().collect(),
					child: Box::new(branched),
				}));
			}
			node.repr = branched.repr;
			true
		}
		NodeKind::Prefix => {
			let (mismatch, len) = {
				let Repr::Prefix(prefix) = &node.repr else {
					unreachable!();
				};
				let mismatch = prefix
					.bytes
					.iter()
					.zip(&rid[depth..])
					.position(|(&ours, &theirs)| ours != theirs);
				(mismatch, prefix.bytes.len())
			};
			match mismatch {
				None => {
					let Repr::Prefix(prefix) = &mut node.repr else {
						unreachable!();
					};
					insert_nested(&mut prefix.child, rid, depth + len)
				}
				Some(pos) => {
					let fork = depth + pos;
					// Row-id prefixes never reach the final byte, so the
					// fork always has room for inlined tails.
					debug_assert!(fork < ROW_ID_LEN - 1);
					let branch =
						Node::new(Repr::PrefixInlined(rid[fork + 1..].iter().copied().collect()));
					split_prefix(node, pos, rid[fork], branch);
					true
				}
			}
		}
		NodeKind::Node4 | NodeKind::Node16 | NodeKind::Node48 | NodeKind::Node256 => {
			let byte = rid[depth];
			if let Some(child) = node.find_child_mut(byte) {
				return insert_nested(child, rid, depth + 1);
			}
			node.insert_child(
				byte,
				Node::new(Repr::PrefixInlined(rid[depth + 1..].iter().copied().collect())),
			);
			true
		}
		NodeKind::Node16Leaf | NodeKind::Node256Leaf => {
			debug_assert_eq!(depth, ROW_ID_LEN - 1);
			node.insert_leaf_byte(rid[depth])
		}
		NodeKind::LeafInlined | NodeKind::Leaf => {
			unreachable!("user leaves cannot occur below a nested root")
		}
	}
}

/// Builds the nested subtree for a key's first two row ids.
fn new_gate(first: RowId, second: RowId) -> Node {
	let ka = encode_row_id(first);
	let kb = encode_row_id(second);
	let fork = ka.iter().zip(&kb).position(|(&a, &b)| a != b).expect("distinct row ids");

	let mut root = if fork == ROW_ID_LEN - 1 {
		let mut leaf = Node::new(Repr::Node16Leaf(SmallVec::new()));
		leaf.insert_leaf_byte(ka[fork]);
		leaf.insert_leaf_byte(kb[fork]);
		leaf
	} else {
		let mut fan = Node::new(Repr::Node4(FanNode::new()));
		fan.insert_child(ka[fork], Node::new(Repr::PrefixInlined(ka[fork + 1..].iter().copied().collect())));
		fan.insert_child(kb[fork], Node::new(Repr::PrefixInlined(kb[fork + 1..].iter().copied().collect())));
		fan
	};
	if fork > 0 {
		root = Node::new(Repr::Prefix(PrefixNode {
			bytes: ka[..fork].iter().copied().collect(),
			child: Box::new(root),
		}));
	}
	root.gate = true;
	root
}

/// Chains `rest` above `terminal` in prefix nodes of bounded length.
fn new_tail(rest: &[u8], terminal: Node) -> Node {
	let mut node = terminal;
	let mut end = rest.len();
	while end > 0 {
		let start = end.saturating_sub(PREFIX_CAPACITY);
		node = Node::new(Repr::Prefix(PrefixNode {
			bytes: rest[start..end].iter().copied().collect(),
			child: Box::new(node),
		}));
		end = start;
	}
	node
}

/// Forks a prefix node at byte offset `pos`, attaching `branch` under
/// `fork_byte` next to the original subtree.
fn split_prefix(node: &mut Node, pos: usize, fork_byte: u8, branch: Node) {
	let old = std::mem::replace(&mut node.repr, Repr::LeafInlined(0));
	let Repr::Prefix(prefix) = old else {
		unreachable!("split requires a prefix node");
	};
	let old_byte = prefix.bytes[pos];
	debug_assert_ne!(old_byte, fork_byte);
	let head: SmallVec<[u8; PREFIX_CAPACITY]> = prefix.bytes[..pos].iter().copied().collect();
	let tail: SmallVec<[u8; PREFIX_CAPACITY]> = prefix.bytes[pos + 1..].iter().copied().collect();

	let old_branch = if tail.is_empty() {
		*prefix.child
	} else {
		Node::new(Repr::Prefix(PrefixNode {
			bytes: tail,
			child: prefix.child,
		}))
	};

	let mut fork = Node::new(Repr::Node4(FanNode::new()));
	fork.insert_child(old_byte, old_branch);
	fork.insert_child(fork_byte, branch);

	node.repr = if head.is_empty() {
		fork.repr
	} else {
		Repr::Prefix(PrefixNode {
			bytes: head,
			child: Box::new(fork),
		})
	};
}

/// Plants a prepared leaf node under a key that is not present yet.
fn plant_in(node: &mut Node, key: &[u8], depth: usize, leaf: Node) {
	assert!(!node.is_gate(), "legacy leaf requires an unused key");
	match node.kind() {
		NodeKind::Prefix => {
			let (mismatch, len) = {
				let Repr::Prefix(prefix) = &node.repr else {
					unreachable!();
				};
				let mismatch = prefix
					.bytes
					.iter()
					.zip(&key[depth..])
					.position(|(&ours, &theirs)| ours != theirs);
				(mismatch, prefix.bytes.len())
			};
			match mismatch {
				None => {
					let Repr::Prefix(prefix) = &mut node.repr else {
						unreachable!();
					};
					plant_in(&mut prefix.child, key, depth + len, leaf);
				}
				Some(pos) => {
					let fork = depth + pos;
					split_prefix(node, pos, key[fork], new_tail(&key[fork + 1..], leaf));
				}
			}
		}
		NodeKind::Node4 | NodeKind::Node16 | NodeKind::Node48 | NodeKind::Node256 => {
			let byte = key[depth];
			if let Some(child) = node.find_child_mut(byte) {
				plant_in(child, key, depth + 1, leaf);
				return;
			}
			node.insert_child(byte, new_tail(&key[depth + 1..], leaf));
		}
		_ => panic!("legacy leaf requires an unused key"),
	}
}

/// Accumulates every row id below a nested root, in ascending order.
fn collect_nested(node: &Node, buffer: &mut [u8; ROW_ID_LEN], depth: usize, rows: &mut Vec<RowId>) {
	match &node.repr {
		Repr::PrefixInlined(tail) => {
			for (pos, &byte) in tail.iter().enumerate() {
				buffer[depth + pos] = byte;
			}
			rows.push(decode_row_id(*buffer));
		}
		Repr::Prefix(prefix) => {
			for (pos, &byte) in prefix.bytes.iter().enumerate() {
				buffer[depth + pos] = byte;
			}
			collect_nested(&prefix.child, buffer, depth + prefix.bytes.len(), rows);
		}
		Repr::Node16Leaf(_) | Repr::Node256Leaf(_) => {
			let mut byte = 0;
			while node.next_byte(&mut byte) {
				buffer[ROW_ID_LEN - 1] = byte;
				rows.push(decode_row_id(*buffer));
				if byte == u8::MAX {
					break;
				}
				byte += 1;
			}
		}
		Repr::Node4(_) | Repr::Node16(_) | Repr::Node48(_) | Repr::Node256(_) => {
			let mut byte = 0;
			while let Some(child) = node.next_child(&mut byte) {
				buffer[depth] = byte;
				collect_nested(child, buffer, depth + 1, rows);
				if byte == u8::MAX {
					break;
				}
				byte += 1;
			}
		}
		Repr::LeafInlined(_) | Repr::Leaf(_) => {
			debug_assert!(false, "user leaves cannot occur below a nested root");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn basic_insert_and_lookup() {
		let mut art = Art::new();

		assert!(art.insert(b"one", 1));
		assert!(art.insert(b"two", 2));
		assert!(art.insert(b"three", 3));

		assert_eq!(art.lookup(b"one"), vec![1]);
		assert_eq!(art.lookup(b"two"), vec![2]);
		assert_eq!(art.lookup(b"three"), vec![3]);
		assert_eq!(art.lookup(b"four"), Vec::<RowId>::new());
	}

	#[test]
	fn duplicate_keys_nest_row_ids() {
		let mut art = Art::new();

		assert!(art.insert(b"k", 20));
		assert!(art.insert(b"k", 10));
		assert!(art.insert(b"k", 30));
		assert!(!art.insert(b"k", 20), "re-inserting a pair is a no-op");

		art.assert_invariants();
		assert_eq!(art.lookup(b"k"), vec![10, 20, 30]);
		assert_eq!(art.len(), 3);
	}

	#[test]
	fn keys_may_prolong_each_other() {
		let mut art = Art::new();

		art.insert(b"", 1);
		art.insert(&[0x02], 2);
		art.insert(&[0x02, 0x00], 3);
		art.insert(&[0x02, 0x00, 0x00], 4);

		art.assert_invariants();
		assert_eq!(art.lookup(b""), vec![1]);
		assert_eq!(art.lookup(&[0x02]), vec![2]);
		assert_eq!(art.lookup(&[0x02, 0x00]), vec![3]);
		assert_eq!(art.lookup(&[0x02, 0x00, 0x00]), vec![4]);
		assert_eq!(art.lookup(&[0x02, 0x00, 0x00, 0x00]), Vec::<RowId>::new());
	}

	#[test]
	fn raw_iter_yields_ascending_keys() {
		let mut art = Art::new();
		for byte in (0..100u8).rev() {
			art.insert(&[byte], byte as RowId);
		}

		let mut iter = art.raw_iter();
		assert!(iter.find_minimum());

		let mut rows = Vec::new();
		assert!(iter.scan(None, usize::MAX, &mut rows, true).unwrap());
		assert_eq!(rows, (0..100).collect::<Vec<RowId>>());
	}

	#[test]
	fn scan_range_respects_bounds() {
		let mut art = Art::new();
		for byte in 0..10u8 {
			art.insert(&[byte], byte as RowId);
		}

		let mut rows = Vec::new();
		assert!(art
			.scan_range(
				Bound::Included([2u8].as_slice()),
				Bound::Excluded([7u8].as_slice()),
				usize::MAX,
				&mut rows,
			)
			.unwrap());
		assert_eq!(rows, vec![2, 3, 4, 5, 6]);
	}

	#[test]
	fn len_and_is_empty() {
		let mut art = Art::new();

		assert!(art.is_empty());
		assert_eq!(art.len(), 0);

		art.insert(b"a", 1);
		assert!(!art.is_empty());
		assert_eq!(art.len(), 1);

		art.insert(b"a", 2);
		assert_eq!(art.len(), 2);

		art.insert(b"b", 3);
		assert_eq!(art.len(), 3);
	}

	#[test]
	fn fixture_round_trip() {
		let art = util::sample_art(
			r#"[
				{ "key": "0102", "rows": [10] },
				{ "key": "0103", "rows": [20] },
				{ "key": "02", "rows": [30] },
				{ "key": "0200", "rows": [40] },
				{ "key": "09", "rows": [100, 101, 102] },
				{ "key": "aa", "rows": [7, 8], "legacy": true }
			]"#,
		);

		art.assert_invariants();
		assert_eq!(art.len(), 8);
		assert_eq!(art.lookup(&[0x09]), vec![100, 101, 102]);
		assert_eq!(art.lookup(&[0xaa]), vec![7, 8]);

		let mut rows = Vec::new();
		assert!(art
			.scan_range(Bound::Unbounded, Bound::Unbounded, usize::MAX, &mut rows)
			.unwrap());
		assert_eq!(rows, vec![10, 20, 30, 40, 100, 101, 102, 7, 8]);
	}
}
