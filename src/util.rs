//! # Test Utilities for the Radix Tree Index
//!
//! This module provides utilities for loading sample trees from JSON
//! fixtures. It's only compiled in test builds (`#[cfg(test)]`).
//!
//! ## Purpose
//!
//! Writing out insert calls for every tree shape a test needs is noisy,
//! and the interesting shapes (shared prefixes, nested row-id subtrees,
//! legacy list leaves) are easier to review as data. A fixture describes
//! the tree as a list of entries and the loader builds it through the
//! public API, so fixtures can never describe an unreachable shape.
//!
//! ## JSON Format
//!
//! A fixture is an array of entries:
//!
//! ```json
//! [
//!   { "key": "0102", "rows": [10] },
//!   { "key": "09", "rows": [100, 101, 102] },
//!   { "key": "aa", "rows": [7, 8], "legacy": true }
//! ]
//! ```
//!
//! Keys are hex strings (case-insensitive, empty for the empty key).
//! Entries with several rows nest them below the key; entries marked
//! `legacy` are planted as old-format list leaves instead.
//!
//! ## Usage
//!
//! ```ignore
//! let art = sample_art(r#"[{ "key": "01", "rows": [1] }]"#);
//! assert_eq!(art.lookup(&[0x01]), vec![1]);
//! ```

use serde::Deserialize;

use crate::{Art, RowId};

// ---------------------------------------------------------------------------
// JSON Deserialization Structures
// ---------------------------------------------------------------------------

/// One key and the row ids stored under it.
#[derive(Deserialize, Debug)]
struct Entry {
	/// The key bytes as a hex string.
	key: String,
	/// The row ids mapped to the key.
	rows: Vec<RowId>,
	/// Plant an old-format list leaf instead of inserting row by row.
	#[serde(default)]
	legacy: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Builds a tree from a JSON fixture string.
///
/// # Panics
///
/// Panics if the JSON or a hex key fails to parse.
pub fn sample_art(json: &str) -> Art {
	let entries: Vec<Entry> = serde_json::from_str(json).expect("fixture parses");

	let mut art = Art::new();
	for entry in entries {
		let key = parse_hex(&entry.key);
		if entry.legacy {
			art.insert_legacy_leaf(&key, &entry.rows);
		} else {
			for row in entry.rows {
				art.insert(&key, row);
			}
		}
	}
	art
}

fn parse_hex(text: &str) -> Vec<u8> {
	assert!(text.len() % 2 == 0, "hex keys have an even number of digits");
	(0..text.len())
		.step_by(2)
		.map(|pos| u8::from_str_radix(&text[pos..pos + 2], 16).expect("valid hex key"))
		.collect()
}
