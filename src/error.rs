//! # Error Types for the Radix Tree Index
//!
//! This module defines the error types surfaced by index scans.
//!
//! ## Error Handling Strategy
//!
//! Most "failure" conditions in the tree are not errors at all. A search
//! key with no matching leaf, an exhausted cursor, or an output buffer
//! that reached its cap are all ordinary outcomes and are reported as
//! boolean results by the cursor API.
//!
//! Errors are reserved for states that a well-formed tree can never
//! produce: they indicate either a corrupted tree or a bug in the code
//! that built it. Debug builds additionally assert these invariants at
//! the point where they are assumed.
//!
//! ## Error Flow
//!
//! ```text
//! Scan positioned on a leaf
//!      │
//!      ▼
//! Leaf kind is valid here? ──── no ───► Err(InvalidLeaf | Corrupt)
//!      │
//!      ▼ (yes)
//! Emit row ids, advance cursor
//! ```
//!
//! Nothing is retried and nothing is swallowed; an error aborts the scan
//! and leaves the cursor in an unspecified position.

use thiserror::Error;

/// Errors that can occur while scanning the index.
///
/// Both variants signal invariant violations. They are never produced by
/// trees built through [`crate::Art::insert`]; they exist so that a
/// corrupted tree fails loudly instead of yielding wrong row ids.
#[derive(Error, Debug)]
pub enum Error {
	/// The scan was positioned on a node kind that cannot stand as a leaf.
	///
	/// The cursor only ever parks on inlined leaves, legacy list leaves,
	/// byte-set leaves, or inlined row-id tails. Any other kind in that
	/// position means the descent logic and the tree disagree about the
	/// tree's shape.
	#[error("invalid leaf type for index scan")]
	InvalidLeaf,

	/// A structural invariant did not hold at runtime.
	///
	/// Carries a short description of the violated invariant, e.g. a
	/// row-id fragment that does not assemble into a full fixed-width
	/// row id.
	#[error("corrupted tree: {0}")]
	Corrupt(&'static str),
}

/// A Result type alias using our custom Error type.
pub type Result<T> = std::result::Result<T, Error>;
