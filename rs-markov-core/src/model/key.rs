use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Occurrence counts for every token observed after one prefix.
///
/// A `BTreeMap` so that iteration is always sorted by successor string;
/// weighted sampling relies on this fixed order to stay reproducible under
/// a seeded random source.
///
/// ## Invariants
/// - Once an entry exists its count is >= 1
/// - Counts only grow under merges; a merge never subtracts or resets
pub type SuffixCounts = BTreeMap<String, u64>;

/// In-memory model delta: encoded prefix key to successor counts.
///
/// Keys are stored already encoded, so concatenated-mode collisions happen
/// during accumulation exactly as they would in the store.
pub type Delta = BTreeMap<String, SuffixCounts>;

/// Encoding used for prefix keys, fixed for a store's whole lifetime.
///
/// # Variants
/// - `Tupled`: the prefix is serialized as a JSON array of its tokens and
///   round-trips losslessly.
/// - `Concatenated`: the tokens are joined with no separator. Lossy: two
///   different token sequences can concatenate to the same string and will
///   be merged into one key. A documented limitation, not a bug.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
	Tupled,
	Concatenated,
}

impl fmt::Display for KeyMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			KeyMode::Tupled => write!(f, "tupled"),
			KeyMode::Concatenated => write!(f, "concatenated"),
		}
	}
}

/// An ordered prefix of surface strings used as the lookup identity.
///
/// Built from exactly `order` tokens during model construction. Generation
/// may produce a shorter one when the emitted text is still shorter than
/// the order; such keys simply miss in the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key(Vec<String>);

impl Key {
	pub fn new(tokens: Vec<String>) -> Self {
		Self(tokens)
	}

	pub fn tokens(&self) -> &[String] {
		&self.0
	}

	pub fn into_tokens(self) -> Vec<String> {
		self.0
	}

	/// Encodes the prefix for storage under the given mode.
	///
	/// Tupled keys keep non-ASCII characters verbatim (no `\u` escaping),
	/// matching the store's text format.
	pub fn encode(&self, mode: KeyMode) -> Result<String, Error> {
		match mode {
			KeyMode::Tupled => Ok(serde_json::to_string(&self.0)?),
			KeyMode::Concatenated => Ok(self.0.concat()),
		}
	}

	/// Decodes a stored key back into its token sequence.
	///
	/// Concatenated keys have lost their token boundaries; the fallback is
	/// one token per character, which matches the per-character granularity
	/// used elsewhere for concatenated stores.
	pub fn decode(encoded: &str, mode: KeyMode) -> Result<Self, Error> {
		match mode {
			KeyMode::Tupled => {
				let tokens: Vec<String> = serde_json::from_str(encoded)?;
				Ok(Self(tokens))
			}
			KeyMode::Concatenated => Ok(Self(encoded.chars().map(String::from).collect())),
		}
	}
}
