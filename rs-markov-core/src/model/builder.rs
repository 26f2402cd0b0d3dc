use std::collections::BTreeMap;

use log::debug;

use super::key::{Delta, Key, KeyMode};
use crate::error::Error;
use crate::tokenizer::Token;

/// Builds prefix-to-successor count deltas from an ordered token stream.
///
/// # Responsibilities
/// - Slide a window of `order + 1` tokens over the stream
/// - Encode the first `order` tokens of each window as the prefix key
/// - Count the last token of each window as an observed successor
/// - Accumulate into an explicitly passed delta, so several documents can
///   be merged in memory before a single store write
///
/// # Invariants
/// - `order` is always >= 1
/// - Every count written into the delta is >= 1
pub struct ModelBuilder {
	order: usize,
	key_mode: KeyMode,
}

impl ModelBuilder {
	/// Creates a builder for the given order and key encoding.
	///
	/// # Errors
	/// Returns `Error::InvalidOrder` if `order` is zero, before any
	/// tokenization or storage access takes place.
	pub fn new(order: usize, key_mode: KeyMode) -> Result<Self, Error> {
		if order == 0 {
			return Err(Error::InvalidOrder(order));
		}
		Ok(Self { order, key_mode })
	}

	pub fn order(&self) -> usize {
		self.order
	}

	/// Accumulates the token stream into `delta` and returns it.
	///
	/// Every position with `order + 1` tokens remaining is a window start,
	/// so a stream of `len` tokens produces `len - order` windows. Streams
	/// shorter than `order + 1` tokens contribute nothing.
	///
	/// The delta is taken and returned by value: callers construct it
	/// explicitly (`Delta::new()`) or pass the result of a previous build
	/// to accumulate several documents before one store write.
	pub fn build(&self, tokens: &[Token], mut delta: Delta) -> Result<Delta, Error> {
		let window = self.order + 1;
		if tokens.len() < window {
			debug!("stream of {} tokens is shorter than a window, nothing to add", tokens.len());
			return Ok(delta);
		}

		debug!("building order-{} model from {} tokens", self.order, tokens.len());
		for chunk in tokens.windows(window) {
			let prefix: Vec<String> = chunk[..self.order]
				.iter()
				.map(|token| token.surface().to_owned())
				.collect();
			let encoded = Key::new(prefix).encode(self.key_mode)?;
			let successor = chunk[self.order].surface().to_owned();
			*delta.entry(encoded).or_default().entry(successor).or_insert(0) += 1;
		}
		debug!("delta now holds {} keys", delta.len());

		Ok(delta)
	}

	/// Counts n-grams of exactly `order` tokens and ranks them.
	///
	/// The result is sorted by descending count; ties are broken by key so
	/// the ranking is stable.
	pub fn count_ngrams(&self, tokens: &[Token]) -> Result<Vec<(String, u64)>, Error> {
		let mut counts: BTreeMap<String, u64> = BTreeMap::new();
		for chunk in tokens.windows(self.order) {
			let gram: Vec<String> = chunk.iter().map(|token| token.surface().to_owned()).collect();
			let encoded = Key::new(gram).encode(self.key_mode)?;
			*counts.entry(encoded).or_insert(0) += 1;
		}

		let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
		ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		Ok(ranked)
	}
}
