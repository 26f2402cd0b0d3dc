use log::{debug, info};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::key::{Key, SuffixCounts};
use crate::error::Error;
use crate::store::ModelStore;

/// Strategy for choosing the first token window before the walk starts.
///
/// # Variants
/// - `Explicit(tokens)`: use the given tokens verbatim.
/// - `Keyword(query)`: search the store for keys containing the query and
///   pick one of the matches at random.
/// - `Random`: draw a key from the store by identifier probing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeedSpec {
	Explicit(Vec<String>),
	Keyword(String),
	Random,
}

/// Lifecycle of one generation walk.
///
/// `Seeded` after seeding, `Extending` while steps succeed, then either
/// `Exhausted` (the current prefix has no stored successors; a normal
/// termination, not an error) or `LimitReached` (the requested length was
/// emitted). Both end states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkState {
	Seeded,
	Extending,
	Exhausted,
	LimitReached,
}

/// Stateful walk over a stored model.
///
/// # Responsibilities
/// - Seed the token window (explicit, keyword-matched or random)
/// - Extend the output one token per step by weighted sampling over the
///   stored successor counts
/// - Report how many tokens were actually emitted
///
/// The walk only reads the store. Randomness comes from an injected,
/// seedable source so that generation is reproducible in tests.
pub struct Generator<'a, R: Rng = StdRng> {
	store: &'a ModelStore,
	order: usize,
	rng: R,
	text: Vec<String>,
	state: WalkState,
}

impl<'a> Generator<'a, StdRng> {
	/// Creates a generator drawing randomness from OS entropy.
	pub fn new(store: &'a ModelStore, order: usize) -> Result<Self, Error> {
		Self::with_rng(store, order, StdRng::from_os_rng())
	}
}

impl<'a, R: Rng> Generator<'a, R> {
	/// Creates a generator with an injected random source.
	///
	/// # Errors
	/// Returns `Error::InvalidOrder` if `order` is zero.
	pub fn with_rng(store: &'a ModelStore, order: usize, rng: R) -> Result<Self, Error> {
		if order == 0 {
			return Err(Error::InvalidOrder(order));
		}
		Ok(Self {
			store,
			order,
			rng,
			text: Vec::new(),
			state: WalkState::Seeded,
		})
	}

	/// Seeds the token window.
	///
	/// # Errors
	/// `Error::NoSeedFound` if a keyword query matches nothing or a random
	/// draw is attempted on an empty store. Not fatal: the caller decides
	/// whether to retry with another seed or abort.
	pub fn seed(&mut self, spec: SeedSpec) -> Result<(), Error> {
		let store = self.store;
		let tokens = match spec {
			SeedSpec::Explicit(tokens) => tokens,
			SeedSpec::Keyword(keyword) => {
				let matches = store.pattern_search(&keyword, true);
				if matches.is_empty() {
					info!("no stored key matches keyword '{}'", keyword);
					return Err(Error::NoSeedFound);
				}
				let picked = matches[self.rng.random_range(0..matches.len())].0;
				debug!("keyword '{}' matched {} keys, picked {}", keyword, matches.len(), picked);
				Key::decode(picked, store.key_mode())?.into_tokens()
			}
			SeedSpec::Random => {
				let picked = store.random_key(&mut self.rng)?;
				Key::decode(picked, store.key_mode())?.into_tokens()
			}
		};

		info!("seeded walk with {:?}", tokens);
		self.text = tokens;
		self.state = WalkState::Seeded;
		Ok(())
	}

	/// One extension step.
	///
	/// The last `order` emitted tokens form the lookup key (fewer, if the
	/// text is still shorter than the order; such keys normally miss). A
	/// miss is `Exhausted`; a hit samples one successor and appends it.
	pub fn step(&mut self) -> Result<WalkState, Error> {
		let store = self.store;
		let start = self.text.len().saturating_sub(self.order);
		let encoded = Key::new(self.text[start..].to_vec()).encode(store.key_mode())?;

		let Some(counts) = store.exact_lookup(&encoded) else {
			debug!("no successors stored for {}", encoded);
			self.state = WalkState::Exhausted;
			return Ok(self.state);
		};

		match weighted_sample(&mut self.rng, counts) {
			Some(successor) => {
				self.text.push(successor);
				self.state = WalkState::Extending;
			}
			// An empty counts row violates the store invariant; treat it
			// like a miss rather than panic.
			None => self.state = WalkState::Exhausted,
		}
		Ok(self.state)
	}

	/// Runs up to `target_len` steps, or fewer when the walk exhausts.
	///
	/// Returns the number of tokens actually emitted. The count is smaller
	/// than `target_len` exactly when the walk reached `Exhausted`.
	pub fn generate(&mut self, target_len: usize) -> Result<usize, Error> {
		self.generate_with_progress(target_len, |_, _| {})
	}

	/// Like `generate`, reporting `(emitted, target_len)` after each step.
	///
	/// The callback is presentation-agnostic; a console shell typically
	/// passes a throttled printer.
	pub fn generate_with_progress<F>(&mut self, target_len: usize, mut progress: F) -> Result<usize, Error>
	where
		F: FnMut(usize, usize),
	{
		info!("generating up to {} tokens", target_len);

		let mut emitted = 0;
		for _ in 0..target_len {
			if self.step()? == WalkState::Exhausted {
				info!("walk exhausted after {} of {} tokens", emitted, target_len);
				return Ok(emitted);
			}
			emitted += 1;
			progress(emitted, target_len);
		}

		self.state = WalkState::LimitReached;
		Ok(emitted)
	}

	/// The emitted token sequence, seed included.
	pub fn tokens(&self) -> &[String] {
		&self.text
	}

	pub fn state(&self) -> WalkState {
		self.state
	}
}

/// Samples one successor with probability proportional to its count.
///
/// Walks the map in its sorted iteration order, subtracting each count from
/// a uniform draw in `[0, total)` until it goes below the current entry.
/// The fixed order makes the outcome a pure function of the draw sequence.
pub(crate) fn weighted_sample<R: Rng>(rng: &mut R, counts: &SuffixCounts) -> Option<String> {
	let total: u64 = counts.values().sum();
	if total == 0 {
		return None;
	}

	let mut draw = rng.random_range(0..total);
	for (successor, count) in counts {
		if draw < *count {
			return Some(successor.clone());
		}
		draw -= count;
	}
	None
}
