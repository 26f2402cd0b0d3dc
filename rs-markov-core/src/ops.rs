use std::path::Path;

use log::info;
use rand::Rng;

use crate::error::Error;
use crate::model::builder::ModelBuilder;
use crate::model::generator::{Generator, SeedSpec};
use crate::model::key::{Delta, KeyMode};
use crate::model::sentence;
use crate::store::ModelStore;
use crate::tokenizer::{Tokenizer, tokenize_text};

/// Builds an n-gram delta from a raw text and merges it into the store at
/// `db_path`, recording provenance when a title is given.
///
/// Returns the number of distinct keys the text contributed.
pub fn build_and_persist(
	db_path: &Path,
	text: &str,
	order: usize,
	key_mode: KeyMode,
	tokenizer: &dyn Tokenizer,
	title: Option<&str>,
) -> Result<usize, Error> {
	// Order validation happens before any tokenization
	let builder = ModelBuilder::new(order, key_mode)?;

	let tokens = tokenize_text(tokenizer, text);
	info!("ingesting {} tokens at order {}", tokens.len(), order);

	let delta = builder.build(&tokens, Delta::new())?;
	let mut store = ModelStore::open(db_path, key_mode)?;
	store.merge_upsert(&delta)?;
	if let Some(name) = title {
		store.record_title(name)?;
	}

	Ok(delta.len())
}

/// Merges the full content of the store at `src_path` into the store at
/// `dst_path`. Both stores must use the same key mode.
///
/// Returns the number of keys carried over.
pub fn merge_store(src_path: &Path, dst_path: &Path, key_mode: KeyMode) -> Result<usize, Error> {
	let source = ModelStore::open(src_path, key_mode)?;
	let snapshot = source.export_all();
	info!("exported {} keys from {}", snapshot.len(), src_path.display());

	let mut destination = ModelStore::open(dst_path, key_mode)?;
	destination.merge_upsert(&snapshot)?;

	Ok(snapshot.len())
}

/// Tokenizes a raw text and returns its n-grams of `order` tokens, ranked
/// by descending frequency.
pub fn count_ngrams_text(
	text: &str,
	order: usize,
	key_mode: KeyMode,
	tokenizer: &dyn Tokenizer,
) -> Result<Vec<(String, u64)>, Error> {
	let builder = ModelBuilder::new(order, key_mode)?;
	let tokens = tokenize_text(tokenizer, text);
	builder.count_ngrams(&tokens)
}

/// Seeds a walk over the store at `db_path`, extends it up to `length`
/// tokens and returns the display string, optionally trimmed to a single
/// sentence.
pub fn generate_text<R, F>(
	db_path: &Path,
	key_mode: KeyMode,
	order: usize,
	seed: SeedSpec,
	length: usize,
	strip: bool,
	rng: R,
	progress: F,
) -> Result<String, Error>
where
	R: Rng,
	F: FnMut(usize, usize),
{
	let store = ModelStore::open(db_path, key_mode)?;
	let mut generator = Generator::with_rng(&store, order, rng)?;
	generator.seed(seed)?;

	let emitted = generator.generate_with_progress(length, progress)?;
	info!("emitted {} of {} requested tokens", emitted, length);

	Ok(sentence::extract(generator.tokens(), strip))
}

/// Searches the store for keys containing `keyword` and pairs each match
/// with its observed successors.
pub fn search_store(
	db_path: &Path,
	key_mode: KeyMode,
	keyword: &str,
	fuzzy: bool,
) -> Result<Vec<(String, Vec<String>)>, Error> {
	let store = ModelStore::open(db_path, key_mode)?;
	let results = store
		.pattern_search(keyword, fuzzy)
		.into_iter()
		.map(|(key, counts)| (key.to_owned(), counts.keys().cloned().collect()))
		.collect();
	Ok(results)
}
