use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Error;
use crate::model::key::{Delta, KeyMode, SuffixCounts};

const SCHEMA_VERSION: u32 = 1;

/// One persisted model row: a unique encoded prefix key and the serialized
/// successor counts, both kept as text.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct ItemRow {
	id: u64,
	key: String,
	value: String,
}

/// Provenance of one ingested document. Informational only; correctness of
/// the model never depends on it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TitleRow {
	pub id: u64,
	pub name: String,
	pub timestamp: u64,
}

/// On-disk shape of a store file.
#[derive(Serialize, Deserialize, Debug)]
struct StoreDocument {
	version: u32,
	key_mode: KeyMode,
	next_id: u64,
	items: Vec<ItemRow>,
	titles: Vec<TitleRow>,
}

impl StoreDocument {
	fn empty(key_mode: KeyMode) -> Self {
		Self {
			version: SCHEMA_VERSION,
			key_mode,
			next_id: 1,
			items: Vec::new(),
			titles: Vec::new(),
		}
	}
}

/// Decoded working state. Cloned to stage a batch before committing it.
#[derive(Clone, Debug)]
struct StoreState {
	next_id: u64,
	/// Encoded key to (row id, successor counts)
	rows: BTreeMap<String, (u64, SuffixCounts)>,
	/// Row id to encoded key, for the random draw
	ids: BTreeMap<u64, String>,
	titles: Vec<TitleRow>,
}

/// Durable mapping from encoded prefix key to successor counts.
///
/// # Responsibilities
/// - Own all persisted model rows; every mutation goes through
///   `merge_upsert` (or `record_title` for the audit rows)
/// - Commit each batch atomically: a temp file is written next to the
///   store and renamed over it, so either every row of a batch lands or
///   the file is untouched
/// - Serve exact lookups, substring search, full export and the
///   approximate random key draw
///
/// # Invariants
/// - Row ids grow monotonically and are never reused
/// - Counts only grow under merges
/// - The key mode is fixed at creation and checked on every open
pub struct ModelStore {
	path: PathBuf,
	key_mode: KeyMode,
	state: StoreState,
}

impl ModelStore {
	/// Opens a store file, initializing its schema first if missing.
	///
	/// The existence check is explicit: a missing file triggers exactly one
	/// `ensure_schema` attempt before the document is read. A failure after
	/// that initialization is a fatal `Error::StoreAccess`.
	///
	/// # Errors
	/// - `Error::KeyModeMismatch` if the file was written with the other
	///   key encoding
	/// - `Error::StoreAccess` on I/O or serialization failure
	pub fn open<P: AsRef<Path>>(path: P, key_mode: KeyMode) -> Result<Self, Error> {
		let path = path.as_ref().to_path_buf();

		if let Err(Error::SchemaMissing(_)) = Self::check_schema(&path) {
			info!("store schema missing at {}, initializing", path.display());
			Self::ensure_schema(&path, key_mode)?;
		}

		let document = Self::read_document(&path)?;
		if document.key_mode != key_mode {
			return Err(Error::KeyModeMismatch {
				path,
				found: document.key_mode,
				requested: key_mode,
			});
		}

		let state = Self::decode_document(document)?;
		info!("opened store {} with {} keys", path.display(), state.rows.len());
		Ok(Self { path, key_mode, state })
	}

	/// Verifies that the store schema exists, without touching its content.
	fn check_schema(path: &Path) -> Result<(), Error> {
		if path.exists() {
			Ok(())
		} else {
			Err(Error::SchemaMissing(path.to_path_buf()))
		}
	}

	/// Creates an empty store document if none exists. Idempotent; safe to
	/// call on every open.
	pub fn ensure_schema(path: &Path, key_mode: KeyMode) -> Result<(), Error> {
		if path.exists() {
			return Ok(());
		}
		Self::write_document(path, &StoreDocument::empty(key_mode))
	}

	fn read_document(path: &Path) -> Result<StoreDocument, Error> {
		let file = File::open(path)?;
		let document: StoreDocument = serde_json::from_reader(BufReader::new(file))?;
		Ok(document)
	}

	fn decode_document(document: StoreDocument) -> Result<StoreState, Error> {
		let mut rows = BTreeMap::new();
		let mut ids = BTreeMap::new();
		for row in document.items {
			let counts: SuffixCounts = serde_json::from_str(&row.value)?;
			ids.insert(row.id, row.key.clone());
			rows.insert(row.key, (row.id, counts));
		}
		Ok(StoreState {
			next_id: document.next_id,
			rows,
			ids,
			titles: document.titles,
		})
	}

	fn encode_state(&self, state: &StoreState) -> Result<StoreDocument, Error> {
		let mut items = Vec::with_capacity(state.rows.len());
		for (id, key) in &state.ids {
			let (_, counts) = state
				.rows
				.get(key)
				.ok_or_else(|| Error::StoreAccess(format!("row {id} lost its key entry")))?;
			items.push(ItemRow {
				id: *id,
				key: key.clone(),
				value: serde_json::to_string(counts)?,
			});
		}
		Ok(StoreDocument {
			version: SCHEMA_VERSION,
			key_mode: self.key_mode,
			next_id: state.next_id,
			items,
			titles: state.titles.clone(),
		})
	}

	/// Writes a document atomically: temp file in the same directory, then
	/// a rename over the destination.
	fn write_document(path: &Path, document: &StoreDocument) -> Result<(), Error> {
		let parent = path.parent().unwrap_or_else(|| Path::new("."));
		let temp_file = NamedTempFile::new_in(parent)?;
		let mut writer = BufWriter::new(&temp_file);
		serde_json::to_writer(&mut writer, document)?;
		writer.flush()?;
		drop(writer);
		temp_file
			.persist(path)
			.map_err(|err| Error::StoreAccess(err.to_string()))?;
		Ok(())
	}

	/// Commits a staged state. On failure nothing changes, in memory or on
	/// disk.
	fn commit(&mut self, staged: StoreState) -> Result<(), Error> {
		let document = self.encode_state(&staged)?;
		if let Err(err) = Self::write_document(&self.path, &document) {
			error!("commit to {} failed, batch rolled back: {}", self.path.display(), err);
			return Err(err);
		}
		self.state = staged;
		Ok(())
	}

	/// Adds the delta's counts into the stored counts, row by row.
	///
	/// Existing rows gain the delta's counts per successor, new successor
	/// entries are created as needed, and unseen keys get fresh rows with
	/// the next free ids. The whole batch commits atomically: either every
	/// row lands or the store is exactly as it was before the call.
	pub fn merge_upsert(&mut self, delta: &Delta) -> Result<(), Error> {
		if delta.is_empty() {
			debug!("empty delta, nothing to merge");
			return Ok(());
		}

		let mut staged = self.state.clone();
		for (key, counts) in delta {
			match staged.rows.get_mut(key) {
				Some((_, existing)) => {
					for (successor, count) in counts {
						*existing.entry(successor.clone()).or_insert(0) += count;
					}
				}
				None => {
					let id = staged.next_id;
					staged.next_id += 1;
					staged.ids.insert(id, key.clone());
					staged.rows.insert(key.clone(), (id, counts.clone()));
				}
			}
		}

		self.commit(staged)?;
		info!("committed {} keys into {}", delta.len(), self.path.display());
		Ok(())
	}

	/// Looks up the successor counts stored for one encoded key. No side
	/// effects.
	pub fn exact_lookup(&self, key: &str) -> Option<&SuffixCounts> {
		self.state.rows.get(key).map(|(_, counts)| counts)
	}

	/// Finds every row whose encoded key textually contains `keyword`.
	///
	/// In fuzzy mode each character of the keyword is a required substring
	/// in order, with arbitrary gaps between them. Result order is
	/// store-defined.
	pub fn pattern_search(&self, keyword: &str, fuzzy: bool) -> Vec<(&str, &SuffixCounts)> {
		self.state
			.rows
			.iter()
			.filter(|(key, _)| {
				if fuzzy {
					is_loose_match(key, keyword)
				} else {
					key.contains(keyword)
				}
			})
			.map(|(key, (_, counts))| (key.as_str(), counts))
			.collect()
	}

	/// Snapshots the whole model as a delta, ready to be merged into
	/// another store.
	pub fn export_all(&self) -> Delta {
		self.state
			.rows
			.iter()
			.map(|(key, (_, counts))| (key.clone(), counts.clone()))
			.collect()
	}

	/// Draws a stored key at random, by probing row identifiers.
	///
	/// Takes the maximum row id, draws a uniform integer below it, and
	/// returns the first row whose id is strictly greater, retrying on a
	/// miss. This is approximate, not uniform: a key sitting after a larger
	/// id gap is disproportionately likely to be drawn. The only guarantee
	/// is that a key present in the store is returned.
	///
	/// # Errors
	/// `Error::NoSeedFound` if the store holds no rows.
	pub fn random_key<R: Rng>(&self, rng: &mut R) -> Result<&str, Error> {
		let max_id = match self.state.ids.last_key_value() {
			Some((id, _)) => *id,
			None => return Err(Error::NoSeedFound),
		};

		loop {
			let draw = rng.random_range(0..max_id);
			if let Some((_, key)) = self.state.ids.range(draw + 1..).next() {
				debug!("random draw {} selected key {}", draw, key);
				return Ok(key);
			}
			debug!("random draw {} found no row, retrying", draw);
		}
	}

	/// Records the name and timestamp of an ingested document in the audit
	/// rows. Committed with the same atomicity as a merge batch.
	pub fn record_title(&mut self, name: &str) -> Result<(), Error> {
		let timestamp = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|elapsed| elapsed.as_secs())
			.unwrap_or(0);

		let mut staged = self.state.clone();
		let id = staged.titles.last().map(|title| title.id + 1).unwrap_or(1);
		staged.titles.push(TitleRow {
			id,
			name: name.to_owned(),
			timestamp,
		});

		self.commit(staged)?;
		debug!("recorded ingestion of '{}'", name);
		Ok(())
	}

	pub fn titles(&self) -> &[TitleRow] {
		&self.state.titles
	}

	pub fn key_mode(&self) -> KeyMode {
		self.key_mode
	}

	pub fn len(&self) -> usize {
		self.state.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.state.rows.is_empty()
	}
}

/// True when every character of `keyword` appears in `key`, in order, with
/// arbitrary gaps between them.
fn is_loose_match(key: &str, keyword: &str) -> bool {
	let mut rest = key;
	for wanted in keyword.chars() {
		match rest.find(wanted) {
			Some(index) => rest = &rest[index + wanted.len_utf8()..],
			None => return false,
		}
	}
	true
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	use super::*;
	use crate::model::key::Key;

	fn delta(entries: &[(&str, &[(&str, u64)])]) -> Delta {
		entries
			.iter()
			.map(|(key, counts)| {
				let counts: SuffixCounts = counts
					.iter()
					.map(|(successor, count)| ((*successor).to_owned(), *count))
					.collect();
				((*key).to_owned(), counts)
			})
			.collect()
	}

	fn temp_store(key_mode: KeyMode) -> (tempfile::TempDir, ModelStore) {
		let dir = tempfile::tempdir().unwrap();
		let store = ModelStore::open(dir.path().join("markov.json"), key_mode).unwrap();
		(dir, store)
	}

	#[test]
	fn open_initializes_missing_schema_once() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("markov.json");
		assert!(!path.exists());

		let store = ModelStore::open(&path, KeyMode::Tupled).unwrap();
		assert!(path.exists());
		assert!(store.is_empty());

		// Idempotent on a second open
		let store = ModelStore::open(&path, KeyMode::Tupled).unwrap();
		assert!(store.is_empty());
	}

	#[test]
	fn key_mode_is_fixed_per_store() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("markov.json");
		ModelStore::open(&path, KeyMode::Tupled).unwrap();

		assert!(matches!(
			ModelStore::open(&path, KeyMode::Concatenated),
			Err(Error::KeyModeMismatch { .. })
		));
	}

	#[test]
	fn merge_upsert_survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("markov.json");

		let mut store = ModelStore::open(&path, KeyMode::Concatenated).unwrap();
		store.merge_upsert(&delta(&[("ab", &[("c", 2)])])).unwrap();
		drop(store);

		let store = ModelStore::open(&path, KeyMode::Concatenated).unwrap();
		assert_eq!(store.exact_lookup("ab").unwrap()["c"], 2);
	}

	#[test]
	fn merging_same_delta_twice_doubles_every_count() {
		let (_dir, mut store) = temp_store(KeyMode::Concatenated);
		let batch = delta(&[("ab", &[("c", 3), ("d", 1)]), ("bc", &[("e", 2)])]);

		store.merge_upsert(&batch).unwrap();
		store.merge_upsert(&batch).unwrap();

		for (key, counts) in &batch {
			for (successor, count) in counts {
				assert_eq!(store.exact_lookup(key).unwrap()[successor], count * 2);
			}
		}
	}

	#[test]
	fn merge_creates_new_successor_entries() {
		let (_dir, mut store) = temp_store(KeyMode::Concatenated);
		store.merge_upsert(&delta(&[("ab", &[("c", 1)])])).unwrap();
		store.merge_upsert(&delta(&[("ab", &[("d", 4)])])).unwrap();

		let counts = store.exact_lookup("ab").unwrap();
		assert_eq!(counts["c"], 1);
		assert_eq!(counts["d"], 4);
	}

	#[test]
	fn failed_commit_rolls_back_the_batch() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("markov.json");

		let mut store = ModelStore::open(&path, KeyMode::Concatenated).unwrap();
		store.merge_upsert(&delta(&[("ab", &[("c", 1)])])).unwrap();

		// Make the commit rename fail by putting a directory in the way
		std::fs::remove_file(&path).unwrap();
		std::fs::create_dir(&path).unwrap();

		let result = store.merge_upsert(&delta(&[("ab", &[("c", 9)]), ("zz", &[("q", 1)])]));
		assert!(matches!(result, Err(Error::StoreAccess(_))));

		// Nothing from the failed batch is visible
		assert_eq!(store.exact_lookup("ab").unwrap()["c"], 1);
		assert!(store.exact_lookup("zz").is_none());
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn exact_lookup_misses_return_none() {
		let (_dir, store) = temp_store(KeyMode::Tupled);
		assert!(store.exact_lookup("missing").is_none());
	}

	#[test]
	fn pattern_search_plain_contains() {
		let (_dir, mut store) = temp_store(KeyMode::Concatenated);
		store
			.merge_upsert(&delta(&[("今日は", &[("晴", 1)]), ("明日は", &[("雨", 1)])]))
			.unwrap();

		let hits = store.pattern_search("今日", false);
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].0, "今日は");
	}

	#[test]
	fn pattern_search_fuzzy_allows_gaps_in_order() {
		let (_dir, mut store) = temp_store(KeyMode::Concatenated);
		store
			.merge_upsert(&delta(&[("今日は晴れ", &[("。", 1)]), ("晴れは今日", &[("。", 1)])]))
			.unwrap();

		// Characters must appear in keyword order
		let hits = store.pattern_search("今晴", true);
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].0, "今日は晴れ");
	}

	#[test]
	fn export_all_round_trips_into_another_store() {
		let (_dir, mut source) = temp_store(KeyMode::Concatenated);
		let batch = delta(&[("ab", &[("c", 3)]), ("cd", &[("e", 1)])]);
		source.merge_upsert(&batch).unwrap();

		let (_dir2, mut dest) = temp_store(KeyMode::Concatenated);
		dest.merge_upsert(&source.export_all()).unwrap();

		assert_eq!(dest.exact_lookup("ab").unwrap()["c"], 3);
		assert_eq!(dest.exact_lookup("cd").unwrap()["e"], 1);
	}

	#[test]
	fn random_key_always_returns_a_stored_key() {
		let (_dir, mut store) = temp_store(KeyMode::Concatenated);
		store
			.merge_upsert(&delta(&[("ab", &[("c", 1)]), ("bc", &[("d", 1)]), ("cd", &[("e", 1)])]))
			.unwrap();

		let mut rng = StdRng::seed_from_u64(7);
		for _ in 0..200 {
			let key = store.random_key(&mut rng).unwrap();
			assert!(store.exact_lookup(key).is_some());
		}
	}

	#[test]
	fn random_key_on_empty_store_is_no_seed() {
		let (_dir, store) = temp_store(KeyMode::Tupled);
		let mut rng = StdRng::seed_from_u64(7);
		assert!(matches!(store.random_key(&mut rng), Err(Error::NoSeedFound)));
	}

	#[test]
	fn titles_record_provenance() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("markov.json");

		let mut store = ModelStore::open(&path, KeyMode::Tupled).unwrap();
		store.record_title("corpus.txt").unwrap();
		store.record_title("novel.txt").unwrap();
		drop(store);

		let store = ModelStore::open(&path, KeyMode::Tupled).unwrap();
		let names: Vec<&str> = store.titles().iter().map(|title| title.name.as_str()).collect();
		assert_eq!(names, vec!["corpus.txt", "novel.txt"]);
		assert_eq!(store.titles()[1].id, 2);
	}

	#[test]
	fn tupled_rows_keep_non_ascii_text_verbatim() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("markov.json");

		let mut store = ModelStore::open(&path, KeyMode::Tupled).unwrap();
		let key = Key::new(vec!["今日".to_owned(), "は".to_owned()])
			.encode(KeyMode::Tupled)
			.unwrap();
		store.merge_upsert(&delta(&[(key.as_str(), &[("晴れ", 1)])])).unwrap();
		drop(store);

		let raw = std::fs::read_to_string(&path).unwrap();
		assert!(raw.contains("今日"));
		assert!(raw.contains("晴れ"));
		assert!(!raw.contains("\\u"));
	}
}
