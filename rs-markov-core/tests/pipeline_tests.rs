// End-to-end pipeline tests: tokenize, build, persist, merge, generate.

use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;

use rs_markov_core::error::Error;
use rs_markov_core::model::generator::SeedSpec;
use rs_markov_core::model::key::KeyMode;
use rs_markov_core::ops;
use rs_markov_core::store::ModelStore;
use rs_markov_core::tokenizer::CharTokenizer;

fn store_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
	dir.path().join(name)
}

#[test]
fn build_persist_and_reopen() {
	let dir = tempfile::tempdir().unwrap();
	let db = store_path(&dir, "markov.json");

	let keys = ops::build_and_persist(
		&db,
		"今日は晴れです。",
		2,
		KeyMode::Tupled,
		&CharTokenizer,
		Some("weather"),
	)
	.unwrap();
	assert!(keys > 0);

	let store = ModelStore::open(&db, KeyMode::Tupled).unwrap();
	assert_eq!(store.len(), keys);
	assert_eq!(store.titles().len(), 1);
	assert_eq!(store.titles()[0].name, "weather");
}

#[test]
fn ingesting_the_same_corpus_twice_doubles_counts() {
	let dir = tempfile::tempdir().unwrap();
	let db = store_path(&dir, "markov.json");
	let text = "今日は晴れです。";

	ops::build_and_persist(&db, text, 2, KeyMode::Tupled, &CharTokenizer, None).unwrap();
	let single = ModelStore::open(&db, KeyMode::Tupled).unwrap().export_all();

	ops::build_and_persist(&db, text, 2, KeyMode::Tupled, &CharTokenizer, None).unwrap();
	let double = ModelStore::open(&db, KeyMode::Tupled).unwrap().export_all();

	assert_eq!(single.len(), double.len());
	for (key, counts) in &single {
		for (successor, count) in counts {
			assert_eq!(double[key][successor], count * 2);
		}
	}
}

#[test]
fn merge_carries_one_store_into_another() {
	let dir = tempfile::tempdir().unwrap();
	let first = store_path(&dir, "first.json");
	let second = store_path(&dir, "second.json");

	ops::build_and_persist(&first, "abcabc", 1, KeyMode::Concatenated, &CharTokenizer, None).unwrap();
	ops::build_and_persist(&second, "abcd", 1, KeyMode::Concatenated, &CharTokenizer, None).unwrap();

	let carried = ops::merge_store(&first, &second, KeyMode::Concatenated).unwrap();
	assert!(carried > 0);

	let store = ModelStore::open(&second, KeyMode::Concatenated).unwrap();
	// "abcabc" holds a->b twice, "abcd" once more
	assert_eq!(store.exact_lookup("a").unwrap()["b"], 3);
	// "c"->"d" exists only in the destination corpus
	assert_eq!(store.exact_lookup("c").unwrap()["d"], 1);
}

#[test]
fn invalid_order_fails_before_touching_the_store() {
	let dir = tempfile::tempdir().unwrap();
	let db = store_path(&dir, "markov.json");

	let result = ops::build_and_persist(&db, "text", 0, KeyMode::Tupled, &CharTokenizer, None);
	assert!(matches!(result, Err(Error::InvalidOrder(0))));
	// The store file was never created
	assert!(!db.exists());
}

#[test]
fn generated_walk_replays_a_deterministic_chain() {
	let dir = tempfile::tempdir().unwrap();
	let db = store_path(&dir, "markov.json");

	// A single linear chain: every prefix has exactly one successor
	ops::build_and_persist(&db, "今日は晴れです。", 1, KeyMode::Tupled, &CharTokenizer, None).unwrap();

	let text = ops::generate_text(
		&db,
		KeyMode::Tupled,
		1,
		SeedSpec::Explicit(vec!["今".to_owned()]),
		10,
		false,
		StdRng::seed_from_u64(1),
		|_, _| {},
	)
	.unwrap();

	assert_eq!(text, "今日は晴れです。");
}

#[test]
fn generate_with_strip_extracts_one_sentence() {
	let dir = tempfile::tempdir().unwrap();
	let db = store_path(&dir, "markov.json");

	ops::build_and_persist(&db, "雨です。今日は晴れです。", 1, KeyMode::Tupled, &CharTokenizer, None)
		.unwrap();

	let text = ops::generate_text(
		&db,
		KeyMode::Tupled,
		1,
		SeedSpec::Explicit(vec!["雨".to_owned()]),
		40,
		true,
		StdRng::seed_from_u64(5),
		|_, _| {},
	)
	.unwrap();

	// Stripping keeps the span between the first and last boundary marker
	assert!(!text.is_empty());
	assert!(text.ends_with('。'));
	assert!(!text.starts_with('。'));
}

#[test]
fn keyword_generation_without_match_reports_no_seed() {
	let dir = tempfile::tempdir().unwrap();
	let db = store_path(&dir, "markov.json");

	ops::build_and_persist(&db, "abc", 1, KeyMode::Concatenated, &CharTokenizer, None).unwrap();

	let result = ops::generate_text(
		&db,
		KeyMode::Concatenated,
		1,
		SeedSpec::Keyword("zzz".to_owned()),
		10,
		false,
		StdRng::seed_from_u64(5),
		|_, _| {},
	);
	assert!(matches!(result, Err(Error::NoSeedFound)));
}

#[test]
fn search_pairs_keys_with_their_successors() {
	let dir = tempfile::tempdir().unwrap();
	let db = store_path(&dir, "markov.json");

	ops::build_and_persist(&db, "今日は晴れ", 2, KeyMode::Concatenated, &CharTokenizer, None).unwrap();

	let results = ops::search_store(&db, KeyMode::Concatenated, "今日", false).unwrap();
	assert_eq!(results.len(), 1);
	assert_eq!(results[0].0, "今日");
	assert_eq!(results[0].1, vec!["は".to_owned()]);
}

#[test]
fn count_ngrams_ranks_a_text() {
	let ranked = ops::count_ngrams_text("すもももももももものうち", 1, KeyMode::Concatenated, &CharTokenizer)
		.unwrap();
	assert_eq!(ranked[0].0, "も");
	assert_eq!(ranked[0].1, 8);
}
