use std::path::PathBuf;

use thiserror::Error;

use crate::model::key::KeyMode;

/// Errors produced by model building, storage and generation.
///
/// # Variants
/// - `InvalidOrder`: the requested n-gram order is zero. Raised before any
///   tokenization or storage access takes place.
/// - `SchemaMissing`: the store file does not exist yet. Distinguished from
///   other storage failures so that opening a store can attempt one schema
///   initialization before giving up.
/// - `StoreAccess`: any other storage failure (I/O, serialization). A batch
///   that fails mid-way is rolled back before this is returned.
/// - `KeyModeMismatch`: the store on disk was written with the other key
///   encoding. Key modes are fixed for a store's lifetime.
/// - `NoSeedFound`: keyword or random seeding found no usable key. Not
///   fatal; the caller decides whether to fall back or abort.
#[derive(Debug, Error)]
pub enum Error {
	#[error("order must be >= 1, got {0}")]
	InvalidOrder(usize),

	#[error("store schema is missing at {}", .0.display())]
	SchemaMissing(PathBuf),

	#[error("store access failed: {0}")]
	StoreAccess(String),

	#[error("store at {} holds {found} keys, cannot open it with {requested} keys", path.display())]
	KeyModeMismatch {
		path: PathBuf,
		found: KeyMode,
		requested: KeyMode,
	},

	#[error("no matching seed key was found")]
	NoSeedFound,
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Error::StoreAccess(err.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::StoreAccess(err.to_string())
	}
}
