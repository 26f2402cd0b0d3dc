//! Markov-chain text modeling and generation library.
//!
//! This crate provides a token-level n-gram pipeline including:
//! - Model construction from ordered token streams
//! - A durable, incrementally mergeable model store
//! - Weighted random-walk generation with sentence extraction
//! - A tokenizer adapter for plugging in a morphological analyzer
//!
//! The high-level entry points live in `ops`; the individual components
//! are public for callers that need finer control.

/// Crate-wide error type.
pub mod error;

/// In-memory model construction and generation logic.
pub mod model;

/// High-level operations tying tokenizer, builder, store and generator
/// together for a driving shell.
pub mod ops;

/// Durable model store with merge-upsert, search and random key draws.
pub mod store;

/// Token type, tokenizer contract and the character-level fallback.
pub mod tokenizer;

/// Internal text normalization helpers.
///
/// Not exposed
pub(crate) mod io;
