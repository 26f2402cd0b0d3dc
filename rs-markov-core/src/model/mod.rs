//! Top-level module for the n-gram model system.
//!
//! This module provides the in-memory half of the pipeline:
//! - Prefix key encodings and count maps (`key`)
//! - Delta construction from token streams (`builder`)
//! - The generation walk with weighted sampling (`generator`)
//! - Sentence extraction for generated output (`sentence`)

/// Prefix key type, the two key encodings, and the count map aliases
/// shared by the builder, the store and the generator.
pub mod key;

/// Sliding-window model construction and n-gram counting.
///
/// Accumulates prefix-to-successor counts into an explicitly passed delta.
pub mod builder;

/// Stateful generation walk over a stored model.
///
/// Handles seeding, weighted successor sampling, and termination by
/// exhaustion or length limit.
pub mod generator;

/// Post-processing of generated tokens into a display string, optionally
/// trimmed to one well-formed sentence.
pub mod sentence;
