#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Raw memory supply for the table's slot buffer.
pub mod allocator;

mod bitmask;

/// Errors reported by the fallible operations.
pub mod error;

/// Hashing support: the default hasher builder and an integer-tuned hasher.
pub mod hash;

/// A HashMap implementation using coalesced hashing.
///
/// This module provides a `HashMap` that wraps the `HashTable` and provides
/// a standard key-value map interface with configurable hashers.
pub mod hash_map;

/// The coalesced hashing engine, addressed by precomputed hashes.
pub mod hash_table;

pub use allocator::Allocator;
pub use allocator::Global;
pub use error::Error;
pub use hash::DefaultHashBuilder;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_table::DEFAULT_MAX_LOAD_FACTOR;
pub use hash_table::HashTable;
