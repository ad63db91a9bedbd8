//! Content-addressed value graph for strata.
//!
//! This crate is the storage-facing half of strata: immutable values that
//! hash to stable content addresses, a format-aware ordering over them, and
//! the [`ValueStore`] trait through which the diff/merge engine reads and
//! writes values. The engine never touches a concrete store; it programs
//! against the trait.
//!
//! # Crate layout
//!
//! - [`hash`]: the 20-byte content address ([`Hash`]).
//! - [`format`]: encoding versions ([`Format`]); hashes differ per format.
//! - [`value`]: the [`Value`] tree and its composite node types.
//! - [`store`]: the [`ValueStore`] trait and the in-memory [`MemoryStore`].
//! - [`error`]: [`StoreError`] and [`HashParseError`].

pub mod error;
pub mod format;
pub mod hash;
pub mod store;
pub mod value;

pub use error::{HashParseError, StoreError};
pub use format::Format;
pub use hash::Hash;
pub use store::{MemoryStore, ValueStore};
pub use value::{List, Map, Set, Struct, Value, ValueKind};
