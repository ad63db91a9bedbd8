//! Error types for value storage.
//!
//! [`StoreError`] is the single error type returned by every
//! [`ValueStore`](crate::ValueStore) method. Callers above the store never
//! retry on it; retry policy, if any, belongs to the store implementation.

use thiserror::Error;

use crate::hash::Hash;

/// Errors returned by [`ValueStore`](crate::ValueStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A value was required but no chunk exists under its hash.
    #[error("value not found: {hash}")]
    NotFound {
        /// The content address that was looked up.
        hash: Hash,
    },

    /// A lock guarding the store's state was poisoned by a panicking writer.
    #[error("value store lock poisoned")]
    Poisoned,

    /// The backing chunk store (local or remote) failed.
    #[error("chunk store error: {message}")]
    Backend {
        /// Freeform error description from the backend.
        message: String,
    },
}

/// Error returned when a hash string is malformed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid hash {value:?}: {reason}")]
pub struct HashParseError {
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}
