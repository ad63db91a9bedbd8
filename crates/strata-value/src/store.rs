//! The value store boundary.
//!
//! [`ValueStore`] is the only way the diff/merge engine reaches persisted
//! values. Implementations may sit on a local chunk file, a remote chunk
//! service, or (for tests and embedding) plain memory. Every method may fail
//! with a [`StoreError`]; nothing above this trait retries.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::StoreError;
use crate::format::Format;
use crate::hash::Hash;
use crate::value::Value;

/// Read/write access to content-addressed values.
///
/// Writes are idempotent: writing a value that is already present returns
/// the same hash and changes nothing.
pub trait ValueStore: Send + Sync {
    /// The format every value in this store is hashed under.
    fn format(&self) -> Format;

    /// Look up a value by its content address.
    ///
    /// Returns `Ok(None)` if no value is stored under `hash`.
    fn read_value(&self, hash: &Hash) -> Result<Option<Value>, StoreError>;

    /// Persist `value` and return its content address.
    fn write_value(&self, value: &Value) -> Result<Hash, StoreError>;

    /// Like [`ValueStore::read_value`], but a missing value is an error.
    fn must_read(&self, hash: &Hash) -> Result<Value, StoreError> {
        self.read_value(hash)?
            .ok_or(StoreError::NotFound { hash: *hash })
    }
}

/// An in-process [`ValueStore`] backed by a hash map.
#[derive(Debug)]
pub struct MemoryStore {
    format: Format,
    chunks: RwLock<HashMap<Hash, Value>>,
    reads: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store using `format`.
    #[must_use]
    pub fn new(format: Format) -> Self {
        Self {
            format,
            chunks: RwLock::new(HashMap::new()),
            reads: AtomicU64::new(0),
        }
    }

    /// Number of distinct values stored.
    ///
    /// # Errors
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.chunks.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    /// `true` if nothing has been written.
    ///
    /// # Errors
    /// Returns [`StoreError::Poisoned`] if a writer panicked.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Total number of successful `read_value` calls, hit or miss.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Format::default())
    }
}

impl ValueStore for MemoryStore {
    fn format(&self) -> Format {
        self.format
    }

    fn read_value(&self, hash: &Hash) -> Result<Option<Value>, StoreError> {
        let chunks = self.chunks.read().map_err(|_| StoreError::Poisoned)?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(chunks.get(hash).cloned())
    }

    fn write_value(&self, value: &Value) -> Result<Hash, StoreError> {
        let hash = value.hash(self.format);
        let mut chunks = self.chunks.write().map_err(|_| StoreError::Poisoned)?;
        chunks.entry(hash).or_insert_with(|| value.clone());
        Ok(hash)
    }
}
