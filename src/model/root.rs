//! Root values: the table set of one snapshot.
//!
//! A [`RootValue`] maps table names to the content hashes of stored
//! [`Table`] values. It is immutable; [`RootValue::put_table`] and
//! [`RootValue::remove_tables`] return new roots that share the store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use strata_value::{Format, Hash, StoreError, Value, ValueStore};

use super::table::{Table, TableError};

const ROOT_STRUCT: &str = "Root";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reading or updating a root.
#[derive(Debug)]
pub enum RootError {
    /// The value store failed.
    Store(StoreError),
    /// A stored table could not be decoded.
    Table {
        /// Table name.
        name: String,
        /// Decode failure.
        source: TableError,
    },
    /// A removal named a table that is not in the root.
    TableNotFound {
        /// Table name.
        name: String,
    },
    /// The stored root value does not have the root layout.
    Malformed {
        /// What was wrong.
        reason: String,
    },
}

impl fmt::Display for RootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "value store error: {e}"),
            Self::Table { name, source } => write!(f, "table {name:?}: {source}"),
            Self::TableNotFound { name } => write!(f, "table {name:?} not found"),
            Self::Malformed { reason } => write!(f, "malformed root value: {reason}"),
        }
    }
}

impl std::error::Error for RootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Table { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for RootError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// RootValue
// ---------------------------------------------------------------------------

/// An immutable table-name to table mapping backed by a [`ValueStore`].
#[derive(Clone)]
pub struct RootValue {
    store: Arc<dyn ValueStore>,
    tables: BTreeMap<String, Hash>,
}

impl RootValue {
    /// A root with no tables.
    #[must_use]
    pub fn empty(store: Arc<dyn ValueStore>) -> Self {
        Self {
            store,
            tables: BTreeMap::new(),
        }
    }

    /// Read the root stored under `hash`.
    pub fn load(store: Arc<dyn ValueStore>, hash: &Hash) -> Result<Self, RootError> {
        let value = store.must_read(hash)?;
        let tables = decode_tables(&value)?;
        Ok(Self { store, tables })
    }

    /// Persist this root and return its hash.
    pub fn commit(&self) -> Result<Hash, RootError> {
        Ok(self.store.write_value(&self.to_value())?)
    }

    /// The stored form: a `Root` struct holding a name to table-ref map.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::structure(
            ROOT_STRUCT,
            [(
                "tables",
                Value::map(
                    self.tables
                        .iter()
                        .map(|(name, hash)| (Value::from(name.as_str()), Value::Ref(*hash))),
                ),
            )],
        )
    }

    /// Content hash of the stored form.
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.to_value().hash(self.format())
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ValueStore> {
        &self.store
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.store.format()
    }

    /// Table names, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Hash of the named table's stored value.
    #[must_use]
    pub fn table_hash(&self, name: &str) -> Option<Hash> {
        self.tables.get(name).copied()
    }

    /// Read and decode the named table. `Ok(None)` if the root has no such
    /// table.
    pub fn get_table(&self, name: &str) -> Result<Option<Table>, RootError> {
        let Some(hash) = self.tables.get(name) else {
            return Ok(None);
        };
        let value = self.store.must_read(hash)?;
        Table::from_value(&value)
            .map(Some)
            .map_err(|source| RootError::Table {
                name: name.to_owned(),
                source,
            })
    }

    /// Store `table` and return a root that maps `name` to it.
    pub fn put_table(&self, name: &str, table: &Table) -> Result<Self, RootError> {
        let hash = self.store.write_value(&table.to_value())?;
        let mut tables = self.tables.clone();
        tables.insert(name.to_owned(), hash);
        Ok(Self {
            store: Arc::clone(&self.store),
            tables,
        })
    }

    /// A root without the named tables. Every name must be present.
    pub fn remove_tables<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, RootError> {
        let mut tables = self.tables.clone();
        for name in names {
            let name = name.as_ref();
            if tables.remove(name).is_none() {
                return Err(RootError::TableNotFound {
                    name: name.to_owned(),
                });
            }
        }
        Ok(Self {
            store: Arc::clone(&self.store),
            tables,
        })
    }

    /// Sorted names of tables that carry unresolved conflicts.
    pub fn tables_in_conflict(&self) -> Result<Vec<String>, RootError> {
        let mut names = Vec::new();
        for name in self.tables.keys() {
            if let Some(table) = self.get_table(name)?
                && table.has_conflicts()
            {
                names.push(name.clone());
            }
        }
        Ok(names)
    }
}

impl fmt::Debug for RootValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootValue")
            .field("format", &self.format())
            .field("tables", &self.tables)
            .finish_non_exhaustive()
    }
}

/// Sorted union of the table names in `a` and `b`.
#[must_use]
pub fn union_table_names(a: &RootValue, b: &RootValue) -> Vec<String> {
    a.tables
        .keys()
        .chain(b.tables.keys())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn decode_tables(value: &Value) -> Result<BTreeMap<String, Hash>, RootError> {
    let malformed = |reason: &str| RootError::Malformed {
        reason: reason.to_owned(),
    };
    let tables = value
        .as_struct()
        .filter(|s| s.name() == ROOT_STRUCT)
        .and_then(|s| s.get("tables"))
        .and_then(Value::as_map)
        .ok_or_else(|| malformed("expected Root struct with a tables map"))?;
    tables
        .iter()
        .map(|(name, target)| {
            let name = name
                .as_str()
                .ok_or_else(|| malformed("table name is not a string"))?;
            let hash = target
                .as_ref_target()
                .ok_or_else(|| malformed("table entry is not a ref"))?;
            Ok((name.to_owned(), hash))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use strata_value::{MemoryStore, ValueKind};

    use super::*;
    use crate::model::conflict::Conflict;
    use crate::model::path::Path;
    use crate::model::table::{Column, Schema};

    fn store() -> Arc<dyn ValueStore> {
        Arc::new(MemoryStore::new(Format::Current))
    }

    fn table(rows: &[(i64, &str)]) -> Table {
        let schema = Schema::new(vec![
            Column::key("id", ValueKind::Int),
            Column::new("val", ValueKind::Str),
        ])
        .unwrap();
        rows.iter().fold(Table::new(schema), |t, (id, val)| {
            t.with_row(Table::row([("id", Value::Int(*id)), ("val", Value::from(*val))]))
                .unwrap()
        })
    }

    #[test]
    fn put_and_get() {
        let root = RootValue::empty(store());
        let t = table(&[(1, "a")]);
        let updated = root.put_table("T", &t).unwrap();
        assert!(!root.has_table("T"));
        assert!(updated.has_table("T"));
        assert_eq!(updated.get_table("T").unwrap(), Some(t.clone()));
        assert_eq!(updated.table_hash("T"), Some(t.hash(Format::Current)));
        assert_eq!(updated.get_table("U").unwrap(), None);
    }

    #[test]
    fn remove_tables_requires_presence() {
        let root = RootValue::empty(store())
            .put_table("A", &table(&[]))
            .unwrap()
            .put_table("B", &table(&[]))
            .unwrap();
        let trimmed = root.remove_tables(&["A"]).unwrap();
        assert_eq!(trimmed.table_names(), vec!["B".to_owned()]);
        let err = root.remove_tables(&["A", "Z"]).unwrap_err();
        assert!(matches!(err, RootError::TableNotFound { ref name } if name == "Z"));
        assert!(root.has_table("A"));
    }

    #[test]
    fn commit_and_load() {
        let store = store();
        let root = RootValue::empty(Arc::clone(&store))
            .put_table("T", &table(&[(1, "a")]))
            .unwrap();
        let hash = root.commit().unwrap();
        assert_eq!(hash, root.hash());
        let loaded = RootValue::load(store, &hash).unwrap();
        assert_eq!(loaded.table_names(), root.table_names());
        assert_eq!(loaded.table_hash("T"), root.table_hash("T"));
    }

    #[test]
    fn load_rejects_non_root() {
        let store = store();
        let hash = store.write_value(&Value::Int(4)).unwrap();
        assert!(matches!(
            RootValue::load(store, &hash),
            Err(RootError::Malformed { .. })
        ));
    }

    #[test]
    fn union_is_sorted_and_deduplicated() {
        let s = store();
        let a = RootValue::empty(Arc::clone(&s))
            .put_table("b", &table(&[]))
            .unwrap()
            .put_table("a", &table(&[]))
            .unwrap();
        let b = RootValue::empty(s)
            .put_table("c", &table(&[]))
            .unwrap()
            .put_table("a", &table(&[]))
            .unwrap();
        assert_eq!(union_table_names(&a, &b), vec!["a", "b", "c"]);
    }

    #[test]
    fn tables_in_conflict_lists_only_conflicted() {
        let conflict = Conflict {
            table: "B".to_owned(),
            path: Path::parse("[1].val").unwrap(),
            base: None,
            ours: Some(Value::from("x")),
            theirs: Some(Value::from("y")),
        };
        let root = RootValue::empty(store())
            .put_table("A", &table(&[]))
            .unwrap()
            .put_table("B", &table(&[]).with_conflicts([&conflict]))
            .unwrap();
        assert_eq!(root.tables_in_conflict().unwrap(), vec!["B".to_owned()]);
    }

    #[test]
    fn debug_omits_store() {
        let root = RootValue::empty(store());
        assert!(format!("{root:?}").starts_with("RootValue"));
    }
}
