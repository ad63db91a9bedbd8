//! Tables as stored values.
//!
//! A [`Table`] is a schema, a row map, and a map of unresolved conflicts. It
//! is persisted as a single struct value:
//!
//! ```text
//! Table {
//!   schema:    [Column { name, kind, primary_key }, ...],
//!   rows:      { <primary key> => Row { <column> => <value>, ... } },
//!   conflicts: { "<path>" => Conflict { base?, ours?, theirs? } },
//! }
//! ```
//!
//! The row key is the value of the single primary-key column, or a list of
//! the primary-key values in column order when the key spans several
//! columns.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use strata_value::{Format, Hash, Map, Value, ValueKind};

use super::conflict::Conflict;
use super::path::Path;

const TABLE_STRUCT: &str = "Table";
const COLUMN_STRUCT: &str = "Column";
const ROW_STRUCT: &str = "Row";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors building or decoding a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableError {
    /// A stored value does not have the table layout.
    Malformed {
        /// What was wrong.
        reason: String,
    },
    /// A schema definition is unusable.
    InvalidSchema {
        /// What was wrong.
        reason: String,
    },
    /// A row does not fit the schema.
    InvalidRow {
        /// What was wrong.
        reason: String,
    },
}

impl TableError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed table value: {reason}"),
            Self::InvalidSchema { reason } => write!(f, "invalid schema: {reason}"),
            Self::InvalidRow { reason } => write!(f, "invalid row: {reason}"),
        }
    }
}

impl std::error::Error for TableError {}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One column definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ValueKind,
    pub primary_key: bool,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
        }
    }

    /// A primary-key column.
    #[must_use]
    pub fn key(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            primary_key: true,
            ..Self::new(name, kind)
        }
    }

    fn to_value(&self) -> Value {
        Value::structure(
            COLUMN_STRUCT,
            [
                ("name", Value::from(self.name.as_str())),
                ("kind", Value::from(self.kind.name())),
                ("primary_key", Value::Bool(self.primary_key)),
            ],
        )
    }

    fn from_value(value: &Value) -> Result<Self, TableError> {
        let s = value
            .as_struct()
            .filter(|s| s.name() == COLUMN_STRUCT)
            .ok_or_else(|| TableError::malformed("schema entry is not a Column struct"))?;
        let name = s
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| TableError::malformed("column without a name"))?;
        let kind = s
            .get("kind")
            .and_then(Value::as_str)
            .and_then(ValueKind::from_name)
            .ok_or_else(|| TableError::malformed(format!("column {name:?} has no valid kind")))?;
        let primary_key = s
            .get("primary_key")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            name: name.to_owned(),
            kind,
            primary_key,
        })
    }
}

/// Ordered column definitions. At least one column is a primary key and
/// names are unique.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::InvalidSchema {
                    reason: format!("duplicate column {:?}", column.name),
                });
            }
        }
        if !columns.iter().any(|c| c.primary_key) {
            return Err(TableError::InvalidSchema {
                reason: "no primary key column".to_owned(),
            });
        }
        Ok(Self { columns })
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary-key columns in schema order.
    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// `true` if both schemas key rows on the same columns.
    #[must_use]
    pub fn same_primary_key(&self, other: &Self) -> bool {
        self.primary_key().eq(other.primary_key())
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::list(self.columns.iter().map(Column::to_value))
    }

    pub fn from_value(value: &Value) -> Result<Self, TableError> {
        let list = value
            .as_list()
            .ok_or_else(|| TableError::malformed("schema is not a list"))?;
        let columns = list
            .iter()
            .map(Column::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns).map_err(|e| TableError::malformed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// An immutable table snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    schema: Schema,
    rows: Map,
    conflicts: Map,
}

impl Table {
    /// An empty table.
    #[must_use]
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            rows: Map::empty(),
            conflicts: Map::empty(),
        }
    }

    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The row map, keyed by primary key.
    #[must_use]
    pub const fn rows(&self) -> &Map {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn get_row(&self, key: &Value) -> Option<&Value> {
        self.rows.get(key)
    }

    /// Build a row struct from `(column, value)` pairs.
    #[must_use]
    pub fn row<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::structure(ROW_STRUCT, fields)
    }

    /// The primary key of `row` under this table's schema.
    pub fn row_key(&self, row: &Value) -> Result<Value, TableError> {
        let s = row.as_struct().ok_or_else(|| TableError::InvalidRow {
            reason: format!("row is a {}, not a struct", row.kind()),
        })?;
        let mut parts = Vec::new();
        for column in self.schema.primary_key() {
            match s.get(&column.name) {
                Some(v) if !matches!(v, Value::Null) => parts.push(v.clone()),
                _ => {
                    return Err(TableError::InvalidRow {
                        reason: format!("missing primary key column {:?}", column.name),
                    });
                }
            }
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(Value::list(parts))
        }
    }

    /// A new table with `row` inserted or replaced under its primary key.
    pub fn with_row(&self, row: Value) -> Result<Self, TableError> {
        self.check_row(&row)?;
        let key = self.row_key(&row)?;
        Ok(Self {
            rows: self.rows.insert(key, row),
            ..self.clone()
        })
    }

    /// A new table without the row keyed by `key`.
    #[must_use]
    pub fn without_row(&self, key: &Value) -> Self {
        Self {
            rows: self.rows.remove(key),
            ..self.clone()
        }
    }

    /// A new table with the row map replaced wholesale.
    #[must_use]
    pub fn with_rows(&self, rows: Map) -> Self {
        Self {
            rows,
            ..self.clone()
        }
    }

    /// A new table with a different schema and the same rows.
    #[must_use]
    pub fn with_schema(&self, schema: Schema) -> Self {
        Self {
            schema,
            ..self.clone()
        }
    }

    fn check_row(&self, row: &Value) -> Result<(), TableError> {
        let Some(s) = row.as_struct() else {
            return Err(TableError::InvalidRow {
                reason: format!("row is a {}, not a struct", row.kind()),
            });
        };
        for (name, value) in s.fields() {
            let Some(column) = self.schema.column(name) else {
                return Err(TableError::InvalidRow {
                    reason: format!("unknown column {name:?}"),
                });
            };
            if !matches!(value, Value::Null) && value.kind() != column.kind {
                return Err(TableError::InvalidRow {
                    reason: format!(
                        "column {name:?} expects {}, got {}",
                        column.kind,
                        value.kind()
                    ),
                });
            }
        }
        Ok(())
    }

    // ----- Conflicts -----

    /// Raw stored conflicts, keyed by path text.
    #[must_use]
    pub const fn stored_conflicts(&self) -> &Map {
        &self.conflicts
    }

    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    #[must_use]
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Decode the stored conflicts, labelling each with `table`.
    pub fn conflicts(&self, table: &str) -> Result<Vec<Conflict>, TableError> {
        self.conflicts
            .iter()
            .map(|(path, value)| {
                let text = path
                    .as_str()
                    .ok_or_else(|| TableError::malformed("conflict key is not a string"))?;
                let path = Path::parse(text).map_err(|e| TableError::malformed(e.to_string()))?;
                Conflict::from_stored(table, path, value)
            })
            .collect()
    }

    /// A new table that also records `conflicts`. A conflict at a path that
    /// already has one replaces it.
    #[must_use]
    pub fn with_conflicts<'a>(&self, conflicts: impl IntoIterator<Item = &'a Conflict>) -> Self {
        let mut entries = self.conflicts.entries().clone();
        for conflict in conflicts {
            entries.insert(
                Value::from(conflict.path.to_string()),
                conflict.to_stored(),
            );
        }
        Self {
            conflicts: Map::new(entries),
            ..self.clone()
        }
    }

    /// A new table with the conflict at `path` marked resolved.
    #[must_use]
    pub fn resolve_conflict(&self, path: &Path) -> Self {
        Self {
            conflicts: self.conflicts.remove(&Value::from(path.to_string())),
            ..self.clone()
        }
    }

    /// A new table with every conflict marked resolved.
    #[must_use]
    pub fn without_conflicts(&self) -> Self {
        Self {
            conflicts: Map::empty(),
            ..self.clone()
        }
    }

    // ----- Encoding -----

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::structure(
            TABLE_STRUCT,
            [
                ("schema", self.schema.to_value()),
                ("rows", Value::Map(self.rows.clone())),
                ("conflicts", Value::Map(self.conflicts.clone())),
            ],
        )
    }

    pub fn from_value(value: &Value) -> Result<Self, TableError> {
        let s = value
            .as_struct()
            .filter(|s| s.name() == TABLE_STRUCT)
            .ok_or_else(|| {
                TableError::malformed(format!("expected Table struct, got {}", value.kind()))
            })?;
        let schema = Schema::from_value(
            s.get("schema")
                .ok_or_else(|| TableError::malformed("missing schema"))?,
        )?;
        let rows = field_map(s.fields(), "rows")?;
        let conflicts = field_map(s.fields(), "conflicts")?;
        Ok(Self {
            schema,
            rows,
            conflicts,
        })
    }

    /// Content hash of the stored form.
    #[must_use]
    pub fn hash(&self, format: Format) -> Hash {
        self.to_value().hash(format)
    }
}

fn field_map(fields: &BTreeMap<String, Value>, name: &str) -> Result<Map, TableError> {
    match fields.get(name) {
        Some(Value::Map(m)) => Ok(m.clone()),
        Some(other) => Err(TableError::malformed(format!(
            "{name} is a {}, not a map",
            other.kind()
        ))),
        None => Ok(Map::empty()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
