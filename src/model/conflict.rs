//! Merge conflicts.
//!
//! A [`Conflict`] records a location that both sides of a merge changed in
//! different ways. Each side's value is optional: `None` means the location
//! did not exist on that side.
//!
//! | Kind | Base | Ours | Theirs |
//! |------|------|------|--------|
//! | [`ConflictKind::BothModified`] | present | present | present |
//! | [`ConflictKind::ModifyDelete`] | present | one side absent | |
//! | [`ConflictKind::AddAdd`] | absent | present | present |
//!
//! Conflicts are data, not errors. They are stored in the merged table
//! until a caller resolves them, and summarised as JSON for reports:
//!
//! ```json
//! {"table":"T","path":"[1].val","kind":"both_modified","base":"\"a\"","ours":"\"b\"","theirs":"\"c\""}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_value::Value;

use super::path::Path;
use super::table::TableError;

const CONFLICT_STRUCT: &str = "Conflict";

/// How the two sides disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed an existing value differently.
    BothModified,
    /// One side changed the value, the other removed it.
    ModifyDelete,
    /// Both sides added different values at a new location.
    AddAdd,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothModified => write!(f, "both modified"),
            Self::ModifyDelete => write!(f, "modify/delete"),
            Self::AddAdd => write!(f, "add/add"),
        }
    }
}

/// One unresolved location in one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub table: String,
    pub path: Path,
    pub base: Option<Value>,
    pub ours: Option<Value>,
    pub theirs: Option<Value>,
}

impl Conflict {
    #[must_use]
    pub const fn kind(&self) -> ConflictKind {
        match (&self.base, &self.ours, &self.theirs) {
            (None, _, _) => ConflictKind::AddAdd,
            (Some(_), None, _) | (Some(_), _, None) => ConflictKind::ModifyDelete,
            (Some(_), Some(_), Some(_)) => ConflictKind::BothModified,
        }
    }

    /// The stored form kept in a table's conflict map.
    #[must_use]
    pub fn to_stored(&self) -> Value {
        let fields = [
            ("base", &self.base),
            ("ours", &self.ours),
            ("theirs", &self.theirs),
        ];
        Value::structure(
            CONFLICT_STRUCT,
            fields
                .into_iter()
                .filter_map(|(name, v)| v.clone().map(|v| (name, v))),
        )
    }

    /// Decode a stored conflict found at `path` in `table`.
    pub fn from_stored(table: &str, path: Path, value: &Value) -> Result<Self, TableError> {
        let s = value
            .as_struct()
            .filter(|s| s.name() == CONFLICT_STRUCT)
            .ok_or_else(|| {
                TableError::malformed(format!("conflict at {path} is not a Conflict struct"))
            })?;
        Ok(Self {
            table: table.to_owned(),
            base: s.get("base").cloned(),
            ours: s.get("ours").cloned(),
            theirs: s.get("theirs").cloned(),
            path,
        })
    }

    #[must_use]
    pub fn summary(&self) -> ConflictSummary {
        let render = |v: &Option<Value>| v.as_ref().map(ToString::to_string);
        ConflictSummary {
            table: self.table.clone(),
            path: self.path.to_string(),
            kind: self.kind(),
            base: render(&self.base),
            ours: render(&self.ours),
            theirs: render(&self.theirs),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} conflict in {} at {}", self.kind(), self.table, self.path)
    }
}

/// Serializable rendering of a [`Conflict`] for reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub table: String,
    pub path: String,
    pub kind: ConflictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theirs: Option<String>,
}
