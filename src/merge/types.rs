//! Core types for the table merge engine.
//!
//! - [`MergeOptions`] / [`FailurePolicy`]: how a merge runs.
//! - [`MergeStats`] / [`TableMergeOp`]: what happened to each table.
//! - [`TableMergeError`] / [`TableMergeFailure`]: why a table could not be
//!   merged.
//! - [`MergeOutcome`]: the merged root plus everything above.
//! - [`MergeError`]: hard failures that stop the whole merge.

use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::context::ContextError;
use crate::model::conflict::{Conflict, ConflictSummary};
use crate::model::diff::DiffError;
use crate::model::patch::PatchError;
use crate::model::root::{RootError, RootValue};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do when a table cannot be merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole merge and leave every root untouched.
    #[default]
    Abort,
    /// Keep our version of the failed table and report the failure.
    Continue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

/// Knobs for [`merge_commits`](super::commits::merge_commits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Worker threads for per-table merges. `0` uses the available
    /// parallelism.
    pub workers: usize,
    pub on_table_failure: FailurePolicy,
}

impl MergeOptions {
    /// Number of workers to use for `tables` table merges. Never zero, never
    /// more than `tables` (unless `tables` is zero).
    #[must_use]
    pub fn effective_workers(&self, tables: usize) -> usize {
        let requested = if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        } else {
            self.workers
        };
        requested.min(tables).max(1)
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// What the merge did to one table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableMergeOp {
    /// The merged table differs from the ancestor or carries conflicts.
    Modified,
    /// The table was dropped.
    TableRemoved,
    /// The table did not exist in the ancestor.
    TableAdded,
    /// The merged table is identical to the ancestor.
    #[default]
    Unchanged,
}

impl fmt::Display for TableMergeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modified => write!(f, "modified"),
            Self::TableRemoved => write!(f, "removed"),
            Self::TableAdded => write!(f, "added"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Per-table merge metrics. Row counts are relative to the ancestor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub operation: TableMergeOp,
    pub adds: usize,
    pub modifications: usize,
    pub deletes: usize,
    pub conflicts: usize,
}

impl MergeStats {
    #[must_use]
    pub fn new(operation: TableMergeOp) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Table failures
// ---------------------------------------------------------------------------

/// One side of a merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Ours,
    Theirs,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// Why a table could not be merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TableMergeFailure {
    /// One side dropped the table while the other changed it.
    DeletedAndModified {
        /// The side that dropped it.
        deleted_by: Side,
    },
    /// Both sides changed the schema, differently.
    SchemaConflict,
    /// A side changed which columns make up the primary key.
    PrimaryKeyChanged { side: Side },
    /// A side's table still holds conflicts from an earlier merge.
    UnresolvedConflicts { side: Side },
}

impl fmt::Display for TableMergeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeletedAndModified { deleted_by } => {
                write!(f, "deleted by {deleted_by} but modified on the other side")
            }
            Self::SchemaConflict => write!(f, "schema changed differently on both sides"),
            Self::PrimaryKeyChanged { side } => {
                write!(f, "primary key columns changed by {side}")
            }
            Self::UnresolvedConflicts { side } => {
                write!(f, "{side} has unresolved conflicts")
            }
        }
    }
}

/// A table that could not be merged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMergeError {
    pub table: String,
    #[serde(flatten)]
    pub reason: TableMergeFailure,
}

impl fmt::Display for TableMergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot merge table {:?}: {}", self.table, self.reason)
    }
}

impl std::error::Error for TableMergeError {}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a completed merge.
#[derive(Clone, Debug)]
pub struct MergeOutcome {
    /// The merged root, built from ours.
    pub root: RootValue,
    /// Per-table stats keyed by table name.
    pub stats: BTreeMap<String, MergeStats>,
    /// Every conflict recorded, in table then path order.
    pub conflicts: Vec<Conflict>,
    /// Tables left at ours' version under [`FailurePolicy::Continue`].
    pub failures: Vec<TableMergeError>,
}

impl MergeOutcome {
    /// `true` if no table failed and nothing conflicted.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failures.is_empty()
    }

    /// Serializable summary of this outcome.
    #[must_use]
    pub fn report(&self) -> MergeReport {
        MergeReport {
            root: self.root.hash().to_string(),
            stats: self.stats.clone(),
            conflicts: self.conflicts.iter().map(Conflict::summary).collect(),
            failures: self.failures.clone(),
        }
    }
}

/// JSON-friendly rendering of a [`MergeOutcome`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub root: String,
    pub stats: BTreeMap<String, MergeStats>,
    pub conflicts: Vec<ConflictSummary>,
    pub failures: Vec<TableMergeError>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Hard failures that stop a merge. No merged root is produced.
#[derive(Debug)]
pub enum MergeError {
    /// The merge was cancelled or ran past its deadline.
    Context(ContextError),
    /// Reading or writing a root or table failed.
    Root(RootError),
    /// Diffing a table's rows failed.
    Diff {
        table: String,
        source: DiffError,
    },
    /// Applying the merged edits to a table failed.
    Patch {
        table: String,
        source: PatchError,
    },
    /// One or more tables could not be merged under
    /// [`FailurePolicy::Abort`].
    TableFailures(Vec<TableMergeError>),
    /// A merge worker thread panicked.
    WorkerPanicked,
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context(e) => write!(f, "merge stopped: {e}"),
            Self::Root(e) => write!(f, "{e}"),
            Self::Diff { table, source } => write!(f, "diffing table {table:?}: {source}"),
            Self::Patch { table, source } => write!(f, "patching table {table:?}: {source}"),
            Self::TableFailures(failures) => {
                write!(f, "{} table(s) could not be merged", failures.len())?;
                for failure in failures {
                    write!(f, "\n  - {}: {}", failure.table, failure.reason)?;
                }
                Ok(())
            }
            Self::WorkerPanicked => write!(f, "merge worker panicked"),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context(e) => Some(e),
            Self::Root(e) => Some(e),
            Self::Diff { source, .. } => Some(source),
            Self::Patch { source, .. } => Some(source),
            Self::TableFailures(_) | Self::WorkerPanicked => None,
        }
    }
}

impl From<ContextError> for MergeError {
    fn from(e: ContextError) -> Self {
        Self::Context(e)
    }
}

impl From<RootError> for MergeError {
    fn from(e: RootError) -> Self {
        Self::Root(e)
    }
}
