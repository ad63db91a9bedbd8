//! RESOLVE step of the table merge.
//!
//! Turns a [`PartitionResult`] into the edits that make it into the merged
//! rows plus the conflicts that do not.
//!
//! - Unique clusters: the touching side's differences are accepted.
//! - Shared clusters: if both sides ended up with the same value at the
//!   cluster root (including both removing it), ours' differences are
//!   accepted. Otherwise a [`Conflict`] is recorded at the cluster root and
//!   the ancestor's value is kept.

use strata_value::{Format, Value};

use crate::model::conflict::Conflict;
use crate::model::diff::Difference;
use crate::model::patch::Patch;

use super::partition::PartitionResult;

/// The three row maps a table merge works on.
#[derive(Clone, Copy, Debug)]
pub struct RowSides<'a> {
    pub ancestor: &'a Value,
    pub ours: &'a Value,
    pub theirs: &'a Value,
}

/// Output of [`resolve_partition`].
#[derive(Clone, Debug, Default)]
pub struct ResolveResult {
    /// Edits to apply to the ancestor rows, in canonical order.
    pub accepted: Patch,
    /// Conflicts in cluster order.
    pub conflicts: Vec<Conflict>,
}

impl ResolveResult {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Resolve every cluster of `partition` for table `table`.
#[must_use]
pub fn resolve_partition(
    format: Format,
    table: &str,
    rows: RowSides<'_>,
    partition: &PartitionResult,
) -> ResolveResult {
    let mut accepted: Vec<Difference> = Vec::new();
    let mut conflicts = Vec::new();

    for cluster in &partition.unique {
        accepted.extend(cluster.ours.iter().cloned());
        accepted.extend(cluster.theirs.iter().cloned());
    }

    for cluster in &partition.shared {
        let ours = cluster.root.resolve(format, rows.ours);
        let theirs = cluster.root.resolve(format, rows.theirs);
        let agree = match (&ours, &theirs) {
            (None, None) => true,
            (Some(a), Some(b)) => a.equals(format, b),
            _ => false,
        };
        if agree {
            accepted.extend(cluster.ours.iter().cloned());
        } else {
            conflicts.push(Conflict {
                table: table.to_owned(),
                path: cluster.root.clone(),
                base: cluster.root.resolve(format, rows.ancestor),
                ours,
                theirs,
            });
        }
    }

    ResolveResult {
        accepted: Patch::from_unordered(format, accepted),
        conflicts,
    }
}
