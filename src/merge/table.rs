//! Per-table three-way merge.
//!
//! [`Merger::merge_table`] decides what happens to one table name given its
//! state in the ancestor, ours, and theirs:
//!
//! | ancestor | ours | theirs | result |
//! |----------|------|--------|--------|
//! | - | T | - | keep ours, `TableAdded` |
//! | - | - | T | take theirs, `TableAdded` |
//! | - | T₁ | T₂ | row merge against an empty table, `TableAdded` |
//! | A | - | A | drop, `TableRemoved` |
//! | A | A | - | drop, `TableRemoved` |
//! | A | - | T | `DeletedAndModified` |
//! | A | T₁ | T₂ | row merge, `Modified` or `Unchanged` |
//!
//! The row merge is diff → partition → resolve → apply over the row maps.

use strata_value::{Format, Map, Value};
use tracing::instrument;

use crate::context::Context;
use crate::model::conflict::Conflict;
use crate::model::diff::{ChangeType, DiffError, diff_values};
use crate::model::ordering::{compare_path_parts, sort_differences};
use crate::model::patch::{Patch, PatchError, apply_patch};
use crate::model::path::Path;
use crate::model::root::RootValue;
use crate::model::table::{Schema, Table};

use super::partition::partition_by_path;
use super::resolve::{RowSides, resolve_partition};
use super::types::{MergeError, MergeStats, Side, TableMergeError, TableMergeFailure, TableMergeOp};

/// What merging one table produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableOutcome {
    /// The table exists in the merged root with this content.
    Merged {
        table: Table,
        stats: MergeStats,
        conflicts: Vec<Conflict>,
    },
    /// The table is dropped from the merged root.
    Removed { stats: MergeStats },
    /// The table could not be merged.
    Failed(TableMergeError),
}

/// The three roots of one merge.
#[derive(Clone, Copy, Debug)]
pub struct Merger<'a> {
    pub ancestor: &'a RootValue,
    pub ours: &'a RootValue,
    pub theirs: &'a RootValue,
}

impl Merger<'_> {
    fn format(&self) -> Format {
        self.ours.format()
    }

    /// Merge the table called `name`.
    #[instrument(skip_all, fields(table = name))]
    pub fn merge_table(&self, ctx: &Context, name: &str) -> Result<TableOutcome, MergeError> {
        ctx.check()?;
        let format = self.format();
        let anc = self.ancestor.get_table(name)?;
        let ours = self.ours.get_table(name)?;
        let theirs = self.theirs.get_table(name)?;

        if let Some(side) = unresolved_side(ours.as_ref(), theirs.as_ref()) {
            return Ok(failed(name, TableMergeFailure::UnresolvedConflicts { side }));
        }

        match (anc, ours, theirs) {
            (None, None, None) => Ok(TableOutcome::Removed {
                stats: MergeStats::new(TableMergeOp::TableRemoved),
            }),
            (None, Some(added), None) | (None, None, Some(added)) => {
                tracing::debug!("table added on one side");
                Ok(added_outcome(added))
            }
            (None, Some(ours), Some(theirs)) => {
                if ours.hash(format) == theirs.hash(format) {
                    tracing::debug!("table added identically on both sides");
                    return Ok(added_outcome(ours));
                }
                if ours.schema() != theirs.schema() {
                    return Ok(failed(name, TableMergeFailure::SchemaConflict));
                }
                let empty = Table::new(ours.schema().clone());
                self.merge_rows(ctx, name, &empty, &ours, &theirs, ours.schema().clone())
                    .map(retag_added)
            }
            (Some(anc), None, Some(kept)) | (Some(anc), Some(kept), None) => {
                let deleted_by = if self.ours.has_table(name) {
                    Side::Theirs
                } else {
                    Side::Ours
                };
                if kept.hash(format) == anc.hash(format) {
                    Ok(TableOutcome::Removed {
                        stats: MergeStats {
                            deletes: anc.row_count(),
                            ..MergeStats::new(TableMergeOp::TableRemoved)
                        },
                    })
                } else {
                    Ok(failed(name, TableMergeFailure::DeletedAndModified { deleted_by }))
                }
            }
            (Some(anc), None, None) => Ok(TableOutcome::Removed {
                stats: MergeStats {
                    deletes: anc.row_count(),
                    ..MergeStats::new(TableMergeOp::TableRemoved)
                },
            }),
            (Some(anc), Some(ours), Some(theirs)) => {
                self.merge_existing(ctx, name, &anc, ours, theirs)
            }
        }
    }

    fn merge_existing(
        &self,
        ctx: &Context,
        name: &str,
        anc: &Table,
        ours: Table,
        theirs: Table,
    ) -> Result<TableOutcome, MergeError> {
        let format = self.format();
        let anc_hash = anc.hash(format);
        let ours_hash = ours.hash(format);
        let theirs_hash = theirs.hash(format);

        if ours_hash == theirs_hash || theirs_hash == anc_hash {
            tracing::debug!("theirs unchanged or identical to ours, keeping ours");
            return self.settle(ctx, name, anc, ours, Vec::new());
        }
        if ours_hash == anc_hash {
            tracing::debug!("ours unchanged, taking theirs");
            return self.settle(ctx, name, anc, theirs, Vec::new());
        }

        for (side, table) in [(Side::Ours, &ours), (Side::Theirs, &theirs)] {
            if !table.schema().same_primary_key(anc.schema()) {
                return Ok(failed(name, TableMergeFailure::PrimaryKeyChanged { side }));
            }
        }
        let Some(schema) = resolve_schema(anc.schema(), ours.schema(), theirs.schema()) else {
            return Ok(failed(name, TableMergeFailure::SchemaConflict));
        };

        self.merge_rows(ctx, name, anc, &ours, &theirs, schema)
    }

    /// Three-way merge of the row maps, producing a table with `schema`.
    fn merge_rows(
        &self,
        ctx: &Context,
        name: &str,
        anc: &Table,
        ours: &Table,
        theirs: &Table,
        schema: Schema,
    ) -> Result<TableOutcome, MergeError> {
        let format = self.format();
        let anc_rows = Value::Map(anc.rows().clone());
        let ours_rows = Value::Map(ours.rows().clone());
        let theirs_rows = Value::Map(theirs.rows().clone());

        let diff = |to: &Value| {
            diff_values(ctx, format, &anc_rows, to)
                .map(|d| Patch::from_unordered(format, d))
                .map_err(|source| diff_error(name, source))
        };
        let ours_patch = diff(&ours_rows)?;
        let theirs_patch = diff(&theirs_rows)?;

        let partition = partition_by_path(
            format,
            &anc_rows,
            ours_patch.as_slice(),
            theirs_patch.as_slice(),
        );
        let resolved = resolve_partition(
            format,
            name,
            RowSides {
                ancestor: &anc_rows,
                ours: &ours_rows,
                theirs: &theirs_rows,
            },
            &partition,
        );
        tracing::debug!(
            clusters = partition.cluster_count(),
            shared = partition.shared.len(),
            conflicts = resolved.conflicts.len(),
            "rows resolved"
        );

        let merged_rows = apply_patch(format, &anc_rows, &resolved.accepted).map_err(|source| {
            MergeError::Patch {
                table: name.to_owned(),
                source,
            }
        })?;
        let rows = match merged_rows {
            Value::Map(rows) => rows,
            other => {
                return Err(MergeError::Patch {
                    table: name.to_owned(),
                    source: PatchError::InvalidPart {
                        path: Path::root(),
                        kind: other.kind(),
                    },
                });
            }
        };

        let merged = Table::new(schema)
            .with_rows(rows)
            .with_conflicts(&resolved.conflicts);
        self.settle(ctx, name, anc, merged, resolved.conflicts)
    }

    /// Wrap a merged table with stats relative to the ancestor.
    fn settle(
        &self,
        ctx: &Context,
        name: &str,
        anc: &Table,
        merged: Table,
        conflicts: Vec<Conflict>,
    ) -> Result<TableOutcome, MergeError> {
        let format = self.format();
        let mut stats = row_stats(ctx, format, name, anc.rows(), merged.rows())?;
        stats.conflicts = conflicts.len();
        stats.operation = if conflicts.is_empty() && merged.hash(format) == anc.hash(format) {
            TableMergeOp::Unchanged
        } else {
            TableMergeOp::Modified
        };
        Ok(TableOutcome::Merged {
            table: merged,
            stats,
            conflicts,
        })
    }
}

fn diff_error(name: &str, source: DiffError) -> MergeError {
    match source {
        DiffError::Context(e) => MergeError::Context(e),
        source => MergeError::Diff {
            table: name.to_owned(),
            source,
        },
    }
}

fn failed(name: &str, reason: TableMergeFailure) -> TableOutcome {
    TableOutcome::Failed(TableMergeError {
        table: name.to_owned(),
        reason,
    })
}

fn added_outcome(table: Table) -> TableOutcome {
    let stats = MergeStats {
        adds: table.row_count(),
        ..MergeStats::new(TableMergeOp::TableAdded)
    };
    TableOutcome::Merged {
        table,
        stats,
        conflicts: Vec::new(),
    }
}

fn retag_added(outcome: TableOutcome) -> TableOutcome {
    match outcome {
        TableOutcome::Merged {
            table,
            mut stats,
            conflicts,
        } => {
            stats.operation = TableMergeOp::TableAdded;
            TableOutcome::Merged {
                table,
                stats,
                conflicts,
            }
        }
        other => other,
    }
}

fn unresolved_side(ours: Option<&Table>, theirs: Option<&Table>) -> Option<Side> {
    if ours.is_some_and(Table::has_conflicts) {
        Some(Side::Ours)
    } else if theirs.is_some_and(Table::has_conflicts) {
        Some(Side::Theirs)
    } else {
        None
    }
}

/// Pick the merged schema. A change on one side wins; differing changes on
/// both sides do not resolve.
fn resolve_schema(anc: &Schema, ours: &Schema, theirs: &Schema) -> Option<Schema> {
    if ours == theirs || theirs == anc {
        Some(ours.clone())
    } else if ours == anc {
        Some(theirs.clone())
    } else {
        None
    }
}

/// Count rows added, removed, and modified between two row maps. A row
/// counts once no matter how many of its fields changed.
fn row_stats(
    ctx: &Context,
    format: Format,
    name: &str,
    from: &Map,
    to: &Map,
) -> Result<MergeStats, MergeError> {
    let mut stats = MergeStats::default();
    if from.hash(format) == to.hash(format) {
        return Ok(stats);
    }
    let mut diffs = diff_values(ctx, format, &Value::Map(from.clone()), &Value::Map(to.clone()))
        .map_err(|source| diff_error(name, source))?;
    sort_differences(format, &mut diffs);

    let mut i = 0;
    while let Some(first) = diffs.get(i) {
        let Some(row) = first.path.parts().first() else {
            i += 1;
            continue;
        };
        let mut end = i + 1;
        while diffs
            .get(end)
            .and_then(|d| d.path.parts().first())
            .is_some_and(|next| compare_path_parts(format, row, next).is_eq())
        {
            end += 1;
        }
        let whole_row = end == i + 1 && first.path.len() == 1;
        match (whole_row, first.change_type) {
            (true, ChangeType::Added) => stats.adds += 1,
            (true, ChangeType::Removed) => stats.deletes += 1,
            _ => stats.modifications += 1,
        }
        i = end;
    }
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
