//! Root-level merge: every table of two divergent roots.
//!
//! [`merge_commits`] merges each table name present on either side, then
//! folds the per-table outcomes onto ours. Every table merge runs before
//! anything is applied, so a failing table under [`FailurePolicy::Abort`]
//! leaves no partially merged root behind.

use std::collections::BTreeMap;

use tracing::instrument;

use crate::context::{Context, ContextError};
use crate::model::root::{RootError, RootValue, union_table_names};

use super::table::{Merger, TableOutcome};
use super::types::{FailurePolicy, MergeError, MergeOptions, MergeOutcome, TableMergeError};

/// Three-way merge of `ours` and `theirs` against `ancestor`.
///
/// Tables are merged on up to [`MergeOptions::workers`] scoped threads, each
/// reading the immutable input roots. Results are folded in table-name order,
/// so the outcome does not depend on scheduling.
#[instrument(skip_all, fields(workers = options.workers, policy = %options.on_table_failure))]
pub fn merge_commits(
    ctx: &Context,
    ancestor: &RootValue,
    ours: &RootValue,
    theirs: &RootValue,
    options: &MergeOptions,
) -> Result<MergeOutcome, MergeError> {
    ctx.check()?;
    let names = union_table_names(ours, theirs);
    let merger = Merger {
        ancestor,
        ours,
        theirs,
    };
    let workers = options.effective_workers(names.len());
    tracing::debug!(tables = names.len(), workers, "merging tables");

    let outcomes = run_table_merges(ctx, &merger, &names, workers)?;

    let failures: Vec<TableMergeError> = outcomes
        .iter()
        .filter_map(|(_, outcome)| match outcome {
            TableOutcome::Failed(e) => Some(e.clone()),
            _ => None,
        })
        .collect();
    if !failures.is_empty() && options.on_table_failure == FailurePolicy::Abort {
        tracing::warn!(failed = failures.len(), "table merge failures, aborting");
        return Err(MergeError::TableFailures(failures));
    }

    let format = ours.format();
    let mut root = ours.clone();
    let mut stats = BTreeMap::new();
    let mut conflicts = Vec::new();
    for (name, outcome) in outcomes {
        match outcome {
            TableOutcome::Merged {
                table,
                stats: table_stats,
                conflicts: table_conflicts,
            } => {
                if root.table_hash(&name) != Some(table.hash(format)) {
                    root = root.put_table(&name, &table)?;
                }
                stats.insert(name, table_stats);
                conflicts.extend(table_conflicts);
            }
            TableOutcome::Removed { stats: table_stats } => {
                if root.has_table(&name) {
                    root = root.remove_tables(&[&name])?;
                }
                stats.insert(name, table_stats);
            }
            TableOutcome::Failed(e) => {
                tracing::warn!(table = %e.table, reason = %e.reason, "table kept at ours");
            }
        }
    }
    ctx.check()?;

    tracing::info!(
        tables = stats.len(),
        conflicts = conflicts.len(),
        failures = failures.len(),
        "merge complete"
    );
    Ok(MergeOutcome {
        root,
        stats,
        conflicts,
        failures,
    })
}

/// Sorted names of tables in `root` that still carry conflicts.
pub fn tables_in_conflict(root: &RootValue) -> Result<Vec<String>, RootError> {
    root.tables_in_conflict()
}

type NamedOutcome = (String, TableOutcome);

/// Runs every table merge, in parallel chunks when `workers > 1`.
///
/// The workers share a child of `ctx`. The first worker to fail cancels it so
/// its siblings stop at their next node, and the failure, not a sibling's
/// induced cancellation, is returned.
fn run_table_merges(
    ctx: &Context,
    merger: &Merger<'_>,
    names: &[String],
    workers: usize,
) -> Result<Vec<NamedOutcome>, MergeError> {
    if workers <= 1 || names.len() <= 1 {
        return merge_chunk(ctx, merger, names);
    }

    let scope_ctx = ctx.child();
    let chunk_size = names.len().div_ceil(workers);
    let chunk_results: Vec<Result<Vec<NamedOutcome>, MergeError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = names
            .chunks(chunk_size)
            .map(|chunk| {
                let scope_ctx = &scope_ctx;
                scope.spawn(move || {
                    let result = merge_chunk(scope_ctx, merger, chunk);
                    if result.is_err() {
                        scope_ctx.cancel();
                    }
                    result
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(MergeError::WorkerPanicked))
            })
            .collect()
    });

    let mut outcomes = Vec::with_capacity(names.len());
    let mut first_error = None;
    for result in chunk_results {
        match result {
            Ok(chunk) => outcomes.extend(chunk),
            Err(e) => first_error = Some(prefer_cause(ctx, first_error, e)),
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

fn merge_chunk(
    ctx: &Context,
    merger: &Merger<'_>,
    chunk: &[String],
) -> Result<Vec<NamedOutcome>, MergeError> {
    chunk
        .iter()
        .map(|name| Ok((name.clone(), merger.merge_table(ctx, name)?)))
        .collect()
}

/// Keeps the earlier of two worker errors, unless it is a cancellation that a
/// failing sibling caused rather than the caller.
fn prefer_cause(ctx: &Context, earlier: Option<MergeError>, later: MergeError) -> MergeError {
    match earlier {
        Some(MergeError::Context(ContextError::Cancelled))
            if !ctx.is_cancelled() && !matches!(later, MergeError::Context(_)) =>
        {
            later
        }
        Some(earlier) => earlier,
        None => later,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use strata_value::{Format, Hash, MemoryStore, StoreError, Value, ValueKind, ValueStore};

    use super::*;
    use crate::merge::types::{TableMergeFailure, TableMergeOp};
    use crate::model::table::{Column, Schema, Table};

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

    struct Fixture {
        store: Arc<dyn ValueStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryStore::new(Format::Current)),
            }
        }

        fn root(&self, tables: &[(&str, &[(i64, &str)])]) -> RootValue {
            tables
                .iter()
                .fold(RootValue::empty(Arc::clone(&self.store)), |r, (name, rows)| {
                    r.put_table(name, &table(rows)).unwrap()
                })
        }
    }

    fn opts(workers: usize, on_table_failure: FailurePolicy) -> MergeOptions {
        MergeOptions {
            workers,
            on_table_failure,
        }
    }

    fn merge(
        anc: &RootValue,
        ours: &RootValue,
        theirs: &RootValue,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, MergeError> {
        merge_commits(&Context::background(), anc, ours, theirs, options)
    }

    /// Serves a memory store but fails reads of one hash once it is set.
    struct PoisonedStore {
        inner: MemoryStore,
        poisoned: OnceLock<Hash>,
    }

    impl ValueStore for PoisonedStore {
        fn format(&self) -> Format {
            self.inner.format()
        }

        fn read_value(&self, hash: &Hash) -> Result<Option<Value>, StoreError> {
            if self.poisoned.get() == Some(hash) {
                return Err(StoreError::Backend {
                    message: format!("bad block {hash}"),
                });
            }
            self.inner.read_value(hash)
        }

        fn write_value(&self, value: &Value) -> Result<Hash, StoreError> {
            self.inner.write_value(value)
        }
    }

    #[test]
    fn merges_every_table_in_the_union() {
        let f = Fixture::new();
        let anc = f.root(&[("A", &[(1, "a")]), ("B", &[(1, "b")])]);
        let ours = f.root(&[("A", &[(1, "x")]), ("B", &[(1, "b")]), ("C", &[(1, "c")])]);
        let theirs = f.root(&[("A", &[(1, "a"), (2, "y")]), ("B", &[(1, "b")])]);
        let out = merge(&anc, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert!(out.is_clean());
        assert_eq!(
            out.stats.keys().cloned().collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        assert_eq!(out.stats["A"].operation, TableMergeOp::Modified);
        assert_eq!((out.stats["A"].adds, out.stats["A"].modifications), (1, 1));
        assert_eq!(out.stats["B"].operation, TableMergeOp::Unchanged);
        assert_eq!(out.stats["C"].operation, TableMergeOp::TableAdded);
        assert_eq!(
            out.root.get_table("A").unwrap(),
            Some(table(&[(1, "x"), (2, "y")]))
        );
    }

    #[test]
    fn table_removed_on_one_side_is_dropped() {
        let f = Fixture::new();
        let anc = f.root(&[("T", &[(1, "a")])]);
        let ours = f.root(&[("T", &[(1, "a")])]);
        let theirs = f.root(&[]);
        let out = merge(&anc, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert!(!out.root.has_table("T"));
        assert_eq!(out.stats["T"].operation, TableMergeOp::TableRemoved);
    }

    #[test]
    fn table_removed_on_both_sides_has_no_stats() {
        let f = Fixture::new();
        let anc = f.root(&[("T", &[(1, "a")])]);
        let gone = f.root(&[]);
        let out = merge(&anc, &gone, &gone, &MergeOptions::default()).unwrap();
        assert!(out.stats.is_empty());
        assert!(out.root.table_names().is_empty());
    }

    #[test]
    fn abort_policy_names_every_failed_table() {
        let f = Fixture::new();
        let anc = f.root(&[("A", &[(1, "a")]), ("B", &[(1, "b")]), ("C", &[(1, "c")])]);
        let ours = f.root(&[("B", &[(1, "b")]), ("C", &[(1, "z")])]);
        let theirs = f.root(&[("A", &[(1, "q")]), ("B", &[(1, "b")])]);
        let err = merge(&anc, &ours, &theirs, &MergeOptions::default()).unwrap_err();
        let MergeError::TableFailures(failures) = err else {
            panic!("expected table failures, got {err}");
        };
        let tables: Vec<_> = failures.iter().map(|f| f.table.as_str()).collect();
        assert_eq!(tables, vec!["A", "C"]);
        assert!(
            failures
                .iter()
                .all(|f| matches!(f.reason, TableMergeFailure::DeletedAndModified { .. }))
        );
    }

    #[test]
    fn continue_policy_keeps_ours_for_failed_tables() {
        let f = Fixture::new();
        let anc = f.root(&[("A", &[(1, "a")]), ("B", &[(1, "b")])]);
        let ours = f.root(&[("B", &[(1, "x")])]);
        let theirs = f.root(&[("A", &[(1, "q")]), ("B", &[(1, "b")])]);
        let out = merge(&anc, &ours, &theirs, &opts(2, FailurePolicy::Continue)).unwrap();
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].table, "A");
        assert!(!out.root.has_table("A"));
        assert!(!out.stats.contains_key("A"));
        assert_eq!(out.stats["B"].modifications, 1);
        assert!(!out.is_clean());
    }

    #[test]
    fn worker_count_does_not_change_the_result() {
        let f = Fixture::new();
        let names: Vec<String> = (0..9).map(|i| format!("t{i}")).collect();
        let anc_tables: Vec<(&str, &[(i64, &str)])> =
            names.iter().map(|n| (n.as_str(), &[(1, "a")][..])).collect();
        let ours_tables: Vec<(&str, &[(i64, &str)])> =
            names.iter().map(|n| (n.as_str(), &[(1, "b")][..])).collect();
        let theirs_tables: Vec<(&str, &[(i64, &str)])> = names
            .iter()
            .map(|n| (n.as_str(), &[(1, "a"), (2, "c")][..]))
            .collect();
        let anc = f.root(&anc_tables);
        let ours = f.root(&ours_tables);
        let theirs = f.root(&theirs_tables);

        let serial = merge(&anc, &ours, &theirs, &opts(1, FailurePolicy::Abort)).unwrap();
        let parallel = merge(&anc, &ours, &theirs, &opts(4, FailurePolicy::Abort)).unwrap();
        assert_eq!(serial.root.hash(), parallel.root.hash());
        assert_eq!(serial.stats, parallel.stats);
    }

    #[test]
    fn worker_failure_is_reported_over_sibling_cancellation() {
        let store = Arc::new(PoisonedStore {
            inner: MemoryStore::new(Format::Current),
            poisoned: OnceLock::new(),
        });
        let f = Fixture {
            store: store.clone(),
        };
        let names: Vec<String> = (0..8).map(|i| format!("t{i}")).collect();
        let layout = |rows: &[(i64, &'static str)]| -> Vec<(String, Vec<(i64, &'static str)>)> {
            names.iter().map(|n| (n.clone(), rows.to_vec())).collect()
        };
        let build = |layout: &[(String, Vec<(i64, &'static str)>)], first_row: &'static str| {
            let tables: Vec<(&str, &[(i64, &str)])> = layout
                .iter()
                .map(|(n, rows)| (n.as_str(), rows.as_slice()))
                .collect();
            // A distinct first table so only its hash is poisoned.
            f.root(&tables).put_table("t0", &table(&[(1, first_row)])).unwrap()
        };
        let anc = build(&layout(&[(1, "a")]), "first");
        let ours = build(&layout(&[(1, "b")]), "first-ours");
        let theirs = build(&layout(&[(1, "a"), (2, "c")]), "first-theirs");
        let Some(poisoned) = anc.table_hash("t0") else {
            panic!("ancestor has t0");
        };
        store.poisoned.set(poisoned).unwrap();

        let ctx = Context::background();
        let err =
            merge_commits(&ctx, &anc, &ours, &theirs, &opts(4, FailurePolicy::Abort)).unwrap_err();
        assert!(
            matches!(err, MergeError::Root(RootError::Store(StoreError::Backend { .. }))),
            "{err}"
        );
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn sibling_cancellation_yields_to_the_real_error() {
        let ctx = Context::background();
        let cancelled = || MergeError::Context(ContextError::Cancelled);
        assert!(matches!(
            prefer_cause(&ctx, Some(cancelled()), MergeError::WorkerPanicked),
            MergeError::WorkerPanicked
        ));
        assert!(matches!(
            prefer_cause(&ctx, Some(MergeError::WorkerPanicked), cancelled()),
            MergeError::WorkerPanicked
        ));
        assert!(matches!(
            prefer_cause(&ctx, None, cancelled()),
            MergeError::Context(ContextError::Cancelled)
        ));

        ctx.cancel();
        assert!(matches!(
            prefer_cause(&ctx, Some(cancelled()), MergeError::WorkerPanicked),
            MergeError::Context(ContextError::Cancelled)
        ));
    }

    #[test]
    fn cancelled_merge_returns_no_root() {
        let f = Fixture::new();
        let anc = f.root(&[("T", &[(1, "a")])]);
        let ctx = Context::background();
        ctx.cancel();
        let err = merge_commits(&ctx, &anc, &anc, &anc, &MergeOptions::default()).unwrap_err();
        assert!(matches!(err, MergeError::Context(_)));
    }

    #[test]
    fn conflicted_tables_are_listed() {
        let f = Fixture::new();
        let anc = f.root(&[("T", &[(1, "a")]), ("U", &[(1, "u")])]);
        let ours = f.root(&[("T", &[(1, "b")]), ("U", &[(1, "u")])]);
        let theirs = f.root(&[("T", &[(1, "c")]), ("U", &[(1, "u")])]);
        let out = merge(&anc, &ours, &theirs, &MergeOptions::default()).unwrap();
        assert_eq!(tables_in_conflict(&out.root).unwrap(), vec!["T".to_owned()]);
    }
}
