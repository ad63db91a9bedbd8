//! End-to-end merge scenarios over in-memory roots.
//!
//! Coverage:
//! - one side edits a row, the other is untouched: clean, edit kept
//! - both sides edit the same field differently: conflict stored in the table
//! - conflicts on column names that need quoting decode from the table
//! - compound primary keys merge through hash-addressed rows
//! - a side drops an unchanged table: table removed
//! - conflicts block the next merge until resolved
//! - roots survive commit/load through the store
//! - merge options loaded from a config file drive the merge

mod common;

use common::{memory_store, root, row_pairs, table};
use strata::config::StrataConfig;
use strata::merge::{FailurePolicy, TableMergeFailure, TableMergeOp};
use strata::{
    Column, Context, MergeError, MergeOptions, MergeOutcome, Path, PathPart, RootValue, Schema,
    Table, merge_commits, tables_in_conflict,
};
use strata_value::{Format, Value, ValueKind};

fn merge(
    anc: &RootValue,
    ours: &RootValue,
    theirs: &RootValue,
) -> Result<MergeOutcome, MergeError> {
    merge_commits(
        &Context::background(),
        anc,
        ours,
        theirs,
        &MergeOptions::default(),
    )
}

#[test]
fn one_sided_row_edit_is_kept() {
    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a")])]);
    let ours = root(&store, &[("T", &[(1, "b")])]);
    let out = merge(&anc, &ours, &anc).unwrap();

    assert!(out.is_clean());
    let merged = out.root.get_table("T").unwrap().unwrap();
    assert_eq!(row_pairs(&merged), vec![(1, "b".to_owned())]);
    let stats = out.stats["T"];
    assert_eq!(stats.operation, TableMergeOp::Modified);
    assert_eq!((stats.adds, stats.modifications, stats.deletes, stats.conflicts), (0, 1, 0, 0));
}

#[test]
fn theirs_edit_lands_on_ours() {
    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a"), (2, "b")])]);
    let ours = root(&store, &[("T", &[(1, "a"), (2, "b"), (3, "c")])]);
    let theirs = root(&store, &[("T", &[(2, "b")])]);
    let out = merge(&anc, &ours, &theirs).unwrap();

    assert!(out.is_clean());
    let merged = out.root.get_table("T").unwrap().unwrap();
    assert_eq!(
        row_pairs(&merged),
        vec![(2, "b".to_owned()), (3, "c".to_owned())]
    );
    assert_eq!(out.stats["T"].adds, 1);
    assert_eq!(out.stats["T"].deletes, 1);
}

#[test]
fn divergent_field_edits_conflict() {
    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a")])]);
    let ours = root(&store, &[("T", &[(1, "b")])]);
    let theirs = root(&store, &[("T", &[(1, "c")])]);
    let out = merge(&anc, &ours, &theirs).unwrap();

    assert!(!out.is_clean());
    assert_eq!(out.conflicts.len(), 1);
    let conflict = &out.conflicts[0];
    assert_eq!(conflict.table, "T");
    assert_eq!(conflict.path, Path::parse("[1].val").unwrap());
    assert_eq!(conflict.base, Some(Value::from("a")));
    assert_eq!(conflict.ours, Some(Value::from("b")));
    assert_eq!(conflict.theirs, Some(Value::from("c")));

    let merged = out.root.get_table("T").unwrap().unwrap();
    assert_eq!(row_pairs(&merged), vec![(1, "a".to_owned())]);
    assert_eq!(merged.conflict_count(), 1);
    assert_eq!(merged.conflicts("T").unwrap(), out.conflicts);
    assert_eq!(out.stats["T"].conflicts, 1);
    assert_eq!(out.stats["T"].operation, TableMergeOp::Modified);
    assert_eq!(tables_in_conflict(&out.root).unwrap(), vec!["T".to_owned()]);
}

#[test]
fn conflicts_on_quoted_column_names_decode() {
    let schema = Schema::new(vec![
        Column::key("id", ValueKind::Int),
        Column::new("first name", ValueKind::Str),
        Column::new("a.b", ValueKind::Str),
    ])
    .unwrap();
    let people = |first: &str, dotted: &str| {
        Table::new(schema.clone())
            .with_row(Table::row([
                ("id", Value::Int(1)),
                ("first name", Value::from(first)),
                ("a.b", Value::from(dotted)),
            ]))
            .unwrap()
    };
    let store = memory_store();
    let at = |t: Table| RootValue::empty(store.clone()).put_table("T", &t).unwrap();
    let anc = at(people("a", "x"));
    let ours = at(people("b", "y"));
    let theirs = at(people("c", "z"));
    let out = merge(&anc, &ours, &theirs).unwrap();

    let stored = out.root.get_table("T").unwrap().unwrap().conflicts("T").unwrap();
    assert_eq!(stored, out.conflicts);
    let paths: Vec<Path> = stored.into_iter().map(|c| c.path).collect();
    assert_eq!(
        paths,
        vec![
            Path::new(vec![PathPart::index(1), PathPart::field("a.b")]),
            Path::new(vec![PathPart::index(1), PathPart::field("first name")]),
        ]
    );
}

#[test]
fn compound_key_rows_merge_by_hash() {
    let schema = Schema::new(vec![
        Column::key("region", ValueKind::Str),
        Column::key("id", ValueKind::Int),
        Column::new("val", ValueKind::Str),
    ])
    .unwrap();
    let row = |id: i64, val: &str| {
        Table::row([
            ("region", Value::from("east")),
            ("id", Value::Int(id)),
            ("val", Value::from(val)),
        ])
    };
    let rows = |vals: &[(i64, &str)]| {
        vals.iter()
            .try_fold(Table::new(schema.clone()), |t, (id, val)| t.with_row(row(*id, val)))
            .unwrap()
    };
    let base: Vec<(i64, &str)> = (0..40).map(|id| (id, "base")).collect();
    let mut ours_rows = base.clone();
    ours_rows[3].1 = "ours";
    ours_rows[7].1 = "conflict-ours";
    let mut theirs_rows = base.clone();
    theirs_rows[11].1 = "theirs";
    theirs_rows[7].1 = "conflict-theirs";
    theirs_rows.remove(20);

    let store = memory_store();
    let at = |t: Table| RootValue::empty(store.clone()).put_table("T", &t).unwrap();
    let out = merge(&at(rows(&base)), &at(rows(&ours_rows)), &at(rows(&theirs_rows))).unwrap();

    let merged = out.root.get_table("T").unwrap().unwrap();
    let key = |id: i64| Value::list([Value::from("east"), Value::Int(id)]);
    assert_eq!(merged.get_row(&key(3)), Some(&row(3, "ours")));
    assert_eq!(merged.get_row(&key(11)), Some(&row(11, "theirs")));
    assert_eq!(merged.get_row(&key(7)), Some(&row(7, "base")));
    assert_eq!(merged.get_row(&key(20)), None);
    assert_eq!(merged.row_count(), 39);

    let stats = out.stats["T"];
    assert_eq!((stats.modifications, stats.deletes, stats.conflicts), (2, 1, 1));
    assert_eq!(out.conflicts.len(), 1);
    let expected = Path::new(vec![
        PathPart::entry(Format::Current, &key(7)),
        PathPart::field("val"),
    ]);
    assert_eq!(out.conflicts[0].path, expected);
    assert_eq!(merged.conflicts("T").unwrap(), out.conflicts);
}

#[test]
fn dropped_table_is_removed() {
    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a")]), ("U", &[(1, "u")])]);
    let theirs = root(&store, &[("U", &[(1, "u")])]);
    let out = merge(&anc, &anc, &theirs).unwrap();

    assert_eq!(out.root.table_names(), vec!["U".to_owned()]);
    let stats = out.stats["T"];
    assert_eq!(stats.operation, TableMergeOp::TableRemoved);
    assert_eq!(stats.deletes, 1);
}

#[test]
fn conflicts_block_the_next_merge_until_resolved() {
    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a")])]);
    let ours = root(&store, &[("T", &[(1, "b")])]);
    let theirs = root(&store, &[("T", &[(1, "c")])]);
    let conflicted = merge(&anc, &ours, &theirs).unwrap().root;

    let err = merge(&anc, &conflicted, &anc).unwrap_err();
    let MergeError::TableFailures(failures) = err else {
        panic!("expected table failures, got {err}");
    };
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures[0].reason,
        TableMergeFailure::UnresolvedConflicts { .. }
    ));

    let path = Path::parse("[1].val").unwrap();
    let resolved_table = conflicted
        .get_table("T")
        .unwrap()
        .unwrap()
        .resolve_conflict(&path)
        .with_row(Table::row([("id", Value::Int(1)), ("val", Value::from("b"))]))
        .unwrap();
    let resolved = conflicted.put_table("T", &resolved_table).unwrap();
    assert!(tables_in_conflict(&resolved).unwrap().is_empty());

    let out = merge(&anc, &resolved, &anc).unwrap();
    assert!(out.is_clean());
    assert_eq!(
        row_pairs(&out.root.get_table("T").unwrap().unwrap()),
        vec![(1, "b".to_owned())]
    );
}

#[test]
fn merged_root_round_trips_through_the_store() {
    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a")])]);
    let ours = root(&store, &[("T", &[(1, "a"), (2, "b")])]);
    let out = merge(&anc, &ours, &anc).unwrap();

    let hash = out.root.commit().unwrap();
    let loaded = RootValue::load(store, &hash).unwrap();
    assert_eq!(loaded.hash(), out.root.hash());
    assert_eq!(loaded.get_table("T").unwrap(), Some(table(&[(1, "a"), (2, "b")])));
}

#[test]
fn report_serializes_to_json() {
    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a")])]);
    let ours = root(&store, &[("T", &[(1, "b")])]);
    let theirs = root(&store, &[("T", &[(1, "c")])]);
    let out = merge(&anc, &ours, &theirs).unwrap();

    let json = serde_json::to_value(out.report()).unwrap();
    assert_eq!(json["root"], out.root.hash().to_string());
    assert_eq!(json["stats"]["T"]["operation"], "modified");
    assert_eq!(json["stats"]["T"]["conflicts"], 1);
    assert_eq!(json["conflicts"][0]["kind"], "both_modified");
    assert_eq!(json["conflicts"][0]["path"], "[1].val");
}

#[test]
fn config_file_drives_failure_policy() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("strata.toml");
    std::fs::write(&path, "[merge]\nworkers = 2\non_table_failure = \"continue\"\n")?;
    let options = StrataConfig::load(&path)?.merge_options();
    assert_eq!(options.on_table_failure, FailurePolicy::Continue);

    let store = memory_store();
    let anc = root(&store, &[("T", &[(1, "a")]), ("U", &[(1, "u")])]);
    let ours = root(&store, &[("U", &[(1, "x")])]);
    let theirs = root(&store, &[("T", &[(1, "z")]), ("U", &[(1, "u")])]);
    let out = merge_commits(&Context::background(), &anc, &ours, &theirs, &options)?;

    assert_eq!(out.failures.len(), 1);
    assert_eq!(
        out.failures[0].reason,
        TableMergeFailure::DeletedAndModified {
            deleted_by: strata::merge::Side::Ours
        }
    );
    assert_eq!(out.stats["U"].modifications, 1);
    Ok(())
}
