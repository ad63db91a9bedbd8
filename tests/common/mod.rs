//! Shared fixtures for integration tests: a two-column `T(id, val)` table
//! and roots built from row lists.

#![allow(dead_code)]

use std::sync::Arc;

use strata::{Column, RootValue, Schema, Table};
use strata_value::{Format, MemoryStore, Value, ValueKind, ValueStore};

pub type Rows<'a> = &'a [(i64, &'a str)];

pub fn schema() -> Schema {
    Schema::new(vec![
        Column::key("id", ValueKind::Int),
        Column::new("val", ValueKind::Str),
    ])
    .unwrap()
}

pub fn table(rows: Rows<'_>) -> Table {
    rows.iter().fold(Table::new(schema()), |t, (id, val)| {
        t.with_row(Table::row([("id", Value::Int(*id)), ("val", Value::from(*val))]))
            .unwrap()
    })
}

pub fn memory_store() -> Arc<dyn ValueStore> {
    Arc::new(MemoryStore::new(Format::Current))
}

pub fn root(store: &Arc<dyn ValueStore>, tables: &[(&str, Rows<'_>)]) -> RootValue {
    tables
        .iter()
        .fold(RootValue::empty(Arc::clone(store)), |r, (name, rows)| {
            r.put_table(name, &table(rows)).unwrap()
        })
}

/// `(id, val)` pairs of a table's rows in key order.
pub fn row_pairs(table: &Table) -> Vec<(i64, String)> {
    table
        .rows()
        .iter()
        .map(|(_, row)| {
            let row = row.as_struct().unwrap();
            (
                row.get("id").and_then(Value::as_int).unwrap(),
                row.get("val").and_then(Value::as_str).unwrap().to_owned(),
            )
        })
        .collect()
}
