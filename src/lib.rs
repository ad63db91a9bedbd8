//! strata: structural diff, patch ordering, and three-way table merge over
//! content-addressed values.
//!
//! Values live in a [`strata_value::ValueStore`]. A root maps table names to
//! stored tables; a table holds a schema, rows keyed by primary key, and any
//! unresolved conflicts from earlier merges.
//!
//! # Entry points
//!
//! | Function                | Does                                              |
//! |-------------------------|---------------------------------------------------|
//! | [`compute_diff`]        | Canonically ordered differences between values    |
//! | [`apply_patch`]         | Replays a patch onto a value                      |
//! | [`merge_commits`]       | Three-way merges every table of two roots         |
//! | [`tables_in_conflict`]  | Tables that still carry merge conflicts           |
//!
//! ```
//! use strata::{apply_patch, compute_diff};
//! use strata_value::{Format, Value};
//!
//! let from = Value::list([Value::Int(1), Value::Int(2)]);
//! let to = Value::list([Value::Int(1), Value::Int(3), Value::Int(4)]);
//! let patch = compute_diff(Format::Current, &from, &to).unwrap();
//! assert_eq!(apply_patch(Format::Current, &from, &patch).unwrap(), to);
//! ```

pub mod config;
pub mod context;
pub mod merge;
pub mod model;
pub mod telemetry;

pub use context::{Context, ContextError};
pub use merge::{MergeError, MergeOptions, MergeOutcome, merge_commits, tables_in_conflict};
pub use model::diff::{ChangeType, Difference, compute_diff};
pub use model::patch::{Patch, apply_patch};
pub use model::path::{Path, PathPart};
pub use model::root::RootValue;
pub use model::table::{Column, Schema, Table};
