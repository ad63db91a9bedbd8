//! Deterministic three-way table merge.
//!
//! Per table, the merge runs diff → partition → resolve → apply:
//!
//! - **diff**: ancestor rows against each side ([`crate::model::diff`]).
//! - **partition**: group both sides' differences into path clusters.
//! - **resolve**: accept one-sided and agreeing clusters, record conflicts.
//! - **apply**: replay accepted edits onto the ancestor rows.
//!
//! [`commits::merge_commits`] runs that for every table of two roots.
//!
//! # Determinism guarantee
//!
//! The same three roots always produce the same merged root, stats, and
//! conflicts:
//!
//! - Tables are folded in name order regardless of worker scheduling.
//! - Differences and clusters are kept in canonical path order.
//! - Resolution compares content hashes, never insertion order.

pub mod commits;
pub mod partition;
pub mod resolve;
pub mod table;
pub mod types;

pub use commits::{merge_commits, tables_in_conflict};
pub use types::{
    FailurePolicy, MergeError, MergeOptions, MergeOutcome, MergeReport, MergeStats, Side,
    TableMergeError, TableMergeFailure, TableMergeOp,
};
