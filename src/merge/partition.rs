//! PARTITION step of the table merge.
//!
//! Takes the two ordered row patches (ancestor→ours, ancestor→theirs) and
//! groups their differences into clusters: maximal subtrees of the row map
//! that one or both sides touched.
//!
//! - **Unique clusters**: touched by one side only, applied as-is.
//! - **Shared clusters**: touched by both sides, need resolution.
//!
//! Every difference is first lifted to its *anchor*: the shallowest enclosing
//! list in the ancestor, or its own path when no list encloses it. List
//! edits are positional, so two sides' edits inside one list can only be
//! judged as a whole.
//!
//! # Example
//!
//! ```text
//! ours:   [1].val   Modified
//!         [3]       Added
//! theirs: [1]       Removed
//!         [2].tags[0] Modified      (anchor [2].tags)
//!
//! clusters:
//!   [1]        ours: [1].val   theirs: [1]     → shared
//!   [2].tags   theirs: [2].tags[0]             → unique
//!   [3]        ours: [3]                       → unique
//! ```

use strata_value::{Format, Value};

use crate::model::diff::Difference;
use crate::model::ordering::compare_paths;
use crate::model::path::Path;

use super::types::Side;

// ---------------------------------------------------------------------------
// PathCluster
// ---------------------------------------------------------------------------

/// All differences under one cluster root, split by side. Each side's
/// differences stay in canonical order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathCluster {
    pub root: Path,
    pub ours: Vec<Difference>,
    pub theirs: Vec<Difference>,
}

impl PathCluster {
    /// `true` if both sides touched this cluster.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        !self.ours.is_empty() && !self.theirs.is_empty()
    }
}

/// Clusters in canonical path order of their roots.
#[derive(Clone, Debug, Default)]
pub struct PartitionResult {
    pub unique: Vec<PathCluster>,
    pub shared: Vec<PathCluster>,
}

impl PartitionResult {
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.unique.len() + self.shared.len()
    }
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Group both sides' differences into clusters.
///
/// `ancestor` is the value both patches were computed from; it decides where
/// list anchors sit.
#[must_use]
pub fn partition_by_path(
    format: Format,
    ancestor: &Value,
    ours: &[Difference],
    theirs: &[Difference],
) -> PartitionResult {
    let mut entries: Vec<(Path, Side, &Difference)> = ours
        .iter()
        .map(|d| (Side::Ours, d))
        .chain(theirs.iter().map(|d| (Side::Theirs, d)))
        .map(|(side, d)| (anchor(format, ancestor, &d.path), side, d))
        .collect();
    // Stable: each side keeps its canonical order within an anchor.
    entries.sort_by(|a, b| compare_paths(format, &a.0, &b.0));

    let mut result = PartitionResult::default();
    let mut current: Option<PathCluster> = None;

    for (anchor, side, diff) in entries {
        let joins = current
            .as_ref()
            .is_some_and(|c| anchor.has_prefix(format, &c.root));
        if !joins {
            if let Some(done) = current.take() {
                push_cluster(&mut result, done);
            }
            current = Some(PathCluster {
                root: anchor,
                ours: Vec::new(),
                theirs: Vec::new(),
            });
        }
        if let Some(cluster) = current.as_mut() {
            match side {
                Side::Ours => cluster.ours.push(diff.clone()),
                Side::Theirs => cluster.theirs.push(diff.clone()),
            }
        }
    }
    if let Some(done) = current {
        push_cluster(&mut result, done);
    }
    result
}

fn push_cluster(result: &mut PartitionResult, cluster: PathCluster) {
    if cluster.is_shared() {
        result.shared.push(cluster);
    } else {
        result.unique.push(cluster);
    }
}

/// The shallowest proper prefix of `path` that is a list in `ancestor`, or
/// `path` itself.
fn anchor(format: Format, ancestor: &Value, path: &Path) -> Path {
    let mut node = ancestor.clone();
    for (depth, part) in path.parts().iter().enumerate() {
        if matches!(node, Value::List(_)) {
            return path.prefix(depth);
        }
        match part.step(format, &node) {
            Some(next) => node = next,
            None => break,
        }
    }
    path.clone()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
