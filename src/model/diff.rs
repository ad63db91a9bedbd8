//! Structural diff of two value trees.
//!
//! [`diff_values`] walks two roots in lockstep and emits one [`Difference`]
//! per changed location. Subtrees whose content hashes match are skipped
//! without descending, so the cost of a diff is proportional to the size of
//! the change, not the size of the tree.
//!
//! Per node kind:
//!
//! - **Struct**: fields are joined by name. Structs with different names are
//!   replaced wholesale (`Modified`).
//! - **List**: positional. Shared ordinals recurse; the longer side's tail is
//!   `Removed` or `Added` at its ordinals.
//! - **Map**: entries joined by key. Primitive keys become `Index` parts,
//!   composite keys `HashIndex` parts.
//! - **Set**: element membership only.
//! - Anything else that differs is `Modified` at that path.
//!
//! The walk uses an explicit work stack, so tree depth never grows the call
//! stack, and checks the [`Context`] before visiting each node.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_value::{Format, Value, ValueKind};

use super::patch::Patch;
use super::path::{Path, PathPart};
use crate::context::{Context, ContextError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What happened at a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// The location exists only in the newer tree.
    Added,
    /// The location exists in both trees with different values.
    Modified,
    /// The location exists only in the older tree.
    Removed,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// One changed location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Difference {
    /// Where the change happened.
    pub path: Path,
    /// What kind of change.
    pub change_type: ChangeType,
    /// Value before the change. `None` for `Added`.
    pub old_value: Option<Value>,
    /// Value after the change. `None` for `Removed`.
    pub new_value: Option<Value>,
    /// The entry key, for changes to map entries and set elements.
    pub key: Option<Value>,
}

impl Difference {
    /// An addition at `path`.
    #[must_use]
    pub const fn added(path: Path, new_value: Value) -> Self {
        Self {
            path,
            change_type: ChangeType::Added,
            old_value: None,
            new_value: Some(new_value),
            key: None,
        }
    }

    /// A removal at `path`.
    #[must_use]
    pub const fn removed(path: Path, old_value: Value) -> Self {
        Self {
            path,
            change_type: ChangeType::Removed,
            old_value: Some(old_value),
            new_value: None,
            key: None,
        }
    }

    /// A replacement at `path`.
    #[must_use]
    pub const fn modified(path: Path, old_value: Value, new_value: Value) -> Self {
        Self {
            path,
            change_type: ChangeType::Modified,
            old_value: Some(old_value),
            new_value: Some(new_value),
            key: None,
        }
    }

    /// Attach the map key or set element this change applies to.
    #[must_use]
    pub fn with_key(mut self, key: Value) -> Self {
        self.key = Some(key);
        self
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "<root>".to_owned()
        } else {
            self.path.to_string()
        };
        match (&self.old_value, &self.new_value) {
            (Some(old), Some(new)) => write!(f, "{} {path}: {old} -> {new}", self.change_type),
            (Some(old), None) => write!(f, "{} {path}: {old}", self.change_type),
            (None, Some(new)) => write!(f, "{} {path}: {new}", self.change_type),
            (None, None) => write!(f, "{} {path}", self.change_type),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from [`diff_values`] and [`compute_diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    /// The two roots are of different kinds and cannot be compared.
    StructuralMismatch {
        /// Kind of the older root.
        from: ValueKind,
        /// Kind of the newer root.
        to: ValueKind,
    },
    /// The walk was cancelled or ran past its deadline.
    Context(ContextError),
}

impl fmt::Display for DiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StructuralMismatch { from, to } => {
                write!(f, "cannot diff a {from} root against a {to} root")
            }
            Self::Context(e) => write!(f, "diff stopped: {e}"),
        }
    }
}

impl std::error::Error for DiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::Context(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<ContextError> for DiffError {
    fn from(e: ContextError) -> Self {
        Self::Context(e)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Diff `from` against `to` and return the canonical ordered [`Patch`].
pub fn compute_diff(format: Format, from: &Value, to: &Value) -> Result<Patch, DiffError> {
    compute_diff_ctx(&Context::background(), format, from, to)
}

/// Like [`compute_diff`], but stops when `ctx` is cancelled.
pub fn compute_diff_ctx(
    ctx: &Context,
    format: Format,
    from: &Value,
    to: &Value,
) -> Result<Patch, DiffError> {
    let diffs = diff_values(ctx, format, from, to)?;
    Ok(Patch::from_unordered(format, diffs))
}

/// Diff `from` against `to`, returning differences in traversal order.
///
/// No partial output is returned on error.
pub fn diff_values(
    ctx: &Context,
    format: Format,
    from: &Value,
    to: &Value,
) -> Result<Vec<Difference>, DiffError> {
    if from.kind() != to.kind() {
        return Err(DiffError::StructuralMismatch {
            from: from.kind(),
            to: to.kind(),
        });
    }

    let mut out = Vec::new();
    let mut stack = vec![(Path::root(), from.clone(), to.clone())];

    while let Some((path, a, b)) = stack.pop() {
        ctx.check()?;
        if a.equals(format, &b) {
            continue;
        }
        match (&a, &b) {
            (Value::Struct(x), Value::Struct(y)) if x.name() == y.name() => {
                join(x.fields(), y.fields(), |name, old, new| {
                    let child = path.child(PathPart::field(name.as_str()));
                    match (old, new) {
                        (Some(o), Some(n)) => stack.push((child, o.clone(), n.clone())),
                        (Some(o), None) => out.push(Difference::removed(child, o.clone())),
                        (None, Some(n)) => out.push(Difference::added(child, n.clone())),
                        (None, None) => {}
                    }
                });
            }
            (Value::List(x), Value::List(y)) => {
                for i in 0..x.len().max(y.len()) {
                    let child = path.child(PathPart::index(ordinal(i)));
                    match (x.get(i), y.get(i)) {
                        (Some(o), Some(n)) => stack.push((child, o.clone(), n.clone())),
                        (Some(o), None) => out.push(Difference::removed(child, o.clone())),
                        (None, Some(n)) => out.push(Difference::added(child, n.clone())),
                        (None, None) => {}
                    }
                }
            }
            (Value::Map(x), Value::Map(y)) => {
                join(x.entries(), y.entries(), |key, old, new| {
                    let child = path.child(PathPart::entry(format, key));
                    match (old, new) {
                        (Some(o), Some(n)) => stack.push((child, o.clone(), n.clone())),
                        (Some(o), None) => out.push(
                            Difference::removed(child, o.clone()).with_key(key.clone()),
                        ),
                        (None, Some(n)) => {
                            out.push(Difference::added(child, n.clone()).with_key(key.clone()));
                        }
                        (None, None) => {}
                    }
                });
            }
            (Value::Set(x), Value::Set(y)) => {
                join(
                    x.iter().map(|e| (e, &())),
                    y.iter().map(|e| (e, &())),
                    |element, old, new| {
                        let child = path.child(PathPart::entry(format, element));
                        match (old, new) {
                            (Some(()), None) => out.push(
                                Difference::removed(child, element.clone())
                                    .with_key(element.clone()),
                            ),
                            (None, Some(())) => out.push(
                                Difference::added(child, element.clone())
                                    .with_key(element.clone()),
                            ),
                            _ => {}
                        }
                    },
                );
            }
            _ => out.push(Difference::modified(path, a.clone(), b.clone())),
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn ordinal(i: usize) -> i64 {
    i64::try_from(i).unwrap_or(i64::MAX)
}

/// Merge-join two key-sorted sequences, visiting every key once with the
/// entry from each side that has it.
fn join<'a, K, V, F>(
    left: impl IntoIterator<Item = (&'a K, &'a V)>,
    right: impl IntoIterator<Item = (&'a K, &'a V)>,
    mut visit: F,
) where
    K: Ord + 'a,
    V: 'a,
    F: FnMut(&'a K, Option<&'a V>, Option<&'a V>),
{
    let mut l = left.into_iter().peekable();
    let mut r = right.into_iter().peekable();
    loop {
        let ord = match (l.peek(), r.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a, _)), Some((b, _))) => a.cmp(b),
        };
        match ord {
            Ordering::Less => {
                if let Some((k, v)) = l.next() {
                    visit(k, Some(v), None);
                }
            }
            Ordering::Greater => {
                if let Some((k, v)) = r.next() {
                    visit(k, None, Some(v));
                }
            }
            Ordering::Equal => {
                if let (Some((k, a)), Some((_, b))) = (l.next(), r.next()) {
                    visit(k, Some(a), Some(b));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
