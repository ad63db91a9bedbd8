//! Ordered patches and patch application.
//!
//! A [`Patch`] is a list of [`Difference`]s held in canonical order (see
//! [`super::ordering`]). The order is established on construction; there is
//! no way to build a `Patch` in insertion order.
//!
//! [`apply_patch`] replays a patch onto the tree it was computed from. Edits
//! at a node are applied before edits below it. Inside a list, in-place
//! edits use the original ordinals, removals run from the highest ordinal
//! down, and insertions run from the lowest ordinal up, so no edit shifts the
//! offset of a later one.

use std::collections::BTreeSet;
use std::fmt;

use strata_value::{Format, List, Map, Set, Struct, Value, ValueKind};

use super::diff::{ChangeType, Difference};
use super::ordering::{compare_path_parts, sort_differences};
use super::path::{Path, PathPart, list_ordinal};

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Differences in canonical order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Patch {
    diffs: Vec<Difference>,
}

impl Patch {
    /// Sort `diffs` into canonical order and wrap them.
    #[must_use]
    pub fn from_unordered(format: Format, mut diffs: Vec<Difference>) -> Self {
        sort_differences(format, &mut diffs);
        Self { diffs }
    }

    /// The empty patch.
    #[must_use]
    pub const fn empty() -> Self {
        Self { diffs: Vec::new() }
    }

    /// Iterate in canonical order.
    pub fn iter(&self) -> std::slice::Iter<'_, Difference> {
        self.diffs.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Difference] {
        &self.diffs
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<Difference> {
        self.diffs
    }

    /// Number of differences of the given kind.
    #[must_use]
    pub fn count(&self, change_type: ChangeType) -> usize {
        self.diffs
            .iter()
            .filter(|d| d.change_type == change_type)
            .count()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a Difference;
    type IntoIter = std::slice::Iter<'a, Difference>;

    fn into_iter(self) -> Self::IntoIter {
        self.diffs.iter()
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diff in &self.diffs {
            writeln!(f, "{diff}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from [`apply_patch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchError {
    /// A removal, modification, or descent named a location that does not
    /// exist.
    MissingTarget {
        /// The missing location.
        path: Path,
    },
    /// An addition named a location that already exists.
    TargetExists {
        /// The occupied location.
        path: Path,
    },
    /// A list ordinal was past the end of the list.
    IndexOutOfRange {
        /// The list element path.
        path: Path,
        /// The ordinal requested.
        index: usize,
        /// The list's length at the time.
        len: usize,
    },
    /// A path step does not apply to the node it reached.
    InvalidPart {
        /// The offending path prefix.
        path: Path,
        /// Kind of the node the step was applied to.
        kind: ValueKind,
    },
    /// An edit addressed a map key or set element's key directly.
    KeyEdit {
        /// The `@key` path.
        path: Path,
    },
    /// The patch removed the root value.
    RootRemoved,
}

fn show(path: &Path) -> String {
    if path.is_empty() {
        "<root>".to_owned()
    } else {
        path.to_string()
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget { path } => write!(f, "no value at {}", show(path)),
            Self::TargetExists { path } => write!(f, "value already exists at {}", show(path)),
            Self::IndexOutOfRange { path, index, len } => write!(
                f,
                "index {index} out of range at {} (list length {len})",
                show(path)
            ),
            Self::InvalidPart { path, kind } => {
                write!(f, "path {} does not apply to a {kind} value", show(path))
            }
            Self::KeyEdit { path } => write!(f, "cannot edit entry key at {}", show(path)),
            Self::RootRemoved => write!(f, "patch removes the root value"),
        }
    }
}

impl std::error::Error for PatchError {}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply `patch` to `root` and return the patched value.
///
/// `root` is not modified. Recursion depth is bounded by the longest path in
/// the patch.
pub fn apply_patch(format: Format, root: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let diffs: Vec<&Difference> = patch.iter().collect();
    apply_node(format, 0, Some(root.clone()), &diffs)?.ok_or(PatchError::RootRemoved)
}

type Group<'a> = (&'a PathPart, &'a [&'a Difference]);

/// Apply every diff in `diffs` (all sharing the same `depth`-long prefix) to
/// `current`. `None` means the location is absent, before or after.
fn apply_node(
    format: Format,
    depth: usize,
    current: Option<Value>,
    diffs: &[&Difference],
) -> Result<Option<Value>, PatchError> {
    let split = diffs
        .iter()
        .position(|d| d.path.len() > depth)
        .unwrap_or(diffs.len());
    let (here, below) = diffs.split_at(split);

    let mut current = current;
    for diff in here {
        current = apply_change(current, diff)?;
    }
    let Some(first) = below.first() else {
        return Ok(current);
    };
    let Some(node) = current else {
        return Err(PatchError::MissingTarget {
            path: first.path.prefix(depth),
        });
    };

    let groups = group_by_part(format, depth, below);
    let updated = match &node {
        Value::Struct(s) => Value::Struct(apply_struct(format, depth, s, &groups)?),
        Value::Map(m) => Value::Map(apply_map(format, depth, m, &groups)?),
        Value::Set(s) => Value::Set(apply_set(format, depth, s, &groups)?),
        Value::List(l) => Value::List(apply_list(format, depth, l, &groups)?),
        other => {
            return Err(PatchError::InvalidPart {
                path: first.path.prefix(depth + 1),
                kind: other.kind(),
            });
        }
    };
    Ok(Some(updated))
}

fn apply_change(current: Option<Value>, diff: &Difference) -> Result<Option<Value>, PatchError> {
    match diff.change_type {
        ChangeType::Removed | ChangeType::Modified if current.is_none() => {
            Err(PatchError::MissingTarget {
                path: diff.path.clone(),
            })
        }
        ChangeType::Added if current.is_some() => Err(PatchError::TargetExists {
            path: diff.path.clone(),
        }),
        ChangeType::Removed => Ok(None),
        ChangeType::Modified | ChangeType::Added => Ok(diff.new_value.clone()),
    }
}

/// Split sorted diffs into runs that share the step at `depth`.
fn group_by_part<'a>(format: Format, depth: usize, diffs: &'a [&'a Difference]) -> Vec<Group<'a>> {
    let mut groups = Vec::new();
    let mut start = 0;
    while let Some(part) = diffs.get(start).and_then(|d| d.path.parts().get(depth)) {
        let mut end = start + 1;
        while diffs
            .get(end)
            .and_then(|d| d.path.parts().get(depth))
            .is_some_and(|next| compare_path_parts(format, part, next).is_eq())
        {
            end += 1;
        }
        groups.push((part, &diffs[start..end]));
        start = end;
    }
    groups
}

fn group_path(diffs: &[&Difference], depth: usize) -> Path {
    diffs
        .first()
        .map_or_else(Path::root, |d| d.path.prefix(depth + 1))
}

fn entry_key(diffs: &[&Difference]) -> Option<Value> {
    diffs.iter().find_map(|d| d.key.clone())
}

fn reject_part(
    part: &PathPart,
    diffs: &[&Difference],
    depth: usize,
    kind: ValueKind,
) -> PatchError {
    let path = group_path(diffs, depth);
    if part.is_into_key() {
        PatchError::KeyEdit { path }
    } else {
        PatchError::InvalidPart { path, kind }
    }
}

fn apply_struct(
    format: Format,
    depth: usize,
    s: &Struct,
    groups: &[Group<'_>],
) -> Result<Struct, PatchError> {
    let mut fields = s.fields().clone();
    for &(part, diffs) in groups {
        let PathPart::Field { name } = part else {
            return Err(reject_part(part, diffs, depth, ValueKind::Struct));
        };
        match apply_node(format, depth + 1, fields.get(name).cloned(), diffs)? {
            Some(v) => {
                fields.insert(name.clone(), v);
            }
            None => {
                fields.remove(name);
            }
        }
    }
    Ok(Struct::new(s.name(), fields))
}

fn apply_map(
    format: Format,
    depth: usize,
    m: &Map,
    groups: &[Group<'_>],
) -> Result<Map, PatchError> {
    let mut entries = m.entries().clone();
    for &(part, diffs) in groups {
        let key = match part {
            PathPart::Index {
                index,
                into_key: false,
            } => index.clone(),
            PathPart::HashIndex {
                hash,
                into_key: false,
            } => m
                .find_by_hash(format, hash)
                .map(|(k, _)| k.clone())
                .or_else(|| entry_key(diffs))
                .ok_or_else(|| PatchError::MissingTarget {
                    path: group_path(diffs, depth),
                })?,
            _ => return Err(reject_part(part, diffs, depth, ValueKind::Map)),
        };
        match apply_node(format, depth + 1, entries.get(&key).cloned(), diffs)? {
            Some(v) => {
                entries.insert(key, v);
            }
            None => {
                entries.remove(&key);
            }
        }
    }
    Ok(Map::new(entries))
}

fn apply_set(
    format: Format,
    depth: usize,
    s: &Set,
    groups: &[Group<'_>],
) -> Result<Set, PatchError> {
    let mut elements: BTreeSet<Value> = s.iter().cloned().collect();
    for &(part, diffs) in groups {
        let element = match part {
            PathPart::Index {
                index,
                into_key: false,
            } => index.clone(),
            PathPart::HashIndex {
                hash,
                into_key: false,
            } => s
                .find_by_hash(format, hash)
                .cloned()
                .or_else(|| entry_key(diffs))
                .ok_or_else(|| PatchError::MissingTarget {
                    path: group_path(diffs, depth),
                })?,
            _ => return Err(reject_part(part, diffs, depth, ValueKind::Set)),
        };
        let present = elements.contains(&element).then(|| element.clone());
        let result = apply_node(format, depth + 1, present, diffs)?;
        elements.remove(&element);
        if let Some(v) = result {
            elements.insert(v);
        }
    }
    Ok(Set::new(elements))
}

fn apply_list(
    format: Format,
    depth: usize,
    list: &List,
    groups: &[Group<'_>],
) -> Result<List, PatchError> {
    let mut items = list.as_slice().to_vec();
    let len = items.len();
    let mut removals = Vec::new();
    let mut insertions = Vec::new();

    for &(part, diffs) in groups {
        let path = group_path(diffs, depth);
        let ordinal = match part {
            PathPart::Index {
                index,
                into_key: false,
            } => list_ordinal(index),
            _ => None,
        };
        let Some(i) = ordinal else {
            return Err(reject_part(part, diffs, depth, ValueKind::List));
        };

        let inserting = diffs
            .first()
            .is_some_and(|d| d.path.len() == depth + 1 && d.change_type == ChangeType::Added);
        if inserting {
            if let Some(v) = apply_node(format, depth + 1, None, diffs)? {
                insertions.push((i, v, path));
            }
            continue;
        }

        let Some(original) = items.get(i).cloned() else {
            return Err(PatchError::IndexOutOfRange {
                path,
                index: i,
                len,
            });
        };
        match apply_node(format, depth + 1, Some(original), diffs)? {
            Some(v) => items[i] = v,
            None => removals.push(i),
        }
    }

    // Groups arrive in ascending ordinal order.
    for i in removals.into_iter().rev() {
        items.remove(i);
    }
    for (i, v, path) in insertions {
        if i > items.len() {
            return Err(PatchError::IndexOutOfRange {
                path,
                index: i,
                len: items.len(),
            });
        }
        items.insert(i, v);
    }
    Ok(List::new(items))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
