//! Canonical ordering of paths and differences.
//!
//! Patches are kept in one total order so they can be applied in a single
//! pass and so two diffs of the same pair of snapshots always list their
//! differences identically.
//!
//! - Part kinds order `Field < Index < HashIndex`.
//! - Fields order by name; indexes by format-aware value comparison; hash
//!   indexes by hash bytes. On equal index or hash, the `@key` part sorts
//!   first.
//! - Paths order part by part; a proper prefix sorts before its extensions.
//! - Differences at equal paths order `Removed < Modified < Added`.

use std::cmp::Ordering;

use strata_value::Format;

use super::diff::{ChangeType, Difference};
use super::path::{Path, PathPart};

/// Three-way comparison of two path parts.
#[must_use]
pub fn compare_path_parts(format: Format, a: &PathPart, b: &PathPart) -> Ordering {
    match (a, b) {
        (PathPart::Field { name: x }, PathPart::Field { name: y }) => x.cmp(y),
        (PathPart::Field { .. }, _) => Ordering::Less,
        (_, PathPart::Field { .. }) => Ordering::Greater,
        (
            PathPart::Index {
                index: x,
                into_key: kx,
            },
            PathPart::Index {
                index: y,
                into_key: ky,
            },
        ) => {
            if x.equals(format, y) {
                key_first(*kx, *ky)
            } else {
                x.compare(format, y)
            }
        }
        (PathPart::Index { .. }, PathPart::HashIndex { .. }) => Ordering::Less,
        (PathPart::HashIndex { .. }, PathPart::Index { .. }) => Ordering::Greater,
        (
            PathPart::HashIndex {
                hash: x,
                into_key: kx,
            },
            PathPart::HashIndex {
                hash: y,
                into_key: ky,
            },
        ) => x.as_bytes().cmp(y.as_bytes()).then_with(|| key_first(*kx, *ky)),
    }
}

// `@key` before the plain entry.
const fn key_first(a: bool, b: bool) -> Ordering {
    match (a, b) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Three-way comparison of two paths.
#[must_use]
pub fn compare_paths(format: Format, a: &Path, b: &Path) -> Ordering {
    for (x, y) in a.parts().iter().zip(b.parts()) {
        let ord = compare_path_parts(format, x, y);
        if ord.is_ne() {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Rank used to order differences at the same path.
#[must_use]
pub const fn change_type_rank(change: ChangeType) -> u8 {
    match change {
        ChangeType::Removed => 0,
        ChangeType::Modified => 1,
        ChangeType::Added => 2,
    }
}

/// Three-way comparison of two differences: by path, then change type.
#[must_use]
pub fn compare_differences(format: Format, a: &Difference, b: &Difference) -> Ordering {
    compare_paths(format, &a.path, &b.path)
        .then_with(|| change_type_rank(a.change_type).cmp(&change_type_rank(b.change_type)))
}

/// Sort differences into canonical order. The sort is stable.
pub fn sort_differences(format: Format, diffs: &mut [Difference]) {
    diffs.sort_by(|a, b| compare_differences(format, a, b));
}

#[cfg(test)]
mod tests {
    use strata_value::{Hash, Value};

    use super::*;

    const F: Format = Format::Current;

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    #[test]
    fn part_kinds_order_field_index_hash() {
        let field = PathPart::field("z");
        let index = PathPart::index(0);
        let hash = PathPart::hash_index(Hash::ZERO);
        assert_eq!(compare_path_parts(F, &field, &index), Ordering::Less);
        assert_eq!(compare_path_parts(F, &index, &hash), Ordering::Less);
        assert_eq!(compare_path_parts(F, &field, &hash), Ordering::Less);
        assert_eq!(compare_path_parts(F, &hash, &field), Ordering::Greater);
    }

    #[test]
    fn fields_order_by_name() {
        assert_eq!(
            compare_path_parts(F, &PathPart::field("a"), &PathPart::field("b")),
            Ordering::Less
        );
        assert_eq!(
            compare_path_parts(F, &PathPart::field("a"), &PathPart::field("a")),
            Ordering::Equal
        );
    }

    #[test]
    fn indexes_order_by_value() {
        assert_eq!(
            compare_path_parts(F, &PathPart::index(2), &PathPart::index(10)),
            Ordering::Less
        );
        assert_eq!(
            compare_path_parts(F, &PathPart::index(true), &PathPart::index(1)),
            Value::Bool(true).compare(F, &Value::Int(1))
        );
    }

    #[test]
    fn into_key_sorts_first() {
        let key = PathPart::index(3).to_key();
        let value = PathPart::index(3);
        assert_eq!(compare_path_parts(F, &key, &value), Ordering::Less);
        assert_eq!(compare_path_parts(F, &value, &key), Ordering::Greater);

        let hk = PathPart::hash_index(Hash::ZERO).to_key();
        let hv = PathPart::hash_index(Hash::ZERO);
        assert_eq!(compare_path_parts(F, &hk, &hv), Ordering::Less);
    }

    #[test]
    fn hash_indexes_order_by_bytes() {
        let lo = PathPart::hash_index(Hash::from_bytes([1; 20]));
        let hi = PathPart::hash_index(Hash::from_bytes([2; 20]));
        assert_eq!(compare_path_parts(F, &lo, &hi), Ordering::Less);
    }

    #[test]
    fn prefix_sorts_first() {
        assert_eq!(compare_paths(F, &p("[1]"), &p("[1].val")), Ordering::Less);
        assert_eq!(compare_paths(F, &p("[1].val"), &p("[1]")), Ordering::Greater);
        assert_eq!(compare_paths(F, &Path::root(), &p("[0]")), Ordering::Less);
        assert_eq!(compare_paths(F, &p("[1].a"), &p("[1].a")), Ordering::Equal);
    }

    #[test]
    fn equal_paths_order_by_change_type() {
        let path = p("[1]");
        let removed = Difference::removed(path.clone(), Value::Int(1));
        let modified = Difference::modified(path.clone(), Value::Int(1), Value::Int(2));
        let added = Difference::added(path, Value::Int(2));
        let mut diffs = vec![added.clone(), modified.clone(), removed.clone()];
        sort_differences(F, &mut diffs);
        assert_eq!(diffs, vec![removed, modified, added]);
    }

    #[test]
    fn path_order_dominates_change_type() {
        let a = Difference::added(p("[1]"), Value::Int(1));
        let r = Difference::removed(p("[2]"), Value::Int(2));
        assert_eq!(compare_differences(F, &a, &r), Ordering::Less);
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let first = Difference::modified(p("[1]"), Value::Int(0), Value::Int(1));
        let second = Difference::modified(p("[1]"), Value::Int(0), Value::Int(2));
        let mut diffs = vec![first.clone(), second.clone()];
        sort_differences(F, &mut diffs);
        assert_eq!(diffs, vec![first, second]);
    }
}
