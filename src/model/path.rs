//! Paths into a value graph.
//!
//! A [`Path`] names one location inside one value tree as a sequence of
//! [`PathPart`]s, root first. Three kinds of step exist:
//!
//! | Part | Text form | Descends into |
//! |------|-----------|---------------|
//! | [`PathPart::Field`] | `.name`, `."first name"` | a struct field |
//! | [`PathPart::Index`] | `[1]`, `["k"]`, `[true]` | a list element or a primitive-keyed map/set entry |
//! | [`PathPart::HashIndex`] | `[#<40 hex>]` | a map/set entry whose key is a composite value |
//!
//! Field names made only of alphanumerics, `_` and `-` are written bare;
//! any other name is quoted with the same escapes as string indexes.
//!
//! Index and hash-index parts take an `@key` suffix when they address the
//! entry's key instead of its value.
//!
//! Paths are values: extending one returns a new path. A path computed
//! against one snapshot only means something in another snapshot when the
//! two are structurally aligned.

use std::fmt;
use std::str::FromStr;

use strata_value::{Format, Hash, Value};

use super::ordering::compare_path_parts;

// ---------------------------------------------------------------------------
// PathPart
// ---------------------------------------------------------------------------

/// One step of descent into a value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathPart {
    /// A named struct field.
    Field {
        /// Field name.
        name: String,
    },
    /// A list ordinal, or a primitive map key / set element.
    Index {
        /// The ordinal or key.
        index: Value,
        /// Address the entry's key rather than its value.
        into_key: bool,
    },
    /// A map key / set element addressed by its content hash.
    HashIndex {
        /// Content hash of the key.
        hash: Hash,
        /// Address the entry's key rather than its value.
        into_key: bool,
    },
}

impl PathPart {
    /// A field step.
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field { name: name.into() }
    }

    /// An index step addressing an entry's value.
    #[must_use]
    pub fn index(index: impl Into<Value>) -> Self {
        Self::Index {
            index: index.into(),
            into_key: false,
        }
    }

    /// A hash-index step addressing an entry's value.
    #[must_use]
    pub const fn hash_index(hash: Hash) -> Self {
        Self::HashIndex {
            hash,
            into_key: false,
        }
    }

    /// The step that addresses the map entry or set element keyed by `key`.
    ///
    /// Primitive keys are addressed directly; composite keys by their hash
    /// under `format`.
    #[must_use]
    pub fn entry(format: Format, key: &Value) -> Self {
        if key.is_primitive() {
            Self::index(key.clone())
        } else {
            Self::hash_index(key.hash(format))
        }
    }

    /// The same step, retargeted at the entry's key. Field steps have no
    /// key and are returned unchanged.
    #[must_use]
    pub fn to_key(self) -> Self {
        match self {
            Self::Field { name } => Self::Field { name },
            Self::Index { index, .. } => Self::Index {
                index,
                into_key: true,
            },
            Self::HashIndex { hash, .. } => Self::HashIndex {
                hash,
                into_key: true,
            },
        }
    }

    /// `true` if this step addresses an entry's key.
    #[must_use]
    pub const fn is_into_key(&self) -> bool {
        match self {
            Self::Field { .. } => false,
            Self::Index { into_key, .. } | Self::HashIndex { into_key, .. } => *into_key,
        }
    }

    /// Follow this step from `node`. `None` if the step does not apply to
    /// the node's kind or the addressed child is absent.
    #[must_use]
    pub fn step(&self, format: Format, node: &Value) -> Option<Value> {
        match (self, node) {
            (Self::Field { name }, Value::Struct(s)) => s.get(name).cloned(),
            (
                Self::Index {
                    index,
                    into_key: false,
                },
                Value::List(list),
            ) => list_ordinal(index).and_then(|i| list.get(i)).cloned(),
            (Self::Index { index, into_key }, Value::Map(map)) => {
                if *into_key {
                    map.contains_key(index).then(|| index.clone())
                } else {
                    map.get(index).cloned()
                }
            }
            (Self::Index { index, .. }, Value::Set(set)) => {
                set.contains(index).then(|| index.clone())
            }
            (Self::HashIndex { hash, into_key }, Value::Map(map)) => map
                .find_by_hash(format, hash)
                .map(|(k, v)| if *into_key { k } else { v })
                .cloned(),
            (Self::HashIndex { hash, .. }, Value::Set(set)) => {
                set.find_by_hash(format, hash).cloned()
            }
            _ => None,
        }
    }
}

/// Interpret an index value as a list ordinal.
pub(crate) fn list_ordinal(index: &Value) -> Option<usize> {
    index.as_int().and_then(|i| usize::try_from(i).ok())
}

impl fmt::Display for PathPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { name } if is_bare_field(name) => write!(f, ".{name}")?,
            Self::Field { name } => {
                f.write_str(".")?;
                write_quoted(f, name)?;
            }
            Self::Index { index, .. } => {
                f.write_str("[")?;
                write_index(f, index)?;
                f.write_str("]")?;
            }
            Self::HashIndex { hash, .. } => write!(f, "[#{hash}]")?,
        }
        if self.is_into_key() {
            f.write_str("@key")?;
        }
        Ok(())
    }
}

fn write_index(f: &mut fmt::Formatter<'_>, index: &Value) -> fmt::Result {
    match index {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(i) => write!(f, "{i}"),
        Value::Str(s) => write_quoted(f, s),
        Value::Ref(hash) => write!(f, "^{hash}"),
        other => write!(f, "{other:?}"),
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}

fn is_bare_field_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_bare_field(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_bare_field_char)
}

// ---------------------------------------------------------------------------
// Path
// ---------------------------------------------------------------------------

/// A location inside a value tree, as a root-first sequence of steps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path(Vec<PathPart>);

impl Path {
    /// The empty path, addressing the root itself.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// A path from explicit parts.
    #[must_use]
    pub const fn new(parts: Vec<PathPart>) -> Self {
        Self(parts)
    }

    /// The steps, root first.
    #[must_use]
    pub fn parts(&self) -> &[PathPart] {
        &self.0
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` for the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The final step, if any.
    #[must_use]
    pub fn last(&self) -> Option<&PathPart> {
        self.0.last()
    }

    /// A new path one step deeper.
    #[must_use]
    pub fn child(&self, part: PathPart) -> Self {
        let mut parts = Vec::with_capacity(self.0.len() + 1);
        parts.extend_from_slice(&self.0);
        parts.push(part);
        Self(parts)
    }

    /// The first `len` steps of this path.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// `true` if `prefix` is this path or one of its ancestors.
    #[must_use]
    pub fn has_prefix(&self, format: Format, prefix: &Self) -> bool {
        prefix.len() <= self.len()
            && prefix
                .0
                .iter()
                .zip(&self.0)
                .all(|(a, b)| compare_path_parts(format, a, b).is_eq())
    }

    /// Walk `root` along this path and return the addressed value.
    ///
    /// `None` if any step is missing or does not apply to the node it meets.
    #[must_use]
    pub fn resolve(&self, format: Format, root: &Value) -> Option<Value> {
        let mut current = root.clone();
        for part in &self.0 {
            current = part.step(format, &current)?;
        }
        Some(current)
    }

    /// Parse the text form produced by `Display`.
    pub fn parse(input: &str) -> Result<Self, PathParseError> {
        let mut parser = Parser { input, pos: 0 };
        let mut parts = Vec::new();
        while !parser.at_end() {
            parts.push(parser.part()?);
        }
        Ok(Self(parts))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.0 {
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Vec<PathPart>> for Path {
    fn from(parts: Vec<PathPart>) -> Self {
        Self(parts)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Error returned when path text is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathParseError {
    /// The full input.
    pub input: String,
    /// Byte offset where parsing failed.
    pub position: usize,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid path {:?} at byte {}: {}",
            self.input, self.position, self.reason
        )
    }
}

impl std::error::Error for PathParseError {}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn error(&self, reason: impl Into<String>) -> PathParseError {
        PathParseError {
            input: self.input.to_owned(),
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn part(&mut self) -> Result<PathPart, PathParseError> {
        match self.bump() {
            Some('.') => {
                if self.peek() == Some('"') {
                    return Ok(PathPart::field(self.quoted()?));
                }
                let name = self.take_while(is_bare_field_char);
                if name.is_empty() {
                    return Err(self.error("expected field name after '.'"));
                }
                Ok(PathPart::field(name))
            }
            Some('[') => {
                let part = self.index()?;
                if self.bump() != Some(']') {
                    return Err(self.error("expected ']'"));
                }
                if self.rest().starts_with("@key") {
                    self.pos += "@key".len();
                    Ok(part.to_key())
                } else {
                    Ok(part)
                }
            }
            _ => Err(self.error("expected '.' or '['")),
        }
    }

    fn index(&mut self) -> Result<PathPart, PathParseError> {
        match self.peek() {
            Some('"') => Ok(PathPart::index(self.quoted()?)),
            Some('#') => {
                self.pos += 1;
                Ok(PathPart::hash_index(self.hash()?))
            }
            Some('^') => {
                self.pos += 1;
                Ok(PathPart::index(Value::Ref(self.hash()?)))
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let digits = self.take_while(|c| c == '-' || c.is_ascii_digit());
                digits
                    .parse::<i64>()
                    .map(PathPart::index)
                    .map_err(|e| self.error(format!("invalid integer index: {e}")))
            }
            _ => match self.take_while(|c| c.is_ascii_alphabetic()) {
                "true" => Ok(PathPart::index(true)),
                "false" => Ok(PathPart::index(false)),
                "null" => Ok(PathPart::index(Value::Null)),
                _ => Err(self.error("expected integer, string, bool, null, or hash index")),
            },
        }
    }

    /// A double-quoted string with `\"` and `\\` escapes.
    fn quoted(&mut self) -> Result<String, PathParseError> {
        if self.bump() != Some('"') {
            return Err(self.error("expected '\"'"));
        }
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some(c @ ('"' | '\\')) => s.push(c),
                    _ => return Err(self.error("invalid escape in quoted string")),
                },
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated quoted string")),
            }
        }
    }

    fn hash(&mut self) -> Result<Hash, PathParseError> {
        let hex = self.take_while(|c| c.is_ascii_hexdigit());
        hex.parse::<Hash>().map_err(|e| self.error(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const F: Format = Format::Current;

    fn row(id: i64, val: &str) -> Value {
        Value::structure("Row", [("id", Value::Int(id)), ("val", Value::from(val))])
    }

    #[test]
    fn display_forms() {
        let hash = Hash::from_bytes([0xcd; 20]);
        let path = Path::new(vec![
            PathPart::field("rows"),
            PathPart::index(1),
            PathPart::field("val"),
        ]);
        assert_eq!(path.to_string(), ".rows[1].val");
        assert_eq!(PathPart::index("a\"b").to_string(), "[\"a\\\"b\"]");
        assert_eq!(PathPart::hash_index(hash).to_string(), format!("[#{hash}]"));
        assert_eq!(PathPart::index(true).to_key().to_string(), "[true]@key");
        assert_eq!(Path::root().to_string(), "");
    }

    #[test]
    fn parse_round_trip() {
        let hash = Hash::from_bytes([0x12; 20]);
        let path = Path::new(vec![
            PathPart::field("rows"),
            PathPart::index(-3),
            PathPart::index("quote\"and\\slash"),
            PathPart::hash_index(hash).to_key(),
            PathPart::index(Value::Null),
            PathPart::index(Value::Ref(hash)),
            PathPart::index(false).to_key(),
            PathPart::field("first name"),
            PathPart::field("a.b[0]"),
            PathPart::field("say \"hi\"\\"),
            PathPart::field(""),
        ]);
        let text = path.to_string();
        assert_eq!(Path::parse(&text).unwrap(), path);
    }

    #[test]
    fn odd_field_names_are_quoted() {
        assert_eq!(PathPart::field("val").to_string(), ".val");
        assert_eq!(PathPart::field("first-name_2").to_string(), ".first-name_2");
        assert_eq!(PathPart::field("first name").to_string(), ".\"first name\"");
        assert_eq!(PathPart::field("a.b").to_string(), ".\"a.b\"");
        assert_eq!(
            Path::parse(".\"a.b\"").unwrap(),
            Path::new(vec![PathPart::field("a.b")])
        );
        assert!(Path::parse(".\"open").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["rows", ".", "[", "[1", "[\"open", "[#abc]", "[maybe]", "[1]@", ".a[\"\\n\"]"] {
            assert!(Path::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn parse_error_reports_position() {
        let err = Path::parse(".a[x]").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.to_string().contains(".a[x]"));
    }

    #[test]
    fn parse_empty_is_root() {
        assert_eq!("".parse::<Path>().unwrap(), Path::root());
    }

    #[test]
    fn child_and_prefix() {
        let p = Path::root().child(PathPart::index(1)).child(PathPart::field("val"));
        assert_eq!(p.len(), 2);
        assert_eq!(p.prefix(1), Path::new(vec![PathPart::index(1)]));
        assert_eq!(p.prefix(9), p);
        assert_eq!(p.last(), Some(&PathPart::field("val")));
        assert!(p.has_prefix(F, &p.prefix(1)));
        assert!(p.has_prefix(F, &Path::root()));
        assert!(!p.prefix(1).has_prefix(F, &p));
    }

    #[test]
    fn resolve_through_map_and_struct() {
        let rows = Value::map([(Value::Int(1), row(1, "a"))]);
        let path = Path::parse("[1].val").unwrap();
        assert_eq!(path.resolve(F, &rows), Some(Value::from("a")));
        assert_eq!(Path::parse("[2].val").unwrap().resolve(F, &rows), None);
        assert_eq!(Path::parse("[1].nope").unwrap().resolve(F, &rows), None);
        assert_eq!(Path::root().resolve(F, &rows), Some(rows.clone()));
    }

    #[test]
    fn resolve_into_key() {
        let rows = Value::map([(Value::Int(1), row(1, "a"))]);
        let key = Path::new(vec![PathPart::index(1).to_key()]);
        assert_eq!(key.resolve(F, &rows), Some(Value::Int(1)));
    }

    #[test]
    fn resolve_list_ordinals() {
        let list = Value::list([Value::from("x"), Value::from("y")]);
        assert_eq!(Path::parse("[1]").unwrap().resolve(F, &list), Some(Value::from("y")));
        assert_eq!(Path::parse("[2]").unwrap().resolve(F, &list), None);
        assert_eq!(Path::parse("[-1]").unwrap().resolve(F, &list), None);
    }

    #[test]
    fn resolve_composite_key_by_hash() {
        let key = Value::list([Value::Int(1), Value::Int(2)]);
        let map = Value::map([(key.clone(), Value::from("pair"))]);
        let part = PathPart::entry(F, &key);
        assert!(matches!(part, PathPart::HashIndex { .. }));
        let path = Path::new(vec![part.clone()]);
        assert_eq!(path.resolve(F, &map), Some(Value::from("pair")));
        assert_eq!(Path::new(vec![part.to_key()]).resolve(F, &map), Some(key));
    }

    #[test]
    fn resolve_set_elements() {
        let set = Value::set([Value::Int(4), Value::list([Value::Int(5)])]);
        assert_eq!(
            Path::new(vec![PathPart::entry(F, &Value::Int(4))]).resolve(F, &set),
            Some(Value::Int(4))
        );
        let composite = Value::list([Value::Int(5)]);
        assert_eq!(
            Path::new(vec![PathPart::entry(F, &composite)]).resolve(F, &set),
            Some(composite)
        );
    }

    #[test]
    fn entry_uses_index_for_primitives() {
        assert_eq!(PathPart::entry(F, &Value::from("k")), PathPart::index("k"));
        assert!(!PathPart::entry(F, &Value::Int(1)).is_into_key());
    }
}
