//! The value tree.
//!
//! A [`Value`] is either a primitive (null, bool, integer, string, ref) or a
//! composite node (list, map, set, struct). Composite nodes are immutable and
//! reference-counted, so cloning a value is O(1) and unchanged subtrees are
//! shared between versions. Each composite caches its content hash once per
//! [`Format`].
//!
//! # Two orderings
//!
//! - `Ord` on [`Value`] is structural and format-independent. It is what
//!   map keys and set elements are stored by.
//! - [`Value::compare`] is format-aware: primitives compare by value, any
//!   primitive sorts before any composite, and composites compare by content
//!   hash under the given format. This is the order used when values appear
//!   inside paths.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::format::Format;
use crate::hash::Hash;

// ---------------------------------------------------------------------------
// ValueKind
// ---------------------------------------------------------------------------

/// The kind of a [`Value`]. Declaration order is the structural kind order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// The absent/unknown value.
    Null,
    /// `true` or `false`.
    Bool,
    /// A signed 64-bit integer.
    Int,
    /// A UTF-8 string.
    Str,
    /// A reference to another value by content address.
    Ref,
    /// An ordered sequence.
    List,
    /// An ordered key → value mapping.
    Map,
    /// An ordered set of unique elements.
    Set,
    /// A named record of fields.
    Struct,
}

impl ValueKind {
    /// Encoding tag written after the format version byte.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Primitives compare by value; everything else by hash.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool | Self::Int | Self::Str | Self::Ref
        )
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Str => "str",
            Self::Ref => "ref",
            Self::List => "list",
            Self::Map => "map",
            Self::Set => "set",
            Self::Struct => "struct",
        }
    }

    /// Inverse of [`ValueKind::name`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        const ALL: [ValueKind; 9] = [
            ValueKind::Null,
            ValueKind::Bool,
            ValueKind::Int,
            ValueKind::Str,
            ValueKind::Ref,
            ValueKind::List,
            ValueKind::Map,
            ValueKind::Set,
            ValueKind::Struct,
        ];
        ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Shared node storage
// ---------------------------------------------------------------------------

struct HashCache([OnceLock<Hash>; Format::COUNT]);

impl HashCache {
    fn new() -> Self {
        Self(std::array::from_fn(|_| OnceLock::new()))
    }

    fn get_or_compute(&self, format: Format, compute: impl FnOnce() -> Hash) -> Hash {
        *self.0[format.slot()].get_or_init(compute)
    }
}

/// Per-format `content hash -> key` lookup for map keys and set elements,
/// built on first use.
#[derive(Default)]
struct KeyIndex([OnceLock<HashMap<Hash, Value>>; Format::COUNT]);

impl KeyIndex {
    fn get_or_build<'a>(
        &self,
        format: Format,
        keys: impl Iterator<Item = &'a Value>,
    ) -> &HashMap<Hash, Value> {
        self.0[format.slot()].get_or_init(|| {
            let mut index = HashMap::new();
            for key in keys {
                index.entry(key.hash(format)).or_insert_with(|| key.clone());
            }
            index
        })
    }
}

struct Node<T, I = ()> {
    data: T,
    hashes: HashCache,
    keys: I,
}

impl<T, I: Default> Node<T, I> {
    fn new(data: T) -> Arc<Self> {
        Arc::new(Self {
            data,
            hashes: HashCache::new(),
            keys: I::default(),
        })
    }
}

fn digest(format: Format, kind: ValueKind, body: impl FnOnce(&mut Sha256)) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([format.version_tag(), kind.tag()]);
    body(&mut hasher);
    Hash::from_digest(&hasher.finalize())
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_be_bytes());
}

fn write_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    write_len(hasher, bytes.len());
    hasher.update(bytes);
}

/// Implements pointer-shortcut equality and structural ordering for a
/// composite node wrapper.
macro_rules! composite_node {
    ($name:ident) => {
        impl $name {
            /// `true` if both handles point at the same shared node.
            #[must_use]
            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.ptr_eq(other) || self.0.data == other.0.data
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                if self.ptr_eq(other) {
                    Ordering::Equal
                } else {
                    self.0.data.cmp(&other.0.data)
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// An immutable ordered sequence of values.
#[derive(Clone)]
pub struct List(Arc<Node<Vec<Value>>>);

composite_node!(List);

impl List {
    /// Build a list from its items.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self(Node::new(items))
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    /// `true` if the list has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.data.is_empty()
    }

    /// Item at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.data.get(index)
    }

    /// Items in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.data.iter()
    }

    /// Borrow the items as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.0.data
    }

    /// Content hash under `format`, computed once and cached.
    #[must_use]
    pub fn hash(&self, format: Format) -> Hash {
        self.0.hashes.get_or_compute(format, || {
            digest(format, ValueKind::List, |h| {
                write_len(h, self.len());
                for item in self.iter() {
                    h.update(item.hash(format).as_bytes());
                }
            })
        })
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// An immutable mapping, ordered by the structural order of its keys.
#[derive(Clone)]
pub struct Map(Arc<Node<BTreeMap<Value, Value>, KeyIndex>>);

composite_node!(Map);

impl Map {
    /// Build a map from its entries.
    #[must_use]
    pub fn new(entries: BTreeMap<Value, Value>) -> Self {
        Self(Node::new(entries))
    }

    /// An empty map.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    /// `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.data.is_empty()
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.0.data.get(key)
    }

    /// `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &Value) -> bool {
        self.0.data.contains_key(key)
    }

    /// Entries in key order.
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, Value, Value> {
        self.0.data.iter()
    }

    /// Keys in order.
    pub fn keys(&self) -> std::collections::btree_map::Keys<'_, Value, Value> {
        self.0.data.keys()
    }

    /// Borrow the underlying entries.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<Value, Value> {
        &self.0.data
    }

    /// Find the entry whose key hashes to `hash` under `format`.
    ///
    /// The first lookup per format indexes every key; later lookups on the
    /// same node are O(1).
    #[must_use]
    pub fn find_by_hash(&self, format: Format, hash: &Hash) -> Option<(&Value, &Value)> {
        let key = self.0.keys.get_or_build(format, self.keys()).get(hash)?;
        self.0.data.get_key_value(key)
    }

    /// A new map with `key` set to `value`.
    #[must_use]
    pub fn insert(&self, key: Value, value: Value) -> Self {
        let mut entries = self.0.data.clone();
        entries.insert(key, value);
        Self::new(entries)
    }

    /// A new map without `key`.
    #[must_use]
    pub fn remove(&self, key: &Value) -> Self {
        let mut entries = self.0.data.clone();
        entries.remove(key);
        Self::new(entries)
    }

    /// Content hash under `format`, computed once and cached.
    #[must_use]
    pub fn hash(&self, format: Format) -> Hash {
        self.0.hashes.get_or_compute(format, || {
            digest(format, ValueKind::Map, |h| {
                write_len(h, self.len());
                for (key, value) in self.iter() {
                    h.update(key.hash(format).as_bytes());
                    h.update(value.hash(format).as_bytes());
                }
            })
        })
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Set
// ---------------------------------------------------------------------------

/// An immutable set, ordered by the structural order of its elements.
#[derive(Clone)]
pub struct Set(Arc<Node<BTreeSet<Value>, KeyIndex>>);

composite_node!(Set);

impl Set {
    /// Build a set from its elements.
    #[must_use]
    pub fn new(elements: BTreeSet<Value>) -> Self {
        Self(Node::new(elements))
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    /// `true` if the set has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.data.is_empty()
    }

    /// `true` if `element` is a member.
    #[must_use]
    pub fn contains(&self, element: &Value) -> bool {
        self.0.data.contains(element)
    }

    /// Elements in order.
    pub fn iter(&self) -> std::collections::btree_set::Iter<'_, Value> {
        self.0.data.iter()
    }

    /// Find the element that hashes to `hash` under `format`. Indexed like
    /// [`Map::find_by_hash`].
    #[must_use]
    pub fn find_by_hash(&self, format: Format, hash: &Hash) -> Option<&Value> {
        let element = self.0.keys.get_or_build(format, self.iter()).get(hash)?;
        self.0.data.get(element)
    }

    /// A new set with `element` added.
    #[must_use]
    pub fn insert(&self, element: Value) -> Self {
        let mut elements = self.0.data.clone();
        elements.insert(element);
        Self::new(elements)
    }

    /// A new set without `element`.
    #[must_use]
    pub fn remove(&self, element: &Value) -> Self {
        let mut elements = self.0.data.clone();
        elements.remove(element);
        Self::new(elements)
    }

    /// Content hash under `format`, computed once and cached.
    #[must_use]
    pub fn hash(&self, format: Format) -> Hash {
        self.0.hashes.get_or_compute(format, || {
            digest(format, ValueKind::Set, |h| {
                write_len(h, self.len());
                for element in self.iter() {
                    h.update(element.hash(format).as_bytes());
                }
            })
        })
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// ---------------------------------------------------------------------------
// Struct
// ---------------------------------------------------------------------------

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct StructData {
    name: String,
    fields: BTreeMap<String, Value>,
}

/// An immutable named record. Fields are kept sorted by name.
#[derive(Clone)]
pub struct Struct(Arc<Node<StructData>>);

composite_node!(Struct);

impl Struct {
    /// Build a struct from its name and fields.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self(Node::new(StructData {
            name: name.into(),
            fields,
        }))
    }

    /// The struct's type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.data.name
    }

    /// Value of field `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.data.fields.get(name)
    }

    /// Borrow all fields.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.0.data.fields
    }

    /// A new struct with field `name` set to `value`.
    #[must_use]
    pub fn with_field(&self, name: impl Into<String>, value: Value) -> Self {
        let mut fields = self.0.data.fields.clone();
        fields.insert(name.into(), value);
        Self::new(self.name(), fields)
    }

    /// A new struct without field `name`.
    #[must_use]
    pub fn without_field(&self, name: &str) -> Self {
        let mut fields = self.0.data.fields.clone();
        fields.remove(name);
        Self::new(self.name(), fields)
    }

    /// Content hash under `format`, computed once and cached.
    #[must_use]
    pub fn hash(&self, format: Format) -> Hash {
        self.0.hashes.get_or_compute(format, || {
            digest(format, ValueKind::Struct, |h| {
                write_bytes(h, self.name().as_bytes());
                write_len(h, self.fields().len());
                for (name, value) in self.fields() {
                    write_bytes(h, name.as_bytes());
                    h.update(value.hash(format).as_bytes());
                }
            })
        })
    }
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.name());
        for (name, value) in self.fields() {
            s.field(name, value);
        }
        s.finish()
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// An immutable, content-addressable value.
///
/// The derived `Ord` is the structural order: kind first (in [`ValueKind`]
/// declaration order), then content.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    /// The null value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A string.
    Str(Arc<str>),
    /// A reference to a stored value.
    Ref(Hash),
    /// A list node.
    List(List),
    /// A map node.
    Map(Map),
    /// A set node.
    Set(Set),
    /// A struct node.
    Struct(Struct),
}

impl Value {
    /// A string value.
    #[must_use]
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Self::Str(s.into())
    }

    /// A list value.
    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Self>) -> Self {
        Self::List(List::new(items.into_iter().collect()))
    }

    /// A map value. Later duplicates of a key replace earlier ones.
    #[must_use]
    pub fn map(entries: impl IntoIterator<Item = (Self, Self)>) -> Self {
        Self::Map(Map::new(entries.into_iter().collect()))
    }

    /// A set value.
    #[must_use]
    pub fn set(elements: impl IntoIterator<Item = Self>) -> Self {
        Self::Set(Set::new(elements.into_iter().collect()))
    }

    /// A struct value.
    #[must_use]
    pub fn structure<K: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (K, Self)>,
    ) -> Self {
        Self::Struct(Struct::new(
            name,
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// The value's kind.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Str(_) => ValueKind::Str,
            Self::Ref(_) => ValueKind::Ref,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
            Self::Set(_) => ValueKind::Set,
            Self::Struct(_) => ValueKind::Struct,
        }
    }

    /// `true` for null, bool, int, str and ref values.
    #[must_use]
    pub const fn is_primitive(&self) -> bool {
        self.kind().is_primitive()
    }

    /// The boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced hash, if this is a ref.
    #[must_use]
    pub const fn as_ref_target(&self) -> Option<Hash> {
        match self {
            Self::Ref(hash) => Some(*hash),
            _ => None,
        }
    }

    /// The list node, if this is one.
    #[must_use]
    pub const fn as_list(&self) -> Option<&List> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// The map node, if this is one.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The set node, if this is one.
    #[must_use]
    pub const fn as_set(&self) -> Option<&Set> {
        match self {
            Self::Set(set) => Some(set),
            _ => None,
        }
    }

    /// The struct node, if this is one.
    #[must_use]
    pub const fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Content hash of this value under `format`.
    ///
    /// Composite hashes are Merkle hashes over their children's hashes, so
    /// two subtrees with equal hashes are equal in their entirety.
    #[must_use]
    pub fn hash(&self, format: Format) -> Hash {
        match self {
            Self::Null => digest(format, ValueKind::Null, |_| {}),
            Self::Bool(b) => digest(format, ValueKind::Bool, |h| h.update([u8::from(*b)])),
            Self::Int(i) => digest(format, ValueKind::Int, |h| h.update(i.to_be_bytes())),
            Self::Str(s) => digest(format, ValueKind::Str, |h| write_bytes(h, s.as_bytes())),
            Self::Ref(target) => digest(format, ValueKind::Ref, |h| h.update(target.as_bytes())),
            Self::List(list) => list.hash(format),
            Self::Map(map) => map.hash(format),
            Self::Set(set) => set.hash(format),
            Self::Struct(s) => s.hash(format),
        }
    }

    /// `true` if both handles share the same composite node.
    #[must_use]
    pub fn same_node(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Set(a), Self::Set(b)) => a.ptr_eq(b),
            (Self::Struct(a), Self::Struct(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Format-aware equality.
    ///
    /// Primitives compare by value. Composites compare by content hash, which
    /// is O(1) once both hashes are cached.
    #[must_use]
    pub fn equals(&self, format: Format, other: &Self) -> bool {
        if self.kind() != other.kind() {
            return false;
        }
        if self.is_primitive() {
            return self == other;
        }
        self.same_node(other) || self.hash(format) == other.hash(format)
    }

    /// Format-aware three-way comparison.
    ///
    /// Primitives order by kind, then value. Any primitive sorts before any
    /// composite. Composites order by content hash bytes under `format`.
    #[must_use]
    pub fn compare(&self, format: Format, other: &Self) -> Ordering {
        match (self.is_primitive(), other.is_primitive()) {
            (true, true) => self.cmp(other),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                if self.same_node(other) {
                    Ordering::Equal
                } else {
                    self.hash(format).cmp(&other.hash(format))
                }
            }
        }
    }

    /// `true` if `self` sorts strictly before `other` under `format`.
    #[must_use]
    pub fn less(&self, format: Format, other: &Self) -> bool {
        self.compare(format, other) == Ordering::Less
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Hash> for Value {
    fn from(hash: Hash) -> Self {
        Self::Ref(hash)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Self::List(list)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl From<Set> for Value {
    fn from(set: Set) -> Self {
        Self::Set(set)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Self::Struct(s)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Ref(hash) => write!(f, "ref#{hash}"),
            Self::List(list) => list.fmt(f),
            Self::Map(map) => map.fmt(f),
            Self::Set(set) => set.fmt(f),
            Self::Struct(s) => s.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
