//! Field store: the in-memory view of a comment header.
//!
//! Keys are case-insensitive but case-preserving: the first casing used for
//! a key is the one written back to the file.  Every key maps to an ordered
//! list of values.
//!
//! ```
//! use oggcomment::FieldStore;
//!
//! let mut fields = FieldStore::new();
//! fields.add("Artist", "A");
//! fields.add("ARTIST", "B");
//! assert_eq!(fields.get("artist").unwrap(), &["A", "B"]);
//! assert_eq!(fields.field("artist").unwrap().key(), "Artist");
//! ```
//!
//! Iteration order is fixed: uppercased key, then value.  It does not depend
//! on the order fields were read or inserted, so re-encoding the same store
//! always produces the same bytes.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CommentError;

// ── Key rules ────────────────────────────────────────────────────────────────

/// True for bytes a key may not contain: controls, `=`, and `0x7E..=0xFF`.
pub fn is_forbidden_key_byte(byte: u8) -> bool {
    byte < 0x20 || byte == b'=' || byte >= 0x7E
}

/// Check a key before it is written.
pub fn validate_key(key: &str) -> Result<(), CommentError> {
    if key.is_empty() {
        return Err(CommentError::EmptyKey);
    }
    match key.bytes().find(|&b| is_forbidden_key_byte(b)) {
        Some(byte) => Err(CommentError::InvalidKey { key: key.to_owned(), byte }),
        None       => Ok(()),
    }
}

fn normalise(key: &str) -> String {
    key.to_ascii_uppercase()
}

// ── Values ───────────────────────────────────────────────────────────────────

/// One field value.
///
/// Values read from a file are always UTF-8.  Values built with
/// [`FieldValue::from_bytes`] may not be; they are rejected when the store is
/// encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldValue(Vec<u8>);

impl FieldValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().into_bytes())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    /// The value as text, or `None` if it is not UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn into_bytes(self) -> Vec<u8> { self.0 }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl PartialEq<str> for FieldValue {
    fn eq(&self, other: &str) -> bool { self.0 == other.as_bytes() }
}

impl PartialEq<&str> for FieldValue {
    fn eq(&self, other: &&str) -> bool { self.0 == other.as_bytes() }
}

impl PartialEq<String> for FieldValue {
    fn eq(&self, other: &String) -> bool { self.0 == other.as_bytes() }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self { Self::new(s) }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self { Self::new(s) }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(&self.0))
    }
}

// ── Coercion ─────────────────────────────────────────────────────────────────

/// A scalar that becomes a single value.
pub trait IntoFieldValue {
    fn into_field_value(self) -> FieldValue;
}

/// Anything accepted as the value side of [`FieldStore::set`] and
/// [`FieldStore::add`]: a scalar is one value, a sequence is several.
pub trait IntoFieldValues {
    fn into_field_values(self) -> Vec<FieldValue>;
}

macro_rules! scalar_values {
    ($($t:ty),* $(,)?) => {$(
        impl IntoFieldValue for $t {
            fn into_field_value(self) -> FieldValue { FieldValue::new(self.to_string()) }
        }
        impl IntoFieldValues for $t {
            fn into_field_values(self) -> Vec<FieldValue> { vec![self.into_field_value()] }
        }
    )*};
}

scalar_values!(
    &str, String, &String, char, bool,
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64,
);

impl IntoFieldValue for FieldValue {
    fn into_field_value(self) -> FieldValue { self }
}

impl IntoFieldValues for FieldValue {
    fn into_field_values(self) -> Vec<FieldValue> { vec![self] }
}

impl IntoFieldValue for &FieldValue {
    fn into_field_value(self) -> FieldValue { self.clone() }
}

impl IntoFieldValues for &FieldValue {
    fn into_field_values(self) -> Vec<FieldValue> { vec![self.clone()] }
}

impl<T: IntoFieldValue> IntoFieldValues for Vec<T> {
    fn into_field_values(self) -> Vec<FieldValue> {
        self.into_iter().map(IntoFieldValue::into_field_value).collect()
    }
}

impl<T: IntoFieldValue + Clone> IntoFieldValues for &[T] {
    fn into_field_values(self) -> Vec<FieldValue> {
        self.iter().cloned().map(IntoFieldValue::into_field_value).collect()
    }
}

impl<T: IntoFieldValue, const N: usize> IntoFieldValues for [T; N] {
    fn into_field_values(self) -> Vec<FieldValue> {
        self.into_iter().map(IntoFieldValue::into_field_value).collect()
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

/// A key with its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    key:    String,
    values: Vec<FieldValue>,
}

impl Field {
    /// The key in the casing it was first inserted with.
    pub fn key(&self) -> &str { &self.key }
    pub fn values(&self) -> &[FieldValue] { &self.values }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldStore {
    fields: BTreeMap<String, Field>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values stored under `key`, in insertion order.
    pub fn get(&self, key: impl fmt::Display) -> Option<&[FieldValue]> {
        self.field(key).map(Field::values)
    }

    pub fn field(&self, key: impl fmt::Display) -> Option<&Field> {
        self.fields.get(&normalise(&key.to_string()))
    }

    /// Replace every value of `key`.  An empty sequence removes the key.
    pub fn set(&mut self, key: impl fmt::Display, values: impl IntoFieldValues) {
        let key = key.to_string();
        let values = values.into_field_values();
        let norm = normalise(&key);
        if values.is_empty() {
            self.fields.remove(&norm);
            return;
        }
        match self.fields.entry(norm) {
            Entry::Occupied(mut e) => e.get_mut().values = values,
            Entry::Vacant(e)       => { e.insert(Field { key, values }); }
        }
    }

    /// Append to the values of `key`, creating it if needed.
    pub fn add(&mut self, key: impl fmt::Display, values: impl IntoFieldValues) {
        let key = key.to_string();
        let values = values.into_field_values();
        if values.is_empty() {
            return;
        }
        self.fields
            .entry(normalise(&key))
            .or_insert_with(|| Field { key, values: Vec::new() })
            .values
            .extend(values);
    }

    /// Remove `key`, returning its values.
    pub fn remove(&mut self, key: impl fmt::Display) -> Option<Vec<FieldValue>> {
        self.fields.remove(&normalise(&key.to_string())).map(|f| f.values)
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn contains_key(&self, key: impl fmt::Display) -> bool {
        self.fields.contains_key(&normalise(&key.to_string()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize { self.fields.len() }

    /// Number of key/value pairs, which is what the comment header counts.
    pub fn value_count(&self) -> usize {
        self.fields.values().map(|f| f.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Fields ordered by uppercased key.
    pub fn iter(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.values()
    }

    /// Every key/value pair, ordered by uppercased key then value.
    pub fn entries(&self) -> Vec<(&str, &FieldValue)> {
        let mut out = Vec::with_capacity(self.value_count());
        for field in self.fields.values() {
            let start = out.len();
            out.extend(field.values.iter().map(|v| (field.key.as_str(), v)));
            out[start..].sort_by(|a, b| a.1.cmp(b.1));
        }
        out
    }

    /// Set every field of `other` on this store, replacing same-named keys.
    pub fn merge(&mut self, other: FieldStore) {
        for field in other.fields.into_values() {
            self.set(field.key, field.values);
        }
    }
}

impl<K: fmt::Display, V: IntoFieldValues> FromIterator<(K, V)> for FieldStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut store = FieldStore::new();
        store.extend(iter);
        store
    }
}

impl<K: fmt::Display, V: IntoFieldValues> Extend<(K, V)> for FieldStore {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, values) in iter {
            self.add(key, values);
        }
    }
}

impl fmt::Display for FieldStore {
    /// `key: value1, value2`, one field per line, in [`entries`](FieldStore::entries) order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.values().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            let mut values: Vec<&FieldValue> = field.values.iter().collect();
            values.sort();
            write!(f, "{}: ", field.key)?;
            for (j, value) in values.into_iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{value}")?;
            }
        }
        Ok(())
    }
}

// ── serde ────────────────────────────────────────────────────────────────────

impl Serialize for FieldStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in self.fields.values() {
            map.serialize_entry(&field.key, &field.values)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl RawScalar {
    fn into_value(self) -> FieldValue {
        match self {
            RawScalar::Text(s)    => FieldValue::new(s),
            RawScalar::Integer(n) => n.into_field_value(),
            RawScalar::Float(x)   => x.into_field_value(),
            RawScalar::Bool(b)    => b.into_field_value(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValues {
    Many(Vec<RawScalar>),
    One(RawScalar),
}

impl<'de> Deserialize<'de> for FieldStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, RawValues>::deserialize(deserializer)?;
        let mut store = FieldStore::new();
        for (key, values) in raw {
            let values: Vec<FieldValue> = match values {
                RawValues::Many(list) => list.into_iter().map(RawScalar::into_value).collect(),
                RawValues::One(one)   => vec![one.into_value()],
            };
            store.add(key, values);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let mut s = FieldStore::new();
        s.add("A", "1");
        s.add("a", "2");
        assert_eq!(s.len(), 1);
        assert_eq!(s.get("A").unwrap(), s.get("a").unwrap());
        assert_eq!(s.get("a").unwrap(), &["1", "2"]);
        assert_eq!(s.field("a").unwrap().key(), "A");
    }

    #[test]
    fn set_keeps_first_casing_and_replaces_values() {
        let mut s = FieldStore::new();
        s.set("Title", "old");
        s.set("TITLE", ["new", "newer"]);
        let f = s.field("title").unwrap();
        assert_eq!(f.key(), "Title");
        assert_eq!(f.values(), &["new", "newer"]);

        s.set("title", Vec::<String>::new());
        assert!(!s.contains_key("title"));
    }

    #[test]
    fn scalars_are_coerced() {
        let mut s = FieldStore::new();
        s.set("tracknumber", 7);
        s.set("gain", 1.5);
        s.set("live", true);
        s.set(2024, 'x');
        s.add("list", vec![1u8, 2, 3]);
        s.add("slice", &["a", "b"][..]);
        assert_eq!(s.get("TRACKNUMBER").unwrap(), &["7"]);
        assert_eq!(s.get("gain").unwrap(), &["1.5"]);
        assert_eq!(s.get("live").unwrap(), &["true"]);
        assert_eq!(s.get("2024").unwrap(), &["x"]);
        assert_eq!(s.get("list").unwrap().len(), 3);
        assert_eq!(s.value_count(), 9);
    }

    #[test]
    fn entries_are_sorted_by_key_then_value() {
        let s: FieldStore = vec![
            ("title", "b"),
            ("ARTIST", "z"),
            ("Title", "a"),
            ("artist", "y"),
        ]
        .into_iter()
        .collect();

        let pairs: Vec<(String, String)> = s
            .entries()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("ARTIST".into(), "y".into()),
                ("ARTIST".into(), "z".into()),
                ("title".into(), "a".into()),
                ("title".into(), "b".into()),
            ]
        );
    }

    #[test]
    fn remove_and_clear() {
        let mut s: FieldStore = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(s.remove("B").unwrap(), vec![FieldValue::new("2")]);
        assert!(s.remove("b").is_none());
        s.clear();
        assert!(s.is_empty());
    }

    #[test]
    fn merge_replaces_matching_keys() {
        let mut a: FieldStore = [("artist", "x"), ("album", "y")].into_iter().collect();
        let b: FieldStore = [("ARTIST", "z")].into_iter().collect();
        a.merge(b);
        assert_eq!(a.get("artist").unwrap(), &["z"]);
        assert_eq!(a.field("artist").unwrap().key(), "artist");
        assert_eq!(a.get("album").unwrap(), &["y"]);
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("TITLE").is_ok());
        assert!(validate_key(" !\"}").is_ok());
        assert_eq!(validate_key(""), Err(CommentError::EmptyKey));
        for bad in ["A=B", "tab\there", "tilde~", "caf\u{e9}", "\u{7f}"] {
            assert!(matches!(validate_key(bad), Err(CommentError::InvalidKey { .. })), "{bad:?}");
        }
    }

    #[test]
    fn display_joins_values() {
        let mut s = FieldStore::new();
        s.add("title", "Silence");
        s.add("ARTIST", ["Two", "One"]);
        assert_eq!(s.to_string(), "ARTIST: One, Two\ntitle: Silence");
        assert_eq!(FieldStore::new().to_string(), "");
    }

    #[test]
    fn json_roundtrip() {
        let mut s = FieldStore::new();
        s.add("Artist", ["A", "B"]);
        s.add("date", "1999");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"Artist":["A","B"],"date":["1999"]}"#);
        let back: FieldStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn json_accepts_scalars() {
        let s: FieldStore = serde_json::from_str(r#"{"track": 3, "title": "x", "live": false}"#).unwrap();
        assert_eq!(s.get("track").unwrap(), &["3"]);
        assert_eq!(s.get("title").unwrap(), &["x"]);
        assert_eq!(s.get("live").unwrap(), &["false"]);
    }

    #[test]
    fn raw_bytes_display_lossily() {
        let v = FieldValue::from_bytes(vec![0x66, 0xFF]);
        assert!(v.as_str().is_none());
        assert_eq!(v.to_string(), "f\u{fffd}");
    }
}
