//! OVSDB value types.
//!
//! These are the decoded forms of the extended JSON encoding defined by
//! RFC 7047 section 5.1. Wire conversion lives in [`crate::codec`].

use crate::codec::{ValueCodec, ValueKind};
use crate::error::ValueError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Wire form of a [`Uuid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UuidKind {
    /// A server-assigned row identifier.
    Uuid,
    /// A client-chosen placeholder, valid within one transaction.
    NamedUuid,
}

impl UuidKind {
    /// Returns the wire tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            UuidKind::Uuid => "uuid",
            UuidKind::NamedUuid => "named-uuid",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "uuid" => Some(UuidKind::Uuid),
            "named-uuid" => Some(UuidKind::NamedUuid),
            _ => None,
        }
    }
}

/// A row identifier.
///
/// Equality and hashing are by string value only. Whether the value is sent
/// as `uuid` or `named-uuid` is derived from the string on every encode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(String);

impl Uuid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh named-uuid handle for use inside one transaction.
    pub fn named() -> Self {
        Self(format!("row{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn kind(&self) -> UuidKind {
        if is_canonical_uuid(&self.0) {
            UuidKind::Uuid
        } else {
            UuidKind::NamedUuid
        }
    }

    pub fn tag(&self) -> &'static str {
        self.kind().tag()
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uuid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Uuid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<uuid::Uuid> for Uuid {
    fn from(value: uuid::Uuid) -> Self {
        Self(value.hyphenated().to_string())
    }
}

/// Checks `^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$`.
pub fn is_canonical_uuid(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 36
        && bytes.iter().enumerate().all(|(i, &b)| match i {
            8 | 13 | 18 | 23 => b == b'-',
            _ => matches!(b, b'0'..=b'9' | b'a'..=b'f'),
        })
}

/// A decoded OVSDB datum.
#[derive(Debug, Clone, PartialEq)]
pub enum OvsdbValue {
    /// Any atom passed through unchanged (string, integer, real, boolean).
    Scalar(Value),
    Uuid(Uuid),
    Set(OvsdbSet),
    Map(OvsdbMap),
}

impl OvsdbValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            OvsdbValue::Scalar(_) => ValueKind::Scalar,
            OvsdbValue::Uuid(_) => ValueKind::Uuid,
            OvsdbValue::Set(_) => ValueKind::Set,
            OvsdbValue::Map(_) => ValueKind::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, OvsdbValue::Scalar(Value::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OvsdbValue::Scalar(v) => v.as_str(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OvsdbValue::Scalar(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OvsdbValue::Scalar(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OvsdbValue::Scalar(v) => v.as_bool(),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            OvsdbValue::Uuid(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&OvsdbSet> {
        match self {
            OvsdbValue::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&OvsdbMap> {
        match self {
            OvsdbValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for OvsdbValue {
    fn from(value: &str) -> Self {
        OvsdbValue::Scalar(Value::from(value))
    }
}

impl From<String> for OvsdbValue {
    fn from(value: String) -> Self {
        OvsdbValue::Scalar(Value::from(value))
    }
}

impl From<i64> for OvsdbValue {
    fn from(value: i64) -> Self {
        OvsdbValue::Scalar(Value::from(value))
    }
}

impl From<f64> for OvsdbValue {
    fn from(value: f64) -> Self {
        OvsdbValue::Scalar(Value::from(value))
    }
}

impl From<bool> for OvsdbValue {
    fn from(value: bool) -> Self {
        OvsdbValue::Scalar(Value::from(value))
    }
}

impl From<Uuid> for OvsdbValue {
    fn from(value: Uuid) -> Self {
        OvsdbValue::Uuid(value)
    }
}

impl From<OvsdbSet> for OvsdbValue {
    fn from(value: OvsdbSet) -> Self {
        OvsdbValue::Set(value)
    }
}

impl From<OvsdbMap> for OvsdbValue {
    fn from(value: OvsdbMap) -> Self {
        OvsdbValue::Map(value)
    }
}

/// An unordered collection of unique values.
///
/// Elements keep insertion order for iteration, but equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct OvsdbSet {
    elements: Vec<OvsdbValue>,
}

impl OvsdbSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(value: impl Into<OvsdbValue>) -> Self {
        Self {
            elements: vec![value.into()],
        }
    }

    /// Adds a value. Returns false if an equal value was already present.
    pub fn insert(&mut self, value: impl Into<OvsdbValue>) -> bool {
        let value = value.into();
        if self.elements.contains(&value) {
            return false;
        }
        self.elements.push(value);
        true
    }

    pub fn remove(&mut self, value: &OvsdbValue) -> bool {
        match self.elements.iter().position(|e| e == value) {
            Some(pos) => {
                self.elements.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, value: &OvsdbValue) -> bool {
        self.elements.contains(value)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OvsdbValue> {
        self.elements.iter()
    }

    /// Iterates over the uuid elements, skipping anything else.
    pub fn uuids(&self) -> impl Iterator<Item = &Uuid> {
        self.elements.iter().filter_map(OvsdbValue::as_uuid)
    }

    pub fn into_vec(self) -> Vec<OvsdbValue> {
        self.elements
    }
}

impl PartialEq for OvsdbSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.elements.iter().all(|e| other.contains(e))
    }
}

impl<V: Into<OvsdbValue>> FromIterator<V> for OvsdbSet {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let mut set = OvsdbSet::new();
        set.extend(iter);
        set
    }
}

impl<V: Into<OvsdbValue>> Extend<V> for OvsdbSet {
    fn extend<I: IntoIterator<Item = V>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'a> IntoIterator for &'a OvsdbSet {
    type Item = &'a OvsdbValue;
    type IntoIter = std::slice::Iter<'a, OvsdbValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// A mapping with unique keys and no ordering guarantee.
#[derive(Debug, Clone, Default)]
pub struct OvsdbMap {
    entries: Vec<(OvsdbValue, OvsdbValue)>,
}

impl OvsdbMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pair, returning the previous value for the key.
    pub fn insert(
        &mut self,
        key: impl Into<OvsdbValue>,
        value: impl Into<OvsdbValue>,
    ) -> Option<OvsdbValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &OvsdbValue) -> Option<&OvsdbValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up a string-keyed entry.
    pub fn get_str(&self, key: &str) -> Option<&OvsdbValue> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &OvsdbValue) -> Option<OvsdbValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OvsdbValue, &OvsdbValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &OvsdbValue> {
        self.entries.iter().map(|(k, _)| k)
    }

    /// Collects the string-to-string entries, as used by `external_ids`
    /// and `other_config` columns. Other entries are skipped.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
            .collect()
    }
}

impl PartialEq for OvsdbMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.entries.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<OvsdbValue>, V: Into<OvsdbValue>> FromIterator<(K, V)> for OvsdbMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OvsdbMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Comparison function of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Includes,
    Excludes,
}

impl Function {
    pub fn symbol(&self) -> &'static str {
        match self {
            Function::Equal => "==",
            Function::NotEqual => "!=",
            Function::LessThan => "<",
            Function::LessThanOrEqual => "<=",
            Function::GreaterThan => ">",
            Function::GreaterThanOrEqual => ">=",
            Function::Includes => "includes",
            Function::Excludes => "excludes",
        }
    }
}

impl FromStr for Function {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Function::Equal),
            "!=" => Ok(Function::NotEqual),
            "<" => Ok(Function::LessThan),
            "<=" => Ok(Function::LessThanOrEqual),
            ">" => Ok(Function::GreaterThan),
            ">=" => Ok(Function::GreaterThanOrEqual),
            "includes" => Ok(Function::Includes),
            "excludes" => Ok(Function::Excludes),
            other => Err(ValueError::UnknownFunction(other.to_string())),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A `where` clause term: `[column, function, value]` on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub function: Function,
    pub value: OvsdbValue,
}

impl Condition {
    pub fn new(column: impl Into<String>, function: Function, value: impl Into<OvsdbValue>) -> Self {
        Self {
            column: column.into(),
            function,
            value: value.into(),
        }
    }

    pub fn equal(column: impl Into<String>, value: impl Into<OvsdbValue>) -> Self {
        Self::new(column, Function::Equal, value)
    }

    pub fn includes(column: impl Into<String>, value: impl Into<OvsdbValue>) -> Self {
        Self::new(column, Function::Includes, value)
    }
}

// serde support goes through a default-configured codec so value types can
// be embedded directly in serde-derived structs.

impl Serialize for Uuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ValueCodec::default().encode_uuid(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Value::deserialize(deserializer)?;
        ValueCodec::default()
            .decode_uuid(&wire)
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for OvsdbValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ValueCodec::default().encode(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OvsdbValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Value::deserialize(deserializer)?;
        ValueCodec::default()
            .decode(&wire, ValueKind::Any)
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ValueCodec::default()
            .encode_condition(self)
            .serialize(serializer)
    }
}
