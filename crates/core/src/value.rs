//! Field values
//!
//! This module defines:
//! - Value: the in-memory value of one document field
//! - Document: a document body, field name to value
//!
//! ## Value Model
//!
//! - Null, Bool, Int, Float, String, Timestamp, Array, Object
//!
//! ### Type Rules
//!
//! - No implicit type coercions: `Int(1) != Float(1.0)`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`
//! - `Timestamp` exists only in memory. On the wire it is an RFC 3339 string,
//!   so a document read back from JSON holds `String` where a `Timestamp`
//!   was written. The schema layer (`FieldDef::deserialize`) restores it.

use crate::contract::Timestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A document body: field name to value, in stable key order
pub type Document = BTreeMap<String, Value>;

/// Value of a single document field
///
/// Equality is derived: variants never compare equal across types and
/// floats follow IEEE-754 (`NaN != NaN`, `-0.0 == 0.0`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent or explicitly empty
    Null,
    /// `boolean` fields
    Bool(bool),
    /// `long` fields
    Int(i64),
    /// `double` fields
    Float(f64),
    /// `keyword` / `text` fields and join ids
    String(String),
    /// `date` fields, in memory only
    Timestamp(Timestamp),
    /// Multi-valued fields
    Array(Vec<Value>),
    /// Nested structures and mappings
    Object(BTreeMap<String, Value>),
}

macro_rules! copy_accessor {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> Option<$ty> {
            match self {
                Value::$variant(inner) => Some(*inner),
                _ => None,
            }
        }
    };
}

impl Value {
    /// Variant name, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Timestamp(_) => "Timestamp",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    /// `true` only for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    copy_accessor!(
        /// The flag of a `Bool`
        as_bool, Bool, bool
    );
    copy_accessor!(
        /// The number of an `Int` (no float truncation)
        as_int, Int, i64
    );
    copy_accessor!(
        /// The number of a `Float` (no int widening)
        as_float, Float, f64
    );
    copy_accessor!(
        /// The instant of a `Timestamp`
        as_timestamp, Timestamp, Timestamp
    );

    /// The text of a `String`
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(text) = self {
            Some(text.as_str())
        } else {
            None
        }
    }

    /// The members of an `Array`
    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(items) = self {
            Some(items.as_slice())
        } else {
            None
        }
    }

    /// The entries of an `Object`
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        if let Value::Object(entries) = self {
            Some(entries)
        } else {
            None
        }
    }

    /// Total order used for sorting search results.
    ///
    /// Types rank `Null < Bool < number < String/Timestamp < Array < Object`.
    /// Ints and floats compare numerically, NaN sorts last among numbers.
    /// Timestamps compare with strings through their RFC 3339 form, which
    /// is how a store holding the wire representation would order them.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::String(_) | Value::Timestamp(_) => 3,
                Value::Array(_) => 4,
                Value::Object(_) => 5,
            }
        }

        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => cmp_f64(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => cmp_f64(*a, *b as f64),
            (Value::Float(a), Value::Float(b)) => cmp_f64(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::String(b)) => a.to_rfc3339().as_str().cmp(b.as_str()),
            (Value::String(a), Value::Timestamp(b)) => a.as_str().cmp(b.to_rfc3339().as_str()),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => a.len().cmp(&b.len()),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Loose match used by term queries: exact equality, plus a timestamp
    /// matches its RFC 3339 string and an array matches any of its members.
    pub fn term_matches(&self, term: &Value) -> bool {
        match (self, term) {
            (Value::Array(items), _) if !matches!(term, Value::Array(_)) => {
                items.iter().any(|item| item.term_matches(term))
            }
            (Value::Timestamp(a), Value::String(b)) | (Value::String(b), Value::Timestamp(a)) => {
                Timestamp::parse_rfc3339(b) == Some(*a)
            }
            _ => self == term,
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

// ============================================================================
// Conversions into field values
// ============================================================================

macro_rules! wrap_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(inner: $ty) -> Self {
                    Value::$variant(inner.into())
                }
            }
        )*
    };
}

wrap_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    f64 => Float,
    String => String,
    &str => String,
    &String => String,
    Timestamp => Timestamp,
    Vec<Value> => Array,
    BTreeMap<String, Value> => Object,
}

impl From<u64> for Value {
    /// Counters above `i64::MAX` degrade to `Float` rather than wrap
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(small) => Value::Int(small),
            Err(_) => Value::Float(n as f64),
        }
    }
}

impl From<crate::contract::DocId> for Value {
    fn from(id: crate::contract::DocId) -> Self {
        Value::String(id.into_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(maybe: Option<T>) -> Self {
        maybe.map_or(Value::Null, Into::into)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

// ============================================================================
// JSON: the wire form of a document body
// ============================================================================

impl Value {
    /// Read a JSON value. Numbers outside `i64` become `Float`; date strings
    /// stay strings until a schema says otherwise.
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(flag) => Value::Bool(flag),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(text) => Value::String(text),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            Json::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, Value::from_json(item)))
                    .collect(),
            ),
        }
    }

    /// Write as JSON. Timestamps become RFC 3339 strings; non-finite floats,
    /// which JSON cannot carry, become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(flag) => Json::Bool(*flag),
            Value::Int(n) => Json::from(*n),
            Value::Float(x) => serde_json::Number::from_f64(*x).map_or(Json::Null, Json::Number),
            Value::String(text) => Json::String(text.clone()),
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, item)| (key.clone(), item.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(json)
    }
}

impl From<&Value> for Json {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Json::deserialize(deserializer).map(Value::from_json)
    }
}
