//! Runtime values and their coercion rules
//!
//! Every variable, literal and action result is a [`Value`]. `Nil` and the
//! empty string are the same "absent" value for string conversion, equality
//! and ordering.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::common::{Error, Result};

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Opaque bytes, e.g. an HTTP response body
    Bytes(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Bytes(_) => "bytes",
        }
    }

    /// True for `Nil` and the empty string
    pub fn is_absent(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// String form of a scalar; absent values become `""`
    pub fn coerce_string(&self) -> Result<String> {
        match self {
            Value::Nil => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(Error::coercion("string", other.type_name())),
        }
    }

    /// Integer form; strings are parsed as base-10 signed integers
    pub fn coerce_int(&self) -> Result<i64> {
        match self {
            v if v.is_absent() => Ok(0),
            Value::Int(i) => Ok(*i),
            Value::String(s) => s
                .parse::<i64>()
                .map_err(|_| Error::coercion("int", "string")),
            other => Err(Error::coercion("int", other.type_name())),
        }
    }

    /// Boolean form; only the exact strings `"true"` and `"false"` convert
    pub fn coerce_bool(&self) -> Result<bool> {
        match self {
            v if v.is_absent() => Ok(false),
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            other => Err(Error::coercion("bool", other.type_name())),
        }
    }

    /// Equality with coercion
    ///
    /// An integer on either side parses the other side as an integer, a
    /// boolean parses it strictly as `"true"`/`"false"`, and strings compare
    /// by string form. A failed coercion means "not equal", never an error.
    /// The relation is symmetric.
    pub fn loose_equal(&self, other: &Value) -> bool {
        if self.is_absent() || other.is_absent() {
            return self.is_absent() && other.is_absent();
        }

        match (self, other) {
            (Value::Int(l), r) | (r, Value::Int(l)) if !matches!(r, Value::Bool(_)) => {
                r.coerce_int().is_ok_and(|r| *l == r)
            }
            (Value::Bool(l), r) | (r, Value::Bool(l)) if !matches!(r, Value::Int(_)) => {
                r.coerce_bool().is_ok_and(|r| *l == r)
            }
            (Value::String(l), r) | (r, Value::String(l)) => {
                r.coerce_string().is_ok_and(|r| *l == r)
            }
            (l, r) => l == r,
        }
    }

    /// Ordering with the same coercions as [`Value::loose_equal`]
    ///
    /// Absent values order before everything else and equal each other.
    /// Failed coercions and incompatible types are errors.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self.is_absent(), other.is_absent()) {
            (true, true) => return Ok(Ordering::Equal),
            (true, false) => return Ok(Ordering::Less),
            (false, true) => return Ok(Ordering::Greater),
            (false, false) => {}
        }

        match (self, other) {
            (Value::Int(l), Value::Int(r)) => Ok(l.cmp(r)),
            (Value::Int(l), Value::String(_)) => Ok(l.cmp(&other.coerce_int()?)),
            (Value::String(_), Value::Int(r)) => Ok(self.coerce_int()?.cmp(r)),
            (Value::Bool(l), Value::Bool(r)) => Ok(l.cmp(r)),
            (Value::Bool(l), Value::String(_)) => Ok(l.cmp(&other.coerce_bool()?)),
            (Value::String(_), Value::Bool(r)) => Ok(self.coerce_bool()?.cmp(r)),
            (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
            (l, r) => Err(Error::Incomparable {
                left: l.type_name().to_string(),
                right: r.type_name().to_string(),
            }),
        }
    }

    /// Field or element extraction for selector and index expressions
    ///
    /// Maps are looked up by key, falling back to a case-insensitive match;
    /// lists by integer position. Anything else yields `Nil`.
    pub fn extract(&self, key: &Value) -> Value {
        match self {
            Value::Map(map) => {
                let Ok(key) = key.coerce_string() else {
                    return Value::Nil;
                };
                if let Some(v) = map.get(&key) {
                    return v.clone();
                }
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&key))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default()
            }
            Value::List(items) => key
                .coerce_int()
                .ok()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
            _ => Value::Nil,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::String(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(v: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;
        match v {
            Yaml::Null => Value::Nil,
            Yaml::Bool(b) => Value::Bool(b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::String(n.to_string()),
            },
            Yaml::String(s) => Value::String(s),
            Yaml::Sequence(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Yaml::Mapping(map) => Value::Map(
                map.into_iter()
                    .filter_map(|(k, v)| {
                        let key = Value::from(k).coerce_string().ok()?;
                        Some((key, Value::from(v)))
                    })
                    .collect(),
            ),
            Yaml::Tagged(tagged) => Value::from(tagged.value),
        }
    }
}
