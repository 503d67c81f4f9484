//! Scalar literal values carried by value nodes in condition trees.
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Typed literal tagged with explicit type information so serialized
/// condition documents stay unambiguous.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal. Only finite values can be serialized.
    Float(#[serde(serialize_with = "serialize_finite")] f64),
    /// UTF-8 string literal. Vertex ids are always strings.
    String(String),
}

impl Value {
    /// Returns the string payload when the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Overwrites the value with a string, reusing the existing buffer when
    /// the value already holds one.
    pub fn set_string(&mut self, value: &str) {
        match self {
            Value::String(s) => {
                s.clear();
                s.push_str(value);
            }
            other => *other = Value::String(value.to_owned()),
        }
    }

    /// Whether the value has a JSON representation that reads back unchanged.
    pub fn is_serializable(&self) -> bool {
        match self {
            Value::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

fn serialize_finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(serde::ser::Error::custom(format!(
            "non-finite float literal {value} cannot be serialized"
        )));
    }
    serializer.serialize_f64(*value)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}
