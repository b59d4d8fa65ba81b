//! Typed values held in the keyspace.
//!
//! Every key maps to a tagged [`Value`]. Scalar variants double as list
//! elements. Ingested tokens are narrowed by [`Value::adapt`]: integer if the
//! token round-trips as an integer, else float if finite, else byte string.

use bytes::Bytes;

/// A typed value in the keyspace.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Byte string.
    Str(Bytes),

    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit float (always finite).
    Float(f64),

    /// Ordered, index-addressable sequence of scalar values.
    List(Vec<Value>),

    /// Unordered collection of scalar values.
    Set(Vec<Value>),

    /// Field/value mapping.
    Hash(Vec<(Bytes, Value)>),

    /// Score-ordered members.
    SortedSet(Vec<(Bytes, f64)>),
}

impl Value {
    /// Parse a textual token into the narrowest scalar that fully
    /// represents it.
    pub fn adapt(token: &[u8]) -> Value {
        if let Ok(text) = std::str::from_utf8(token) {
            if let Ok(n) = text.parse::<i64>() {
                return Value::Int(n);
            }
            if let Ok(f) = text.parse::<f64>() {
                if f.is_finite() {
                    return Value::Float(f);
                }
            }
        }
        Value::Str(Bytes::copy_from_slice(token))
    }

    /// Type tag used for classification and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
        }
    }

    /// Whether this value is a scalar (valid as a list element).
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Str(_) | Value::Int(_) | Value::Float(_))
    }

    /// Borrow as a list, if this value is one.
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Mutably borrow as a list, if this value is one.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Render a scalar for wire responses and equality matching.
    ///
    /// Aggregates render as their type tag; they never appear as list
    /// elements.
    pub fn render(&self) -> String {
        match self {
            Value::Str(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            other => other.type_name().to_string(),
        }
    }
}
