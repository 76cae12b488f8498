//! Plain values exchanged with the query language.
//!
//! This is the non-decoded half of the query universe: what `to-plain`
//! produces, what format options are passed as, and what nested mappings or
//! sequences inside a scalar hold. Decoded nodes are bridged separately (see
//! [`crate::bridge`]).

use crate::bits::BufferRange;
use num_bigint::BigInt;
use std::collections::HashMap;

/// A plain query-language value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// Integers outside i64, and all bit positions surfaced by the bridge.
    BigInt(BigInt),
    Float(f64),
    Str(String),
    /// Plain byte sequence (distinct from `Str`; never UTF-8-interpreted).
    Bytes(Vec<u8>),
    /// Byte/bit-range handle; what byte-sequence scalars promote to.
    Range(BufferRange),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    /// Integer from a u64, preferring native width when it fits.
    pub fn from_u64(v: u64) -> Value {
        if v <= i64::MAX as u64 {
            Value::Int(v as i64)
        } else {
            Value::BigInt(BigInt::from(v))
        }
    }

    /// Bit position or length, always arbitrary-precision.
    pub fn big(v: u64) -> Value {
        Value::BigInt(BigInt::from(v))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(x) => (*x).try_into().ok(),
            Value::BigInt(x) => x.try_into().ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            Value::BigInt(x) => x.try_into().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&BufferRange> {
        match self {
            Value::Range(r) => Some(r),
            _ => None,
        }
    }

    /// Object member lookup; `Null` and non-objects have no members.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::from_u64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
