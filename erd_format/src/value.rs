use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

/// Dynamically typed value produced by [FormatSpec::deserialize](crate::FormatSpec::deserialize)
/// and consumed by [FormatSpec::serialize](crate::FormatSpec::serialize).
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    /// Any of UInt8, UInt16, UInt32
    UInt(u64),
    /// Any of Int8, Int16, Int32
    Int(i64),
    Bytes(Vec<u8>),
    /// ASCII string
    Str(String),
    /// Named fields of a struct format, field order comes from the format itself.
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Build a struct value from `(name, value)` pairs.
    pub fn record<K: Into<String>, I: IntoIterator<Item = (K, Value)>>(fields: I) -> Self {
        Value::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::UInt(_) => "unsigned integer",
            Value::Int(_) => "signed integer",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "string",
            Value::Struct(_) => "struct",
        }
    }

    /// Integer value widened to i128, for range checks against any primitive.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::UInt(v) => Some(*v as i128),
            Value::Int(v) => Some(*v as i128),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_integer().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b.as_slice()),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Field of a struct value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.get(field),
            _ => None,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}i"),
            Value::Bytes(b) => write!(f, "[{}]", hex::encode(b)),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Struct(fields) => f.debug_map().entries(fields.iter()).finish(),
        }
    }
}

macro_rules! from_uint {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::UInt(v as u64)
            }
        })*
    };
}

macro_rules! from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

from_uint!(u8, u16, u32, u64);
from_int!(i8, i16, i32, i64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::UInt(v as u64)
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

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}
