//! Descriptor language: `type`, `type@size`, `name:type@size` and `name:type@size:default`.
//! An empty name (`:type@size:default`) gives an anonymous field with a default.

use crate::{Error, Field, Primitive, Value};
use std::str::FromStr;

impl FromStr for Primitive {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Primitive::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownType(s.to_string()))
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| Error::MalformedDescriptor {
            descriptor: descriptor.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = descriptor.trim().splitn(3, ':');
        let first = parts.next().unwrap_or_default();
        let (name, ty, default) = match (parts.next(), parts.next()) {
            (None, _) => (None, first, None),
            (Some(ty), default) => {
                let name = first.trim();
                if !name.is_empty() && !is_identifier(name) {
                    return Err(malformed("name is not an identifier"));
                }
                ((!name.is_empty()).then_some(name), ty, default)
            }
        };

        let (ty, size) = match ty.trim().split_once('@') {
            Some((ty, size)) => {
                let size = size
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| malformed("size is not a number"))?;
                (ty, Some(size))
            }
            None => (ty, None),
        };
        let primitive: Primitive = ty.trim().parse()?;

        let mut field = match name {
            Some(name) => Field::named(name, primitive),
            None => Field::new(primitive),
        };
        if let Some(size) = size {
            field = field.with_size(size);
        }
        if let Some(default) = default {
            let value = parse_default(primitive, default).ok_or_else(|| Error::InvalidDefault {
                field: name.unwrap_or("value").to_string(),
                reason: format!("'{default}' is not a valid {}", primitive.name()),
            })?;
            field = field.with_default(value);
        }
        Ok(field)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Integers are decimal or `0x` hex, Bytes are hex, Strings are taken verbatim.
fn parse_default(primitive: Primitive, s: &str) -> Option<Value> {
    match primitive {
        Primitive::String => Some(Value::Str(s.to_string())),
        Primitive::Bytes => hex::decode(s.trim().trim_start_matches("0x"))
            .ok()
            .map(Value::Bytes),
        Primitive::UInt8 | Primitive::UInt16 | Primitive::UInt32 => {
            parse_integer(s).and_then(|v| u64::try_from(v).ok()).map(Value::UInt)
        }
        Primitive::Int8 | Primitive::Int16 | Primitive::Int32 => {
            parse_integer(s).and_then(|v| i64::try_from(v).ok()).map(Value::Int)
        }
    }
}

fn parse_integer(s: &str) -> Option<i128> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}
