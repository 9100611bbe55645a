//! The Value type - a dynamically typed bus value.
//!
//! Values arriving from JSON or behavior code are loosely typed (integers
//! come in as 64-bit, object paths as plain strings). [`Value::coerce`]
//! converts them to the exact shape a signature demands, the way a bus
//! library converts native values when marshalling a message.

use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::path::ObjectPath;
use crate::signature::{Signature, Type};

/// A bus value.
///
/// # Design Notes
///
/// - Dictionaries keep insertion order as a list of pairs; keys are basic
///   values and `f64` rules out a total order.
/// - `Variant` boxes one value whose own type travels with it.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(u8),
    Bool(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    ObjectPath(String),
    Signature(String),
    UnixFd(u32),
    Variant(Box<Value>),
    Array(Vec<Value>),
    Struct(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl Value {
    /// Wrap a value into a variant.
    pub fn variant(value: impl Into<Value>) -> Self {
        Value::Variant(Box::new(value.into()))
    }

    /// Build a `a{sv}`-shaped dictionary from string keys.
    pub fn string_dict<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.into()), Value::variant(v)))
                .collect(),
        )
    }

    /// The zero value of a type: `false`, `0`, `""`, `/`, empty containers.
    pub fn zero(ty: &Type) -> Self {
        match ty {
            Type::Byte => Value::Byte(0),
            Type::Boolean => Value::Bool(false),
            Type::Int16 => Value::Int16(0),
            Type::UInt16 => Value::UInt16(0),
            Type::Int32 => Value::Int32(0),
            Type::UInt32 => Value::UInt32(0),
            Type::Int64 => Value::Int64(0),
            Type::UInt64 => Value::UInt64(0),
            Type::Double => Value::Double(0.0),
            Type::String => Value::String(String::new()),
            Type::ObjectPath => Value::ObjectPath("/".to_string()),
            Type::Signature => Value::Signature(String::new()),
            Type::UnixFd => Value::UnixFd(0),
            Type::Variant => Value::variant(Value::String(String::new())),
            Type::Array(_) => Value::Array(Vec::new()),
            Type::Dict(_, _) => Value::Dict(Vec::new()),
            Type::Struct(fields) => Value::Struct(fields.iter().map(Value::zero).collect()),
        }
    }

    /// Guess the natural type of a value.
    ///
    /// Empty arrays guess `av` and empty dictionaries `a{sv}`.
    pub fn guess_type(&self) -> Type {
        match self {
            Value::Byte(_) => Type::Byte,
            Value::Bool(_) => Type::Boolean,
            Value::Int16(_) => Type::Int16,
            Value::UInt16(_) => Type::UInt16,
            Value::Int32(_) => Type::Int32,
            Value::UInt32(_) => Type::UInt32,
            Value::Int64(_) => Type::Int64,
            Value::UInt64(_) => Type::UInt64,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::ObjectPath(_) => Type::ObjectPath,
            Value::Signature(_) => Type::Signature,
            Value::UnixFd(_) => Type::UnixFd,
            Value::Variant(_) => Type::Variant,
            Value::Array(items) => Type::Array(Box::new(
                items.first().map_or(Type::Variant, Value::guess_type),
            )),
            Value::Struct(fields) => Type::Struct(fields.iter().map(Value::guess_type).collect()),
            Value::Dict(entries) => match entries.first() {
                Some((k, v)) if k.guess_type().is_basic() => {
                    Type::Dict(Box::new(k.guess_type()), Box::new(v.guess_type()))
                }
                _ => Type::Dict(Box::new(Type::String), Box::new(Type::Variant)),
            },
        }
    }

    /// Strip any number of variant wrappers.
    pub fn unwrap_variant(&self) -> &Value {
        let mut current = self;
        while let Value::Variant(inner) = current {
            current = inner;
        }
        current
    }

    /// Borrow as a string if this is any string-like value.
    pub fn as_str(&self) -> Option<&str> {
        match self.unwrap_variant() {
            Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.unwrap_variant() {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer value widened to `i128`.
    pub fn as_integer(&self) -> Option<i128> {
        match self.unwrap_variant() {
            Value::Byte(v) => Some(i128::from(*v)),
            Value::Int16(v) => Some(i128::from(*v)),
            Value::UInt16(v) => Some(i128::from(*v)),
            Value::Int32(v) => Some(i128::from(*v)),
            Value::UInt32(v) => Some(i128::from(*v)),
            Value::Int64(v) => Some(i128::from(*v)),
            Value::UInt64(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.unwrap_variant() {
            Value::Double(d) => Some(*d),
            other => other.as_integer().map(|i| i as f64),
        }
    }

    /// Elements of an array or struct.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self.unwrap_variant() {
            Value::Array(items) | Value::Struct(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Value, Value)]> {
        match self.unwrap_variant() {
            Value::Dict(entries) => Some(entries),
            Value::Array(items) if items.is_empty() => Some(&[]),
            _ => None,
        }
    }

    /// Look up a string key in a dictionary.
    pub fn dict_get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    /// Convert this value to the exact shape of `ty`.
    ///
    /// Integers narrow with range checks, integers widen to doubles,
    /// strings become object paths or signatures when valid, arrays of
    /// matching length become structs, and anything becomes a variant.
    ///
    /// # Errors
    ///
    /// Returns a description of the first mismatch found.
    pub fn coerce(self, ty: &Type) -> Result<Value, String> {
        let mismatch = |value: &Value| format!("expected '{}', got {}", ty, value.describe());

        if let Type::Variant = ty {
            return Ok(match self {
                Value::Variant(_) => self,
                other => Value::Variant(Box::new(other)),
            });
        }

        // A variant carries its own type; unwrap it for every concrete target.
        let value = match self {
            Value::Variant(inner) => *inner,
            other => other,
        };

        if ty.is_integer() || *ty == Type::UnixFd {
            let Some(n) = value.as_integer() else {
                return Err(mismatch(&value));
            };
            let out_of_range = || format!("value {} out of range for '{}'", n, ty);
            return match ty {
                Type::Byte => u8::try_from(n).map(Value::Byte).map_err(|_| out_of_range()),
                Type::Int16 => i16::try_from(n).map(Value::Int16).map_err(|_| out_of_range()),
                Type::UInt16 => u16::try_from(n).map(Value::UInt16).map_err(|_| out_of_range()),
                Type::Int32 => i32::try_from(n).map(Value::Int32).map_err(|_| out_of_range()),
                Type::UInt32 => u32::try_from(n).map(Value::UInt32).map_err(|_| out_of_range()),
                Type::Int64 => i64::try_from(n).map(Value::Int64).map_err(|_| out_of_range()),
                Type::UInt64 => u64::try_from(n).map(Value::UInt64).map_err(|_| out_of_range()),
                _ => u32::try_from(n).map(Value::UnixFd).map_err(|_| out_of_range()),
            };
        }

        match ty {
            Type::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(mismatch(&other)),
            },
            Type::Double => match value.as_f64() {
                Some(d) => Ok(Value::Double(d)),
                None => Err(mismatch(&value)),
            },
            Type::String => match value {
                Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => {
                    Ok(Value::String(s))
                }
                other => Err(mismatch(&other)),
            },
            Type::ObjectPath => match value {
                Value::String(s) | Value::ObjectPath(s) => ObjectPath::parse(&s)
                    .map(|_| Value::ObjectPath(s))
                    .map_err(|e| e.to_string()),
                other => Err(mismatch(&other)),
            },
            Type::Signature => match value {
                Value::String(s) | Value::Signature(s) => Signature::parse(&s)
                    .map(|_| Value::Signature(s))
                    .map_err(|e| e.to_string()),
                other => Err(mismatch(&other)),
            },
            Type::Array(elem) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| item.coerce(elem))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                Value::Dict(entries) if entries.is_empty() => Ok(Value::Array(Vec::new())),
                other => Err(mismatch(&other)),
            },
            Type::Dict(key_ty, value_ty) => match value {
                Value::Dict(entries) => entries
                    .into_iter()
                    .map(|(k, v)| Ok((k.coerce(key_ty)?, v.coerce(value_ty)?)))
                    .collect::<Result<Vec<_>, String>>()
                    .map(Value::Dict),
                Value::Array(items) if items.is_empty() => Ok(Value::Dict(Vec::new())),
                other => Err(mismatch(&other)),
            },
            Type::Struct(fields) => match value {
                Value::Struct(items) | Value::Array(items) if items.len() == fields.len() => {
                    items
                        .into_iter()
                        .zip(fields)
                        .map(|(item, field)| item.coerce(field))
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::Struct)
                }
                other => Err(mismatch(&other)),
            },
            _ => Err(mismatch(&value)),
        }
    }

    /// Coerce an argument tuple against a signature, checking arity first.
    pub fn coerce_all(values: Vec<Value>, signature: &Signature) -> Result<Vec<Value>, String> {
        if values.len() != signature.len() {
            return Err(format!(
                "signature '{}' expects {} argument(s), got {}",
                signature,
                signature.len(),
                values.len()
            ));
        }
        values
            .into_iter()
            .zip(signature.types())
            .enumerate()
            .map(|(i, (value, ty))| {
                value
                    .coerce(ty)
                    .map_err(|message| format!("argument {}: {}", i + 1, message))
            })
            .collect()
    }

    fn describe(&self) -> String {
        format!("{} ({})", self, self.guess_type())
    }

    /// Build a loosely typed value from JSON.
    ///
    /// Integers become `Int64` (or `UInt64` above `i64::MAX`), objects
    /// become string-keyed dictionaries and `null` becomes an empty string
    /// variant.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::variant(Value::String(String::new())),
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt64(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Dict(
                map.iter()
                    .map(|(k, v)| (Value::String(k.clone()), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as JSON; dictionary keys are stringified.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Format an argument tuple the way the call log prints it: a leading
/// space, then each argument separated by spaces.
pub fn format_args(args: &[Value]) -> String {
    args.iter().map(|a| format!(" {}", a)).collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::UnixFd(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{:?}", v),
            Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => {
                write!(f, "\"{}\"", s)
            }
            Value::Variant(inner) => write!(f, "{}", inner),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Struct(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Byte(v) => serializer.serialize_u8(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int16(v) => serializer.serialize_i16(*v),
            Value::UInt16(v) => serializer.serialize_u16(*v),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::UInt32(v) => serializer.serialize_u32(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::UInt64(v) => serializer.serialize_u64(*v),
            Value::UnixFd(v) => serializer.serialize_u32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => {
                serializer.serialize_str(s)
            }
            Value::Variant(inner) => inner.serialize(serializer),
            Value::Array(items) | Value::Struct(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    match k.unwrap_variant().as_str() {
                        Some(s) => map.serialize_entry(s, v)?,
                        None => map.serialize_entry(&k.to_string(), v)?,
                    }
                }
                map.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&ObjectPath> for Value {
    fn from(v: &ObjectPath) -> Self {
        Value::ObjectPath(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}
