//! Type signatures: parsing and validation of bus type-tag strings.
//!
//! A signature such as `"ia{sv}(ss)"` is a sequence of complete types. Each
//! complete type is a basic tag (`y b n q i u x t d s o g h`), a variant
//! (`v`), an array (`a<T>`), a dictionary (`a{<basic><T>}`) or a struct
//! (`(<T>...)`).

use std::fmt;

use crate::{Error, Result};

const MAX_SIGNATURE_LEN: usize = 255;
const MAX_CONTAINER_DEPTH: usize = 32;

/// A single complete type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Signature,
    UnixFd,
    Variant,
    Array(Box<Type>),
    Dict(Box<Type>, Box<Type>),
    Struct(Vec<Type>),
}

impl Type {
    /// Basic types can be dictionary keys.
    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            Type::Variant | Type::Array(_) | Type::Dict(_, _) | Type::Struct(_)
        )
    }

    /// Check if the type is one of the integer tags.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::Byte
                | Type::Int16
                | Type::UInt16
                | Type::Int32
                | Type::UInt32
                | Type::Int64
                | Type::UInt64
        )
    }

    /// Parse exactly one complete type.
    pub fn parse(s: &str) -> Result<Type> {
        let signature = Signature::parse(s)?;
        match signature.types() {
            [single] => Ok(single.clone()),
            _ => Err(Error::BadSignature {
                signature: s.to_string(),
                message: "expected exactly one complete type".to_string(),
            }),
        }
    }

    fn write_tag(&self, out: &mut String) {
        match self {
            Type::Byte => out.push('y'),
            Type::Boolean => out.push('b'),
            Type::Int16 => out.push('n'),
            Type::UInt16 => out.push('q'),
            Type::Int32 => out.push('i'),
            Type::UInt32 => out.push('u'),
            Type::Int64 => out.push('x'),
            Type::UInt64 => out.push('t'),
            Type::Double => out.push('d'),
            Type::String => out.push('s'),
            Type::ObjectPath => out.push('o'),
            Type::Signature => out.push('g'),
            Type::UnixFd => out.push('h'),
            Type::Variant => out.push('v'),
            Type::Array(elem) => {
                out.push('a');
                elem.write_tag(out);
            }
            Type::Dict(key, value) => {
                out.push_str("a{");
                key.write_tag(out);
                value.write_tag(out);
                out.push('}');
            }
            Type::Struct(fields) => {
                out.push('(');
                for field in fields {
                    field.write_tag(out);
                }
                out.push(')');
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_tag(&mut out);
        f.write_str(&out)
    }
}

/// An ordered sequence of complete types, e.g. a method's input arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    types: Vec<Type>,
}

impl Signature {
    /// The empty signature.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a signature string.
    ///
    /// ```rust
    /// use busmock_core::{Signature, Type};
    ///
    /// let sig = Signature::parse("ia{sv}").unwrap();
    /// assert_eq!(sig.len(), 2);
    /// assert_eq!(sig.types()[0], Type::Int32);
    /// assert!(Signature::parse("z").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() > MAX_SIGNATURE_LEN {
            return Err(Error::BadSignature {
                signature: s.to_string(),
                message: format!("longer than {} characters", MAX_SIGNATURE_LEN),
            });
        }
        let mut parser = Parser {
            source: s,
            chars: s.chars().collect(),
            pos: 0,
        };
        let mut types = Vec::new();
        while !parser.at_end() {
            types.push(parser.complete_type(0, 0)?);
        }
        Ok(Signature { types })
    }

    pub fn from_types(types: Vec<Type>) -> Self {
        Signature { types }
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ty in &self.types {
            write!(f, "{}", ty)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Signature {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Signature::parse(s)
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::BadSignature {
            signature: self.source.to_string(),
            message: message.into(),
        }
    }

    fn next(&mut self) -> Result<char> {
        let c = self
            .chars
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error("unexpected end of signature"))?;
        self.pos += 1;
        Ok(c)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn complete_type(&mut self, arrays: usize, structs: usize) -> Result<Type> {
        let position = self.pos;
        let ty = match self.next()? {
            'y' => Type::Byte,
            'b' => Type::Boolean,
            'n' => Type::Int16,
            'q' => Type::UInt16,
            'i' => Type::Int32,
            'u' => Type::UInt32,
            'x' => Type::Int64,
            't' => Type::UInt64,
            'd' => Type::Double,
            's' => Type::String,
            'o' => Type::ObjectPath,
            'g' => Type::Signature,
            'h' => Type::UnixFd,
            'v' => Type::Variant,
            'a' => {
                if arrays >= MAX_CONTAINER_DEPTH {
                    return Err(self.error("arrays nested too deeply"));
                }
                if self.peek() == Some('{') {
                    self.pos += 1;
                    let key = self.complete_type(arrays + 1, structs)?;
                    if !key.is_basic() {
                        return Err(self.error(format!(
                            "dictionary key must be a basic type, got '{}'",
                            key
                        )));
                    }
                    let value = self.complete_type(arrays + 1, structs)?;
                    if self.next()? != '}' {
                        return Err(self.error("dictionary entry must have exactly two types"));
                    }
                    Type::Dict(Box::new(key), Box::new(value))
                } else {
                    Type::Array(Box::new(self.complete_type(arrays + 1, structs)?))
                }
            }
            '(' => {
                if structs >= MAX_CONTAINER_DEPTH {
                    return Err(self.error("structs nested too deeply"));
                }
                let mut fields = Vec::new();
                loop {
                    match self.peek() {
                        Some(')') => {
                            self.pos += 1;
                            break;
                        }
                        Some(_) => fields.push(self.complete_type(arrays, structs + 1)?),
                        None => return Err(self.error("unterminated struct")),
                    }
                }
                if fields.is_empty() {
                    return Err(self.error("empty struct"));
                }
                Type::Struct(fields)
            }
            '{' => return Err(self.error("dictionary entry outside of an array")),
            c => {
                return Err(self.error(format!(
                    "unknown type tag '{}' at position {}",
                    c, position
                )))
            }
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_basic_tags() {
        let sig = Signature::parse("ybnqiuxtdsogh").unwrap();
        assert_eq!(sig.len(), 13);
        assert!(sig.types().iter().all(Type::is_basic));
    }

    #[test]
    fn parse_containers() {
        let sig = Signature::parse("asa{sv}(is)aa{oa{sa{sv}}}").unwrap();
        assert_eq!(sig.len(), 4);
        assert_eq!(sig.types()[0], Type::Array(Box::new(Type::String)));
        assert_eq!(
            sig.types()[1],
            Type::Dict(Box::new(Type::String), Box::new(Type::Variant))
        );
        assert_eq!(
            sig.types()[2],
            Type::Struct(vec![Type::Int32, Type::String])
        );
    }

    #[test]
    fn empty_signature() {
        assert!(Signature::parse("").unwrap().is_empty());
        assert_eq!(Signature::empty().to_string(), "");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["z", "a", "a{", "a{vs}", "a{s}", "a{sss}", "()", "(i", "{sv}", "i)"] {
            let err = Signature::parse(bad).unwrap_err();
            assert!(
                matches!(err, Error::BadSignature { .. }),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn unknown_tag_reports_position() {
        let err = Signature::parse("iiz").unwrap_err();
        assert!(err.to_string().contains("unknown type tag 'z' at position 2"));
    }

    #[test]
    fn nesting_limit() {
        let deep = format!("{}i", "a".repeat(33));
        assert!(Signature::parse(&deep).is_err());
        let ok = format!("{}i", "a".repeat(32));
        assert!(Signature::parse(&ok).is_ok());
    }

    #[test]
    fn single_type_parse() {
        assert_eq!(Type::parse("b").unwrap(), Type::Boolean);
        assert!(Type::parse("bb").is_err());
        assert!(Type::parse("").is_err());
    }

    fn arb_type() -> impl Strategy<Value = Type> {
        let leaf = prop_oneof![
            Just(Type::Byte),
            Just(Type::Boolean),
            Just(Type::Int32),
            Just(Type::UInt64),
            Just(Type::Double),
            Just(Type::String),
            Just(Type::ObjectPath),
            Just(Type::Variant),
        ];
        leaf.prop_recursive(4, 24, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(|t| Type::Array(Box::new(t))),
                (
                    prop_oneof![Just(Type::String), Just(Type::UInt32)],
                    inner.clone()
                )
                    .prop_map(|(k, v)| Type::Dict(Box::new(k), Box::new(v))),
                prop::collection::vec(inner, 1..4).prop_map(Type::Struct),
            ]
        })
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(types in prop::collection::vec(arb_type(), 0..4)) {
            let sig = Signature::from_types(types);
            let text = sig.to_string();
            prop_assume!(text.len() <= 255);
            prop_assert_eq!(Signature::parse(&text).unwrap(), sig);
        }
    }
}
