//! Conversion between engine values and Lua values.

use busmock_core::Value;
use mlua::{Lua, Table};

/// Tables nested deeper than this are rejected; it also stops cycles.
const MAX_DEPTH: usize = 32;

/// Convert an engine value into Lua.
///
/// Variants are unwrapped, arrays and structs become sequences and
/// dictionaries become keyed tables.
pub fn to_lua(lua: &Lua, value: &Value) -> mlua::Result<mlua::Value> {
    Ok(match value {
        Value::Bool(b) => mlua::Value::Boolean(*b),
        Value::Byte(v) => mlua::Value::Integer(i64::from(*v)),
        Value::Int16(v) => mlua::Value::Integer(i64::from(*v)),
        Value::UInt16(v) => mlua::Value::Integer(i64::from(*v)),
        Value::Int32(v) => mlua::Value::Integer(i64::from(*v)),
        Value::UInt32(v) | Value::UnixFd(v) => mlua::Value::Integer(i64::from(*v)),
        Value::Int64(v) => mlua::Value::Integer(*v),
        Value::UInt64(v) => match i64::try_from(*v) {
            Ok(v) => mlua::Value::Integer(v),
            Err(_) => mlua::Value::Number(*v as f64),
        },
        Value::Double(d) => mlua::Value::Number(*d),
        Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => {
            mlua::Value::String(lua.create_string(s)?)
        }
        Value::Variant(inner) => to_lua(lua, inner)?,
        Value::Array(items) | Value::Struct(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for item in items {
                table.raw_push(to_lua(lua, item)?)?;
            }
            mlua::Value::Table(table)
        }
        Value::Dict(entries) => {
            let table = lua.create_table_with_capacity(0, entries.len())?;
            for (k, v) in entries {
                table.raw_set(to_lua(lua, k)?, to_lua(lua, v)?)?;
            }
            mlua::Value::Table(table)
        }
    })
}

/// Build a 1-based argument sequence.
pub fn args_table(lua: &Lua, args: &[Value]) -> mlua::Result<Table> {
    let table = lua.create_table_with_capacity(args.len(), 0)?;
    for arg in args {
        table.raw_push(to_lua(lua, arg)?)?;
    }
    Ok(table)
}

/// Convert a Lua value into a loosely typed engine value.
///
/// `nil` maps to `None`. Floats with an exact integer value become
/// integers so they coerce to integral signatures. A table whose keys are
/// exactly `1..n` becomes an array; any other non-empty table becomes a
/// dictionary.
pub fn from_lua(value: mlua::Value) -> mlua::Result<Option<Value>> {
    convert(value, 0)
}

fn convert(value: mlua::Value, depth: usize) -> mlua::Result<Option<Value>> {
    if depth > MAX_DEPTH {
        return Err(mlua::Error::RuntimeError(format!(
            "table nesting exceeds {} levels",
            MAX_DEPTH
        )));
    }
    Ok(Some(match value {
        mlua::Value::Nil => return Ok(None),
        mlua::Value::Boolean(b) => Value::Bool(b),
        mlua::Value::Integer(i) => Value::Int64(i),
        mlua::Value::Number(n) => {
            if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
                Value::Int64(n as i64)
            } else {
                Value::Double(n)
            }
        }
        mlua::Value::String(s) => Value::String(s.to_string_lossy()),
        mlua::Value::Table(table) => table_value(table, depth)?,
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "cannot convert a Lua {} to a bus value",
                other.type_name()
            )))
        }
    }))
}

fn table_value(table: Table, depth: usize) -> mlua::Result<Value> {
    let len = table.raw_len();
    let mut entries = Vec::new();
    for pair in table.pairs::<mlua::Value, mlua::Value>() {
        let (k, v) = pair?;
        let key = convert(k, depth + 1)?;
        let value = convert(v, depth + 1)?;
        if let (Some(key), Some(value)) = (key, value) {
            entries.push((key, value));
        }
    }

    let is_sequence = entries.len() == len
        && entries
            .iter()
            .all(|(k, _)| matches!(k, Value::Int64(i) if *i >= 1 && *i as usize <= len));
    if is_sequence {
        entries.sort_by_key(|(k, _)| k.as_integer().unwrap_or_default());
        return Ok(Value::Array(entries.into_iter().map(|(_, v)| v).collect()));
    }
    Ok(Value::Dict(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(lua: &Lua, source: &str) -> Option<Value> {
        let value: mlua::Value = lua.load(source).eval().unwrap();
        from_lua(value).unwrap()
    }

    #[test]
    fn scalars() {
        let lua = Lua::new();
        assert_eq!(roundtrip(&lua, "return 1 + 2"), Some(Value::Int64(3)));
        assert_eq!(roundtrip(&lua, "return 6 / 2"), Some(Value::Int64(3)));
        assert_eq!(roundtrip(&lua, "return 0.5"), Some(Value::Double(0.5)));
        assert_eq!(roundtrip(&lua, "return 'hi'"), Some(Value::from("hi")));
        assert_eq!(roundtrip(&lua, "return nil"), None);
    }

    #[test]
    fn sequences_and_maps() {
        let lua = Lua::new();
        assert_eq!(
            roundtrip(&lua, "return {'a', 'b'}"),
            Some(Value::Array(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(roundtrip(&lua, "return {}"), Some(Value::Array(vec![])));
        assert_eq!(
            roundtrip(&lua, "return {Profile = 'balanced'}"),
            Some(Value::Dict(vec![(Value::from("Profile"), Value::from("balanced"))]))
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let lua = Lua::new();
        let value: mlua::Value = lua.load("local t = {}; t.self = t; return t").eval().unwrap();
        assert!(from_lua(value).is_err());
    }

    #[test]
    fn engine_values_reach_lua() {
        let lua = Lua::new();
        let dict = Value::string_dict([("Count", Value::UInt32(4))]);
        lua.globals().set("d", to_lua(&lua, &dict).unwrap()).unwrap();
        let count: i64 = lua.load("return d.Count").eval().unwrap();
        assert_eq!(count, 4);
    }
}
