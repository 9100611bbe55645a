//! The whitelist-only environment a behavior runs in.
//!
//! Exposed names: the safe core functions, per-call copies of the `math`,
//! `string` and `table` libraries, `args`, `mock`, `helpers` and the
//! evaluator's persistent `state` table. `os`, `io`, `debug`, `require`
//! and `load` are absent.

use busmock_core::{CallContext, MethodDef, MockHandle, Value};
use mlua::{Lua, Table};

use crate::convert::{args_table, from_lua, to_lua};

const SAFE_FUNCTIONS: &[&str] = &[
    "tostring",
    "tonumber",
    "type",
    "pairs",
    "ipairs",
    "next",
    "select",
    "error",
    "pcall",
    "xpcall",
    "assert",
    "rawget",
    "rawset",
    "rawlen",
    "rawequal",
    "setmetatable",
    "getmetatable",
];

const SAFE_LIBRARIES: &[&str] = &["math", "string", "table"];

/// Build the environment of one invocation.
pub fn build(lua: &Lua, ctx: &CallContext, state: Table) -> mlua::Result<Table> {
    let env = lua.create_table()?;
    let globals = lua.globals();
    for name in SAFE_FUNCTIONS {
        let value: mlua::Value = globals.get(*name)?;
        if !value.is_nil() {
            env.set(*name, value)?;
        }
    }
    // fresh copies, so a write to `math` stays inside this call
    for name in SAFE_LIBRARIES {
        if let Some(library) = globals.get::<Option<Table>>(*name)? {
            let copy = lua.create_table()?;
            for pair in library.pairs::<mlua::Value, mlua::Value>() {
                let (k, v) = pair?;
                copy.raw_set(k, v)?;
            }
            env.set(*name, copy)?;
        }
    }

    env.set("args", args_table(lua, &ctx.args)?)?;
    env.set("mock", mock_table(lua, &ctx.mock)?)?;
    env.set("helpers", helpers_table(lua)?)?;
    env.set("state", state)?;
    env.set("path", ctx.path.to_string())?;
    env.set("interface", ctx.interface.as_str())?;
    env.set("member", ctx.member.as_str())?;
    Ok(env)
}

fn external(err: busmock_core::Error) -> mlua::Error {
    mlua::Error::external(err)
}

fn value(v: mlua::Value) -> mlua::Result<Value> {
    Ok(from_lua(v)?.unwrap_or_else(|| Value::String(String::new())))
}

fn pairs(table: Option<Table>) -> mlua::Result<Vec<(String, Value)>> {
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for pair in table.pairs::<String, mlua::Value>() {
        let (k, v) = pair?;
        out.push((k, value(v)?));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn list(table: Option<Table>) -> mlua::Result<Vec<Value>> {
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    table
        .sequence_values::<mlua::Value>()
        .map(|v| value(v?))
        .collect()
}

/// Method definitions as `{ {name, in, out, code}, ... }`.
fn method_defs(mock: &MockHandle, table: Option<Table>) -> mlua::Result<Vec<MethodDef>> {
    let Some(table) = table else {
        return Ok(Vec::new());
    };
    let mut defs = Vec::new();
    for entry in table.sequence_values::<Table>() {
        let entry = entry?;
        let name: String = entry.get(1)?;
        let in_sig: String = entry.get(2)?;
        let out_sig: String = entry.get(3)?;
        let code: Option<String> = entry.get(4)?;
        let behavior = mock
            .server()
            .compile(&name, code.as_deref().unwrap_or_default())
            .map_err(external)?;
        defs.push(MethodDef::new(name, in_sig, out_sig, behavior));
    }
    Ok(defs)
}

fn mock_table(lua: &Lua, mock: &MockHandle) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("path", mock.path().to_string())?;

    let m = mock.clone();
    table.set(
        "get_property",
        lua.create_function(move |lua, (iface, name): (String, String)| {
            let v = m.get_property(&iface, &name).map_err(external)?;
            to_lua(lua, &v)
        })?,
    )?;

    let m = mock.clone();
    table.set(
        "set_property",
        lua.create_function(move |_, (iface, name, v): (String, String, mlua::Value)| {
            m.set_property(&iface, &name, value(v)?).map_err(external)
        })?,
    )?;

    let m = mock.clone();
    table.set(
        "update_properties",
        lua.create_function(move |_, (iface, props): (String, Option<Table>)| {
            m.update_properties(&iface, pairs(props)?).map_err(external)
        })?,
    )?;

    let m = mock.clone();
    table.set(
        "add_property",
        lua.create_function(move |_, (iface, name, v): (String, String, mlua::Value)| {
            m.add_property(&iface, &name, value(v)?).map_err(external)
        })?,
    )?;

    let m = mock.clone();
    table.set(
        "add_method",
        lua.create_function(
            move |_, (iface, name, in_sig, out_sig, code): (String, String, String, String, Option<String>)| {
                let behavior = m
                    .server()
                    .compile(&name, code.as_deref().unwrap_or_default())
                    .map_err(external)?;
                m.add_method(&iface, &name, &in_sig, &out_sig, behavior)
                    .map_err(external)
            },
        )?,
    )?;

    let m = mock.clone();
    table.set(
        "add_object",
        lua.create_function(
            move |_, (path, iface, props, methods): (String, String, Option<Table>, Option<Table>)| {
                let defs = method_defs(&m, methods)?;
                m.add_object(&path, &iface, pairs(props)?, defs)
                    .map(|_| ())
                    .map_err(external)
            },
        )?,
    )?;

    let m = mock.clone();
    table.set(
        "remove_object",
        lua.create_function(move |_, path: String| m.remove_object(&path).map_err(external))?,
    )?;

    let m = mock.clone();
    table.set(
        "emit_signal",
        lua.create_function(
            move |_, (iface, name, sig, args): (String, String, String, Option<Table>)| {
                m.emit_signal(&iface, &name, &sig, list(args)?)
                    .map_err(external)
            },
        )?,
    )?;

    let m = mock.clone();
    table.set(
        "objects",
        lua.create_function(move |_, ()| {
            Ok(m.objects().iter().map(ToString::to_string).collect::<Vec<_>>())
        })?,
    )?;

    Ok(table)
}

fn helpers_table(lua: &Lua) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set(
        "time",
        lua.create_function(|_, ()| Ok(busmock_core::Helpers.now()))?,
    )?;
    // raises immediately; the fault surfaces as the call's error reply
    table.set(
        "fault",
        lua.create_function(|_, (name, message): (String, Option<String>)| {
            Err::<(), _>(external(
                busmock_core::Helpers.fault(name, message.unwrap_or_default()),
            ))
        })?,
    )?;
    Ok(table)
}
