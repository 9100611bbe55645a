//! Call routing and the `org.freedesktop.DBus.Mock` control interface.
//!
//! Every object implicitly serves the control interface, the standard
//! Properties and Introspectable interfaces and, on the manager root,
//! ObjectManager. Anything else is a mocked method.

use std::vec;

use tracing::debug;

use crate::names::{INTROSPECTABLE_IFACE, MOCK_IFACE, OBJECT_MANAGER_IFACE, PROPERTIES_IFACE};
use crate::notify::snapshot_value;
use crate::object::PropertyAccess;
use crate::path::ObjectPath;
use crate::signature::Signature;
use crate::state::{MethodDef, ServerState};
use crate::template::Parameters;
use crate::value::{format_args, Value};
use crate::{Error, Result};

/// Control methods as (name, in signature, out signature).
pub const CONTROL_METHODS: &[(&str, &str, &str)] = &[
    ("AddMethod", "sssss", ""),
    ("AddMethods", "sa(ssss)", ""),
    ("AddObject", "ssa{sv}a(ssss)", ""),
    ("AddProperties", "sa{sv}", ""),
    ("AddProperty", "sssv", ""),
    ("AddSignal", "sss", ""),
    ("AddTemplate", "sa{sv}", ""),
    ("ClearCalls", "", ""),
    ("EmitSignal", "sssav", ""),
    ("EmitSignalDetailed", "sssava{sv}", ""),
    ("GetCalls", "", "a(tsav)"),
    ("GetMethodCalls", "s", "a(tav)"),
    ("RemoveObject", "s", ""),
    ("Reset", "", ""),
    ("UpdateProperties", "sa{sv}", ""),
];

/// Control signals as (name, signature).
pub const CONTROL_SIGNALS: &[(&str, &str)] = &[("MethodCalled", "sav")];

fn control_signature(member: &str) -> Option<&'static str> {
    CONTROL_METHODS
        .iter()
        .find(|(name, _, _)| *name == member)
        .map(|(_, in_sig, _)| *in_sig)
}

pub(crate) fn dispatch(
    server: &ServerState,
    path: &ObjectPath,
    interface: &str,
    member: &str,
    args: Vec<Value>,
) -> Result<Vec<Value>> {
    match interface {
        PROPERTIES_IFACE => properties(server, path, member, args),
        INTROSPECTABLE_IFACE if member == "Introspect" => {
            decode("", args)?;
            Ok(vec![Value::String(server.introspect(path)?)])
        }
        OBJECT_MANAGER_IFACE
            if member == "GetManagedObjects"
                && server.contains(path)
                && !server.has_method(path, interface, member)
                && server.object_manager_root().as_ref() == Some(path) =>
        {
            decode("", args)?;
            Ok(vec![managed_objects_value(server)])
        }
        // template-provided control methods are ordinary mocked methods and
        // shadow built-in ones of the same name
        MOCK_IFACE => match control_signature(member) {
            Some(in_sig) if !server.has_method(path, interface, member) => {
                control(server, path, member, in_sig, args)
            }
            _ => server.invoke(path, interface, member, args),
        },
        _ => server.invoke(path, interface, member, args),
    }
}

/// Coerced arguments, consumed front to back.
struct Args(vec::IntoIter<Value>);

impl Args {
    fn value(&mut self) -> Value {
        self.0
            .next()
            .map(unvariant)
            .unwrap_or_else(|| Value::String(String::new()))
    }

    fn string(&mut self) -> String {
        match self.value() {
            Value::String(s) | Value::ObjectPath(s) | Value::Signature(s) => s,
            _ => String::new(),
        }
    }

    fn list(&mut self) -> Vec<Value> {
        match self.value() {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }

    fn pairs(&mut self) -> Vec<(String, Value)> {
        match self.value() {
            Value::Dict(entries) => entries
                .into_iter()
                .map(|(k, v)| (k.as_str().unwrap_or_default().to_string(), unvariant(v)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn unvariant(value: Value) -> Value {
    match value {
        Value::Variant(inner) => unvariant(*inner),
        other => other,
    }
}

fn decode(in_sig: &str, args: Vec<Value>) -> Result<Args> {
    let signature = Signature::parse(in_sig)?;
    Value::coerce_all(args, &signature)
        .map(|values| Args(values.into_iter()))
        .map_err(Error::ArgumentMismatch)
}

fn properties(
    server: &ServerState,
    path: &ObjectPath,
    member: &str,
    args: Vec<Value>,
) -> Result<Vec<Value>> {
    match member {
        "Get" => {
            let mut args = decode("ss", args)?;
            let (interface, name) = (args.string(), args.string());
            let value = server.get_property(path, &interface, &name)?;
            Ok(vec![Value::variant(value)])
        }
        "GetAll" => {
            let mut args = decode("s", args)?;
            let all = server.get_all(path, &args.string())?;
            Ok(vec![Value::string_dict(all)])
        }
        "Set" => {
            let mut args = decode("ssv", args)?;
            let (interface, name, value) = (args.string(), args.string(), args.value());
            server.set_property(path, &interface, &name, value, true)?;
            Ok(vec![])
        }
        _ => Err(Error::UnknownMethod {
            interface: PROPERTIES_IFACE.to_string(),
            member: member.to_string(),
        }),
    }
}

fn method_defs(server: &ServerState, list: Vec<Value>) -> Result<Vec<MethodDef>> {
    list.into_iter()
        .map(|entry| {
            let fields = match entry {
                Value::Struct(fields) => fields,
                _ => Vec::new(),
            };
            let mut fields = Args(fields.into_iter());
            let (name, in_sig, out_sig, code) =
                (fields.string(), fields.string(), fields.string(), fields.string());
            let behavior = server.compile(&name, &code)?;
            Ok(MethodDef::new(name, in_sig, out_sig, behavior))
        })
        .collect()
}

fn control(
    server: &ServerState,
    path: &ObjectPath,
    member: &str,
    in_sig: &str,
    args: Vec<Value>,
) -> Result<Vec<Value>> {
    debug!("{} {}{}", path, member, format_args(&args));

    // three-argument form (interface, name, value) guesses the type
    let in_sig = if member == "AddProperty" && args.len() == 3 {
        "ssv"
    } else {
        in_sig
    };
    let mut args = decode(in_sig, args)?;

    match member {
        "AddMethod" => {
            let (interface, name, in_sig, out_sig, code) = (
                args.string(),
                args.string(),
                args.string(),
                args.string(),
                args.string(),
            );
            let behavior = server.compile(&name, &code)?;
            server.add_method(path, &interface, &name, &in_sig, &out_sig, behavior)?;
        }
        "AddMethods" => {
            let interface = args.string();
            let methods = method_defs(server, args.list())?;
            server.add_methods(path, &interface, methods)?;
        }
        "AddObject" => {
            let (target, interface) = (ObjectPath::parse(&args.string())?, args.string());
            let properties = args.pairs();
            let methods = method_defs(server, args.list())?;
            server.add_object(&target, &interface, properties, methods)?;
        }
        "AddProperties" => {
            let interface = args.string();
            server.add_properties(path, &interface, args.pairs())?;
        }
        "AddProperty" => {
            let (interface, name) = (args.string(), args.string());
            let signature = if in_sig == "ssv" {
                String::new()
            } else {
                args.string()
            };
            let value = args.value();
            server.add_property(
                path,
                &interface,
                &name,
                &signature,
                value,
                PropertyAccess::ReadWrite,
            )?;
        }
        "AddSignal" => {
            let (interface, name, signature) = (args.string(), args.string(), args.string());
            server.add_signal(path, &interface, &name, &signature)?;
        }
        "AddTemplate" => {
            let template = args.string();
            let parameters: Parameters = args.pairs().into_iter().collect();
            server.add_template(path, &template, parameters)?;
        }
        "ClearCalls" => server.clear_calls(),
        "EmitSignal" => {
            let (interface, name, signature) = (args.string(), args.string(), args.string());
            server.emit_signal(path, &interface, &name, &signature, args.list())?;
        }
        "EmitSignalDetailed" => {
            let (interface, name, signature) = (args.string(), args.string(), args.string());
            let signal_args = args.list();
            let mut destination = None;
            let mut source = path.clone();
            for (key, value) in args.pairs() {
                match (key.as_str(), value.as_str()) {
                    ("destination", Some(d)) => destination = Some(d.to_string()),
                    ("path", Some(p)) => source = ObjectPath::parse(p)?,
                    _ => {}
                }
            }
            server.emit_signal_detailed(
                &source,
                &interface,
                &name,
                &signature,
                signal_args,
                destination,
            )?;
        }
        "GetCalls" => {
            let calls = server
                .calls()
                .into_iter()
                .filter(|r| r.kind == crate::call_log::CallKind::Method)
                .map(|r| {
                    Value::Struct(vec![
                        Value::UInt64(r.timestamp as u64),
                        Value::String(r.member),
                        variants(r.args),
                    ])
                })
                .collect();
            return Ok(vec![Value::Array(calls)]);
        }
        "GetMethodCalls" => {
            let calls = server
                .method_calls(&args.string())
                .into_iter()
                .map(|r| Value::Struct(vec![Value::UInt64(r.timestamp as u64), variants(r.args)]))
                .collect();
            return Ok(vec![Value::Array(calls)]);
        }
        "RemoveObject" => server.remove_object(&ObjectPath::parse(&args.string())?, false)?,
        "Reset" => server.reset()?,
        "UpdateProperties" => {
            let interface = args.string();
            server.update_properties(path, &interface, args.pairs())?;
        }
        _ => {
            return Err(Error::UnknownMethod {
                interface: MOCK_IFACE.to_string(),
                member: member.to_string(),
            })
        }
    }
    Ok(vec![])
}

fn variants(args: Vec<Value>) -> Value {
    Value::Array(args.into_iter().map(Value::variant).collect())
}

fn managed_objects_value(server: &ServerState) -> Value {
    Value::Dict(
        server
            .managed_objects()
            .iter()
            .map(|(path, snapshot)| (Value::from(path), snapshot_value(snapshot)))
            .collect(),
    )
}
