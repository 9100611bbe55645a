//! Pending notifications produced by mutations.
//!
//! Registry and object mutations never talk to the transport themselves.
//! They return the notifications their change implies, and the server
//! forwards every one of them to the emitter before releasing its lock.

use std::collections::BTreeMap;

use crate::emitter::SignalEvent;
use crate::names::{OBJECT_MANAGER_IFACE, PROPERTIES_IFACE};
use crate::path::ObjectPath;
use crate::value::Value;

/// Interface name to property name to value.
pub type InterfaceSnapshot = BTreeMap<String, BTreeMap<String, Value>>;

/// A change that clients must hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// `org.freedesktop.DBus.Properties.PropertiesChanged` on `path`.
    PropertiesChanged {
        path: ObjectPath,
        interface: String,
        changed: Vec<(String, Value)>,
    },
    /// `InterfacesAdded` from the object manager at `root`.
    InterfacesAdded {
        root: ObjectPath,
        object: ObjectPath,
        interfaces: InterfaceSnapshot,
    },
    /// `InterfacesRemoved` from the object manager at `root`.
    InterfacesRemoved {
        root: ObjectPath,
        object: ObjectPath,
        interfaces: Vec<String>,
    },
}

impl Notification {
    /// Render as the signal the transport delivers.
    pub fn to_signal(&self) -> SignalEvent {
        match self {
            Notification::PropertiesChanged {
                path,
                interface,
                changed,
            } => SignalEvent::new(
                path.clone(),
                PROPERTIES_IFACE,
                "PropertiesChanged",
                vec![
                    Value::String(interface.clone()),
                    Value::string_dict(changed.iter().cloned()),
                    Value::Array(Vec::new()),
                ],
            ),
            Notification::InterfacesAdded {
                root,
                object,
                interfaces,
            } => SignalEvent::new(
                root.clone(),
                OBJECT_MANAGER_IFACE,
                "InterfacesAdded",
                vec![Value::from(object), snapshot_value(interfaces)],
            ),
            Notification::InterfacesRemoved {
                root,
                object,
                interfaces,
            } => SignalEvent::new(
                root.clone(),
                OBJECT_MANAGER_IFACE,
                "InterfacesRemoved",
                vec![
                    Value::from(object),
                    Value::Array(interfaces.iter().cloned().map(Value::String).collect()),
                ],
            ),
        }
    }
}

/// `a{sa{sv}}` rendering of an interface snapshot.
pub fn snapshot_value(interfaces: &InterfaceSnapshot) -> Value {
    Value::Dict(
        interfaces
            .iter()
            .map(|(name, props)| {
                (
                    Value::String(name.clone()),
                    Value::string_dict(props.iter().map(|(k, v)| (k.clone(), v.clone()))),
                )
            })
            .collect(),
    )
}
