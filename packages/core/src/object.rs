//! Mock objects: per-path interface state.
//!
//! Mutating operations return the notifications they imply instead of
//! emitting them, so the caller can forward them while it still holds the
//! lock that made the mutation atomic.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::behavior::MethodBehavior;
use crate::names::{validate_interface, validate_member};
use crate::notify::Notification;
use crate::path::ObjectPath;
use crate::signature::{Signature, Type};
use crate::value::Value;
use crate::{Error, Result};

/// Property access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyAccess {
    Read,
    #[default]
    ReadWrite,
    Write,
}

impl PropertyAccess {
    pub fn readable(self) -> bool {
        !matches!(self, PropertyAccess::Write)
    }

    pub fn writable(self) -> bool {
        !matches!(self, PropertyAccess::Read)
    }

    /// Name used in introspection documents.
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyAccess::Read => "read",
            PropertyAccess::ReadWrite => "readwrite",
            PropertyAccess::Write => "write",
        }
    }
}

impl fmt::Display for PropertyAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared method.
#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub in_signature: Signature,
    pub out_signature: Signature,
    pub behavior: MethodBehavior,
}

impl MethodSpec {
    /// Parse both signatures; fails with `BadSignature`.
    pub fn new(in_signature: &str, out_signature: &str, behavior: MethodBehavior) -> Result<Self> {
        Ok(MethodSpec {
            in_signature: Signature::parse(in_signature)?,
            out_signature: Signature::parse(out_signature)?,
            behavior,
        })
    }
}

/// A property's current value, type and access mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySlot {
    pub ty: Type,
    pub value: Value,
    pub access: PropertyAccess,
}

impl PropertySlot {
    /// Build a slot, coercing the initial value to `ty`.
    pub fn new(name: &str, ty: Type, value: Value, access: PropertyAccess) -> Result<Self> {
        let value = value.coerce(&ty).map_err(|message| Error::TypeMismatch {
            name: name.to_string(),
            message,
        })?;
        Ok(PropertySlot { ty, value, access })
    }

    /// Build a slot whose type is guessed from the value.
    pub fn guessed(value: Value, access: PropertyAccess) -> Self {
        let value = match value {
            Value::Variant(inner) => *inner,
            other => other,
        };
        PropertySlot {
            ty: value.guess_type(),
            value,
            access,
        }
    }
}

/// A declared signal; descriptive only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpec {
    pub signature: Signature,
}

/// Methods, properties and signals of one interface on one object.
#[derive(Debug, Clone, Default)]
pub struct InterfaceState {
    pub methods: BTreeMap<String, MethodSpec>,
    pub properties: BTreeMap<String, PropertySlot>,
    pub signals: BTreeMap<String, SignalSpec>,
}

impl InterfaceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Property name to value, for `GetAll` and managed-object snapshots.
    pub fn property_values(&self) -> BTreeMap<String, Value> {
        self.properties
            .iter()
            .filter(|(_, slot)| slot.access.readable())
            .map(|(name, slot)| (name.clone(), slot.value.clone()))
            .collect()
    }
}

/// One object on the bus.
#[derive(Debug, Clone)]
pub struct MockObject {
    path: ObjectPath,
    primary_interface: String,
    interfaces: BTreeMap<String, InterfaceState>,
    created_at: f64,
}

impl MockObject {
    /// Create an object carrying only its (empty) primary interface.
    pub fn new(path: ObjectPath, primary_interface: &str) -> Result<Self> {
        validate_interface(primary_interface)?;
        let mut interfaces = BTreeMap::new();
        interfaces.insert(primary_interface.to_string(), InterfaceState::new());
        Ok(MockObject {
            path,
            primary_interface: primary_interface.to_string(),
            interfaces,
            created_at: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
        })
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub fn primary_interface(&self) -> &str {
        &self.primary_interface
    }

    /// Creation time in fractional seconds since the Unix epoch.
    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn interfaces(&self) -> &BTreeMap<String, InterfaceState> {
        &self.interfaces
    }

    /// Resolve `""` to the primary interface.
    pub fn resolve_interface<'a>(&'a self, interface: &'a str) -> &'a str {
        if interface.is_empty() {
            &self.primary_interface
        } else {
            interface
        }
    }

    pub fn interface(&self, interface: &str) -> Option<&InterfaceState> {
        self.interfaces.get(self.resolve_interface(interface))
    }

    fn interface_entry(&mut self, interface: &str) -> Result<&mut InterfaceState> {
        let interface = self.resolve_interface(interface).to_string();
        validate_interface(&interface)?;
        Ok(self.interfaces.entry(interface).or_default())
    }

    /// Add or replace a method.
    pub fn add_method(&mut self, interface: &str, name: &str, spec: MethodSpec) -> Result<()> {
        validate_member(name)?;
        self.interface_entry(interface)?
            .methods
            .insert(name.to_string(), spec);
        Ok(())
    }

    /// Remove a method; `UnknownMethod` if absent.
    pub fn remove_method(&mut self, interface: &str, name: &str) -> Result<MethodSpec> {
        let iface = self.resolve_interface(interface).to_string();
        self.interfaces
            .get_mut(&iface)
            .and_then(|state| state.methods.remove(name))
            .ok_or(Error::UnknownMethod {
                interface: iface,
                member: name.to_string(),
            })
    }

    pub fn method(&self, interface: &str, name: &str) -> Result<&MethodSpec> {
        let iface = self.resolve_interface(interface);
        self.interfaces
            .get(iface)
            .and_then(|state| state.methods.get(name))
            .ok_or_else(|| Error::UnknownMethod {
                interface: iface.to_string(),
                member: name.to_string(),
            })
    }

    /// Add a property; `PropertyExists` if the name is taken on that interface.
    pub fn add_property(&mut self, interface: &str, name: &str, slot: PropertySlot) -> Result<()> {
        validate_member(name)?;
        let iface = self.resolve_interface(interface).to_string();
        let state = self.interface_entry(&iface)?;
        if state.properties.contains_key(name) {
            return Err(Error::PropertyExists {
                interface: iface,
                name: name.to_string(),
            });
        }
        state.properties.insert(name.to_string(), slot);
        Ok(())
    }

    /// Remove a property; `UnknownProperty` if absent.
    pub fn remove_property(&mut self, interface: &str, name: &str) -> Result<PropertySlot> {
        let iface = self.resolve_interface(interface).to_string();
        self.interfaces
            .get_mut(&iface)
            .and_then(|state| state.properties.remove(name))
            .ok_or(Error::UnknownProperty {
                interface: iface,
                name: name.to_string(),
            })
    }

    /// Declare a signal.
    pub fn add_signal(&mut self, interface: &str, name: &str, signature: &str) -> Result<()> {
        validate_member(name)?;
        let signature = Signature::parse(signature)?;
        self.interface_entry(interface)?
            .signals
            .insert(name.to_string(), SignalSpec { signature });
        Ok(())
    }

    fn slot(&self, interface: &str, name: &str) -> Result<&PropertySlot> {
        let iface = self.resolve_interface(interface);
        let state = self
            .interfaces
            .get(iface)
            .ok_or_else(|| Error::UnknownInterface {
                interface: iface.to_string(),
            })?;
        state
            .properties
            .get(name)
            .ok_or_else(|| Error::UnknownProperty {
                interface: iface.to_string(),
                name: name.to_string(),
            })
    }

    /// Read a property value.
    pub fn get_property(&self, interface: &str, name: &str) -> Result<Value> {
        let slot = self.slot(interface, name)?;
        if !slot.access.readable() {
            return Err(Error::NotReadable {
                interface: self.resolve_interface(interface).to_string(),
                name: name.to_string(),
            });
        }
        Ok(slot.value.clone())
    }

    /// All readable properties of one interface.
    pub fn get_all(&self, interface: &str) -> Result<BTreeMap<String, Value>> {
        let iface = self.resolve_interface(interface);
        self.interfaces
            .get(iface)
            .map(InterfaceState::property_values)
            .ok_or_else(|| Error::UnknownInterface {
                interface: iface.to_string(),
            })
    }

    /// Write one property through the bus `Set` semantics.
    ///
    /// Returns the PropertiesChanged notification unless `notify` is false.
    pub fn set_property(
        &mut self,
        interface: &str,
        name: &str,
        value: Value,
        notify: bool,
    ) -> Result<Option<Notification>> {
        let changed = self.update_properties(interface, vec![(name.to_string(), value)], true)?;
        Ok(if notify { changed } else { None })
    }

    /// Set several existing properties at once.
    ///
    /// Either every value is applied or none is. With `enforce_access`
    /// false, read-only slots may be written (the mock's own control
    /// surface may change what clients cannot). Returns one
    /// PropertiesChanged notification naming every changed property.
    pub fn update_properties(
        &mut self,
        interface: &str,
        values: Vec<(String, Value)>,
        enforce_access: bool,
    ) -> Result<Option<Notification>> {
        let iface = self.resolve_interface(interface).to_string();

        let mut coerced = Vec::with_capacity(values.len());
        for (name, value) in values {
            let slot = self.slot(&iface, &name)?;
            if enforce_access && !slot.access.writable() {
                return Err(Error::NotWritable {
                    interface: iface,
                    name,
                });
            }
            let value = value.coerce(&slot.ty).map_err(|message| Error::TypeMismatch {
                name: name.clone(),
                message,
            })?;
            coerced.push((name, value));
        }

        if coerced.is_empty() {
            return Ok(None);
        }

        let state = self
            .interfaces
            .get_mut(&iface)
            .ok_or_else(|| Error::UnknownInterface {
                interface: iface.clone(),
            })?;
        for (name, value) in &coerced {
            if let Some(slot) = state.properties.get_mut(name) {
                slot.value = value.clone();
            }
        }

        Ok(Some(Notification::PropertiesChanged {
            path: self.path.clone(),
            interface: iface,
            changed: coerced,
        }))
    }

    /// Interface name to readable property values, excluding reserved interfaces.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.interfaces
            .iter()
            .filter(|(name, _)| !crate::names::is_reserved_interface(name))
            .map(|(name, state)| (name.clone(), state.property_values()))
            .collect()
    }

    /// Drop everything but an empty primary interface.
    pub(crate) fn clear(&mut self) {
        self.interfaces.clear();
        self.interfaces
            .insert(self.primary_interface.clone(), InterfaceState::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_path;

    const MAIN: &str = "org.freedesktop.Test.Main";

    fn object() -> MockObject {
        MockObject::new(object_path!("/"), MAIN).unwrap()
    }

    #[test]
    fn new_object_has_primary_interface() {
        let obj = object();
        assert_eq!(obj.primary_interface(), MAIN);
        assert!(obj.interface("").is_some());
        assert!(MockObject::new(object_path!("/"), "bad").is_err());
    }

    #[test]
    fn add_method_replaces_existing() {
        let mut obj = object();
        obj.add_method("", "Do", MethodSpec::new("", "", MethodBehavior::NoOp).unwrap())
            .unwrap();
        obj.add_method("", "Do", MethodSpec::new("i", "s", MethodBehavior::NoOp).unwrap())
            .unwrap();
        let method = obj.method(MAIN, "Do").unwrap();
        assert_eq!(method.in_signature.to_string(), "i");
        assert_eq!(method.out_signature.to_string(), "s");
    }

    #[test]
    fn bad_signature_rejected_before_adding() {
        let err = MethodSpec::new("iz", "", MethodBehavior::NoOp).unwrap_err();
        assert!(matches!(err, Error::BadSignature { .. }));
    }

    #[test]
    fn same_name_on_different_interfaces() {
        let mut obj = object();
        obj.add_method("org.iface1", "Do", MethodSpec::new("i", "i", MethodBehavior::NoOp).unwrap())
            .unwrap();
        obj.add_property(
            "org.iface2",
            "Do",
            PropertySlot::guessed(Value::Int32(1), PropertyAccess::Read),
        )
        .unwrap();
        assert!(obj.method("org.iface1", "Do").is_ok());
        assert!(obj.method("org.iface2", "Do").is_err());
        assert_eq!(obj.get_property("org.iface2", "Do").unwrap(), Value::Int32(1));
    }

    #[test]
    fn remove_method_and_property() {
        let mut obj = object();
        obj.add_method("", "Do", MethodSpec::new("", "", MethodBehavior::NoOp).unwrap())
            .unwrap();
        obj.remove_method("", "Do").unwrap();
        assert!(matches!(
            obj.remove_method("", "Do"),
            Err(Error::UnknownMethod { .. })
        ));

        obj.add_property("", "p", PropertySlot::guessed(Value::Bool(true), PropertyAccess::ReadWrite))
            .unwrap();
        obj.remove_property("", "p").unwrap();
        assert!(matches!(
            obj.get_property("", "p"),
            Err(Error::UnknownProperty { .. })
        ));
    }

    #[test]
    fn property_slot_checks_type() {
        let err = PropertySlot::new("p", Type::Boolean, Value::from("yes"), PropertyAccess::Read)
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let slot = PropertySlot::new("p", Type::UInt32, Value::Int64(3), PropertyAccess::Read).unwrap();
        assert_eq!(slot.value, Value::UInt32(3));
    }

    #[test]
    fn duplicate_property_rejected() {
        let mut obj = object();
        let slot = PropertySlot::guessed(Value::Int32(1), PropertyAccess::ReadWrite);
        obj.add_property("", "version", slot.clone()).unwrap();
        assert!(matches!(
            obj.add_property("", "version", slot),
            Err(Error::PropertyExists { .. })
        ));
    }

    #[test]
    fn set_property_semantics() {
        let mut obj = object();
        obj.add_property(
            "",
            "OnBattery",
            PropertySlot::new("OnBattery", Type::Boolean, Value::Bool(true), PropertyAccess::ReadWrite)
                .unwrap(),
        )
        .unwrap();
        obj.add_property(
            "",
            "Version",
            PropertySlot::guessed(Value::from("1.0"), PropertyAccess::Read),
        )
        .unwrap();

        let note = obj.set_property("", "OnBattery", Value::Bool(false), true).unwrap();
        assert!(matches!(
            note,
            Some(Notification::PropertiesChanged { ref changed, .. }) if changed.len() == 1
        ));
        assert_eq!(obj.get_property("", "OnBattery").unwrap(), Value::Bool(false));

        assert!(obj
            .set_property("", "OnBattery", Value::Bool(true), false)
            .unwrap()
            .is_none());

        assert!(matches!(
            obj.set_property("", "Version", Value::from("2.0"), true),
            Err(Error::NotWritable { .. })
        ));
        assert!(matches!(
            obj.set_property("", "OnBattery", Value::from("no"), true),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            obj.set_property("", "Missing", Value::Bool(true), true),
            Err(Error::UnknownProperty { .. })
        ));
    }

    #[test]
    fn update_properties_is_all_or_nothing() {
        let mut obj = object();
        obj.add_property("", "a", PropertySlot::guessed(Value::Int32(1), PropertyAccess::ReadWrite))
            .unwrap();
        let err = obj
            .update_properties(
                "",
                vec![
                    ("a".to_string(), Value::Int32(2)),
                    ("b".to_string(), Value::Int32(3)),
                ],
                false,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProperty { .. }));
        assert_eq!(obj.get_property("", "a").unwrap(), Value::Int32(1));
    }

    #[test]
    fn write_only_property_is_not_readable() {
        let mut obj = object();
        obj.add_property("", "secret", PropertySlot::guessed(Value::from("x"), PropertyAccess::Write))
            .unwrap();
        assert!(matches!(
            obj.get_property("", "secret"),
            Err(Error::NotReadable { .. })
        ));
        assert!(obj.get_all("").unwrap().is_empty());
    }

    #[test]
    fn get_all_unknown_interface() {
        let obj = object();
        assert!(matches!(
            obj.get_all("org.freedesktop.Test.Bogus"),
            Err(Error::UnknownInterface { .. })
        ));
    }

    #[test]
    fn clear_keeps_empty_primary() {
        let mut obj = object();
        obj.add_signal("org.other", "Changed", "s").unwrap();
        obj.clear();
        assert_eq!(obj.interfaces().len(), 1);
        assert!(obj.interface(MAIN).unwrap().methods.is_empty());
    }
}
