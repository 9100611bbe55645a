//! Reserved interface names and validation of bus identifiers.

use crate::{Error, Result};

/// The mock control interface every object implicitly exposes.
pub const MOCK_IFACE: &str = "org.freedesktop.DBus.Mock";

/// Standard property access interface.
pub const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

/// Standard introspection interface.
pub const INTROSPECTABLE_IFACE: &str = "org.freedesktop.DBus.Introspectable";

/// Standard object manager interface.
pub const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";

const MAX_NAME_LEN: usize = 255;

/// Interfaces served by the engine itself rather than by mock state.
pub fn is_reserved_interface(name: &str) -> bool {
    matches!(
        name,
        MOCK_IFACE | PROPERTIES_IFACE | INTROSPECTABLE_IFACE | OBJECT_MANAGER_IFACE
    )
}

fn is_element(element: &str) -> bool {
    let mut chars = element.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate an interface name such as `org.freedesktop.Test.Main`.
pub fn validate_interface(name: &str) -> Result<()> {
    let valid = name.len() <= MAX_NAME_LEN
        && name.split('.').count() >= 2
        && name.split('.').all(is_element);
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName {
            kind: "interface",
            name: name.to_string(),
        })
    }
}

/// Validate a method, property or signal name.
pub fn validate_member(name: &str) -> Result<()> {
    if name.len() <= MAX_NAME_LEN && is_element(name) {
        Ok(())
    } else {
        Err(Error::InvalidName {
            kind: "member",
            name: name.to_string(),
        })
    }
}

/// Validate an error name used for simulated faults; same grammar as interfaces.
pub fn validate_error_name(name: &str) -> Result<()> {
    validate_interface(name).map_err(|_| Error::InvalidName {
        kind: "error",
        name: name.to_string(),
    })
}
