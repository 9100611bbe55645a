//! Error types for the mock engine.

use thiserror::Error;

use crate::names::MOCK_IFACE;

/// Errors reported by engine operations.
///
/// `MockRaised` is the only kind that simulates a failure of the mocked
/// service. Everything else means the mocking API was misused and should
/// surface as a loud test-authoring error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// An object path is not well formed.
    #[error("invalid object path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// An interface, member or error name is not well formed.
    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    /// An object already exists at the path.
    #[error("object {0} already exists")]
    DuplicatePath(String),

    /// No object exists at the path.
    #[error("object {0} does not exist")]
    NotFound(String),

    /// The object does not carry the interface.
    #[error("no such interface {interface}")]
    UnknownInterface { interface: String },

    /// No method with that name on the interface.
    #[error("no method {member} on interface {interface}")]
    UnknownMethod { interface: String, member: String },

    /// No property with that name on the interface.
    #[error("no such property {name}")]
    UnknownProperty { interface: String, name: String },

    /// A property with that name already exists on the interface.
    #[error("property {name} already exists")]
    PropertyExists { interface: String, name: String },

    /// Removal of an object with live children without cascading.
    #[error("object {path} has child objects: {}", children.join(", "))]
    HasChildren { path: String, children: Vec<String> },

    /// A signature string contains an unrecognized or misplaced type tag.
    #[error("bad signature '{signature}': {message}")]
    BadSignature { signature: String, message: String },

    /// A property value does not conform to the slot's type.
    #[error("type mismatch for {name}: {message}")]
    TypeMismatch { name: String, message: String },

    /// Call arguments do not match the declared input signature.
    #[error("Invalid arguments: {0}")]
    ArgumentMismatch(String),

    /// Write to a read-only property.
    #[error("property {name} is not writable")]
    NotWritable { interface: String, name: String },

    /// Read of a write-only property.
    #[error("property {name} is not readable")]
    NotReadable { interface: String, name: String },

    /// No template is registered under that name.
    #[error("cannot add template {0}: no such template")]
    UnknownTemplate(String),

    /// Intentional simulated failure raised by a behavior.
    #[error("{name}: {message}")]
    MockRaised { name: String, message: String },

    /// Unexpected failure while evaluating behavior code.
    #[error("behavior of {member} failed: {message}")]
    BehaviorError { member: String, message: String },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A protocol-level error reply.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Fault {
    pub name: String,
    pub message: String,
}

impl Error {
    /// Simulated fault with a bus error name and message.
    pub fn raised(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MockRaised {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Translate into the error reply the transport sends back.
    pub fn fault(&self) -> Fault {
        let name = match self {
            Error::MockRaised { name, .. } => {
                return Fault {
                    name: name.clone(),
                    message: self.message(),
                }
            }
            Error::InvalidPath { .. } | Error::InvalidName { .. } => {
                "org.freedesktop.DBus.Error.InvalidArgs".to_string()
            }
            Error::DuplicatePath(_) | Error::NotFound(_) | Error::HasChildren { .. } => {
                format!("{}.NameError", MOCK_IFACE)
            }
            Error::UnknownInterface { .. } => {
                "org.freedesktop.DBus.Error.UnknownInterface".to_string()
            }
            Error::UnknownMethod { .. } => "org.freedesktop.DBus.Error.UnknownMethod".to_string(),
            Error::UnknownProperty { .. } => {
                "org.freedesktop.DBus.Error.UnknownProperty".to_string()
            }
            Error::PropertyExists { interface, .. } => format!("{}.PropertyExists", interface),
            Error::BadSignature { .. }
            | Error::TypeMismatch { .. }
            | Error::ArgumentMismatch(_) => "org.freedesktop.DBus.Error.InvalidArgs".to_string(),
            Error::NotWritable { .. } => "org.freedesktop.DBus.Error.PropertyReadOnly".to_string(),
            Error::NotReadable { .. } => "org.freedesktop.DBus.Error.AccessDenied".to_string(),
            Error::UnknownTemplate(_) => format!("{}.TemplateError", MOCK_IFACE),
            Error::BehaviorError { .. } => "org.freedesktop.DBus.Error.Failed".to_string(),
        };
        Fault {
            name,
            message: self.message(),
        }
    }

    fn message(&self) -> String {
        match self {
            Error::MockRaised { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
