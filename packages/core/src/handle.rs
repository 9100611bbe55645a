//! Handle to one mock object, given to behaviors and templates.
//!
//! A handle is a path plus a clone of the server; every operation goes
//! through the server's own locking, so behaviors may mutate freely while
//! their call is in flight.

use crate::behavior::MethodBehavior;
use crate::object::PropertyAccess;
use crate::path::ObjectPath;
use crate::state::{MethodDef, ServerState};
use crate::value::Value;
use crate::Result;

#[derive(Clone)]
pub struct MockHandle {
    path: ObjectPath,
    server: ServerState,
}

impl MockHandle {
    pub(crate) fn new(path: ObjectPath, server: ServerState) -> Self {
        MockHandle { path, server }
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    pub fn server(&self) -> &ServerState {
        &self.server
    }

    /// A handle to another object of the same server.
    pub fn at(&self, path: ObjectPath) -> MockHandle {
        MockHandle::new(path, self.server.clone())
    }

    pub fn get_property(&self, interface: &str, name: &str) -> Result<Value> {
        self.server.get_property(&self.path, interface, name)
    }

    /// Change a property from inside the mock; access modes do not apply.
    pub fn set_property(&self, interface: &str, name: &str, value: Value) -> Result<()> {
        self.server
            .update_properties(&self.path, interface, vec![(name.to_string(), value)])
    }

    pub fn update_properties(&self, interface: &str, values: Vec<(String, Value)>) -> Result<()> {
        self.server.update_properties(&self.path, interface, values)
    }

    pub fn add_property(&self, interface: &str, name: &str, value: Value) -> Result<()> {
        self.server
            .add_property(&self.path, interface, name, "", value, PropertyAccess::ReadWrite)
    }

    pub fn add_properties(&self, interface: &str, values: Vec<(String, Value)>) -> Result<()> {
        self.server.add_properties(&self.path, interface, values)
    }

    pub fn add_method(
        &self,
        interface: &str,
        name: &str,
        in_signature: &str,
        out_signature: &str,
        behavior: MethodBehavior,
    ) -> Result<()> {
        self.server.add_method(
            &self.path,
            interface,
            name,
            in_signature,
            out_signature,
            behavior,
        )
    }

    pub fn add_methods(&self, interface: &str, methods: Vec<MethodDef>) -> Result<()> {
        self.server.add_methods(&self.path, interface, methods)
    }

    pub fn add_signal(&self, interface: &str, name: &str, signature: &str) -> Result<()> {
        self.server.add_signal(&self.path, interface, name, signature)
    }

    /// Create another object; returns a handle to it.
    pub fn add_object(
        &self,
        path: &str,
        interface: &str,
        properties: Vec<(String, Value)>,
        methods: Vec<MethodDef>,
    ) -> Result<MockHandle> {
        let path = ObjectPath::parse(path)?;
        self.server
            .add_object(&path, interface, properties, methods)?;
        Ok(self.at(path))
    }

    pub fn remove_object(&self, path: &str) -> Result<()> {
        self.server.remove_object(&ObjectPath::parse(path)?, false)
    }

    /// Emit a signal from this object.
    pub fn emit_signal(
        &self,
        interface: &str,
        name: &str,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        self.server
            .emit_signal(&self.path, interface, name, signature, args)
    }

    /// Every object path of the server.
    pub fn objects(&self) -> Vec<ObjectPath> {
        self.server.objects()
    }

    /// Serve the object manager on this object.
    pub fn enable_object_manager(&self) -> Result<()> {
        self.server.enable_object_manager(&self.path)
    }
}

impl std::fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHandle").field("path", &self.path).finish()
    }
}
