//! The server: one explicit value owning registry, call log and transport.
//!
//! # Locking
//!
//! - The registry sits behind one `RwLock`. Every mutation takes the write
//!   lock, applies itself completely and forwards the notifications it
//!   produced before releasing it, so no reader sees half a mutation and no
//!   notification is skipped or reordered.
//! - A method call validates and records itself under the read lock, then
//!   runs its behavior with no lock held. Behaviors may call back into the
//!   server (add objects, set properties, emit signals) without deadlock.
//! - The call log has its own mutex; record order is the order calls got
//!   past validation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::behavior::{self, CallContext, Helpers, MethodBehavior, SnippetEvaluator};
use crate::call_log::{CallKind, CallLog, CallRecord};
use crate::config::ServerConfig;
use crate::emitter::{emit, send_unlogged, NullTransport, SignalEvent, Transport};
use crate::handle::MockHandle;
use crate::introspect;
use crate::names::{validate_interface, validate_member, MOCK_IFACE};
use crate::notify::{InterfaceSnapshot, Notification};
use crate::object::{MethodSpec, MockObject, PropertyAccess, PropertySlot};
use crate::path::ObjectPath;
use crate::registry::Registry;
use crate::signature::{Signature, Type};
use crate::template::{Parameters, Template, TemplateRegistry};
use crate::value::{format_args, Value};
use crate::{Error, Result};

/// A method to add, as taken by the batch operations.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub in_signature: String,
    pub out_signature: String,
    pub behavior: MethodBehavior,
}

impl MethodDef {
    pub fn new(
        name: impl Into<String>,
        in_signature: impl Into<String>,
        out_signature: impl Into<String>,
        behavior: MethodBehavior,
    ) -> Self {
        MethodDef {
            name: name.into(),
            in_signature: in_signature.into(),
            out_signature: out_signature.into(),
            behavior,
        }
    }
}

struct Inner {
    registry: RwLock<Registry>,
    log: CallLog,
    transport: Arc<dyn Transport>,
    evaluator: Option<Arc<dyn SnippetEvaluator>>,
    templates: TemplateRegistry,
    main_path: ObjectPath,
    main_interface: String,
    object_manager: bool,
    /// Templates applied so far, re-applied on reset.
    applied: Mutex<Vec<(ObjectPath, String, Parameters)>>,
}

/// One mock server instance.
///
/// Cloning is cheap and yields another handle to the same instance.
/// Separate instances share nothing.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<Inner>,
}

/// Builder for [`ServerState`].
pub struct ServerBuilder {
    config: ServerConfig,
    transport: Arc<dyn Transport>,
    evaluator: Option<Arc<dyn SnippetEvaluator>>,
    templates: TemplateRegistry,
}

impl ServerBuilder {
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn evaluator(mut self, evaluator: impl SnippetEvaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    pub fn template(mut self, template: impl Template + 'static) -> Self {
        self.templates.register(template);
        self
    }

    pub fn templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Create the main object and apply the configured template.
    pub fn build(self) -> Result<ServerState> {
        let main_path = ObjectPath::parse(&self.config.main_path)?;
        let mut registry = Registry::new();
        registry.create(MockObject::new(
            main_path.clone(),
            &self.config.main_interface,
        )?)?;
        if self.config.object_manager {
            registry.enable_object_manager(main_path.clone())?;
        }

        let parameters = self.config.parameter_values();
        let server = ServerState {
            inner: Arc::new(Inner {
                registry: RwLock::new(registry),
                log: CallLog::new(),
                transport: self.transport,
                evaluator: self.evaluator,
                templates: self.templates,
                main_path: main_path.clone(),
                main_interface: self.config.main_interface,
                object_manager: self.config.object_manager,
                applied: Mutex::new(Vec::new()),
            }),
        };

        if let Some(template) = &self.config.template {
            server.add_template(&main_path, template, parameters)?;
        }
        Ok(server)
    }
}

impl ServerState {
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            config: ServerConfig::default(),
            transport: Arc::new(NullTransport),
            evaluator: None,
            templates: TemplateRegistry::new(),
        }
    }

    /// A server with default config and no transport.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emit pending notifications; the caller holds the write lock.
    fn forward(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.send(&notification.to_signal());
        }
    }

    fn send(&self, event: &SignalEvent) {
        emit(&self.inner.log, self.inner.transport.as_ref(), event);
    }

    pub fn main_path(&self) -> &ObjectPath {
        &self.inner.main_path
    }

    pub fn main_interface(&self) -> &str {
        &self.inner.main_interface
    }

    pub fn handle(&self, path: ObjectPath) -> MockHandle {
        MockHandle::new(path, self.clone())
    }

    /// Handle to the main object.
    pub fn main(&self) -> MockHandle {
        self.handle(self.inner.main_path.clone())
    }

    /// Compile behavior source with the installed evaluator.
    pub fn compile(&self, member: &str, source: &str) -> Result<MethodBehavior> {
        MethodBehavior::from_source(self.inner.evaluator.as_deref(), member, source)
    }

    // Registry

    /// Create an object carrying `interface` with the given properties and methods.
    pub fn add_object(
        &self,
        path: &ObjectPath,
        interface: &str,
        properties: Vec<(String, Value)>,
        methods: Vec<MethodDef>,
    ) -> Result<()> {
        let mut object = MockObject::new(path.clone(), interface)?;
        for (name, value) in properties {
            object.add_property(
                "",
                &name,
                PropertySlot::guessed(value, PropertyAccess::ReadWrite),
            )?;
        }
        for def in methods {
            let spec = MethodSpec::new(&def.in_signature, &def.out_signature, def.behavior)?;
            object.add_method("", &def.name, spec)?;
        }

        debug!("AddObject {} {}", path, interface);
        let mut registry = self.write();
        let notifications = registry.create(object)?;
        self.forward(notifications);
        Ok(())
    }

    /// Remove an object; `cascade` also removes everything below it.
    pub fn remove_object(&self, path: &ObjectPath, cascade: bool) -> Result<()> {
        debug!("RemoveObject {} cascade={}", path, cascade);
        let mut registry = self.write();
        let notifications = registry.remove(path, cascade)?;
        self.forward(notifications);
        Ok(())
    }

    /// Every object path, in order.
    pub fn objects(&self) -> Vec<ObjectPath> {
        self.read().paths()
    }

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.read().contains(path)
    }

    /// A copy of the object at `path`.
    pub fn lookup(&self, path: &ObjectPath) -> Result<MockObject> {
        self.read().lookup(path).cloned()
    }

    // Methods, properties, signals

    pub fn add_method(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        in_signature: &str,
        out_signature: &str,
        behavior: MethodBehavior,
    ) -> Result<()> {
        let spec = MethodSpec::new(in_signature, out_signature, behavior)?;
        self.write().lookup_mut(path)?.add_method(interface, name, spec)
    }

    /// Add several methods; either all are added or none.
    pub fn add_methods(
        &self,
        path: &ObjectPath,
        interface: &str,
        methods: Vec<MethodDef>,
    ) -> Result<()> {
        let specs = methods
            .into_iter()
            .map(|def| {
                let spec = MethodSpec::new(&def.in_signature, &def.out_signature, def.behavior)?;
                Ok((def.name, spec))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut registry = self.write();
        let object = registry.lookup_mut(path)?;
        let mut staged = object.clone();
        for (name, spec) in specs {
            staged.add_method(interface, &name, spec)?;
        }
        *object = staged;
        Ok(())
    }

    pub fn remove_method(&self, path: &ObjectPath, interface: &str, name: &str) -> Result<()> {
        self.write()
            .lookup_mut(path)?
            .remove_method(interface, name)
            .map(drop)
    }

    /// Add a property. An empty `signature` guesses the type from the value.
    pub fn add_property(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        signature: &str,
        value: Value,
        access: PropertyAccess,
    ) -> Result<()> {
        let slot = if signature.is_empty() {
            PropertySlot::guessed(value, access)
        } else {
            PropertySlot::new(name, Type::parse(signature)?, value, access)?
        };
        self.write()
            .lookup_mut(path)?
            .add_property(interface, name, slot)
    }

    /// Add several read-write properties with guessed types; all or none.
    pub fn add_properties(
        &self,
        path: &ObjectPath,
        interface: &str,
        values: Vec<(String, Value)>,
    ) -> Result<()> {
        let mut registry = self.write();
        let object = registry.lookup_mut(path)?;
        let mut staged = object.clone();
        for (name, value) in values {
            staged.add_property(
                interface,
                &name,
                PropertySlot::guessed(value, PropertyAccess::ReadWrite),
            )?;
        }
        *object = staged;
        Ok(())
    }

    pub fn remove_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Result<()> {
        self.write()
            .lookup_mut(path)?
            .remove_property(interface, name)
            .map(drop)
    }

    pub fn add_signal(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        signature: &str,
    ) -> Result<()> {
        self.write()
            .lookup_mut(path)?
            .add_signal(interface, name, signature)
    }

    pub fn get_property(&self, path: &ObjectPath, interface: &str, name: &str) -> Result<Value> {
        info!(target: "busmock::calls", "Get {} {}.{}", path, interface, name);
        self.read().lookup(path)?.get_property(interface, name)
    }

    pub fn get_all(
        &self,
        path: &ObjectPath,
        interface: &str,
    ) -> Result<BTreeMap<String, Value>> {
        info!(target: "busmock::calls", "GetAll {} {}", path, interface);
        self.read().lookup(path)?.get_all(interface)
    }

    /// Client-side property write: access modes apply.
    ///
    /// `notify` false suppresses PropertiesChanged unless the object
    /// manager covers the object.
    pub fn set_property(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        value: Value,
        notify: bool,
    ) -> Result<()> {
        info!(
            target: "busmock::calls",
            "Set {} {}.{}{}",
            path,
            interface,
            name,
            format_args(std::slice::from_ref(&value))
        );
        let mut registry = self.write();
        let notifications = registry.set_property(path, interface, name, value, notify)?;
        self.forward(notifications);
        Ok(())
    }

    /// Overwrite existing properties and announce them in one PropertiesChanged.
    pub fn update_properties(
        &self,
        path: &ObjectPath,
        interface: &str,
        values: Vec<(String, Value)>,
    ) -> Result<()> {
        let mut registry = self.write();
        let notifications = registry.update_properties(path, interface, values)?;
        self.forward(notifications);
        Ok(())
    }

    // Invocation

    /// Invoke a mocked method.
    ///
    /// Arguments are coerced to the input signature first; on mismatch
    /// nothing is recorded and the behavior never runs.
    pub fn invoke(
        &self,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let (interface, spec, args) = {
            let registry = self.read();
            let object = registry.lookup(path)?;
            let interface = object.resolve_interface(interface).to_string();
            let spec = object.method(&interface, member)?.clone();
            let args = Value::coerce_all(args, &spec.in_signature).map_err(Error::ArgumentMismatch)?;

            info!(target: "busmock::calls", "{}{}", member, format_args(&args));
            self.inner
                .log
                .append(CallKind::Method, path, &interface, member, args.clone());
            send_unlogged(
                self.inner.transport.as_ref(),
                &SignalEvent::new(
                    path.clone(),
                    MOCK_IFACE,
                    "MethodCalled",
                    vec![
                        Value::from(member),
                        Value::Array(args.iter().cloned().map(Value::variant).collect()),
                    ],
                ),
            );
            (interface, spec, args)
        };

        let ctx = CallContext {
            path: path.clone(),
            interface,
            member: member.to_string(),
            args,
            mock: self.handle(path.clone()),
            helpers: Helpers,
        };
        behavior::execute(&spec.behavior, &spec.out_signature, &ctx).inspect_err(|e| match e {
            Error::MockRaised { name, message } => {
                warn!(target: "busmock::calls", "{} raised: {}: {}", member, name, message)
            }
            other => warn!(target: "busmock::calls", "{} failed: {}", member, other),
        })
    }

    // Signals

    /// Emit a signal from an existing object.
    ///
    /// A non-empty `signature` coerces the arguments; declared signal specs
    /// are not consulted.
    pub fn emit_signal(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        self.emit_signal_detailed(path, interface, name, signature, args, None)
    }

    /// Emit a signal, optionally unicast to `destination`.
    pub fn emit_signal_detailed(
        &self,
        path: &ObjectPath,
        interface: &str,
        name: &str,
        signature: &str,
        args: Vec<Value>,
        destination: Option<String>,
    ) -> Result<()> {
        validate_member(name)?;
        let registry = self.write();
        let object = registry.lookup(path)?;
        let interface = object.resolve_interface(interface).to_string();
        validate_interface(&interface)?;

        let args = if signature.is_empty() {
            args.into_iter()
                .map(|arg| arg.unwrap_variant().clone())
                .collect()
        } else {
            Value::coerce_all(args, &Signature::parse(signature)?)
                .map_err(Error::ArgumentMismatch)?
        };

        self.send(
            &SignalEvent::new(path.clone(), interface, name, args).with_destination(destination),
        );
        Ok(())
    }

    // Object manager

    /// Serve the object manager on `root`.
    pub fn enable_object_manager(&self, root: &ObjectPath) -> Result<()> {
        self.write().enable_object_manager(root.clone())
    }

    /// Root of the active object manager.
    pub fn object_manager_root(&self) -> Option<ObjectPath> {
        self.read().manager().root().cloned()
    }

    /// The managed-objects view at this instant.
    pub fn managed_objects(&self) -> BTreeMap<ObjectPath, InterfaceSnapshot> {
        self.read().managed_objects()
    }

    // Introspection

    pub fn introspect(&self, path: &ObjectPath) -> Result<String> {
        let registry = self.read();
        let object = registry.lookup(path)?;
        let children = registry.child_nodes(path);
        let manager_root = registry.manager().root() == Some(path);
        Ok(introspect::render(object, &children, manager_root))
    }

    // Call log

    pub fn calls(&self) -> Vec<CallRecord> {
        self.inner.log.records()
    }

    pub fn method_calls(&self, member: &str) -> Vec<CallRecord> {
        self.inner.log.method_calls(member)
    }

    pub fn clear_calls(&self) {
        self.inner.log.clear();
    }

    pub fn call_log(&self) -> &CallLog {
        &self.inner.log
    }

    // Templates and reset

    /// Apply a registered template to the object at `path` and remember it.
    pub fn add_template(&self, path: &ObjectPath, name: &str, parameters: Parameters) -> Result<()> {
        self.load_template(path, name, &parameters)?;
        self.inner
            .applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((path.clone(), name.to_string(), parameters));
        Ok(())
    }

    fn load_template(&self, path: &ObjectPath, name: &str, parameters: &Parameters) -> Result<()> {
        let template = self.inner.templates.get(name)?;
        info!("loading template {} on {}", name, path);
        if template.object_manager() {
            self.enable_object_manager(path)?;
        }
        template.load(&self.handle(path.clone()), parameters)
    }

    /// Return to the state right after startup.
    ///
    /// Every object but the main one is removed, the main object loses all
    /// members, and remembered templates are applied again. The call log is
    /// kept.
    pub fn reset(&self) -> Result<()> {
        {
            let mut registry = self.write();
            let main = self.inner.main_path.clone();
            let notifications = registry.retain_only(&main);
            self.forward(notifications);
            registry.disable_object_manager();
            match registry.lookup_mut(&main) {
                Ok(object) => object.clear(),
                Err(_) => {
                    registry.create(MockObject::new(main.clone(), &self.inner.main_interface)?)?;
                }
            }
            if self.inner.object_manager {
                registry.enable_object_manager(main)?;
            }
        }

        let applied = self
            .inner
            .applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for (path, name, parameters) in &applied {
            if self.contains(path) {
                self.load_template(path, name, parameters)?;
            }
        }
        Ok(())
    }

    // Transport boundary

    /// Route one inbound call by interface and member.
    ///
    /// Properties, introspection, the object manager and the control
    /// interface are served by the engine; everything else is a mocked
    /// method.
    pub fn handle_call(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let path = ObjectPath::parse(path)?;
        crate::control::dispatch(self, &path, interface, member, args)
    }

    pub(crate) fn has_method(&self, path: &ObjectPath, interface: &str, member: &str) -> bool {
        self.read()
            .lookup(path)
            .is_ok_and(|object| object.method(interface, member).is_ok())
    }
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("main_path", &self.inner.main_path)
            .field("objects", &self.objects())
            .field("calls", &self.inner.log.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::ChannelTransport;
    use crate::object_path;

    #[test]
    fn new_server_has_main_object() {
        let server = ServerState::new().unwrap();
        assert_eq!(server.objects(), vec![object_path!("/")]);
        assert_eq!(server.main_interface(), "org.freedesktop.Test.Main");
    }

    #[test]
    fn servers_are_independent() {
        let a = ServerState::new().unwrap();
        let b = ServerState::new().unwrap();
        a.add_object(&object_path!("/only_a"), "org.example.A", vec![], vec![])
            .unwrap();
        assert!(a.contains(&object_path!("/only_a")));
        assert!(!b.contains(&object_path!("/only_a")));
    }

    #[test]
    fn invoke_records_before_running() {
        let server = ServerState::new().unwrap();
        let seen = Arc::new(Mutex::new(0usize));
        let probe = Arc::clone(&seen);
        server
            .add_method(
                &object_path!("/"),
                "",
                "Count",
                "",
                "u",
                MethodBehavior::native(move |ctx| {
                    *probe.lock().unwrap() = ctx.mock.server().calls().len();
                    Ok(None)
                }),
            )
            .unwrap();
        let out = server.invoke(&object_path!("/"), "", "Count", vec![]).unwrap();
        assert_eq!(out, vec![Value::UInt32(0)]);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn method_called_signal_is_not_logged() {
        let (transport, mut rx) = ChannelTransport::new();
        let server = ServerState::builder().transport(transport).build().unwrap();
        server
            .add_method(&object_path!("/"), "", "Ping", "", "", MethodBehavior::NoOp)
            .unwrap();
        server.invoke(&object_path!("/"), "", "Ping", vec![]).unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.interface, MOCK_IFACE);
        assert_eq!(event.name, "MethodCalled");
        assert_eq!(event.args[0], Value::from("Ping"));
        assert_eq!(server.calls().len(), 1);
    }

    #[test]
    fn add_methods_is_atomic() {
        let server = ServerState::new().unwrap();
        let err = server
            .add_methods(
                &object_path!("/"),
                "",
                vec![
                    MethodDef::new("Good", "", "", MethodBehavior::NoOp),
                    MethodDef::new("bad name", "", "", MethodBehavior::NoOp),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidName { .. }));
        assert!(!server.has_method(&object_path!("/"), "", "Good"));
    }

    #[test]
    fn emit_signal_requires_object() {
        let server = ServerState::new().unwrap();
        assert!(matches!(
            server.emit_signal(&object_path!("/nope"), "org.example.A", "Changed", "", vec![]),
            Err(Error::NotFound(_))
        ));
        assert!(server.calls().is_empty());
    }

    #[test]
    fn emit_signal_coerces_with_signature() {
        let (transport, mut rx) = ChannelTransport::new();
        let server = ServerState::builder().transport(transport).build().unwrap();
        server
            .emit_signal(
                &object_path!("/"),
                "",
                "Level",
                "yo",
                vec![Value::variant(3i64), Value::from("/a")],
            )
            .unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.interface, "org.freedesktop.Test.Main");
        assert_eq!(
            event.args,
            vec![Value::Byte(3), Value::ObjectPath("/a".to_string())]
        );
        assert_eq!(server.calls()[0].kind, CallKind::Signal);
    }

    #[test]
    fn reset_restores_main_object() {
        let server = ServerState::new().unwrap();
        let root = object_path!("/");
        server
            .add_method(&root, "", "Ping", "", "", MethodBehavior::NoOp)
            .unwrap();
        server
            .add_object(&object_path!("/a"), "org.example.A", vec![], vec![])
            .unwrap();
        server.invoke(&root, "", "Ping", vec![]).unwrap();

        server.reset().unwrap();
        assert_eq!(server.objects(), vec![root.clone()]);
        assert!(!server.has_method(&root, "", "Ping"));
        assert_eq!(server.calls().len(), 1);
    }
}
