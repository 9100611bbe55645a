use std::sync::Arc;
use std::thread;

use busmock_core::{
    object_path, CallKind, ChannelTransport, Error, MethodBehavior, ObjectPath, PropertyAccess,
    ServerConfig, ServerState, SignalEvent, Value,
};
use busmock_core::names::MOCK_IFACE;
use collection_literals::btree;
use tokio::sync::mpsc::UnboundedReceiver;

fn server_with_channel() -> (ServerState, UnboundedReceiver<SignalEvent>) {
    let (transport, rx) = ChannelTransport::new();
    let server = ServerState::builder().transport(transport).build().unwrap();
    (server, rx)
}

fn drain(rx: &mut UnboundedReceiver<SignalEvent>) -> Vec<SignalEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        // MethodCalled is a per-call echo; the tests below care about the rest
        if event.interface != MOCK_IFACE {
            events.push(event);
        }
    }
    events
}

#[test]
fn test_ping_returns_empty_tuple_and_one_record() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(&root, "com.example.Foo.Manager", "Ping", "", "", MethodBehavior::NoOp)
        .unwrap();

    let out = server
        .invoke(&root, "com.example.Foo.Manager", "Ping", vec![])
        .unwrap();
    assert!(out.is_empty());

    let calls = server.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].member, "Ping");
    assert_eq!(calls[0].interface, "com.example.Foo.Manager");
    assert_eq!(calls[0].kind, CallKind::Method);
}

#[test]
fn test_add_returns_sum() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(
            &root,
            "com.example.Calc",
            "Add",
            "ii",
            "i",
            MethodBehavior::native(|ctx| {
                let a = ctx.args[0].as_integer().unwrap_or(0);
                let b = ctx.args[1].as_integer().unwrap_or(0);
                Ok(Some(Value::Int64((a + b) as i64)))
            }),
        )
        .unwrap();

    let out = server
        .invoke(&root, "com.example.Calc", "Add", vec![Value::Int64(2), Value::Int64(3)])
        .unwrap();
    assert_eq!(out, vec![Value::Int32(5)]);
}

#[test]
fn test_arity_mismatch_never_runs_behavior() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    server
        .add_method(
            &root,
            "",
            "Add",
            "ii",
            "i",
            MethodBehavior::native(move |_| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(None)
            }),
        )
        .unwrap();

    for args in [vec![], vec![Value::Int64(1)], vec![Value::Int64(1); 3]] {
        let err = server.invoke(&root, "", "Add", args).unwrap_err();
        assert!(matches!(err, Error::ArgumentMismatch(_)));
    }
    let err = server
        .invoke(&root, "", "Add", vec![Value::from("x"), Value::Int64(1)])
        .unwrap_err();
    assert!(matches!(err, Error::ArgumentMismatch(_)));

    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    assert!(server.calls().is_empty());
}

#[test]
fn test_unknown_method() {
    let server = ServerState::new().unwrap();
    let err = server
        .invoke(&object_path!("/"), "com.example.Nope", "Ping", vec![])
        .unwrap_err();
    assert!(matches!(err, Error::UnknownMethod { .. }));
    assert_eq!(err.fault().name, "org.freedesktop.DBus.Error.UnknownMethod");
}

#[test]
fn test_property_change_emits_once() {
    let (server, mut rx) = server_with_channel();
    let root = object_path!("/");
    server
        .add_property(
            &root,
            "org.freedesktop.UPower",
            "OnBattery",
            "b",
            Value::Bool(true),
            PropertyAccess::ReadWrite,
        )
        .unwrap();

    server
        .set_property(&root, "org.freedesktop.UPower", "OnBattery", Value::Bool(false), true)
        .unwrap();
    assert_eq!(
        server
            .get_property(&root, "org.freedesktop.UPower", "OnBattery")
            .unwrap(),
        Value::Bool(false)
    );

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "PropertiesChanged");
    assert_eq!(events[0].args[0], Value::from("org.freedesktop.UPower"));
    assert_eq!(
        events[0].args[1].dict_get("OnBattery"),
        Some(&Value::variant(false))
    );
}

#[test]
fn test_suppressed_property_change_is_silent() {
    let (server, mut rx) = server_with_channel();
    let root = object_path!("/");
    server
        .add_property(&root, "", "Level", "u", Value::Int64(1), PropertyAccess::ReadWrite)
        .unwrap();
    server
        .set_property(&root, "", "Level", Value::Int64(2), false)
        .unwrap();
    assert!(drain(&mut rx).is_empty());
    assert_eq!(server.get_property(&root, "", "Level").unwrap(), Value::UInt32(2));
}

#[test]
fn test_read_only_property_rejects_set_silently() {
    let (server, mut rx) = server_with_channel();
    let root = object_path!("/");
    server
        .add_property(&root, "", "Version", "s", Value::from("1.0"), PropertyAccess::Read)
        .unwrap();

    let err = server
        .set_property(&root, "", "Version", Value::from("2.0"), true)
        .unwrap_err();
    assert!(matches!(err, Error::NotWritable { .. }));
    assert!(server.calls().is_empty());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(server.get_property(&root, "", "Version").unwrap(), Value::from("1.0"));
}

fn managed_server() -> (ServerState, UnboundedReceiver<SignalEvent>) {
    let (transport, rx) = ChannelTransport::new();
    let server = ServerState::builder()
        .config(ServerConfig {
            object_manager: true,
            ..ServerConfig::default()
        })
        .transport(transport)
        .build()
        .unwrap();
    (server, rx)
}

#[test]
fn test_remove_object_with_children() {
    let (server, mut rx) = managed_server();
    for p in ["/x", "/x/y"] {
        server
            .add_object(&ObjectPath::parse(p).unwrap(), "org.example.Node", vec![], vec![])
            .unwrap();
    }
    drain(&mut rx);

    let err = server.remove_object(&object_path!("/x"), false).unwrap_err();
    assert!(matches!(err, Error::HasChildren { .. }));
    assert!(drain(&mut rx).is_empty());
    assert!(server.contains(&object_path!("/x/y")));

    server.remove_object(&object_path!("/x"), true).unwrap();
    let removed: Vec<Value> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.name == "InterfacesRemoved")
        .map(|e| e.args[0].clone())
        .collect();
    assert_eq!(
        removed,
        vec![
            Value::ObjectPath("/x/y".to_string()),
            Value::ObjectPath("/x".to_string())
        ]
    );
    assert_eq!(server.objects(), vec![object_path!("/")]);
}

#[test]
fn test_managed_objects_follow_registry() {
    let (server, mut rx) = managed_server();

    server
        .add_object(
            &object_path!("/a/b"),
            "org.Test",
            vec![("name".to_string(), Value::from("foo"))],
            vec![],
        )
        .unwrap();

    let view = server.managed_objects();
    let entry = &view[&object_path!("/a/b")];
    assert_eq!(entry["org.Test"]["name"], Value::from("foo"));

    let added = drain(&mut rx);
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].name, "InterfacesAdded");
    assert_eq!(added[0].path, object_path!("/"));

    server.remove_object(&object_path!("/a/b"), false).unwrap();
    assert!(!server.managed_objects().contains_key(&object_path!("/a/b")));
    let removed = drain(&mut rx);
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].name, "InterfacesRemoved");
}

#[test]
fn test_introspection_is_stable() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(&root, "", "Ping", "", "", MethodBehavior::NoOp)
        .unwrap();
    server
        .add_property(&root, "", "Count", "u", Value::Int64(0), PropertyAccess::Read)
        .unwrap();
    server.add_signal(&root, "", "Tick", "t").unwrap();
    server
        .add_object(&object_path!("/child"), "org.example.Child", vec![], vec![])
        .unwrap();

    let first = server.introspect(&root).unwrap();
    let second = server.introspect(&root).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("<node name=\"child\" />"));

    server.remove_object(&object_path!("/child"), false).unwrap();
    let third = server.introspect(&root).unwrap();
    assert!(!third.contains("<node name=\"child\" />"));
    assert_eq!(third, server.introspect(&root).unwrap());
}

#[test]
fn test_behavior_fault_is_mock_raised() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(
            &root,
            "",
            "Fail",
            "",
            "",
            MethodBehavior::native(|ctx| {
                Err(ctx.helpers.fault("com.example.Error.NoGood", "no good"))
            }),
        )
        .unwrap();

    let err = server.invoke(&root, "", "Fail", vec![]).unwrap_err();
    let fault = err.fault();
    assert_eq!(fault.name, "com.example.Error.NoGood");
    assert_eq!(fault.message, "no good");
    // the call still counts as made
    assert_eq!(server.method_calls("Fail").len(), 1);
}

#[test]
fn test_behavior_errors_are_loud() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(
            &root,
            "",
            "Broken",
            "",
            "u",
            MethodBehavior::native(|ctx| {
                ctx.mock.get_property("", "Missing")?;
                Ok(None)
            }),
        )
        .unwrap();

    let err = server.invoke(&root, "", "Broken", vec![]).unwrap_err();
    assert!(matches!(err, Error::BehaviorError { .. }));
    assert_eq!(err.fault().name, "org.freedesktop.DBus.Error.Failed");
}

#[test]
fn test_behavior_can_mutate_server() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(
            &root,
            "",
            "Spawn",
            "s",
            "o",
            MethodBehavior::native(|ctx| {
                let name = ctx.args[0].as_str().unwrap_or("child");
                let path = format!("/{}", name);
                let child = ctx.mock.add_object(&path, "org.example.Child", vec![], vec![])?;
                child.emit_signal("", "Born", "", vec![])?;
                Ok(Some(Value::ObjectPath(path)))
            }),
        )
        .unwrap();

    let out = server
        .invoke(&root, "", "Spawn", vec![Value::from("kid")])
        .unwrap();
    assert_eq!(out, vec![Value::ObjectPath("/kid".to_string())]);
    assert!(server.contains(&object_path!("/kid")));

    let kinds: Vec<CallKind> = server.calls().iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![CallKind::Method, CallKind::Signal]);
}

#[test]
fn test_concurrent_calls_keep_entry_order() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(&root, "", "Do", "u", "", MethodBehavior::NoOp)
        .unwrap();

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let server = server.clone();
            thread::spawn(move || {
                for i in 0..50u32 {
                    server
                        .invoke(&object_path!("/"), "", "Do", vec![Value::UInt32(t * 1000 + i)])
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let calls = server.method_calls("Do");
    assert_eq!(calls.len(), 200);
    assert!(calls.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    for t in 0..4u32 {
        let seq: Vec<u32> = calls
            .iter()
            .filter_map(|r| match r.args[0] {
                Value::UInt32(v) if v / 1000 == t => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(seq.len(), 50);
        assert!(seq.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_handle_call_routes_standard_interfaces() {
    let server = ServerState::new().unwrap();
    server
        .handle_call(
            "/",
            MOCK_IFACE,
            "AddProperty",
            vec!["".into(), "Mode".into(), "s".into(), "auto".into()],
        )
        .unwrap();
    server
        .handle_call(
            "/",
            "org.freedesktop.DBus.Properties",
            "Set",
            vec!["".into(), "Mode".into(), Value::variant("manual")],
        )
        .unwrap();
    let got = server
        .handle_call(
            "/",
            "org.freedesktop.DBus.Properties",
            "Get",
            vec!["".into(), "Mode".into()],
        )
        .unwrap();
    assert_eq!(got, vec![Value::variant("manual")]);

    let xml = server
        .handle_call("/", "org.freedesktop.DBus.Introspectable", "Introspect", vec![])
        .unwrap();
    assert!(xml[0].as_str().unwrap().contains("<property name=\"Mode\" type=\"s\" access=\"readwrite\" />"));

    let err = server
        .handle_call("not/a/path", "org.example.A", "B", vec![])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPath { .. }));
}

#[tokio::test]
async fn test_signals_arrive_on_async_receiver() {
    let (server, mut rx) = server_with_channel();
    server
        .emit_signal(&object_path!("/"), "com.example.Clock", "Tick", "t", vec![Value::Int64(7)])
        .unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.name, "Tick");
    assert_eq!(event.args, vec![Value::UInt64(7)]);
}

struct Thermostat;

impl busmock_core::Template for Thermostat {
    fn name(&self) -> &str {
        "thermostat"
    }

    fn bus_name(&self) -> &str {
        "com.example.Thermostat"
    }

    fn main_interface(&self) -> &str {
        "com.example.Thermostat"
    }

    fn load(
        &self,
        mock: &busmock_core::MockHandle,
        parameters: &busmock_core::Parameters,
    ) -> busmock_core::Result<()> {
        let target = parameters
            .get("Target")
            .cloned()
            .unwrap_or(Value::Double(20.0));
        mock.add_properties(
            "com.example.Thermostat",
            vec![("Target".to_string(), target)],
        )?;
        mock.add_method(
            "com.example.Thermostat",
            "Boost",
            "",
            "",
            MethodBehavior::native(|ctx| {
                ctx.mock
                    .set_property("com.example.Thermostat", "Target", Value::Double(25.0))?;
                Ok(None)
            }),
        )
    }
}

#[test]
fn test_template_is_reapplied_on_reset() {
    let server = ServerState::builder().template(Thermostat).build().unwrap();
    let root = object_path!("/");
    server
        .handle_call(
            "/",
            MOCK_IFACE,
            "AddTemplate",
            vec![
                "thermostat".into(),
                Value::string_dict(btree! { "Target" => Value::Double(18.5) }),
            ],
        )
        .unwrap();
    assert_eq!(
        server
            .get_property(&root, "com.example.Thermostat", "Target")
            .unwrap(),
        Value::Double(18.5)
    );

    server
        .invoke(&root, "com.example.Thermostat", "Boost", vec![])
        .unwrap();
    assert_eq!(
        server
            .get_property(&root, "com.example.Thermostat", "Target")
            .unwrap(),
        Value::Double(25.0)
    );

    server
        .add_object(&object_path!("/extra"), "org.example.Extra", vec![], vec![])
        .unwrap();
    server.reset().unwrap();
    assert_eq!(server.objects(), vec![root.clone()]);
    assert_eq!(
        server
            .get_property(&root, "com.example.Thermostat", "Target")
            .unwrap(),
        Value::Double(18.5)
    );
}

#[test]
fn test_unknown_template() {
    let server = ServerState::new().unwrap();
    let err = server
        .handle_call(
            "/",
            MOCK_IFACE,
            "AddTemplate",
            vec!["nope".into(), Value::Dict(vec![])],
        )
        .unwrap_err();
    assert_eq!(err.fault().name, "org.freedesktop.DBus.Mock.TemplateError");
}

#[test]
fn test_removing_manager_root_stops_the_manager() {
    let (transport, mut rx) = ChannelTransport::new();
    let server = ServerState::builder()
        .config(ServerConfig {
            main_path: "/m".to_string(),
            object_manager: true,
            ..ServerConfig::default()
        })
        .transport(transport)
        .build()
        .unwrap();
    server
        .add_object(&object_path!("/m/a"), "org.example.Thing", vec![], vec![])
        .unwrap();
    server.remove_object(&object_path!("/m"), true).unwrap();
    assert!(server.objects().is_empty());
    assert_eq!(server.object_manager_root(), None);

    let err = server
        .handle_call(
            "/m",
            "org.freedesktop.DBus.ObjectManager",
            "GetManagedObjects",
            vec![],
        )
        .unwrap_err();
    assert_eq!(err, Error::NotFound("/m".to_string()));

    drain(&mut rx);
    server
        .add_object(&object_path!("/m/b"), "org.example.Thing", vec![], vec![])
        .unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_template_method_shadows_control_method() {
    let server = ServerState::new().unwrap();
    let root = object_path!("/");
    server
        .add_method(
            &root,
            MOCK_IFACE,
            "ClearCalls",
            "",
            "s",
            MethodBehavior::native(|_| Ok(Some(Value::from("kept")))),
        )
        .unwrap();
    let out = server
        .handle_call("/", MOCK_IFACE, "ClearCalls", vec![])
        .unwrap();
    assert_eq!(out, vec![Value::from("kept")]);
    assert_eq!(server.method_calls("ClearCalls").len(), 1);
}
