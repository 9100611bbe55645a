//! Introspection document rendering.
//!
//! Output is a pure function of the object's interface map, its child
//! nodes and whether it is the object manager root. Interface, method,
//! property and signal maps are all ordered, so unchanged state always
//! renders byte-identically.

use std::fmt::Write;

use crate::control::{CONTROL_METHODS, CONTROL_SIGNALS};
use crate::names::{INTROSPECTABLE_IFACE, MOCK_IFACE, OBJECT_MANAGER_IFACE, PROPERTIES_IFACE};
use crate::object::{InterfaceState, MockObject};
use crate::signature::Signature;

const DOCTYPE: &str = "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n";

/// (name, in, out) of a method served by the engine.
type Fixed = (&'static str, &'static str, &'static str);

const INTROSPECTABLE_METHODS: &[Fixed] = &[("Introspect", "", "s")];

const PROPERTIES_METHODS: &[Fixed] = &[
    ("Get", "ss", "v"),
    ("GetAll", "s", "a{sv}"),
    ("Set", "ssv", ""),
];

const PROPERTIES_SIGNALS: &[(&str, &str)] = &[("PropertiesChanged", "sa{sv}as")];

const OBJECT_MANAGER_METHODS: &[Fixed] = &[("GetManagedObjects", "", "a{oa{sa{sv}}}")];

const OBJECT_MANAGER_SIGNALS: &[(&str, &str)] = &[
    ("InterfacesAdded", "oa{sa{sv}}"),
    ("InterfacesRemoved", "oas"),
];

/// Render the introspection document of `object`.
pub fn render(object: &MockObject, children: &[String], manager_root: bool) -> String {
    let mut xml = String::from(DOCTYPE);
    let _ = writeln!(xml, "<node name=\"{}\">", object.path());

    let user = |name: &str| object.interfaces().get(name);
    fixed_interface(&mut xml, INTROSPECTABLE_IFACE, INTROSPECTABLE_METHODS, &[], None);
    fixed_interface(
        &mut xml,
        PROPERTIES_IFACE,
        PROPERTIES_METHODS,
        PROPERTIES_SIGNALS,
        None,
    );
    // templates may add their own control methods
    fixed_interface(
        &mut xml,
        MOCK_IFACE,
        CONTROL_METHODS,
        CONTROL_SIGNALS,
        user(MOCK_IFACE),
    );
    if manager_root {
        fixed_interface(
            &mut xml,
            OBJECT_MANAGER_IFACE,
            OBJECT_MANAGER_METHODS,
            OBJECT_MANAGER_SIGNALS,
            user(OBJECT_MANAGER_IFACE),
        );
    }

    for (name, state) in object.interfaces() {
        let served = matches!(
            name.as_str(),
            MOCK_IFACE | PROPERTIES_IFACE | INTROSPECTABLE_IFACE
        ) || (manager_root && name == OBJECT_MANAGER_IFACE);
        if served {
            continue;
        }
        let _ = writeln!(xml, "  <interface name=\"{}\">", name);
        members(&mut xml, state);
        xml.push_str("  </interface>\n");
    }

    for child in children {
        let _ = writeln!(xml, "  <node name=\"{}\" />", child);
    }
    xml.push_str("</node>\n");
    xml
}

fn fixed_interface(
    xml: &mut String,
    name: &str,
    methods: &[Fixed],
    signals: &[(&str, &str)],
    extra: Option<&InterfaceState>,
) {
    let _ = writeln!(xml, "  <interface name=\"{}\">", name);
    // user members replace built-in ones of the same name
    let user_method = |m: &str| extra.is_some_and(|state| state.methods.contains_key(m));
    let user_signal = |s: &str| extra.is_some_and(|state| state.signals.contains_key(s));
    for (method, in_sig, out_sig) in methods {
        if !user_method(*method) {
            method_element(xml, method, in_sig, out_sig);
        }
    }
    for (signal, sig) in signals {
        if !user_signal(*signal) {
            signal_element(xml, signal, sig);
        }
    }
    if let Some(state) = extra {
        members(xml, state);
    }
    xml.push_str("  </interface>\n");
}

fn members(xml: &mut String, state: &InterfaceState) {
    for (method, spec) in &state.methods {
        method_element(
            xml,
            method,
            &spec.in_signature.to_string(),
            &spec.out_signature.to_string(),
        );
    }
    for (property, slot) in &state.properties {
        let _ = writeln!(
            xml,
            "    <property name=\"{}\" type=\"{}\" access=\"{}\" />",
            property, slot.ty, slot.access
        );
    }
    for (signal, spec) in &state.signals {
        signal_element(xml, signal, &spec.signature.to_string());
    }
}

fn method_element(xml: &mut String, name: &str, in_sig: &str, out_sig: &str) {
    let args_in = split(in_sig);
    let args_out = split(out_sig);
    if args_in.is_empty() && args_out.is_empty() {
        let _ = writeln!(xml, "    <method name=\"{}\" />", name);
        return;
    }
    let _ = writeln!(xml, "    <method name=\"{}\">", name);
    for ty in args_in {
        let _ = writeln!(xml, "      <arg direction=\"in\" type=\"{}\" />", ty);
    }
    for ty in args_out {
        let _ = writeln!(xml, "      <arg direction=\"out\" type=\"{}\" />", ty);
    }
    xml.push_str("    </method>\n");
}

fn signal_element(xml: &mut String, name: &str, sig: &str) {
    let args = split(sig);
    if args.is_empty() {
        let _ = writeln!(xml, "    <signal name=\"{}\" />", name);
        return;
    }
    let _ = writeln!(xml, "    <signal name=\"{}\">", name);
    for ty in args {
        let _ = writeln!(xml, "      <arg type=\"{}\" />", ty);
    }
    xml.push_str("    </signal>\n");
}

/// One string per complete type; signatures here were validated on entry.
fn split(sig: &str) -> Vec<String> {
    Signature::parse(sig)
        .map(|s| s.types().iter().map(ToString::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::MethodBehavior;
    use crate::object::{MethodSpec, PropertyAccess, PropertySlot};
    use crate::object_path;
    use crate::value::Value;
    use proptest::prelude::*;

    fn sample() -> MockObject {
        let mut obj = MockObject::new(object_path!("/org/example"), "org.example.Main").unwrap();
        obj.add_method("", "Add", MethodSpec::new("ii", "i", MethodBehavior::NoOp).unwrap())
            .unwrap();
        obj.add_method("", "Ping", MethodSpec::new("", "", MethodBehavior::NoOp).unwrap())
            .unwrap();
        obj.add_property("", "OnBattery", PropertySlot::guessed(Value::Bool(true), PropertyAccess::Read))
            .unwrap();
        obj.add_signal("org.example.Other", "Changed", "sa{sv}").unwrap();
        obj
    }

    #[test]
    fn renders_user_interfaces() {
        let xml = render(&sample(), &[], false);
        assert!(xml.starts_with("<!DOCTYPE node"));
        assert!(xml.contains("<node name=\"/org/example\">"));
        assert!(xml.contains("<interface name=\"org.example.Main\">"));
        assert!(xml.contains(
            "    <method name=\"Add\">\n      <arg direction=\"in\" type=\"i\" />\n      <arg direction=\"in\" type=\"i\" />\n      <arg direction=\"out\" type=\"i\" />\n    </method>\n"
        ));
        assert!(xml.contains("<method name=\"Ping\" />"));
        assert!(xml.contains("<property name=\"OnBattery\" type=\"b\" access=\"read\" />"));
        assert!(xml.contains("<signal name=\"Changed\">\n      <arg type=\"s\" />\n      <arg type=\"a{sv}\" />"));
        assert!(xml.contains("<interface name=\"org.freedesktop.DBus.Mock\">"));
        assert!(!xml.contains(OBJECT_MANAGER_IFACE));
    }

    #[test]
    fn sorted_regardless_of_insertion_order() {
        let mut a = MockObject::new(object_path!("/"), "org.example.Main").unwrap();
        let mut b = a.clone();
        for name in ["Zed", "Alpha", "Mid"] {
            a.add_method("", name, MethodSpec::new("", "", MethodBehavior::NoOp).unwrap())
                .unwrap();
        }
        for name in ["Mid", "Zed", "Alpha"] {
            b.add_method("", name, MethodSpec::new("", "", MethodBehavior::NoOp).unwrap())
                .unwrap();
        }
        assert_eq!(render(&a, &[], false), render(&b, &[], false));
        let xml = render(&a, &[], false);
        let alpha = xml.find("Alpha").unwrap();
        let zed = xml.find("Zed").unwrap();
        assert!(alpha < zed);
    }

    #[test]
    fn children_and_manager() {
        let xml = render(&sample(), &["Thing1".to_string(), "Thing2".to_string()], true);
        assert!(xml.contains("<interface name=\"org.freedesktop.DBus.ObjectManager\">"));
        assert!(xml.contains("<method name=\"GetManagedObjects\">"));
        assert!(xml.contains("  <node name=\"Thing1\" />\n  <node name=\"Thing2\" />\n</node>\n"));
    }

    #[test]
    fn template_control_methods_join_mock_interface() {
        let mut obj = sample();
        obj.add_method(MOCK_IFACE, "EmitWarning", MethodSpec::new("y", "", MethodBehavior::NoOp).unwrap())
            .unwrap();
        let xml = render(&obj, &[], false);
        assert_eq!(xml.matches("<interface name=\"org.freedesktop.DBus.Mock\">").count(), 1);
        let mock = xml.find("<interface name=\"org.freedesktop.DBus.Mock\">").unwrap();
        let warning = xml.find("<method name=\"EmitWarning\">").unwrap();
        assert!(warning > mock);
    }

    #[test]
    fn user_members_merge_into_served_interfaces() {
        let mut obj = sample();
        obj.add_method(MOCK_IFACE, "Reset", MethodSpec::new("b", "", MethodBehavior::NoOp).unwrap())
            .unwrap();
        obj.add_method(
            OBJECT_MANAGER_IFACE,
            "Rescan",
            MethodSpec::new("", "", MethodBehavior::NoOp).unwrap(),
        )
        .unwrap();
        let xml = render(&obj, &[], true);
        assert_eq!(xml.matches("<method name=\"Reset\"").count(), 1);
        assert!(xml.contains(
            "    <method name=\"Reset\">\n      <arg direction=\"in\" type=\"b\" />\n    </method>\n"
        ));
        assert_eq!(xml.matches("<interface name=\"org.freedesktop.DBus.ObjectManager\">").count(), 1);
        assert!(xml.contains("<method name=\"Rescan\" />"));
        assert!(xml.contains("<method name=\"GetManagedObjects\">"));
    }

    proptest! {
        #[test]
        fn render_ignores_insertion_order(
            names in prop::collection::btree_set("[A-Z][a-z]{1,8}", 1..8)
                .prop_map(|set| set.into_iter().collect::<Vec<_>>())
                .prop_shuffle()
        ) {
            let mut shuffled = MockObject::new(object_path!("/"), "org.example.Main").unwrap();
            let mut sorted = shuffled.clone();
            for name in &names {
                shuffled
                    .add_method("", name, MethodSpec::new("s", "", MethodBehavior::NoOp).unwrap())
                    .unwrap();
            }
            let mut ordered = names.clone();
            ordered.sort();
            for name in &ordered {
                sorted
                    .add_method("", name, MethodSpec::new("s", "", MethodBehavior::NoOp).unwrap())
                    .unwrap();
            }
            prop_assert_eq!(render(&shuffled, &[], false), render(&sorted, &[], false));
        }
    }
}
