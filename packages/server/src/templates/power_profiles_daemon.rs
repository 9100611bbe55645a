//! power-profiles-daemon (non-deprecated API as of 0.9).
//!
//! Parameters: `ActiveProfile` (default `balanced`) and
//! `PerformanceDegraded` (default empty).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use busmock_core::{
    MethodBehavior, MockHandle, Parameters, PropertyAccess, Result, Template, Value,
};

pub const BUS_NAME: &str = "net.hadess.PowerProfiles";
pub const MAIN_PATH: &str = "/net/hadess/PowerProfiles";
pub const MAIN_IFACE: &str = "net.hadess.PowerProfiles";

const PROFILES: &[&str] = &["power-saver", "balanced", "performance"];

pub struct PowerProfilesDaemon;

/// Profile holds by cookie; each load starts afresh.
#[derive(Default)]
struct Holds {
    cookie: u32,
    active: BTreeMap<u32, Value>,
}

impl Holds {
    fn property(&self) -> Value {
        Value::Array(self.active.values().cloned().collect())
    }
}

impl Template for PowerProfilesDaemon {
    fn name(&self) -> &str {
        "power_profiles_daemon"
    }

    fn bus_name(&self) -> &str {
        BUS_NAME
    }

    fn main_path(&self) -> &str {
        MAIN_PATH
    }

    fn main_interface(&self) -> &str {
        MAIN_IFACE
    }

    fn system_bus(&self) -> bool {
        true
    }

    fn load(&self, mock: &MockHandle, parameters: &Parameters) -> Result<()> {
        let param = |name: &str, default: &str| {
            parameters
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::from(default))
        };
        let profiles = PROFILES
            .iter()
            .map(|profile| {
                Value::string_dict([
                    ("Profile", Value::from(*profile)),
                    ("Driver", Value::from("dbusmock")),
                ])
            })
            .collect::<Vec<_>>();

        let add = |name: &str, signature: &str, value: Value| {
            mock.server().add_property(
                mock.path(),
                MAIN_IFACE,
                name,
                signature,
                value,
                PropertyAccess::ReadWrite,
            )
        };
        add("ActiveProfile", "s", param("ActiveProfile", "balanced"))?;
        add("PerformanceDegraded", "s", param("PerformanceDegraded", ""))?;
        add("Profiles", "aa{sv}", Value::Array(profiles))?;
        add("Actions", "as", Value::Array(vec![]))?;
        add("ActiveProfileHolds", "aa{sv}", Value::Array(vec![]))?;

        let holds = Arc::new(Mutex::new(Holds::default()));

        let state = Arc::clone(&holds);
        mock.add_method(
            MAIN_IFACE,
            "HoldProfile",
            "sss",
            "u",
            MethodBehavior::native(move |ctx| {
                let (cookie, property) = {
                    let mut holds = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    holds.cookie += 1;
                    let cookie = holds.cookie;
                    let hold = Value::string_dict([
                        ("Profile", ctx.args[0].clone()),
                        ("Reason", ctx.args[1].clone()),
                        ("ApplicationId", ctx.args[2].clone()),
                    ]);
                    holds.active.insert(cookie, hold);
                    (cookie, holds.property())
                };
                ctx.mock.set_property(MAIN_IFACE, "ActiveProfileHolds", property)?;
                Ok(Some(Value::UInt32(cookie)))
            }),
        )?;

        let state = holds;
        mock.add_method(
            MAIN_IFACE,
            "ReleaseProfile",
            "u",
            "",
            MethodBehavior::native(move |ctx| {
                let cookie = ctx.args[0].as_integer().unwrap_or_default();
                let property = {
                    let mut holds = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    let released = u32::try_from(cookie)
                        .ok()
                        .and_then(|cookie| holds.active.remove(&cookie));
                    if released.is_none() {
                        return Err(ctx.helpers.fault(
                            "org.freedesktop.DBus.Error.InvalidArgs",
                            format!("no hold with cookie {}", cookie),
                        ));
                    }
                    holds.property()
                };
                ctx.mock.set_property(MAIN_IFACE, "ActiveProfileHolds", property)?;
                Ok(None)
            }),
        )
    }
}
