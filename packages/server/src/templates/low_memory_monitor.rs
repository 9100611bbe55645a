//! low-memory-monitor (2.0 API).

use busmock_core::names::MOCK_IFACE;
use busmock_core::{MethodBehavior, MockHandle, Parameters, Result, Template, Value};

pub const BUS_NAME: &str = "org.freedesktop.LowMemoryMonitor";
pub const MAIN_PATH: &str = "/org/freedesktop/LowMemoryMonitor";
pub const MAIN_IFACE: &str = "org.freedesktop.LowMemoryMonitor";

pub struct LowMemoryMonitor;

impl Template for LowMemoryMonitor {
    fn name(&self) -> &str {
        "low_memory_monitor"
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

    fn load(&self, mock: &MockHandle, _parameters: &Parameters) -> Result<()> {
        mock.add_signal(MAIN_IFACE, "LowMemoryWarning", "y")?;
        // test-side trigger, so it lives on the control interface
        mock.add_method(
            MOCK_IFACE,
            "EmitWarning",
            "y",
            "",
            MethodBehavior::native(|ctx| {
                let level = ctx.args.first().cloned().unwrap_or(Value::Byte(0));
                ctx.mock
                    .emit_signal(MAIN_IFACE, "LowMemoryWarning", "y", vec![level])?;
                Ok(None)
            }),
        )
    }
}
