//! Built-in service templates.

mod low_memory_monitor;
mod power_profiles_daemon;

use busmock_core::TemplateRegistry;

pub use low_memory_monitor::LowMemoryMonitor;
pub use power_profiles_daemon::PowerProfilesDaemon;

/// Every template shipped with the binary.
pub fn builtin() -> TemplateRegistry {
    let mut templates = TemplateRegistry::new();
    templates.register(LowMemoryMonitor);
    templates.register(PowerProfilesDaemon);
    templates
}
