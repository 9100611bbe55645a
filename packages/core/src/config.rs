//! Server configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::template::Template;
use crate::value::Value;

pub const DEFAULT_MAIN_PATH: &str = "/";
pub const DEFAULT_MAIN_INTERFACE: &str = "org.freedesktop.Test.Main";

/// Everything needed to bring up one mock server.
///
/// Unset fields take their defaults, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Well-known bus name the transport claims.
    pub bus_name: Option<String>,
    /// Path of the main object.
    pub main_path: String,
    /// Primary interface of the main object.
    pub main_interface: String,
    /// Serve the object manager on the main object.
    pub object_manager: bool,
    /// Use the system bus instead of the session bus.
    pub system_bus: bool,
    /// Template applied to the main object at startup.
    pub template: Option<String>,
    /// Template parameters.
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bus_name: None,
            main_path: DEFAULT_MAIN_PATH.to_string(),
            main_interface: DEFAULT_MAIN_INTERFACE.to_string(),
            object_manager: false,
            system_bus: false,
            template: None,
            parameters: BTreeMap::new(),
        }
    }
}

/// Errors from loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl ServerConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Take bus name, main object and bus flags from a template.
    pub fn apply_template(&mut self, template: &dyn Template) {
        self.template = Some(template.name().to_string());
        self.bus_name = Some(template.bus_name().to_string());
        self.main_path = template.main_path().to_string();
        self.main_interface = template.main_interface().to_string();
        self.system_bus = template.system_bus();
        self.object_manager = template.object_manager();
    }

    /// Template parameters as loosely typed values.
    pub fn parameter_values(&self) -> BTreeMap<String, Value> {
        self.parameters
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()
    }
}
