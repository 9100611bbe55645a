//! Command-line arguments and how they become a [`ServerConfig`].

use std::path::PathBuf;

use busmock_core::{ConfigError, ServerConfig, TemplateRegistry};
use clap::Parser;

/// busmock - programmable stand-in for a bus service
#[derive(Parser, Debug)]
#[command(name = "busmock")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Bus name to claim
    pub name: Option<String>,

    /// Path of the main object
    pub path: Option<String>,

    /// Primary interface of the main object
    pub interface: Option<String>,

    /// Load a built-in template instead of NAME PATH INTERFACE
    #[arg(short, long, conflicts_with_all = ["name", "path", "interface"])]
    pub template: Option<String>,

    /// Template parameters as a JSON object
    #[arg(short, long)]
    pub parameters: Option<String>,

    /// Serve org.freedesktop.DBus.ObjectManager on the main object
    #[arg(short = 'm', long)]
    pub object_manager: bool,

    /// Put the service on the system bus
    #[arg(long)]
    pub system: bool,

    /// JSON config file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid template parameters: {0}")]
    Parameters(String),

    #[error(transparent)]
    Engine(#[from] busmock_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Args {
    /// Merge the config file, the selected template and the flags.
    pub fn server_config(&self, templates: &TemplateRegistry) -> Result<ServerConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(name) = &self.template {
            let template = templates.get(name)?;
            config.apply_template(template.as_ref());
        } else {
            match (&self.name, &self.path, &self.interface) {
                (Some(name), Some(path), Some(interface)) => {
                    config.bus_name = Some(name.clone());
                    config.main_path = path.clone();
                    config.main_interface = interface.clone();
                }
                (None, None, None) if self.config.is_some() => {}
                _ => {
                    return Err(CliError::Usage(
                        "NAME, PATH and INTERFACE are required unless --template or --config is given"
                            .to_string(),
                    ))
                }
            }
        }

        if let Some(text) = &self.parameters {
            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| CliError::Parameters(e.to_string()))?;
            let serde_json::Value::Object(map) = parsed else {
                return Err(CliError::Parameters("expected a JSON object".to_string()));
            };
            config.parameters.extend(map);
        }

        config.object_manager |= self.object_manager;
        config.system_bus |= self.system;
        Ok(config)
    }
}
