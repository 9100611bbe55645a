//! # busmock
//!
//! A programmable stand-in server for bus services. The mock's shape is
//! driven at runtime through the `org.freedesktop.DBus.Mock` control
//! interface or built from a template; method code is Lua.
//!
//! ## Usage
//!
//! ```bash
//! # Empty mock with one object
//! busmock com.example.Foo / com.example.Foo.Manager
//!
//! # Built-in template with parameters
//! busmock -t power_profiles_daemon -p '{"ActiveProfile": "performance"}'
//! ```
//!
//! Calls arrive as JSON lines on stdin; see [`stdio`].

pub mod cli;
pub mod stdio;
pub mod templates;

use std::io::BufRead;

use busmock_core::ServerState;
use busmock_lua::LuaEvaluator;
use tracing::info;

pub use cli::{Args, CliError};

/// Build a server for `args` that reports signals to `out`.
pub fn build_server(args: &Args, out: &stdio::SharedWriter) -> Result<ServerState, CliError> {
    let templates = templates::builtin();
    let config = args.server_config(&templates)?;
    info!(
        "serving {} on the {} bus at {}",
        config.bus_name.as_deref().unwrap_or("(unnamed)"),
        if config.system_bus { "system" } else { "session" },
        config.main_path
    );
    let server = ServerState::builder()
        .config(config)
        .templates(templates)
        .transport(stdio::StdioTransport::new(out.clone()))
        .evaluator(LuaEvaluator::new()?)
        .build()?;
    Ok(server)
}

/// Serve `input` until it ends.
pub fn run(args: &Args, input: impl BufRead, out: stdio::SharedWriter) -> Result<(), CliError> {
    let server = build_server(args, &out)?;
    stdio::serve(&server, input, &out)?;
    info!("input closed with {} call records", server.call_log().len());
    Ok(())
}
