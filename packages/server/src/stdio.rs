//! JSON-lines transport over stdin/stdout.
//!
//! Each input line is one call:
//!
//! ```text
//! {"path": "/", "interface": "org.example.Calc", "member": "Add", "args": [2, 3]}
//! ```
//!
//! and produces one output line, `{"reply": [...]}` or
//! `{"error": {"name": ..., "message": ...}}`. Signals are interleaved as
//! `{"signal": {...}}` lines in emission order.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use busmock_core::{Fault, ServerState, SignalEvent, Transport, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Output shared by replies and signals.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn shared(writer: impl Write + Send + 'static) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(writer)))
}

#[derive(Debug, Deserialize)]
pub struct Request {
    pub path: String,
    #[serde(default)]
    pub interface: String,
    pub member: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    Reply(Vec<serde_json::Value>),
    Error(Fault),
}

#[derive(Serialize)]
struct SignalLine<'a> {
    signal: &'a SignalEvent,
}

/// Writes every emitted signal as a JSON line.
pub struct StdioTransport {
    out: SharedWriter,
}

impl StdioTransport {
    pub fn new(out: SharedWriter) -> Self {
        Self { out }
    }
}

impl Transport for StdioTransport {
    fn send(&self, event: &SignalEvent) {
        if let Err(e) = write_line(&self.out, &SignalLine { signal: event }) {
            warn!("cannot write signal {}: {}", event.name, e);
        }
    }
}

fn write_line(out: &SharedWriter, item: &impl Serialize) -> std::io::Result<()> {
    let line = serde_json::to_string(item)?;
    let mut out = out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    writeln!(out, "{}", line)?;
    out.flush()
}

/// Answer one request.
pub fn respond(server: &ServerState, request: Request) -> Response {
    let args = request.args.iter().map(Value::from_json).collect();
    match server.handle_call(&request.path, &request.interface, &request.member, args) {
        Ok(values) => Response::Reply(values.iter().map(Value::to_json).collect()),
        Err(e) => Response::Error(e.fault()),
    }
}

/// Serve requests until the input ends.
pub fn serve(server: &ServerState, input: impl BufRead, out: &SharedWriter) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => respond(server, request),
            Err(e) => {
                debug!("malformed request: {}", line);
                Response::Error(Fault {
                    name: "org.freedesktop.DBus.Error.InvalidArgs".to_string(),
                    message: format!("malformed request: {}", e),
                })
            }
        };
        write_line(out, &response)?;
    }
    Ok(())
}
