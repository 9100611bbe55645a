//! Signal emitter and the outbound half of the transport boundary.
//!
//! Every signal leaves the engine through [`emit`], which records it in the
//! call log and then hands it to the installed [`Transport`]. Callers hold
//! the registry lock across `emit`, so delivery order equals mutation order.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use crate::call_log::{CallKind, CallLog};
use crate::path::ObjectPath;
use crate::value::{format_args, Value};

/// An outbound signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvent {
    #[serde(serialize_with = "serialize_path")]
    pub path: ObjectPath,
    pub interface: String,
    pub name: String,
    pub args: Vec<Value>,
    /// Unicast target; `None` broadcasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

fn serialize_path<S: serde::Serializer>(path: &ObjectPath, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(path)
}

impl SignalEvent {
    pub fn new(
        path: ObjectPath,
        interface: impl Into<String>,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        SignalEvent {
            path,
            interface: interface.into(),
            name: name.into(),
            args,
            destination: None,
        }
    }

    pub fn with_destination(mut self, destination: Option<String>) -> Self {
        self.destination = destination;
        self
    }
}

/// Delivers signals to clients.
///
/// Implementations must not call back into the server; `send` runs while
/// the server holds its registry lock.
pub trait Transport: Send + Sync {
    fn send(&self, event: &SignalEvent);
}

/// Drops every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, _event: &SignalEvent) {}
}

/// Forwards signals into a tokio channel.
///
/// The receiving half can be drained from sync code with `try_recv` or
/// awaited from async code with `recv`.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<SignalEvent>,
}

impl ChannelTransport {
    /// Create a transport and the receiver its signals arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelTransport { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, event: &SignalEvent) {
        // a closed receiver only means nobody is listening any more
        let _ = self.tx.send(event.clone());
    }
}

/// Record a signal in the call log, then deliver it.
pub fn emit(log: &CallLog, transport: &dyn Transport, event: &SignalEvent) {
    info!(
        target: "busmock::calls",
        "emit {} {}.{}{}",
        event.path,
        event.interface,
        event.name,
        format_args(&event.args)
    );
    log.append(
        CallKind::Signal,
        &event.path,
        &event.interface,
        &event.name,
        event.args.clone(),
    );
    transport.send(event);
}

/// Deliver a signal without recording it.
pub(crate) fn send_unlogged(transport: &dyn Transport, event: &SignalEvent) {
    transport.send(event);
}
