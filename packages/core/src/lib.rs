//! busmock core: the dynamic remote-object engine
//!
//! An in-memory model of the objects a bus service exposes, driven
//! entirely at runtime:
//! - `ServerState`: one server instance; owns the registry, the call log
//!   and the transport
//! - `MockObject`: a path carrying interfaces with methods, properties and
//!   signals
//! - `Behavior`: what runs when a mocked method is called
//! - `Value` / `Signature`: loosely typed values coerced against bus type
//!   signatures
//!
//! Wire marshalling is left to the transport; the engine hands it
//! `SignalEvent`s and returns typed reply tuples or `Fault`s.
//!
//! # Example
//!
//! ```rust
//! use busmock_core::{object_path, MethodBehavior, ServerState, Value};
//!
//! let server = ServerState::new().unwrap();
//! let root = object_path!("/");
//! server
//!     .add_method(&root, "com.example.Calc", "Add", "ii", "i",
//!         MethodBehavior::native(|ctx| {
//!             let sum = ctx.args[0].as_integer().unwrap_or(0) + ctx.args[1].as_integer().unwrap_or(0);
//!             Ok(Some(Value::Int64(sum as i64)))
//!         }))
//!     .unwrap();
//!
//! let out = server
//!     .invoke(&root, "com.example.Calc", "Add", vec![Value::Int64(2), Value::Int64(3)])
//!     .unwrap();
//! assert_eq!(out, vec![Value::Int32(5)]);
//! ```

mod behavior;
mod call_log;
pub mod config;
mod control;
mod emitter;
mod error;
mod handle;
mod introspect;
mod manager;
pub mod names;
mod notify;
mod object;
mod path;
mod registry;
mod signature;
mod state;
mod template;
mod value;

pub use behavior::{Behavior, CallContext, Helpers, MethodBehavior, SnippetEvaluator};
pub use call_log::{CallKind, CallLog, CallRecord};
pub use config::{ConfigError, ServerConfig};
pub use control::{CONTROL_METHODS, CONTROL_SIGNALS};
pub use emitter::{emit, ChannelTransport, NullTransport, SignalEvent, Transport};
pub use error::{Error, Fault, Result};
pub use handle::MockHandle;
pub use introspect::render as render_introspection;
pub use manager::ObjectManager;
pub use notify::{InterfaceSnapshot, Notification};
pub use object::{InterfaceState, MethodSpec, MockObject, PropertyAccess, PropertySlot, SignalSpec};
pub use path::ObjectPath;
pub use registry::Registry;
pub use signature::{Signature, Type};
pub use state::{MethodDef, ServerBuilder, ServerState};
pub use template::{Parameters, Template, TemplateRegistry};
pub use value::{format_args, Value};
