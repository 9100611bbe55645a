//! Lua method behaviors for busmock.
//!
//! Install a [`LuaEvaluator`] on a server and method code given as text
//! (through `AddMethod`, `AddObject`, templates or the API) is compiled to
//! Lua. A snippet sees:
//!
//! - `args`: the call arguments, 1-based
//! - `mock`: the owning object (`get_property`, `set_property`,
//!   `update_properties`, `add_property`, `add_method`, `add_object`,
//!   `remove_object`, `emit_signal`, `objects`, `path`)
//! - `helpers`: `time()` and `fault(name, message)`
//! - `state`: a table kept across calls
//!
//! The result is the chunk's return value, or the global `ret` when the
//! chunk returns nothing.
//!
//! ```rust
//! use busmock_core::{object_path, ServerState, Value};
//! use busmock_lua::LuaEvaluator;
//!
//! let server = ServerState::builder()
//!     .evaluator(LuaEvaluator::new().unwrap())
//!     .build()
//!     .unwrap();
//! let root = object_path!("/");
//! let behavior = server.compile("Greet", "return 'hello ' .. args[1]").unwrap();
//! server.add_method(&root, "com.example.Greeter", "Greet", "s", "s", behavior).unwrap();
//! let out = server.invoke(&root, "com.example.Greeter", "Greet", vec!["bus".into()]).unwrap();
//! assert_eq!(out, vec![Value::from("hello bus")]);
//! ```

mod convert;
mod env;
mod evaluator;

pub use convert::{from_lua, to_lua};
pub use evaluator::LuaEvaluator;
