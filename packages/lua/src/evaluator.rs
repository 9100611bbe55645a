use std::sync::Arc;

use busmock_core::{Behavior, CallContext, Error, Result, SnippetEvaluator, Value};
use mlua::{Function, Lua, RegistryKey, Table};
use tracing::debug;

use crate::{convert, env};

/// Compiles method code into Lua behaviors.
///
/// All behaviors compiled by one evaluator share a single VM and one
/// persistent `state` table, so methods of the same mock can hand data to
/// each other across calls. An evaluator belongs to exactly one server.
pub struct LuaEvaluator {
    shared: Arc<Shared>,
}

struct Shared {
    lua: Lua,
    state: RegistryKey,
}

impl LuaEvaluator {
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        let state = lua
            .create_table()
            .and_then(|table| lua.create_registry_value(table))
            .map_err(|e| setup_error(&e))?;
        Ok(Self {
            shared: Arc::new(Shared { lua, state }),
        })
    }
}

impl std::fmt::Debug for LuaEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaEvaluator").finish_non_exhaustive()
    }
}

impl SnippetEvaluator for LuaEvaluator {
    fn compile(&self, member: &str, source: &str) -> Result<Arc<dyn Behavior>> {
        let lua = &self.shared.lua;
        let failed = |e: mlua::Error| Error::BehaviorError {
            member: member.to_string(),
            message: format_lua_error(&e),
        };
        // the environment is the chunk's first argument; same line keeps
        // error positions aligned with the source
        let function = lua
            .load(format!("local _ENV = ...; {}", source))
            .set_name(chunk_name(member))
            .into_function()
            .map_err(failed)?;
        let function = lua.create_registry_value(function).map_err(failed)?;
        debug!("compiled behavior of {}", member);
        Ok(Arc::new(LuaBehavior {
            shared: Arc::clone(&self.shared),
            member: member.to_string(),
            function,
        }))
    }
}

struct LuaBehavior {
    shared: Arc<Shared>,
    member: String,
    function: RegistryKey,
}

impl LuaBehavior {
    fn run(&self, ctx: &CallContext) -> mlua::Result<Option<Value>> {
        let lua = &self.shared.lua;
        let function: Function = lua.registry_value(&self.function)?;
        let state: Table = lua.registry_value(&self.shared.state)?;
        let env = env::build(lua, ctx, state)?;
        let returned: mlua::Value = function.call(env.clone())?;
        // an explicit return wins over an assigned `ret`
        let result = if returned.is_nil() {
            env.get::<mlua::Value>("ret")?
        } else {
            returned
        };
        convert::from_lua(result)
    }
}

impl Behavior for LuaBehavior {
    fn evaluate(&self, ctx: &CallContext) -> Result<Option<Value>> {
        let outcome = self.run(ctx);
        if let Err(e) = self.shared.lua.gc_collect() {
            debug!("lua gc failed: {}", e);
        }
        outcome.map_err(|e| match engine_error(&e) {
            Some(inner) => inner,
            None => Error::BehaviorError {
                member: self.member.clone(),
                message: format_lua_error(&e),
            },
        })
    }
}

fn chunk_name(member: &str) -> String {
    format!("={}", member)
}

/// Find an engine error raised from inside a callback.
fn engine_error(err: &mlua::Error) -> Option<Error> {
    match err {
        mlua::Error::CallbackError { cause, .. } => engine_error(cause),
        mlua::Error::WithContext { cause, .. } => engine_error(cause),
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<Error>().cloned(),
        _ => None,
    }
}

fn format_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::SyntaxError { message, .. } => format!("compile error: {}", message),
        _ => err.to_string(),
    }
}

fn setup_error(err: &mlua::Error) -> Error {
    Error::BehaviorError {
        member: String::new(),
        message: format!("cannot set up the Lua VM: {}", err),
    }
}
