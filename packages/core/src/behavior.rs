//! Behavior executor: what runs when a mocked method is invoked.
//!
//! A behavior sees a fixed context: the received arguments, a handle to the
//! owning mock object, and a small helper namespace. It communicates back
//! only by returning a result value or by raising a simulated fault with
//! [`Helpers::fault`].

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::handle::MockHandle;
use crate::names::validate_error_name;
use crate::path::ObjectPath;
use crate::signature::Signature;
use crate::value::Value;
use crate::{Error, Result};

/// Helper namespace available to every behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct Helpers;

impl Helpers {
    /// Current wall-clock time in fractional seconds since the Unix epoch.
    pub fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }

    /// Build a simulated fault; return it as `Err` to fail the call.
    pub fn fault(&self, name: impl Into<String>, message: impl Into<String>) -> Error {
        Error::raised(name, message)
    }
}

/// Variable context of one invocation.
pub struct CallContext {
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    /// Arguments already coerced to the input signature.
    pub args: Vec<Value>,
    /// Handle to the owning object and, through it, the whole server.
    pub mock: MockHandle,
    pub helpers: Helpers,
}

/// Code evaluated per call.
///
/// Returning `Ok(None)` means "no result assigned"; the engine then
/// synthesizes zero values for the output signature. A method with several
/// output arguments returns them as one `Value::Struct`.
pub trait Behavior: Send + Sync {
    fn evaluate(&self, ctx: &CallContext) -> Result<Option<Value>>;
}

impl<F> Behavior for F
where
    F: Fn(&CallContext) -> Result<Option<Value>> + Send + Sync,
{
    fn evaluate(&self, ctx: &CallContext) -> Result<Option<Value>> {
        self(ctx)
    }
}

/// Compiles source snippets into behaviors.
///
/// The engine ships no interpreter of its own; one is installed on the
/// server (for example the Lua evaluator).
pub trait SnippetEvaluator: Send + Sync {
    /// Compile `source` for the method `member`.
    ///
    /// Syntax errors must be reported here as `Error::BehaviorError`.
    fn compile(&self, member: &str, source: &str) -> Result<Arc<dyn Behavior>>;
}

/// The behavior attached to a method.
#[derive(Clone, Default)]
pub enum MethodBehavior {
    /// Do nothing and return zero values.
    #[default]
    NoOp,
    /// A compiled source snippet.
    Snippet {
        source: String,
        compiled: Arc<dyn Behavior>,
    },
    /// A native closure.
    Native(Arc<dyn Behavior>),
}

impl MethodBehavior {
    /// Wrap a closure.
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&CallContext) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        MethodBehavior::Native(Arc::new(f))
    }

    /// Build from source text; empty source means no-op.
    pub fn from_source(
        evaluator: Option<&dyn SnippetEvaluator>,
        member: &str,
        source: &str,
    ) -> Result<Self> {
        if source.trim().is_empty() {
            return Ok(MethodBehavior::NoOp);
        }
        let evaluator = evaluator.ok_or_else(|| Error::BehaviorError {
            member: member.to_string(),
            message: "no snippet evaluator is installed on this server".to_string(),
        })?;
        Ok(MethodBehavior::Snippet {
            source: source.to_string(),
            compiled: evaluator.compile(member, source)?,
        })
    }

    /// Source text of a snippet behavior.
    pub fn source(&self) -> Option<&str> {
        match self {
            MethodBehavior::Snippet { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, MethodBehavior::NoOp)
    }

    pub(crate) fn evaluate(&self, ctx: &CallContext) -> Result<Option<Value>> {
        match self {
            MethodBehavior::NoOp => Ok(None),
            MethodBehavior::Snippet { compiled, .. } => compiled.evaluate(ctx),
            MethodBehavior::Native(behavior) => behavior.evaluate(ctx),
        }
    }
}

impl fmt::Debug for MethodBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBehavior::NoOp => write!(f, "NoOp"),
            MethodBehavior::Snippet { source, .. } => {
                f.debug_struct("Snippet").field("source", source).finish()
            }
            MethodBehavior::Native(_) => write!(f, "Native(..)"),
        }
    }
}

/// Run a behavior and shape its result to the output signature.
///
/// Simulated faults pass through untouched; every other failure becomes
/// `BehaviorError` so a broken fixture is never mistaken for a service reply.
pub(crate) fn execute(
    behavior: &MethodBehavior,
    out_signature: &Signature,
    ctx: &CallContext,
) -> Result<Vec<Value>> {
    let result = match behavior.evaluate(ctx) {
        Ok(result) => result,
        Err(Error::MockRaised { name, message }) => {
            // the transport can only carry well-formed error names
            return Err(match validate_error_name(&name) {
                Ok(()) => Error::MockRaised { name, message },
                Err(_) => Error::BehaviorError {
                    member: ctx.member.clone(),
                    message: format!("invalid fault name '{}': {}", name, message),
                },
            });
        }
        Err(e @ Error::BehaviorError { .. }) => return Err(e),
        Err(other) => {
            return Err(Error::BehaviorError {
                member: ctx.member.clone(),
                message: other.to_string(),
            })
        }
    };
    shape_result(&ctx.member, out_signature, result)
}

fn shape_result(member: &str, out: &Signature, result: Option<Value>) -> Result<Vec<Value>> {
    let failed = |message: String| Error::BehaviorError {
        member: member.to_string(),
        message,
    };

    let Some(value) = result else {
        return Ok(out.types().iter().map(Value::zero).collect());
    };

    let values = match out.len() {
        0 => {
            return Err(failed(format!(
                "returned {} but the method has no output arguments",
                value
            )))
        }
        1 => vec![value],
        n => match value {
            Value::Struct(items) | Value::Array(items) if items.len() == n => items,
            other => {
                return Err(failed(format!(
                    "expected {} output values for '{}', got {}",
                    n, out, other
                )))
            }
        },
    };

    Value::coerce_all(values, out).map_err(|message| failed(format!("invalid result: {}", message)))
}
