//! Collaborator capabilities consumed by the engine.
//!
//! The engine owns no expression language, no transport and no diagnostic
//! sink of its own. Guard conditions and data expressions are delegated to
//! an [`Evaluator`], outbound messaging to an [`EventDispatcher`] and all
//! recoverable failures to an [`ErrorReporter`].

use crate::context::{ScopeId, Scopes};
use crate::event::TriggerEvent;
use serde_json::Value;
use thiserror::Error;

/// Errors produced by expression evaluation.
///
/// These are the recoverable tier: a failed guard is treated as false, a
/// failed assignment as a no-op, and the failure is routed to the
/// [`ErrorReporter`]. They become a fatal
/// [`ModelError`](crate::error::ModelError) only when detected at load time.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("syntax error in '{expr}': {reason}")]
    Syntax { expr: String, reason: String },

    #[error("evaluation of '{expr}' failed: {reason}")]
    Evaluation { expr: String, reason: String },
}

/// Expression evaluation capability.
///
/// Guards and data expressions are strings; their grammar is the
/// evaluator's concern. Evaluation happens against a state's variable
/// scope, with lookups walking the parent chain up to the root scope.
pub trait Evaluator: Send + Sync {
    /// Evaluates an expression against the given scope.
    fn evaluate(&self, expr: &str, scopes: &Scopes, scope: ScopeId) -> Result<Value, EvalError>;

    /// Syntax-checks an expression without evaluating it.
    ///
    /// Called for every guard and action expression at `load_machine` time
    /// so malformed expressions fail the load instead of surfacing
    /// mid-cycle. The default accepts everything.
    fn check(&self, expr: &str) -> Result<(), EvalError> {
        let _ = expr;
        Ok(())
    }
}

/// Outbound event delivery capability.
///
/// The engine enqueues and dequeues [`TriggerEvent`]s; delivering them to
/// outside systems (and routing external replies back into `trigger`) is
/// the dispatcher's concern. Calls are fire-and-forget: a dispatcher that
/// fails should report through its own channels.
pub trait EventDispatcher: Send + Sync {
    /// Delivers an event to an external target. `send_id` identifies the
    /// send for later cancellation; `delay_ms` of zero means immediate.
    fn send(&mut self, send_id: &str, event: TriggerEvent, delay_ms: u64);

    /// Cancels a previously requested delayed send.
    fn cancel(&mut self, send_id: &str);
}

/// A dispatcher that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopDispatcher;

impl EventDispatcher for NopDispatcher {
    fn send(&mut self, _send_id: &str, _event: TriggerEvent, _delay_ms: u64) {}

    fn cancel(&mut self, _send_id: &str) {}
}

/// Classification of recoverable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A guard or data expression failed to evaluate.
    Expression,
    /// An action failed while executing.
    Execution,
    /// The configuration reached an inconsistent shape.
    IllegalConfiguration,
}

/// Fire-and-forget sink for recoverable failures.
///
/// Reported conditions never abort the cycle; the engine degrades (guard
/// false, action no-op) and keeps going.
pub trait ErrorReporter: Send + Sync {
    fn on_error(&mut self, kind: ErrorKind, message: &str);
}

/// Reporter that forwards everything to `tracing` at WARN level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        tracing::warn!(?kind, "{message}");
    }
}

/// Truthiness rules shared by guard handling and conforming evaluators:
/// null, false, zero, the empty string and empty collections are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!({})));

        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!(-0.5)));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!([0])));
        assert!(is_truthy(&json!({"k": 0})));
    }
}
