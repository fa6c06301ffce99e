//! Minimal collaborators for in-crate tests.

use crate::context::{ScopeId, Scopes};
use crate::traits::{ErrorKind, ErrorReporter, EvalError, Evaluator};
use serde_json::Value;

/// Toy evaluator: boolean and integer literals, `boom`/`fail` as forced
/// failures, everything else a variable lookup defaulting to null.
pub(crate) struct TestEvaluator;

impl Evaluator for TestEvaluator {
    fn evaluate(&self, expr: &str, scopes: &Scopes, scope: ScopeId) -> Result<Value, EvalError> {
        match expr {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "boom" | "fail" => Err(EvalError::Evaluation {
                expr: expr.to_string(),
                reason: "forced failure".to_string(),
            }),
            _ => {
                if let Ok(n) = expr.parse::<i64>() {
                    return Ok(Value::from(n));
                }
                Ok(scopes.get(scope, expr).cloned().unwrap_or(Value::Null))
            }
        }
    }
}

/// Reporter that collects everything for assertions.
#[derive(Default)]
pub(crate) struct VecReporter {
    pub errors: Vec<(ErrorKind, String)>,
}

impl ErrorReporter for VecReporter {
    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        self.errors.push((kind, message.to_string()));
    }
}
