//! The [`Evaluator`] implementation backed by the expression language.

use crate::expr::Expr;
use parking_lot::RwLock;
use serde_json::Value;
use statechart_core::{EvalError, Evaluator, ScopeId, Scopes};
use std::collections::HashMap;

/// Evaluator with a parse cache.
///
/// Guards are re-evaluated on every cycle; parsing each expression once
/// and caching the tree keeps the hot path allocation-free for repeat
/// expressions.
#[derive(Default)]
pub struct ExprEvaluator {
    cache: RwLock<HashMap<String, Expr>>,
}

impl ExprEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_cached(&self, expr: &str) -> Result<Expr, EvalError> {
        if let Some(parsed) = self.cache.read().get(expr) {
            return Ok(parsed.clone());
        }
        let parsed = Expr::parse(expr)?;
        self.cache
            .write()
            .insert(expr.to_string(), parsed.clone());
        Ok(parsed)
    }
}

impl Evaluator for ExprEvaluator {
    fn evaluate(&self, expr: &str, scopes: &Scopes, scope: ScopeId) -> Result<Value, EvalError> {
        let parsed = self.parse_cached(expr)?;
        Ok(parsed.eval(scopes, scope))
    }

    fn check(&self, expr: &str) -> Result<(), EvalError> {
        self.parse_cached(expr).map(|_| ())
    }
}
