//! # statechart-expr
//!
//! Guard and data expression language for statechart-core.
//!
//! This crate provides:
//! - Expression parsing into a small comparison/boolean tree
//! - Infallible evaluation against per-state variable scopes
//! - An [`Evaluator`](statechart_core::Evaluator) implementation with a
//!   parse cache

pub mod evaluator;
pub mod expr;

pub use evaluator::ExprEvaluator;
pub use expr::{CmpOp, Expr};
