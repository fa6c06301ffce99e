//! # statechart-core
//!
//! Run-to-completion interpreter for hierarchical, parallel statecharts.
//!
//! This crate provides:
//! - Chart definition parsing and validation
//! - Transition selection, conflict resolution and exit/entry planning
//! - Shallow and deep history recording
//! - A pluggable cycle semantics and the driver around it
//! - A shared chart and instance registry

pub mod action;
pub mod chart;
pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod follow;
pub mod history;
pub mod registry;
pub mod select;
pub mod semantics;
pub mod status;
pub mod step;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use action::{Action, ActionContext, ActionError, RawAction};
pub use chart::{Chart, RawChart, TargetId, TargetKind, Transition, TransitionId};
pub use context::{ScopeId, Scopes};
pub use error::ModelError;
pub use event::TriggerEvent;
pub use executor::{Executor, ExecutorPhase, ALL_STATES_VAR};
pub use history::HistoryMemory;
pub use registry::{ChartRegistry, ExecutorFactory};
pub use semantics::{DefaultSemantics, Semantics};
pub use status::Status;
pub use step::Step;
pub use traits::{
    ErrorKind, ErrorReporter, EvalError, Evaluator, EventDispatcher, LogReporter, NopDispatcher,
};
