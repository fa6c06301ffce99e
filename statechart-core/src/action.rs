//! Executable actions attached to states and transitions.
//!
//! Actions run during the execution phase of a cycle in a fixed order:
//! exit actions (innermost state first), then transition actions, then
//! entry actions (outermost state first). An action failure is recoverable:
//! the failure is reported and the cycle continues as if the action were a
//! no-op. Only a [`ModelError`] escaping an action aborts the cycle.

use crate::chart::{Chart, TargetId};
use crate::context::{ScopeId, Scopes};
use crate::error::ModelError;
use crate::event::TriggerEvent;
use crate::step::Step;
use crate::traits::{ErrorKind, ErrorReporter, EvalError, Evaluator, EventDispatcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Recoverable: reported, then the cycle continues.
    #[error("{0}")]
    Execution(String),

    /// Fatal: aborts the whole operation without publishing.
    #[error(transparent)]
    Fatal(#[from] ModelError),
}

impl From<EvalError> for ActionError {
    fn from(e: EvalError) -> Self {
        ActionError::Execution(e.to_string())
    }
}

/// Everything an action may touch while executing.
pub struct ActionContext<'a> {
    pub chart: &'a Chart,
    pub scopes: &'a mut Scopes,
    /// Scope of the state or transition source the action belongs to.
    pub scope: ScopeId,
    pub evaluator: &'a dyn Evaluator,
    pub dispatcher: &'a mut dyn EventDispatcher,
    /// Events raised by actions this cycle, queued for the next cycle.
    pub derived: &'a mut Vec<TriggerEvent>,
}

/// An executable action.
pub trait Action: fmt::Debug + Send + Sync {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError>;

    /// Syntax-checks any embedded expressions at load time. The default has
    /// nothing to check.
    fn check(&self, evaluator: &dyn Evaluator) -> Result<(), EvalError> {
        let _ = evaluator;
        Ok(())
    }
}

/// Queues an internal event for the next cycle.
#[derive(Debug, Clone)]
pub struct Raise {
    pub event: String,
}

impl Action for Raise {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        ctx.derived.push(TriggerEvent::new(&self.event));
        Ok(())
    }
}

/// Evaluates an expression and assigns the result to a variable.
#[derive(Debug, Clone)]
pub struct Assign {
    pub location: String,
    pub expr: String,
}

impl Action for Assign {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        let value = ctx.evaluator.evaluate(&self.expr, ctx.scopes, ctx.scope)?;
        ctx.scopes.set(ctx.scope, &self.location, value);
        Ok(())
    }

    fn check(&self, evaluator: &dyn Evaluator) -> Result<(), EvalError> {
        evaluator.check(&self.expr)
    }
}

/// Evaluates an expression and logs the result.
#[derive(Debug, Clone)]
pub struct Log {
    pub label: Option<String>,
    pub expr: String,
}

impl Action for Log {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        let value = ctx.evaluator.evaluate(&self.expr, ctx.scopes, ctx.scope)?;
        match &self.label {
            Some(label) => tracing::info!(%label, %value, "log action"),
            None => tracing::info!(%value, "log action"),
        }
        Ok(())
    }

    fn check(&self, evaluator: &dyn Evaluator) -> Result<(), EvalError> {
        evaluator.check(&self.expr)
    }
}

/// Hands an event to the dispatcher for external delivery.
#[derive(Debug, Clone)]
pub struct SendEvent {
    pub id: String,
    pub event: String,
    pub delay_ms: u64,
    pub payload: Option<serde_json::Value>,
}

impl Action for SendEvent {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        let event = match &self.payload {
            Some(payload) => TriggerEvent::with_payload(&self.event, payload.clone()),
            None => TriggerEvent::new(&self.event),
        };
        ctx.dispatcher.send(&self.id, event, self.delay_ms);
        Ok(())
    }
}

/// Cancels a delayed send by id.
#[derive(Debug, Clone)]
pub struct CancelEvent {
    pub id: String,
}

impl Action for CancelEvent {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        ctx.dispatcher.cancel(&self.id);
        Ok(())
    }
}

/// Raw action as written in the definition DSL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawAction {
    Raise {
        event: String,
    },
    Assign {
        location: String,
        expr: String,
    },
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        expr: String,
    },
    Send {
        id: String,
        event: String,
        #[serde(default, skip_serializing_if = "is_zero")]
        delay_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<serde_json::Value>,
    },
    Cancel {
        id: String,
    },
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl RawAction {
    /// Builds the executable form.
    pub fn build(&self) -> Arc<dyn Action> {
        match self {
            RawAction::Raise { event } => Arc::new(Raise {
                event: event.clone(),
            }),
            RawAction::Assign { location, expr } => Arc::new(Assign {
                location: location.clone(),
                expr: expr.clone(),
            }),
            RawAction::Log { label, expr } => Arc::new(Log {
                label: label.clone(),
                expr: expr.clone(),
            }),
            RawAction::Send {
                id,
                event,
                delay_ms,
                payload,
            } => Arc::new(SendEvent {
                id: id.clone(),
                event: event.clone(),
                delay_ms: *delay_ms,
                payload: payload.clone(),
            }),
            RawAction::Cancel { id } => Arc::new(CancelEvent { id: id.clone() }),
        }
    }
}

/// Runs every action of the cycle in order: exits, transitions, entries.
///
/// Derived events are appended to the working status only after every
/// action has run, so a half-failed cycle never publishes a partial queue.
pub fn execute_actions(
    chart: &Chart,
    step: &mut Step,
    scopes: &mut Scopes,
    evaluator: &dyn Evaluator,
    dispatcher: &mut dyn EventDispatcher,
    reporter: &mut dyn ErrorReporter,
) -> Result<(), ModelError> {
    let mut derived: Vec<TriggerEvent> = Vec::new();

    for &state in &step.exit_list {
        let node = chart.node(state);
        run_actions(
            &node.on_exit,
            chart,
            state,
            scopes,
            evaluator,
            dispatcher,
            reporter,
            &mut derived,
        )?;
    }

    for id in &step.transitions {
        let tr = chart.transition(id);
        run_actions(
            &tr.actions,
            chart,
            tr.source,
            scopes,
            evaluator,
            dispatcher,
            reporter,
            &mut derived,
        )?;
    }

    for &state in &step.entry_list {
        let node = chart.node(state);
        run_actions(
            &node.on_entry,
            chart,
            state,
            scopes,
            evaluator,
            dispatcher,
            reporter,
            &mut derived,
        )?;
    }

    step.after.extend_events(derived);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_actions(
    actions: &[Arc<dyn Action>],
    chart: &Chart,
    state: TargetId,
    scopes: &mut Scopes,
    evaluator: &dyn Evaluator,
    dispatcher: &mut dyn EventDispatcher,
    reporter: &mut dyn ErrorReporter,
    derived: &mut Vec<TriggerEvent>,
) -> Result<(), ModelError> {
    for action in actions {
        let scope = scopes.scope_of(state);
        let mut ctx = ActionContext {
            chart,
            scopes: &mut *scopes,
            scope,
            evaluator,
            dispatcher: &mut *dispatcher,
            derived: &mut *derived,
        };
        match action.execute(&mut ctx) {
            Ok(()) => {}
            Err(ActionError::Execution(message)) => {
                reporter.on_error(
                    ErrorKind::Execution,
                    &format!("action on '{}' failed: {message}", chart.node(state).id),
                );
            }
            Err(ActionError::Fatal(e)) => return Err(e),
        }
    }
    Ok(())
}
