//! The pluggable cycle semantics.
//!
//! The driver is a fixed loop; what each phase of a cycle means is behind
//! [`Semantics`], so an embedding can swap selection or conflict rules
//! without touching the driver. [`DefaultSemantics`] wires the phases to
//! the standard implementations.

use crate::action;
use crate::chart::Chart;
use crate::context::Scopes;
use crate::error::ModelError;
use crate::follow;
use crate::history::{self, HistoryMemory};
use crate::select;
use crate::step::Step;
use crate::traits::{ErrorReporter, Evaluator, EventDispatcher};

/// The six phases of a cycle, in the order the driver calls them.
///
/// Phase implementations communicate exclusively through the [`Step`]; a
/// fatal error from any phase aborts the cycle before anything is
/// published.
pub trait Semantics: Send + Sync {
    /// Computes the default-initial entry list for a freshly reset machine.
    fn determine_initial_states(
        &self,
        chart: &Chart,
        step: &mut Step,
        memory: &HistoryMemory,
        reporter: &mut dyn ErrorReporter,
    ) -> Result<(), ModelError>;

    /// Selects, per active leaf, the closest matching transition.
    fn enumerate_reachable_transitions(
        &self,
        chart: &Chart,
        step: &mut Step,
        scopes: &Scopes,
        evaluator: &dyn Evaluator,
        reporter: &mut dyn ErrorReporter,
    );

    /// Drops transitions whose exit sets conflict with earlier ones.
    fn filter_transition_set(
        &self,
        chart: &Chart,
        step: &mut Step,
        reporter: &mut dyn ErrorReporter,
    );

    /// Plans the exit and entry lists and updates the working configuration.
    fn follow_transitions(
        &self,
        chart: &Chart,
        step: &mut Step,
        memory: &HistoryMemory,
        reporter: &mut dyn ErrorReporter,
    ) -> Result<(), ModelError>;

    /// Records history for exited states, against the before-configuration.
    fn update_history_states(&self, chart: &Chart, step: &Step, memory: &mut HistoryMemory);

    /// Runs exit, transition and entry actions and collects derived events.
    fn execute_actions(
        &self,
        chart: &Chart,
        step: &mut Step,
        scopes: &mut Scopes,
        evaluator: &dyn Evaluator,
        dispatcher: &mut dyn EventDispatcher,
        reporter: &mut dyn ErrorReporter,
    ) -> Result<(), ModelError>;
}

/// The standard semantics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSemantics;

impl Semantics for DefaultSemantics {
    fn determine_initial_states(
        &self,
        chart: &Chart,
        step: &mut Step,
        memory: &HistoryMemory,
        _reporter: &mut dyn ErrorReporter,
    ) -> Result<(), ModelError> {
        follow::determine_initial_states(chart, step, memory)
    }

    fn enumerate_reachable_transitions(
        &self,
        chart: &Chart,
        step: &mut Step,
        scopes: &Scopes,
        evaluator: &dyn Evaluator,
        reporter: &mut dyn ErrorReporter,
    ) {
        select::enumerate_reachable_transitions(chart, step, scopes, evaluator, reporter);
    }

    fn filter_transition_set(
        &self,
        chart: &Chart,
        step: &mut Step,
        reporter: &mut dyn ErrorReporter,
    ) {
        select::filter_transition_set(chart, step, reporter);
    }

    fn follow_transitions(
        &self,
        chart: &Chart,
        step: &mut Step,
        memory: &HistoryMemory,
        _reporter: &mut dyn ErrorReporter,
    ) -> Result<(), ModelError> {
        follow::follow_transitions(chart, step, memory)
    }

    fn update_history_states(&self, chart: &Chart, step: &Step, memory: &mut HistoryMemory) {
        history::update_history_states(chart, step, memory);
    }

    fn execute_actions(
        &self,
        chart: &Chart,
        step: &mut Step,
        scopes: &mut Scopes,
        evaluator: &dyn Evaluator,
        dispatcher: &mut dyn EventDispatcher,
        reporter: &mut dyn ErrorReporter,
    ) -> Result<(), ModelError> {
        action::execute_actions(chart, step, scopes, evaluator, dispatcher, reporter)
    }
}
