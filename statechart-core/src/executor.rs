//! The run-to-completion driver.
//!
//! The driver owns everything per-instance: the current status, the scope
//! arena, the history memory and the collaborator capabilities. The chart
//! itself is shared and immutable. Each `trigger` call runs cycles until
//! the internal queue drains (or exactly one cycle in step mode), then
//! publishes the new status atomically.

use crate::chart::Chart;
use crate::context::Scopes;
use crate::error::ModelError;
use crate::event::TriggerEvent;
use crate::history::HistoryMemory;
use crate::semantics::{DefaultSemantics, Semantics};
use crate::status::Status;
use crate::step::Step;
use crate::traits::{
    ErrorKind, ErrorReporter, Evaluator, EventDispatcher, LogReporter, NopDispatcher,
};
use serde_json::Value;
use std::sync::Arc;

/// Root variable holding the ids of every active state, ancestors included.
pub const ALL_STATES_VAR: &str = "_all_states";

/// Where the driver currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorPhase {
    /// No chart loaded; `trigger` and `reset` fail.
    Unconfigured,
    /// Between trigger calls; the published status is current.
    Idle,
    /// Inside a trigger call, running cycles.
    Stepping,
}

/// One machine instance: a shared chart plus all mutable per-instance
/// state.
pub struct Executor {
    chart: Option<Arc<Chart>>,
    scopes: Scopes,
    status: Status,
    history: HistoryMemory,
    run_to_completion: bool,
    phase: ExecutorPhase,
    semantics: Box<dyn Semantics>,
    evaluator: Box<dyn Evaluator>,
    dispatcher: Box<dyn EventDispatcher>,
    reporter: Box<dyn ErrorReporter>,
}

impl Executor {
    /// Creates an unconfigured driver around an evaluator. The dispatcher
    /// discards sends and the reporter logs; swap them with the setters.
    pub fn new(evaluator: Box<dyn Evaluator>) -> Self {
        Self::with_semantics(evaluator, Box::new(DefaultSemantics))
    }

    /// Creates a driver with custom cycle semantics.
    pub fn with_semantics(evaluator: Box<dyn Evaluator>, semantics: Box<dyn Semantics>) -> Self {
        Self {
            chart: None,
            scopes: Scopes::new("unconfigured"),
            status: Status::new(),
            history: HistoryMemory::default(),
            run_to_completion: true,
            phase: ExecutorPhase::Unconfigured,
            semantics,
            evaluator,
            dispatcher: Box::new(NopDispatcher),
            reporter: Box::new(LogReporter),
        }
    }

    /// Loads a chart and resets to its initial configuration.
    ///
    /// Every guard and action expression is syntax-checked against the
    /// evaluator first; a malformed expression fails the load and leaves
    /// the previous machine in place.
    pub fn load_machine(&mut self, chart: Arc<Chart>) -> Result<(), ModelError> {
        self.check_expressions(&chart)?;
        let previous = self.chart.replace(chart);
        if let Err(e) = self.reset() {
            self.chart = previous;
            if self.chart.is_none() {
                self.phase = ExecutorPhase::Unconfigured;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Discards all runtime state and re-enters the initial configuration,
    /// running entry actions. Idempotent.
    ///
    /// The fresh scopes, history and status are built aside and committed
    /// only once the initial cycle succeeds; a fatal failure leaves the
    /// previously published status untouched.
    pub fn reset(&mut self) -> Result<(), ModelError> {
        let chart = self.chart.clone().ok_or(ModelError::NotConfigured)?;

        let mut scopes = Scopes::for_chart(&chart);
        let history = HistoryMemory::default();
        let mut step = Step::new(Vec::new(), &Status::new());

        self.phase = ExecutorPhase::Stepping;
        let result = self.initial_cycle(&chart, &mut step, &mut scopes, &history);
        self.phase = ExecutorPhase::Idle;
        result?;

        self.scopes = scopes;
        self.history = history;
        self.publish(&chart, step);

        if self.run_to_completion && !self.status.events().is_empty() {
            self.trigger(Vec::new())
        } else {
            self.log_state(&chart);
            Ok(())
        }
    }

    fn initial_cycle(
        &mut self,
        chart: &Arc<Chart>,
        step: &mut Step,
        scopes: &mut Scopes,
        history: &HistoryMemory,
    ) -> Result<(), ModelError> {
        self.semantics
            .determine_initial_states(chart, step, history, self.reporter.as_mut())?;
        self.semantics.execute_actions(
            chart,
            step,
            scopes,
            self.evaluator.as_ref(),
            self.dispatcher.as_mut(),
            self.reporter.as_mut(),
        )
    }

    /// Feeds a batch of external events through the machine.
    ///
    /// In run-to-completion mode, cycles repeat until no internal events
    /// remain; in step mode exactly one cycle runs and derived events wait
    /// for the next call. An empty batch is valid and drains the internal
    /// queue (or runs one eventless cycle).
    pub fn trigger(&mut self, events: Vec<TriggerEvent>) -> Result<(), ModelError> {
        let chart = self.chart.clone().ok_or(ModelError::NotConfigured)?;

        self.phase = ExecutorPhase::Stepping;
        let result = self.run_superstep(&chart, events);
        self.phase = ExecutorPhase::Idle;
        result?;

        self.log_state(&chart);
        Ok(())
    }

    fn run_superstep(
        &mut self,
        chart: &Arc<Chart>,
        events: Vec<TriggerEvent>,
    ) -> Result<(), ModelError> {
        let mut external = events;
        loop {
            let mut step = Step::new(std::mem::take(&mut external), &self.status);

            self.semantics.enumerate_reachable_transitions(
                chart,
                &mut step,
                &self.scopes,
                self.evaluator.as_ref(),
                self.reporter.as_mut(),
            );
            self.semantics
                .filter_transition_set(chart, &mut step, self.reporter.as_mut());
            self.semantics.follow_transitions(
                chart,
                &mut step,
                &self.history,
                self.reporter.as_mut(),
            )?;
            self.semantics
                .update_history_states(chart, &step, &mut self.history);
            self.semantics.execute_actions(
                chart,
                &mut step,
                &mut self.scopes,
                self.evaluator.as_ref(),
                self.dispatcher.as_mut(),
                self.reporter.as_mut(),
            )?;

            self.publish(chart, step);

            if !(self.run_to_completion && !self.status.events().is_empty()) {
                return Ok(());
            }
        }
    }

    /// Commits a finished cycle: the working status becomes current and the
    /// active-state variable is refreshed.
    fn publish(&mut self, chart: &Chart, step: Step) {
        self.status = step.after;

        if !self.status.is_legal(chart) {
            self.reporter.on_error(
                ErrorKind::IllegalConfiguration,
                &format!(
                    "configuration {:?} violates the legality invariant",
                    self.status.active_ids(chart)
                ),
            );
        }

        let root = chart.root();
        let ids: Vec<Value> = self
            .status
            .ancestor_closure(chart)
            .iter()
            .filter(|&&t| t != root)
            .map(|&t| Value::String(chart.node(t).id.clone()))
            .collect();
        self.scopes.set_root(ALL_STATES_VAR, Value::Array(ids));
    }

    fn log_state(&self, chart: &Chart) {
        tracing::debug!(
            machine = %chart.name,
            states = ?self.status.active_ids(chart),
            "active configuration"
        );
    }

    fn check_expressions(&self, chart: &Chart) -> Result<(), ModelError> {
        let invalid = |e: crate::traits::EvalError| ModelError::InvalidExpression {
            reason: e.to_string(),
        };
        for (_, tr) in chart.transitions() {
            if let Some(cond) = &tr.cond {
                self.evaluator.check(cond).map_err(invalid)?;
            }
            for action in &tr.actions {
                action.check(self.evaluator.as_ref()).map_err(invalid)?;
            }
        }
        for (_, node) in chart.targets() {
            for action in node.on_entry.iter().chain(&node.on_exit) {
                action.check(self.evaluator.as_ref()).map_err(invalid)?;
            }
        }
        Ok(())
    }

    /// The published status. Never a partial cycle.
    pub fn current_status(&self) -> &Status {
        &self.status
    }

    /// Ids of the active leaves in document order. Empty when unconfigured.
    pub fn active_ids(&self) -> Vec<&str> {
        match &self.chart {
            Some(chart) => self.status.active_ids(chart),
            None => Vec::new(),
        }
    }

    pub fn phase(&self) -> ExecutorPhase {
        self.phase
    }

    /// Switches between run-to-completion (default) and single-cycle step
    /// mode.
    pub fn set_run_to_completion(&mut self, on: bool) {
        self.run_to_completion = on;
    }

    pub fn chart(&self) -> Option<&Arc<Chart>> {
        self.chart.as_ref()
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    pub fn set_evaluator(&mut self, evaluator: Box<dyn Evaluator>) {
        self.evaluator = evaluator;
    }

    pub fn set_dispatcher(&mut self, dispatcher: Box<dyn EventDispatcher>) {
        self.dispatcher = dispatcher;
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn ErrorReporter>) {
        self.reporter = reporter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionContext, ActionError};
    use crate::testutil::TestEvaluator;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor_with(definition: serde_json::Value) -> Executor {
        let chart = Chart::from_json("m", 1, &definition).unwrap();
        let mut exec = Executor::new(Box::new(TestEvaluator));
        exec.load_machine(Arc::new(chart)).unwrap();
        exec
    }

    fn trigger(exec: &mut Executor, name: &str) {
        exec.trigger(vec![TriggerEvent::new(name)]).unwrap();
    }

    #[test]
    fn test_simple_transition() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a", "transitions": [{"event": "go", "to": "b"}]},
                {"id": "b"}
            ]
        }));

        assert_eq!(exec.active_ids(), vec!["a"]);
        trigger(&mut exec, "go");
        assert_eq!(exec.active_ids(), vec!["b"]);
    }

    #[test]
    fn test_unmatched_event_changes_nothing() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a", "transitions": [{"event": "go", "to": "b"}]},
                {"id": "b"}
            ]
        }));

        trigger(&mut exec, "nonsense");
        assert_eq!(exec.active_ids(), vec!["a"]);
    }

    #[test]
    fn test_reset_enters_parallel_defaults() {
        let exec = executor_with(json!({
            "states": [
                {"id": "p", "parallel": true, "states": [
                    {"id": "r1", "states": [{"id": "x"}, {"id": "y"}]},
                    {"id": "r2", "states": [{"id": "m1"}, {"id": "n1"}]}
                ]}
            ]
        }));

        assert_eq!(exec.active_ids(), vec!["x", "m1"]);
    }

    #[test]
    fn test_shallow_history_restores_last_child() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a", "transitions": [{"event": "enter", "to": "h"}]},
                {"id": "c",
                 "states": [
                    {"id": "s1", "transitions": [
                        {"event": "next", "to": "s2"},
                        {"event": "leave", "to": "a"}
                    ]},
                    {"id": "s2", "transitions": [{"event": "leave", "to": "a"}]},
                    {"id": "h", "history": "shallow", "default": "s1"}
                 ]}
            ]
        }));

        // First entry lands on the default.
        trigger(&mut exec, "enter");
        assert_eq!(exec.active_ids(), vec!["s1"]);

        trigger(&mut exec, "next");
        trigger(&mut exec, "leave");
        assert_eq!(exec.active_ids(), vec!["a"]);

        // Re-entry restores the remembered child.
        trigger(&mut exec, "enter");
        assert_eq!(exec.active_ids(), vec!["s2"]);
    }

    #[test]
    fn test_deep_history_restores_nested_leaf() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a", "transitions": [{"event": "enter", "to": "h"}]},
                {"id": "c",
                 "states": [
                    {"id": "s1", "transitions": [{"event": "dive", "to": "s2b"}]},
                    {"id": "s2", "states": [
                        {"id": "s2a"},
                        {"id": "s2b", "transitions": [{"event": "leave", "to": "a"}]}
                    ]},
                    {"id": "h", "history": "deep", "default": "s1"}
                 ]}
            ]
        }));

        trigger(&mut exec, "enter");
        assert_eq!(exec.active_ids(), vec!["s1"]);

        trigger(&mut exec, "dive");
        assert_eq!(exec.active_ids(), vec!["s2b"]);

        trigger(&mut exec, "leave");
        assert_eq!(exec.active_ids(), vec!["a"]);

        // Deep memory restores the exact nested leaf, not s2's default s2a.
        trigger(&mut exec, "enter");
        assert_eq!(exec.active_ids(), vec!["s2b"]);
    }

    #[test]
    fn test_run_to_completion_drains_raised_events() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a", "transitions": [
                    {"event": "go", "to": "b", "actions": [{"type": "raise", "event": "hop"}]}
                ]},
                {"id": "b", "transitions": [{"event": "hop", "to": "c"}]},
                {"id": "c"}
            ]
        }));

        trigger(&mut exec, "go");
        assert_eq!(exec.active_ids(), vec!["c"]);
        assert!(exec.current_status().events().is_empty());
    }

    #[test]
    fn test_step_mode_defers_raised_events() {
        let chart = Chart::from_json(
            "m",
            1,
            &json!({
                "states": [
                    {"id": "a", "transitions": [
                        {"event": "go", "to": "b", "actions": [{"type": "raise", "event": "hop"}]}
                    ]},
                    {"id": "b", "transitions": [{"event": "hop", "to": "c"}]},
                    {"id": "c"}
                ]
            }),
        )
        .unwrap();
        let mut exec = Executor::new(Box::new(TestEvaluator));
        exec.set_run_to_completion(false);
        exec.load_machine(Arc::new(chart)).unwrap();

        trigger(&mut exec, "go");
        assert_eq!(exec.active_ids(), vec!["b"]);
        assert_eq!(exec.current_status().events().len(), 1);

        // The queued event is consumed by the next call.
        exec.trigger(Vec::new()).unwrap();
        assert_eq!(exec.active_ids(), vec!["c"]);
    }

    #[test]
    fn test_eventless_transition_fires_on_trigger() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a", "transitions": [{"event": "go", "to": "b"}]},
                {"id": "b", "transitions": [{"to": "c"}]},
                {"id": "c"}
            ]
        }));

        // Entering b derives nothing, but the eventless transition is
        // picked up in the same superstep only if events keep it going;
        // here the chain ends and a later empty trigger advances it.
        trigger(&mut exec, "go");
        exec.trigger(Vec::new()).unwrap();
        assert_eq!(exec.active_ids(), vec!["c"]);
    }

    #[test]
    fn test_reset_is_idempotent_and_clears_state() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a",
                 "on_entry": [{"type": "assign", "location": "n", "expr": "1"}],
                 "transitions": [{"event": "go", "to": "b"}]},
                {"id": "b"}
            ]
        }));

        trigger(&mut exec, "go");
        assert_eq!(exec.active_ids(), vec!["b"]);

        exec.reset().unwrap();
        assert_eq!(exec.active_ids(), vec!["a"]);

        exec.reset().unwrap();
        assert_eq!(exec.active_ids(), vec!["a"]);
    }

    #[test]
    fn test_failed_reset_keeps_published_status() {
        #[derive(Debug)]
        struct FailAfterFirst {
            calls: AtomicUsize,
        }

        impl Action for FailAfterFirst {
            fn execute(&self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(())
                } else {
                    Err(ActionError::Fatal(ModelError::InvalidDefinition {
                        reason: "entry action gave out".to_string(),
                    }))
                }
            }
        }

        let mut chart =
            Chart::from_json("m", 1, &json!({"states": [{"id": "a"}, {"id": "b"}]})).unwrap();
        chart
            .add_entry_action(
                "a",
                Arc::new(FailAfterFirst {
                    calls: AtomicUsize::new(0),
                }),
            )
            .unwrap();

        let mut exec = Executor::new(Box::new(TestEvaluator));
        exec.load_machine(Arc::new(chart)).unwrap();
        assert_eq!(exec.active_ids(), vec!["a"]);

        // The second initial cycle fails; the published status survives.
        let err = exec.reset().unwrap_err();
        assert!(matches!(err, ModelError::InvalidDefinition { .. }));
        assert_eq!(exec.active_ids(), vec!["a"]);
        assert!(exec.current_status().is_legal(exec.chart().unwrap()));
        assert_eq!(exec.phase(), ExecutorPhase::Idle);
    }

    #[test]
    fn test_custom_entry_action_attachment() {
        #[derive(Debug)]
        struct Stamp;

        impl Action for Stamp {
            fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
                ctx.scopes.set(ctx.scope, "stamped", json!(true));
                Ok(())
            }
        }

        let mut chart = Chart::from_json(
            "m",
            1,
            &json!({
                "states": [
                    {"id": "a", "transitions": [{"event": "go", "to": "b"}]},
                    {"id": "b"}
                ]
            }),
        )
        .unwrap();
        chart.add_entry_action("b", Arc::new(Stamp)).unwrap();

        let mut exec = Executor::new(Box::new(TestEvaluator));
        exec.load_machine(Arc::new(chart)).unwrap();
        trigger(&mut exec, "go");

        let chart = exec.chart().unwrap().clone();
        let b = chart.target_by_id("b").unwrap();
        assert_eq!(
            exec.scopes().get(exec.scopes().scope_of(b), "stamped"),
            Some(&json!(true))
        );
    }

    #[test]
    fn test_fatal_action_aborts_without_publishing() {
        #[derive(Debug)]
        struct Broken;

        impl Action for Broken {
            fn execute(&self, _ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
                Err(ActionError::Fatal(ModelError::InvalidDefinition {
                    reason: "transition action gave out".to_string(),
                }))
            }
        }

        let mut chart = Chart::from_json(
            "m",
            1,
            &json!({
                "states": [
                    {"id": "a", "transitions": [{"event": "go", "to": "b"}]},
                    {"id": "b"}
                ]
            }),
        )
        .unwrap();
        chart.add_transition_action("a", 0, Arc::new(Broken)).unwrap();

        let mut exec = Executor::new(Box::new(TestEvaluator));
        exec.load_machine(Arc::new(chart)).unwrap();

        let err = exec.trigger(vec![TriggerEvent::new("go")]).unwrap_err();
        assert!(matches!(err, ModelError::InvalidDefinition { .. }));
        // The failed cycle never published.
        assert_eq!(exec.active_ids(), vec!["a"]);
        assert!(exec.current_status().events().is_empty());
    }

    #[derive(Clone, Default)]
    struct SharedReporter(Arc<Mutex<Vec<(ErrorKind, String)>>>);

    impl ErrorReporter for SharedReporter {
        fn on_error(&mut self, kind: ErrorKind, message: &str) {
            self.0.lock().push((kind, message.to_string()));
        }
    }

    #[test]
    fn test_illegal_configuration_is_reported() {
        struct DropEverything;

        impl Semantics for DropEverything {
            fn determine_initial_states(
                &self,
                chart: &Chart,
                step: &mut Step,
                memory: &HistoryMemory,
                reporter: &mut dyn ErrorReporter,
            ) -> Result<(), ModelError> {
                DefaultSemantics.determine_initial_states(chart, step, memory, reporter)
            }

            fn enumerate_reachable_transitions(
                &self,
                chart: &Chart,
                step: &mut Step,
                scopes: &Scopes,
                evaluator: &dyn Evaluator,
                reporter: &mut dyn ErrorReporter,
            ) {
                DefaultSemantics
                    .enumerate_reachable_transitions(chart, step, scopes, evaluator, reporter);
            }

            fn filter_transition_set(
                &self,
                chart: &Chart,
                step: &mut Step,
                reporter: &mut dyn ErrorReporter,
            ) {
                DefaultSemantics.filter_transition_set(chart, step, reporter);
            }

            fn follow_transitions(
                &self,
                chart: &Chart,
                step: &mut Step,
                memory: &HistoryMemory,
                reporter: &mut dyn ErrorReporter,
            ) -> Result<(), ModelError> {
                DefaultSemantics.follow_transitions(chart, step, memory, reporter)?;
                // Wipes the working configuration, leaving it illegal.
                let leaves: Vec<_> = step.after.states().iter().copied().collect();
                for t in leaves {
                    step.after.remove(t);
                }
                Ok(())
            }

            fn update_history_states(
                &self,
                chart: &Chart,
                step: &Step,
                memory: &mut HistoryMemory,
            ) {
                DefaultSemantics.update_history_states(chart, step, memory);
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
                DefaultSemantics
                    .execute_actions(chart, step, scopes, evaluator, dispatcher, reporter)
            }
        }

        let chart = Chart::from_json(
            "m",
            1,
            &json!({
                "states": [
                    {"id": "a", "transitions": [{"event": "go", "to": "b"}]},
                    {"id": "b"}
                ]
            }),
        )
        .unwrap();

        let errors = SharedReporter::default();
        let mut exec =
            Executor::with_semantics(Box::new(TestEvaluator), Box::new(DropEverything));
        exec.set_reporter(Box::new(errors.clone()));
        exec.load_machine(Arc::new(chart)).unwrap();

        exec.trigger(vec![TriggerEvent::new("go")]).unwrap();

        let reported = errors.0.lock();
        assert!(reported
            .iter()
            .any(|(kind, _)| *kind == ErrorKind::IllegalConfiguration));
    }

    #[test]
    fn test_entry_actions_run_on_reset() {
        let exec = executor_with(json!({
            "states": [
                {"id": "a", "on_entry": [{"type": "assign", "location": "entered", "expr": "1"}]}
            ]
        }));

        let chart = exec.chart().unwrap().clone();
        let a = chart.target_by_id("a").unwrap();
        let scope = exec.scopes().scope_of(a);
        assert_eq!(exec.scopes().get(scope, "entered"), Some(&json!(1)));
    }

    #[test]
    fn test_all_states_variable_tracks_ancestors() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "outer", "states": [
                    {"id": "inner", "transitions": [{"event": "go", "to": "other"}]}
                ]},
                {"id": "other"}
            ]
        }));

        let root = exec.scopes().root();
        let all = exec.scopes().get(root, ALL_STATES_VAR).unwrap().clone();
        assert_eq!(all, json!(["outer", "inner"]));

        trigger(&mut exec, "go");
        let all = exec.scopes().get(root, ALL_STATES_VAR).unwrap().clone();
        assert_eq!(all, json!(["other"]));
    }

    #[test]
    fn test_trigger_without_machine_fails() {
        let mut exec = Executor::new(Box::new(TestEvaluator));
        let err = exec.trigger(Vec::new()).unwrap_err();
        assert!(matches!(err, ModelError::NotConfigured));
        assert_eq!(exec.phase(), ExecutorPhase::Unconfigured);
    }

    #[test]
    fn test_load_rejects_malformed_guard() {
        struct Strict;
        impl Evaluator for Strict {
            fn evaluate(
                &self,
                _expr: &str,
                _scopes: &Scopes,
                _scope: crate::context::ScopeId,
            ) -> Result<Value, crate::traits::EvalError> {
                Ok(Value::Null)
            }

            fn check(&self, expr: &str) -> Result<(), crate::traits::EvalError> {
                Err(crate::traits::EvalError::Syntax {
                    expr: expr.to_string(),
                    reason: "rejected".to_string(),
                })
            }
        }

        let chart = Chart::from_json(
            "m",
            1,
            &json!({
                "states": [
                    {"id": "a", "transitions": [{"event": "go", "cond": "??", "to": "b"}]},
                    {"id": "b"}
                ]
            }),
        )
        .unwrap();

        let mut exec = Executor::new(Box::new(Strict));
        let err = exec.load_machine(Arc::new(chart)).unwrap_err();
        assert!(matches!(err, ModelError::InvalidExpression { .. }));
        assert_eq!(exec.phase(), ExecutorPhase::Unconfigured);
    }

    #[test]
    fn test_guard_selects_between_branches() {
        let mut exec = executor_with(json!({
            "states": [
                {"id": "a", "transitions": [
                    {"event": "go", "cond": "false", "to": "b"},
                    {"event": "go", "cond": "true", "to": "c"}
                ]},
                {"id": "b"},
                {"id": "c"}
            ]
        }));

        trigger(&mut exec, "go");
        assert_eq!(exec.active_ids(), vec!["c"]);
    }

    fn traffic_chart() -> serde_json::Value {
        json!({
            "states": [
                {"id": "p", "parallel": true, "states": [
                    {"id": "lane", "states": [
                        {"id": "red", "transitions": [{"event": "tick", "to": "green"}]},
                        {"id": "green", "transitions": [{"event": "tick", "to": "red"}]}
                    ]},
                    {"id": "walk", "states": [
                        {"id": "halt", "transitions": [{"event": "press", "to": "cross"}]},
                        {"id": "cross", "transitions": [{"event": "tick", "to": "halt"}]}
                    ]}
                ]},
                {"id": "off"}
            ]
        })
    }

    proptest! {
        #[test]
        fn test_configuration_stays_legal(
            events in proptest::collection::vec("tick|press|noise", 0..24)
        ) {
            let chart = Arc::new(Chart::from_json("m", 1, &traffic_chart()).unwrap());
            let mut exec = Executor::new(Box::new(TestEvaluator));
            exec.load_machine(chart.clone()).unwrap();

            for name in &events {
                exec.trigger(vec![TriggerEvent::new(name)]).unwrap();
                prop_assert!(exec.current_status().is_legal(&chart));
            }
        }

        #[test]
        fn test_identical_inputs_give_identical_runs(
            events in proptest::collection::vec("tick|press", 0..16)
        ) {
            let chart = Arc::new(Chart::from_json("m", 1, &traffic_chart()).unwrap());

            let run = |chart: Arc<Chart>| {
                let mut exec = Executor::new(Box::new(TestEvaluator));
                exec.load_machine(chart).unwrap();
                let mut trace = Vec::new();
                for name in &events {
                    exec.trigger(vec![TriggerEvent::new(name)]).unwrap();
                    trace.push(
                        exec.active_ids()
                            .iter()
                            .map(|s| s.to_string())
                            .collect::<Vec<_>>(),
                    );
                }
                trace
            };

            prop_assert_eq!(run(chart.clone()), run(chart));
        }
    }
}
