//! Transition selection: enumeration and conflict resolution.

use crate::chart::{Chart, Transition, TransitionId};
use crate::context::Scopes;
use crate::follow;
use crate::step::Step;
use crate::traits::{is_truthy, ErrorKind, ErrorReporter, Evaluator};
use std::collections::BTreeSet;

/// Walks every active leaf and its ancestors, selecting for each leaf the
/// closest enclosing transition whose event and guard match.
///
/// At each ancestor the first matching transition in document order wins,
/// and a match stops the walk for that leaf. The result lands in
/// `step.transitions`, deduplicated (a transition on a shared ancestor may
/// be selected by several leaves) and sorted by document order.
///
/// A guard-evaluation failure is reported and treated as "guard is false";
/// it never aborts the cycle.
pub fn enumerate_reachable_transitions(
    chart: &Chart,
    step: &mut Step,
    scopes: &Scopes,
    evaluator: &dyn Evaluator,
    reporter: &mut dyn ErrorReporter,
) {
    let mut selected: BTreeSet<TransitionId> = BTreeSet::new();

    for &leaf in step.before.states() {
        let mut cur = Some(leaf);
        'walk: while let Some(state) = cur {
            for (index, tr) in chart.node(state).transitions.iter().enumerate() {
                if !event_matches(tr, step) {
                    continue;
                }
                if !guard_passes(tr, scopes, evaluator, reporter, chart, state) {
                    continue;
                }
                selected.insert(TransitionId {
                    source: state,
                    index,
                });
                break 'walk;
            }
            cur = chart.parent(state);
        }
    }

    step.transitions = selected.into_iter().collect();
}

fn event_matches(tr: &Transition, step: &Step) -> bool {
    match &tr.event {
        // Eventless transitions are eligible in every cycle.
        None => true,
        Some(name) => step.events.iter().any(|e| &e.name == name),
    }
}

fn guard_passes(
    tr: &Transition,
    scopes: &Scopes,
    evaluator: &dyn Evaluator,
    reporter: &mut dyn ErrorReporter,
    chart: &Chart,
    state: crate::chart::TargetId,
) -> bool {
    let Some(cond) = &tr.cond else {
        return true;
    };
    match evaluator.evaluate(cond, scopes, scopes.scope_of(state)) {
        Ok(value) => is_truthy(&value),
        Err(e) => {
            reporter.on_error(
                ErrorKind::Expression,
                &format!("guard on '{}' failed: {e}", chart.node(state).id),
            );
            false
        }
    }
}

/// Reduces the enumerated set to a maximal, mutually non-conflicting subset.
///
/// Two transitions conflict when their exit sets overlap. Candidates are
/// processed in document order and a transition is dropped exactly when it
/// conflicts with an already-kept one, so the earlier transition always
/// survives.
pub fn filter_transition_set(chart: &Chart, step: &mut Step, _reporter: &mut dyn ErrorReporter) {
    if step.transitions.len() <= 1 {
        return;
    }

    let closure = step.before.ancestor_closure(chart);
    let mut kept: Vec<TransitionId> = Vec::with_capacity(step.transitions.len());
    let mut kept_exits: Vec<BTreeSet<crate::chart::TargetId>> = Vec::new();

    for &candidate in &step.transitions {
        let exits = follow::exit_set_within(chart, &closure, chart.transition(&candidate));
        let conflicts = kept_exits.iter().any(|k| !k.is_disjoint(&exits));
        if conflicts {
            tracing::debug!(
                source = %chart.node(candidate.source).id,
                "dropping conflicting transition"
            );
            continue;
        }
        kept.push(candidate);
        kept_exits.push(exits);
    }

    step.transitions = kept;
}
