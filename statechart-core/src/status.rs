//! The active configuration.

use crate::chart::{Chart, TargetId, TargetKind};
use crate::event::TriggerEvent;
use std::collections::BTreeSet;

/// The set of currently active atomic states plus the queue of
/// internally-generated events pending for the next cycle.
///
/// A status is replaced wholesale at the end of every cycle, never mutated
/// after publication, so readers observing the published status never see
/// a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    states: BTreeSet<TargetId>,
    events: Vec<TriggerEvent>,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active atomic leaves in document order.
    pub fn states(&self) -> &BTreeSet<TargetId> {
        &self.states
    }

    pub fn contains(&self, t: TargetId) -> bool {
        self.states.contains(&t)
    }

    pub fn insert(&mut self, t: TargetId) {
        self.states.insert(t);
    }

    pub fn remove(&mut self, t: TargetId) {
        self.states.remove(&t);
    }

    /// Internally-generated events queued for the next cycle.
    pub fn events(&self) -> &[TriggerEvent] {
        &self.events
    }

    pub fn push_event(&mut self, event: TriggerEvent) {
        self.events.push(event);
    }

    pub fn extend_events(&mut self, events: impl IntoIterator<Item = TriggerEvent>) {
        self.events.extend(events);
    }

    /// Ids of the active leaves, in document order.
    pub fn active_ids<'a>(&self, chart: &'a Chart) -> Vec<&'a str> {
        self.states
            .iter()
            .map(|&t| chart.node(t).id.as_str())
            .collect()
    }

    /// The active leaves closed over their ancestor chains, root included.
    pub fn ancestor_closure(&self, chart: &Chart) -> BTreeSet<TargetId> {
        let mut closure = BTreeSet::new();
        for &leaf in &self.states {
            let mut cur = Some(leaf);
            while let Some(t) = cur {
                if !closure.insert(t) {
                    break;
                }
                cur = chart.parent(t);
            }
        }
        closure
    }

    /// Checks the configuration legality invariant: every leaf is atomic,
    /// every active compound has exactly one active child and every active
    /// parallel has all of its regions active.
    pub fn is_legal(&self, chart: &Chart) -> bool {
        if self.states.is_empty() {
            return false;
        }
        for &leaf in &self.states {
            if !chart.is_leaf(leaf) {
                return false;
            }
        }
        let closure = self.ancestor_closure(chart);
        for &t in &closure {
            match &chart.node(t).kind {
                TargetKind::Compound { children, .. } => {
                    let active = children.iter().filter(|c| closure.contains(c)).count();
                    if active != 1 {
                        return false;
                    }
                }
                TargetKind::Parallel { regions } => {
                    if !regions.iter().all(|r| closure.contains(r)) {
                        return false;
                    }
                }
                TargetKind::History { .. } => return false,
                TargetKind::Atomic | TargetKind::Final => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Chart;
    use serde_json::json;

    fn nested_chart() -> Chart {
        Chart::from_json(
            "m",
            1,
            &json!({
                "states": [
                    {"id": "a"},
                    {"id": "b", "states": [{"id": "b1"}, {"id": "b2"}]},
                    {"id": "p", "parallel": true, "states": [
                        {"id": "r1", "states": [{"id": "x"}, {"id": "y"}]},
                        {"id": "r2", "states": [{"id": "m1"}, {"id": "n1"}]}
                    ]}
                ]
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_ancestor_closure() {
        let chart = nested_chart();
        let mut status = Status::new();
        status.insert(chart.target_by_id("b1").unwrap());

        let closure = status.ancestor_closure(&chart);
        assert!(closure.contains(&chart.target_by_id("b1").unwrap()));
        assert!(closure.contains(&chart.target_by_id("b").unwrap()));
        assert!(closure.contains(&chart.root()));
        assert!(!closure.contains(&chart.target_by_id("a").unwrap()));
    }

    #[test]
    fn test_legal_simple() {
        let chart = nested_chart();
        let mut status = Status::new();
        status.insert(chart.target_by_id("a").unwrap());
        assert!(status.is_legal(&chart));
    }

    #[test]
    fn test_empty_is_illegal() {
        let chart = nested_chart();
        assert!(!Status::new().is_legal(&chart));
    }

    #[test]
    fn test_two_children_of_one_compound_is_illegal() {
        let chart = nested_chart();
        let mut status = Status::new();
        status.insert(chart.target_by_id("b1").unwrap());
        status.insert(chart.target_by_id("b2").unwrap());
        assert!(!status.is_legal(&chart));
    }

    #[test]
    fn test_parallel_requires_all_regions() {
        let chart = nested_chart();

        let mut status = Status::new();
        status.insert(chart.target_by_id("x").unwrap());
        assert!(!status.is_legal(&chart));

        status.insert(chart.target_by_id("m1").unwrap());
        assert!(status.is_legal(&chart));
    }

    #[test]
    fn test_two_top_level_states_is_illegal() {
        let chart = nested_chart();
        let mut status = Status::new();
        status.insert(chart.target_by_id("a").unwrap());
        status.insert(chart.target_by_id("b1").unwrap());
        assert!(!status.is_legal(&chart));
    }

    #[test]
    fn test_compound_leaf_is_illegal() {
        let chart = nested_chart();
        let mut status = Status::new();
        status.insert(chart.target_by_id("b").unwrap());
        assert!(!status.is_legal(&chart));
    }
}
