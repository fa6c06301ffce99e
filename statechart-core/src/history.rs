//! History recording and recall.

use crate::chart::{Chart, TargetId, TargetKind};
use crate::step::Step;
use std::collections::{BTreeSet, HashMap};

/// Recorded history snapshots, keyed by history state.
///
/// Lives in the driver, not in the chart, so a chart stays immutable and
/// shareable across instances while each instance keeps its own memory.
#[derive(Debug, Clone, Default)]
pub struct HistoryMemory {
    slots: HashMap<TargetId, Vec<TargetId>>,
}

impl HistoryMemory {
    /// The snapshot recorded for a history state, if any was ever recorded.
    pub fn recall(&self, history: TargetId) -> Option<&[TargetId]> {
        self.slots.get(&history).map(Vec::as_slice)
    }

    pub fn record(&mut self, history: TargetId, snapshot: Vec<TargetId>) {
        self.slots.insert(history, snapshot);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Records history for every exited state that carries a history child.
///
/// Runs before exit actions, against the configuration the cycle started
/// from, so the snapshot reflects the state as it was, not a half-torn-down
/// one. A deep history records the active leaves below the parent; a
/// shallow one records which immediate child was active. Recording happens
/// on every exit, overwriting any previous snapshot.
pub fn update_history_states(chart: &Chart, step: &Step, memory: &mut HistoryMemory) {
    let before_closure: BTreeSet<TargetId> = step.before.ancestor_closure(chart);

    for &exited in &step.exit_list {
        for &child in chart.children(exited) {
            let TargetKind::History { deep, .. } = &chart.node(child).kind else {
                continue;
            };
            let snapshot: Vec<TargetId> = if *deep {
                step.before
                    .states()
                    .iter()
                    .copied()
                    .filter(|&leaf| chart.is_proper_descendant(leaf, exited))
                    .collect()
            } else {
                chart
                    .children(exited)
                    .iter()
                    .copied()
                    .filter(|c| before_closure.contains(c))
                    .collect()
            };
            memory.record(child, snapshot);
        }
    }
}
