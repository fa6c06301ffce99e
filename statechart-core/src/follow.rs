//! Exit/entry planning: least-common-compound-ancestor logic, default
//! descent and history substitution.

use crate::chart::{Chart, TargetId, TargetKind, Transition};
use crate::error::ModelError;
use crate::history::HistoryMemory;
use crate::step::Step;
use std::collections::BTreeSet;

/// The least common compound ancestor of a transition: the nearest
/// compound ancestor of the source of which every target is a proper
/// descendant.
///
/// Parallel states never qualify, so a transition crossing out of one
/// region into a sibling region pivots above the parallel and exits it
/// wholesale.
pub fn lcca(chart: &Chart, source: TargetId, targets: &[TargetId]) -> TargetId {
    let mut cur = chart.parent(source);
    while let Some(anc) = cur {
        if matches!(chart.node(anc).kind, TargetKind::Compound { .. })
            && targets
                .iter()
                .all(|&t| chart.is_proper_descendant(t, anc))
        {
            return anc;
        }
        cur = chart.parent(anc);
    }
    chart.root()
}

/// The exit set of a transition against a given ancestor closure: every
/// active target strictly below the pivot. Internal transitions (no
/// targets) exit nothing.
pub fn exit_set_within(
    chart: &Chart,
    closure: &BTreeSet<TargetId>,
    tr: &Transition,
) -> BTreeSet<TargetId> {
    if tr.targets.is_empty() {
        return BTreeSet::new();
    }
    let pivot = lcca(chart, tr.source, &tr.targets);
    closure
        .iter()
        .copied()
        .filter(|&t| chart.is_proper_descendant(t, pivot))
        .collect()
}

/// Computes the ordered exit and entry lists for the selected transitions
/// and updates the working configuration.
///
/// The exit list is ordered child-before-parent (reverse document order),
/// the entry list parent-before-child (document order). Entry descends
/// into compound defaults and all parallel regions; history targets are
/// substituted by their recorded memory (or their default) before descent.
pub fn follow_transitions(
    chart: &Chart,
    step: &mut Step,
    memory: &HistoryMemory,
) -> Result<(), ModelError> {
    let closure = step.before.ancestor_closure(chart);
    let mut exits: BTreeSet<TargetId> = BTreeSet::new();
    let mut entries: BTreeSet<TargetId> = BTreeSet::new();

    for id in &step.transitions {
        let tr = chart.transition(id);
        if tr.targets.is_empty() {
            continue;
        }
        let pivot = lcca(chart, tr.source, &tr.targets);
        exits.extend(
            closure
                .iter()
                .copied()
                .filter(|&t| chart.is_proper_descendant(t, pivot)),
        );
        for &target in &tr.targets {
            enter_target(chart, pivot, target, memory, &mut entries)?;
        }
    }

    complete_parallel_regions(chart, memory, &mut entries)?;

    step.exit_list = exits.iter().rev().copied().collect();
    step.entry_list = entries.iter().copied().collect();

    for &t in &step.exit_list {
        if chart.is_leaf(t) {
            step.after.remove(t);
        }
    }
    for &t in &step.entry_list {
        if chart.is_leaf(t) {
            step.after.insert(t);
        }
    }

    Ok(())
}

/// Computes the default-initial configuration from the root: the entry
/// list and active leaves of a freshly reset machine.
pub fn determine_initial_states(
    chart: &Chart,
    step: &mut Step,
    memory: &HistoryMemory,
) -> Result<(), ModelError> {
    let mut entries: BTreeSet<TargetId> = BTreeSet::new();
    let root = chart.root();
    for &initial in chart.initial(root) {
        enter_target(chart, root, initial, memory, &mut entries)?;
    }
    complete_parallel_regions(chart, memory, &mut entries)?;

    step.entry_list = entries.iter().copied().collect();
    for &t in &step.entry_list {
        if chart.is_leaf(t) {
            step.after.insert(t);
        }
    }
    Ok(())
}

/// Adds `target` and everything its entry implies to the entry set.
fn enter_target(
    chart: &Chart,
    from: TargetId,
    target: TargetId,
    memory: &HistoryMemory,
    entries: &mut BTreeSet<TargetId>,
) -> Result<(), ModelError> {
    if let TargetKind::History { default, .. } = &chart.node(target).kind {
        // The history node itself is never entered; its memory (or its
        // default while memory is empty) stands in for it.
        let parent = chart
            .parent(target)
            .ok_or_else(|| ModelError::MalformedHistory {
                reason: format!("history state '{}' has no parent", chart.node(target).id),
            })?;
        add_path(chart, from, parent, entries);
        let remembered: Vec<TargetId> = match memory.recall(target) {
            Some(snapshot) => snapshot.to_vec(),
            None => default.clone(),
        };
        if remembered.is_empty() {
            return Err(ModelError::MalformedHistory {
                reason: format!(
                    "history state '{}' has neither memory nor default targets",
                    chart.node(target).id
                ),
            });
        }
        for t in remembered {
            enter_target(chart, parent, t, memory, entries)?;
        }
        return Ok(());
    }

    add_path(chart, from, target, entries);
    descend(chart, target, memory, entries)
}

/// Inserts `target` and its ancestors strictly below `from`.
fn add_path(chart: &Chart, from: TargetId, target: TargetId, entries: &mut BTreeSet<TargetId>) {
    let mut cur = Some(target);
    while let Some(t) = cur {
        if t == from {
            break;
        }
        entries.insert(t);
        cur = chart.parent(t);
    }
}

/// Default-initial descent below an entered state.
fn descend(
    chart: &Chart,
    target: TargetId,
    memory: &HistoryMemory,
    entries: &mut BTreeSet<TargetId>,
) -> Result<(), ModelError> {
    match &chart.node(target).kind {
        TargetKind::Compound { initial, .. } => {
            for &i in initial {
                enter_target(chart, target, i, memory, entries)?;
            }
            Ok(())
        }
        TargetKind::Parallel { regions } => {
            for &r in regions {
                enter_target(chart, target, r, memory, entries)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// A parallel entered on the way to a nested target activates all of its
/// regions, not just the one on the path.
fn complete_parallel_regions(
    chart: &Chart,
    memory: &HistoryMemory,
    entries: &mut BTreeSet<TargetId>,
) -> Result<(), ModelError> {
    loop {
        let mut missing: Vec<(TargetId, TargetId)> = Vec::new();
        for &t in entries.iter() {
            if chart.is_parallel(t) {
                for &region in chart.children(t) {
                    if !entries.contains(&region) {
                        missing.push((t, region));
                    }
                }
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        for (parallel, region) in missing {
            enter_target(chart, parallel, region, memory, entries)?;
        }
    }
}
