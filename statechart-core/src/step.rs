//! The per-cycle working record.

use crate::chart::{TargetId, TransitionId};
use crate::event::TriggerEvent;
use crate::status::Status;

/// A transient record scoped to one cycle.
///
/// Created fresh each cycle and discarded once the cycle commits; it owns
/// no state across cycles. The phases fill it in order: selection writes
/// `transitions`, planning writes the exit and entry lists and adjusts
/// `after`, the action runner appends derived events to `after`.
#[derive(Debug)]
pub struct Step {
    /// Events consumed this cycle: the caller-supplied batch plus the
    /// internal queue accumulated in the previous status.
    pub events: Vec<TriggerEvent>,

    /// The configuration the cycle starts from.
    pub before: Status,

    /// The working configuration; published as the new current status when
    /// the cycle commits. Its event queue starts empty and collects the
    /// events derived during this cycle.
    pub after: Status,

    /// Selected transitions in document order, conflict-free after
    /// filtering.
    pub transitions: Vec<TransitionId>,

    /// States to exit, innermost first.
    pub exit_list: Vec<TargetId>,

    /// States to enter, outermost first.
    pub entry_list: Vec<TargetId>,
}

impl Step {
    /// Builds the step for one cycle. Cannot fail and has no side effects
    /// beyond record construction.
    pub fn new(external: Vec<TriggerEvent>, current: &Status) -> Self {
        let mut events = external;
        events.extend(current.events().iter().cloned());

        let mut after = Status::new();
        for &s in current.states() {
            after.insert(s);
        }

        Self {
            events,
            before: current.clone(),
            after,
            transitions: Vec::new(),
            exit_list: Vec::new(),
            entry_list: Vec::new(),
        }
    }
}
