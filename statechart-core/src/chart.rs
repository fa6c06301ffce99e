//! Chart definition types.
//!
//! A chart is the immutable state-machine graph: states, parallel regions,
//! history pseudostates and transitions, stored as an arena indexed by
//! [`TargetId`]. Node indices follow document order (a depth-first walk of
//! the raw definition with parents before children), which is the single
//! tie-break used everywhere determinism matters.
//!
//! Chart definitions use a JSON DSL:
//!
//! ```json
//! {
//!   "initial": "idle",
//!   "states": [
//!     {"id": "idle", "transitions": [{"event": "start", "to": "running"}]},
//!     {"id": "running",
//!      "initial": "warming",
//!      "states": [
//!        {"id": "warming", "transitions": [{"event": "ready", "to": "steady"}]},
//!        {"id": "steady"},
//!        {"id": "mem", "history": "shallow", "default": "warming"}
//!      ],
//!      "transitions": [{"event": "stop", "to": "idle"}]}
//!   ]
//! }
//! ```

use crate::action::{Action, RawAction};
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Index of a target in the chart arena. Ordering is document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub(crate) u32);

impl TargetId {
    /// Position in the arena, equal to document order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies one transition by its source and position among the source's
/// outgoing transitions. Ordering is document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionId {
    pub source: TargetId,
    pub index: usize,
}

/// The closed set of target variants.
#[derive(Debug, Clone)]
pub enum TargetKind {
    /// A leaf state with no substates.
    Atomic,
    /// Mutually-exclusive substates; exactly one active at a time.
    Compound {
        children: Vec<TargetId>,
        initial: Vec<TargetId>,
    },
    /// Concurrently active regions.
    Parallel { regions: Vec<TargetId> },
    /// A terminal leaf.
    Final,
    /// Resolves to a previously recorded configuration when entered.
    History { deep: bool, default: Vec<TargetId> },
}

/// A node in the chart arena.
#[derive(Debug, Clone)]
pub struct TargetNode {
    /// Unique identifier across the whole machine.
    pub id: String,
    pub(crate) parent: Option<TargetId>,
    pub kind: TargetKind,
    /// Actions run when the state is entered, in list order.
    pub on_entry: Vec<Arc<dyn Action>>,
    /// Actions run when the state is exited, in list order.
    pub on_exit: Vec<Arc<dyn Action>>,
    /// Outgoing transitions, in document order.
    pub transitions: Vec<Transition>,
}

/// A transition owned by its source target.
#[derive(Debug, Clone)]
pub struct Transition {
    pub source: TargetId,
    /// Absent means eventless: eligible without an external trigger.
    pub event: Option<String>,
    /// Optional guard expression, evaluated by the embedding's evaluator.
    pub cond: Option<String>,
    /// Resolved targets. Empty means an internal transition: actions run,
    /// nothing is exited or entered.
    pub targets: Vec<TargetId>,
    /// Actions run when the transition fires, in list order.
    pub actions: Vec<Arc<dyn Action>>,
}

/// History depth as written in the raw definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryDepth {
    Shallow,
    Deep,
}

/// Raw state as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawState {
    pub id: String,

    /// Marks a parallel state; all child states become regions.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parallel: bool,

    /// Marks a final (terminal) state.
    #[serde(default, rename = "final", skip_serializing_if = "std::ops::Not::not")]
    pub is_final: bool,

    /// Marks a history pseudostate and selects its depth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryDepth>,

    /// Default targets of a history pseudostate, used while no memory has
    /// been recorded.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub default: Vec<String>,

    /// Initial child of a compound state. Defaults to the first non-history
    /// child in document order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<RawState>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_entry: Vec<RawAction>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_exit: Vec<RawAction>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<RawTransition>,
}

/// Raw transition as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransition {
    /// Triggering event name. Absent means eventless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Optional guard expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,

    /// Target state(s). Can be a single id or an array; empty means an
    /// internal transition.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub to: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<RawAction>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct OneOrManyVisitor;

    impl<'de> Visitor<'de> for OneOrManyVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or array of strings")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(s) = seq.next_element::<String>()? {
                out.push(s);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(OneOrManyVisitor)
}

/// Raw chart definition as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChart {
    /// Initial top-level state. Defaults to the first state in document
    /// order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    pub states: Vec<RawState>,

    /// Optional metadata, ignored by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Validated and indexed chart definition.
///
/// Immutable for the lifetime of an executor; history memory lives in the
/// executor so one chart can be shared by many instances.
#[derive(Debug, Clone)]
pub struct Chart {
    /// Chart name. Doubles as the root target's id.
    pub name: String,

    /// Version number.
    pub version: u32,

    /// Arena of targets in document order. Index 0 is the implicit root
    /// compound.
    nodes: Vec<TargetNode>,

    /// Targets indexed by id. The root is not addressable.
    ids: HashMap<String, TargetId>,

    /// Original raw definition for storage.
    pub raw: RawChart,

    /// Hash of the definition for integrity checks.
    pub checksum: String,
}

impl Chart {
    /// Parses and validates a chart definition from JSON.
    pub fn from_json(
        name: impl Into<String>,
        version: u32,
        json: &serde_json::Value,
    ) -> Result<Self, ModelError> {
        let raw: RawChart = serde_json::from_value(json.clone())?;
        Self::from_raw(name, version, raw)
    }

    /// Builds and validates a chart from raw parts.
    pub fn from_raw(
        name: impl Into<String>,
        version: u32,
        raw: RawChart,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if raw.states.is_empty() {
            return Err(ModelError::InvalidDefinition {
                reason: "chart has no states".to_string(),
            });
        }

        let mut builder = Builder::default();

        // Implicit root compound owning the top-level states.
        builder.nodes.push(TargetNode {
            id: name.clone(),
            parent: None,
            kind: TargetKind::Compound {
                children: Vec::new(),
                initial: Vec::new(),
            },
            on_entry: Vec::new(),
            on_exit: Vec::new(),
            transitions: Vec::new(),
        });

        let root = TargetId(0);
        let mut top = Vec::with_capacity(raw.states.len());
        for rs in &raw.states {
            top.push(builder.build_node(rs, root)?);
        }
        if let TargetKind::Compound { children, .. } = &mut builder.nodes[0].kind {
            *children = top;
        }
        builder.pending_initial.push((root, raw.initial.clone()));

        builder.resolve(&name)?;

        let json_bytes = serde_json::to_vec(&raw)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            name,
            version,
            nodes: builder.nodes,
            ids: builder.ids,
            raw,
            checksum,
        })
    }

    /// The implicit root compound.
    pub fn root(&self) -> TargetId {
        TargetId(0)
    }

    /// Number of targets, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node access. Panics on a foreign `TargetId`; ids are only ever
    /// produced by this chart.
    pub fn node(&self, t: TargetId) -> &TargetNode {
        &self.nodes[t.index()]
    }

    /// Looks a target up by id. The root is not addressable.
    pub fn target_by_id(&self, id: &str) -> Option<TargetId> {
        self.ids.get(id).copied()
    }

    pub fn parent(&self, t: TargetId) -> Option<TargetId> {
        self.node(t).parent
    }

    /// The transition a [`TransitionId`] refers to.
    pub fn transition(&self, id: &TransitionId) -> &Transition {
        &self.node(id.source).transitions[id.index]
    }

    /// Child targets of a compound (history children included) or the
    /// regions of a parallel. Empty for leaves.
    pub fn children(&self, t: TargetId) -> &[TargetId] {
        match &self.node(t).kind {
            TargetKind::Compound { children, .. } => children,
            TargetKind::Parallel { regions } => regions,
            _ => &[],
        }
    }

    /// Default-initial targets of a compound. Empty for other kinds.
    pub fn initial(&self, t: TargetId) -> &[TargetId] {
        match &self.node(t).kind {
            TargetKind::Compound { initial, .. } => initial,
            _ => &[],
        }
    }

    /// True for atomic and final states, the only targets that appear in an
    /// active configuration.
    pub fn is_leaf(&self, t: TargetId) -> bool {
        matches!(self.node(t).kind, TargetKind::Atomic | TargetKind::Final)
    }

    pub fn is_parallel(&self, t: TargetId) -> bool {
        matches!(self.node(t).kind, TargetKind::Parallel { .. })
    }

    /// True if `t` is a strict descendant of `anc`.
    pub fn is_proper_descendant(&self, t: TargetId, anc: TargetId) -> bool {
        let mut cur = self.parent(t);
        while let Some(p) = cur {
            if p == anc {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// All targets in document order, root first.
    pub fn targets(&self) -> impl Iterator<Item = (TargetId, &TargetNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (TargetId(i as u32), n))
    }

    /// All transitions in document order.
    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.nodes.iter().enumerate().flat_map(|(i, n)| {
            n.transitions.iter().enumerate().map(move |(j, tr)| {
                (
                    TransitionId {
                        source: TargetId(i as u32),
                        index: j,
                    },
                    tr,
                )
            })
        })
    }

    /// Returns the raw definition as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.raw).unwrap()
    }

    /// Attaches a programmatic entry action to a state.
    ///
    /// Raw definitions only reach the standard action vocabulary; custom
    /// [`Action`] implementations are attached here, before the chart is
    /// shared with executors. Attached actions are not part of the raw
    /// definition and do not survive [`Chart::to_json`].
    pub fn add_entry_action(
        &mut self,
        id: &str,
        action: Arc<dyn Action>,
    ) -> Result<(), ModelError> {
        let t = self.lookup(id)?;
        self.nodes[t.index()].on_entry.push(action);
        Ok(())
    }

    /// Attaches a programmatic exit action to a state.
    pub fn add_exit_action(&mut self, id: &str, action: Arc<dyn Action>) -> Result<(), ModelError> {
        let t = self.lookup(id)?;
        self.nodes[t.index()].on_exit.push(action);
        Ok(())
    }

    /// Attaches a programmatic action to the `index`-th transition of a
    /// source state.
    pub fn add_transition_action(
        &mut self,
        source: &str,
        index: usize,
        action: Arc<dyn Action>,
    ) -> Result<(), ModelError> {
        let t = self.lookup(source)?;
        let node = &mut self.nodes[t.index()];
        let tr = node
            .transitions
            .get_mut(index)
            .ok_or_else(|| ModelError::InvalidDefinition {
                reason: format!("state '{source}' has no transition #{index}"),
            })?;
        tr.actions.push(action);
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<TargetId, ModelError> {
        self.target_by_id(id)
            .ok_or_else(|| ModelError::UnknownTarget { id: id.to_string() })
    }
}

/// Two-pass construction: nodes and ids first, then name resolution once
/// every id is known.
#[derive(Default)]
struct Builder {
    nodes: Vec<TargetNode>,
    ids: HashMap<String, TargetId>,
    pending_targets: Vec<(TargetId, usize, Vec<String>)>,
    pending_initial: Vec<(TargetId, Option<String>)>,
    pending_history: Vec<(TargetId, Vec<String>)>,
}

impl Builder {
    fn build_node(&mut self, raw: &RawState, parent: TargetId) -> Result<TargetId, ModelError> {
        let tid = TargetId(self.nodes.len() as u32);
        if self.ids.insert(raw.id.clone(), tid).is_some() {
            return Err(ModelError::DuplicateId { id: raw.id.clone() });
        }

        if raw.history.is_some() {
            if raw.parallel || raw.is_final || !raw.states.is_empty() {
                return Err(ModelError::MalformedHistory {
                    reason: format!("history state '{}' cannot have children or other kinds", raw.id),
                });
            }
            if !raw.transitions.is_empty() || !raw.on_entry.is_empty() || !raw.on_exit.is_empty() {
                return Err(ModelError::MalformedHistory {
                    reason: format!("history state '{}' cannot carry transitions or actions", raw.id),
                });
            }
            if raw.default.is_empty() {
                return Err(ModelError::MalformedHistory {
                    reason: format!("history state '{}' has no default targets", raw.id),
                });
            }
        }
        if raw.parallel && raw.is_final {
            return Err(ModelError::InvalidDefinition {
                reason: format!("state '{}' cannot be both parallel and final", raw.id),
            });
        }
        if raw.is_final && !raw.states.is_empty() {
            return Err(ModelError::InvalidDefinition {
                reason: format!("final state '{}' cannot have children", raw.id),
            });
        }
        if raw.parallel && raw.states.is_empty() {
            return Err(ModelError::InvalidDefinition {
                reason: format!("parallel state '{}' has no regions", raw.id),
            });
        }
        if raw.is_final && !raw.transitions.is_empty() {
            return Err(ModelError::InvalidDefinition {
                reason: format!("final state '{}' cannot have outgoing transitions", raw.id),
            });
        }

        let kind = if let Some(depth) = raw.history {
            TargetKind::History {
                deep: depth == HistoryDepth::Deep,
                default: Vec::new(),
            }
        } else if raw.parallel {
            TargetKind::Parallel {
                regions: Vec::new(),
            }
        } else if raw.is_final {
            TargetKind::Final
        } else if raw.states.is_empty() {
            TargetKind::Atomic
        } else {
            TargetKind::Compound {
                children: Vec::new(),
                initial: Vec::new(),
            }
        };

        let mut transitions = Vec::with_capacity(raw.transitions.len());
        for (index, rt) in raw.transitions.iter().enumerate() {
            self.pending_targets.push((tid, index, rt.to.clone()));
            transitions.push(Transition {
                source: tid,
                event: rt.event.clone(),
                cond: rt.cond.clone(),
                targets: Vec::new(),
                actions: rt.actions.iter().map(RawAction::build).collect(),
            });
        }

        self.nodes.push(TargetNode {
            id: raw.id.clone(),
            parent: Some(parent),
            kind,
            on_entry: raw.on_entry.iter().map(RawAction::build).collect(),
            on_exit: raw.on_exit.iter().map(RawAction::build).collect(),
            transitions,
        });

        if raw.history.is_some() {
            self.pending_history.push((tid, raw.default.clone()));
        }

        let mut children = Vec::with_capacity(raw.states.len());
        for child in &raw.states {
            children.push(self.build_node(child, tid)?);
        }

        match &mut self.nodes[tid.index()].kind {
            TargetKind::Compound {
                children: slot, ..
            } => {
                *slot = children;
                self.pending_initial.push((tid, raw.initial.clone()));
            }
            TargetKind::Parallel { regions } => {
                *regions = children;
            }
            _ => {}
        }

        Ok(tid)
    }

    fn resolve(&mut self, chart_name: &str) -> Result<(), ModelError> {
        let lookup = |ids: &HashMap<String, TargetId>, id: &str| -> Result<TargetId, ModelError> {
            ids.get(id)
                .copied()
                .ok_or_else(|| ModelError::UnknownTarget { id: id.to_string() })
        };

        // Transition targets.
        for (source, index, names) in std::mem::take(&mut self.pending_targets) {
            let mut targets = Vec::with_capacity(names.len());
            for name in &names {
                targets.push(lookup(&self.ids, name)?);
            }
            self.nodes[source.index()].transitions[index].targets = targets;
        }

        // Compound initial children.
        for (compound, name) in std::mem::take(&mut self.pending_initial) {
            let children: Vec<TargetId> = match &self.nodes[compound.index()].kind {
                TargetKind::Compound { children, .. } => children.clone(),
                _ => continue,
            };
            let initial = match name {
                Some(name) => {
                    let t = lookup(&self.ids, &name)?;
                    if !children.contains(&t) {
                        return Err(ModelError::InvalidDefinition {
                            reason: format!(
                                "initial '{}' is not a child of '{}'",
                                name,
                                self.nodes[compound.index()].id
                            ),
                        });
                    }
                    t
                }
                None => {
                    let first = children.iter().copied().find(|&c| {
                        !matches!(self.nodes[c.index()].kind, TargetKind::History { .. })
                    });
                    match first {
                        Some(t) => t,
                        None => {
                            let id = if compound == TargetId(0) {
                                chart_name.to_string()
                            } else {
                                self.nodes[compound.index()].id.clone()
                            };
                            return Err(ModelError::MissingInitial { id });
                        }
                    }
                }
            };
            if let TargetKind::Compound { initial: slot, .. } =
                &mut self.nodes[compound.index()].kind
            {
                *slot = vec![initial];
            }
        }

        // History defaults.
        for (history, names) in std::mem::take(&mut self.pending_history) {
            let parent = self.nodes[history.index()].parent.ok_or_else(|| {
                ModelError::MalformedHistory {
                    reason: format!(
                        "history state '{}' has no parent",
                        self.nodes[history.index()].id
                    ),
                }
            })?;
            if !matches!(self.nodes[parent.index()].kind, TargetKind::Compound { .. }) {
                return Err(ModelError::MalformedHistory {
                    reason: format!(
                        "history state '{}' must be the child of a compound state",
                        self.nodes[history.index()].id
                    ),
                });
            }
            let mut defaults = Vec::with_capacity(names.len());
            for name in &names {
                let t = lookup(&self.ids, name)?;
                if !is_proper_descendant(&self.nodes, t, parent) {
                    return Err(ModelError::MalformedHistory {
                        reason: format!(
                            "default '{}' of history '{}' is not a descendant of its parent",
                            name,
                            self.nodes[history.index()].id
                        ),
                    });
                }
                defaults.push(t);
            }
            if let TargetKind::History { default, .. } = &mut self.nodes[history.index()].kind {
                *default = defaults;
            }
        }

        // Parallel regions must be plain states.
        for node in &self.nodes {
            if let TargetKind::Parallel { regions } = &node.kind {
                for &r in regions {
                    if matches!(
                        self.nodes[r.index()].kind,
                        TargetKind::History { .. } | TargetKind::Final
                    ) {
                        return Err(ModelError::InvalidDefinition {
                            reason: format!(
                                "region '{}' of parallel '{}' must be a state",
                                self.nodes[r.index()].id, node.id
                            ),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

fn is_proper_descendant(nodes: &[TargetNode], t: TargetId, anc: TargetId) -> bool {
    let mut cur = nodes[t.index()].parent;
    while let Some(p) = cur {
        if p == anc {
            return true;
        }
        cur = nodes[p.index()].parent;
    }
    false
}
