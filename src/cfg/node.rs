//! Node types
//!
//! A [`Node`] is one basic block: the operands left on its stack after
//! symbolic execution, its control edges and the bookkeeping the later
//! passes attach to it.

use crate::bytecode::LabelId;
use crate::operand::Operand;
use crate::structure::StructureId;
use std::cell::Cell;
use std::fmt;

/// Arena index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Index of a try/catch/finally record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TryId(pub usize);

/// Index of a switch record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchId(pub usize);

/// Index of a loop or switch the structure recognizer tracks for break/continue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakableId(pub usize);

/// Where control goes after the last operand of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Node(NodeId),
    /// The node ends in `return` or `throw`
    Termination,
}

impl Destination {
    pub fn node(self) -> Option<NodeId> {
        match self {
            Destination::Node(id) => Some(id),
            Destination::Termination => None,
        }
    }
}

/// Cached immediate dominator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DominatorState {
    Unknown,
    /// Being computed; re-entrant queries answer "not yet known"
    Computing,
    /// `None` for the entry node and unreachable nodes
    Known(Option<NodeId>),
}

/// Visits a node received from its predecessors while structuring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arrivals {
    /// Predecessors whose edge has been traversed
    pub sources: Vec<NodeId>,
    /// Visits granted by enclosing structures (catch handlers)
    pub additional: usize,
}

impl Arrivals {
    pub fn count(&self) -> usize {
        self.sources.len() + self.additional
    }
}

/// Structuring progress of a node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VisitState {
    #[default]
    Unvisited,
    /// Some but not all predecessors have arrived
    PartiallyFolded(Arrivals),
    /// The node has been turned into a structure
    Done(Arrivals),
}

impl VisitState {
    pub fn arrivals(&self) -> Option<&Arrivals> {
        match self {
            VisitState::Unvisited => None,
            VisitState::PartiallyFolded(arrivals) | VisitState::Done(arrivals) => Some(arrivals),
        }
    }

    pub fn calls(&self) -> usize {
        self.arrivals().map_or(0, Arrivals::count)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, VisitState::Done(_))
    }

    /// Record one visit: an edge from `source`, or an additional visit when
    /// `source` is `None`. Repeated edges count once.
    pub fn arrive(&mut self, source: Option<NodeId>) {
        let done = self.is_done();
        let mut arrivals = match std::mem::take(self) {
            VisitState::Unvisited => Arrivals::default(),
            VisitState::PartiallyFolded(arrivals) | VisitState::Done(arrivals) => arrivals,
        };
        match source {
            Some(source) if !arrivals.sources.contains(&source) => arrivals.sources.push(source),
            Some(_) => {}
            None => arrivals.additional += 1,
        }
        *self = if done {
            VisitState::Done(arrivals)
        } else {
            VisitState::PartiallyFolded(arrivals)
        };
    }

    /// Mark the node structured, keeping the arrivals seen so far
    pub fn finish(&mut self) {
        let arrivals = match std::mem::take(self) {
            VisitState::Unvisited => Arrivals::default(),
            VisitState::PartiallyFolded(arrivals) | VisitState::Done(arrivals) => arrivals,
        };
        *self = VisitState::Done(arrivals);
    }
}

/// A basic block
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    /// Label this node was created for, `None` for synthesized nodes
    pub label: Option<LabelId>,
    /// Display name used in dumps and DOT output
    pub name: String,
    pub stack: Vec<Operand>,
    pub incoming: Vec<NodeId>,
    pub outgoing: Vec<NodeId>,
    /// Subset of `incoming` closing a cycle
    pub backedges: Vec<NodeId>,
    /// Starts of protected regions this node handles exceptions for; these
    /// take part in dominance but not in structuring
    pub handler_sources: Vec<NodeId>,
    pub(crate) dominator: Cell<DominatorState>,
    /// Enclosing try records, outermost last
    pub tries: Vec<TryId>,
    pub destination: Option<Destination>,
    pub previous: Option<NodeId>,
    pub next: Option<NodeId>,
    /// Loops and switches this node is the header, checkpoint or exit of
    pub breakables: Vec<BreakableId>,
    pub structure: Option<StructureId>,
    pub visit: VisitState,
    /// Visits expected from enclosing structures rather than edges
    pub additional_calls: usize,
    pub disposable: bool,
    pub disposed: bool,
    /// Switch-expression values converge here
    pub yield_convergence: bool,
    pub switch: Option<SwitchId>,
    pub line: Option<u32>,
}

impl Node {
    pub(crate) fn new(id: NodeId, label: Option<LabelId>, name: String) -> Self {
        Self {
            id,
            label,
            name,
            stack: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            backedges: Vec::new(),
            handler_sources: Vec::new(),
            dominator: Cell::new(DominatorState::Unknown),
            tries: Vec::new(),
            destination: None,
            previous: None,
            next: None,
            breakables: Vec::new(),
            structure: None,
            visit: VisitState::Unvisited,
            additional_calls: 0,
            disposable: true,
            disposed: false,
            yield_convergence: false,
            switch: None,
            line: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Incoming edges that are not back-edges
    pub fn pure_incoming(&self) -> Vec<NodeId> {
        self.incoming
            .iter()
            .copied()
            .filter(|source| !self.backedges.contains(source))
            .collect()
    }

    /// Visits required before the node can be structured
    pub fn required_calls(&self) -> usize {
        self.pure_incoming().len() + self.additional_calls
    }

    pub fn top(&self) -> Option<&Operand> {
        self.stack.last()
    }

    /// The node holds only conditions
    pub fn is_conditional(&self) -> bool {
        !self.stack.is_empty() && self.stack.iter().all(Operand::is_condition)
    }

    pub fn cached_dominator(&self) -> DominatorState {
        self.dominator.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_incoming_excludes_backedges() {
        let mut node = Node::new(NodeId(1), Some(1), "L1".into());
        node.incoming = vec![NodeId(0), NodeId(4)];
        node.backedges = vec![NodeId(4)];
        node.additional_calls = 1;
        assert_eq!(node.pure_incoming(), vec![NodeId(0)]);
        assert_eq!(node.required_calls(), 2);
    }

    #[test]
    fn visit_state_counts_arrivals() {
        let state = VisitState::PartiallyFolded(Arrivals {
            sources: vec![NodeId(2)],
            additional: 1,
        });
        assert_eq!(state.calls(), 2);
        assert!(!state.is_done());
        assert_eq!(VisitState::Unvisited.calls(), 0);
    }

    #[test]
    fn repeated_edges_arrive_once() {
        let mut state = VisitState::Unvisited;
        state.arrive(Some(NodeId(3)));
        state.arrive(Some(NodeId(3)));
        state.arrive(None);
        assert_eq!(state.calls(), 2);
        state.finish();
        assert!(state.is_done());
        state.arrive(Some(NodeId(4)));
        assert_eq!(state.calls(), 3);
        assert!(state.is_done());
    }
}
