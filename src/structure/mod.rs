//! Structure module
//!
//! This module folds a finished node graph into a tree of nested statements.
//! The [`recognizer`] walks the graph from its entry node and classifies
//! every node by its in/out degree, back-edges, protected regions and switch
//! tables; the resulting [`StructureTree`] is handed to a [`sink::CodeSink`]
//! for rendering.

pub mod enhanced_for;
pub mod loops;
pub mod pseudo;
pub mod recognizer;
pub mod sink;
pub mod switch;

pub use pseudo::PseudoCodeWriter;
pub use recognizer::StructureRecognizer;
pub use sink::{Code, CodeSink, Scope};

use crate::cfg::{BreakableId, NodeId};
use crate::operand::{Operand, VariableId};
use std::collections::HashMap;

/// Arena index of a structure. Index 0 is always [`Structure::Empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureId(pub usize);

impl StructureId {
    pub const EMPTY: StructureId = StructureId(0);

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakableKind {
    Loop,
    Switch,
}

/// A loop or switch that `break` / `continue` can target
#[derive(Debug, Clone)]
pub struct Breakable {
    pub id: BreakableId,
    pub kind: BreakableKind,
    /// Node dominating every node of the construct
    pub entrance: NodeId,
    /// First node processed inside the construct
    pub first: NodeId,
    pub exit: Option<NodeId>,
    /// Condition or update node of a loop
    pub checkpoint: Option<NodeId>,
    /// Some jump reaches this construct from inside a nested one
    pub labeled: bool,
}

impl Breakable {
    pub fn has_header(&self, node: NodeId) -> bool {
        node == self.entrance || node == self.first || Some(node) == self.checkpoint
    }

    pub fn label(&self) -> String {
        format!("l{}", self.entrance.0)
    }
}

#[derive(Debug, Clone)]
pub struct SwitchArm {
    pub keys: Vec<i32>,
    pub body: StructureId,
}

#[derive(Debug, Clone)]
pub struct CatchArm {
    /// Caught type by internal name, `None` for `finally`
    pub exception: Option<String>,
    pub variable: Option<VariableId>,
    pub body: StructureId,
}

/// One structured statement. Every variant except `Break`/`Continue`/`Empty`
/// continues with `follow`.
#[derive(Debug, Clone)]
pub enum Structure {
    Empty,
    /// The statements of one node
    Fragment {
        node: NodeId,
        follow: StructureId,
    },
    If {
        node: NodeId,
        condition: Operand,
        then: StructureId,
        elze: Option<StructureId>,
        follow: StructureId,
    },
    While {
        node: NodeId,
        breakable: BreakableId,
        condition: Operand,
        inner: StructureId,
        follow: StructureId,
    },
    DoWhile {
        node: NodeId,
        breakable: BreakableId,
        inner: StructureId,
        condition: Operand,
        follow: StructureId,
    },
    For {
        node: NodeId,
        breakable: BreakableId,
        initializer: Option<Operand>,
        condition: Operand,
        updates: Vec<Operand>,
        inner: StructureId,
        follow: StructureId,
    },
    EnhancedFor {
        node: NodeId,
        breakable: BreakableId,
        variable: Operand,
        iterable: Operand,
        inner: StructureId,
        follow: StructureId,
    },
    InfiniteLoop {
        node: NodeId,
        breakable: BreakableId,
        inner: StructureId,
        follow: StructureId,
    },
    Switch {
        node: NodeId,
        breakable: BreakableId,
        selector: Operand,
        cases: Vec<SwitchArm>,
        default: Option<StructureId>,
        /// Rendered where its `Switch` operand is used, not as a statement
        expression: bool,
        follow: StructureId,
    },
    Try {
        node: NodeId,
        body: StructureId,
        catches: Vec<CatchArm>,
        follow: StructureId,
    },
    Break {
        breakable: BreakableId,
        labeled: bool,
    },
    Continue {
        breakable: BreakableId,
        labeled: bool,
    },
}

impl Structure {
    /// Structure control reaches after this one, if any
    pub fn follow(&self) -> Option<StructureId> {
        match self {
            Structure::Empty | Structure::Break { .. } | Structure::Continue { .. } => None,
            Structure::Fragment { follow, .. }
            | Structure::If { follow, .. }
            | Structure::While { follow, .. }
            | Structure::DoWhile { follow, .. }
            | Structure::For { follow, .. }
            | Structure::EnhancedFor { follow, .. }
            | Structure::InfiniteLoop { follow, .. }
            | Structure::Switch { follow, .. }
            | Structure::Try { follow, .. } => Some(*follow),
        }
    }

    /// Loop body and the loop's breakable
    pub fn loop_body(&self) -> Option<(BreakableId, StructureId)> {
        match self {
            Structure::While { breakable, inner, .. }
            | Structure::DoWhile { breakable, inner, .. }
            | Structure::For { breakable, inner, .. }
            | Structure::EnhancedFor { breakable, inner, .. }
            | Structure::InfiniteLoop { breakable, inner, .. } => Some((*breakable, *inner)),
            _ => None,
        }
    }

    /// Short name used in traces and tests
    pub fn kind_name(&self) -> &'static str {
        match self {
            Structure::Empty => "Empty",
            Structure::Fragment { .. } => "Fragment",
            Structure::If { .. } => "If",
            Structure::While { .. } => "While",
            Structure::DoWhile { .. } => "DoWhile",
            Structure::For { .. } => "For",
            Structure::EnhancedFor { .. } => "EnhancedFor",
            Structure::InfiniteLoop { .. } => "InfiniteLoop",
            Structure::Switch { .. } => "Switch",
            Structure::Try { .. } => "Try",
            Structure::Break { .. } => "Break",
            Structure::Continue { .. } => "Continue",
        }
    }
}

/// Structured form of one unit
#[derive(Debug, Clone)]
pub struct StructureTree {
    structures: Vec<Structure>,
    by_node: HashMap<NodeId, StructureId>,
    breakables: Vec<Breakable>,
    root: StructureId,
}

impl StructureTree {
    pub(crate) fn new(
        structures: Vec<Structure>,
        by_node: HashMap<NodeId, StructureId>,
        breakables: Vec<Breakable>,
        root: StructureId,
    ) -> Self {
        Self {
            structures,
            by_node,
            breakables,
            root,
        }
    }

    pub fn root(&self) -> StructureId {
        self.root
    }

    pub fn get(&self, id: StructureId) -> &Structure {
        &self.structures[id.0]
    }

    /// Structure produced for `node`
    pub fn by_node(&self, node: NodeId) -> Option<StructureId> {
        self.by_node.get(&node).copied()
    }

    pub fn breakable(&self, id: BreakableId) -> &Breakable {
        &self.breakables[id.0]
    }

    /// Label of a breakable when some jump needs it
    pub fn label(&self, id: BreakableId) -> Option<String> {
        let breakable = self.breakable(id);
        breakable.labeled.then(|| breakable.label())
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (StructureId, &Structure)> {
        self.structures.iter().enumerate().map(|(index, s)| (StructureId(index), s))
    }

    /// Kind names of `id` and its follow chain, for tests and traces
    pub fn chain(&self, mut id: StructureId) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while !id.is_empty() {
            let structure = self.get(id);
            kinds.push(structure.kind_name());
            match structure.follow() {
                Some(next) => id = next,
                None => break,
            }
        }
        kinds
    }

    /// Switch structured on `head`, also when leading statements of the head
    /// wrap it in a fragment
    pub fn switch_at(&self, head: NodeId) -> Option<&Structure> {
        self.structures
            .iter()
            .find(|structure| matches!(structure, Structure::Switch { node, .. } if *node == head))
    }

    /// First structure of the given kind in creation order
    pub fn find(&self, kind: &str) -> Option<(StructureId, &Structure)> {
        self.iter().find(|(_, structure)| structure.kind_name() == kind)
    }
}
