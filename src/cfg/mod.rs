//! Control Flow Graph (CFG) module
//!
//! This module holds the node graph built from the instruction feed. Nodes
//! live in an arena and refer to each other by [`NodeId`]; control edges are
//! kept symmetric (`outgoing` of one side always mirrors `incoming` of the
//! other) and the textual order of the nodes is tracked separately from the
//! edges.

pub mod disposal;
pub mod dominators;
pub mod exception;
pub mod node;
pub mod stack;
pub mod switch;
pub mod visualization;

pub use exception::{CatchEntry, TryCatchFinally, TryCatchFinallyBlocks};
pub use node::{
    Arrivals, BreakableId, Destination, DominatorState, Node, NodeId, SwitchId, TryId, VisitState,
};
pub use switch::SwitchRecord;

use crate::bytecode::LabelId;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

/// Arena of nodes for one unit
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: Vec<node::Node>,
    /// Live nodes in appearance order
    order: Vec<NodeId>,
    labels: HashMap<LabelId, NodeId>,
    /// Set by every edge mutation; cached dominators are dropped on the next query
    dominance_dirty: Cell<bool>,
    /// Dominator computations in progress, with a flag marking results that
    /// observed an unfinished computation further down
    computing: RefCell<Vec<(NodeId, bool)>>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Number of nodes ever allocated, disposed ones included
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Live nodes in appearance order
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn entry(&self) -> Option<NodeId> {
        self.order.first().copied()
    }

    pub fn contains_label(&self, label: LabelId) -> bool {
        self.labels.contains_key(&label)
    }

    pub fn label_node(&self, label: LabelId) -> Option<NodeId> {
        self.labels.get(&label).copied()
    }

    fn allocate(&mut self, label: Option<LabelId>, name: String) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, label, name));
        id
    }

    /// Node for `label`, created on first use
    pub fn get_or_create(&mut self, label: LabelId) -> NodeId {
        if let Some(&id) = self.labels.get(&label) {
            return id;
        }
        let id = self.allocate(Some(label), format!("L{}", label));
        self.labels.insert(label, id);
        id
    }

    /// Synthesized node with no label
    pub fn create_anonymous(&mut self) -> NodeId {
        let index = self.nodes.len();
        self.allocate(None, format!("N{}", index))
    }

    /// Whether `id` already occupies a position in appearance order
    pub fn is_placed(&self, id: NodeId) -> bool {
        self.order.contains(&id)
    }

    /// Append `id` at the end of appearance order and link it after the previous last node
    pub fn append(&mut self, id: NodeId) {
        if let Some(&last) = self.order.last() {
            self.link(Some(last), Some(id));
        }
        self.order.push(id);
    }

    /// Create a node placed right after `after` in appearance order
    pub fn insert_after(&mut self, after: NodeId) -> NodeId {
        let id = self.create_anonymous();
        let next = self.node(after).next;
        let position = self.position(after).map_or(self.order.len(), |p| p + 1);
        self.order.insert(position, id);
        self.link(Some(after), Some(id));
        self.link(Some(id), next);
        id
    }

    /// Create a node placed right before `before` in appearance order
    pub fn insert_before(&mut self, before: NodeId) -> NodeId {
        let id = self.create_anonymous();
        let previous = self.node(before).previous;
        let position = self.position(before).unwrap_or(0);
        self.order.insert(position, id);
        self.link(previous, Some(id));
        self.link(Some(id), Some(before));
        id
    }

    pub(crate) fn remove_from_order(&mut self, id: NodeId) {
        if let Some(position) = self.position(id) {
            self.order.remove(position);
        }
    }

    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == id)
    }

    /// Appearance-order link; independent of control edges
    pub fn link(&mut self, previous: Option<NodeId>, next: Option<NodeId>) {
        if let Some(previous) = previous {
            self.nodes[previous.0].next = next;
        }
        if let Some(next) = next {
            self.nodes[next.0].previous = previous;
        }
    }

    /// Add the edge `from -> to`. Connecting to [`Destination::Termination`] is a no-op.
    pub fn connect(&mut self, from: NodeId, to: Destination) {
        if let Destination::Node(to) = to {
            self.connect_nodes(from, to);
        }
    }

    pub fn connect_nodes(&mut self, from: NodeId, to: NodeId) {
        if !self.nodes[from.0].outgoing.contains(&to) {
            self.nodes[from.0].outgoing.push(to);
            self.nodes[to.0].incoming.push(from);
            self.invalidate_dominance();
        }
    }

    /// Remove the edge `from -> to`, together with its back-edge mark
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        let had = self.nodes[from.0].outgoing.contains(&to);
        self.nodes[from.0].outgoing.retain(|&n| n != to);
        let target = &mut self.nodes[to.0];
        target.incoming.retain(|&n| n != from);
        target.backedges.retain(|&n| n != from);
        if had {
            self.invalidate_dominance();
        }
    }

    /// Dominance-only edge from a protected region start to its handler
    pub fn add_handler_edge(&mut self, start: NodeId, handler: NodeId) {
        if start != handler && !self.nodes[handler.0].handler_sources.contains(&start) {
            self.nodes[handler.0].handler_sources.push(start);
            self.invalidate_dominance();
        }
    }

    pub fn set_destination(&mut self, node: NodeId, destination: Destination) {
        self.nodes[node.0].destination = Some(destination);
    }

    /// Destination node a reference to `id` should be redirected to once
    /// `id` is gone: the explicit destination, or the textual successor for
    /// terminating nodes.
    pub fn resolved_destination(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        match node.destination {
            Some(Destination::Node(target)) => Some(target),
            Some(Destination::Termination) => node.next,
            None => node.outgoing.first().copied().or(node.next),
        }
    }

    /// Splice a fresh node onto the edge `from -> to`
    pub fn create_connector(&mut self, from: NodeId, to: NodeId) -> NodeId {
        let connector = self.insert_after(from);
        self.nodes[connector.0].name = format!("{}*{}", self.nodes[from.0].name, self.nodes[to.0].name);
        self.nodes[connector.0].disposable = false;
        let was_back = self.nodes[to.0].backedges.contains(&from);
        self.disconnect(from, to);
        self.connect_nodes(from, connector);
        self.connect_nodes(connector, to);
        if was_back {
            self.nodes[to.0].backedges.push(connector);
        }
        self.nodes[connector.0].destination = Some(Destination::Node(to));
        if self.nodes[from.0].destination == Some(Destination::Node(to)) {
            self.nodes[from.0].destination = Some(Destination::Node(connector));
        }
        for operand in &mut self.nodes[from.0].stack {
            if let Some(condition) = operand.as_condition_mut() {
                condition.retarget(to, Some(connector));
            }
        }
        connector
    }

    /// Breadth-first reachability from `from` to `to`, never entering `exclusions`
    pub fn can_reach(&self, from: NodeId, to: NodeId, exclusions: &[NodeId]) -> bool {
        let mut recorder: HashSet<NodeId> = exclusions.iter().copied().collect();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !recorder.insert(current) {
                continue;
            }
            queue.extend(self.nodes[current.0].outgoing.iter().copied());
        }
        false
    }

    pub fn pure_incoming(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.0].pure_incoming()
    }

    /// Number of edges among live nodes
    pub fn edge_count(&self) -> usize {
        self.order.iter().map(|&id| self.nodes[id.0].outgoing.len()).sum()
    }

    /// One-line description of a node for traces
    pub fn describe(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        let names = |ids: &[NodeId]| ids.iter().map(|&n| self.nodes[n.0].name.clone()).collect::<Vec<_>>().join(",");
        let operands = node.stack.iter().map(|o| o.to_string()).collect::<Vec<_>>().join("; ");
        format!(
            "{} in[{}] out[{}] back[{}] dom[{}] {{{}}}",
            node.name,
            names(&node.incoming),
            names(&node.outgoing),
            names(&node.backedges),
            self.dominator(id).map_or_else(String::new, |d| self.nodes[d.0].name.clone()),
            operands
        )
    }

    /// Multi-line dump of every live node, attached to unsupported-idiom errors
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for &id in &self.order {
            let _ = writeln!(out, "  {}", self.describe(id));
        }
        out
    }

    /// Check that every edge is mirrored and back-edges are incoming edges
    pub fn verify_symmetry(&self) -> Result<(), String> {
        for &id in &self.order {
            let node = &self.nodes[id.0];
            for &out in &node.outgoing {
                if !self.nodes[out.0].incoming.contains(&id) {
                    return Err(format!("{} -> {} has no incoming mirror", node.name, self.nodes[out.0].name));
                }
            }
            for &inc in &node.incoming {
                if !self.nodes[inc.0].outgoing.contains(&id) {
                    return Err(format!("{} <- {} has no outgoing mirror", node.name, self.nodes[inc.0].name));
                }
            }
            for back in &node.backedges {
                if !node.incoming.contains(back) {
                    return Err(format!("back-edge {} -> {} is not incoming", self.nodes[back.0].name, node.name));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut graph = NodeGraph::new();
        let a = graph.get_or_create(3);
        let b = graph.get_or_create(3);
        assert_eq!(a, b);
        assert_eq!(graph.node(a).name, "L3");
    }

    #[test]
    fn termination_connect_is_noop() {
        let mut graph = NodeGraph::new();
        let a = graph.get_or_create(0);
        graph.append(a);
        graph.connect(a, Destination::Termination);
        assert!(graph.node(a).outgoing.is_empty());
    }

    #[test]
    fn connector_splices_edge() {
        let mut graph = NodeGraph::new();
        let a = graph.get_or_create(0);
        let b = graph.get_or_create(1);
        graph.append(a);
        graph.append(b);
        graph.connect_nodes(a, b);
        graph.set_destination(a, Destination::Node(b));
        let c = graph.create_connector(a, b);
        assert_eq!(graph.node(a).outgoing, vec![c]);
        assert_eq!(graph.node(b).incoming, vec![c]);
        assert_eq!(graph.node(a).destination, Some(Destination::Node(c)));
        assert_eq!(graph.order(), &[a, c, b]);
        assert!(graph.verify_symmetry().is_ok());
        assert!(graph.can_reach(a, b, &[]));
        assert!(!graph.can_reach(a, b, &[c]));
    }
}
