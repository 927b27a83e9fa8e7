//! Virtual operand stack
//!
//! Stack operations address entries by depth from the top of a node. When a
//! depth runs past the bottom of the node, the operation continues in the
//! textually previous node through the cross-node stack read: values left
//! by the blocks of a `?:` or a switch expression are consumed by the block
//! where the branches join.

use super::{NodeGraph, NodeId};
use crate::operand::{Operand, OperandId};

impl NodeGraph {
    /// Cross-node stack read eligibility: a predecessor in textual order
    /// exists and the node is attached to the flow. Handler entries and
    /// unreachable blocks never borrow.
    pub fn can_borrow_from_previous(&self, id: NodeId) -> Option<NodeId> {
        let node = &self.nodes[id.0];
        match node.previous {
            Some(previous) if !node.incoming.is_empty() => Some(previous),
            _ => None,
        }
    }

    /// Node and vector position holding the entry `depth` below the top of `id`
    pub fn locate(&self, id: NodeId, depth: usize) -> Option<(NodeId, usize)> {
        let mut current = id;
        let mut depth = depth;
        for _ in 0..=self.nodes.len() {
            let len = self.nodes[current.0].stack.len();
            if depth < len {
                return Some((current, len - 1 - depth));
            }
            depth -= len;
            current = self.can_borrow_from_previous(current)?;
        }
        None
    }

    pub fn push(&mut self, id: NodeId, operand: Operand) {
        self.nodes[id.0].stack.push(operand);
    }

    pub fn peek(&self, id: NodeId, depth: usize) -> Option<&Operand> {
        let (node, position) = self.locate(id, depth)?;
        self.nodes[node.0].stack.get(position)
    }

    pub fn peek_mut(&mut self, id: NodeId, depth: usize) -> Option<&mut Operand> {
        let (node, position) = self.locate(id, depth)?;
        self.nodes[node.0].stack.get_mut(position)
    }

    /// Remove the entry at `depth`. A duplicated entry is handed out once
    /// and stays in place with its duplication consumed.
    pub fn pop(&mut self, id: NodeId, depth: usize) -> Option<Operand> {
        let (node, position) = self.locate(id, depth)?;
        let slot = &mut self.nodes[node.0].stack[position];
        if slot.duplicated {
            slot.duplicated = false;
            return Some(slot.clone());
        }
        Some(self.nodes[node.0].stack.remove(position))
    }

    /// Remove the entry at `depth` regardless of duplication
    pub fn take(&mut self, id: NodeId, depth: usize) -> Option<Operand> {
        let (node, position) = self.locate(id, depth)?;
        Some(self.nodes[node.0].stack.remove(position))
    }

    /// Replace the entry at `depth`; returns false when there is none
    pub fn set(&mut self, id: NodeId, depth: usize, operand: Operand) -> bool {
        match self.locate(id, depth) {
            Some((node, position)) => {
                self.nodes[node.0].stack[position] = operand;
                true
            }
            None => false,
        }
    }

    /// Live node whose stack holds the operand `operand` at top level,
    /// searching from the textually last node backwards
    pub fn owner_of(&self, operand: OperandId) -> Option<NodeId> {
        self.order
            .iter()
            .rev()
            .copied()
            .find(|&id| self.nodes[id.0].stack.iter().any(|o| o.id == operand))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::OperandKind;

    fn two_linked_nodes() -> (NodeGraph, NodeId, NodeId) {
        let mut graph = NodeGraph::new();
        let a = graph.get_or_create(0);
        let b = graph.get_or_create(1);
        graph.append(a);
        graph.append(b);
        graph.connect_nodes(a, b);
        (graph, a, b)
    }

    #[test]
    fn underflow_reads_through_previous() {
        let (mut graph, a, b) = two_linked_nodes();
        graph.push(a, Operand::int(1));
        graph.push(a, Operand::int(2));
        graph.push(b, Operand::int(3));
        assert!(graph.peek(b, 2).unwrap().is_int_constant(1));
        let taken = graph.pop(b, 1).unwrap();
        assert!(taken.is_int_constant(2));
        assert_eq!(graph.node(a).stack.len(), 1);
        assert!(graph.peek(b, 5).is_none());
    }

    #[test]
    fn detached_node_does_not_borrow() {
        let (mut graph, a, b) = two_linked_nodes();
        graph.disconnect(a, b);
        graph.push(a, Operand::int(1));
        assert!(graph.peek(b, 0).is_none());
    }

    #[test]
    fn duplicated_entry_survives_one_pop() {
        let (mut graph, a, _) = two_linked_nodes();
        let mut value = Operand::new(OperandKind::This, crate::operand::InferredType::unknown());
        value.duplicated = true;
        let id = value.id;
        graph.push(a, value);
        assert_eq!(graph.pop(a, 0).unwrap().id, id);
        assert_eq!(graph.node(a).stack.len(), 1);
        assert_eq!(graph.pop(a, 0).unwrap().id, id);
        assert!(graph.node(a).stack.is_empty());
        assert_eq!(graph.owner_of(id), None);
    }
}
