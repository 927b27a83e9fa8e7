//! Disposal, sequential-condition merge and node splitting
//!
//! Disposing a node splices it out of the graph: every predecessor is
//! connected to every successor and every reference to the node (edges,
//! destinations, condition targets, back-edge marks, textual links) is
//! redirected to the node's destination. Merging folds runs of conditional
//! jumps into single `&&`/`||` conditions.

use super::node::Destination;
use super::{NodeGraph, NodeId};
use crate::operand::{Operand, OperandCondition};

impl NodeGraph {
    /// Remove `target` from the graph.
    ///
    /// Operands move to the textual predecessor unless `clear_stack` is set.
    /// With `recursive`, a predecessor left empty is disposed as well.
    /// Returns every node disposed, in order.
    pub fn dispose(&mut self, target: NodeId, clear_stack: bool, recursive: bool) -> Vec<NodeId> {
        let mut disposed = Vec::new();
        let mut current = Some(target);
        while let Some(target) = current.take() {
            if self.nodes[target.0].disposed {
                break;
            }
            let previous = self.nodes[target.0].previous;
            let next = self.nodes[target.0].next;
            let destination = self.resolved_destination(target).filter(|&d| d != target);

            self.remove_from_order(target);
            self.link(previous, next);

            let incoming = self.nodes[target.0].incoming.clone();
            let outgoing = self.nodes[target.0].outgoing.clone();
            let target_backs = self.nodes[target.0].backedges.clone();
            for &source in incoming.iter().filter(|&&n| n != target) {
                for &sink in outgoing.iter().filter(|&&n| n != target) {
                    self.connect_nodes(source, sink);
                    let closes_cycle =
                        target_backs.contains(&source) || self.nodes[sink.0].backedges.contains(&target);
                    if closes_cycle && !self.nodes[sink.0].backedges.contains(&source) {
                        self.nodes[sink.0].backedges.push(source);
                    }
                }
            }
            for &source in &incoming {
                self.disconnect(source, target);
            }
            for &sink in &outgoing {
                self.disconnect(target, sink);
            }
            self.redirect_references(target, destination);

            let stack = std::mem::take(&mut self.nodes[target.0].stack);
            if !clear_stack {
                if let Some(previous) = previous {
                    self.nodes[previous.0].stack.extend(stack);
                }
            }
            let node = &mut self.nodes[target.0];
            node.disposed = true;
            node.handler_sources.clear();
            disposed.push(target);
            self.invalidate_dominance();

            if recursive {
                current = previous.filter(|&p| {
                    let node = &self.nodes[p.0];
                    node.stack.is_empty() && node.disposable
                });
            }
        }
        disposed
    }

    fn redirect_references(&mut self, target: NodeId, destination: Option<NodeId>) {
        for index in 0..self.order.len() {
            let id = self.order[index];
            let node = &mut self.nodes[id.0];
            if node.destination == Some(Destination::Node(target)) {
                node.destination = destination.map(Destination::Node);
            }
            node.backedges.retain(|&n| n != target);
            node.handler_sources.retain(|&n| n != target);
            for operand in &mut node.stack {
                operand.walk_mut(&mut |nested| {
                    if let Some(condition) = nested.as_condition_mut() {
                        condition.retarget(target, destination);
                    }
                });
            }
        }
    }

    /// Whether anything still refers to `target`
    pub fn is_referenced(&self, target: NodeId) -> bool {
        self.order.iter().any(|&id| {
            let node = &self.nodes[id.0];
            node.incoming.contains(&target)
                || node.outgoing.contains(&target)
                || node.destination == Some(Destination::Node(target))
                || node.stack.iter().any(|operand| {
                    let mut found = false;
                    operand.walk(&mut |nested| {
                        if let Some(condition) = nested.as_condition() {
                            found |= condition.targets(target);
                        }
                    });
                    found
                })
        })
    }

    /// Fold the run of conditions on `node` into short-circuit conditions.
    ///
    /// The run is the contiguous sequence of conditions found first when
    /// scanning from the top of the stack. Its topmost condition receives the
    /// node's destination as false target. When the folded run fills the
    /// whole node and the textual predecessor ends in a compatible condition
    /// falling through into this node, the node is disposed into the
    /// predecessor and the merge continues there. Returns disposed nodes.
    pub fn merge(&mut self, node: NodeId) -> Vec<NodeId> {
        let mut disposed = Vec::new();
        let mut current = Some(node);
        while let Some(node) = current.take() {
            if self.nodes[node.0].disposed {
                break;
            }
            let Some((low, high)) = condition_run(&self.nodes[node.0].stack) else {
                break;
            };
            let destination = self.nodes[node.0].destination.and_then(Destination::node);
            let stack = &mut self.nodes[node.0].stack;
            if let Some(first) = stack[high].as_condition_mut() {
                if first.elze.is_none() && first.then != destination {
                    first.elze = destination;
                }
            }

            let mut right = high;
            for position in (low..high).rev() {
                let mergeable = match (stack[position].as_condition(), stack[right].as_condition()) {
                    (Some(left), Some(right)) => OperandCondition::can_merge(left, right),
                    _ => false,
                };
                if mergeable {
                    let right_operand = stack.remove(right);
                    let left_operand = std::mem::replace(&mut stack[position], Operand::null());
                    if let (Some(left), Some(right)) = (left_operand.into_condition(), right_operand.into_condition()) {
                        stack[position] = Operand::condition(OperandCondition::merge(left, right));
                    }
                }
                right = position;
            }

            let fills_node = low == 0 && self.nodes[node.0].stack.iter().all(Operand::is_condition);
            if !fills_node {
                break;
            }
            let Some(previous) = self.nodes[node.0].previous else {
                break;
            };
            let continues = match (
                self.nodes[previous.0].stack.last().and_then(Operand::as_condition),
                self.nodes[node.0].stack.first().and_then(Operand::as_condition),
            ) {
                (Some(tail), Some(head)) => tail.elze == Some(node) && OperandCondition::can_merge(tail, head),
                _ => false,
            };
            if continues && self.nodes[node.0].disposable {
                disposed.extend(self.dispose(node, false, true));
                current = Some(previous);
            }
        }
        disposed
    }

    /// Separate a node mixing conditions and other operands at its lowest
    /// boundary between the two. A leading run of conditions stays together
    /// with the edges it targets; everything above moves into a new node
    /// after it, which takes the remaining edges. Returns the created node.
    pub fn split(&mut self, node: NodeId) -> Option<NodeId> {
        let stack = &self.nodes[node.0].stack;
        if stack.len() < 2 {
            return None;
        }
        let bottom_is_condition = stack[0].is_condition();
        let boundary = stack.iter().position(|o| o.is_condition() != bottom_is_condition)?;
        let kept: Vec<NodeId> = if bottom_is_condition {
            stack[..boundary].iter().filter_map(condition_target).collect()
        } else {
            Vec::new()
        };
        let moved_targets: Vec<NodeId> = stack[boundary..].iter().filter_map(condition_target).collect();

        let created = self.insert_after(node);
        let moved = self.nodes[node.0].stack.split_off(boundary);
        self.nodes[created.0].stack = moved;
        for sink in self.nodes[node.0].outgoing.clone() {
            if !kept.contains(&sink) {
                self.disconnect(node, sink);
                self.connect_nodes(created, sink);
            } else if moved_targets.contains(&sink) {
                self.connect_nodes(created, sink);
            }
        }
        if let Some(condition) = self.nodes[node.0].stack.last_mut().and_then(Operand::as_condition_mut) {
            condition.elze = Some(created);
        }
        self.finish_split(node, created);
        Some(created)
    }

    /// [`NodeGraph::split`] repeated until every resulting node is either
    /// made of conditions only or holds none. Returns the created nodes.
    pub fn split_mixed(&mut self, node: NodeId) -> Vec<NodeId> {
        let mut created = Vec::new();
        let mut current = node;
        while let Some(next) = self.split(current) {
            created.push(next);
            current = next;
        }
        created
    }

    fn finish_split(&mut self, node: NodeId, created: NodeId) {
        self.connect_nodes(node, created);
        let destination = self.nodes[node.0].destination.replace(Destination::Node(created));
        self.nodes[created.0].destination = destination;
        // a jump to the fall-through label shares its edge with the fall-through
        if let Some(Destination::Node(target)) = destination {
            self.connect_nodes(created, target);
        }
        self.nodes[created.0].disposable = self.nodes[node.0].disposable;
        self.nodes[created.0].line = self.nodes[node.0].line;
    }
}

fn condition_target(operand: &Operand) -> Option<NodeId> {
    operand.as_condition().and_then(|condition| condition.then)
}

/// Bottom-up positions `(low, high)` of the first contiguous condition run
/// met when scanning from the top of `stack`
fn condition_run(stack: &[Operand]) -> Option<(usize, usize)> {
    let high = stack.iter().rposition(Operand::is_condition)?;
    let low = stack[..high]
        .iter()
        .rposition(|o| !o.is_condition())
        .map_or(0, |p| p + 1);
    Some((low, high))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::ConditionOperator;

    fn condition(then: NodeId) -> Operand {
        Operand::condition(OperandCondition::compare(
            Operand::int(1),
            ConditionOperator::EQ,
            Operand::int(2),
            then,
        ))
    }

    #[test]
    fn dispose_splices_edges_and_moves_operands() {
        let mut graph = NodeGraph::new();
        let ids: Vec<NodeId> = (0..3)
            .map(|l| {
                let id = graph.get_or_create(l);
                graph.append(id);
                id
            })
            .collect();
        graph.connect_nodes(ids[0], ids[1]);
        graph.connect_nodes(ids[1], ids[2]);
        graph.set_destination(ids[0], Destination::Node(ids[1]));
        graph.set_destination(ids[1], Destination::Node(ids[2]));
        graph.push(ids[1], Operand::int(7));
        let disposed = graph.dispose(ids[1], false, false);
        assert_eq!(disposed, vec![ids[1]]);
        assert_eq!(graph.node(ids[0]).outgoing, vec![ids[2]]);
        assert_eq!(graph.node(ids[0]).destination, Some(Destination::Node(ids[2])));
        assert_eq!(graph.node(ids[0]).next, Some(ids[2]));
        assert_eq!(graph.node(ids[0]).stack.len(), 1);
        assert!(!graph.is_referenced(ids[1]));
        assert!(graph.verify_symmetry().is_ok());
    }

    #[test]
    fn condition_run_skips_trailing_statements() {
        let stack = vec![Operand::int(0), condition(NodeId(1)), condition(NodeId(1)), Operand::int(3)];
        assert_eq!(condition_run(&stack), Some((1, 2)));
        assert_eq!(condition_run(&[Operand::int(0)]), None);
    }

    #[test]
    fn statement_between_conditions_is_split_out() {
        let mut graph = NodeGraph::new();
        let n: Vec<NodeId> = (0..4)
            .map(|l| {
                let id = graph.get_or_create(l);
                graph.append(id);
                id
            })
            .collect();
        for &sink in &n[1..] {
            graph.connect_nodes(n[0], sink);
        }
        graph.set_destination(n[0], Destination::Node(n[3]));
        graph.push(n[0], condition(n[1]));
        graph.push(n[0], Operand::int(7));
        graph.push(n[0], condition(n[2]));

        let created = graph.split_mixed(n[0]);
        assert_eq!(created.len(), 2);
        let (middle, last) = (created[0], created[1]);
        assert_eq!(graph.node(n[0]).outgoing, vec![n[1], middle]);
        assert_eq!(graph.node(n[0]).top().and_then(Operand::as_condition).and_then(|c| c.elze), Some(middle));
        assert_eq!(graph.node(middle).outgoing, vec![last]);
        assert_eq!(graph.node(middle).stack.len(), 1);
        assert!(graph.node(last).is_conditional());
        assert!(graph.node(last).outgoing.contains(&n[2]));
        assert!(graph.node(last).outgoing.contains(&n[3]));
        assert_eq!(graph.node(last).destination, Some(Destination::Node(n[3])));
        assert_eq!(graph.order()[..3], [n[0], middle, last]);
        assert!(graph.verify_symmetry().is_ok());
    }
}
