//! Dominance and back-edge analysis
//!
//! Immediate dominators are computed on demand from each node's predecessors
//! and cached on the node. Any edge mutation drops the whole cache lazily.
//! Back-edges are found with a depth-first traversal from the entry node.

use super::node::DominatorState;
use super::{NodeGraph, NodeId};
use std::collections::HashSet;

impl NodeGraph {
    pub(crate) fn invalidate_dominance(&self) {
        self.dominance_dirty.set(true);
    }

    fn refresh_dominance(&self) {
        if self.dominance_dirty.get() && self.computing.borrow().is_empty() {
            for node in &self.nodes {
                node.dominator.set(DominatorState::Unknown);
            }
            self.dominance_dirty.set(false);
        }
    }

    /// Immediate dominator of `id`.
    ///
    /// Candidates are the incoming edges that are not back-edges plus the
    /// protected-region starts this node handles. With one candidate that is
    /// the answer; with several, the first candidate's dominator chain is
    /// walked until a node dominating every other candidate is found. A query
    /// that re-enters a node under computation answers `None` and the results
    /// depending on it are not cached.
    pub fn dominator(&self, id: NodeId) -> Option<NodeId> {
        self.refresh_dominance();
        let node = &self.nodes[id.0];
        match node.dominator.get() {
            DominatorState::Known(result) => return result,
            DominatorState::Computing => {
                let mut computing = self.computing.borrow_mut();
                if let Some(position) = computing.iter().position(|&(n, _)| n == id) {
                    for entry in computing.iter_mut().skip(position + 1) {
                        entry.1 = true;
                    }
                }
                return None;
            }
            DominatorState::Unknown => {}
        }

        node.dominator.set(DominatorState::Computing);
        self.computing.borrow_mut().push((id, false));

        let mut candidates = node.pure_incoming();
        for &source in &node.handler_sources {
            if !candidates.contains(&source) {
                candidates.push(source);
            }
        }
        let result = match candidates.len() {
            0 => None,
            1 => Some(candidates[0]),
            _ => {
                let mut current = Some(candidates[0]);
                while let Some(candidate) = current {
                    if candidates[1..].iter().all(|&other| self.has_dominator(other, candidate)) {
                        break;
                    }
                    current = self.dominator(candidate);
                }
                current
            }
        };

        let tainted = self
            .computing
            .borrow_mut()
            .pop()
            .map_or(false, |(_, tainted)| tainted);
        node.dominator.set(if tainted {
            DominatorState::Unknown
        } else {
            DominatorState::Known(result)
        });
        result
    }

    /// Whether `candidate` appears on the dominator chain of `id` (a node dominates itself)
    pub fn has_dominator(&self, id: NodeId, candidate: NodeId) -> bool {
        let mut recorder = HashSet::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if !recorder.insert(node) {
                return false;
            }
            if node == candidate {
                return true;
            }
            current = self.dominator(node);
        }
        false
    }

    /// Live nodes whose immediate dominator is `id`, in appearance order
    pub fn dominator_children(&self, id: NodeId) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|&n| n != id && self.dominator(n) == Some(id))
            .collect()
    }

    /// Deepest node dominating every node of `nodes`
    pub fn lowest_common_dominator(&self, nodes: &[NodeId]) -> Option<NodeId> {
        let (&first, rest) = nodes.split_first()?;
        let mut recorder = HashSet::new();
        let mut current = Some(first);
        while let Some(candidate) = current {
            if !recorder.insert(candidate) {
                return None;
            }
            if rest.iter().all(|&n| self.has_dominator(n, candidate)) {
                return Some(candidate);
            }
            current = self.dominator(candidate);
        }
        None
    }

    /// Mark back-edges: an edge whose target is on the current depth-first
    /// path. Nodes unreachable from the entry (exception handlers) start
    /// their own traversal in appearance order.
    pub fn compute_backedges(&mut self) {
        for &id in &self.order {
            self.nodes[id.0].backedges.clear();
        }
        let mut visited = HashSet::new();
        let roots = self.order.clone();
        for root in roots {
            if visited.insert(root) {
                self.search_backedges(root, &mut visited);
            }
        }
        self.invalidate_dominance();
    }

    fn search_backedges(&mut self, root: NodeId, visited: &mut HashSet<NodeId>) {
        let mut on_path = HashSet::from([root]);
        let mut stack = vec![(root, 0usize)];
        while let Some(top) = stack.last_mut() {
            let (node, index) = *top;
            let outgoing = &self.nodes[node.0].outgoing;
            if index < outgoing.len() {
                let out = outgoing[index];
                top.1 += 1;
                if on_path.contains(&out) {
                    if !self.nodes[out.0].backedges.contains(&node) {
                        self.nodes[out.0].backedges.push(node);
                    }
                } else if visited.insert(out) {
                    on_path.insert(out);
                    stack.push((out, 0));
                }
            } else {
                on_path.remove(&node);
                stack.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(graph: &mut NodeGraph, count: u32) -> Vec<NodeId> {
        (0..count)
            .map(|label| {
                let id = graph.get_or_create(label);
                graph.append(id);
                id
            })
            .collect()
    }

    #[test]
    fn diamond_join_is_dominated_by_fork() {
        let mut graph = NodeGraph::new();
        let n = chain(&mut graph, 4);
        graph.connect_nodes(n[0], n[1]);
        graph.connect_nodes(n[0], n[2]);
        graph.connect_nodes(n[1], n[3]);
        graph.connect_nodes(n[2], n[3]);
        assert_eq!(graph.dominator(n[0]), None);
        assert_eq!(graph.dominator(n[3]), Some(n[0]));
        assert!(graph.has_dominator(n[3], n[0]));
        assert!(!graph.has_dominator(n[3], n[1]));
        assert_eq!(graph.dominator_children(n[0]), vec![n[1], n[2], n[3]]);
        assert_eq!(graph.lowest_common_dominator(&[n[1], n[2]]), Some(n[0]));
        assert_eq!(graph.lowest_common_dominator(&[n[1], n[3]]), Some(n[0]));
    }

    #[test]
    fn loop_back_edge_is_found_and_ignored_by_dominance() {
        let mut graph = NodeGraph::new();
        let n = chain(&mut graph, 3);
        graph.connect_nodes(n[0], n[1]);
        graph.connect_nodes(n[1], n[2]);
        graph.connect_nodes(n[2], n[1]);
        graph.compute_backedges();
        assert_eq!(graph.node(n[1]).backedges, vec![n[2]]);
        assert_eq!(graph.dominator(n[1]), Some(n[0]));
        assert_eq!(graph.dominator(n[2]), Some(n[1]));
    }

    #[test]
    fn cache_is_dropped_after_mutation() {
        let mut graph = NodeGraph::new();
        let n = chain(&mut graph, 3);
        graph.connect_nodes(n[0], n[2]);
        assert_eq!(graph.dominator(n[2]), Some(n[0]));
        graph.disconnect(n[0], n[2]);
        graph.connect_nodes(n[1], n[2]);
        assert_eq!(graph.dominator(n[2]), Some(n[1]));
    }

    #[test]
    fn cycle_without_marks_terminates() {
        let mut graph = NodeGraph::new();
        let n = chain(&mut graph, 3);
        graph.connect_nodes(n[0], n[1]);
        graph.connect_nodes(n[1], n[2]);
        graph.connect_nodes(n[2], n[1]);
        // no back-edge marks: n1 has two candidates and the chain re-enters n1
        let _ = graph.dominator(n[1]);
        assert!(graph.has_dominator(n[2], n[1]) || graph.dominator(n[2]).is_some());
    }
}
