//! Switch records
//!
//! A switch head keeps its selector as the top operand of its stack. The
//! record built from the switch table remembers the key to target mapping,
//! groups keys sharing a target and decides whether the table's default
//! target is a genuine `default:` arm or the code following the switch.

use super::{NodeGraph, NodeId, SwitchId};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct SwitchRecord {
    pub id: SwitchId,
    pub head: NodeId,
    pub default: NodeId,
    /// Table keys, parallel to `targets`
    pub keys: Vec<i32>,
    pub targets: Vec<NodeId>,
    /// Every arm produces a value for the same consumer
    pub expression: bool,
}

impl SwitchRecord {
    pub fn new(id: SwitchId, head: NodeId, default: NodeId, keys: Vec<i32>, targets: Vec<NodeId>) -> Self {
        Self {
            id,
            head,
            default,
            keys,
            targets,
            expression: false,
        }
    }

    /// Case nodes in appearance order with their keys. The default target is
    /// excluded; keys jumping to it are folded into the `default:` arm.
    pub fn cases(&self, graph: &NodeGraph) -> Vec<(NodeId, Vec<i32>)> {
        let mut cases: Vec<(NodeId, Vec<i32>)> = Vec::new();
        for (&key, &target) in self.keys.iter().zip(&self.targets) {
            if target == self.default {
                continue;
            }
            match cases.iter_mut().find(|(node, _)| *node == target) {
                Some((_, keys)) => {
                    if !keys.contains(&key) {
                        keys.push(key);
                    }
                }
                None => cases.push((target, vec![key])),
            }
        }
        cases.sort_by_key(|(node, _)| graph.position(*node).unwrap_or(usize::MAX));
        cases
    }

    /// Every node this switch branches to
    pub fn arms(&self) -> Vec<NodeId> {
        let mut arms: Vec<NodeId> = Vec::new();
        for &target in self.targets.iter().chain(std::iter::once(&self.default)) {
            if !arms.contains(&target) {
                arms.push(target);
            }
        }
        arms
    }

    /// Whether the table's default target is a `default:` arm. It is when
    /// nothing but the head reaches it, or when its only other predecessor
    /// falls through from the lexically last case.
    pub fn is_really_default_node(&self, graph: &NodeGraph) -> bool {
        let others: Vec<NodeId> = graph
            .pure_incoming(self.default)
            .into_iter()
            .filter(|&n| n != self.head)
            .collect();
        match others.as_slice() {
            [] => true,
            [single] => {
                let Some((last, _)) = self.cases(graph).pop() else {
                    return false;
                };
                graph.node(*single).next == Some(self.default)
                    && graph.has_dominator(*single, last)
                    && graph.position(last) < graph.position(self.default)
            }
            _ => false,
        }
    }

    /// Node where control continues after the switch.
    ///
    /// When the default target is not a real arm it is the follow itself.
    /// Otherwise the arms' successors are searched breadth-first for the
    /// first node that is not an arm and is either immediately dominated by
    /// the head or not dominated by it at all.
    pub fn follow(&self, graph: &NodeGraph) -> Option<NodeId> {
        if !self.is_really_default_node(graph) {
            return Some(self.default);
        }
        let arms = self.arms();
        let mut recorder: HashSet<NodeId> = arms.iter().copied().collect();
        recorder.insert(self.head);
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for &arm in std::iter::once(&self.default).chain(arms.iter()) {
            queue.extend(graph.node(arm).outgoing.iter().copied());
        }
        while let Some(node) = queue.pop_front() {
            if !recorder.insert(node) {
                continue;
            }
            if graph.dominator(node) == Some(self.head) || !graph.has_dominator(node, self.head) {
                return Some(node);
            }
            queue.extend(graph.node(node).outgoing.iter().copied());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(graph: &mut NodeGraph, count: u32) -> Vec<NodeId> {
        (0..count)
            .map(|label| {
                let id = graph.get_or_create(label);
                graph.append(id);
                id
            })
            .collect()
    }

    #[test]
    fn keys_group_by_target_in_appearance_order() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 4);
        let record = SwitchRecord::new(SwitchId(0), n[0], n[3], vec![5, 1, 2], vec![n[2], n[1], n[1]]);
        assert_eq!(record.cases(&graph), vec![(n[1], vec![1, 2]), (n[2], vec![5])]);
        assert_eq!(record.arms(), vec![n[2], n[1], n[3]]);
    }

    #[test]
    fn default_reached_by_breaks_is_the_follow() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 4);
        for &target in &n[1..] {
            graph.connect_nodes(n[0], target);
        }
        graph.connect_nodes(n[1], n[3]);
        graph.connect_nodes(n[2], n[3]);
        let record = SwitchRecord::new(SwitchId(0), n[0], n[3], vec![0, 1], vec![n[1], n[2]]);
        assert!(!record.is_really_default_node(&graph));
        assert_eq!(record.follow(&graph), Some(n[3]));
    }

    #[test]
    fn default_reached_only_by_the_head_is_an_arm() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 5);
        for &target in &n[1..4] {
            graph.connect_nodes(n[0], target);
            graph.connect_nodes(target, n[4]);
        }
        let record = SwitchRecord::new(SwitchId(0), n[0], n[3], vec![1, 2], vec![n[1], n[2]]);
        assert!(record.is_really_default_node(&graph));
        assert_eq!(record.follow(&graph), Some(n[4]));
    }

    #[test]
    fn fall_through_from_last_case_keeps_default_an_arm() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 5);
        for &target in &n[1..4] {
            graph.connect_nodes(n[0], target);
        }
        graph.connect_nodes(n[1], n[4]);
        graph.connect_nodes(n[2], n[3]);
        graph.connect_nodes(n[3], n[4]);
        let record = SwitchRecord::new(SwitchId(0), n[0], n[3], vec![1, 2], vec![n[1], n[2]]);
        assert!(record.is_really_default_node(&graph));
        assert_eq!(record.follow(&graph), Some(n[4]));
    }
}
