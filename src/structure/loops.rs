//! Loop recognition
//!
//! Header nodes are classified by their successors and back-edges:
//! - one successor: `do { } while (c)` when the single back-edge comes from a
//!   conditional node and nothing leaves the loop body early, otherwise an
//!   infinite loop closed by a [`BackedgeGroup`]
//! - two successors: `for (; c; update)` when the back-edge node ends with an
//!   update of a variable the condition reads, otherwise `while (c)`

use super::recognizer::{Arrival, StructureRecognizer};
use super::{BreakableKind, Structure, StructureId};
use crate::cfg::{NodeGraph, NodeId};
use crate::error::Result;
use crate::operand::{AssignOperator, Operand, OperandKind, VariableId};
use std::collections::{HashSet, VecDeque};

/// Back-edges of one header closing the same infinite loop, with the node
/// where control leaves that loop
#[derive(Debug, Clone, Default)]
pub struct BackedgeGroup {
    pub members: Vec<NodeId>,
    /// Branch node the first back-edge was tracked back to
    pub base: Option<NodeId>,
    pub exit: Option<NodeId>,
}

impl BackedgeGroup {
    /// Group the back-edges of `entrance` (latest incoming first) whose
    /// branch node is the base, a predecessor of it or one of its dominators
    pub fn collect(graph: &NodeGraph, entrance: NodeId, backedges: &[NodeId]) -> Self {
        let node = graph.node(entrance);
        let mut group = BackedgeGroup::default();

        for &source in node.incoming.iter().rev() {
            if !backedges.contains(&source) {
                continue;
            }
            let branch = track_branch(graph, source);
            match group.base {
                None => {
                    group.base = Some(branch);
                    group.members.push(source);
                }
                Some(base) if graph.node(base).incoming.contains(&branch) || graph.has_dominator(base, branch) => {
                    group.members.push(source);
                }
                Some(_) => break,
            }
        }

        if let Some(base) = group.base {
            let mut recorder: HashSet<NodeId> = node.incoming.iter().copied().collect();
            recorder.insert(entrance);
            let mut candidates: VecDeque<NodeId> = graph.node(base).outgoing.iter().copied().collect();
            while let Some(candidate) = candidates.pop_front() {
                if !recorder.insert(candidate) {
                    continue;
                }
                if !graph.has_dominator(candidate, base) {
                    group.exit = Some(candidate);
                    break;
                }
                candidates.extend(graph.node(candidate).outgoing.iter().copied());
            }
        }
        group
    }
}

/// Walk back from a back-edge source through straight-line nodes
fn track_branch(graph: &NodeGraph, source: NodeId) -> NodeId {
    let mut branch = source;
    let mut recorder = HashSet::from([source]);
    loop {
        let node = graph.node(branch);
        if node.outgoing.len() != 1 || node.incoming.len() != 1 {
            return branch;
        }
        let previous = node.incoming[0];
        if !recorder.insert(previous) {
            return branch;
        }
        branch = previous;
    }
}

/// Variables a loop condition reads
fn condition_variables(condition: &Operand) -> Vec<VariableId> {
    let mut variables = Vec::new();
    condition.walk(&mut |operand| {
        if let Some(variable) = operand.variable() {
            if !variables.contains(&variable) {
                variables.push(variable);
            }
        }
    });
    variables
}

/// Increment, decrement or assignment of one of `variables`
fn is_update(operand: &Operand, variables: &[VariableId]) -> bool {
    let target = match &operand.kind {
        OperandKind::Unary { operator, value } if operator.is_increment() => value,
        OperandKind::Assign { target, .. } => target,
        _ => return false,
    };
    operand.statement && target.variable().is_some_and(|v| variables.contains(&v))
}

/// Number of trailing update statements
fn trailing_updates(stack: &[Operand], variables: &[VariableId]) -> usize {
    stack.iter().rev().take_while(|operand| is_update(operand, variables)).count()
}

fn updated_variable(operand: &Operand) -> Option<VariableId> {
    match &operand.kind {
        OperandKind::Unary { value, .. } => value.variable(),
        OperandKind::Assign { target, .. } => target.variable(),
        _ => None,
    }
}

impl StructureRecognizer<'_> {
    pub(super) fn analyze_do_while(&mut self, id: NodeId, condition_node: NodeId) -> Result<StructureId> {
        let exit = self
            .graph()
            .node(condition_node)
            .outgoing
            .iter()
            .copied()
            .find(|&node| node != id);
        let first = self.graph().node(id).outgoing[0];
        let breakable = self.open_breakable(BreakableKind::Loop, id, first, exit, Some(condition_node));

        self.active.push(breakable);
        let body = self.process(id, Some(first), Arrival::Edge);
        self.active.pop();
        let inner = self.fragment(id, body?);

        let mut condition = self.take_condition(condition_node)?;
        if condition.then != Some(id) {
            condition.invert();
        }
        self.body.graph.node_mut(condition_node).visit.finish();
        let follow = self.process(condition_node, exit, Arrival::Edge)?;
        Ok(self.push(Structure::DoWhile {
            node: id,
            breakable,
            inner,
            condition: Operand::condition(condition),
            follow,
        }))
    }

    /// `for (;;)` around the header, re-classified without the grouped back-edges
    pub(super) fn analyze_infinite_loop(
        &mut self,
        id: NodeId,
        backedges: &[NodeId],
        group: BackedgeGroup,
    ) -> Result<StructureId> {
        let breakable = self.open_breakable(BreakableKind::Loop, id, id, group.exit, None);
        let remaining: Vec<NodeId> = backedges
            .iter()
            .copied()
            .filter(|source| !group.members.contains(source))
            .collect();

        self.active.push(breakable);
        let inner = self.classify(id, &remaining);
        self.active.pop();
        let inner = inner?;

        let follow = self.process(id, group.exit, Arrival::Detached)?;
        Ok(self.push(Structure::InfiniteLoop {
            node: id,
            breakable,
            inner,
            follow,
        }))
    }

    /// Both branches of the header reach the back-edge: the header is just
    /// the first statement of an endless loop
    fn analyze_endless_loop(&mut self, id: NodeId) -> Result<StructureId> {
        let breakable = self.open_breakable(BreakableKind::Loop, id, id, None, None);
        self.active.push(breakable);
        let inner = self.classify(id, &[]);
        self.active.pop();
        Ok(self.push(Structure::InfiniteLoop {
            node: id,
            breakable,
            inner: inner?,
            follow: StructureId::EMPTY,
        }))
    }

    /// Successor of the header that runs the body and the one leaving the
    /// loop, or `None` when both reach the back-edge
    pub(super) fn detect_process_and_exit(&self, id: NodeId, backedges: &[NodeId]) -> Option<(NodeId, NodeId)> {
        let graph = self.graph();
        let outgoing = &graph.node(id).outgoing;
        let (first, last) = (outgoing[0], outgoing[1]);
        let back = *backedges.last()?;
        let exclusions: Vec<NodeId> = graph.dominator(id).into_iter().collect();

        if graph.can_reach(first, back, &exclusions) && graph.can_reach(last, back, &exclusions) {
            return None;
        }
        if graph.has_dominator(backedges[0], first) {
            Some((first, last))
        } else {
            Some((last, first))
        }
    }

    pub(super) fn analyze_while(&mut self, id: NodeId, backedges: &[NodeId]) -> Result<StructureId> {
        let Some((process, exit)) = self.detect_process_and_exit(id, backedges) else {
            return self.analyze_endless_loop(id);
        };
        if let Some(structure) = self.analyze_enhanced_for(id, process, exit, backedges[0])? {
            return Ok(structure);
        }
        let mut condition = self.take_condition(id)?;
        if condition.then != Some(process) {
            condition.invert();
        }
        let breakable = self.open_breakable(BreakableKind::Loop, id, process, Some(exit), Some(id));

        self.active.push(breakable);
        let inner = self.process(id, Some(process), Arrival::Edge);
        self.active.pop();
        let inner = inner?;

        let follow = self.process(id, Some(exit), Arrival::Edge)?;
        Ok(self.push(Structure::While {
            node: id,
            breakable,
            condition: Operand::condition(condition),
            inner,
            follow,
        }))
    }

    pub(super) fn analyze_for(&mut self, id: NodeId, backedges: &[NodeId]) -> Result<StructureId> {
        let Some((process, exit)) = self.detect_process_and_exit(id, backedges) else {
            return self.analyze_endless_loop(id);
        };
        let source = backedges[0];
        if let Some(structure) = self.analyze_enhanced_for(id, process, exit, source)? {
            return Ok(structure);
        }
        let Some(condition) = self.graph().node(id).top().cloned() else {
            return self.analyze_while(id, backedges);
        };
        let variables = condition_variables(&condition);
        let count = trailing_updates(&self.graph().node(source).stack, &variables);
        if count == 0 {
            return self.analyze_while(id, backedges);
        }

        let checkpoint = self.isolate_updates(source, id, count);
        let updates = std::mem::take(&mut self.body.graph.node_mut(checkpoint).stack);
        let initializer = self.take_initializer(id, &updates);

        let mut condition = self.take_condition(id)?;
        if condition.then != Some(process) {
            condition.invert();
        }
        let breakable = self.open_breakable(BreakableKind::Loop, id, process, Some(exit), Some(checkpoint));

        self.active.push(breakable);
        let inner = self.process(id, Some(process), Arrival::Edge);
        self.active.pop();
        let inner = inner?;

        let follow = self.process(id, Some(exit), Arrival::Edge)?;
        Ok(self.push(Structure::For {
            node: id,
            breakable,
            initializer,
            condition: Operand::condition(condition),
            updates: updates.into_iter().map(Operand::as_value).collect(),
            inner,
            follow,
        }))
    }

    /// Node holding only the last `count` statements of `source`. When
    /// `source` holds more, a node is spliced onto its back-edge and the
    /// statements move there.
    pub(super) fn isolate_updates(&mut self, source: NodeId, header: NodeId, count: usize) -> NodeId {
        let length = self.graph().node(source).stack.len();
        if count >= length {
            return source;
        }
        let connector = self.body.graph.create_connector(source, header);
        let moved = self.body.graph.node_mut(source).stack.split_off(length - count);
        self.body.graph.node_mut(connector).stack = moved;
        log::trace!("update of {} isolated into {}", header, connector);
        connector
    }

    /// Assignment ending the single entry node of the header when it
    /// initializes a variable the updates change
    fn take_initializer(&mut self, header: NodeId, updates: &[Operand]) -> Option<Operand> {
        let [previous] = self.graph().pure_incoming(header)[..] else {
            return None;
        };
        let updated: Vec<VariableId> = updates.iter().filter_map(updated_variable).collect();
        let last = self.graph().node(previous).top()?;
        let initializes = matches!(
            &last.kind,
            OperandKind::Assign {
                target,
                operator: AssignOperator::Assign,
                ..
            } if last.statement && target.variable().is_some_and(|v| updated.contains(&v))
        );
        if !initializes {
            return None;
        }
        self.body.graph.node_mut(previous).stack.pop().map(Operand::as_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::JvmType;
    use crate::operand::{InferredType, UnaryOperator};

    fn local(id: usize) -> Operand {
        Operand::local(VariableId(id), InferredType::fixed(JvmType::Int))
    }

    fn increment(id: usize) -> Operand {
        Operand::typed(
            OperandKind::Unary {
                operator: UnaryOperator::PostIncrement,
                value: local(id).boxed(),
            },
            JvmType::Int,
        )
        .as_statement()
    }

    #[test]
    fn only_trailing_updates_of_condition_variables_count() {
        let call = Operand::typed(
            OperandKind::MethodCall {
                owner: "A".into(),
                name: "run".into(),
                descriptor: "()V".into(),
                receiver: None,
                arguments: Vec::new(),
                special: false,
            },
            JvmType::Void,
        )
        .as_statement();
        let stack = vec![increment(0), call, increment(1)];
        assert_eq!(trailing_updates(&stack, &[VariableId(1)]), 1);
        assert_eq!(trailing_updates(&stack, &[VariableId(0)]), 0);
        assert_eq!(updated_variable(&stack[2]), Some(VariableId(1)));
    }

    #[test]
    fn straight_line_nodes_lead_back_to_the_branch() {
        let mut graph = NodeGraph::new();
        let n: Vec<NodeId> = (0..4)
            .map(|label| {
                let id = graph.get_or_create(label);
                graph.append(id);
                id
            })
            .collect();
        graph.connect_nodes(n[0], n[1]);
        graph.connect_nodes(n[1], n[2]);
        graph.connect_nodes(n[1], n[3]);
        graph.connect_nodes(n[2], n[3]);
        assert_eq!(track_branch(&graph, n[2]), n[1]);
        assert_eq!(track_branch(&graph, n[3]), n[3]);
    }
}
