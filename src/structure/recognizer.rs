//! Structure recognizer
//!
//! Walks the node graph from the entry node and turns every node into a
//! [`Structure`]. A node is analyzed once all of its predecessors (back-edges
//! excluded) have been visited and the visiting node is its dominator, so
//! every node ends up nested under the construct that owns it. Jumps to the
//! header or exit of an enclosing loop or switch become `continue` / `break`.

use super::loops::BackedgeGroup;
use super::{Breakable, BreakableKind, CatchArm, Structure, StructureId, StructureTree};
use crate::analysis::MethodBody;
use crate::cfg::{BreakableId, NodeGraph, NodeId};
use crate::config::DecompileOptions;
use crate::error::{Error, Result};
use crate::operand::{Operand, OperandCondition};
use crate::symbols::SymbolResolver;
use crate::trace::Tracer;
use std::collections::{HashMap, HashSet, VecDeque};

/// How a visit of a node is accounted for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Arrival {
    /// Traversal of the edge `from -> next`; counted when it is a real
    /// (non back-edge) incoming edge of `next`
    Edge,
    /// Visit granted by an enclosing structure, such as a catch handler
    Additional,
    /// Continuation of a construct whose edges were counted elsewhere
    Detached,
}

/// Folds one unit's node graph into a [`StructureTree`]
pub struct StructureRecognizer<'a> {
    pub(super) body: &'a mut MethodBody,
    pub(super) resolver: &'a dyn SymbolResolver,
    tracer: &'a dyn Tracer,
    pub(super) options: &'a DecompileOptions,
    structures: Vec<Structure>,
    by_node: HashMap<NodeId, StructureId>,
    pub(super) breakables: Vec<Breakable>,
    /// Breakables under construction, innermost last
    pub(super) active: Vec<BreakableId>,
    /// Exits of protected regions under construction; only the try itself continues there
    try_exits: Vec<NodeId>,
}

impl<'a> StructureRecognizer<'a> {
    pub fn new(
        body: &'a mut MethodBody,
        resolver: &'a dyn SymbolResolver,
        tracer: &'a dyn Tracer,
        options: &'a DecompileOptions,
    ) -> Self {
        Self {
            body,
            resolver,
            tracer,
            options,
            structures: vec![Structure::Empty],
            by_node: HashMap::new(),
            breakables: Vec::new(),
            active: Vec::new(),
            try_exits: Vec::new(),
        }
    }

    /// Structure `body` in one go
    pub fn structure(
        body: &'a mut MethodBody,
        resolver: &'a dyn SymbolResolver,
        tracer: &'a dyn Tracer,
        options: &'a DecompileOptions,
    ) -> Result<StructureTree> {
        Self::new(body, resolver, tracer, options).recognize()
    }

    pub fn recognize(mut self) -> Result<StructureTree> {
        let entry = self
            .body
            .graph
            .entry()
            .ok_or_else(|| Error::structural(format!("{} has no nodes", self.body.signature)))?;
        let root = self.analyze(entry)?;
        self.omit_tail_continues();

        let lost = unstructured(&self.body.graph);
        if !lost.is_empty() {
            let names: Vec<&str> = lost.iter().map(|&id| self.graph().node(id).name.as_str()).collect();
            return Err(Error::structural(format!(
                "{}: nodes {} were never structured",
                self.body.signature,
                names.join(", ")
            )));
        }
        if !visits_conserved(&self.body.graph) {
            log::debug!("{}: visit counts differ from incoming edges", self.body.signature);
        }
        log::debug!(
            "{}: {} structures, {} breakables",
            self.body.signature,
            self.structures.len(),
            self.breakables.len()
        );
        Ok(StructureTree::new(self.structures, self.by_node, self.breakables, root))
    }

    pub(super) fn graph(&self) -> &NodeGraph {
        &self.body.graph
    }

    pub(super) fn push(&mut self, structure: Structure) -> StructureId {
        let id = StructureId(self.structures.len());
        self.structures.push(structure);
        id
    }

    fn trace(&self, phase: &str, node: NodeId) {
        if self.options.trace && self.tracer.enabled() {
            self.tracer.node(&self.body.signature, phase, &self.body.graph, node);
        }
    }

    /// Structure for `id`, built on the first call
    pub(super) fn analyze(&mut self, id: NodeId) -> Result<StructureId> {
        if let Some(existing) = self.graph().node(id).structure {
            return Ok(existing);
        }
        self.body.graph.node_mut(id).visit.finish();
        self.trace("structure", id);

        let structure = if self.graph().node(id).tries.is_empty() {
            self.analyze_body(id)?
        } else {
            self.analyze_try(id)?
        };
        self.body.graph.node_mut(id).structure = Some(structure);
        self.by_node.insert(id, structure);
        Ok(structure)
    }

    /// Classify `id` by its switch table or its degrees
    pub(super) fn analyze_body(&mut self, id: NodeId) -> Result<StructureId> {
        if let Some(switch) = self.graph().node(id).switch {
            return self.analyze_switch(id, switch);
        }
        let backedges = self.graph().node(id).backedges.clone();
        self.classify(id, &backedges)
    }

    /// Degree table. `backedges` are the back-edges of `id` not yet consumed
    /// by an enclosing loop built on the same header.
    pub(super) fn classify(&mut self, id: NodeId, backedges: &[NodeId]) -> Result<StructureId> {
        let outgoing = self.graph().node(id).outgoing.clone();

        match (outgoing.len(), backedges.len()) {
            (0, _) => Ok(self.fragment(id, StructureId::EMPTY)),
            (1, 0) => {
                let follow = self.process(id, Some(outgoing[0]), Arrival::Edge)?;
                Ok(self.fragment(id, follow))
            }
            (1, 1) => {
                let group = BackedgeGroup::collect(self.graph(), id, backedges);
                let source = self.graph().node(backedges[0]);
                if source.outgoing.len() == 2 && group.exit.is_none() {
                    self.analyze_do_while(id, backedges[0])
                } else {
                    self.analyze_infinite_loop(id, backedges, group)
                }
            }
            (1, _) => {
                let group = BackedgeGroup::collect(self.graph(), id, backedges);
                self.analyze_infinite_loop(id, backedges, group)
            }
            (2, 0) => self.analyze_if(id),
            (2, 1) if self.graph().node(backedges[0]).outgoing.len() == 1 => self.analyze_for(id, backedges),
            (2, _) => self.analyze_while(id, backedges),
            (count, _) => Err(Error::structural(format!(
                "{}: node {} has {} successors and no switch table",
                self.body.signature,
                self.graph().node(id).name,
                count
            ))),
        }
    }

    pub(super) fn fragment(&mut self, node: NodeId, follow: StructureId) -> StructureId {
        self.push(Structure::Fragment { node, follow })
    }

    /// Visit `next` coming from `from`
    pub(super) fn process(&mut self, from: NodeId, next: Option<NodeId>, arrival: Arrival) -> Result<StructureId> {
        let Some(next) = next else {
            return Ok(StructureId::EMPTY);
        };
        self.record_arrival(from, next, arrival);

        let latest = self.graph().node(next).breakables.last().copied();
        if let Some(breakable) = latest.map(|id| &self.breakables[id.0]) {
            let id = breakable.id;
            let inside = self.graph().has_dominator(from, breakable.entrance);
            if breakable.kind == BreakableKind::Loop && breakable.has_header(next) && inside {
                return Ok(self.jump(id, next, true));
            }
            if !breakable.has_header(from) && breakable.exit == Some(next) && inside {
                if self.graph().node(next).incoming.contains(&from) {
                    return Ok(self.jump(id, next, false));
                }
                return Ok(StructureId::EMPTY);
            }
        }

        if arrival != Arrival::Detached && self.try_exits.contains(&next) {
            return Ok(StructureId::EMPTY);
        }

        let node = self.graph().node(next);
        if node.visit.is_done() {
            return Ok(StructureId::EMPTY);
        }
        if node.visit.calls() >= node.required_calls() {
            let dominator = self.graph().dominator(next);
            let exit = latest.is_some_and(|id| self.breakables[id.0].exit == Some(next));
            if dominator.is_none() || dominator == Some(from) || exit {
                return self.analyze(next);
            }
        }
        Ok(StructureId::EMPTY)
    }

    pub(super) fn record_arrival(&mut self, from: NodeId, next: NodeId, arrival: Arrival) {
        let node = self.body.graph.node_mut(next);
        match arrival {
            Arrival::Edge => {
                if node.pure_incoming().contains(&from) {
                    node.visit.arrive(Some(from));
                }
            }
            Arrival::Additional => {
                let granted = node.visit.arrivals().map_or(0, |arrivals| arrivals.additional);
                if granted < node.additional_calls {
                    node.visit.arrive(None);
                }
            }
            Arrival::Detached => {}
        }
    }

    /// `break` or `continue` to `breakable`, labeled when the innermost
    /// construct being built is not associated with `target`
    fn jump(&mut self, breakable: BreakableId, target: NodeId, is_continue: bool) -> StructureId {
        let innermost = if is_continue {
            self.active
                .iter()
                .rev()
                .copied()
                .find(|id| self.breakables[id.0].kind == BreakableKind::Loop)
        } else {
            self.active.last().copied()
        };
        let labeled = innermost.is_some_and(|id| !self.graph().node(target).breakables.contains(&id));
        if labeled {
            self.breakables[breakable.0].labeled = true;
        }
        if is_continue {
            self.push(Structure::Continue { breakable, labeled })
        } else {
            self.push(Structure::Break { breakable, labeled })
        }
    }

    /// Register a loop or switch with its entrance, exit and checkpoint nodes
    pub(super) fn open_breakable(
        &mut self,
        kind: BreakableKind,
        entrance: NodeId,
        first: NodeId,
        exit: Option<NodeId>,
        checkpoint: Option<NodeId>,
    ) -> BreakableId {
        let id = BreakableId(self.breakables.len());
        let first = if Some(first) == checkpoint { entrance } else { first };
        self.breakables.push(Breakable {
            id,
            kind,
            entrance,
            first,
            exit,
            checkpoint,
            labeled: false,
        });
        for node in std::iter::once(entrance).chain(exit).chain(checkpoint) {
            let breakables = &mut self.body.graph.node_mut(node).breakables;
            if !breakables.contains(&id) {
                breakables.push(id);
            }
        }
        log::trace!("breakable {:?}: {:?} entrance {} exit {:?}", id, kind, entrance, exit);
        id
    }

    /// Pop the condition a conditional node ends with
    pub(super) fn take_condition(&mut self, id: NodeId) -> Result<OperandCondition> {
        let stack = &mut self.body.graph.node_mut(id).stack;
        match stack.pop().map(Operand::into_condition) {
            Some(Some(mut condition)) => {
                condition.disclose();
                Ok(condition)
            }
            _ => Err(Error::structural(format!(
                "{}: node {} branches without a condition",
                self.body.signature,
                self.body.graph.node(id).name
            ))),
        }
    }

    fn analyze_try(&mut self, id: NodeId) -> Result<StructureId> {
        let tries = std::mem::take(&mut self.body.graph.node_mut(id).tries);
        let blocks: Vec<_> = tries.iter().map(|&t| self.body.tries.get(t).clone()).collect();
        let exits: Vec<NodeId> = blocks.iter().filter_map(|block| block.exit).collect();
        self.try_exits.extend(&exits);

        let mut body = self.analyze_body(id)?;
        for block in blocks {
            let mut catches = Vec::with_capacity(block.entries.len());
            for entry in &block.entries {
                let arm = self.process(id, Some(entry.handler), Arrival::Additional)?;
                catches.push(CatchArm {
                    exception: entry.exception.clone(),
                    variable: entry.variable,
                    body: arm,
                });
            }
            if let Some(exit) = block.exit {
                if let Some(position) = self.try_exits.iter().rposition(|&n| n == exit) {
                    self.try_exits.remove(position);
                }
            }
            let follow = match block.exit {
                Some(exit) if self.try_exits.contains(&exit) => StructureId::EMPTY,
                Some(exit) => {
                    let node = self.graph().node(exit);
                    if !node.visit.is_done() && node.visit.calls() >= node.required_calls() {
                        self.analyze(exit)?
                    } else {
                        StructureId::EMPTY
                    }
                }
                None => StructureId::EMPTY,
            };
            log::trace!("try at {} with {} handlers", id, catches.len());
            body = self.push(Structure::Try {
                node: id,
                body,
                catches,
                follow,
            });
        }
        Ok(body)
    }

    fn analyze_if(&mut self, id: NodeId) -> Result<StructureId> {
        let mut condition = self.take_condition(id)?;
        let (one, other) = {
            let outgoing = &self.graph().node(id).outgoing;
            (outgoing[0], outgoing[1])
        };

        let (then, elze, follow) = if self.graph().pure_incoming(one).len() != 1 {
            if self.graph().dominator(one) != Some(id) {
                // `one` belongs to an enclosing construct: the jump to it leaves the branch
                let connector = self.body.graph.create_connector(id, one);
                (other, Some(connector), Some((one, Arrival::Detached)))
            } else {
                (other, None, Some((one, Arrival::Edge)))
            }
        } else if self.graph().pure_incoming(other).len() != 1 {
            if self.graph().dominator(other) != Some(id) {
                let connector = self.body.graph.create_connector(id, other);
                (one, Some(connector), Some((other, Arrival::Detached)))
            } else {
                (one, None, Some((other, Arrival::Edge)))
            }
        } else {
            let outgoing = self.graph().node(id).outgoing.clone();
            let follow = self
                .graph()
                .dominator_children(id)
                .into_iter()
                .find(|node| !outgoing.contains(node));
            (one, Some(other), follow.map(|node| (node, Arrival::Detached)))
        };
        if condition.then != Some(then) {
            condition.invert();
        }

        let then = self.process(id, Some(then), Arrival::Edge)?;
        let elze = match elze {
            Some(node) => Some(self.process(id, Some(node), Arrival::Edge)?),
            None => None,
        };
        let follow = match follow {
            Some((node, arrival)) => self.process(id, Some(node), arrival)?,
            None => StructureId::EMPTY,
        };
        Ok(self.push(Structure::If {
            node: id,
            condition: Operand::condition(condition),
            then,
            elze,
            follow,
        }))
    }

    /// Drop `continue` statements that end their own loop's body
    fn omit_tail_continues(&mut self) {
        for index in 0..self.structures.len() {
            if let Some((breakable, inner)) = self.structures[index].loop_body() {
                self.omit_tail_continue(inner, breakable);
            }
        }
    }

    fn omit_tail_continue(&mut self, id: StructureId, breakable: BreakableId) {
        let is_empty = |structures: &[Structure], id: StructureId| matches!(structures[id.0], Structure::Empty);
        match &self.structures[id.0] {
            Structure::Continue {
                breakable: target,
                labeled: false,
            } if *target == breakable => {
                self.structures[id.0] = Structure::Empty;
            }
            Structure::Fragment { follow, .. } => self.omit_tail_continue(*follow, breakable),
            Structure::If {
                then, elze, follow, ..
            } => {
                let (then, elze, follow) = (*then, *elze, *follow);
                if is_empty(&self.structures, follow) {
                    self.omit_tail_continue(then, breakable);
                    if let Some(elze) = elze {
                        self.omit_tail_continue(elze, breakable);
                    }
                } else {
                    self.omit_tail_continue(follow, breakable);
                }
            }
            Structure::Try {
                body, catches, follow, ..
            } => {
                let follow = *follow;
                if is_empty(&self.structures, follow) {
                    let arms: Vec<StructureId> = std::iter::once(*body).chain(catches.iter().map(|c| c.body)).collect();
                    for arm in arms {
                        self.omit_tail_continue(arm, breakable);
                    }
                } else {
                    self.omit_tail_continue(follow, breakable);
                }
            }
            other => {
                if let Some(follow) = other.follow() {
                    self.omit_tail_continue(follow, breakable);
                }
            }
        }
    }
}

/// Live nodes reachable from the entry through control edges or from a
/// protected region start to its handler, in appearance order
pub fn reachable(graph: &NodeGraph) -> Vec<NodeId> {
    let Some(entry) = graph.entry() else {
        return Vec::new();
    };
    let mut handlers: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &id in graph.order() {
        for &source in &graph.node(id).handler_sources {
            handlers.entry(source).or_default().push(id);
        }
    }
    let mut seen = HashSet::from([entry]);
    let mut queue = VecDeque::from([entry]);
    while let Some(id) = queue.pop_front() {
        let node = graph.node(id);
        let successors = node.outgoing.iter().chain(handlers.get(&id).into_iter().flatten());
        for &next in successors {
            if !graph.node(next).disposed && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    graph.order().iter().copied().filter(|id| seen.contains(id)).collect()
}

/// Whether every reachable node received exactly the visits it required:
/// one per incoming edge that is not a back-edge plus its additional visits
pub fn visits_conserved(graph: &NodeGraph) -> bool {
    reachable(graph).into_iter().all(|id| {
        let node = graph.node(id);
        node.visit.calls() == node.required_calls()
    })
}

/// Reachable nodes still holding statements that no structure emitted
fn unstructured(graph: &NodeGraph) -> Vec<NodeId> {
    reachable(graph)
        .into_iter()
        .filter(|&id| {
            let node = graph.node(id);
            !node.visit.is_done() && !node.stack.is_empty()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::MethodDecompiler;
    use crate::bytecode::{Assembler, Opcode};
    use crate::symbols::DescriptorResolver;
    use crate::trace::NoopTracer;

    fn structure(assembler: &mut Assembler) -> (MethodBody, StructureTree) {
        let unit = assembler.build();
        let options = DecompileOptions {
            place_declarations: false,
            ..DecompileOptions::default()
        };
        let mut body = MethodDecompiler::decompile(&unit, &DescriptorResolver, &NoopTracer, &options).unwrap();
        let tree = StructureRecognizer::structure(&mut body, &DescriptorResolver, &NoopTracer, &options).unwrap();
        (body, tree)
    }

    #[test]
    fn straight_line_code_is_one_fragment() {
        let mut assembler = Assembler::new_static("A", "m", "(I)I");
        assembler.var(Opcode::ILOAD, 0).insn(Opcode::IRETURN);
        let (_, tree) = structure(&mut assembler);
        assert_eq!(tree.chain(tree.root()), vec!["Fragment"]);
    }

    #[test]
    fn branch_without_else_continues_at_the_join() {
        let mut assembler = Assembler::new_static("A", "m", "(I)I");
        assembler
            .var(Opcode::ILOAD, 0)
            .jump(Opcode::IFLE, 1)
            .iinc(0, 5)
            .label(1)
            .frame(crate::bytecode::FrameKind::Same)
            .var(Opcode::ILOAD, 0)
            .insn(Opcode::IRETURN);
        let (body, tree) = structure(&mut assembler);
        assert_eq!(tree.chain(tree.root()), vec!["If", "Fragment"]);
        assert!(visits_conserved(&body.graph));
    }

    #[test]
    fn unvisited_nodes_fail_the_visit_check() {
        let mut assembler = Assembler::new_static("A", "m", "(I)I");
        assembler
            .var(Opcode::ILOAD, 0)
            .jump(Opcode::IFLE, 1)
            .iinc(0, 5)
            .label(1)
            .frame(crate::bytecode::FrameKind::Same)
            .var(Opcode::ILOAD, 0)
            .insn(Opcode::IRETURN);
        let unit = assembler.build();
        let options = DecompileOptions::default();
        let body = MethodDecompiler::decompile(&unit, &DescriptorResolver, &NoopTracer, &options).unwrap();

        assert!(!visits_conserved(&body.graph));
        assert_eq!(unstructured(&body.graph), reachable(&body.graph));
    }

    #[test]
    fn structured_graph_leaves_nothing_behind() {
        let mut assembler = Assembler::new_static("A", "m", "(I)I");
        assembler
            .var(Opcode::ILOAD, 0)
            .jump(Opcode::IFLE, 1)
            .iinc(0, 5)
            .label(1)
            .frame(crate::bytecode::FrameKind::Same)
            .var(Opcode::ILOAD, 0)
            .insn(Opcode::IRETURN);
        let (body, _) = structure(&mut assembler);
        assert!(unstructured(&body.graph).is_empty());
        assert_eq!(reachable(&body.graph).len(), body.graph.order().iter().filter(|&&id| !body.graph.node(id).disposed).count());
    }
}
