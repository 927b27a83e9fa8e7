//! Exception handling records
//!
//! This module associates the protected regions of the exception table into
//! try/catch/finally records, resolves the node where control continues after
//! each construct and removes the copies of finally blocks the compiler
//! inlines on every normal exit of a protected region.

use super::{NodeGraph, NodeId, TryId};
use crate::operand::{OperandKind, VariableId};
use std::collections::{HashSet, VecDeque};

/// One handler of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchEntry {
    /// Caught type by internal name, `None` for a finally handler
    pub exception: Option<String>,
    pub handler: NodeId,
    /// Local variable the handler stores the exception into
    pub variable: Option<VariableId>,
}

impl CatchEntry {
    pub fn is_finally(&self) -> bool {
        self.exception.is_none()
    }
}

/// A try statement with its handlers
#[derive(Debug, Clone)]
pub struct TryCatchFinally {
    pub id: TryId,
    pub start: NodeId,
    pub end: NodeId,
    /// Handler of the first entry
    pub catcher: NodeId,
    pub entries: Vec<CatchEntry>,
    /// Nodes starting an inlined copy of the finally block
    pub duplicate_starts: Vec<NodeId>,
    /// Node where control continues after the whole construct
    pub exit: Option<NodeId>,
}

impl TryCatchFinally {
    fn new(id: TryId, start: NodeId, end: NodeId, catcher: NodeId, exception: Option<String>) -> Self {
        let mut block = Self {
            id,
            start,
            end,
            catcher,
            entries: Vec::new(),
            duplicate_starts: Vec::new(),
            exit: None,
        };
        if exception.is_none() {
            block.duplicate_starts.push(end);
        }
        block.entries.push(CatchEntry {
            exception,
            handler: catcher,
            variable: None,
        });
        block
    }

    /// Entries with a caught type, in table order
    pub fn catches(&self) -> impl Iterator<Item = &CatchEntry> {
        self.entries.iter().filter(|entry| !entry.is_finally())
    }

    pub fn finally(&self) -> Option<&CatchEntry> {
        self.entries.iter().find(|entry| entry.is_finally())
    }

    pub fn handles(&self, node: NodeId) -> bool {
        self.entries.iter().any(|entry| entry.handler == node)
    }
}

/// All records of one unit
#[derive(Debug, Clone, Default)]
pub struct TryCatchFinallyBlocks {
    blocks: Vec<TryCatchFinally>,
}

impl TryCatchFinallyBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TryId) -> &TryCatchFinally {
        &self.blocks[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &TryCatchFinally> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Register one exception table entry.
    ///
    /// A catch-any entry sharing the start of a known record attaches a
    /// finally handler; an entry with the same range adds a catch; an entry
    /// whose handler is already known covers an inlined finally copy that
    /// starts at its range end. Anything else opens a new record.
    pub fn add(
        &mut self,
        graph: &mut NodeGraph,
        start: NodeId,
        end: NodeId,
        handler: NodeId,
        exception: Option<String>,
    ) {
        if start == handler {
            return;
        }
        for node in [start, end, handler] {
            graph.node_mut(node).disposable = false;
        }

        for block in &mut self.blocks {
            if block.handles(handler) {
                if !block.duplicate_starts.contains(&end) && end != handler {
                    block.duplicate_starts.push(end);
                }
                return;
            }
            if exception.is_none() && block.start == start {
                if block.finally().is_none() {
                    block.entries.push(CatchEntry {
                        exception: None,
                        handler,
                        variable: None,
                    });
                    graph.node_mut(handler).additional_calls += 1;
                }
                if !block.duplicate_starts.contains(&end) {
                    block.duplicate_starts.push(end);
                }
                return;
            }
            if block.start == start && block.end == end {
                if !block.entries.iter().any(|entry| entry.exception == exception) {
                    block.entries.push(CatchEntry {
                        exception,
                        handler,
                        variable: None,
                    });
                    graph.node_mut(handler).additional_calls += 1;
                }
                return;
            }
        }

        let id = TryId(self.blocks.len());
        log::trace!("try {:?}: {} .. {} handled by {}", id, start, end, handler);
        graph.node_mut(handler).additional_calls += 1;
        self.blocks.push(TryCatchFinally::new(id, start, end, handler, exception));
    }

    /// Record the exception variable stored by `handler`. Returns false when
    /// `handler` is not a handler entry.
    pub fn bind_variable(&mut self, handler: NodeId, variable: VariableId) -> bool {
        let mut bound = false;
        for block in &mut self.blocks {
            for entry in &mut block.entries {
                if entry.handler == handler && entry.variable.is_none() {
                    entry.variable = Some(variable);
                    bound = true;
                }
            }
        }
        bound
    }

    /// Entry whose handler is `node`
    pub fn entry_for(&self, node: NodeId) -> Option<&CatchEntry> {
        self.blocks
            .iter()
            .flat_map(|block| block.entries.iter())
            .find(|entry| entry.handler == node)
    }

    pub fn is_handler(&self, node: NodeId) -> bool {
        self.entry_for(node).is_some()
    }

    /// Variables bound to handlers; they are declared by the catch clause
    pub fn catch_variables(&self) -> HashSet<VariableId> {
        self.blocks
            .iter()
            .flat_map(|block| block.entries.iter())
            .filter_map(|entry| entry.variable)
            .collect()
    }

    /// Resolve the records against the finished graph: attach the
    /// dominance-only handler edges, drop inlined finally copies, compute the
    /// exits and purge loop artifacts leaving the handlers.
    pub fn process(&mut self, graph: &mut NodeGraph, remove_finally_duplicates: bool) {
        for block in &self.blocks {
            for entry in &block.entries {
                graph.add_handler_edge(block.start, entry.handler);
            }
            graph.node_mut(block.start).tries.push(block.id);
        }

        if remove_finally_duplicates {
            for index in 0..self.blocks.len() {
                self.remove_finally_duplicates(graph, index);
            }
        }

        for block in &mut self.blocks {
            block.exit = search_exit(graph, block);
            log::trace!(
                "try {:?} exits at {}",
                block.id,
                block.exit.map_or_else(|| "-".to_string(), |n| n.to_string())
            );
        }

        for block in &self.blocks {
            for entry in &block.entries {
                purge_loop_artifacts(graph, entry.handler);
            }
        }
    }

    fn remove_finally_duplicates(&mut self, graph: &mut NodeGraph, index: usize) {
        let block = &self.blocks[index];
        let Some(finally) = block.finally().cloned() else {
            return;
        };
        if let Some(variable) = finally.variable {
            strip_rethrow(graph, finally.handler, variable);
        }

        let size = handler_region(graph, finally.handler)
            .into_iter()
            .filter(|&node| !graph.node(node).is_empty())
            .count();
        if size == 0 {
            return;
        }

        let mut disposed = Vec::new();
        for start in block.duplicate_starts.clone() {
            if graph.node(start).disposed || self.blocks.iter().any(|b| b.handles(start)) {
                continue;
            }
            let mut remaining = size;
            let mut recorder = HashSet::new();
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                if remaining == 0 {
                    break;
                }
                if !recorder.insert(node) || graph.node(node).disposed {
                    continue;
                }
                let outgoing = graph.node(node).outgoing.clone();
                if !graph.node(node).is_empty() {
                    remaining -= 1;
                    disposed.extend(graph.dispose(node, true, false));
                }
                queue.extend(outgoing);
            }
        }
        log::debug!("removed {} inlined finally nodes", disposed.len());

        for block in &mut self.blocks {
            if disposed.contains(&block.end) {
                if let Some(previous) = graph.node(block.end).previous.filter(|n| !graph.node(*n).disposed) {
                    block.end = previous;
                } else {
                    block.end = block.start;
                }
            }
            block.duplicate_starts.retain(|node| !disposed.contains(node));
        }
    }
}

/// Nodes dominated by `handler`, found breadth-first from it
fn handler_region(graph: &NodeGraph, handler: NodeId) -> Vec<NodeId> {
    let mut region = vec![handler];
    let mut recorder = HashSet::from([handler]);
    let mut queue = VecDeque::from([handler]);
    while let Some(node) = queue.pop_front() {
        for &out in &graph.node(node).outgoing {
            if graph.has_dominator(out, handler) && recorder.insert(out) {
                region.push(out);
                queue.push_back(out);
            }
        }
    }
    region
}

/// Remove the `throw e` closing a finally handler that caught `e`
fn strip_rethrow(graph: &mut NodeGraph, handler: NodeId, variable: VariableId) {
    for node in handler_region(graph, handler) {
        let stack = &mut graph.node_mut(node).stack;
        let rethrows = matches!(
            stack.last().map(|operand| &operand.kind),
            Some(OperandKind::Throw(value)) if value.variable() == Some(variable)
        );
        if rethrows {
            stack.pop();
        }
    }
}

/// First node dominated by the region start, searching breadth-first from
/// the successors of the handler and then of the region end. Falls back to
/// the first successor leaving the handler's dominance tree.
fn search_exit(graph: &NodeGraph, block: &TryCatchFinally) -> Option<NodeId> {
    let mut queue: VecDeque<NodeId> = graph.node(block.catcher).outgoing.iter().copied().collect();
    queue.extend(graph.node(block.end).outgoing.iter().copied());
    let mut recorder: HashSet<NodeId> = queue.iter().copied().collect();
    while let Some(node) = queue.pop_front() {
        if graph.dominator(node) == Some(block.start) && !block.handles(node) {
            return Some(node);
        }
        for &out in &graph.node(node).outgoing {
            if recorder.insert(out) {
                queue.push_back(out);
            }
        }
    }

    let region = handler_region(graph, block.catcher);
    region
        .iter()
        .flat_map(|&node| graph.node(node).outgoing.iter().copied())
        .find(|out| !region.contains(out))
}

/// Disconnect edges leaving the handler's dominance tree towards loop
/// headers; they come from the handler being woven into an enclosing loop.
fn purge_loop_artifacts(graph: &mut NodeGraph, handler: NodeId) {
    let mut recorder = HashSet::from([handler]);
    let mut queue = VecDeque::from([handler]);
    while let Some(node) = queue.pop_front() {
        for out in graph.node(node).outgoing.clone() {
            if graph.has_dominator(out, handler) {
                if recorder.insert(out) {
                    queue.push_back(out);
                }
            } else if !graph.node(out).backedges.is_empty() {
                log::trace!("purging {} -> {} out of handler {}", node, out, handler);
                graph.disconnect(node, out);
            }
        }
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
    fn same_range_accumulates_catches() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 4);
        let mut tries = TryCatchFinallyBlocks::new();
        tries.add(&mut graph, n[0], n[1], n[2], Some("java/io/IOException".into()));
        tries.add(&mut graph, n[0], n[1], n[3], Some("java/lang/RuntimeException".into()));
        assert_eq!(tries.len(), 1);
        let block = tries.get(TryId(0));
        assert_eq!(block.catches().count(), 2);
        assert!(block.finally().is_none());
        assert_eq!(graph.node(n[3]).additional_calls, 1);
        assert!(!graph.node(n[1]).disposable);
    }

    #[test]
    fn catch_any_with_known_start_attaches_finally() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 6);
        let mut tries = TryCatchFinallyBlocks::new();
        tries.add(&mut graph, n[0], n[1], n[2], Some("java/lang/Exception".into()));
        tries.add(&mut graph, n[0], n[1], n[4], None);
        tries.add(&mut graph, n[2], n[3], n[4], None);
        assert_eq!(tries.len(), 1);
        let block = tries.get(TryId(0));
        assert_eq!(block.finally().map(|e| e.handler), Some(n[4]));
        assert_eq!(block.duplicate_starts, vec![n[1], n[3]]);
    }

    #[test]
    fn self_protecting_entry_is_ignored() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 2);
        let mut tries = TryCatchFinallyBlocks::new();
        tries.add(&mut graph, n[1], n[1], n[1], None);
        assert!(tries.is_empty());
    }

    #[test]
    fn binding_marks_catch_variable() {
        let mut graph = NodeGraph::new();
        let n = nodes(&mut graph, 3);
        let mut tries = TryCatchFinallyBlocks::new();
        tries.add(&mut graph, n[0], n[1], n[2], Some("java/lang/Exception".into()));
        assert!(tries.bind_variable(n[2], VariableId(3)));
        assert!(!tries.bind_variable(n[1], VariableId(4)));
        assert!(tries.catch_variables().contains(&VariableId(3)));
        assert!(tries.is_handler(n[2]));
    }
}
