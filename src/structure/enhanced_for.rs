//! Enhanced for loops
//!
//! `for (T x : e)` compiles to one of two protocols. Over an `Iterable`:
//!
//! ```text
//! it = e.iterator();      // last statement before the header
//! while (it.hasNext()) {  // header condition
//!     x = (T) it.next();  // first statement of the body
//! ```
//!
//! and over an array:
//!
//! ```text
//! a = e; n = a.length; i = 0;  // last statements before the header
//! while (i < n) {              // header condition
//!     x = a[i];                // first statement of the body
//!     ...
//!     i++;                     // last statement of the back-edge node
//! ```
//!
//! When the synthetic variables are used nowhere else the protocol
//! statements are removed and the loop becomes an [`Structure::EnhancedFor`].

use super::recognizer::{Arrival, StructureRecognizer};
use super::{BreakableKind, Structure, StructureId};
use crate::cfg::{NodeGraph, NodeId};
use crate::error::Result;
use crate::operand::{AssignOperator, ConditionOperator, Operand, OperandKind, VariableId};

#[derive(Debug)]
enum Protocol {
    Iterator,
    /// Index incremented at the end of `source`
    Array { source: NodeId },
}

#[derive(Debug)]
struct Iteration {
    protocol: Protocol,
    /// Node ending with the protocol's setup statements
    previous: NodeId,
    variable: Operand,
    iterable: Operand,
}

/// `v = value` as a statement
fn assignment(operand: &Operand) -> Option<(VariableId, &Operand)> {
    match &operand.kind {
        OperandKind::Assign {
            target,
            operator: AssignOperator::Assign,
            value,
        } if operand.statement => Some((target.variable()?, value.as_ref())),
        _ => None,
    }
}

/// Call of the argumentless `name` on local `receiver`
fn is_call_on(operand: &Operand, name: &str, receiver: VariableId) -> bool {
    matches!(
        &operand.kind,
        OperandKind::MethodCall {
            name: called,
            receiver: Some(target),
            arguments,
            ..
        } if called == name && arguments.is_empty() && target.variable() == Some(receiver)
    )
}

/// Loop variable of `x = [(T)] element` when `is_element` accepts the value
fn element_variable(first: &Operand, is_element: impl Fn(&Operand) -> bool) -> Option<Operand> {
    let OperandKind::Assign {
        target,
        operator: AssignOperator::Assign,
        value,
    } = &first.kind
    else {
        return None;
    };
    let element = match &value.kind {
        OperandKind::Cast { value, .. } => value.as_ref(),
        _ => value.as_ref(),
    };
    if !first.statement || target.variable().is_none() || !is_element(element) {
        return None;
    }
    let mut variable = target.as_ref().clone().as_value();
    if let OperandKind::LocalVariable { declare, .. } = &mut variable.kind {
        *declare = true;
    }
    Some(variable)
}

/// Number of statements anywhere in the graph referring to `variable`
fn uses(graph: &NodeGraph, variable: VariableId) -> usize {
    graph
        .order()
        .iter()
        .map(|&id| graph.node(id).stack.iter().filter(|o| o.references(variable)).count())
        .sum()
}

fn is_index_increment(operand: &Operand, index: VariableId) -> bool {
    match &operand.kind {
        OperandKind::Unary { operator, value } => operator.is_increment() && value.variable() == Some(index),
        OperandKind::Assign {
            target,
            operator: AssignOperator::Add,
            value,
        } => target.variable() == Some(index) && value.is_int_constant(1),
        _ => false,
    }
}

impl StructureRecognizer<'_> {
    /// Build an enhanced for loop on `header` when the loop follows either
    /// iteration protocol
    pub(super) fn analyze_enhanced_for(
        &mut self,
        header: NodeId,
        process: NodeId,
        exit: NodeId,
        source: NodeId,
    ) -> Result<Option<StructureId>> {
        if !self.options.fuse_enhanced_for {
            return Ok(None);
        }
        let [previous] = self.graph().pure_incoming(header)[..] else {
            return Ok(None);
        };
        let Some(iteration) = self
            .match_iterator(header, process, previous)
            .or_else(|| self.match_array(header, process, previous, source))
        else {
            return Ok(None);
        };
        log::trace!("{} iterates {:?}", header, iteration.protocol);

        self.body.graph.node_mut(process).stack.remove(0);
        let checkpoint = match iteration.protocol {
            Protocol::Iterator => {
                self.body.graph.node_mut(iteration.previous).stack.pop();
                None
            }
            Protocol::Array { source } => {
                let stack = &mut self.body.graph.node_mut(iteration.previous).stack;
                let setup = stack.len() - 3;
                stack.truncate(setup);
                let checkpoint = self.isolate_updates(source, header, 1);
                self.body.graph.node_mut(checkpoint).stack.pop();
                Some(checkpoint)
            }
        };
        self.take_condition(header)?;

        let breakable = self.open_breakable(BreakableKind::Loop, header, process, Some(exit), checkpoint);
        self.active.push(breakable);
        let inner = self.process(header, Some(process), Arrival::Edge);
        self.active.pop();
        let inner = inner?;

        let follow = self.process(header, Some(exit), Arrival::Edge)?;
        Ok(Some(self.push(Structure::EnhancedFor {
            node: header,
            breakable,
            variable: iteration.variable,
            iterable: iteration.iterable,
            inner,
            follow,
        })))
    }

    fn match_iterator(&self, header: NodeId, process: NodeId, previous: NodeId) -> Option<Iteration> {
        let graph = self.graph();
        let condition = graph.node(header).top()?.as_condition()?;
        if condition.is_compound() {
            return None;
        }
        let iterator = match &condition.left.kind {
            OperandKind::MethodCall {
                name,
                receiver: Some(receiver),
                arguments,
                ..
            } if name == "hasNext" && arguments.is_empty() => receiver.variable()?,
            _ => return None,
        };

        let (assigned, value) = assignment(graph.node(previous).top()?)?;
        if assigned != iterator {
            return None;
        }
        let iterable = match &value.kind {
            OperandKind::MethodCall {
                owner,
                name,
                receiver: Some(receiver),
                arguments,
                ..
            } if name == "iterator" && arguments.is_empty() && self.resolver.is_iterable(owner) => {
                receiver.as_ref().clone()
            }
            _ => return None,
        };

        let first = graph.node(process).stack.first()?;
        let variable = element_variable(first, |element| is_call_on(element, "next", iterator))?;
        if uses(graph, iterator) != 3 {
            return None;
        }
        Some(Iteration {
            protocol: Protocol::Iterator,
            previous,
            variable,
            iterable,
        })
    }

    fn match_array(&self, header: NodeId, process: NodeId, previous: NodeId, source: NodeId) -> Option<Iteration> {
        let graph = self.graph();
        let condition = graph.node(header).top()?.as_condition()?;
        let operator = if condition.then == Some(process) {
            condition.operator
        } else {
            condition.operator.negate()
        };
        if operator != ConditionOperator::LT {
            return None;
        }
        let (index, length) = (condition.left.variable()?, condition.right.variable()?);

        let stack = &graph.node(previous).stack;
        let [array_store, length_store, index_store] = stack.get(stack.len().checked_sub(3)?..)? else {
            return None;
        };
        let (array, iterable) = assignment(array_store)?;
        let (length_variable, length_value) = assignment(length_store)?;
        let (index_variable, start) = assignment(index_store)?;
        let measures_array =
            matches!(&length_value.kind, OperandKind::ArrayLength(value) if value.variable() == Some(array));
        if length_variable != length || index_variable != index || !measures_array || !start.is_int_constant(0) {
            return None;
        }

        let first = graph.node(process).stack.first()?;
        let variable = element_variable(first, |element| {
            matches!(
                &element.kind,
                OperandKind::ArrayAccess { array: accessed, index: position }
                    if accessed.variable() == Some(array) && position.variable() == Some(index)
            )
        })?;
        if !graph.node(source).top().is_some_and(|last| is_index_increment(last, index)) {
            return None;
        }
        if uses(graph, array) != 3 || uses(graph, length) != 2 || uses(graph, index) != 4 {
            return None;
        }
        Some(Iteration {
            protocol: Protocol::Array { source },
            previous,
            variable,
            iterable: iterable.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::JvmType;
    use crate::operand::InferredType;

    fn local(id: usize) -> Operand {
        Operand::local(VariableId(id), InferredType::fixed(JvmType::Int))
    }

    fn store(id: usize, value: Operand) -> Operand {
        Operand::typed(
            OperandKind::Assign {
                target: local(id).boxed(),
                operator: AssignOperator::Assign,
                value: value.boxed(),
            },
            JvmType::Int,
        )
        .as_statement()
    }

    #[test]
    fn cast_element_loads_declare_the_loop_variable() {
        let next = Operand::typed(
            OperandKind::MethodCall {
                owner: "java/util/Iterator".into(),
                name: "next".into(),
                descriptor: "()Ljava/lang/Object;".into(),
                receiver: Some(local(1).boxed()),
                arguments: Vec::new(),
                special: false,
            },
            JvmType::Reference("java/lang/Object".into()),
        );
        let cast = Operand::typed(
            OperandKind::Cast {
                ty: JvmType::Reference("java/lang/String".into()),
                value: next.boxed(),
            },
            JvmType::Reference("java/lang/String".into()),
        );
        let variable = element_variable(&store(2, cast), |e| is_call_on(e, "next", VariableId(1)));
        assert!(matches!(
            variable.map(|v| v.kind),
            Some(OperandKind::LocalVariable {
                variable: VariableId(2),
                declare: true
            })
        ));
        assert!(element_variable(&store(2, Operand::int(0)), |e| is_call_on(e, "next", VariableId(1))).is_none());
    }

    #[test]
    fn index_increments_by_one_only() {
        let add = |amount| {
            Operand::typed(
                OperandKind::Assign {
                    target: local(3).boxed(),
                    operator: AssignOperator::Add,
                    value: Operand::int(amount).boxed(),
                },
                JvmType::Int,
            )
        };
        assert!(is_index_increment(&add(1), VariableId(3)));
        assert!(!is_index_increment(&add(2), VariableId(3)));
        assert!(!is_index_increment(&add(1), VariableId(4)));
    }
}
