//! Local variable table and declaration placement
//!
//! Slots are mapped to variables per value kind: a slot reused for an `int`
//! and later for a reference yields two variables. Slot 0 of an instance
//! method is `this`. Parameters occupy the first slots according to the
//! method descriptor, with `long` and `double` taking two.

use crate::bytecode::descriptor::parse_type_descriptor;
use crate::bytecode::{JvmType, MethodDescriptor, Opcode};
use crate::cfg::{Destination, NodeGraph, NodeId, SwitchRecord, TryCatchFinallyBlocks};
use crate::operand::{AssignOperator, InferredType, Operand, OperandKind, VariableId};
use std::collections::{HashMap, HashSet};

/// Value kind a slot is accessed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl SlotKind {
    /// Kind addressed by a load, store or `iinc`
    pub fn of(op: Opcode) -> Option<SlotKind> {
        Some(match op {
            Opcode::ILOAD | Opcode::ISTORE | Opcode::IINC => SlotKind::Int,
            Opcode::LLOAD | Opcode::LSTORE => SlotKind::Long,
            Opcode::FLOAD | Opcode::FSTORE => SlotKind::Float,
            Opcode::DLOAD | Opcode::DSTORE => SlotKind::Double,
            Opcode::ALOAD | Opcode::ASTORE => SlotKind::Reference,
            _ => return None,
        })
    }

    pub fn of_type(ty: &JvmType) -> SlotKind {
        match ty {
            JvmType::Long => SlotKind::Long,
            JvmType::Float => SlotKind::Float,
            JvmType::Double => SlotKind::Double,
            ty if ty.is_int_like() => SlotKind::Int,
            _ => SlotKind::Reference,
        }
    }

    /// Provisional type of a variable only known by its kind
    fn default_type(self) -> JvmType {
        match self {
            SlotKind::Int => JvmType::Int,
            SlotKind::Long => JvmType::Long,
            SlotKind::Float => JvmType::Float,
            SlotKind::Double => JvmType::Double,
            SlotKind::Reference => JvmType::Reference("java/lang/Object".into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub id: VariableId,
    pub slot: u16,
    pub kind: SlotKind,
    pub name: String,
    pub ty: InferredType,
    pub parameter: bool,
    /// Named by the debug table
    pub named: bool,
}

/// Variables of one unit
#[derive(Debug, Clone)]
pub struct LocalVariables {
    variables: Vec<LocalVariable>,
    slots: HashMap<(u16, SlotKind), VariableId>,
    is_static: bool,
    owner: String,
}

impl LocalVariables {
    pub fn new(owner: &str, is_static: bool, descriptor: &MethodDescriptor) -> Self {
        let mut table = Self {
            variables: Vec::new(),
            slots: HashMap::new(),
            is_static,
            owner: owner.to_string(),
        };
        let mut slot: u16 = if is_static { 0 } else { 1 };
        for (index, ty) in descriptor.parameters.iter().enumerate() {
            let kind = SlotKind::of_type(ty);
            let id = table.create(slot, kind, format!("arg{}", index), InferredType::fixed(ty.clone()));
            table.variables[id.0].parameter = true;
            slot += if ty.is_wide() { 2 } else { 1 };
        }
        table
    }

    fn create(&mut self, slot: u16, kind: SlotKind, name: String, ty: InferredType) -> VariableId {
        let id = VariableId(self.variables.len());
        self.variables.push(LocalVariable {
            id,
            slot,
            kind,
            name,
            ty,
            parameter: false,
            named: false,
        });
        self.slots.insert((slot, kind), id);
        id
    }

    pub fn is_this(&self, slot: u16) -> bool {
        !self.is_static && slot == 0
    }

    /// Variable for `slot` accessed as `kind`, created on first use
    pub fn variable(&mut self, slot: u16, kind: SlotKind) -> VariableId {
        if let Some(&id) = self.slots.get(&(slot, kind)) {
            return id;
        }
        let reused = self.slots.keys().filter(|(s, _)| *s == slot).count();
        let name = match reused {
            0 => format!("local{}", slot),
            n => format!("local{}_{}", slot, n),
        };
        self.create(slot, kind, name, InferredType::guess(kind.default_type()))
    }

    /// Operand reading `slot` with `op`
    pub fn load(&mut self, slot: u16, op: Opcode) -> Operand {
        if self.is_this(slot) {
            return Operand::typed(OperandKind::This, JvmType::Reference(self.owner.clone()));
        }
        let kind = SlotKind::of(op).unwrap_or(SlotKind::Reference);
        let id = self.variable(slot, kind);
        Operand::local(id, self.variables[id.0].ty.clone())
    }

    /// Target operand of a store of `value` into `slot`; the value's type
    /// is suggested to the variable
    pub fn store(&mut self, slot: u16, op: Opcode, value: &Operand) -> Operand {
        let kind = SlotKind::of(op).unwrap_or(SlotKind::Reference);
        let id = self.variable(slot, kind);
        let ty = &self.variables[id.0].ty;
        let value_type = value.ty.get();
        if !ty.is_fixed() && value_type != JvmType::Unknown && value_type != JvmType::Null {
            ty.suggest(value_type);
        }
        Operand::local(id, ty.clone())
    }

    /// Apply a debug-table entry
    pub fn rename(&mut self, slot: u16, name: &str, descriptor: &str) {
        if self.is_this(slot) {
            return;
        }
        let ty = parse_type_descriptor(descriptor).unwrap_or(JvmType::Unknown);
        let kind = SlotKind::of_type(&ty);
        let id = self.variable(slot, kind);
        let variable = &mut self.variables[id.0];
        if variable.named {
            return;
        }
        variable.name = name.to_string();
        variable.named = true;
        if ty != JvmType::Unknown {
            variable.ty.fix(ty);
        }
    }

    pub fn get(&self, id: VariableId) -> &LocalVariable {
        &self.variables[id.0]
    }

    pub fn name(&self, id: VariableId) -> &str {
        &self.variables[id.0].name
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVariable> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Variables sharing a slot with `id` under another kind
    pub fn slot_siblings(&self, id: VariableId) -> Vec<VariableId> {
        let slot = self.variables[id.0].slot;
        self.variables
            .iter()
            .filter(|v| v.slot == slot && v.id != id)
            .map(|v| v.id)
            .collect()
    }

    /// Parameters in declaration order
    pub fn parameters(&self) -> impl Iterator<Item = &LocalVariable> {
        self.variables.iter().filter(|v| v.parameter)
    }
}

/// Live nodes whose stack references `variable`, in appearance order
fn referencing_nodes(graph: &NodeGraph, variable: VariableId) -> Vec<NodeId> {
    graph
        .order()
        .iter()
        .copied()
        .filter(|&id| graph.node(id).stack.iter().any(|o| o.references(variable)))
        .collect()
}

/// Turn the first top-level assignment of `variable` in `node` into its
/// declaration. Fails when the variable is read in `node` before that.
fn declare_at_first_assignment(graph: &mut NodeGraph, node: NodeId, variable: VariableId) -> bool {
    for operand in &mut graph.node_mut(node).stack {
        if let OperandKind::Assign {
            target,
            operator: AssignOperator::Assign,
            value,
        } = &mut operand.kind
        {
            if target.variable() == Some(variable) && !value.references(variable) {
                if let OperandKind::LocalVariable { declare, .. } = &mut target.kind {
                    *declare = true;
                    return true;
                }
            }
        }
        if operand.references(variable) {
            return false;
        }
    }
    false
}

/// Splice a node holding the declaration of `variable` in front of `before`.
/// Forward predecessors are redirected to it; back-edges keep targeting `before`.
fn insert_declaration(graph: &mut NodeGraph, before: NodeId, variable: VariableId, ty: InferredType) -> NodeId {
    let declaration = graph.insert_before(before);
    for source in graph.pure_incoming(before) {
        graph.disconnect(source, before);
        graph.connect_nodes(source, declaration);
        let node = graph.node_mut(source);
        if node.destination == Some(Destination::Node(before)) {
            node.destination = Some(Destination::Node(declaration));
        }
        for operand in &mut node.stack {
            if let Some(condition) = operand.as_condition_mut() {
                condition.retarget(before, Some(declaration));
            }
        }
    }
    graph.connect_nodes(declaration, before);
    let node = graph.node_mut(declaration);
    node.destination = Some(Destination::Node(before));
    node.disposable = false;
    node.stack.push(Operand::new(OperandKind::Declaration { variable }, ty).as_statement());
    declaration
}

/// Place a declaration for every local that is neither a parameter nor a
/// catch variable.
///
/// A variable used by one node, or whose uses share a dominator that uses
/// it too, is declared at its first assignment there. Otherwise a
/// declaration node is inserted in front of the lowest common dominator of
/// its uses, unless that node is a switch-expression convergence, a switch
/// case or handler entry, or a dominance relative of the declaration point
/// of a same-slot variable. Whatever remains is declared at its first
/// assignment in appearance order.
pub fn place_declarations(
    graph: &mut NodeGraph,
    variables: &LocalVariables,
    tries: &TryCatchFinallyBlocks,
    switches: &[SwitchRecord],
) {
    let catch_variables = tries.catch_variables();
    let pinned: HashSet<NodeId> = switches
        .iter()
        .flat_map(|record| record.arms())
        .chain(tries.iter().flat_map(|block| block.entries.iter().map(|entry| entry.handler)))
        .collect();
    let mut anchors: HashMap<VariableId, NodeId> = HashMap::new();
    let mut pending = Vec::new();

    for variable in variables.iter() {
        if variable.parameter || catch_variables.contains(&variable.id) {
            continue;
        }
        let users = referencing_nodes(graph, variable.id);
        let Some(lcd) = graph.lowest_common_dominator(&users) else {
            if !users.is_empty() {
                pending.push(variable.id);
            }
            continue;
        };
        if users.contains(&lcd) && declare_at_first_assignment(graph, lcd, variable.id) {
            anchors.insert(variable.id, lcd);
            continue;
        }
        let node = graph.node(lcd);
        let related_sibling = variables.slot_siblings(variable.id).iter().any(|sibling| {
            anchors
                .get(sibling)
                .is_some_and(|&other| graph.has_dominator(other, lcd) || graph.has_dominator(lcd, other))
        });
        if node.disposed || node.yield_convergence || pinned.contains(&lcd) || related_sibling {
            pending.push(variable.id);
            continue;
        }
        log::trace!("declare {} before {}", variable.name, node.name);
        insert_declaration(graph, lcd, variable.id, variable.ty.clone());
        anchors.insert(variable.id, lcd);
    }

    for variable in pending {
        let order = graph.order().to_vec();
        let declared = order
            .iter()
            .any(|&node| declare_at_first_assignment(graph, node, variable));
        if !declared {
            if let Some(&first) = referencing_nodes(graph, variable).first() {
                let ty = variables.get(variable).ty.clone();
                graph
                    .node_mut(first)
                    .stack
                    .insert(0, Operand::new(OperandKind::Declaration { variable }, ty).as_statement());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(desc: &str) -> MethodDescriptor {
        MethodDescriptor::parse(desc).unwrap()
    }

    #[test]
    fn parameters_follow_slot_widths() {
        let mut table = LocalVariables::new("A", false, &descriptor("(JI)V"));
        assert!(table.is_this(0));
        let long = table.variable(1, SlotKind::Long);
        let int = table.variable(3, SlotKind::Int);
        assert!(table.get(long).parameter);
        assert!(table.get(int).parameter);
        assert_eq!(table.name(int), "arg1");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn slot_reuse_with_another_kind_creates_a_sibling() {
        let mut table = LocalVariables::new("A", true, &descriptor("()V"));
        let int = table.variable(0, SlotKind::Int);
        let reference = table.variable(0, SlotKind::Reference);
        assert_ne!(int, reference);
        assert_eq!(table.name(reference), "local0_1");
        assert_eq!(table.slot_siblings(int), vec![reference]);
    }

    #[test]
    fn debug_names_apply_once_and_fix_types() {
        let mut table = LocalVariables::new("A", true, &descriptor("()V"));
        table.rename(2, "count", "I");
        table.rename(2, "other", "I");
        let id = table.variable(2, SlotKind::Int);
        assert_eq!(table.name(id), "count");
        assert!(table.get(id).ty.is_fixed());
    }

    #[test]
    fn stores_suggest_value_types() {
        let mut table = LocalVariables::new("A", true, &descriptor("()V"));
        let target = table.store(1, Opcode::ISTORE, &Operand::boolean(true));
        assert_eq!(target.ty.get(), JvmType::Boolean);
        let load = table.load(1, Opcode::ILOAD);
        assert!(load.ty.same_cell(&target.ty));
    }
}
