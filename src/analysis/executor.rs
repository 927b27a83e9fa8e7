//! Operand stack symbolic executor
//!
//! [`MethodDecompiler`] consumes the event stream of one unit in a single
//! forward pass. Labels open nodes, jumps add edges and leave conditions on
//! the stack, and every other instruction manipulates the symbolic operand
//! stack of the current node. Idioms that span several instructions are
//! recognized through the instruction history (see `idioms`).

use super::pattern::{Category, InstructionHistory, SlotHistory};
use super::variables::{place_declarations, LocalVariables, SlotKind};
use crate::bytecode::descriptor::{newarray_type, parse_type_descriptor};
use crate::bytecode::{CompiledUnit, Constant, Event, FrameKind, Handle, JvmType, LabelId, MethodDescriptor, Opcode};
use crate::cfg::{Destination, NodeGraph, NodeId, SwitchId, SwitchRecord, TryCatchFinallyBlocks};
use crate::config::DecompileOptions;
use crate::error::{Error, Result};
use crate::idiom;
use crate::operand::{
    BinaryOperator, ConditionOperator, ConstructorKind, InferredType, Number, Operand, OperandCondition, OperandKind,
    UnaryOperator,
};
use crate::symbols::SymbolResolver;
use crate::trace::Tracer;

/// Everything the executor learned about one unit
#[derive(Debug)]
pub struct MethodBody {
    pub signature: String,
    pub owner: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub is_static: bool,
    pub graph: NodeGraph,
    pub tries: TryCatchFinallyBlocks,
    pub switches: Vec<SwitchRecord>,
    pub variables: LocalVariables,
}

impl MethodBody {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn switch(&self, id: SwitchId) -> &SwitchRecord {
        &self.switches[id.0]
    }
}

/// Symbolic executor for one unit
pub struct MethodDecompiler<'a> {
    pub(super) signature: String,
    pub(super) owner: String,
    pub(super) name: String,
    pub(super) descriptor: MethodDescriptor,
    is_static: bool,
    resolver: &'a dyn SymbolResolver,
    tracer: &'a dyn Tracer,
    pub(super) options: &'a DecompileOptions,
    pub(super) graph: NodeGraph,
    pub(super) current: Option<NodeId>,
    pub(super) history: InstructionHistory,
    slots: SlotHistory,
    pub(super) tries: TryCatchFinallyBlocks,
    pub(super) switches: Vec<SwitchRecord>,
    pub(super) variables: LocalVariables,
    /// The next conditional jump is the `$assertionsDisabled` guard
    assert_jump: bool,
    /// The next `new` builds the `AssertionError`
    assert_new: bool,
    /// Node created for the failing branch of an assertion
    pub(super) assert_node: Option<NodeId>,
}

impl<'a> MethodDecompiler<'a> {
    pub fn new(
        unit: &CompiledUnit,
        resolver: &'a dyn SymbolResolver,
        tracer: &'a dyn Tracer,
        options: &'a DecompileOptions,
    ) -> Result<Self> {
        let descriptor = MethodDescriptor::parse(&unit.descriptor).ok_or_else(|| Error::Parse {
            message: format!("malformed method descriptor `{}`", unit.descriptor),
        })?;
        let variables = LocalVariables::new(&unit.owner, unit.is_static, &descriptor);
        Ok(Self {
            signature: unit.signature(),
            owner: unit.owner.clone(),
            name: unit.name.clone(),
            descriptor,
            is_static: unit.is_static,
            resolver,
            tracer,
            options,
            graph: NodeGraph::new(),
            current: None,
            history: InstructionHistory::new(),
            slots: SlotHistory::new(),
            tries: TryCatchFinallyBlocks::new(),
            switches: Vec::new(),
            variables,
            assert_jump: false,
            assert_new: false,
            assert_node: None,
        })
    }

    /// Run the whole unit through the executor
    pub fn decompile(
        unit: &CompiledUnit,
        resolver: &'a dyn SymbolResolver,
        tracer: &'a dyn Tracer,
        options: &'a DecompileOptions,
    ) -> Result<MethodBody> {
        let mut decompiler = Self::new(unit, resolver, tracer, options)?;
        for event in &unit.events {
            decompiler.accept(event)?;
        }
        decompiler.visit_end()
    }

    /// Dispatch one event
    pub fn accept(&mut self, event: &Event) -> Result<()> {
        match event {
            Event::Label { id } => self.visit_label(*id),
            Event::Insn { op } => self.visit_insn(*op),
            Event::Int { op, operand } => self.visit_int_insn(*op, *operand),
            Event::Ldc { constant } => self.visit_ldc_insn(constant),
            Event::Var { op, slot } => self.visit_var_insn(*op, *slot),
            Event::Iinc { slot, increment } => self.visit_iinc_insn(*slot, *increment),
            Event::Field {
                op,
                owner,
                name,
                descriptor,
            } => self.visit_field_insn(*op, owner, name, descriptor),
            Event::Method {
                op,
                owner,
                name,
                descriptor,
            } => self.visit_method_insn(*op, owner, name, descriptor),
            Event::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
                implementation,
                recipe,
            } => self.visit_invoke_dynamic_insn(name, descriptor, bootstrap, implementation.as_ref(), recipe.as_deref()),
            Event::Type { op, descriptor } => self.visit_type_insn(*op, descriptor),
            Event::MultiNewArray { descriptor, dimensions } => self.visit_multi_new_array_insn(descriptor, *dimensions),
            Event::Jump { op, target } => self.visit_jump_insn(*op, *target),
            Event::Switch {
                default,
                keys,
                targets,
            } => self.visit_switch_insn(*default, keys, targets),
            Event::TryCatch {
                start,
                end,
                handler,
                exception,
            } => {
                self.visit_try_catch_block(*start, *end, *handler, exception.clone());
                Ok(())
            }
            Event::LineNumber { line, label } => {
                let node = self.graph.get_or_create(*label);
                self.graph.node_mut(node).line = Some(*line);
                Ok(())
            }
            Event::LocalVariable { slot, name, descriptor } => {
                self.variables.rename(*slot, name, descriptor);
                Ok(())
            }
            Event::Frame { kind, locals, stack } => self.visit_frame(*kind, *locals, *stack),
        }
    }

    // ---------------------------------------------------------------
    // Current node and operand stack
    // ---------------------------------------------------------------

    /// The node instructions are appended to. A unit whose first event is
    /// not a label gets an anonymous head node.
    pub(super) fn here(&mut self) -> NodeId {
        match self.current {
            Some(id) => id,
            None => {
                let id = self.graph.create_anonymous();
                self.graph.append(id);
                self.history.record(Opcode::LABEL);
                self.current = Some(id);
                id
            }
        }
    }

    pub(super) fn record(&mut self, op: Opcode) {
        self.here();
        self.history.record(op);
    }

    pub(super) fn matches(&self, template: &[super::pattern::Pattern]) -> bool {
        self.history.matches(template)
    }

    pub(super) fn push(&mut self, operand: Operand) {
        let here = self.here();
        self.graph.push(here, operand);
    }

    pub(super) fn statement(&mut self, operand: Operand) {
        self.push(operand.as_statement());
    }

    /// Pop the value at `depth`; duplicated values are handed out once and stay
    pub(super) fn pop(&mut self, depth: usize) -> Result<Operand> {
        let here = self.here();
        match self.graph.pop(here, depth) {
            Some(operand) => Ok(operand),
            None => Err(self.unsupported(format!("operand stack underflow at depth {}", depth))),
        }
    }

    /// Remove the value at `depth` regardless of duplication
    pub(super) fn take(&mut self, depth: usize) -> Result<Operand> {
        let here = self.here();
        match self.graph.take(here, depth) {
            Some(operand) => Ok(operand),
            None => Err(self.unsupported(format!("operand stack underflow at depth {}", depth))),
        }
    }

    pub(super) fn peek(&self, depth: usize) -> Option<&Operand> {
        self.graph.peek(self.current?, depth)
    }

    pub(super) fn peek_mut(&mut self, depth: usize) -> Option<&mut Operand> {
        let here = self.here();
        self.graph.peek_mut(here, depth)
    }

    fn pop_arguments(&mut self, parameters: &[JvmType]) -> Result<Vec<Operand>> {
        let mut arguments = Vec::with_capacity(parameters.len());
        for ty in parameters.iter().rev() {
            let value = self.pop(0)?;
            arguments.push(coerce(value, ty));
        }
        arguments.reverse();
        Ok(arguments)
    }

    pub(super) fn unsupported(&self, detail: impl Into<String>) -> Error {
        Error::UnsupportedIdiom {
            signature: self.signature.clone(),
            detail: detail.into(),
            nodes: self.graph.dump(),
        }
    }

    /// Dispose `node`, moving the insertion point back if it was disposed
    pub(super) fn dispose(&mut self, node: NodeId, clear_stack: bool, recursive: bool) {
        let previous = self.graph.node(node).previous;
        let disposed = self.graph.dispose(node, clear_stack, recursive);
        self.follow_disposal(&disposed, previous);
    }

    pub(super) fn merge(&mut self, node: NodeId) {
        let previous = self.graph.node(node).previous;
        let disposed = self.graph.merge(node);
        self.follow_disposal(&disposed, previous);
    }

    fn follow_disposal(&mut self, disposed: &[NodeId], fallback: Option<NodeId>) {
        if let Some(current) = self.current {
            if disposed.contains(&current) {
                let mut candidate = fallback;
                while let Some(node) = candidate.filter(|&n| self.graph.node(n).disposed) {
                    candidate = self.graph.node(node).previous;
                }
                self.current = candidate;
            }
        }
    }

    fn trace(&self, phase: &str, node: NodeId) {
        if self.options.trace && self.tracer.enabled() {
            self.tracer.node(&self.signature, phase, &self.graph, node);
        }
    }

    // ---------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------

    pub fn visit_label(&mut self, label: LabelId) -> Result<()> {
        self.history.record(Opcode::LABEL);
        let next = self.graph.get_or_create(label);
        if self.graph.is_placed(next) {
            return Err(self.unsupported(format!("label {} visited twice", label)));
        }
        if let Some(current) = self.current {
            if self.graph.node(current).destination.is_none() {
                self.graph.connect_nodes(current, next);
                self.graph.set_destination(current, Destination::Node(next));
            }
        }
        self.graph.append(next);
        self.current = Some(next);
        if self.graph.order().len() > 1 {
            if let Some(previous) = self.graph.node(next).previous {
                self.merge(previous);
            }
        }
        self.trace("label", next);
        Ok(())
    }

    pub fn visit_frame(&mut self, kind: FrameKind, locals: u16, stack: u16) -> Result<()> {
        self.record(kind.opcode());
        match kind {
            FrameKind::Full => {
                self.fuse_ternary();
                if stack > 0 {
                    self.fuse_switch_expression();
                }
            }
            FrameKind::Same if locals == 0 && stack == 0 => {
                self.fuse_ternary();
                let here = self.here();
                if let Some(previous) = self.graph.node(here).previous {
                    self.merge(previous);
                }
            }
            FrameKind::Same1 if stack == 1 => {
                self.fuse_ternary();
                self.fuse_switch_expression();
            }
            _ => {}
        }
        Ok(())
    }

    pub fn visit_insn(&mut self, op: Opcode) -> Result<()> {
        self.record(op);
        match op {
            Opcode::NOP => {}
            Opcode::ACONST_NULL => self.push(Operand::null()),
            Opcode::ICONST_M1
            | Opcode::ICONST_0
            | Opcode::ICONST_1
            | Opcode::ICONST_2
            | Opcode::ICONST_3
            | Opcode::ICONST_4
            | Opcode::ICONST_5 => self.push(Operand::int(op.0 as i32 - Opcode::ICONST_0.0 as i32)),
            Opcode::LCONST_0 | Opcode::LCONST_1 => {
                self.push(Operand::number(Number::Long((op.0 - Opcode::LCONST_0.0) as i64)))
            }
            Opcode::FCONST_0 | Opcode::FCONST_1 | Opcode::FCONST_2 => {
                self.push(Operand::number(Number::Float((op.0 - Opcode::FCONST_0.0) as f32)))
            }
            Opcode::DCONST_0 | Opcode::DCONST_1 => {
                self.push(Operand::number(Number::Double((op.0 - Opcode::DCONST_0.0) as f64)))
            }

            Opcode::DUP | Opcode::DUP2 => {
                if self.matches(&idiom![Opcode::NEW, Category::Duplicate]) {
                    return Ok(());
                }
                let wide = {
                    match self.peek_mut(0) {
                        Some(top) => {
                            top.duplicated = true;
                            top.ty.get().is_wide()
                        }
                        None => return Err(self.unsupported("dup on an empty stack")),
                    }
                };
                if op == Opcode::DUP2 && !wide {
                    if let Some(second) = self.peek_mut(1) {
                        second.duplicated = true;
                    }
                }
            }
            // The copy below the top only matters to the increment templates
            Opcode::DUP_X1 | Opcode::DUP2_X1 => {}
            Opcode::DUP_X2 | Opcode::DUP2_X2 => match self.peek_mut(0) {
                Some(top) => top.duplicated = true,
                None => return Err(self.unsupported("dup_x2 on an empty stack")),
            },
            Opcode::SWAP => {
                let top = self.take(0)?;
                let below = self.take(0)?;
                self.push(top);
                self.push(below);
            }
            Opcode::POP | Opcode::POP2 => self.visit_pop()?,

            Opcode::IADD | Opcode::LADD | Opcode::FADD | Opcode::DADD => self.binary(op, BinaryOperator::Add)?,
            Opcode::ISUB | Opcode::LSUB | Opcode::FSUB | Opcode::DSUB => self.binary(op, BinaryOperator::Subtract)?,
            Opcode::IMUL | Opcode::LMUL | Opcode::FMUL | Opcode::DMUL => self.binary(op, BinaryOperator::Multiply)?,
            Opcode::IDIV | Opcode::LDIV | Opcode::FDIV | Opcode::DDIV => self.binary(op, BinaryOperator::Divide)?,
            Opcode::IREM | Opcode::LREM | Opcode::FREM | Opcode::DREM => self.binary(op, BinaryOperator::Remainder)?,
            Opcode::ISHL | Opcode::LSHL => self.binary(op, BinaryOperator::ShiftLeft)?,
            Opcode::ISHR | Opcode::LSHR => self.binary(op, BinaryOperator::ShiftRight)?,
            Opcode::IUSHR | Opcode::LUSHR => self.binary(op, BinaryOperator::UnsignedShiftRight)?,
            Opcode::IAND | Opcode::LAND => self.binary(op, BinaryOperator::BitAnd)?,
            Opcode::IOR | Opcode::LOR => self.binary(op, BinaryOperator::BitOr)?,
            Opcode::IXOR | Opcode::LXOR => self.binary(op, BinaryOperator::BitXor)?,
            Opcode::INEG | Opcode::LNEG | Opcode::FNEG | Opcode::DNEG => {
                let value = self.pop(0)?;
                let ty = value.ty.clone();
                self.push(Operand::new(
                    OperandKind::Unary {
                        operator: UnaryOperator::Negate,
                        value: value.boxed(),
                    },
                    ty,
                ));
            }

            // Widening conversions are implicit in source
            Opcode::I2L | Opcode::I2F | Opcode::I2D | Opcode::L2F | Opcode::L2D | Opcode::F2D => {
                let value = self.take(0)?;
                let ty = match op {
                    Opcode::I2L => JvmType::Long,
                    Opcode::I2F | Opcode::L2F => JvmType::Float,
                    _ => JvmType::Double,
                };
                let mut widened = value;
                if let OperandKind::Number(number) = widened.kind {
                    widened.kind = OperandKind::Number(widen(number, &ty));
                }
                widened.ty = InferredType::fixed(ty);
                self.push(widened);
            }
            Opcode::L2I | Opcode::F2I | Opcode::D2I => self.cast(JvmType::Int)?,
            Opcode::F2L | Opcode::D2L => self.cast(JvmType::Long)?,
            Opcode::D2F => self.cast(JvmType::Float)?,
            Opcode::I2B => self.cast(JvmType::Byte)?,
            Opcode::I2C => self.cast(JvmType::Char)?,
            Opcode::I2S => self.cast(JvmType::Short)?,

            // Handled by the conditional jump that follows
            Opcode::LCMP | Opcode::FCMPL | Opcode::FCMPG | Opcode::DCMPL | Opcode::DCMPG => {}

            op if op.is_array_load() => {
                let index = self.pop(0)?;
                let array = self.pop(0)?;
                let ty = match op {
                    Opcode::IALOAD => JvmType::Int,
                    Opcode::LALOAD => JvmType::Long,
                    Opcode::FALOAD => JvmType::Float,
                    Opcode::DALOAD => JvmType::Double,
                    Opcode::CALOAD => JvmType::Char,
                    Opcode::SALOAD => JvmType::Short,
                    _ => array.ty.get().element().cloned().unwrap_or(JvmType::Unknown),
                };
                self.push(Operand::new(
                    OperandKind::ArrayAccess {
                        array: array.boxed(),
                        index: index.boxed(),
                    },
                    InferredType::guess(ty),
                ));
            }
            op if op.is_array_store() => self.visit_array_store(op)?,
            Opcode::ARRAYLENGTH => {
                let array = self.pop(0)?;
                self.push(Operand::typed(OperandKind::ArrayLength(array.boxed()), JvmType::Int));
            }

            op if op.is_return() => self.visit_return(op)?,
            Opcode::ATHROW => {
                let value = self.pop(0)?;
                if !self.fuse_assert(&value) {
                    self.statement(Operand::new(OperandKind::Throw(value.boxed()), InferredType::unknown()));
                    let here = self.here();
                    self.graph.set_destination(here, Destination::Termination);
                }
            }

            // Synchronized blocks are not reconstructed; the lock operand is dropped
            Opcode::MONITORENTER | Opcode::MONITOREXIT => {
                self.pop(0)?;
            }

            other => return Err(self.unsupported(format!("unsupported instruction {}", other))),
        }
        Ok(())
    }

    fn visit_pop(&mut self) -> Result<()> {
        let here = self.here();
        if self.peek(0).is_none() && self.tries.is_handler(here) {
            // caught exception discarded by the handler
            return Ok(());
        }
        let is_null_check = self.matches(&idiom![Category::Duplicate, Category::Invoke, Opcode::POP])
            && matches!(
                self.peek(0).map(|o| &o.kind),
                Some(OperandKind::MethodCall { name, .. }) if name == "getClass" || name == "requireNonNull"
            );
        let value = self.pop(0)?;
        if !is_null_check {
            self.statement(value);
        }
        Ok(())
    }

    fn binary(&mut self, op: Opcode, operator: BinaryOperator) -> Result<()> {
        let right = self.pop(0)?;
        let left = self.pop(0)?;
        let logical = matches!(
            operator,
            BinaryOperator::BitAnd | BinaryOperator::BitOr | BinaryOperator::BitXor
        );
        let ty = if logical && left.ty.is(&JvmType::Boolean) && right.ty.is(&JvmType::Boolean) {
            InferredType::fixed(JvmType::Boolean)
        } else {
            InferredType::guess(arithmetic_type(op))
        };
        self.push(Operand::new(
            OperandKind::Binary {
                left: left.boxed(),
                operator,
                right: right.boxed(),
            },
            ty,
        ));
        Ok(())
    }

    fn cast(&mut self, ty: JvmType) -> Result<()> {
        let value = self.pop(0)?;
        let cast = match (&value.kind, &ty) {
            (OperandKind::Number(Number::Int(code)), JvmType::Char) => {
                match char::from_u32(*code as u32) {
                    Some(c) => Operand::typed(OperandKind::Char(c), JvmType::Char),
                    None => Operand::typed(OperandKind::Cast { ty: ty.clone(), value: value.boxed() }, ty),
                }
            }
            _ => Operand::typed(
                OperandKind::Cast {
                    ty: ty.clone(),
                    value: value.boxed(),
                },
                ty,
            ),
        };
        self.push(cast);
        Ok(())
    }

    fn visit_array_store(&mut self, op: Opcode) -> Result<()> {
        if self.fuse_array_increment()? {
            return Ok(());
        }
        let mut value = self.take(0)?;
        if op == Opcode::CASTORE {
            value = coerce(value, &JvmType::Char);
        } else if op == Opcode::BASTORE {
            if let Some(JvmType::Boolean) = self.peek(1).and_then(|a| a.ty.get().element().cloned()) {
                value = coerce(value, &JvmType::Boolean);
            }
        }
        let index = self.pop(0)?;
        if self.append_initializer(&index, &mut value) {
            return Ok(());
        }
        let array = self.pop(0)?;
        let element = array.ty.get().element().cloned().unwrap_or(JvmType::Unknown);
        let target = Operand::new(
            OperandKind::ArrayAccess {
                array: array.boxed(),
                index: index.boxed(),
            },
            InferredType::guess(element),
        );
        let duplicated = std::mem::replace(&mut value.duplicated, false);
        let assignment = self.fuse_assignment(target, value, duplicated);
        self.push_assignment(assignment, duplicated);
        Ok(())
    }

    /// `new T[]{a, b}` stores each element into the duplicated fresh array
    fn append_initializer(&mut self, index: &Operand, value: &mut Operand) -> bool {
        let OperandKind::Number(Number::Int(position)) = index.kind else {
            return false;
        };
        let Some(array) = self.peek_mut(0) else {
            return false;
        };
        if !array.duplicated {
            return false;
        }
        let OperandKind::NewArray {
            dimensions,
            initializers,
            ..
        } = &mut array.kind
        else {
            return false;
        };
        let fits = matches!(
            dimensions.as_slice(),
            [size] if matches!(size.kind, OperandKind::Number(Number::Int(length)) if length > position)
        );
        let filled = initializers.as_ref().map_or(0, Vec::len);
        if !fits || filled != position as usize {
            return false;
        }
        initializers
            .get_or_insert_with(Vec::new)
            .push(std::mem::replace(value, Operand::null()));
        array.duplicated = false;
        true
    }

    /// Push an assignment built from a store. A duplicated value means the
    /// assignment is itself the value of an enclosing expression.
    pub(super) fn push_assignment(&mut self, assignment: Operand, as_value: bool) {
        if as_value {
            self.push(assignment.enclose());
        } else {
            self.statement(assignment);
        }
    }

    fn visit_return(&mut self, op: Opcode) -> Result<()> {
        let here = self.here();
        if op == Opcode::RETURN {
            self.statement(Operand::new(OperandKind::Return(None), InferredType::fixed(JvmType::Void)));
        } else {
            if op == Opcode::IRETURN {
                self.fuse_boolean_return()?;
            }
            let value = self.pop(0)?;
            let return_type = self.descriptor.return_type.clone();
            let value = coerce(value, &return_type);
            self.statement(Operand::new(
                OperandKind::Return(Some(value.boxed())),
                InferredType::fixed(return_type),
            ));
        }
        let here = self.current.unwrap_or(here);
        self.graph.set_destination(here, Destination::Termination);
        Ok(())
    }

    pub fn visit_int_insn(&mut self, op: Opcode, operand: i32) -> Result<()> {
        self.record(op);
        match op {
            Opcode::BIPUSH | Opcode::SIPUSH => self.push(Operand::int(operand)),
            Opcode::NEWARRAY => {
                let element = newarray_type(operand);
                if element == JvmType::Unknown {
                    return Err(self.unsupported(format!("newarray type code {}", operand)));
                }
                let size = self.pop(0)?;
                self.push(new_array(element, vec![size]));
            }
            other => return Err(self.unsupported(format!("{} with an int operand", other))),
        }
        Ok(())
    }

    pub fn visit_ldc_insn(&mut self, constant: &Constant) -> Result<()> {
        self.record(Opcode::LDC);
        let operand = match constant {
            Constant::Int(value) => Operand::int(*value),
            Constant::Long(value) => Operand::number(Number::Long(*value)),
            Constant::Float(value) => Operand::number(Number::Float(*value)),
            Constant::Double(value) => Operand::number(Number::Double(*value)),
            Constant::String(value) => Operand::string(value.clone()),
            Constant::Type(name) => Operand::typed(
                OperandKind::Class(JvmType::from_internal_name(name)),
                JvmType::Reference("java/lang/Class".into()),
            ),
        };
        self.push(operand);
        Ok(())
    }

    pub fn visit_var_insn(&mut self, op: Opcode, slot: u16) -> Result<()> {
        self.record(op);
        self.slots.record(slot);
        if op.is_load() {
            if op == Opcode::ILOAD && self.matches(&idiom![Opcode::IINC, Opcode::ILOAD]) && self.slots.repeats() {
                // `++i` / `i += n` used as a value: the increment already sits on the stack
                let kind = SlotKind::of(op).unwrap_or(SlotKind::Int);
                let variable = self.variables.variable(slot, kind);
                if let Some(top) = self.peek_mut(0) {
                    if top.statement && top.references(variable) {
                        top.statement = false;
                        top.enclosed = matches!(top.kind, OperandKind::Assign { .. });
                        return Ok(());
                    }
                }
            }
            let operand = self.variables.load(slot, op);
            self.push(operand);
            return Ok(());
        }
        if !op.is_store() {
            return Err(self.unsupported(format!("{} is not a local variable instruction", op)));
        }

        let here = self.here();
        if op == Opcode::ASTORE && self.peek(0).is_none() && self.tries.is_handler(here) {
            let variable = self.variables.variable(slot, SlotKind::Reference);
            let exception = self
                .tries
                .entry_for(here)
                .and_then(|entry| entry.exception.clone())
                .unwrap_or_else(|| "java/lang/Throwable".to_string());
            self.variables.get(variable).ty.suggest(JvmType::Reference(exception));
            self.tries.bind_variable(here, variable);
            return Ok(());
        }
        if self.fuse_local_increment(op, slot)? {
            return Ok(());
        }

        let mut value = self.take(0)?;
        let duplicated = std::mem::replace(&mut value.duplicated, false);
        let target = self.variables.store(slot, op, &value);
        let value = coerce(value, &target.ty.get());
        let assignment = self.fuse_assignment(target, value, duplicated);
        self.push_assignment(assignment, duplicated);
        Ok(())
    }

    pub fn visit_iinc_insn(&mut self, slot: u16, increment: i32) -> Result<()> {
        self.record(Opcode::IINC);
        self.slots.record(slot);
        let variable = self.variables.variable(slot, SlotKind::Int);
        let local = Operand::local(variable, self.variables.get(variable).ty.clone());
        let ty = local.ty.clone();

        let post = self.matches(&idiom![Opcode::ILOAD, Opcode::IINC])
            && self.slots.repeats()
            && self.peek(0).is_some_and(|top| top.variable() == Some(variable) && !top.statement);
        match UnaryOperator::step(increment as i64, post) {
            Some(operator) if post => {
                let loaded = self.pop(0)?;
                self.push(Operand::new(
                    OperandKind::Unary {
                        operator,
                        value: loaded.boxed(),
                    },
                    ty,
                ));
            }
            Some(operator) => self.statement(Operand::new(
                OperandKind::Unary {
                    operator,
                    value: local.boxed(),
                },
                ty,
            )),
            None => {
                let (operator, amount) = if increment < 0 {
                    (crate::operand::AssignOperator::Subtract, -(increment as i64))
                } else {
                    (crate::operand::AssignOperator::Add, increment as i64)
                };
                self.statement(Operand::new(
                    OperandKind::Assign {
                        target: local.boxed(),
                        operator,
                        value: Operand::int(amount as i32).boxed(),
                    },
                    ty,
                ));
            }
        }
        Ok(())
    }

    pub fn visit_field_insn(&mut self, op: Opcode, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        if op == Opcode::GETSTATIC && name == "$assertionsDisabled" {
            self.assert_jump = true;
            self.assert_new = true;
            return Ok(());
        }
        self.record(op);
        let is_static = matches!(op, Opcode::GETSTATIC | Opcode::PUTSTATIC);
        let member = self.resolver.resolve_field(owner, name, descriptor, is_static)?;
        let field = |receiver: Option<Operand>| {
            Operand::typed(
                OperandKind::FieldAccess {
                    owner: member.declaring_type.clone(),
                    name: member.name.clone(),
                    receiver: receiver.map(Operand::boxed),
                },
                member.value_type.clone(),
            )
        };

        match op {
            Opcode::GETSTATIC => self.push(field(None)),
            Opcode::GETFIELD => {
                let receiver = self.pop(0)?;
                self.push(field(Some(receiver)));
            }
            Opcode::PUTFIELD => {
                if self.fuse_field_increment(&member.value_type)? {
                    return Ok(());
                }
                let mut value = self.take(0)?;
                let receiver = self.pop(0)?;
                let chained = std::mem::replace(&mut value.duplicated, false)
                    || self.matches(&idiom![Category::DuplicateAway, Opcode::PUTFIELD]);
                let value = coerce(value, &member.value_type);
                let assignment = self.fuse_assignment(field(Some(receiver)), value, chained);
                self.push_assignment(assignment, chained);
            }
            Opcode::PUTSTATIC => {
                if self.fuse_static_increment(field(None))? {
                    return Ok(());
                }
                let mut value = self.take(0)?;
                let chained = std::mem::replace(&mut value.duplicated, false);
                let value = coerce(value, &member.value_type);
                let assignment = self.fuse_assignment(field(None), value, chained);
                self.push_assignment(assignment, chained);
            }
            other => return Err(self.unsupported(format!("{} is not a field instruction", other))),
        }
        Ok(())
    }

    pub fn visit_method_insn(&mut self, op: Opcode, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.record(op);
        let is_static = op == Opcode::INVOKESTATIC;
        let member = self.resolver.resolve_method(owner, name, descriptor, is_static)?;
        let arguments = self.pop_arguments(&member.parameters)?;
        let returns = member.value_type.clone();

        let call = |receiver: Option<Operand>, arguments: Vec<Operand>, special: bool| {
            Operand::typed(
                OperandKind::MethodCall {
                    owner: member.declaring_type.clone(),
                    name: member.name.clone(),
                    descriptor: descriptor.to_string(),
                    receiver: receiver.map(Operand::boxed),
                    arguments,
                    special,
                },
                returns.clone(),
            )
        };

        let result = match op {
            Opcode::INVOKESTATIC => call(None, arguments, false),
            Opcode::INVOKEVIRTUAL | Opcode::INVOKEINTERFACE => {
                let receiver = self.pop(0)?;
                call(Some(receiver), arguments, false)
            }
            Opcode::INVOKESPECIAL if name == "<init>" => {
                let receiver = self.pop(0)?;
                match receiver.kind {
                    OperandKind::Uninitialized { owner: created } => {
                        self.push(Operand::typed(
                            OperandKind::ConstructorCall {
                                owner: created.clone(),
                                descriptor: descriptor.to_string(),
                                kind: ConstructorKind::New,
                                arguments,
                            },
                            JvmType::Reference(created),
                        ));
                        return Ok(());
                    }
                    OperandKind::This if self.name == "<init>" => {
                        if owner == "java/lang/Object" && arguments.is_empty() {
                            return Ok(());
                        }
                        let kind = if owner == self.owner {
                            ConstructorKind::This
                        } else {
                            ConstructorKind::Super
                        };
                        self.statement(Operand::typed(
                            OperandKind::ConstructorCall {
                                owner: owner.to_string(),
                                descriptor: descriptor.to_string(),
                                kind,
                                arguments,
                            },
                            JvmType::Void,
                        ));
                        return Ok(());
                    }
                    _ => return Err(self.unsupported(format!("constructor of {} on an initialized value", owner))),
                }
            }
            Opcode::INVOKESPECIAL => {
                let receiver = self.pop(0)?;
                let special = matches!(receiver.kind, OperandKind::This) && owner != self.owner;
                call(Some(receiver), arguments, special)
            }
            other => return Err(self.unsupported(format!("{} is not a method instruction", other))),
        };

        if returns == JvmType::Void {
            self.statement(result);
        } else {
            self.push(result);
        }
        Ok(())
    }

    pub fn visit_invoke_dynamic_insn(
        &mut self,
        name: &str,
        descriptor: &str,
        bootstrap: &Handle,
        implementation: Option<&Handle>,
        recipe: Option<&str>,
    ) -> Result<()> {
        self.record(Opcode::INVOKEDYNAMIC);
        let parsed = MethodDescriptor::parse(descriptor).ok_or_else(|| Error::Parse {
            message: format!("malformed invokedynamic descriptor `{}`", descriptor),
        })?;
        let captures = self.pop_arguments(&parsed.parameters)?;

        let operand = match (bootstrap.owner.as_str(), implementation) {
            ("java/lang/invoke/StringConcatFactory", _) => self.concatenation(captures, recipe),
            ("java/lang/invoke/LambdaMetafactory", Some(handle)) => {
                let interface = match &parsed.return_type {
                    JvmType::Reference(name) => name.clone(),
                    other => other.source_name(),
                };
                if handle.name.starts_with("lambda$") {
                    Operand::typed(
                        OperandKind::Lambda {
                            owner: handle.owner.clone(),
                            name: handle.name.clone(),
                            descriptor: handle.descriptor.clone(),
                            interface,
                            captures,
                        },
                        parsed.return_type.clone(),
                    )
                } else {
                    Operand::typed(
                        OperandKind::MethodReference {
                            owner: handle.owner.clone(),
                            name: if handle.name == "<init>" { "new".into() } else { handle.name.clone() },
                            receiver: captures.into_iter().next().map(Operand::boxed),
                        },
                        parsed.return_type.clone(),
                    )
                }
            }
            (owner, _) => {
                return Err(self.unsupported(format!("invokedynamic {} bootstrapped by {}", name, owner)));
            }
        };
        self.push(operand);
        Ok(())
    }

    pub fn visit_type_insn(&mut self, op: Opcode, descriptor: &str) -> Result<()> {
        self.record(op);
        let ty = JvmType::from_internal_name(descriptor);
        match op {
            Opcode::NEW => {
                if std::mem::replace(&mut self.assert_new, false) {
                    let guard = self.here();
                    let created = self.graph.insert_after(guard);
                    self.graph.connect_nodes(guard, created);
                    self.graph.set_destination(guard, Destination::Node(created));
                    self.current = Some(created);
                    self.assert_node = Some(created);
                    self.merge(guard);
                }
                self.push(Operand::typed(
                    OperandKind::Uninitialized {
                        owner: descriptor.to_string(),
                    },
                    ty,
                ));
            }
            Opcode::ANEWARRAY => {
                let size = self.pop(0)?;
                self.push(new_array(ty, vec![size]));
            }
            Opcode::CHECKCAST => {
                let value = self.pop(0)?;
                self.push(Operand::typed(
                    OperandKind::Cast {
                        ty: ty.clone(),
                        value: value.boxed(),
                    },
                    ty,
                ));
            }
            Opcode::INSTANCEOF => {
                let value = self.pop(0)?;
                self.push(Operand::typed(
                    OperandKind::InstanceOf {
                        value: value.boxed(),
                        ty,
                    },
                    JvmType::Boolean,
                ));
            }
            other => return Err(self.unsupported(format!("{} with a type operand", other))),
        }
        Ok(())
    }

    pub fn visit_multi_new_array_insn(&mut self, descriptor: &str, dimensions: u8) -> Result<()> {
        self.record(Opcode::MULTIANEWARRAY);
        let ty = parse_type_descriptor(descriptor).ok_or_else(|| Error::Parse {
            message: format!("malformed array descriptor `{}`", descriptor),
        })?;
        let mut sizes = Vec::with_capacity(dimensions as usize);
        for _ in 0..dimensions {
            sizes.push(self.pop(0)?);
        }
        sizes.reverse();
        let mut element = ty.clone();
        for _ in 0..dimensions {
            element = match element {
                JvmType::Array(inner) => *inner,
                other => other,
            };
        }
        self.push(Operand::typed(
            OperandKind::NewArray {
                element,
                dimensions: sizes,
                initializers: None,
            },
            ty,
        ));
        Ok(())
    }

    pub fn visit_jump_insn(&mut self, op: Opcode, label: LabelId) -> Result<()> {
        if std::mem::replace(&mut self.assert_jump, false) {
            return Ok(());
        }
        self.record(op);
        let target = self.graph.get_or_create(label);
        let here = self.here();

        if op == Opcode::GOTO {
            self.graph.node_mut(here).disposable = false;
            self.graph.connect_nodes(here, target);
            self.graph.set_destination(here, Destination::Node(target));
            return Ok(());
        }
        if matches!(op, Opcode::JSR | Opcode::RET) || !op.is_conditional_jump() {
            return Err(self.unsupported(format!("{} is not supported", op)));
        }

        let operator = condition_operator(op);
        let condition = if op.is_binary_jump() {
            let right = self.pop(0)?;
            let left = self.pop(0)?;
            OperandCondition::compare(left, operator, right, target)
        } else if self.history.preceded_by(&[super::pattern::Pattern::Category(Category::LongCompare)])
            || self.history.preceded_by(&[super::pattern::Pattern::Category(Category::FloatCompare)])
            || self.history.preceded_by(&[super::pattern::Pattern::Category(Category::DoubleCompare)])
        {
            let right = self.pop(0)?;
            let left = self.pop(0)?;
            OperandCondition::compare(left, operator, right, target)
        } else if matches!(op, Opcode::IFNULL | Opcode::IFNONNULL) {
            let value = self.pop(0)?;
            OperandCondition::compare(value, operator, Operand::null(), target)
        } else {
            let value = self.pop(0)?;
            let zero = match value.ty.get() {
                JvmType::Boolean => Operand::boolean(false),
                _ => Operand::int(0),
            };
            OperandCondition::compare(value, operator, zero, target)
        };
        self.push(Operand::condition(condition));
        self.graph.connect_nodes(here, target);
        Ok(())
    }

    pub fn visit_switch_insn(&mut self, default: LabelId, keys: &[i32], targets: &[LabelId]) -> Result<()> {
        self.record(Opcode::TABLESWITCH);
        if keys.len() != targets.len() {
            return Err(self.unsupported("switch keys and targets differ in length"));
        }
        let selector = self.take(0)?;
        let head = self.here();
        self.graph.push(head, selector);

        let default = self.graph.get_or_create(default);
        let targets: Vec<NodeId> = targets.iter().map(|&label| self.graph.get_or_create(label)).collect();
        for &target in targets.iter().chain(std::iter::once(&default)) {
            self.graph.connect_nodes(head, target);
            self.graph.node_mut(target).disposable = false;
        }
        let id = SwitchId(self.switches.len());
        self.graph.set_destination(head, Destination::Node(default));
        let node = self.graph.node_mut(head);
        node.disposable = false;
        node.switch = Some(id);
        self.switches.push(SwitchRecord::new(id, head, default, keys.to_vec(), targets));
        Ok(())
    }

    pub fn visit_try_catch_block(&mut self, start: LabelId, end: LabelId, handler: LabelId, exception: Option<String>) {
        let start = self.graph.get_or_create(start);
        let end = self.graph.get_or_create(end);
        let handler = self.graph.get_or_create(handler);
        self.tries.add(&mut self.graph, start, end, handler, exception);
    }

    /// Finish the unit: drop empty nodes, split mixed ones, find back-edges,
    /// resolve protected regions and place declarations
    pub fn visit_end(mut self) -> Result<MethodBody> {
        for node in self.graph.order().to_vec() {
            let entry = self.graph.node(node);
            if entry.disposed {
                continue;
            }
            if entry.disposable && entry.is_empty() {
                self.graph.dispose(node, false, false);
            } else {
                self.graph.split_mixed(node);
            }
        }
        if self.graph.order().is_empty() {
            return Err(self.unsupported("unit has no instructions"));
        }
        self.graph.compute_backedges();
        self.tries.process(&mut self.graph, self.options.remove_finally_duplicates);
        if self.options.place_declarations {
            place_declarations(&mut self.graph, &self.variables, &self.tries, &self.switches);
        }
        if self.options.trace && self.tracer.enabled() {
            self.tracer.pass(
                &self.signature,
                &format!(
                    "{} nodes, {} edges, {} protected regions",
                    self.graph.order().len(),
                    self.graph.edge_count(),
                    self.tries.len()
                ),
            );
        }
        log::debug!("{}: {} nodes after symbolic execution", self.signature, self.graph.order().len());
        Ok(MethodBody {
            signature: self.signature,
            owner: self.owner,
            name: self.name,
            descriptor: self.descriptor,
            is_static: self.is_static,
            graph: self.graph,
            tries: self.tries,
            switches: self.switches,
            variables: self.variables,
        })
    }
}

/// Adjust a value to the type it is stored into: `0`/`1` become booleans,
/// int constants become chars, 0/1 ternaries become their condition
pub(super) fn coerce(mut value: Operand, ty: &JvmType) -> Operand {
    let literal = match (&value.kind, ty) {
        (OperandKind::Number(Number::Int(0)), JvmType::Boolean) => Some(Operand::boolean(false)),
        (OperandKind::Number(Number::Int(1)), JvmType::Boolean) => Some(Operand::boolean(true)),
        (OperandKind::Number(Number::Int(code)), JvmType::Char) => {
            char::from_u32(*code as u32).map(|c| Operand::typed(OperandKind::Char(c), JvmType::Char))
        }
        _ => None,
    };
    if let Some(literal) = literal {
        return literal;
    }
    if *ty == JvmType::Boolean && matches!(value.kind, OperandKind::AmbiguousZeroOne(_)) {
        if let OperandKind::AmbiguousZeroOne(condition) = std::mem::replace(&mut value.kind, OperandKind::Null) {
            return *condition;
        }
    }
    if !value.ty.is_fixed() && *ty != JvmType::Unknown && *ty != JvmType::Void {
        value.ty.suggest(ty.clone());
    }
    value
}

fn condition_operator(op: Opcode) -> ConditionOperator {
    match op {
        Opcode::IFEQ | Opcode::IF_ICMPEQ | Opcode::IF_ACMPEQ | Opcode::IFNULL => ConditionOperator::EQ,
        Opcode::IFNE | Opcode::IF_ICMPNE | Opcode::IF_ACMPNE | Opcode::IFNONNULL => ConditionOperator::NE,
        Opcode::IFLT | Opcode::IF_ICMPLT => ConditionOperator::LT,
        Opcode::IFGE | Opcode::IF_ICMPGE => ConditionOperator::GE,
        Opcode::IFGT | Opcode::IF_ICMPGT => ConditionOperator::GT,
        _ => ConditionOperator::LE,
    }
}

/// Result type of an arithmetic instruction
fn arithmetic_type(op: Opcode) -> JvmType {
    match op {
        Opcode::LADD
        | Opcode::LSUB
        | Opcode::LMUL
        | Opcode::LDIV
        | Opcode::LREM
        | Opcode::LSHL
        | Opcode::LSHR
        | Opcode::LUSHR
        | Opcode::LAND
        | Opcode::LOR
        | Opcode::LXOR => JvmType::Long,
        Opcode::FADD | Opcode::FSUB | Opcode::FMUL | Opcode::FDIV | Opcode::FREM => JvmType::Float,
        Opcode::DADD | Opcode::DSUB | Opcode::DMUL | Opcode::DDIV | Opcode::DREM => JvmType::Double,
        _ => JvmType::Int,
    }
}

fn widen(number: Number, ty: &JvmType) -> Number {
    let (integral, floating) = match number {
        Number::Int(v) => (v as i64, v as f64),
        Number::Long(v) => (v, v as f64),
        Number::Float(v) => (v as i64, v as f64),
        Number::Double(v) => (v as i64, v),
    };
    match ty {
        JvmType::Long => Number::Long(integral),
        JvmType::Float => Number::Float(floating as f32),
        _ => Number::Double(floating),
    }
}

fn new_array(element: JvmType, dimensions: Vec<Operand>) -> Operand {
    let ty = JvmType::Array(Box::new(element.clone()));
    Operand::typed(
        OperandKind::NewArray {
            element,
            dimensions,
            initializers: None,
        },
        ty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Assembler;
    use crate::symbols::DescriptorResolver;
    use crate::trace::NoopTracer;

    fn run(asm: &Assembler) -> MethodBody {
        let options = DecompileOptions {
            place_declarations: false,
            ..DecompileOptions::default()
        };
        MethodDecompiler::decompile(&asm.build(), &DescriptorResolver, &NoopTracer, &options).unwrap()
    }

    #[test]
    fn straight_line_code_stays_in_one_node() {
        let mut asm = Assembler::new_static("A", "m", "(I)I");
        asm.var(Opcode::ILOAD, 0).push_int(2).insn(Opcode::IMUL).insn(Opcode::IRETURN);
        let body = run(&asm);
        assert_eq!(body.graph.order().len(), 1);
        let entry = body.graph.node(body.graph.order()[0]);
        assert_eq!(entry.stack.len(), 1);
        assert_eq!(entry.stack[0].to_string(), "return v0 * 2");
        assert_eq!(entry.destination, Some(Destination::Termination));
    }

    #[test]
    fn underflow_is_an_unsupported_idiom() {
        let mut asm = Assembler::new_static("A", "m", "()V");
        asm.insn(Opcode::IADD);
        let options = DecompileOptions::default();
        match MethodDecompiler::decompile(&asm.build(), &DescriptorResolver, &NoopTracer, &options) {
            Err(Error::UnsupportedIdiom { signature, .. }) => assert_eq!(signature, "A.m()V"),
            other => panic!("unexpected {:?}", other.map(|b| b.signature)),
        }
    }

    #[test]
    fn jsr_is_rejected() {
        let mut asm = Assembler::new_static("A", "m", "()V");
        asm.label(0).jump(Opcode::JSR, 1).label(1).insn(Opcode::RETURN);
        let options = DecompileOptions::default();
        assert!(MethodDecompiler::decompile(&asm.build(), &DescriptorResolver, &NoopTracer, &options).is_err());
    }

    #[test]
    fn chained_assignment_keeps_the_inner_assignment_as_value() {
        let mut asm = Assembler::new_static("A", "m", "()V");
        asm.push_int(5)
            .insn(Opcode::DUP)
            .var(Opcode::ISTORE, 0)
            .var(Opcode::ISTORE, 1)
            .insn(Opcode::RETURN);
        let body = run(&asm);
        let entry = body.graph.node(body.graph.order()[0]);
        assert_eq!(entry.stack[0].to_string(), "v1 = (v0 = 5)");
    }
}
