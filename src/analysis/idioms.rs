//! Compiler idiom recognition
//!
//! javac lowers several source constructs into instruction shapes that the
//! plain stack rules would render as noise: `?:` joins, read-modify-write
//! increments, `return a > b` through two constant returns, `assert`,
//! string concatenation through `invokedynamic` and switch expressions.
//! Each rule here inspects the instruction history and the operand stack
//! and rewrites the stack in place when its shape matches.

use super::executor::MethodDecompiler;
use super::pattern::{Category, Pattern};
use crate::bytecode::{JvmType, Opcode};
use crate::cfg::{Destination, NodeId};
use crate::error::Result;
use crate::idiom;
use crate::operand::{AssignOperator, BinaryOperator, ConstructorKind, InferredType, Operand, OperandKind, UnaryOperator};

/// Whether `operand` can be one arm of a `?:`. Statements left by the
/// branches of an `if`/`else` never join.
fn is_branch_value(operand: &Operand) -> bool {
    if operand.statement || operand.ty.get() == JvmType::Void {
        return false;
    }
    !matches!(
        operand.kind,
        OperandKind::Condition(_)
            | OperandKind::Declaration { .. }
            | OperandKind::Return(_)
            | OperandKind::Throw(_)
            | OperandKind::Yield(_)
            | OperandKind::Assert { .. }
    )
}

impl MethodDecompiler<'_> {
    /// Fold `cond ? a : b` joins. Needs a condition two entries below the
    /// top whose `then` branch reaches the node holding the top value, with
    /// both values dominated by the condition node.
    pub(super) fn fuse_ternary(&mut self) {
        if !self.options.fuse_ternary {
            return;
        }
        while let Some(here) = self.current {
            let (Some((right, _)), Some((left, _)), Some((holder, _))) = (
                self.graph.locate(here, 0),
                self.graph.locate(here, 1),
                self.graph.locate(here, 2),
            ) else {
                return;
            };
            let Some(then) = self
                .graph
                .peek(here, 2)
                .and_then(Operand::as_condition)
                .and_then(|condition| condition.then)
            else {
                return;
            };
            if right == left {
                return;
            }
            let values = [0, 1]
                .iter()
                .all(|&depth| self.graph.peek(here, depth).is_some_and(is_branch_value));
            if !values {
                return;
            }
            let transition = self.collect(then).contains(&right);
            let dominated = self.graph.has_dominator(left, holder) && self.graph.has_dominator(right, holder);
            let nested = holder != left && self.graph.has_dominator(right, left);
            if !transition || !dominated || nested {
                return;
            }

            let (Some(first), Some(second), Some(third)) = (
                self.graph.take(here, 0),
                self.graph.take(here, 0),
                self.graph.take(here, 0),
            ) else {
                return;
            };
            let fused = if first.is_int_constant(1) && second.is_int_constant(0) {
                Operand::new(OperandKind::AmbiguousZeroOne(third.boxed()), InferredType::guess(JvmType::Int))
            } else if first.is_int_constant(0) && second.is_int_constant(1) {
                Operand::new(
                    OperandKind::AmbiguousZeroOne(third.inverted().boxed()),
                    InferredType::guess(JvmType::Int),
                )
            } else {
                let ty = second.ty.clone();
                ty.bind_mutually(&first.ty);
                Operand::new(
                    OperandKind::Ternary {
                        condition: third.inverted().boxed(),
                        then: second.boxed(),
                        elze: first.boxed(),
                    },
                    ty,
                )
                .enclose()
            };
            self.graph.push(holder, fused);
            log::trace!("{}: ternary joined at {}", self.signature, here);

            for node in [right, left] {
                if node != here && node != holder && !self.graph.node(node).disposed && self.graph.node(node).is_empty() {
                    self.dispose(node, false, false);
                }
            }
        }
    }

    /// Empty single-entry single-exit chain starting at `start`
    fn collect(&self, start: NodeId) -> Vec<NodeId> {
        let mut chain = vec![start];
        let mut node = start;
        loop {
            let entry = self.graph.node(node);
            if !(entry.is_empty() && entry.outgoing.len() == 1 && entry.incoming.len() == 1) {
                break;
            }
            node = entry.outgoing[0];
            if chain.contains(&node) {
                break;
            }
            chain.push(node);
        }
        chain
    }

    /// Turn the latest switch into a switch expression when every arm leaves
    /// one value for the empty node where they converge
    pub(super) fn fuse_switch_expression(&mut self) {
        if !self.options.fuse_switch_expressions {
            return;
        }
        let Some(here) = self.current else {
            return;
        };
        if !self.graph.node(here).is_empty() {
            return;
        }
        let Some(index) = self.switches.iter().rposition(|record| !record.expression) else {
            return;
        };
        let head = self.switches[index].head;
        let (Some(head_position), Some(here_position)) = (self.graph.position(head), self.graph.position(here)) else {
            return;
        };
        if head_position >= here_position {
            return;
        }
        let sources = self.graph.node(here).incoming.clone();
        if sources.is_empty() {
            return;
        }
        let eligible = sources.iter().all(|&source| {
            let inside = self
                .graph
                .position(source)
                .is_some_and(|position| head_position < position && position < here_position);
            inside
                && source != head
                && self.graph.has_dominator(source, head)
                && self
                    .graph
                    .node(source)
                    .top()
                    .is_some_and(|top| !top.statement && !top.is_condition())
        });
        if !eligible {
            return;
        }

        let mut ty = None;
        for &source in &sources {
            if let Some(value) = self.graph.node_mut(source).stack.pop() {
                ty.get_or_insert_with(|| value.ty.clone());
                let yielded = Operand::new(OperandKind::Yield(value.boxed()), InferredType::unknown());
                self.graph.push(source, yielded.as_statement());
            }
        }
        self.graph.push(
            here,
            Operand::new(OperandKind::Switch { head }, ty.unwrap_or_else(InferredType::unknown)),
        );
        self.graph.node_mut(here).yield_convergence = true;
        self.switches[index].expression = true;
        log::trace!("{}: switch at {} yields into {}", self.signature, head, here);
    }

    /// Replace the `throw new AssertionError(..)` branch created for an
    /// `assert` with an assert statement on the guarding condition
    pub(super) fn fuse_assert(&mut self, thrown: &Operand) -> bool {
        let (Some(throw_node), Some(here)) = (self.assert_node, self.current) else {
            return false;
        };
        if throw_node != here || !self.graph.node(here).is_empty() {
            return false;
        }
        let OperandKind::ConstructorCall {
            owner,
            kind: ConstructorKind::New,
            arguments,
            ..
        } = &thrown.kind
        else {
            return false;
        };
        if owner != "java/lang/AssertionError" {
            return false;
        }

        let mut between = Vec::new();
        let mut guard = self.graph.node(here).previous;
        while let Some(node) = guard.filter(|&n| self.graph.node(n).is_empty()) {
            between.push(node);
            guard = self.graph.node(node).previous;
        }
        let Some(guard) = guard else {
            return false;
        };
        let Some(condition) = self.graph.node(guard).top().and_then(Operand::as_condition) else {
            return false;
        };
        let (Some(then), Some(elze)) = (condition.then, condition.elze) else {
            return false;
        };
        if elze != here && !between.contains(&elze) {
            return false;
        }

        let Some(condition) = self.graph.node_mut(guard).stack.pop() else {
            return false;
        };
        let assertion = Operand::new(
            OperandKind::Assert {
                condition: condition.boxed(),
                message: arguments.first().cloned().map(Operand::boxed),
            },
            InferredType::unknown(),
        );
        self.graph.push(guard, assertion.as_statement());
        self.graph.set_destination(guard, Destination::Node(then));
        self.assert_node = None;
        self.dispose(here, true, false);
        for node in between {
            if !self.graph.node(node).disposed {
                self.dispose(node, true, false);
            }
        }
        self.current = Some(guard);
        true
    }

    /// `return cond` compiled as a jump over `return 0` into `return 1`
    pub(super) fn fuse_boolean_return(&mut self) -> Result<()> {
        if self.descriptor.return_type != JvmType::Boolean {
            return Ok(());
        }
        let short = |first, second| {
            idiom![
                Category::Compare,
                first,
                Opcode::IRETURN,
                Opcode::LABEL,
                Category::Frame,
                second,
                Opcode::IRETURN
            ]
        };
        let long = |first, second| {
            idiom![
                Category::Compare,
                Opcode::LABEL,
                Category::Frame,
                first,
                Opcode::IRETURN,
                Opcode::LABEL,
                Category::Frame,
                second,
                Opcode::IRETURN
            ]
        };
        let direct = self.matches(&short(Opcode::ICONST_0, Opcode::ICONST_1))
            || self.matches(&long(Opcode::ICONST_0, Opcode::ICONST_1));
        let swapped = self.matches(&short(Opcode::ICONST_1, Opcode::ICONST_0))
            || self.matches(&long(Opcode::ICONST_1, Opcode::ICONST_0));
        if !direct && !swapped {
            return Ok(());
        }

        let here = self.here();
        let Some(previous) = self.graph.node(here).previous else {
            return Ok(());
        };
        let constant = if direct { 1 } else { 0 };
        let returns_other = self.graph.node(previous).top().is_some_and(|top| match &top.kind {
            OperandKind::Return(Some(value)) => {
                value.is_int_constant(1 - constant) || matches!(value.kind, OperandKind::Boolean(b) if b == (constant == 0))
            }
            _ => false,
        });
        let local_constant = self.graph.node(here).stack.len() == 1
            && self.graph.node(here).top().is_some_and(|top| top.is_int_constant(constant));
        if !returns_other || !local_constant {
            return Ok(());
        }

        self.graph.node_mut(here).stack.pop();
        self.graph.node_mut(previous).stack.pop();
        if !self.graph.node(previous).outgoing.contains(&here) {
            self.graph.connect_nodes(previous, here);
        }
        self.graph.set_destination(previous, Destination::Node(here));
        if self.graph.node(previous).is_empty() {
            self.dispose(previous, false, false);
        }
        match self.peek_mut(0) {
            Some(condition) if condition.is_condition() => {
                if swapped {
                    condition.invert_in_place();
                }
                Ok(())
            }
            _ => Err(self.unsupported("boolean return without a condition")),
        }
    }

    /// `x++` on long, float and double locals, whose value is used
    pub(super) fn fuse_local_increment(&mut self, op: Opcode, slot: u16) -> Result<bool> {
        if !matches!(op, Opcode::LSTORE | Opcode::FSTORE | Opcode::DSTORE) {
            return Ok(false);
        }
        let shape = idiom![
            Category::Load,
            Category::Duplicate,
            Category::One,
            Category::Add,
            Category::Store
        ];
        if !self.matches_step(&shape) {
            return Ok(false);
        }
        let Some(kind) = super::variables::SlotKind::of(op) else {
            return Ok(false);
        };
        let variable = self.variables.variable(slot, kind);
        let shaped = self.peek(1).is_some_and(|loaded| loaded.variable() == Some(variable))
            && self.peek(0).is_some_and(|value| step_of(value, |left| left.variable() == Some(variable)).is_some());
        if !shaped {
            return Ok(false);
        }
        let value = self.take(0)?;
        let loaded = self.take(0)?;
        let increment = step_of(&value, |_| true).unwrap_or(true);
        self.push(unary(increment, true, loaded));
        Ok(true)
    }

    /// `a.f++` / `++a.f` used as values
    pub(super) fn fuse_field_increment(&mut self, ty: &JvmType) -> Result<bool> {
        let post = idiom![
            Category::Duplicate,
            Opcode::GETFIELD,
            Category::DuplicateAway,
            Category::One,
            Category::Add,
            Opcode::PUTFIELD
        ];
        let pre = idiom![
            Category::Duplicate,
            Opcode::GETFIELD,
            Category::One,
            Category::Add,
            Category::DuplicateAway,
            Opcode::PUTFIELD
        ];
        let postfix = if self.matches_step(&post) {
            true
        } else if self.matches_step(&pre) {
            false
        } else {
            return Ok(false);
        };
        let Some(increment) = self.peek(0).and_then(|value| step_of(value, |_| true)) else {
            return Ok(false);
        };
        let value = self.take(0)?;
        let _receiver = self.pop(0)?;
        let Some(field) = step_target(value) else {
            return Ok(false);
        };
        field.ty.suggest(ty.clone());
        self.push(unary(increment, postfix, field));
        Ok(true)
    }

    /// `C.f++` / `++C.f` used as values
    pub(super) fn fuse_static_increment(&mut self, field: Operand) -> Result<bool> {
        let post = idiom![
            Opcode::GETSTATIC,
            Category::Duplicate,
            Category::One,
            Category::Add,
            Opcode::PUTSTATIC
        ];
        let pre = idiom![
            Opcode::GETSTATIC,
            Category::One,
            Category::Add,
            Category::Duplicate,
            Opcode::PUTSTATIC
        ];
        let postfix = if self.matches_step(&post) {
            true
        } else if self.matches_step(&pre) {
            false
        } else {
            return Ok(false);
        };
        let Some(increment) = self.peek(0).and_then(|value| step_of(value, |left| left.equivalent(&field))) else {
            return Ok(false);
        };
        self.take(0)?;
        if postfix {
            self.take(0)?;
        }
        self.push(unary(increment, postfix, field));
        Ok(true)
    }

    /// `a[i]++` / `++a[i]` used as values
    pub(super) fn fuse_array_increment(&mut self) -> Result<bool> {
        let post = idiom![
            Opcode::DUP2,
            Category::ArrayLoad,
            Opcode::DUP_X2,
            Category::One,
            Category::Add,
            Category::ArrayStore
        ];
        let pre = idiom![
            Opcode::DUP2,
            Category::ArrayLoad,
            Category::One,
            Category::Add,
            Opcode::DUP_X2,
            Category::ArrayStore
        ];
        let postfix = if self.matches_step(&post) {
            true
        } else if self.matches_step(&pre) {
            false
        } else {
            return Ok(false);
        };
        let Some(increment) = self.peek(0).and_then(|value| step_of(value, |_| true)) else {
            return Ok(false);
        };
        let value = self.take(0)?;
        if postfix {
            self.take(0)?;
        }
        self.pop(0)?;
        self.pop(0)?;
        let Some(access) = step_target(value) else {
            return Ok(false);
        };
        self.push(unary(increment, postfix, access));
        Ok(true)
    }

    /// Template match accepting either `Add` or `Sub` where the template says `Add`
    fn matches_step(&self, shape: &[Pattern]) -> bool {
        if self.matches(shape) {
            return true;
        }
        let subtracting: Vec<Pattern> = shape
            .iter()
            .map(|&pattern| match pattern {
                Pattern::Category(Category::Add) => Pattern::Category(Category::Sub),
                other => other,
            })
            .collect();
        self.matches(&subtracting)
    }

    /// Build the assignment of `value` to `target`. `x = x op y` becomes
    /// `x op= y`; a step of one becomes `x++` as a statement and `++x` as a value.
    pub(super) fn fuse_assignment(&self, target: Operand, mut value: Operand, as_value: bool) -> Operand {
        let ty = target.ty.clone();
        let compound = match &value.kind {
            OperandKind::Binary { left, operator, .. } if self.options.fuse_increments && left.equivalent(&target) => {
                AssignOperator::compound(*operator)
            }
            _ => None,
        };
        if let Some(operator) = compound {
            if let OperandKind::Binary {
                operator: binary, right, ..
            } = std::mem::replace(&mut value.kind, OperandKind::Null)
            {
                let numeric = !matches!(ty.get(), JvmType::Reference(_) | JvmType::Array(_) | JvmType::Boolean);
                let step = match binary {
                    BinaryOperator::Add => 1,
                    _ => -1,
                };
                if numeric
                    && right.is_int_constant(1)
                    && matches!(binary, BinaryOperator::Add | BinaryOperator::Subtract)
                {
                    if let Some(unary) = UnaryOperator::step(step, !as_value) {
                        return Operand::new(
                            OperandKind::Unary {
                                operator: unary,
                                value: target.boxed(),
                            },
                            ty,
                        );
                    }
                }
                return Operand::new(
                    OperandKind::Assign {
                        target: target.boxed(),
                        operator,
                        value: right,
                    },
                    ty,
                );
            }
        }
        Operand::new(
            OperandKind::Assign {
                target: target.boxed(),
                operator: AssignOperator::Assign,
                value: value.boxed(),
            },
            ty,
        )
    }

    /// String concatenation from a `StringConcatFactory` recipe. `\u{1}`
    /// marks an argument; everything else is literal text.
    pub(super) fn concatenation(&self, captures: Vec<Operand>, recipe: Option<&str>) -> Operand {
        let string = JvmType::Reference("java/lang/String".into());
        let mut arguments = captures.into_iter();
        let mut parts: Vec<Operand> = Vec::new();
        match recipe {
            Some(recipe) => {
                let mut literal = String::new();
                for c in recipe.chars() {
                    match c {
                        '\u{1}' => {
                            if !literal.is_empty() {
                                parts.push(Operand::string(std::mem::take(&mut literal)));
                            }
                            parts.extend(arguments.next());
                        }
                        // bootstrap constants are not carried by the feed
                        '\u{2}' => {}
                        c => literal.push(c),
                    }
                }
                if !literal.is_empty() {
                    parts.push(Operand::string(literal));
                }
            }
            None => parts.extend(arguments),
        }
        if !parts.iter().take(2).any(|part| part.ty.is(&string)) {
            parts.insert(0, Operand::string(""));
        }
        let mut parts = parts.into_iter();
        let first = parts.next().unwrap_or_else(|| Operand::string(""));
        parts.fold(first, |left, right| {
            Operand::typed(
                OperandKind::Binary {
                    left: left.boxed(),
                    operator: BinaryOperator::Add,
                    right: right.boxed(),
                },
                string.clone(),
            )
        })
    }
}

/// `Some(true)` for `left + 1`, `Some(false)` for `left - 1` when `left` passes `accept`
fn step_of(value: &Operand, accept: impl Fn(&Operand) -> bool) -> Option<bool> {
    match &value.kind {
        OperandKind::Binary { left, operator, right } if right.is_int_constant(1) && accept(left) => match operator {
            BinaryOperator::Add => Some(true),
            BinaryOperator::Subtract => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// The stepped operand of `left ± 1`
fn step_target(value: Operand) -> Option<Operand> {
    match value.kind {
        OperandKind::Binary { left, .. } => Some(*left),
        _ => None,
    }
}

fn unary(increment: bool, postfix: bool, target: Operand) -> Operand {
    let operator = match (increment, postfix) {
        (true, true) => UnaryOperator::PostIncrement,
        (true, false) => UnaryOperator::PreIncrement,
        (false, true) => UnaryOperator::PostDecrement,
        (false, false) => UnaryOperator::PreDecrement,
    };
    let ty = target.ty.clone();
    Operand::new(
        OperandKind::Unary {
            operator,
            value: target.boxed(),
        },
        ty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::executor::MethodBody;
    use crate::bytecode::{Assembler, FrameKind};
    use crate::config::DecompileOptions;
    use crate::symbols::DescriptorResolver;
    use crate::trace::NoopTracer;

    fn run(asm: &Assembler) -> MethodBody {
        let options = DecompileOptions {
            place_declarations: false,
            ..DecompileOptions::default()
        };
        MethodDecompiler::decompile(&asm.build(), &DescriptorResolver, &NoopTracer, &options).unwrap()
    }

    fn statements(body: &MethodBody) -> Vec<String> {
        body.graph
            .order()
            .iter()
            .flat_map(|&id| body.graph.node(id).stack.iter().map(|operand| operand.to_string()))
            .collect()
    }

    #[test]
    fn compound_assignment_and_increment_statement() {
        let mut asm = Assembler::new_static("A", "m", "(I)V");
        asm.var(Opcode::ILOAD, 0)
            .push_int(3)
            .insn(Opcode::IMUL)
            .var(Opcode::ISTORE, 0)
            .var(Opcode::ILOAD, 0)
            .push_int(1)
            .insn(Opcode::IADD)
            .var(Opcode::ISTORE, 0)
            .insn(Opcode::RETURN);
        assert_eq!(statements(&run(&asm)), vec!["v0 *= 3", "v0++", "return"]);
    }

    #[test]
    fn iinc_before_load_is_a_post_increment_value() {
        let mut asm = Assembler::new_static("A", "m", "(I)I");
        asm.var(Opcode::ILOAD, 0).iinc(0, 1).insn(Opcode::IRETURN);
        assert_eq!(statements(&run(&asm)), vec!["return v0++"]);
    }

    #[test]
    fn string_concatenation_recipe() {
        let mut asm = Assembler::new_static("A", "m", "(I)Ljava/lang/String;");
        asm.var(Opcode::ILOAD, 0)
            .concat("(I)Ljava/lang/String;", "n=\u{1}!")
            .insn(Opcode::ARETURN);
        assert_eq!(statements(&run(&asm)), vec!["return \"n=\" + v0 + \"!\""]);
    }

    #[test]
    fn ternary_joins_values_from_both_branches() {
        let mut asm = Assembler::new_static("A", "m", "(I)I");
        asm.var(Opcode::ILOAD, 0)
            .jump(Opcode::IFLE, 1)
            .push_int(7)
            .jump(Opcode::GOTO, 2)
            .label(1)
            .frame(FrameKind::Same)
            .push_int(9)
            .label(2)
            .frame(FrameKind::Same1)
            .insn(Opcode::IRETURN);
        let body = run(&asm);
        assert_eq!(statements(&body), vec!["return (v0 > 0 ? 7 : 9)"]);
    }
}
