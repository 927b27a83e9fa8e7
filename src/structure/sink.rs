//! Code sinks
//!
//! A [`CodeSink`] receives the structured unit as a sequence of `write_*`
//! calls. Nested parts are handed over as [`Code`] values the sink writes
//! wherever its syntax puts them, so a sink decides about keywords, braces
//! and layout while the structure tree decides about nesting.
//!
//! [`StructureCode`] and [`OperandCode`] adapt structures and operands of
//! one unit, described by a [`Scope`], to [`Code`]. The operand adapter
//! inserts parentheses by operator precedence and simplifies comparisons of
//! booleans against `0`/`1`.

use super::{CatchArm, Structure, StructureId, StructureTree, SwitchArm};
use crate::analysis::LocalVariables;
use crate::bytecode::JvmType;
use crate::cfg::NodeGraph;
use crate::operand::{ConditionOperator, ConstructorKind, Number, Operand, OperandCondition, OperandKind};

/// Something a sink can write
pub trait Code {
    fn write(&self, sink: &mut dyn CodeSink);
}

/// One `case` group of a switch
pub struct SwitchCase<'a> {
    pub keys: &'a [i32],
    pub body: &'a dyn Code,
}

/// One handler of a try statement
pub struct CatchClause<'a> {
    /// Caught type by internal name; `None` catches everything
    pub exception: Option<&'a str>,
    pub variable: Option<&'a str>,
    pub body: &'a dyn Code,
}

/// Receiver of decompiled code
pub trait CodeSink {
    // statements

    /// Expression evaluated for its side effect
    fn write_statement(&mut self, statement: &dyn Code);
    fn write_if(&mut self, condition: &dyn Code, then: &dyn Code, elze: Option<&dyn Code>);
    fn write_while(&mut self, label: Option<&str>, condition: &dyn Code, body: &dyn Code);
    fn write_do_while(&mut self, label: Option<&str>, body: &dyn Code, condition: &dyn Code);
    fn write_for(
        &mut self,
        label: Option<&str>,
        initializer: Option<&dyn Code>,
        condition: &dyn Code,
        updates: &[&dyn Code],
        body: &dyn Code,
    );
    fn write_enhanced_for(&mut self, label: Option<&str>, variable: &dyn Code, iterable: &dyn Code, body: &dyn Code);
    fn write_infinite_loop(&mut self, label: Option<&str>, body: &dyn Code);
    fn write_switch(
        &mut self,
        label: Option<&str>,
        selector: &dyn Code,
        cases: &[SwitchCase<'_>],
        default: Option<&dyn Code>,
    );
    fn write_try(&mut self, body: &dyn Code, catches: &[CatchClause<'_>], finally: Option<&dyn Code>);
    fn write_return(&mut self, value: Option<&dyn Code>);
    fn write_throw(&mut self, value: &dyn Code);
    fn write_yield(&mut self, value: &dyn Code);
    fn write_break(&mut self, label: Option<&str>);
    fn write_continue(&mut self, label: Option<&str>);
    fn write_assert(&mut self, condition: &dyn Code, message: Option<&dyn Code>);

    // expressions

    fn write_binary_operation(&mut self, left: &dyn Code, operator: &str, right: &dyn Code);
    fn write_unary_operation(&mut self, operator: &str, postfix: bool, value: &dyn Code);
    fn write_assign_operation(&mut self, target: &dyn Code, operator: &str, value: &dyn Code);
    /// `receiver` is `None` for static calls; `special` marks `super.m()`
    fn write_method_call(
        &mut self,
        receiver: Option<&dyn Code>,
        owner: &str,
        name: &str,
        special: bool,
        arguments: &[&dyn Code],
    );
    fn write_constructor_call(&mut self, kind: ConstructorKind, owner: &str, arguments: &[&dyn Code]);
    fn write_access_field(&mut self, receiver: Option<&dyn Code>, owner: &str, name: &str);
    fn write_access_array(&mut self, array: &dyn Code, index: &dyn Code);
    fn write_array_length(&mut self, array: &dyn Code);
    fn write_create_array(&mut self, element: &JvmType, dimensions: &[&dyn Code], initializers: Option<&[&dyn Code]>);
    fn write_cast(&mut self, ty: &JvmType, value: &dyn Code);
    fn write_instanceof(&mut self, value: &dyn Code, ty: &JvmType);
    fn write_local_variable(&mut self, ty: &JvmType, name: &str, declare: bool);
    fn write_this(&mut self);
    fn write_class_literal(&mut self, ty: &JvmType);
    fn write_ternary(&mut self, condition: &dyn Code, then: &dyn Code, elze: &dyn Code);
    fn write_lambda(&mut self, interface: &str, owner: &str, name: &str, captures: &[&dyn Code]);
    fn write_method_reference(&mut self, receiver: Option<&dyn Code>, owner: &str, name: &str);
    fn write_switch_expression(&mut self, selector: &dyn Code, cases: &[SwitchCase<'_>], default: Option<&dyn Code>);
    fn write_number(&mut self, value: Number);
    fn write_char(&mut self, value: char);
    fn write_string(&mut self, value: &str);
    fn write_boolean(&mut self, value: bool);
    fn write_null(&mut self);
    /// Parenthesized expression
    fn write_enclose(&mut self, inner: &dyn Code);
}

/// Everything needed to write one structured unit
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub graph: &'a NodeGraph,
    pub tree: &'a StructureTree,
    pub variables: &'a LocalVariables,
}

impl<'a> Scope<'a> {
    pub fn new(graph: &'a NodeGraph, tree: &'a StructureTree, variables: &'a LocalVariables) -> Self {
        Self { graph, tree, variables }
    }

    /// The whole unit
    pub fn root(&self) -> StructureCode<'a> {
        self.structure(self.tree.root())
    }

    pub fn structure(&self, id: StructureId) -> StructureCode<'a> {
        StructureCode { scope: *self, id }
    }

    pub fn operand<'b>(&self, operand: &'b Operand) -> OperandCode<'b>
    where
        'a: 'b,
    {
        OperandCode {
            scope: *self,
            operand,
            minimum: 0,
            bare: false,
        }
    }

    fn label(&self, breakable: crate::cfg::BreakableId) -> Option<String> {
        self.tree.label(breakable)
    }
}

/// A structure followed by its follow chain
pub struct StructureCode<'a> {
    scope: Scope<'a>,
    id: StructureId,
}

impl Code for StructureCode<'_> {
    fn write(&self, sink: &mut dyn CodeSink) {
        let scope = &self.scope;
        let mut id = self.id;
        while !id.is_empty() {
            let structure = scope.tree.get(id);
            write_structure(scope, structure, sink);
            id = structure.follow().unwrap_or(StructureId::EMPTY);
        }
    }
}

fn write_structure(scope: &Scope<'_>, structure: &Structure, sink: &mut dyn CodeSink) {
    match structure {
        Structure::Empty => {}
        Structure::Fragment { node, .. } => {
            for operand in scope.graph.node(*node).stack.iter().filter(|o| o.statement) {
                write_statement(scope, operand, sink);
            }
        }
        Structure::If {
            condition, then, elze, ..
        } => {
            let elze = elze.filter(|id| !matches!(scope.tree.get(*id), Structure::Empty));
            let elze = elze.map(|id| scope.structure(id));
            sink.write_if(
                &scope.operand(condition),
                &scope.structure(*then),
                elze.as_ref().map(|code| code as &dyn Code),
            );
        }
        Structure::While {
            breakable,
            condition,
            inner,
            ..
        } => sink.write_while(
            scope.label(*breakable).as_deref(),
            &scope.operand(condition),
            &scope.structure(*inner),
        ),
        Structure::DoWhile {
            breakable,
            inner,
            condition,
            ..
        } => sink.write_do_while(
            scope.label(*breakable).as_deref(),
            &scope.structure(*inner),
            &scope.operand(condition),
        ),
        Structure::For {
            breakable,
            initializer,
            condition,
            updates,
            inner,
            ..
        } => {
            let initializer = initializer.as_ref().map(|operand| scope.operand(operand));
            let updates: Vec<OperandCode<'_>> = updates.iter().map(|operand| scope.operand(operand)).collect();
            sink.write_for(
                scope.label(*breakable).as_deref(),
                initializer.as_ref().map(|code| code as &dyn Code),
                &scope.operand(condition),
                &codes(&updates),
                &scope.structure(*inner),
            );
        }
        Structure::EnhancedFor {
            breakable,
            variable,
            iterable,
            inner,
            ..
        } => sink.write_enhanced_for(
            scope.label(*breakable).as_deref(),
            &scope.operand(variable),
            &scope.operand(iterable),
            &scope.structure(*inner),
        ),
        Structure::InfiniteLoop { breakable, inner, .. } => {
            sink.write_infinite_loop(scope.label(*breakable).as_deref(), &scope.structure(*inner))
        }
        Structure::Switch { expression: true, .. } => {}
        Structure::Switch {
            breakable,
            selector,
            cases,
            default,
            ..
        } => {
            let bodies = switch_bodies(scope, cases);
            let default = default.map(|id| scope.structure(id));
            sink.write_switch(
                scope.label(*breakable).as_deref(),
                &scope.operand(selector),
                &switch_cases(cases, &bodies),
                default.as_ref().map(|code| code as &dyn Code),
            );
        }
        Structure::Try { body, catches, .. } => write_try(scope, *body, catches, sink),
        Structure::Break { breakable, labeled } => {
            let label = labeled.then(|| scope.tree.breakable(*breakable).label());
            sink.write_break(label.as_deref());
        }
        Structure::Continue { breakable, labeled } => {
            let label = labeled.then(|| scope.tree.breakable(*breakable).label());
            sink.write_continue(label.as_deref());
        }
    }
}

fn write_try(scope: &Scope<'_>, body: StructureId, catches: &[CatchArm], sink: &mut dyn CodeSink) {
    let bodies: Vec<StructureCode<'_>> = catches.iter().map(|arm| scope.structure(arm.body)).collect();
    let mut clauses = Vec::new();
    let mut finally = None;
    for (arm, code) in catches.iter().zip(&bodies) {
        match &arm.exception {
            Some(exception) => clauses.push(CatchClause {
                exception: Some(exception.as_str()),
                variable: arm.variable.map(|variable| scope.variables.name(variable)),
                body: code,
            }),
            None => finally = Some(code as &dyn Code),
        }
    }
    sink.write_try(&scope.structure(body), &clauses, finally);
}

fn switch_bodies<'a>(scope: &Scope<'a>, cases: &[SwitchArm]) -> Vec<StructureCode<'a>> {
    cases.iter().map(|arm| scope.structure(arm.body)).collect()
}

fn switch_cases<'a>(cases: &'a [SwitchArm], bodies: &'a [StructureCode<'_>]) -> Vec<SwitchCase<'a>> {
    cases
        .iter()
        .zip(bodies)
        .map(|(arm, body)| SwitchCase {
            keys: &arm.keys,
            body,
        })
        .collect()
}

fn codes<'a, C: Code>(items: &'a [C]) -> Vec<&'a dyn Code> {
    items.iter().map(|item| item as &dyn Code).collect()
}

/// A statement operand: control transfers get their own writer, everything
/// else is an expression statement
fn write_statement(scope: &Scope<'_>, operand: &Operand, sink: &mut dyn CodeSink) {
    match &operand.kind {
        OperandKind::Return(value) => {
            let value = value.as_ref().map(|value| scope.operand(value));
            sink.write_return(value.as_ref().map(|code| code as &dyn Code));
        }
        OperandKind::Throw(value) => sink.write_throw(&scope.operand(value)),
        OperandKind::Yield(value) => sink.write_yield(&scope.operand(value)),
        OperandKind::Assert { condition, message } => {
            let message = message.as_ref().map(|message| scope.operand(message));
            sink.write_assert(
                &scope.operand(condition),
                message.as_ref().map(|code| code as &dyn Code),
            );
        }
        _ => sink.write_statement(&scope.operand(operand)),
    }
}

/// Binding strength of an operand as written
fn precedence(operand: &Operand) -> u8 {
    match &operand.kind {
        OperandKind::Assign { .. } | OperandKind::Lambda { .. } => 1,
        OperandKind::Ternary { .. } => 2,
        OperandKind::AmbiguousZeroOne(inner) if is_boolean(operand) => precedence(inner),
        OperandKind::AmbiguousZeroOne(_) => 2,
        OperandKind::Condition(condition) => match boolean_test(condition) {
            Some(true) => precedence(&condition.left),
            Some(false) => 14,
            None => condition.operator.to_binary().precedence(),
        },
        OperandKind::Binary { operator, .. } => operator.precedence(),
        OperandKind::InstanceOf { .. } => 9,
        OperandKind::Cast { .. } => 13,
        OperandKind::Unary { operator, .. } if operator.is_postfix() => 15,
        OperandKind::Unary { .. } => 14,
        OperandKind::Number(Number::Int(value)) if *value < 0 => 14,
        OperandKind::Number(Number::Long(value)) if *value < 0 => 14,
        _ => 16,
    }
}

fn is_boolean(operand: &Operand) -> bool {
    operand.ty.get() == JvmType::Boolean
}

/// `b == 1`, `b != 0` and friends on a boolean `b`: `Some(true)` when the
/// condition is `b` itself, `Some(false)` when it is `!b`
fn boolean_test(condition: &OperandCondition) -> Option<bool> {
    if condition.is_compound() || !is_boolean(&condition.left) {
        return None;
    }
    let truth = match &condition.right.kind {
        OperandKind::Boolean(value) => *value,
        OperandKind::Number(_) if condition.right.is_int_constant(0) => false,
        OperandKind::Number(_) if condition.right.is_int_constant(1) => true,
        _ => return None,
    };
    match condition.operator {
        ConditionOperator::EQ => Some(truth),
        ConditionOperator::NE => Some(!truth),
        _ => None,
    }
}

/// An operand, parenthesized when it binds looser than `minimum`
pub struct OperandCode<'a> {
    scope: Scope<'a>,
    operand: &'a Operand,
    minimum: u8,
    /// Parentheses already written
    bare: bool,
}

impl<'a> OperandCode<'a> {
    fn child<'b>(&self, operand: &'b Operand, minimum: u8) -> OperandCode<'b>
    where
        'a: 'b,
    {
        OperandCode {
            scope: self.scope,
            operand,
            minimum,
            bare: false,
        }
    }

    fn children<'b>(&self, operands: &'b [Operand]) -> Vec<OperandCode<'b>>
    where
        'a: 'b,
    {
        operands.iter().map(|operand| self.child(operand, 0)).collect()
    }
}

impl Code for OperandCode<'_> {
    fn write(&self, sink: &mut dyn CodeSink) {
        let strength = precedence(self.operand);
        let enclose = strength < self.minimum || (self.operand.enclosed && strength < 15);
        if enclose && !self.bare {
            sink.write_enclose(&OperandCode {
                scope: self.scope,
                operand: self.operand,
                minimum: 0,
                bare: true,
            });
        } else {
            self.write_bare(sink);
        }
    }
}

impl OperandCode<'_> {
    fn write_bare(&self, sink: &mut dyn CodeSink) {
        let operand = self.operand;
        match &operand.kind {
            OperandKind::Number(Number::Int(value)) if is_boolean(operand) => sink.write_boolean(*value != 0),
            OperandKind::Number(Number::Int(value)) if operand.ty.get() == JvmType::Char => {
                match char::from_u32(*value as u32) {
                    Some(value) => sink.write_char(value),
                    None => sink.write_number(Number::Int(*value)),
                }
            }
            OperandKind::Number(number) => sink.write_number(*number),
            OperandKind::Char(value) => sink.write_char(*value),
            OperandKind::String(value) => sink.write_string(value),
            OperandKind::Boolean(value) => sink.write_boolean(*value),
            OperandKind::Null => sink.write_null(),
            OperandKind::This => sink.write_this(),
            OperandKind::Class(ty) => sink.write_class_literal(ty),
            OperandKind::Binary { left, operator, right } => {
                let strength = operator.precedence();
                sink.write_binary_operation(
                    &self.child(left, strength),
                    operator.symbol(),
                    &self.child(right, strength + 1),
                )
            }
            OperandKind::Unary { operator, value } => {
                let minimum = if operator.is_postfix() { 15 } else { 14 };
                sink.write_unary_operation(operator.symbol(), operator.is_postfix(), &self.child(value, minimum))
            }
            OperandKind::Assign { target, operator, value } => {
                sink.write_assign_operation(&self.child(target, 16), operator.symbol(), &self.child(value, 1))
            }
            OperandKind::Condition(condition) => self.write_condition(condition, sink),
            OperandKind::MethodCall {
                owner,
                name,
                receiver,
                arguments,
                special,
                ..
            } => {
                let receiver = receiver.as_ref().map(|receiver| self.child(receiver, 16));
                let arguments = self.children(arguments);
                sink.write_method_call(
                    receiver.as_ref().map(|code| code as &dyn Code),
                    owner,
                    name,
                    *special,
                    &codes(&arguments),
                )
            }
            OperandKind::ConstructorCall {
                owner, kind, arguments, ..
            } => {
                let arguments = self.children(arguments);
                sink.write_constructor_call(*kind, owner, &codes(&arguments))
            }
            OperandKind::Uninitialized { owner } => sink.write_constructor_call(ConstructorKind::New, owner, &[]),
            OperandKind::FieldAccess { owner, name, receiver } => {
                let receiver = receiver.as_ref().map(|receiver| self.child(receiver, 16));
                sink.write_access_field(receiver.as_ref().map(|code| code as &dyn Code), owner, name)
            }
            OperandKind::ArrayAccess { array, index } => {
                sink.write_access_array(&self.child(array, 16), &self.child(index, 0))
            }
            OperandKind::ArrayLength(array) => sink.write_array_length(&self.child(array, 16)),
            OperandKind::NewArray {
                element,
                dimensions,
                initializers,
            } => {
                let dimensions = self.children(dimensions);
                let initializers = initializers.as_ref().map(|values| self.children(values));
                let initializers = initializers.as_ref().map(|values| codes(values));
                sink.write_create_array(element, &codes(&dimensions), initializers.as_deref())
            }
            OperandKind::Cast { ty, value } => sink.write_cast(ty, &self.child(value, 14)),
            OperandKind::InstanceOf { value, ty } => sink.write_instanceof(&self.child(value, 10), ty),
            OperandKind::Ternary { condition, then, elze } => {
                sink.write_ternary(&self.child(condition, 3), &self.child(then, 3), &self.child(elze, 2))
            }
            OperandKind::AmbiguousZeroOne(condition) if is_boolean(operand) => self.child(condition, 0).write(sink),
            OperandKind::AmbiguousZeroOne(condition) => {
                let (one, zero) = (Operand::int(1), Operand::int(0));
                sink.write_ternary(&self.child(condition, 3), &self.child(&one, 0), &self.child(&zero, 0))
            }
            OperandKind::Switch { head } => self.write_switch_expression(*head, sink),
            OperandKind::Lambda {
                owner,
                name,
                interface,
                captures,
                ..
            } => {
                let captures = self.children(captures);
                sink.write_lambda(interface, owner, name, &codes(&captures))
            }
            OperandKind::MethodReference { owner, name, receiver } => {
                let receiver = receiver.as_ref().map(|receiver| self.child(receiver, 16));
                sink.write_method_reference(receiver.as_ref().map(|code| code as &dyn Code), owner, name)
            }
            OperandKind::LocalVariable { variable, declare } => {
                let local = self.scope.variables.get(*variable);
                sink.write_local_variable(&local.ty.get(), &local.name, *declare)
            }
            OperandKind::Declaration { variable } => {
                let local = self.scope.variables.get(*variable);
                sink.write_local_variable(&local.ty.get(), &local.name, true)
            }
            OperandKind::Return(_) | OperandKind::Throw(_) | OperandKind::Yield(_) | OperandKind::Assert { .. } => {
                write_statement(&self.scope, operand, sink)
            }
        }
    }

    fn write_condition(&self, condition: &OperandCondition, sink: &mut dyn CodeSink) {
        match boolean_test(condition) {
            Some(true) => self.child(&condition.left, 0).write(sink),
            Some(false) => sink.write_unary_operation("!", false, &self.child(&condition.left, 14)),
            None => {
                let strength = condition.operator.to_binary().precedence();
                sink.write_binary_operation(
                    &self.child(&condition.left, strength),
                    condition.operator.symbol(),
                    &self.child(&condition.right, strength + 1),
                )
            }
        }
    }

    fn write_switch_expression(&self, head: crate::cfg::NodeId, sink: &mut dyn CodeSink) {
        let scope = &self.scope;
        let Some(Structure::Switch {
            selector,
            cases,
            default,
            ..
        }) = scope.tree.switch_at(head)
        else {
            log::warn!("switch expression at {} was never structured", head);
            sink.write_null();
            return;
        };
        let bodies = switch_bodies(scope, cases);
        let default = default.map(|id| scope.structure(id));
        sink.write_switch_expression(
            &self.child(selector, 0),
            &switch_cases(cases, &bodies),
            default.as_ref().map(|code| code as &dyn Code),
        );
    }
}
