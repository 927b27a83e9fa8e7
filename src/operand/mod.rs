//! Operand module
//!
//! This module defines the expression tree produced by symbolic execution of
//! the operand stack. Each node's stack holds [`Operand`] values; values
//! consumed by later instructions are nested into the operands that consume
//! them, and whatever remains at the end is a statement.

pub mod condition;
pub mod operators;
pub mod types;

pub use condition::OperandCondition;
pub use operators::{AssignOperator, BinaryOperator, ConditionOperator, UnaryOperator};
pub use types::InferredType;

use crate::bytecode::JvmType;
use crate::cfg::NodeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OPERAND_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an operand. Clones made for duplicated stack entries share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperandId(pub u64);

/// Index into the unit's local variable table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Number {
    pub fn jvm_type(self) -> JvmType {
        match self {
            Number::Int(_) => JvmType::Int,
            Number::Long(_) => JvmType::Long,
            Number::Float(_) => JvmType::Float,
            Number::Double(_) => JvmType::Double,
        }
    }

    /// Integral value for exact comparisons against small constants
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Number::Int(value) => Some(value as i64),
            Number::Long(value) => Some(value),
            Number::Float(value) if value.fract() == 0.0 => Some(value as i64),
            Number::Double(value) if value.fract() == 0.0 => Some(value as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{}", value),
            Number::Long(value) => write!(f, "{}L", value),
            Number::Float(value) => write!(f, "{:?}F", value),
            Number::Double(value) => write!(f, "{:?}D", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructorKind {
    /// `new T(...)`
    New,
    /// `super(...)` inside a constructor
    Super,
    /// `this(...)` inside a constructor
    This,
}

#[derive(Debug, Clone)]
pub enum OperandKind {
    Number(Number),
    Char(char),
    String(String),
    Boolean(bool),
    Null,
    This,
    Class(JvmType),
    Binary {
        left: Box<Operand>,
        operator: BinaryOperator,
        right: Box<Operand>,
    },
    Unary {
        operator: UnaryOperator,
        value: Box<Operand>,
    },
    Assign {
        target: Box<Operand>,
        operator: AssignOperator,
        value: Box<Operand>,
    },
    Condition(Box<OperandCondition>),
    MethodCall {
        owner: String,
        name: String,
        descriptor: String,
        /// `None` for static calls
        receiver: Option<Box<Operand>>,
        arguments: Vec<Operand>,
        /// `super.m()` style non-virtual call
        special: bool,
    },
    ConstructorCall {
        owner: String,
        descriptor: String,
        kind: ConstructorKind,
        arguments: Vec<Operand>,
    },
    /// Result of `new` before its constructor runs
    Uninitialized {
        owner: String,
    },
    FieldAccess {
        owner: String,
        name: String,
        /// `None` for static fields
        receiver: Option<Box<Operand>>,
    },
    ArrayAccess {
        array: Box<Operand>,
        index: Box<Operand>,
    },
    ArrayLength(Box<Operand>),
    NewArray {
        element: JvmType,
        dimensions: Vec<Operand>,
        initializers: Option<Vec<Operand>>,
    },
    Cast {
        ty: JvmType,
        value: Box<Operand>,
    },
    InstanceOf {
        value: Box<Operand>,
        ty: JvmType,
    },
    Ternary {
        condition: Box<Operand>,
        then: Box<Operand>,
        elze: Box<Operand>,
    },
    /// A condition materialized as `1`/`0`; boolean in boolean context
    AmbiguousZeroOne(Box<Operand>),
    /// Switch expression whose head node is `head`
    Switch {
        head: NodeId,
    },
    Lambda {
        owner: String,
        name: String,
        descriptor: String,
        interface: String,
        captures: Vec<Operand>,
    },
    MethodReference {
        owner: String,
        name: String,
        receiver: Option<Box<Operand>>,
    },
    LocalVariable {
        variable: VariableId,
        /// This reference is the variable's declaration
        declare: bool,
    },
    Declaration {
        variable: VariableId,
    },
    Return(Option<Box<Operand>>),
    Throw(Box<Operand>),
    Yield(Box<Operand>),
    Assert {
        condition: Box<Operand>,
        message: Option<Box<Operand>>,
    },
}

/// A node of the expression tree
#[derive(Debug, Clone)]
pub struct Operand {
    pub id: OperandId,
    pub kind: OperandKind,
    pub ty: InferredType,
    /// A `dup` left a second copy of this value on the stack
    pub duplicated: bool,
    /// Rendered inside parentheses
    pub enclosed: bool,
    /// Kept on the stack as a statement rather than a pending value
    pub statement: bool,
}

impl Operand {
    pub fn new(kind: OperandKind, ty: InferredType) -> Self {
        Self {
            id: OperandId(NEXT_OPERAND_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            ty,
            duplicated: false,
            enclosed: false,
            statement: false,
        }
    }

    pub fn typed(kind: OperandKind, ty: JvmType) -> Self {
        Self::new(kind, InferredType::fixed(ty))
    }

    pub fn int(value: i32) -> Self {
        Self::new(OperandKind::Number(Number::Int(value)), InferredType::guess(JvmType::Int))
    }

    pub fn number(value: Number) -> Self {
        let ty = value.jvm_type();
        if matches!(value, Number::Int(_)) {
            Self::new(OperandKind::Number(value), InferredType::guess(ty))
        } else {
            Self::typed(OperandKind::Number(value), ty)
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::typed(
            OperandKind::String(value.into()),
            JvmType::Reference("java/lang/String".into()),
        )
    }

    pub fn boolean(value: bool) -> Self {
        Self::typed(OperandKind::Boolean(value), JvmType::Boolean)
    }

    pub fn null() -> Self {
        Self::new(OperandKind::Null, InferredType::guess(JvmType::Null))
    }

    pub fn condition(condition: OperandCondition) -> Self {
        Self::typed(OperandKind::Condition(Box::new(condition)), JvmType::Boolean)
    }

    pub fn local(variable: VariableId, ty: InferredType) -> Self {
        Self::new(
            OperandKind::LocalVariable {
                variable,
                declare: false,
            },
            ty,
        )
    }

    pub fn as_statement(mut self) -> Self {
        self.statement = true;
        self
    }

    pub fn as_value(mut self) -> Self {
        self.statement = false;
        self
    }

    pub fn enclose(mut self) -> Self {
        self.enclosed = true;
        self
    }

    pub fn boxed(self) -> Box<Operand> {
        Box::new(self)
    }

    pub fn is_condition(&self) -> bool {
        matches!(self.kind, OperandKind::Condition(_))
    }

    pub fn as_condition(&self) -> Option<&OperandCondition> {
        match &self.kind {
            OperandKind::Condition(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn as_condition_mut(&mut self) -> Option<&mut OperandCondition> {
        match &mut self.kind {
            OperandKind::Condition(condition) => Some(condition),
            _ => None,
        }
    }

    pub fn into_condition(self) -> Option<OperandCondition> {
        match self.kind {
            OperandKind::Condition(condition) => Some(*condition),
            _ => None,
        }
    }

    /// Integer constant equal to `value`
    pub fn is_int_constant(&self, value: i64) -> bool {
        matches!(&self.kind, OperandKind::Number(number) if number.as_i64() == Some(value))
    }

    pub fn variable(&self) -> Option<VariableId> {
        match self.kind {
            OperandKind::LocalVariable { variable, .. } => Some(variable),
            _ => None,
        }
    }

    /// Logical negation in place
    pub fn invert_in_place(&mut self) {
        match &mut self.kind {
            OperandKind::Condition(condition) => condition.invert(),
            OperandKind::AmbiguousZeroOne(inner) => inner.invert_in_place(),
            OperandKind::Boolean(value) => *value = !*value,
            _ => {
                let inner = std::mem::replace(self, Operand::null());
                *self = Operand::typed(
                    OperandKind::Unary {
                        operator: UnaryOperator::Not,
                        value: inner.enclose().boxed(),
                    },
                    JvmType::Boolean,
                );
            }
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert_in_place();
        self
    }

    /// Operands that have an effect when evaluated on their own
    pub fn has_side_effect(&self) -> bool {
        match &self.kind {
            OperandKind::MethodCall { .. }
            | OperandKind::ConstructorCall { .. }
            | OperandKind::Assign { .. }
            | OperandKind::Return(_)
            | OperandKind::Throw(_)
            | OperandKind::Yield(_)
            | OperandKind::Assert { .. }
            | OperandKind::Declaration { .. }
            | OperandKind::Switch { .. } => true,
            OperandKind::Unary { operator, .. } => operator.is_increment(),
            _ => false,
        }
    }

    /// Ends the control flow of its node
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            OperandKind::Return(_) | OperandKind::Throw(_) | OperandKind::Yield(_)
        )
    }

    /// Structural equality, used to recognize `x = x op y`
    pub fn equivalent(&self, other: &Operand) -> bool {
        if self.id == other.id {
            return true;
        }
        match (&self.kind, &other.kind) {
            (OperandKind::This, OperandKind::This) => true,
            (
                OperandKind::LocalVariable { variable: a, .. },
                OperandKind::LocalVariable { variable: b, .. },
            ) => a == b,
            (
                OperandKind::FieldAccess {
                    owner: o1,
                    name: n1,
                    receiver: r1,
                },
                OperandKind::FieldAccess {
                    owner: o2,
                    name: n2,
                    receiver: r2,
                },
            ) => {
                o1 == o2
                    && n1 == n2
                    && match (r1, r2) {
                        (Some(a), Some(b)) => a.equivalent(b),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (
                OperandKind::ArrayAccess { array: a1, index: i1 },
                OperandKind::ArrayAccess { array: a2, index: i2 },
            ) => a1.equivalent(a2) && i1.equivalent(i2),
            (OperandKind::Number(a), OperandKind::Number(b)) => a == b,
            (OperandKind::String(a), OperandKind::String(b)) => a == b,
            _ => false,
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&Operand> {
        match &self.kind {
            OperandKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            OperandKind::Unary { value, .. }
            | OperandKind::ArrayLength(value)
            | OperandKind::Cast { value, .. }
            | OperandKind::InstanceOf { value, .. }
            | OperandKind::AmbiguousZeroOne(value)
            | OperandKind::Throw(value)
            | OperandKind::Yield(value) => vec![value.as_ref()],
            OperandKind::Assign { target, value, .. } => vec![target.as_ref(), value.as_ref()],
            OperandKind::Condition(condition) => vec![&condition.left, &condition.right],
            OperandKind::MethodCall { receiver, arguments, .. } => {
                receiver.iter().map(|r| r.as_ref()).chain(arguments.iter()).collect()
            }
            OperandKind::ConstructorCall { arguments, .. } => arguments.iter().collect(),
            OperandKind::FieldAccess { receiver, .. } | OperandKind::MethodReference { receiver, .. } => {
                receiver.iter().map(|r| r.as_ref()).collect()
            }
            OperandKind::ArrayAccess { array, index } => vec![array.as_ref(), index.as_ref()],
            OperandKind::NewArray {
                dimensions,
                initializers,
                ..
            } => dimensions.iter().chain(initializers.iter().flatten()).collect(),
            OperandKind::Ternary { condition, then, elze } => {
                vec![condition.as_ref(), then.as_ref(), elze.as_ref()]
            }
            OperandKind::Lambda { captures, .. } => captures.iter().collect(),
            OperandKind::Return(value) => value.iter().map(|v| v.as_ref()).collect(),
            OperandKind::Assert { condition, message } => std::iter::once(condition.as_ref())
                .chain(message.iter().map(|m| m.as_ref()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Pre-order walk over this operand and all nested operands
    pub fn walk(&self, f: &mut dyn FnMut(&Operand)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Pre-order walk with mutable access
    pub fn walk_mut(&mut self, f: &mut dyn FnMut(&mut Operand)) {
        f(self);
        match &mut self.kind {
            OperandKind::Binary { left, right, .. } => {
                left.walk_mut(f);
                right.walk_mut(f);
            }
            OperandKind::Unary { value, .. }
            | OperandKind::ArrayLength(value)
            | OperandKind::Cast { value, .. }
            | OperandKind::InstanceOf { value, .. }
            | OperandKind::AmbiguousZeroOne(value)
            | OperandKind::Throw(value)
            | OperandKind::Yield(value) => value.walk_mut(f),
            OperandKind::Assign { target, value, .. } => {
                target.walk_mut(f);
                value.walk_mut(f);
            }
            OperandKind::Condition(condition) => {
                condition.left.walk_mut(f);
                condition.right.walk_mut(f);
            }
            OperandKind::MethodCall { receiver, arguments, .. } => {
                if let Some(receiver) = receiver {
                    receiver.walk_mut(f);
                }
                arguments.iter_mut().for_each(|a| a.walk_mut(f));
            }
            OperandKind::ConstructorCall { arguments, .. } => arguments.iter_mut().for_each(|a| a.walk_mut(f)),
            OperandKind::FieldAccess { receiver, .. } | OperandKind::MethodReference { receiver, .. } => {
                if let Some(receiver) = receiver {
                    receiver.walk_mut(f);
                }
            }
            OperandKind::ArrayAccess { array, index } => {
                array.walk_mut(f);
                index.walk_mut(f);
            }
            OperandKind::NewArray {
                dimensions,
                initializers,
                ..
            } => {
                dimensions.iter_mut().for_each(|d| d.walk_mut(f));
                initializers.iter_mut().flatten().for_each(|i| i.walk_mut(f));
            }
            OperandKind::Ternary { condition, then, elze } => {
                condition.walk_mut(f);
                then.walk_mut(f);
                elze.walk_mut(f);
            }
            OperandKind::Lambda { captures, .. } => captures.iter_mut().for_each(|c| c.walk_mut(f)),
            OperandKind::Return(Some(value)) => value.walk_mut(f),
            OperandKind::Assert { condition, message } => {
                condition.walk_mut(f);
                if let Some(message) = message {
                    message.walk_mut(f);
                }
            }
            _ => {}
        }
    }

    /// Whether `variable` occurs anywhere in this operand
    pub fn references(&self, variable: VariableId) -> bool {
        let mut found = false;
        self.walk(&mut |operand| {
            if let OperandKind::LocalVariable { variable: v, .. } | OperandKind::Declaration { variable: v } =
                operand.kind
            {
                found |= v == variable;
            }
        });
        found
    }
}

impl fmt::Display for Operand {
    /// Compact single-line form used in diagnostics and node dumps
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enclosed {
            f.write_str("(")?;
        }
        match &self.kind {
            OperandKind::Number(number) => write!(f, "{}", number)?,
            OperandKind::Char(value) => write!(f, "{:?}", value)?,
            OperandKind::String(value) => write!(f, "{:?}", value)?,
            OperandKind::Boolean(value) => write!(f, "{}", value)?,
            OperandKind::Null => f.write_str("null")?,
            OperandKind::This => f.write_str("this")?,
            OperandKind::Class(ty) => write!(f, "{}.class", ty.simple_name())?,
            OperandKind::Binary { left, operator, right } => write!(f, "{} {} {}", left, operator, right)?,
            OperandKind::Unary { operator, value } if operator.is_postfix() => {
                write!(f, "{}{}", value, operator.symbol())?
            }
            OperandKind::Unary { operator, value } => write!(f, "{}{}", operator.symbol(), value)?,
            OperandKind::Assign { target, operator, value } => {
                write!(f, "{} {} {}", target, operator.symbol(), value)?
            }
            OperandKind::Condition(condition) => {
                if condition.group {
                    write!(f, "({} {} {})", condition.left, condition.operator.symbol(), condition.right)?
                } else {
                    write!(f, "{} {} {}", condition.left, condition.operator.symbol(), condition.right)?
                }
            }
            OperandKind::MethodCall {
                owner,
                name,
                receiver,
                arguments,
                ..
            } => {
                match receiver {
                    Some(receiver) => write!(f, "{}.", receiver)?,
                    None => write!(f, "{}.", JvmType::Reference(owner.clone()).simple_name())?,
                }
                write!(f, "{}(", name)?;
                write_list(f, arguments)?;
                f.write_str(")")?
            }
            OperandKind::ConstructorCall {
                owner, kind, arguments, ..
            } => {
                match kind {
                    ConstructorKind::New => write!(f, "new {}(", JvmType::Reference(owner.clone()).simple_name())?,
                    ConstructorKind::Super => f.write_str("super(")?,
                    ConstructorKind::This => f.write_str("this(")?,
                }
                write_list(f, arguments)?;
                f.write_str(")")?
            }
            OperandKind::Uninitialized { owner } => {
                write!(f, "new {}", JvmType::Reference(owner.clone()).simple_name())?
            }
            OperandKind::FieldAccess { owner, name, receiver } => match receiver {
                Some(receiver) => write!(f, "{}.{}", receiver, name)?,
                None => write!(f, "{}.{}", JvmType::Reference(owner.clone()).simple_name(), name)?,
            },
            OperandKind::ArrayAccess { array, index } => write!(f, "{}[{}]", array, index)?,
            OperandKind::ArrayLength(array) => write!(f, "{}.length", array)?,
            OperandKind::NewArray {
                element,
                dimensions,
                initializers,
            } => {
                write!(f, "new {}", element.simple_name())?;
                for dimension in dimensions {
                    write!(f, "[{}]", dimension)?;
                }
                if let Some(values) = initializers {
                    f.write_str(" {")?;
                    write_list(f, values)?;
                    f.write_str("}")?;
                }
            }
            OperandKind::Cast { ty, value } => write!(f, "({}) {}", ty.simple_name(), value)?,
            OperandKind::InstanceOf { value, ty } => write!(f, "{} instanceof {}", value, ty.simple_name())?,
            OperandKind::Ternary { condition, then, elze } => write!(f, "{} ? {} : {}", condition, then, elze)?,
            OperandKind::AmbiguousZeroOne(condition) => write!(f, "{} ? 1 : 0", condition)?,
            OperandKind::Switch { head } => write!(f, "switch@{}", head)?,
            OperandKind::Lambda { name, captures, .. } => {
                write!(f, "lambda {}[", name)?;
                write_list(f, captures)?;
                f.write_str("]")?
            }
            OperandKind::MethodReference { owner, name, receiver } => match receiver {
                Some(receiver) => write!(f, "{}::{}", receiver, name)?,
                None => write!(f, "{}::{}", JvmType::Reference(owner.clone()).simple_name(), name)?,
            },
            OperandKind::LocalVariable { variable, declare } => {
                if *declare {
                    f.write_str("var ")?;
                }
                write!(f, "v{}", variable.0)?
            }
            OperandKind::Declaration { variable } => write!(f, "var v{}", variable.0)?,
            OperandKind::Return(Some(value)) => write!(f, "return {}", value)?,
            OperandKind::Return(None) => f.write_str("return")?,
            OperandKind::Throw(value) => write!(f, "throw {}", value)?,
            OperandKind::Yield(value) => write!(f, "yield {}", value)?,
            OperandKind::Assert { condition, message } => match message {
                Some(message) => write!(f, "assert {} : {}", condition, message)?,
                None => write!(f, "assert {}", condition)?,
            },
        }
        if self.enclosed {
            f.write_str(")")?;
        }
        Ok(())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, operands: &[Operand]) -> fmt::Result {
    for (index, operand) in operands.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", operand)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalence_follows_structure() {
        let a = Operand::local(VariableId(1), InferredType::unknown());
        let b = Operand::local(VariableId(1), InferredType::unknown());
        let c = Operand::local(VariableId(2), InferredType::unknown());
        assert!(a.equivalent(&b));
        assert!(!a.equivalent(&c));

        let field = |receiver: Operand| {
            Operand::typed(
                OperandKind::FieldAccess {
                    owner: "A".into(),
                    name: "count".into(),
                    receiver: Some(receiver.boxed()),
                },
                JvmType::Int,
            )
        };
        assert!(field(a.clone()).equivalent(&field(b)));
        assert!(!field(a).equivalent(&field(c)));
    }

    #[test]
    fn inverting_a_plain_value_wraps_it_in_not() {
        let value = Operand::local(VariableId(0), InferredType::fixed(JvmType::Boolean)).inverted();
        assert!(matches!(
            value.kind,
            OperandKind::Unary {
                operator: UnaryOperator::Not,
                ..
            }
        ));
        assert!(matches!(Operand::boolean(true).inverted().kind, OperandKind::Boolean(false)));
    }

    #[test]
    fn references_search_nested_operands() {
        let sum = Operand::new(
            OperandKind::Binary {
                left: Operand::local(VariableId(3), InferredType::unknown()).boxed(),
                operator: BinaryOperator::Add,
                right: Operand::int(1).boxed(),
            },
            InferredType::unknown(),
        );
        assert!(sum.references(VariableId(3)));
        assert!(!sum.references(VariableId(4)));
        assert_eq!(sum.to_string(), "v3 + 1");
    }
}
