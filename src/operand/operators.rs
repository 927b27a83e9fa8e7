//! Operators used by operand expressions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators, including the comparison and short-circuit forms a
/// condition renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    BitAnd,
    BitOr,
    BitXor,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    ConditionalAnd,
    ConditionalOr,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Remainder => "%",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
            BinaryOperator::UnsignedShiftRight => ">>>",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::ConditionalAnd => "&&",
            BinaryOperator::ConditionalOr => "||",
        }
    }

    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Remainder => 12,
            BinaryOperator::Add | BinaryOperator::Subtract => 11,
            BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight | BinaryOperator::UnsignedShiftRight => 10,
            BinaryOperator::Less
            | BinaryOperator::LessEqual
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual => 9,
            BinaryOperator::Equal | BinaryOperator::NotEqual => 8,
            BinaryOperator::BitAnd => 7,
            BinaryOperator::BitXor => 6,
            BinaryOperator::BitOr => 5,
            BinaryOperator::ConditionalAnd => 4,
            BinaryOperator::ConditionalOr => 3,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::Less
                | BinaryOperator::LessEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEqual
        )
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    Negate,
    Not,
    BitNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::Not => "!",
            UnaryOperator::BitNot => "~",
            UnaryOperator::PreIncrement | UnaryOperator::PostIncrement => "++",
            UnaryOperator::PreDecrement | UnaryOperator::PostDecrement => "--",
        }
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOperator::PostIncrement | UnaryOperator::PostDecrement)
    }

    pub fn is_increment(self) -> bool {
        matches!(
            self,
            UnaryOperator::PreIncrement
                | UnaryOperator::PreDecrement
                | UnaryOperator::PostIncrement
                | UnaryOperator::PostDecrement
        )
    }

    /// Increment or decrement for a delta of +1 / -1
    pub fn step(delta: i64, postfix: bool) -> Option<UnaryOperator> {
        match (delta, postfix) {
            (1, true) => Some(UnaryOperator::PostIncrement),
            (1, false) => Some(UnaryOperator::PreIncrement),
            (-1, true) => Some(UnaryOperator::PostDecrement),
            (-1, false) => Some(UnaryOperator::PreDecrement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOperator {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    BitAnd,
    BitOr,
    BitXor,
}

impl AssignOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOperator::Assign => "=",
            AssignOperator::Add => "+=",
            AssignOperator::Subtract => "-=",
            AssignOperator::Multiply => "*=",
            AssignOperator::Divide => "/=",
            AssignOperator::Remainder => "%=",
            AssignOperator::ShiftLeft => "<<=",
            AssignOperator::ShiftRight => ">>=",
            AssignOperator::UnsignedShiftRight => ">>>=",
            AssignOperator::BitAnd => "&=",
            AssignOperator::BitOr => "|=",
            AssignOperator::BitXor => "^=",
        }
    }

    /// Compound form of an arithmetic or bitwise operator
    pub fn compound(op: BinaryOperator) -> Option<AssignOperator> {
        Some(match op {
            BinaryOperator::Add => AssignOperator::Add,
            BinaryOperator::Subtract => AssignOperator::Subtract,
            BinaryOperator::Multiply => AssignOperator::Multiply,
            BinaryOperator::Divide => AssignOperator::Divide,
            BinaryOperator::Remainder => AssignOperator::Remainder,
            BinaryOperator::ShiftLeft => AssignOperator::ShiftLeft,
            BinaryOperator::ShiftRight => AssignOperator::ShiftRight,
            BinaryOperator::UnsignedShiftRight => AssignOperator::UnsignedShiftRight,
            BinaryOperator::BitAnd => AssignOperator::BitAnd,
            BinaryOperator::BitOr => AssignOperator::BitOr,
            BinaryOperator::BitXor => AssignOperator::BitXor,
            _ => return None,
        })
    }
}

/// Condition operator. The encoding makes bitwise complement the logical
/// negation: `!EQ == NE`, `!GT == LE`, `!LT == GE`, `!AND == OR`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionOperator(i8);

impl ConditionOperator {
    pub const AND: ConditionOperator = ConditionOperator(0);
    pub const OR: ConditionOperator = ConditionOperator(!0);
    pub const EQ: ConditionOperator = ConditionOperator(1);
    pub const NE: ConditionOperator = ConditionOperator(!1);
    pub const GT: ConditionOperator = ConditionOperator(2);
    pub const LE: ConditionOperator = ConditionOperator(!2);
    pub const LT: ConditionOperator = ConditionOperator(3);
    pub const GE: ConditionOperator = ConditionOperator(!3);

    pub fn negate(self) -> ConditionOperator {
        ConditionOperator(!self.0)
    }

    /// `&&` or `||`
    pub fn is_logical(self) -> bool {
        self == Self::AND || self == Self::OR
    }

    pub fn to_binary(self) -> BinaryOperator {
        match self {
            Self::AND => BinaryOperator::ConditionalAnd,
            Self::OR => BinaryOperator::ConditionalOr,
            Self::EQ => BinaryOperator::Equal,
            Self::NE => BinaryOperator::NotEqual,
            Self::GT => BinaryOperator::Greater,
            Self::LE => BinaryOperator::LessEqual,
            Self::LT => BinaryOperator::Less,
            _ => BinaryOperator::GreaterEqual,
        }
    }

    pub fn symbol(self) -> &'static str {
        self.to_binary().symbol()
    }
}

impl fmt::Debug for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConditionOperator({})", self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_is_negation() {
        let pairs = [
            (ConditionOperator::AND, ConditionOperator::OR),
            (ConditionOperator::EQ, ConditionOperator::NE),
            (ConditionOperator::GT, ConditionOperator::LE),
            (ConditionOperator::LT, ConditionOperator::GE),
        ];
        for (op, negated) in pairs {
            assert_eq!(op.negate(), negated);
            assert_eq!(negated.negate(), op);
        }
        assert_eq!(ConditionOperator::GE.symbol(), ">=");
        assert_eq!(ConditionOperator::OR.symbol(), "||");
    }

    #[test]
    fn compound_assignment_only_for_arithmetic() {
        assert_eq!(AssignOperator::compound(BinaryOperator::Add), Some(AssignOperator::Add));
        assert_eq!(AssignOperator::compound(BinaryOperator::Less), None);
        assert_eq!(UnaryOperator::step(-1, true), Some(UnaryOperator::PostDecrement));
        assert_eq!(UnaryOperator::step(2, true), None);
    }
}
