//! Branch conditions
//!
//! An [`OperandCondition`] is the operand a conditional jump leaves on its
//! node's stack. Besides the comparison it remembers which node is reached
//! when it holds (`then`) and when it does not (`elze`), which is what the
//! sequential merge needs to fold chains of jumps into `&&` / `||`.

use super::operators::ConditionOperator;
use super::Operand;
use crate::cfg::NodeId;

#[derive(Debug, Clone)]
pub struct OperandCondition {
    pub left: Operand,
    pub operator: ConditionOperator,
    pub right: Operand,
    /// Node reached when the condition holds
    pub then: Option<NodeId>,
    /// Node reached otherwise
    pub elze: Option<NodeId>,
    /// Rendered with parentheses when nested
    pub group: bool,
}

impl OperandCondition {
    /// A comparison jumping to `then`; operand types are bound to each other
    pub fn compare(left: Operand, operator: ConditionOperator, right: Operand, then: NodeId) -> Self {
        left.ty.bind_mutually(&right.ty);
        Self {
            left,
            operator,
            right,
            then: Some(then),
            elze: None,
            group: false,
        }
    }

    pub fn is_compound(&self) -> bool {
        self.operator.is_logical()
    }

    /// Logical negation. Compound conditions negate both sides (De Morgan);
    /// `then`/`elze` swap so they keep naming the true/false targets.
    pub fn invert(&mut self) {
        if self.is_compound() {
            self.left.invert_in_place();
            self.right.invert_in_place();
        }
        self.operator = self.operator.negate();
        std::mem::swap(&mut self.then, &mut self.elze);
    }

    pub fn inverted(mut self) -> Self {
        self.invert();
        self
    }

    /// Whether `left` (evaluated first) and `right` form one short-circuit condition
    pub fn can_merge(left: &OperandCondition, right: &OperandCondition) -> bool {
        left.then.is_some() && (left.then == right.then || left.then == right.elze)
    }

    /// Fold two sequential conditions. When both jump to the same target the
    /// result is `left || right`; when `left` jumps to the false target of
    /// `right` the result is `!left && right`.
    pub fn merge(mut left: OperandCondition, right: OperandCondition) -> OperandCondition {
        let then = right.then;
        let elze = right.elze;
        let operator = if left.then == right.then {
            ConditionOperator::OR
        } else {
            left.invert();
            ConditionOperator::AND
        };
        left.group = left.is_compound();
        let mut right = right;
        right.group = right.is_compound();
        OperandCondition {
            left: Operand::condition(left),
            operator,
            right: Operand::condition(right),
            then,
            elze,
            group: true,
        }
    }

    /// Drop the outer parentheses, for conditions that become a statement's own condition
    pub fn disclose(&mut self) {
        self.group = false;
    }

    /// Apply `f` to this condition and every nested condition
    pub fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut OperandCondition)) {
        f(self);
        if let Some(left) = self.left.as_condition_mut() {
            left.for_each_mut(f);
        }
        if let Some(right) = self.right.as_condition_mut() {
            right.for_each_mut(f);
        }
    }

    /// Replace every `then`/`elze` reference to `from` with `to`
    pub fn retarget(&mut self, from: NodeId, to: Option<NodeId>) {
        self.for_each_mut(&mut |condition| {
            if condition.then == Some(from) {
                condition.then = to;
            }
            if condition.elze == Some(from) {
                condition.elze = to;
            }
        });
    }

    /// Whether any nested condition still targets `node`
    pub fn targets(&self, node: NodeId) -> bool {
        if self.then == Some(node) || self.elze == Some(node) {
            return true;
        }
        let nested = |operand: &Operand| operand.as_condition().is_some_and(|c| c.targets(node));
        nested(&self.left) || nested(&self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::OperandKind;

    fn cmp(op: ConditionOperator, then: usize) -> OperandCondition {
        OperandCondition::compare(Operand::int(1), op, Operand::int(2), NodeId(then))
    }

    #[test]
    fn invert_swaps_targets() {
        let mut condition = cmp(ConditionOperator::LT, 4);
        condition.elze = Some(NodeId(5));
        condition.invert();
        assert_eq!(condition.operator, ConditionOperator::GE);
        assert_eq!(condition.then, Some(NodeId(5)));
        assert_eq!(condition.elze, Some(NodeId(4)));
    }

    #[test]
    fn same_target_merges_to_or() {
        let left = cmp(ConditionOperator::EQ, 7);
        let mut right = cmp(ConditionOperator::GT, 7);
        right.elze = Some(NodeId(8));
        assert!(OperandCondition::can_merge(&left, &right));
        let merged = OperandCondition::merge(left, right);
        assert_eq!(merged.operator, ConditionOperator::OR);
        assert_eq!(merged.then, Some(NodeId(7)));
        assert_eq!(merged.elze, Some(NodeId(8)));
    }

    #[test]
    fn false_target_merges_to_and_with_inverted_left() {
        let left = cmp(ConditionOperator::EQ, 8);
        let mut right = cmp(ConditionOperator::GT, 7);
        right.elze = Some(NodeId(8));
        let merged = OperandCondition::merge(left, right);
        assert_eq!(merged.operator, ConditionOperator::AND);
        match &merged.left.kind {
            OperandKind::Condition(left) => assert_eq!(left.operator, ConditionOperator::NE),
            other => panic!("unexpected {:?}", other),
        }
        let mut inverted = merged.inverted();
        assert_eq!(inverted.operator, ConditionOperator::OR);
        inverted.retarget(NodeId(8), Some(NodeId(9)));
        assert!(!inverted.targets(NodeId(8)));
    }
}
