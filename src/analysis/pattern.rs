//! Instruction history and idiom templates
//!
//! The executor records every opcode it handles (plus pseudo codes for
//! labels and frames) into a fixed ring buffer. Idiom rules then ask whether
//! the most recent codes match a template, where each template entry is an
//! exact opcode or a [`Category`] of opcodes.

use crate::bytecode::Opcode;

/// Fixed-capacity ring buffer keeping the last `N` pushed values
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    items: [Option<T>; N],
    /// Slot the next push writes to
    head: usize,
    len: usize,
}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            items: [None; N],
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, value: T) {
        self.items[self.head] = Some(value);
        self.head = (self.head + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value pushed `back` pushes ago; `0` is the latest
    pub fn recent(&self, back: usize) -> Option<T> {
        if back >= self.len {
            return None;
        }
        self.items[(self.head + N - 1 - back) % N]
    }

    /// Stored values, oldest first
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).rev().filter_map(move |back| self.recent(back))
    }
}

impl<T: Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Named opcode groups usable in templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Add,
    Sub,
    /// `xCONST_0`
    Zero,
    /// `xCONST_1`
    One,
    /// `dup`, `dup2`
    Duplicate,
    /// `dup_x1`, `dup2_x1`: the copy goes below the top entry
    DuplicateAway,
    Return,
    /// Any conditional jump or `goto`
    Jump,
    /// Any comparison jump
    Compare,
    LongCompare,
    FloatCompare,
    DoubleCompare,
    /// Any stack-map frame pseudo code
    Frame,
    Invoke,
    ArrayLoad,
    ArrayStore,
    Load,
    Store,
}

impl Category {
    pub fn contains(self, op: Opcode) -> bool {
        match self {
            Category::Add => matches!(op, Opcode::IADD | Opcode::LADD | Opcode::FADD | Opcode::DADD),
            Category::Sub => matches!(op, Opcode::ISUB | Opcode::LSUB | Opcode::FSUB | Opcode::DSUB),
            Category::Zero => matches!(op, Opcode::ICONST_0 | Opcode::LCONST_0 | Opcode::FCONST_0 | Opcode::DCONST_0),
            Category::One => matches!(op, Opcode::ICONST_1 | Opcode::LCONST_1 | Opcode::FCONST_1 | Opcode::DCONST_1),
            Category::Duplicate => matches!(op, Opcode::DUP | Opcode::DUP2),
            Category::DuplicateAway => matches!(op, Opcode::DUP_X1 | Opcode::DUP2_X1),
            Category::Return => op.is_return(),
            Category::Jump => op.is_jump(),
            Category::Compare => op.is_conditional_jump(),
            Category::LongCompare => op == Opcode::LCMP,
            Category::FloatCompare => matches!(op, Opcode::FCMPL | Opcode::FCMPG),
            Category::DoubleCompare => matches!(op, Opcode::DCMPL | Opcode::DCMPG),
            Category::Frame => op.is_frame(),
            Category::Invoke => op.is_invoke(),
            Category::ArrayLoad => op.is_array_load(),
            Category::ArrayStore => op.is_array_store(),
            Category::Load => op.is_load(),
            Category::Store => op.is_store(),
        }
    }
}

/// One template entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Op(Opcode),
    Category(Category),
}

impl Pattern {
    pub fn accepts(self, op: Opcode) -> bool {
        match self {
            Pattern::Op(expected) => expected == op,
            Pattern::Category(category) => category.contains(op),
        }
    }
}

impl From<Opcode> for Pattern {
    fn from(op: Opcode) -> Self {
        Pattern::Op(op)
    }
}

impl From<Category> for Pattern {
    fn from(category: Category) -> Self {
        Pattern::Category(category)
    }
}

/// Build a `[Pattern; N]` template from opcodes and categories, oldest first:
/// `idiom![Opcode::ILOAD, Category::Duplicate, Opcode::ISTORE]`
#[macro_export]
macro_rules! idiom {
    ($($entry:expr),+ $(,)?) => {
        [$($crate::analysis::pattern::Pattern::from($entry)),+]
    };
}

pub const HISTORY_SIZE: usize = 10;

/// Recently executed codes
#[derive(Debug, Clone, Default)]
pub struct InstructionHistory {
    codes: RingBuffer<Opcode, HISTORY_SIZE>,
}

impl InstructionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: Opcode) {
        self.codes.push(op);
    }

    pub fn latest(&self) -> Option<Opcode> {
        self.codes.recent(0)
    }

    /// Code recorded `back` records ago
    pub fn recent(&self, back: usize) -> Option<Opcode> {
        self.codes.recent(back)
    }

    /// Whether the last `template.len()` codes match `template`, oldest first
    pub fn matches(&self, template: &[Pattern]) -> bool {
        if template.is_empty() || template.len() > self.codes.len() {
            return false;
        }
        template
            .iter()
            .rev()
            .enumerate()
            .all(|(back, pattern)| self.codes.recent(back).is_some_and(|op| pattern.accepts(op)))
    }

    /// Whether the codes just before the latest one match `template`
    pub fn preceded_by(&self, template: &[Pattern]) -> bool {
        if template.len() + 1 > self.codes.len() {
            return false;
        }
        template
            .iter()
            .rev()
            .enumerate()
            .all(|(back, pattern)| self.codes.recent(back + 1).is_some_and(|op| pattern.accepts(op)))
    }
}

/// Local slots touched by recent loads and stores
#[derive(Debug, Clone, Default)]
pub struct SlotHistory {
    slots: RingBuffer<u16, HISTORY_SIZE>,
}

impl SlotHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, slot: u16) {
        self.slots.push(slot);
    }

    /// Slot accessed `back` accesses ago
    pub fn recent(&self, back: usize) -> Option<u16> {
        self.slots.recent(back)
    }

    /// The two latest accesses hit the same slot
    pub fn repeats(&self) -> bool {
        matches!((self.slots.recent(0), self.slots.recent(1)), (Some(a), Some(b)) if a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(codes: &[Opcode]) -> InstructionHistory {
        let mut history = InstructionHistory::new();
        for &code in codes {
            history.record(code);
        }
        history
    }

    #[test]
    fn ring_buffer_wraps() {
        let mut ring: RingBuffer<u32, 3> = RingBuffer::new();
        for value in 1..=5 {
            ring.push(value);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.recent(0), Some(5));
        assert_eq!(ring.recent(3), None);
    }

    #[test]
    fn templates_match_the_latest_codes() {
        let history = history(&[Opcode::NOP, Opcode::ILOAD, Opcode::IINC]);
        assert!(history.matches(&idiom![Opcode::ILOAD, Opcode::IINC]));
        assert!(history.matches(&idiom![Category::Load, Opcode::IINC]));
        assert!(!history.matches(&idiom![Opcode::IINC, Opcode::ILOAD]));
        assert!(history.preceded_by(&idiom![Opcode::ILOAD]));
    }

    #[test]
    fn categories_cover_field_increment_shapes() {
        let post = history(&[
            Opcode::DUP,
            Opcode::GETFIELD,
            Opcode::DUP_X1,
            Opcode::ICONST_1,
            Opcode::IADD,
            Opcode::PUTFIELD,
        ]);
        assert!(post.matches(&idiom![
            Category::Duplicate,
            Opcode::GETFIELD,
            Category::DuplicateAway,
            Category::One,
            Category::Add,
            Opcode::PUTFIELD
        ]));
        assert!(!post.matches(&idiom![
            Category::Duplicate,
            Opcode::GETFIELD,
            Category::One,
            Category::Add,
            Category::DuplicateAway,
            Opcode::PUTFIELD
        ]));
    }

    #[test]
    fn long_templates_outlive_short_history() {
        let history = history(&[Opcode::ICONST_0]);
        assert!(!history.matches(&idiom![Opcode::NOP, Opcode::ICONST_0]));
        let mut slots = SlotHistory::new();
        slots.record(2);
        slots.record(2);
        assert!(slots.repeats());
    }
}
