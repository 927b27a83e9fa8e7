//! Programmatic event stream construction
//!
//! Builds [`CompiledUnit`] values instruction by instruction. Used by the test
//! suite, the benchmarks and by callers that produce events without a JSON
//! round trip.

use super::event::{CompiledUnit, Constant, Event, FrameKind, Handle, LabelId};
use super::opcodes::Opcode;

/// Fluent builder for a unit's event stream
#[derive(Debug, Clone)]
pub struct Assembler {
    unit: CompiledUnit,
}

impl Assembler {
    /// Start an instance method body
    pub fn new(owner: &str, name: &str, descriptor: &str) -> Self {
        Self {
            unit: CompiledUnit {
                owner: owner.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                is_static: false,
                events: Vec::new(),
            },
        }
    }

    /// Start a static method body
    pub fn new_static(owner: &str, name: &str, descriptor: &str) -> Self {
        let mut assembler = Self::new(owner, name, descriptor);
        assembler.unit.is_static = true;
        assembler
    }

    pub fn event(&mut self, event: Event) -> &mut Self {
        self.unit.events.push(event);
        self
    }

    pub fn label(&mut self, id: LabelId) -> &mut Self {
        self.event(Event::Label { id })
    }

    pub fn insn(&mut self, op: Opcode) -> &mut Self {
        self.event(Event::Insn { op })
    }

    pub fn int(&mut self, op: Opcode, operand: i32) -> &mut Self {
        self.event(Event::Int { op, operand })
    }

    /// Push an int constant with the shortest encoding
    pub fn push_int(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.insn(Opcode(Opcode::ICONST_0.0.wrapping_add_signed(value as i16))),
            -128..=127 => self.int(Opcode::BIPUSH, value),
            -32768..=32767 => self.int(Opcode::SIPUSH, value),
            _ => self.ldc(Constant::Int(value)),
        }
    }

    pub fn ldc(&mut self, constant: Constant) -> &mut Self {
        self.event(Event::Ldc { constant })
    }

    pub fn var(&mut self, op: Opcode, slot: u16) -> &mut Self {
        self.event(Event::Var { op, slot })
    }

    pub fn iinc(&mut self, slot: u16, increment: i32) -> &mut Self {
        self.event(Event::Iinc { slot, increment })
    }

    pub fn field(&mut self, op: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.event(Event::Field {
            op,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    pub fn method(&mut self, op: Opcode, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.event(Event::Method {
            op,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// `invokedynamic` through `LambdaMetafactory`
    pub fn lambda(&mut self, name: &str, descriptor: &str, implementation: Handle) -> &mut Self {
        self.event(Event::InvokeDynamic {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            bootstrap: Handle {
                owner: "java/lang/invoke/LambdaMetafactory".into(),
                name: "metafactory".into(),
                descriptor: String::new(),
            },
            implementation: Some(implementation),
            recipe: None,
        })
    }

    /// `invokedynamic` through `StringConcatFactory.makeConcatWithConstants`
    pub fn concat(&mut self, descriptor: &str, recipe: &str) -> &mut Self {
        self.event(Event::InvokeDynamic {
            name: "makeConcatWithConstants".into(),
            descriptor: descriptor.to_string(),
            bootstrap: Handle {
                owner: "java/lang/invoke/StringConcatFactory".into(),
                name: "makeConcatWithConstants".into(),
                descriptor: String::new(),
            },
            implementation: None,
            recipe: Some(recipe.to_string()),
        })
    }

    pub fn type_insn(&mut self, op: Opcode, descriptor: &str) -> &mut Self {
        self.event(Event::Type {
            op,
            descriptor: descriptor.to_string(),
        })
    }

    pub fn jump(&mut self, op: Opcode, target: LabelId) -> &mut Self {
        self.event(Event::Jump { op, target })
    }

    pub fn switch(&mut self, default: LabelId, keys: &[i32], targets: &[LabelId]) -> &mut Self {
        self.event(Event::Switch {
            default,
            keys: keys.to_vec(),
            targets: targets.to_vec(),
        })
    }

    pub fn try_catch(
        &mut self,
        start: LabelId,
        end: LabelId,
        handler: LabelId,
        exception: Option<&str>,
    ) -> &mut Self {
        self.event(Event::TryCatch {
            start,
            end,
            handler,
            exception: exception.map(str::to_string),
        })
    }

    pub fn line(&mut self, line: u32, label: LabelId) -> &mut Self {
        self.event(Event::LineNumber { line, label })
    }

    pub fn local(&mut self, slot: u16, name: &str, descriptor: &str) -> &mut Self {
        self.event(Event::LocalVariable {
            slot,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    pub fn frame(&mut self, kind: FrameKind) -> &mut Self {
        self.event(Event::Frame {
            kind,
            locals: 0,
            stack: u16::from(kind == FrameKind::Same1),
        })
    }

    pub fn build(&self) -> CompiledUnit {
        self.unit.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_int_picks_shortest_form() {
        let mut asm = Assembler::new_static("A", "m", "()V");
        asm.push_int(-1).push_int(3).push_int(100).push_int(1000).push_int(100_000);
        let unit = asm.build();
        assert!(unit.is_static);
        assert_eq!(unit.events[0], Event::Insn { op: Opcode::ICONST_M1 });
        assert_eq!(unit.events[1], Event::Insn { op: Opcode::ICONST_3 });
        assert_eq!(unit.events[2], Event::Int { op: Opcode::BIPUSH, operand: 100 });
        assert_eq!(unit.events[3], Event::Int { op: Opcode::SIPUSH, operand: 1000 });
        assert_eq!(unit.events[4], Event::Ldc { constant: Constant::Int(100_000) });
    }
}
