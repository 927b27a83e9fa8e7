//! Instruction feed events
//!
//! A compiled unit arrives as an ordered stream of events: labels marking
//! branch targets, instructions with their operands, protected regions and
//! debug information. The stream is consumed in a single forward pass.

use super::opcodes::Opcode;
use serde::{Deserialize, Serialize};

/// Branch target identifier, unique within a unit
pub type LabelId = u32;

/// Constant pool value pushed by `ldc`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal, by internal name or array descriptor
    Type(String),
}

/// Stack-map frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    New,
    Full,
    Append,
    Chop,
    Same,
    Same1,
}

impl FrameKind {
    pub fn opcode(self) -> Opcode {
        match self {
            FrameKind::New => Opcode::FRAME_NEW,
            FrameKind::Full => Opcode::FRAME_FULL,
            FrameKind::Append => Opcode::FRAME_APPEND,
            FrameKind::Chop => Opcode::FRAME_CHOP,
            FrameKind::Same => Opcode::FRAME_SAME,
            FrameKind::Same1 => Opcode::FRAME_SAME1,
        }
    }
}

/// A method handle argument of `invokedynamic`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handle {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// One event of the instruction feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Label {
        id: LabelId,
    },
    /// Zero-operand instruction
    Insn {
        op: Opcode,
    },
    /// `bipush`, `sipush`, `newarray`
    Int {
        op: Opcode,
        operand: i32,
    },
    Ldc {
        constant: Constant,
    },
    Var {
        op: Opcode,
        slot: u16,
    },
    Iinc {
        slot: u16,
        increment: i32,
    },
    Field {
        op: Opcode,
        owner: String,
        name: String,
        descriptor: String,
    },
    Method {
        op: Opcode,
        owner: String,
        name: String,
        descriptor: String,
    },
    InvokeDynamic {
        name: String,
        descriptor: String,
        bootstrap: Handle,
        /// Implementation handle for lambda factories
        #[serde(default)]
        implementation: Option<Handle>,
        /// Recipe string for string concatenation factories
        #[serde(default)]
        recipe: Option<String>,
    },
    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Type {
        op: Opcode,
        descriptor: String,
    },
    MultiNewArray {
        descriptor: String,
        dimensions: u8,
    },
    Jump {
        op: Opcode,
        target: LabelId,
    },
    /// Table and lookup switches, normalized to parallel key/target lists
    Switch {
        default: LabelId,
        keys: Vec<i32>,
        targets: Vec<LabelId>,
    },
    TryCatch {
        start: LabelId,
        end: LabelId,
        handler: LabelId,
        /// `None` for catch-any (finally) entries
        #[serde(default)]
        exception: Option<String>,
    },
    LineNumber {
        line: u32,
        label: LabelId,
    },
    LocalVariable {
        slot: u16,
        name: String,
        descriptor: String,
    },
    Frame {
        kind: FrameKind,
        #[serde(default)]
        locals: u16,
        #[serde(default)]
        stack: u16,
    },
}

/// A method body together with its identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// Declaring class, internal name
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub is_static: bool,
    pub events: Vec<Event>,
}

impl CompiledUnit {
    /// `owner.name(descriptor)` used in diagnostics
    pub fn signature(&self) -> String {
        format!("{}.{}{}", self.owner, self.name, self.descriptor)
    }

    /// Number of instruction events, ignoring labels and metadata
    pub fn instruction_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| {
                !matches!(
                    event,
                    Event::Label { .. }
                        | Event::TryCatch { .. }
                        | Event::LineNumber { .. }
                        | Event::LocalVariable { .. }
                        | Event::Frame { .. }
                )
            })
            .count()
    }
}

/// Parse a JSON feed holding either one unit or an array of units
pub fn parse_units(json: &str) -> crate::error::Result<Vec<CompiledUnit>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_use_tagged_json() {
        let json = r#"[
            {"event": "label", "id": 0},
            {"event": "var", "op": "ILOAD", "slot": 1},
            {"event": "jump", "op": "IFEQ", "target": 2},
            {"event": "try_catch", "start": 0, "end": 1, "handler": 2}
        ]"#;
        let events: Vec<Event> = serde_json::from_str(json).unwrap();
        assert_eq!(events[1], Event::Var { op: Opcode::ILOAD, slot: 1 });
        assert_eq!(
            events[3],
            Event::TryCatch { start: 0, end: 1, handler: 2, exception: None }
        );
    }

    #[test]
    fn single_unit_or_array() {
        let one = r#"{"owner": "A", "name": "m", "descriptor": "()V", "events": []}"#;
        assert_eq!(parse_units(one).unwrap().len(), 1);
        let many = format!("[{one},{one}]");
        assert_eq!(parse_units(&many).unwrap().len(), 2);
        assert_eq!(parse_units(one).unwrap()[0].signature(), "A.m()V");
    }
}
