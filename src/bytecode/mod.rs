//! Bytecode module
//!
//! This module defines the instruction feed consumed by the decompiler:
//! opcodes, descriptors, the event model and a programmatic assembler.

pub mod assembler;
pub mod descriptor;
pub mod event;
pub mod opcodes;

pub use assembler::Assembler;
pub use descriptor::{JvmType, MethodDescriptor};
pub use event::{parse_units, CompiledUnit, Constant, Event, FrameKind, Handle, LabelId};
pub use opcodes::Opcode;
