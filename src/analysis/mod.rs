//! Symbolic execution of compiled units
//!
//! This module turns the instruction feed of one unit into a node graph
//! whose nodes carry expression operands:
//! - `executor`: the operand-stack machine driven by feed events
//! - `idioms`: rewrites for compiler-generated instruction shapes
//! - `pattern`: instruction history and idiom templates
//! - `variables`: local slots, variable identity and declaration placement

pub mod executor;
mod idioms;
pub mod pattern;
pub mod variables;

pub use executor::{MethodBody, MethodDecompiler};
pub use pattern::{Category, InstructionHistory, Pattern};
pub use variables::{LocalVariable, LocalVariables, SlotKind};
