//! jbc-dec-rs: structuring decompiler core for JVM bytecode
//!
//! This library consumes the instruction feed of compiled method bodies,
//! rebuilds expression trees by symbolic execution of the operand stack and
//! folds the resulting node graph into nested Java-like statements.

pub mod analysis;
pub mod bytecode;
pub mod cfg;
pub mod cli;
pub mod config;
pub mod decompiler;
pub mod error;
pub mod operand;
pub mod structure;
pub mod symbols;
pub mod trace;

pub use config::DecompileOptions;
pub use decompiler::{DecompiledMethod, Decompiler, UnitOutcome};
pub use error::{Error as DecompilerError, Result as DecompilerResult};

// Re-export commonly used types
pub use analysis::{MethodBody, MethodDecompiler};
pub use bytecode::{parse_units, Assembler, CompiledUnit, Opcode};
pub use cfg::{Node, NodeGraph, NodeId};
pub use operand::{Operand, OperandKind};
pub use structure::{CodeSink, PseudoCodeWriter, Structure, StructureTree};
pub use symbols::{DescriptorResolver, SymbolResolver, SymbolTable};
pub use trace::{LogTracer, NoopTracer, Tracer};
