//! Main decompiler module
//!
//! This module orchestrates the decompilation of compiled units: symbolic
//! execution into a node graph, structure recognition and rendering through
//! a [`CodeSink`]. Independent units can be processed on the rayon pool.

use crate::analysis::{MethodBody, MethodDecompiler};
use crate::bytecode::CompiledUnit;
use crate::config::DecompileOptions;
use crate::error::Result;
use crate::structure::{Code, CodeSink, PseudoCodeWriter, Scope, StructureRecognizer, StructureTree};
use crate::symbols::{DescriptorResolver, SymbolResolver};
use crate::trace::{LogTracer, NoopTracer, Tracer};
use rayon::prelude::*;
use std::sync::Arc;

/// A unit after structuring
pub struct DecompiledMethod {
    pub body: MethodBody,
    pub tree: StructureTree,
}

impl DecompiledMethod {
    /// Feed the structured unit to `sink`
    pub fn write(&self, sink: &mut dyn CodeSink) {
        Scope::new(&self.body.graph, &self.tree, &self.body.variables)
            .root()
            .write(sink);
    }

    /// Java-like listing including the method declaration
    pub fn pseudo_code(&self) -> String {
        PseudoCodeWriter::render(&self.body, &self.tree)
    }
}

/// Outcome of one unit of a batch
#[derive(Debug)]
pub struct UnitOutcome {
    pub signature: String,
    pub result: Result<String>,
}

/// Main decompiler struct
#[derive(Clone)]
pub struct Decompiler {
    resolver: Arc<dyn SymbolResolver>,
    tracer: Arc<dyn Tracer>,
    options: DecompileOptions,
}

impl Default for Decompiler {
    fn default() -> Self {
        Self::new(DecompileOptions::default())
    }
}

impl Decompiler {
    /// Decompiler resolving members from their descriptors alone
    pub fn new(options: DecompileOptions) -> Self {
        let tracer: Arc<dyn Tracer> = if options.trace {
            Arc::new(LogTracer)
        } else {
            Arc::new(NoopTracer)
        };
        Self {
            resolver: Arc::new(DescriptorResolver),
            tracer,
            options,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SymbolResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    /// Node graph of `unit` before structuring
    pub fn build_graph(&self, unit: &CompiledUnit) -> Result<MethodBody> {
        MethodDecompiler::decompile(unit, self.resolver.as_ref(), self.tracer.as_ref(), &self.options)
    }

    /// Decompile and structure a single unit
    pub fn decompile_unit(&self, unit: &CompiledUnit) -> Result<DecompiledMethod> {
        let mut body = self.build_graph(unit)?;
        let tree = StructureRecognizer::structure(
            &mut body,
            self.resolver.as_ref(),
            self.tracer.as_ref(),
            &self.options,
        )?;
        self.tracer.pass(&body.signature, &format!("{} structures", tree.len()));
        Ok(DecompiledMethod { body, tree })
    }

    /// Pseudo code of a single unit
    pub fn render(&self, unit: &CompiledUnit) -> Result<String> {
        Ok(self.decompile_unit(unit)?.pseudo_code())
    }

    /// Render every unit. A failing unit does not stop the others.
    pub fn decompile_all(&self, units: &[CompiledUnit]) -> Vec<UnitOutcome> {
        self.decompile_all_with(units, &|_: &UnitOutcome| {})
    }

    /// [`Decompiler::decompile_all`], calling `done` as each unit finishes.
    ///
    /// Units are rendered inside the worker that decompiled them, so the
    /// per-unit graphs never leave their thread.
    pub fn decompile_all_with(
        &self,
        units: &[CompiledUnit],
        done: &(dyn Fn(&UnitOutcome) + Sync),
    ) -> Vec<UnitOutcome> {
        let outcome = |unit: &CompiledUnit| {
            let result = self.render(unit);
            if let Err(error) = &result {
                log::warn!("{}: {}", unit.signature(), error);
            }
            let outcome = UnitOutcome {
                signature: unit.signature(),
                result,
            };
            done(&outcome);
            outcome
        };
        if self.options.parallel {
            units.par_iter().map(outcome).collect()
        } else {
            units.iter().map(outcome).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Assembler, Opcode};

    fn add_one() -> CompiledUnit {
        let mut assembler = Assembler::new_static("demo/Calc", "inc", "(I)I");
        assembler
            .var(Opcode::ILOAD, 0)
            .insn(Opcode::ICONST_1)
            .insn(Opcode::IADD)
            .insn(Opcode::IRETURN);
        assembler.build()
    }

    #[test]
    fn renders_a_declaration_around_the_body() {
        let text = Decompiler::default().render(&add_one()).unwrap();
        assert!(text.starts_with("static int inc(int arg0) {\n"), "{}", text);
        assert!(text.contains("    return arg0 + 1;\n"), "{}", text);
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn batch_keeps_unit_order() {
        let units = vec![add_one(), add_one()];
        let outcomes = Decompiler::default().decompile_all(&units);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| outcome.result.is_ok()));
        assert_eq!(outcomes[0].signature, "demo/Calc.inc(I)I");
    }
}
