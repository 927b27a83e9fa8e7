//! Configuration module
//!
//! Options controlling which idioms are fused while a unit is decompiled.
//! Options can be built from CLI flags or loaded from a JSON file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options for a decompilation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompileOptions {
    /// Fuse `cond ? a : b` value joins into ternary operands
    pub fuse_ternary: bool,
    /// Fold read-modify-write sequences into increments and compound assignments
    pub fuse_increments: bool,
    /// Rebuild enhanced-for loops from iterator and array protocols
    pub fuse_enhanced_for: bool,
    /// Turn switches whose cases converge on a single value into switch expressions
    pub fuse_switch_expressions: bool,
    /// Remove finally blocks duplicated onto every exit of a protected region
    pub remove_finally_duplicates: bool,
    /// Place local variable declarations at the lowest common dominator of their uses
    pub place_declarations: bool,
    /// Emit per-node trace output through the `log` facade
    pub trace: bool,
    /// Decompile independent units on the rayon thread pool
    pub parallel: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            fuse_ternary: true,
            fuse_increments: true,
            fuse_enhanced_for: true,
            fuse_switch_expressions: true,
            remove_finally_duplicates: true,
            place_declarations: true,
            trace: false,
            parallel: true,
        }
    }
}

impl DecompileOptions {
    /// Build options from CLI flags. Every flag disables one fusion.
    pub fn from_cli(
        no_ternary: bool,
        no_increments: bool,
        no_enhanced_for: bool,
        no_switch_expressions: bool,
        keep_finally_duplicates: bool,
        trace: bool,
        sequential: bool,
    ) -> Self {
        Self {
            fuse_ternary: !no_ternary,
            fuse_increments: !no_increments,
            fuse_enhanced_for: !no_enhanced_for,
            fuse_switch_expressions: !no_switch_expressions,
            remove_finally_duplicates: !keep_finally_duplicates,
            place_declarations: true,
            trace,
            parallel: !sequential,
        }
    }

    /// Load options from a JSON file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Options with every fusion disabled, useful to inspect the raw structure
    pub fn literal() -> Self {
        Self {
            fuse_ternary: false,
            fuse_increments: false,
            fuse_enhanced_for: false,
            fuse_switch_expressions: false,
            remove_finally_duplicates: false,
            place_declarations: false,
            trace: false,
            parallel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let options: DecompileOptions = serde_json::from_str(r#"{"fuse_ternary": false}"#).unwrap();
        assert!(!options.fuse_ternary);
        assert!(options.fuse_increments);
        assert!(options.parallel);
    }

    #[test]
    fn cli_flags_disable_fusions() {
        let options = DecompileOptions::from_cli(true, false, true, false, true, false, true);
        assert!(!options.fuse_ternary);
        assert!(options.fuse_increments);
        assert!(!options.fuse_enhanced_for);
        assert!(!options.remove_finally_duplicates);
        assert!(!options.parallel);
    }
}
