//! Command-line interface module
//!
//! This module contains the implementations for the CLI subcommands.

pub mod cfg;
pub mod decompile;

/// Common CLI utilities
pub mod utils {
    use crate::bytecode::{parse_units, CompiledUnit};
    use crate::error::{Error as DecompilerError, Result as DecompilerResult};
    use regex::Regex;
    use std::path::Path;

    /// Read a JSON event feed holding one unit or an array of units
    pub fn read_units(path: &Path) -> DecompilerResult<Vec<CompiledUnit>> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DecompilerError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        parse_units(&text)
    }

    /// Units whose `owner.name(descriptor)` signature matches `filter`
    pub fn select_units(units: Vec<CompiledUnit>, filter: Option<&str>) -> DecompilerResult<Vec<CompiledUnit>> {
        let Some(pattern) = filter else {
            return Ok(units);
        };
        let filter = Regex::new(pattern).map_err(|e| DecompilerError::Parse {
            message: format!("invalid unit filter '{}': {}", pattern, e),
        })?;
        Ok(units
            .into_iter()
            .filter(|unit| filter.is_match(&unit.signature()))
            .collect())
    }

    /// Write output to file or stdout
    pub fn write_output(content: &str, output_path: Option<&Path>) -> DecompilerResult<()> {
        match output_path {
            Some(path) => std::fs::write(path, content).map_err(DecompilerError::from),
            None => {
                print!("{}", content);
                Ok(())
            }
        }
    }
}
