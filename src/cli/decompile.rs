use super::utils::{read_units, select_units, write_output};
use crate::config::DecompileOptions;
use crate::decompiler::{Decompiler, UnitOutcome};
use crate::error::{Error as DecompilerError, Result as DecompilerResult};
use std::path::PathBuf;

/// Arguments for the decompile command
#[derive(Debug, Clone, Default)]
pub struct DecompileArgs {
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    /// Regular expression matched against unit signatures
    pub filter: Option<String>,
    /// JSON options file; takes precedence over the flags below
    pub options_path: Option<PathBuf>,
    pub no_ternary: bool,
    pub no_increments: bool,
    pub no_enhanced_for: bool,
    pub no_switch_expressions: bool,
    pub keep_finally_duplicates: bool,
    pub trace: bool,
    pub sequential: bool,
    pub progress: bool,
}

impl DecompileArgs {
    /// Convert to DecompileOptions
    pub fn to_options(&self) -> DecompilerResult<DecompileOptions> {
        match &self.options_path {
            Some(path) => DecompileOptions::load(path),
            None => Ok(DecompileOptions::from_cli(
                self.no_ternary,
                self.no_increments,
                self.no_enhanced_for,
                self.no_switch_expressions,
                self.keep_finally_duplicates,
                self.trace,
                self.sequential,
            )),
        }
    }
}

/// Run the decompile subcommand
pub fn decompile(args: &DecompileArgs) -> DecompilerResult<()> {
    let units = select_units(read_units(&args.input_path)?, args.filter.as_deref())?;
    if units.is_empty() {
        return Err(DecompilerError::Parse {
            message: format!("no units selected from {}", args.input_path.display()),
        });
    }
    let decompiler = Decompiler::new(args.to_options()?);

    let progress_bar = if args.progress {
        indicatif::ProgressBar::new(units.len() as u64)
    } else {
        indicatif::ProgressBar::hidden()
    };
    if let Ok(style) =
        indicatif::ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} units")
    {
        progress_bar.set_style(style.progress_chars("##-"));
    }
    let outcomes = decompiler.decompile_all_with(&units, &|_: &UnitOutcome| progress_bar.inc(1));
    progress_bar.finish_and_clear();

    let mut output = String::new();
    let mut failures = 0;
    for outcome in &outcomes {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&format!("// {}\n", outcome.signature));
        match &outcome.result {
            Ok(code) => output.push_str(code),
            Err(error) => {
                failures += 1;
                output.push_str(&format!("// decompilation failed: {}\n", error));
            }
        }
    }
    write_output(&output, args.output_path.as_deref())?;

    if failures > 0 {
        log::warn!("{} of {} units failed", failures, outcomes.len());
    }
    if failures == outcomes.len() {
        return Err(DecompilerError::Internal {
            message: format!("all {} units failed to decompile", failures),
        });
    }
    Ok(())
}
