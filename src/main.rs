use clap::{Parser, Subcommand};
use miette::{miette, Result};
use std::path::PathBuf;

use jbc_dec_rs::cli;

#[derive(Parser)]
#[command(name = "jbc-dec-rs")]
#[command(about = "Structuring decompiler for JVM bytecode event feeds")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompile the units of a JSON event feed to Java-like pseudo code
    Decompile {
        /// Input event feed (JSON)
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only decompile units whose `owner.name(descriptor)` matches this regex
        #[arg(short, long)]
        filter: Option<String>,

        /// JSON file with decompiler options (overrides the flags below)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Keep branches that load a value instead of fusing them into `?:`
        #[arg(long)]
        no_ternary: bool,

        /// Render `x = x + 1` instead of `x++` and `x += n`
        #[arg(long)]
        no_increments: bool,

        /// Keep iterator and index loops as plain loops
        #[arg(long)]
        no_enhanced_for: bool,

        /// Keep switch expressions as switch statements over a temporary
        #[arg(long)]
        no_switch_expressions: bool,

        /// Keep inlined copies of `finally` blocks
        #[arg(long)]
        keep_finally_duplicates: bool,

        /// Log structuring passes at debug level
        #[arg(long)]
        trace: bool,

        /// Decompile units one after another on the calling thread
        #[arg(long)]
        sequential: bool,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Build and print the node graph of each unit
    Cfg {
        /// Input event feed (JSON)
        input: PathBuf,
        /// Only analyze units whose signature matches this regex
        #[arg(short, long)]
        filter: Option<String>,
        /// Directory receiving one DOT file per unit (optional)
        #[arg(short, long)]
        dot: Option<PathBuf>,
        /// Include operand stacks in DOT node labels
        #[arg(long)]
        details: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decompile {
            input,
            output,
            filter,
            options,
            no_ternary,
            no_increments,
            no_enhanced_for,
            no_switch_expressions,
            keep_finally_duplicates,
            trace,
            sequential,
            progress,
        } => {
            let args = cli::decompile::DecompileArgs {
                input_path: input,
                output_path: output,
                filter,
                options_path: options,
                no_ternary,
                no_increments,
                no_enhanced_for,
                no_switch_expressions,
                keep_finally_duplicates,
                trace,
                sequential,
                progress,
            };
            cli::decompile::decompile(&args).map_err(|e| miette!("{}", e))
        }
        Commands::Cfg {
            input,
            filter,
            dot,
            details,
        } => cli::cfg::cfg(&input, filter.as_deref(), dot.as_deref(), details).map_err(|e| miette!("{}", e)),
    }
}
