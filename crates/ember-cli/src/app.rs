use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ember_compiler::OptLevel;

/// ember - class elimination and dataflow optimization for Ember IR
#[derive(Debug, Parser)]
#[command(name = "ember", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Args)]
pub struct GlobalOptions {
    /// Compiler configuration file (defaults to ./ember.toml when present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// When to color output: auto, always, never.
    #[arg(long, global = true, value_name = "WHEN")]
    pub color: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Eliminate classes only and print the flat program.
    Lower {
        /// Program in JSON interchange form.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Print JSON instead of the readable listing.
        #[arg(long)]
        json: bool,
    },

    /// Run the full pipeline and emit the optimized flat program as JSON.
    Build {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Output file (stdout when omitted).
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Optimization level, overriding the configuration file.
        #[arg(long, value_enum)]
        opt: Option<OptArg>,
    },

    /// Compile, then interpret an entry function.
    Run {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Function to call.
        #[arg(long, default_value = "main")]
        entry: String,

        #[arg(long, value_enum)]
        opt: Option<OptArg>,
    },

    /// Verify a program without transforming it.
    Check {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}

/// `--opt` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptArg {
    None,
    Basic,
    Full,
}

impl From<OptArg> for OptLevel {
    fn from(arg: OptArg) -> Self {
        match arg {
            OptArg::None => OptLevel::None,
            OptArg::Basic => OptLevel::Basic,
            OptArg::Full => OptLevel::Full,
        }
    }
}
