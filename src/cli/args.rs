// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for stela

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stela")]
#[command(about = "A functional workflow compiler and local dispatch engine")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile workflow units and execute them against a local build root
    Run {
        #[arg(required = true, help = "Workflow unit files (YAML)")]
        units: Vec<PathBuf>,

        #[arg(
            short,
            long,
            default_value = "build",
            help = "Build root holding the per-invocation sandboxes"
        )]
        directory: PathBuf,

        #[arg(short, long, help = "Ignore cached results and start a clean run")]
        clean: bool,

        #[arg(short, long, help = "Custom run id; defaults to a fresh UUID")]
        run_id: Option<String>,

        #[arg(
            short = 'f',
            long,
            help = "Log file location; defaults to log_<run-id>.jsonl under the build root"
        )]
        log_file: Option<PathBuf>,

        #[arg(
            short,
            long,
            default_value_t = 4,
            help = "Maximum number of concurrently executing invocations"
        )]
        jobs: usize,
    },

    /// Render the compiled element graph as Graphviz dot source
    Dot {
        #[arg(required = true, help = "Workflow unit files (YAML)")]
        units: Vec<PathBuf>,

        #[arg(short = 'f', long, help = "Write dot output here instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Compile workflow units and report diagnostics without executing
    Validate {
        #[arg(required = true, help = "Workflow unit files (YAML)")]
        units: Vec<PathBuf>,
    },
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
