//! Tempo CLI — critical-path analysis of GPU performance traces.
//!
//! Provides `tempo analyze` to build, solve, and report the critical path of
//! a training iteration, and `tempo restore` to reload a previously saved
//! graph without re-parsing the trace.

#![warn(missing_docs)]

mod analyze;
mod config;
mod restore;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Tempo — GPU trace critical-path analyzer.
#[derive(Parser, Debug)]
#[command(name = "tempo", version, about = "Tempo trace critical-path analyzer")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print analysis diagnostics, including notes.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze one rank's (or every rank's) critical path.
    Analyze(AnalyzeArgs),
    /// Restore a saved graph and report its summary.
    Restore(RestoreArgs),
}

/// Arguments for the `tempo analyze` subcommand.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Directory containing the trace files (one `.json`/`.json.gz` per
    /// rank).
    #[arg(long)]
    pub trace_dir: PathBuf,

    /// Rank to analyze (default: the first rank found).
    #[arg(short, long)]
    pub rank: Option<u32>,

    /// Analyze every rank in the directory, in parallel.
    #[arg(long, conflicts_with = "rank")]
    pub all_ranks: bool,

    /// Annotation naming the iteration to analyze (substring match).
    /// Omit to analyze the full trace.
    #[arg(short, long)]
    pub annotation: Option<String>,

    /// Which instance of the annotation to analyze, numbered in start-time
    /// order.
    #[arg(short, long)]
    pub instance: Option<u64>,

    /// Emit additional zero-weight launch edges (kernel cannot start before
    /// its launch call started).
    #[arg(long)]
    pub zero_weight_launch_edges: bool,

    /// Event-name pattern treated as data-loader work; repeatable.
    #[arg(long = "data-load-event")]
    pub data_load_events: Vec<String>,

    /// Save the solved graph as an archive under this directory.
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Write an overlaid trace into this directory.
    #[arg(long)]
    pub overlay: Option<PathBuf>,

    /// Keep only critical events in the overlaid trace.
    #[arg(long)]
    pub only_critical_events: bool,

    /// Draw flow arrows for every graph edge in the overlaid trace, not
    /// just the CPU-GPU dependencies.
    #[arg(long)]
    pub show_all_edges: bool,

    /// Output format for the summary report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `tempo restore` subcommand.
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Path to a saved `cpgraph_rank<r>` archive directory.
    #[arg(long)]
    pub archive: PathBuf,

    /// Trace directory to resolve event names against; the archive's
    /// fingerprint is checked against the matching rank's file.
    #[arg(long)]
    pub trace_dir: Option<PathBuf>,

    /// Re-run the longest-path solver on the restored graph instead of
    /// reporting the saved path.
    #[arg(long)]
    pub resolve: bool,

    /// Output format for the summary report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Summary output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Command::Analyze(ref args) => analyze::run(args, &global),
        Command::Restore(ref args) => restore::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
