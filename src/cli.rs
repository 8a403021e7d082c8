//! CLI argument parsing for the triage service.
//!
//! The CLI is intentionally thin: both subcommands wire the same pipeline,
//! so policy lives in the library and not in argument handling.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "ctriage",
    version,
    about = "LLM-driven triage and defect analytics for test-execution records",
    after_help = "Commands:\n  serve                Run the HTTP surface (upload + polling + reports)\n  run --input <FILE>   Run the pipeline once over a local table\n\nExamples:\n  ctriage serve\n  ctriage run --input nightly.csv --out-dir reports",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Serve(ServeArgs),
    Run(RunArgs),
}

/// Serve command inputs.
#[derive(Parser, Debug)]
#[command(about = "Run the HTTP surface")]
pub struct ServeArgs {
    /// Bind address override (default from CTRIAGE_BIND_ADDR)
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// One-shot run over a local tabular file.
#[derive(Parser, Debug)]
#[command(about = "Run the pipeline once over a local table")]
pub struct RunArgs {
    /// Tabular file to analyze
    #[arg(long, value_name = "FILE")]
    pub input: PathBuf,

    /// Report output directory override
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}
