//! CLI Adapter
//!
//! Command-line interface for the gradsniper engine.
//! Uses clap derive macros for argument parsing.

mod commands;
pub mod replay;

pub use commands::{init_logging, CliApp, Command, ScoreCmd, CheckConfigCmd, SimulateCmd};
pub use replay::{run_replay, Replay, ReplayStep, SimulationSummary};

use anyhow::Result;

/// Initialize the CLI application
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    commands::execute(app).await
}
