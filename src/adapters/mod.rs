//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Paper: simulated execution venue for replays and dry runs
//! - CLI: Command-line interface handlers

pub mod paper;
pub mod cli;

pub use paper::{PaperExecution, PaperStats};
pub use cli::CliApp;
