//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the gradsniper engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use super::replay::{run_replay, Replay, SimulationSummary};
use crate::config::{load_config, EngineConfig};
use crate::domain::normalizer::{RawVenueData, SnapshotNormalizer};
use crate::domain::snapshot::MarketSnapshot;
use crate::ports::audit::{AuditSink, NullAuditSink, TracingAuditSink};
use crate::strategy::scorer::{OpportunityScorer, ScoreResult, WeightProfile};

/// Gradsniper - graduation signal scoring and position lifecycle engine
#[derive(Parser, Debug)]
#[command(
    name = "gradsniper",
    version = env!("CARGO_PKG_VERSION"),
    about = "Scores bonding-curve graduation candidates and manages their positions",
    long_about = "Gradsniper scores tokens approaching bonding-curve graduation, sizes \
                  entries under a risk preset and runs each position through a \
                  momentum-adaptive exit state machine."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score a single snapshot
    Score(ScoreCmd),

    /// Validate a configuration file
    CheckConfig(CheckConfigCmd),

    /// Replay recorded market data against the paper venue
    Simulate(SimulateCmd),
}

/// Score a snapshot
#[derive(Parser, Debug)]
pub struct ScoreCmd {
    /// JSON file holding a snapshot, or raw venue data with --raw
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Weight profile override (default, aggressive, conservative)
    #[arg(short, long, value_name = "PROFILE")]
    pub profile: Option<WeightProfile>,

    /// Input is raw venue data that needs normalizing first
    #[arg(long)]
    pub raw: bool,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Print the built-in defaults as TOML instead
    #[arg(long)]
    pub print_default: bool,
}

/// Replay market data
#[derive(Parser, Debug)]
pub struct SimulateCmd {
    /// JSON replay file
    #[arg(value_name = "FILE")]
    pub replay: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// RNG seed for paper fills (overrides config)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Emit audit events to the log
    #[arg(long)]
    pub audit: bool,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    match app.command {
        Command::Score(cmd) => score_command(cmd).await,
        Command::CheckConfig(cmd) => check_config_command(cmd).await,
        Command::Simulate(cmd) => simulate_command(cmd).await,
    }
}

impl CliApp {
    /// Config file named by the chosen command, if any
    pub fn config_path(&self) -> Option<&Path> {
        match &self.command {
            Command::Score(cmd) => cmd.config.as_deref(),
            Command::CheckConfig(cmd) => Some(cmd.config.as_path()),
            Command::Simulate(cmd) => cmd.config.as_deref(),
        }
    }

    /// Log level from the `[logging]` section, when the config loads
    pub fn configured_log_level(&self) -> Option<String> {
        let path = self.config_path()?;
        load_config(path).ok().map(|config| config.logging.level)
    }
}

/// Initialize logging system
///
/// `RUST_LOG` wins, then `--debug`/`--verbose`, then the configured level.
pub fn init_logging(verbose: bool, debug: bool, configured: Option<&str>) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let fallback = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        configured.unwrap_or("warn")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn config_or_default(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => load_config(path).with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
    let content = std::fs::read_to_string(&expanded)
        .with_context(|| format!("Failed to read {}", expanded))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", expanded))
}

/// Handle score command
async fn score_command(cmd: ScoreCmd) -> Result<()> {
    let config = config_or_default(cmd.config.as_deref())?;

    let snapshot: MarketSnapshot = if cmd.raw {
        let raw: RawVenueData = read_json(&cmd.input)?;
        SnapshotNormalizer::new(config.normalizer.clone())
            .normalize(&raw, Utc::now())
            .context("Raw venue data rejected")?
    } else {
        read_json(&cmd.input)?
    };

    let scorer = OpportunityScorer::new(config.scoring_config());
    let profile = cmd.profile.unwrap_or(config.scoring.profile);
    let result = scorer.score(&snapshot, profile);
    tracing::info!(asset = %result.asset_id, score = result.score, "Snapshot scored");

    match cmd.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&score_json(&result))?),
        _ => print_score(&result),
    }
    Ok(())
}

fn score_json(result: &ScoreResult) -> serde_json::Value {
    serde_json::json!({
        "asset_id": result.asset_id,
        "score": result.score,
        "recommendation": result.recommendation,
        "profile": result.profile,
        "sub_scores": result.sub_scores,
        "signals": result.signals,
        "rejected": result.is_rejected(),
    })
}

fn print_score(result: &ScoreResult) {
    println!("Asset:          {}", result.asset_id);
    println!("Profile:        {}", result.profile);
    println!("Score:          {:.2}", result.score);
    println!("Recommendation: {}", result.recommendation);
    if !result.is_rejected() {
        let s = &result.sub_scores;
        println!(
            "  graduation {:.1} | volume {:.1} | holder {:.1} | momentum {:.1} | penalty {:.1}%",
            s.graduation, s.volume, s.holder, s.momentum, s.risk_penalty
        );
    }
    for signal in &result.signals {
        println!("  - {}", signal);
    }
}

/// Handle check-config command
async fn check_config_command(cmd: CheckConfigCmd) -> Result<()> {
    if cmd.print_default {
        print!("{}", EngineConfig::default().to_toml()?);
        return Ok(());
    }

    let config = load_config(&cmd.config).context("Configuration is invalid")?;
    let limits = config.risk_limits();
    println!("✓ {} is valid", cmd.config.display());
    println!("  Risk preset:      {}", config.risk.preset);
    println!("  Weight profile:   {}", config.scoring.profile);
    println!("  Max position:     {}", limits.max_position_size);
    println!("  Max concurrent:   {}", limits.max_concurrent_positions);
    println!(
        "  Stop/trailing:    {}% / {}%",
        limits.stop_loss_pct, limits.trailing_stop_pct
    );
    println!(
        "  Targets:          {}% / {}% / {}%",
        limits.take_profit_targets[0], limits.take_profit_targets[1], limits.take_profit_targets[2]
    );
    Ok(())
}

/// Handle simulate command
async fn simulate_command(cmd: SimulateCmd) -> Result<()> {
    let config = config_or_default(cmd.config.as_deref())?;
    let replay: Replay = read_json(&cmd.replay)?;
    tracing::info!(steps = replay.steps.len(), "Starting replay");

    let audit: Arc<dyn AuditSink> = if cmd.audit {
        Arc::new(TracingAuditSink)
    } else {
        Arc::new(NullAuditSink)
    };
    let summary = run_replay(&config, &replay, audit, cmd.seed).await?;

    match cmd.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_summary(&summary),
    }
    Ok(())
}

fn print_summary(summary: &SimulationSummary) {
    println!("Replay finished after {} steps", summary.steps);
    println!("  Scored:           {}", summary.scored);
    println!("  Raw rejected:     {}", summary.rejected_raw);
    println!("  Entries:          {} requested, {} opened", summary.entries_requested, summary.opened);
    println!("  Partial fills:    {}", summary.partial_fills);
    println!("  Retries:          {}", summary.retries);
    println!("  Abandoned:        {}", summary.abandoned);
    println!("  Closed:           {}", summary.closed.len());
    println!("  Still open:       {}", summary.still_open);
    println!("  Paper attempts:   {}", summary.attempts);
    println!("  Net:              {:+.6}", summary.net);
    for closed in &summary.closed {
        println!(
            "    {} entry {:.8} pnl {:+.6} [{}]",
            closed.asset_id,
            closed.entry_price,
            closed.realized_pnl,
            closed.exit_reasons.join(", ")
        );
    }
}
