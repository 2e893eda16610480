//! Configuration Loader
//!
//! Loads the engine configuration from a TOML file, layers
//! `GRADSNIPER__SECTION__KEY` environment overrides on top, and validates
//! the result. Every section has defaults, so an empty file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::normalizer::NormalizerConfig;
use crate::domain::risk::{RiskLimits, RiskPreset};
use crate::strategy::exits::ExitConfig;
use crate::strategy::momentum::MomentumConfig;
use crate::strategy::scorer::{HardFilterConfig, PenaltyConfig, ScoringConfig, WeightProfile};
use crate::strategy::sizer::SizingConfig;

/// Prefix for environment overrides, e.g. `GRADSNIPER__RISK__PRESET=low`
pub const ENV_PREFIX: &str = "GRADSNIPER";

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub filters: HardFilterConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub momentum: MomentumConfig,
    #[serde(default)]
    pub exits: ExitsSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Scoring configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringSection {
    /// Weight profile: "default", "aggressive", "conservative"
    #[serde(default)]
    pub profile: WeightProfile,
    #[serde(default)]
    pub penalties: PenaltyConfig,
}

/// Risk preset with optional per-field overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskSection {
    /// Preset: "low", "medium", "aggressive"
    #[serde(default)]
    pub preset: RiskPreset,
    #[serde(default)]
    pub max_position_size: Option<f64>,
    #[serde(default)]
    pub max_concurrent_positions: Option<usize>,
    #[serde(default)]
    pub stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub trailing_stop_pct: Option<f64>,
    #[serde(default)]
    pub time_limit_minutes: Option<u32>,
    #[serde(default)]
    pub daily_loss_limit: Option<f64>,
    #[serde(default)]
    pub take_profit_targets: Option<[f64; 3]>,
}

impl RiskSection {
    /// Preset limits with any explicit overrides applied
    pub fn limits(&self) -> RiskLimits {
        let mut limits = self.preset.limits();
        if let Some(v) = self.max_position_size {
            limits.max_position_size = v;
        }
        if let Some(v) = self.max_concurrent_positions {
            limits.max_concurrent_positions = v;
        }
        if let Some(v) = self.stop_loss_pct {
            limits.stop_loss_pct = v;
        }
        if let Some(v) = self.trailing_stop_pct {
            limits.trailing_stop_pct = v;
        }
        if let Some(v) = self.time_limit_minutes {
            limits.time_limit_minutes = v;
        }
        if let Some(v) = self.daily_loss_limit {
            limits.daily_loss_limit = v;
        }
        if let Some(v) = self.take_profit_targets {
            limits.take_profit_targets = v;
        }
        limits
    }
}

/// Exit behaviour that is not part of the risk preset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitsSection {
    #[serde(default = "default_true")]
    pub adaptive_enabled: bool,
    #[serde(default = "default_true")]
    pub extended_targets_enabled: bool,
    #[serde(default = "default_partial_fractions")]
    pub partial_fractions: [f64; 2],
    #[serde(default = "default_reversal_min_pnl_pct")]
    pub reversal_min_pnl_pct: f64,
    #[serde(default = "default_strong_target_multiplier")]
    pub strong_target_multiplier: f64,
    #[serde(default = "default_strong_fraction_multiplier")]
    pub strong_fraction_multiplier: f64,
    #[serde(default = "default_weak_target_multiplier")]
    pub weak_target_multiplier: f64,
    #[serde(default = "default_weak_fraction_multiplier")]
    pub weak_fraction_multiplier: f64,
}

fn default_true() -> bool { true }
fn default_partial_fractions() -> [f64; 2] { ExitConfig::default().partial_fractions }
fn default_reversal_min_pnl_pct() -> f64 { ExitConfig::default().reversal_min_pnl_pct }
fn default_strong_target_multiplier() -> f64 { ExitConfig::default().strong_target_multiplier }
fn default_strong_fraction_multiplier() -> f64 { ExitConfig::default().strong_fraction_multiplier }
fn default_weak_target_multiplier() -> f64 { ExitConfig::default().weak_target_multiplier }
fn default_weak_fraction_multiplier() -> f64 { ExitConfig::default().weak_fraction_multiplier }

impl Default for ExitsSection {
    fn default() -> Self {
        Self {
            adaptive_enabled: true,
            extended_targets_enabled: true,
            partial_fractions: default_partial_fractions(),
            reversal_min_pnl_pct: default_reversal_min_pnl_pct(),
            strong_target_multiplier: default_strong_target_multiplier(),
            strong_fraction_multiplier: default_strong_fraction_multiplier(),
            weak_target_multiplier: default_weak_target_multiplier(),
            weak_fraction_multiplier: default_weak_fraction_multiplier(),
        }
    }
}

/// Intent hand-off and paper execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSection {
    /// Capacity of the outbound intent channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Paper adapter: probability that an attempt fails (0-1)
    #[serde(default)]
    pub paper_failure_rate: f64,
    /// Paper adapter: RNG seed for reproducible replays
    #[serde(default)]
    pub paper_seed: Option<u64>,
    /// Number of closed positions kept in history
    #[serde(default = "default_closed_history")]
    pub closed_history: usize,
}

fn default_channel_capacity() -> usize { 256 }
fn default_closed_history() -> usize { 500 }

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            paper_failure_rate: 0.0,
            paper_seed: None,
            closed_history: default_closed_history(),
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to layer configuration: {0}")]
    SourceError(#[from] ::config::ConfigError),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file with environment overrides
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let expanded = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
    let path = PathBuf::from(expanded);
    if !path.exists() {
        return Err(ConfigError::NotFound(path));
    }

    let settings = ::config::Config::builder()
        .add_source(::config::File::from(path.as_path()).format(::config::FileFormat::Toml))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: EngineConfig = settings.try_deserialize()?;
    config.validate()?;
    tracing::debug!(path = %path.display(), preset = %config.risk.preset, "Configuration loaded");
    Ok(config)
}

/// Parse configuration from TOML text, without environment overrides
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl EngineConfig {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring_config()
            .validate()
            .map_err(ConfigError::ValidationError)?;
        self.sizing.validate().map_err(ConfigError::ValidationError)?;
        self.risk_limits()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        self.momentum.validate().map_err(ConfigError::ValidationError)?;
        self.exit_config().validate().map_err(ConfigError::ValidationError)?;

        if self.normalizer.graduation_sol <= 0.0 {
            return Err(ConfigError::ValidationError(
                "graduation_sol must be > 0".to_string(),
            ));
        }

        if self.execution.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel_capacity must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.execution.paper_failure_rate) {
            return Err(ConfigError::ValidationError(format!(
                "paper_failure_rate must be 0-1, got {}",
                self.execution.paper_failure_rate
            )));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging level must be one of trace/debug/info/warn/error, got {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig {
            profile: self.scoring.profile,
            filters: self.filters.clone(),
            penalties: self.scoring.penalties.clone(),
        }
    }

    pub fn risk_limits(&self) -> RiskLimits {
        self.risk.limits()
    }

    /// Exit parameters snapshotted onto every new position
    pub fn exit_config(&self) -> ExitConfig {
        let exits = &self.exits;
        ExitConfig {
            adaptive_enabled: exits.adaptive_enabled,
            extended_targets_enabled: exits.extended_targets_enabled,
            partial_fractions: exits.partial_fractions,
            reversal_min_pnl_pct: exits.reversal_min_pnl_pct,
            strong_target_multiplier: exits.strong_target_multiplier,
            strong_fraction_multiplier: exits.strong_fraction_multiplier,
            weak_target_multiplier: exits.weak_target_multiplier,
            weak_fraction_multiplier: exits.weak_fraction_multiplier,
            ..ExitConfig::from_limits(&self.risk_limits())
        }
    }

    /// Render as TOML, e.g. to write out a starter config
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[scoring]
profile = "conservative"

[scoring.penalties]
min_liquidity = 25.0

[filters]
min_holders = 80
max_creator_holding = 10.0

[sizing]
base_fraction_pct = 2.0
cooldown_secs = 600

[risk]
preset = "aggressive"
stop_loss_pct = 35.0

[momentum]
confirmation_count = 3

[exits]
adaptive_enabled = false

[execution]
channel_capacity = 64

[logging]
level = "debug"
"#
        .to_string()
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_shipped_default_config_is_valid() {
        let config = parse_config(include_str!("../../config/default.toml")).unwrap();
        assert_eq!(config.risk.preset, RiskPreset::Medium);
        assert_eq!(config.normalizer.graduation_sol, 85.0);
        assert_eq!(config.momentum.confirmation_count, 4);
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(&create_valid_config());
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.scoring.profile, WeightProfile::Conservative);
        assert_eq!(config.scoring.penalties.min_liquidity, 25.0);
        assert_eq!(config.filters.min_holders, 80);
        assert_eq!(config.filters.max_creator_holding, 10.0);
        // Unset filter fields keep defaults
        assert_eq!(config.filters.max_top10_concentration, 70.0);
        assert_eq!(config.sizing.cooldown_secs, 600);
        assert_eq!(config.momentum.confirmation_count, 3);
        assert_eq!(config.execution.channel_capacity, 64);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_risk_preset_with_override() {
        let config = parse_config(&create_valid_config()).unwrap();
        let limits = config.risk_limits();
        assert_eq!(limits.stop_loss_pct, 35.0);
        assert_eq!(limits.max_concurrent_positions, 5);
        assert_eq!(limits.take_profit_targets, [150.0, 250.0, 500.0]);

        let exits = config.exit_config();
        assert!(!exits.adaptive_enabled);
        assert_eq!(exits.stop_loss_pct, 35.0);
        assert_eq!(exits.trailing_stop_pct, 25.0);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.risk.preset, RiskPreset::Medium);
        assert_eq!(config.scoring.profile, WeightProfile::Default);
        assert_eq!(config.exit_config(), ExitConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::NotFound(_)));
    }

    #[test]
    fn test_invalid_progress_window() {
        let result = parse_config(
            r#"
[filters]
min_progress = 95.0
max_progress = 80.0
"#,
        );
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_targets() {
        let result = parse_config(
            r#"
[risk]
take_profit_targets = [200.0, 150.0, 300.0]
"#,
        );
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_invalid_log_level() {
        let result = parse_config(
            r#"
[logging]
level = "verbose"
"#,
        );
        assert!(matches!(result.unwrap_err(), ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let result = parse_config("[risk\npreset = ");
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let rendered = EngineConfig::default().to_toml().unwrap();
        let parsed = parse_config(&rendered).unwrap();
        assert_eq!(parsed.exit_config(), ExitConfig::default());
    }
}
