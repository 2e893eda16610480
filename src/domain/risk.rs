use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RiskViolation {
    #[error("Unknown risk preset: {0}")]
    UnknownPreset(String),

    #[error("Risk limit validation failed: {0}")]
    ValidationFailed(String),
}

/// Named bundle of sizing and exit limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskPreset {
    Low,
    #[default]
    Medium,
    Aggressive,
}

impl RiskPreset {
    pub fn limits(&self) -> RiskLimits {
        match self {
            RiskPreset::Low => RiskLimits {
                max_position_size: 0.5,
                max_concurrent_positions: 2,
                stop_loss_pct: 20.0,
                trailing_stop_pct: 15.0,
                time_limit_minutes: 30,
                daily_loss_limit: 1.0,
                take_profit_targets: [75.0, 100.0, 200.0],
            },
            RiskPreset::Medium => RiskLimits {
                max_position_size: 1.0,
                max_concurrent_positions: 3,
                stop_loss_pct: 30.0,
                trailing_stop_pct: 20.0,
                time_limit_minutes: 60,
                daily_loss_limit: 2.0,
                take_profit_targets: [100.0, 150.0, 300.0],
            },
            RiskPreset::Aggressive => RiskLimits {
                max_position_size: 2.0,
                max_concurrent_positions: 5,
                stop_loss_pct: 40.0,
                trailing_stop_pct: 25.0,
                time_limit_minutes: 120,
                daily_loss_limit: 5.0,
                take_profit_targets: [150.0, 250.0, 500.0],
            },
        }
    }
}

impl fmt::Display for RiskPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskPreset::Low => write!(f, "low"),
            RiskPreset::Medium => write!(f, "medium"),
            RiskPreset::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for RiskPreset {
    type Err = RiskViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "conservative" => Ok(RiskPreset::Low),
            "medium" | "default" => Ok(RiskPreset::Medium),
            "aggressive" | "high" => Ok(RiskPreset::Aggressive),
            other => Err(RiskViolation::UnknownPreset(other.to_string())),
        }
    }
}

/// Concrete limits for one preset. Amounts are in base currency,
/// percentages on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size: f64,
    pub max_concurrent_positions: usize,
    pub stop_loss_pct: f64,
    pub trailing_stop_pct: f64,
    pub time_limit_minutes: u32,
    pub daily_loss_limit: f64,
    /// Gains at which the three exit phases trigger
    pub take_profit_targets: [f64; 3],
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), RiskViolation> {
        if self.max_position_size <= 0.0 {
            return Err(RiskViolation::ValidationFailed(format!(
                "max_position_size must be > 0, got {}",
                self.max_position_size
            )));
        }
        if self.max_concurrent_positions == 0 {
            return Err(RiskViolation::ValidationFailed(
                "max_concurrent_positions must be >= 1".to_string(),
            ));
        }
        if !(0.0..100.0).contains(&self.stop_loss_pct) || self.stop_loss_pct == 0.0 {
            return Err(RiskViolation::ValidationFailed(format!(
                "stop_loss_pct must be in (0, 100), got {}",
                self.stop_loss_pct
            )));
        }
        if !(0.0..100.0).contains(&self.trailing_stop_pct) || self.trailing_stop_pct == 0.0 {
            return Err(RiskViolation::ValidationFailed(format!(
                "trailing_stop_pct must be in (0, 100), got {}",
                self.trailing_stop_pct
            )));
        }
        let [t1, t2, t3] = self.take_profit_targets;
        if !(t1 > 0.0 && t1 < t2 && t2 < t3) {
            return Err(RiskViolation::ValidationFailed(format!(
                "take profit targets must be positive and increasing, got {:?}",
                self.take_profit_targets
            )));
        }
        Ok(())
    }
}
