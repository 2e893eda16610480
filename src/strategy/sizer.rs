//! Position Sizer
//!
//! Turns an actionable score into an advisory entry size. Balance sufficiency
//! is checked downstream by execution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::intent::{EntryIntent, IntentId, Urgency};
use crate::domain::portfolio::{PortfolioState, RiskFlags};
use crate::domain::risk::{RiskLimits, RiskPreset};
use crate::strategy::scorer::{Recommendation, ScoreResult};
use crate::strategy::slippage;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SizingRejection {
    #[error("Recommendation {0} is not actionable")]
    NotActionable(Recommendation),

    #[error("Concurrency cap reached: {open}/{max} positions open")]
    ConcurrencyCap { open: usize, max: usize },

    #[error("Asset {asset} in cooldown for another {remaining_secs}s")]
    Cooldown { asset: String, remaining_secs: i64 },

    #[error("Daily loss {loss:.4} reached limit {limit:.4}")]
    DailyLossLimit { loss: f64, limit: f64 },

    #[error("Computed size {0} is not positive")]
    NonPositiveSize(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Share of wallet balance committed per entry, percent
    #[serde(default = "default_base_fraction_pct")]
    pub base_fraction_pct: f64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_strong_buy_multiplier")]
    pub strong_buy_multiplier: f64,
    #[serde(default = "default_buy_multiplier")]
    pub buy_multiplier: f64,
    #[serde(default = "default_high_volatility_multiplier")]
    pub high_volatility_multiplier: f64,
    #[serde(default = "default_low_liquidity_multiplier")]
    pub low_liquidity_multiplier: f64,
}

fn default_base_fraction_pct() -> f64 { 3.0 }
fn default_cooldown_secs() -> u64 { 300 }
fn default_strong_buy_multiplier() -> f64 { 1.0 }
fn default_buy_multiplier() -> f64 { 0.75 }
fn default_high_volatility_multiplier() -> f64 { 0.5 }
fn default_low_liquidity_multiplier() -> f64 { 0.5 }

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            base_fraction_pct: default_base_fraction_pct(),
            cooldown_secs: default_cooldown_secs(),
            strong_buy_multiplier: default_strong_buy_multiplier(),
            buy_multiplier: default_buy_multiplier(),
            high_volatility_multiplier: default_high_volatility_multiplier(),
            low_liquidity_multiplier: default_low_liquidity_multiplier(),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_fraction_pct <= 0.0 || self.base_fraction_pct > 100.0 {
            return Err(format!("base_fraction_pct must be in (0, 100], got {}", self.base_fraction_pct));
        }
        for (name, value) in [
            ("strong_buy_multiplier", self.strong_buy_multiplier),
            ("buy_multiplier", self.buy_multiplier),
            ("high_volatility_multiplier", self.high_volatility_multiplier),
            ("low_liquidity_multiplier", self.low_liquidity_multiplier),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{} must be in [0, 1], got {}", name, value));
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizingConfig,
    limits: RiskLimits,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(SizingConfig::default(), RiskPreset::Medium.limits())
    }
}

impl PositionSizer {
    pub fn new(config: SizingConfig, limits: RiskLimits) -> Self {
        Self { config, limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Size an entry for a scored asset, or say why not
    pub fn size(
        &self,
        intent_id: IntentId,
        result: &ScoreResult,
        portfolio: &PortfolioState,
        flags: RiskFlags,
        now: DateTime<Utc>,
    ) -> Result<EntryIntent, SizingRejection> {
        let tier_multiplier = match result.recommendation {
            Recommendation::StrongBuy => self.config.strong_buy_multiplier,
            Recommendation::Buy => self.config.buy_multiplier,
            other => return Err(SizingRejection::NotActionable(other)),
        };

        if portfolio.open_positions >= self.limits.max_concurrent_positions {
            return Err(SizingRejection::ConcurrencyCap {
                open: portfolio.open_positions,
                max: self.limits.max_concurrent_positions,
            });
        }

        if let Some(remaining) = portfolio.cooldown_remaining(&result.asset_id, self.config.cooldown(), now) {
            return Err(SizingRejection::Cooldown {
                asset: result.asset_id.clone(),
                remaining_secs: remaining.num_seconds(),
            });
        }

        let loss = portfolio.daily_loss();
        if loss >= self.limits.daily_loss_limit {
            return Err(SizingRejection::DailyLossLimit {
                loss,
                limit: self.limits.daily_loss_limit,
            });
        }

        let base = (portfolio.wallet_balance * self.config.base_fraction_pct / 100.0)
            .min(self.limits.max_position_size);
        let mut amount = base * tier_multiplier;
        if flags.high_volatility {
            amount *= self.config.high_volatility_multiplier;
        }
        if flags.low_liquidity {
            amount *= self.config.low_liquidity_multiplier;
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(SizingRejection::NonPositiveSize(amount));
        }

        let urgency = match result.recommendation {
            Recommendation::StrongBuy => Urgency::High,
            _ => Urgency::Normal,
        };

        tracing::debug!(
            asset = %result.asset_id,
            score = result.score,
            amount,
            ?urgency,
            "Entry sized"
        );

        Ok(EntryIntent {
            intent_id,
            asset_id: result.asset_id.clone(),
            requested_amount: amount,
            max_slippage_bps: slippage::for_entry(urgency),
            urgency,
            attempt: 1,
            created_at: now,
        })
    }
}
