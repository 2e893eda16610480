//! Exit State Machine
//!
//! Ordered rule table evaluated first-match per tick:
//! 1. Stop loss               full, Critical
//! 2. Time limit              full, High
//! 3. Momentum reversal       full, Critical (only while in profit)
//! 4. Adaptive partials       momentum-scaled targets and fractions
//! 5. Extended take profit    full, only on Strong momentum
//! 6. Standard partials / TP  nominal targets when adaptive mode is off
//! 7. Trailing stop           full, only once the position has been in profit
//!
//! Partial phases are tracked on the position's fill ledger, so a phase that
//! has been filled is never taken again even if price re-crosses its target.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::{ExitReason, Urgency};
use crate::domain::position::Position;
use crate::domain::risk::{RiskLimits, RiskPreset};
use crate::strategy::momentum::{MomentumClass, MomentumSnapshot};

/// Exit parameters. Copied onto each position at entry and never changed after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
    #[serde(default = "default_time_limit_minutes")]
    pub time_limit_minutes: u32,
    /// Gains (percent) for phase 1, phase 2 and the final take profit
    #[serde(default = "default_take_profit_targets")]
    pub take_profit_targets: [f64; 3],
    /// Share of the original amount sold at phase 1 and phase 2
    #[serde(default = "default_partial_fractions")]
    pub partial_fractions: [f64; 2],
    #[serde(default = "default_true")]
    pub adaptive_enabled: bool,
    #[serde(default = "default_true")]
    pub extended_targets_enabled: bool,
    /// Minimum gain before a momentum reversal triggers an exit
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

fn default_stop_loss_pct() -> f64 { RiskPreset::Medium.limits().stop_loss_pct }
fn default_trailing_stop_pct() -> f64 { RiskPreset::Medium.limits().trailing_stop_pct }
fn default_time_limit_minutes() -> u32 { RiskPreset::Medium.limits().time_limit_minutes }
fn default_take_profit_targets() -> [f64; 3] { RiskPreset::Medium.limits().take_profit_targets }
fn default_partial_fractions() -> [f64; 2] { [0.4, 0.3] }
fn default_true() -> bool { true }
fn default_reversal_min_pnl_pct() -> f64 { 5.0 }
fn default_strong_target_multiplier() -> f64 { 1.5 }
fn default_strong_fraction_multiplier() -> f64 { 0.5 }
fn default_weak_target_multiplier() -> f64 { 0.7 }
fn default_weak_fraction_multiplier() -> f64 { 1.3 }

impl Default for ExitConfig {
    fn default() -> Self {
        Self::from_limits(&RiskPreset::Medium.limits())
    }
}

impl ExitConfig {
    /// Exit parameters for a risk preset, with default momentum scaling
    pub fn from_limits(limits: &RiskLimits) -> Self {
        Self {
            stop_loss_pct: limits.stop_loss_pct,
            trailing_stop_pct: limits.trailing_stop_pct,
            time_limit_minutes: limits.time_limit_minutes,
            take_profit_targets: limits.take_profit_targets,
            partial_fractions: default_partial_fractions(),
            adaptive_enabled: true,
            extended_targets_enabled: true,
            reversal_min_pnl_pct: default_reversal_min_pnl_pct(),
            strong_target_multiplier: default_strong_target_multiplier(),
            strong_fraction_multiplier: default_strong_fraction_multiplier(),
            weak_target_multiplier: default_weak_target_multiplier(),
            weak_fraction_multiplier: default_weak_fraction_multiplier(),
        }
    }

    pub fn time_limit(&self) -> Duration {
        Duration::minutes(self.time_limit_minutes as i64)
    }

    /// (target multiplier, fraction multiplier) for a momentum class
    pub fn multipliers(&self, class: MomentumClass) -> (f64, f64) {
        match class {
            MomentumClass::Strong => (self.strong_target_multiplier, self.strong_fraction_multiplier),
            MomentumClass::Weak => (self.weak_target_multiplier, self.weak_fraction_multiplier),
            MomentumClass::Normal | MomentumClass::Reversing => (1.0, 1.0),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stop_loss_pct <= 0.0 || self.stop_loss_pct >= 100.0 {
            return Err(format!("stop_loss_pct must be in (0, 100), got {}", self.stop_loss_pct));
        }
        if self.trailing_stop_pct <= 0.0 || self.trailing_stop_pct >= 100.0 {
            return Err(format!("trailing_stop_pct must be in (0, 100), got {}", self.trailing_stop_pct));
        }
        let [t1, t2, t3] = self.take_profit_targets;
        if !(t1 > 0.0 && t1 < t2 && t2 < t3) {
            return Err(format!("take_profit_targets must be positive and increasing, got {:?}", self.take_profit_targets));
        }
        for fraction in self.partial_fractions {
            if fraction <= 0.0 || fraction > 1.0 {
                return Err(format!("partial fractions must be in (0, 1], got {}", fraction));
            }
        }
        for multiplier in [
            self.strong_target_multiplier,
            self.strong_fraction_multiplier,
            self.weak_target_multiplier,
            self.weak_fraction_multiplier,
        ] {
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return Err(format!("momentum multipliers must be > 0, got {}", multiplier));
            }
        }
        Ok(())
    }
}

/// A matched exit rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitDecision {
    pub reason: ExitReason,
    /// Fraction of the remaining amount, in (0, 1]
    pub fraction: f64,
    /// Token amount the fraction corresponds to now
    pub amount: f64,
    pub urgency: Urgency,
    /// PnL percent at the time of the match
    pub pnl_pct: f64,
}

/// Inputs shared by every rule
pub struct ExitContext<'a> {
    pub position: &'a Position,
    pub momentum: &'a MomentumSnapshot,
    pub now: DateTime<Utc>,
    pnl_pct: f64,
}

impl<'a> ExitContext<'a> {
    pub fn new(position: &'a Position, momentum: &'a MomentumSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            position,
            momentum,
            now,
            pnl_pct: position.pnl_percent(),
        }
    }

    fn config(&self) -> &ExitConfig {
        &self.position.exit_config
    }

    fn full(&self, reason: ExitReason, urgency: Urgency) -> ExitDecision {
        ExitDecision {
            reason,
            fraction: 1.0,
            amount: self.position.remaining_amount(),
            urgency,
            pnl_pct: self.pnl_pct,
        }
    }

    /// Sell `share` of the original amount, capped at what remains
    fn partial(&self, reason: ExitReason, share: f64) -> ExitDecision {
        let remaining = self.position.remaining_amount();
        let amount = (share * self.position.original_amount).min(remaining);
        let fraction = if remaining > 0.0 { (amount / remaining).min(1.0) } else { 1.0 };
        ExitDecision {
            reason,
            fraction,
            amount,
            urgency: Urgency::Normal,
            pnl_pct: self.pnl_pct,
        }
    }
}

type ExitRule = fn(&ExitContext) -> Option<ExitDecision>;

/// Priority order. Earlier entries win.
const EXIT_RULES: [(&str, ExitRule); 7] = [
    ("stop_loss", stop_loss),
    ("time_limit", time_limit),
    ("momentum_reversal", momentum_reversal),
    ("adaptive_partial", adaptive_partial),
    ("extended_take_profit", extended_take_profit),
    ("standard_targets", standard_targets),
    ("trailing_stop", trailing_stop),
];

/// Evaluate the exit rules for one position. Returns the first match.
pub fn evaluate(position: &Position, momentum: &MomentumSnapshot, now: DateTime<Utc>) -> Option<ExitDecision> {
    if position.is_terminal() || position.is_frozen() {
        return None;
    }

    let ctx = ExitContext::new(position, momentum, now);
    EXIT_RULES.iter().find_map(|(name, rule)| {
        let decision = rule(&ctx)?;
        tracing::debug!(
            position = %position.id,
            rule = *name,
            pnl_pct = decision.pnl_pct,
            class = %momentum.class,
            "Exit rule matched"
        );
        Some(decision)
    })
}

fn stop_loss(ctx: &ExitContext) -> Option<ExitDecision> {
    (ctx.pnl_pct <= -ctx.config().stop_loss_pct).then(|| ctx.full(ExitReason::StopLoss, Urgency::Critical))
}

fn time_limit(ctx: &ExitContext) -> Option<ExitDecision> {
    (ctx.position.elapsed(ctx.now) >= ctx.config().time_limit()).then(|| ctx.full(ExitReason::TimeLimit, Urgency::High))
}

fn momentum_reversal(ctx: &ExitContext) -> Option<ExitDecision> {
    let reversing = ctx.momentum.class == MomentumClass::Reversing;
    (reversing && ctx.pnl_pct > ctx.config().reversal_min_pnl_pct)
        .then(|| ctx.full(ExitReason::MomentumReversal, Urgency::Critical))
}

fn adaptive_partial(ctx: &ExitContext) -> Option<ExitDecision> {
    let config = ctx.config();
    if !config.adaptive_enabled {
        return None;
    }
    let (target_mult, fraction_mult) = config.multipliers(ctx.momentum.class);

    let phases = [
        (1, ExitReason::AdaptivePartial1),
        (2, ExitReason::AdaptivePartial2),
    ];
    phases.iter().find_map(|&(phase, reason)| {
        let idx = (phase - 1) as usize;
        let target = config.take_profit_targets[idx] * target_mult;
        if ctx.position.completed_phase(phase) || ctx.pnl_pct < target {
            return None;
        }
        Some(ctx.partial(reason, config.partial_fractions[idx] * fraction_mult))
    })
}

fn extended_take_profit(ctx: &ExitContext) -> Option<ExitDecision> {
    let config = ctx.config();
    let fires = config.adaptive_enabled
        && config.extended_targets_enabled
        && ctx.momentum.class == MomentumClass::Strong
        && ctx.pnl_pct >= config.take_profit_targets[2];
    fires.then(|| ctx.full(ExitReason::ExtendedTakeProfit, Urgency::Normal))
}

fn standard_targets(ctx: &ExitContext) -> Option<ExitDecision> {
    let config = ctx.config();
    if config.adaptive_enabled {
        return None;
    }

    if !ctx.position.completed_phase(1) && ctx.pnl_pct >= config.take_profit_targets[0] {
        return Some(ctx.partial(ExitReason::Partial1, config.partial_fractions[0]));
    }
    if !ctx.position.completed_phase(2) && ctx.pnl_pct >= config.take_profit_targets[1] {
        return Some(ctx.partial(ExitReason::Partial2, config.partial_fractions[1]));
    }
    if config.extended_targets_enabled && ctx.pnl_pct >= config.take_profit_targets[2] {
        return Some(ctx.full(ExitReason::TakeProfit, Urgency::Normal));
    }
    None
}

fn trailing_stop(ctx: &ExitContext) -> Option<ExitDecision> {
    let position = ctx.position;
    if !position.has_been_profitable() {
        return None;
    }
    let trigger = position.high_water_mark() * (1.0 - ctx.config().trailing_stop_pct / 100.0);
    (position.current_price() <= trigger).then(|| ctx.full(ExitReason::TrailingStop, Urgency::Normal))
}
