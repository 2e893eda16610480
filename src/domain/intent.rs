//! Trade Intents
//!
//! Value objects that cross the engine boundary toward execution. The engine
//! never signs or broadcasts; it only asks for a swap with an amount, a
//! slippage bound and an urgency.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum execution attempts for a single intent (first try + retries)
pub const MAX_ATTEMPTS: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentId(pub u64);

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "intent-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

/// How aggressively execution should chase the fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    Normal,
    High,
    Critical,
}

impl Urgency {
    /// Slippage multiplier applied after the base computation
    pub fn slippage_multiplier(&self) -> f64 {
        match self {
            Urgency::Normal => 1.0,
            Urgency::High => 1.25,
            Urgency::Critical => 1.5,
        }
    }

    /// Next urgency level, saturating at Critical
    pub fn escalate(&self) -> Urgency {
        match self {
            Urgency::Normal => Urgency::High,
            Urgency::High | Urgency::Critical => Urgency::Critical,
        }
    }
}

/// Why an exit was requested. Also used as the phase tag on recorded fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TimeLimit,
    MomentumReversal,
    AdaptivePartial1,
    AdaptivePartial2,
    ExtendedTakeProfit,
    Partial1,
    Partial2,
    TakeProfit,
    TrailingStop,
    Manual,
}

impl ExitReason {
    /// Partial phase number this reason completes, if any.
    /// Adaptive and standard partials share phase numbers so a phase
    /// can never be taken twice across modes.
    pub fn phase(&self) -> Option<u8> {
        match self {
            ExitReason::AdaptivePartial1 | ExitReason::Partial1 => Some(1),
            ExitReason::AdaptivePartial2 | ExitReason::Partial2 => Some(2),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TimeLimit => "time_limit",
            ExitReason::MomentumReversal => "momentum_reversal",
            ExitReason::AdaptivePartial1 => "adaptive_partial_1",
            ExitReason::AdaptivePartial2 => "adaptive_partial_2",
            ExitReason::ExtendedTakeProfit => "extended_take_profit",
            ExitReason::Partial1 => "partial_1",
            ExitReason::Partial2 => "partial_2",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::Manual => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Request to open a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryIntent {
    pub intent_id: IntentId,
    pub asset_id: String,
    /// Base currency to spend
    pub requested_amount: f64,
    pub max_slippage_bps: u16,
    pub urgency: Urgency,
    pub attempt: u8,
    pub created_at: DateTime<Utc>,
}

impl EntryIntent {
    pub fn direction(&self) -> Direction {
        Direction::Buy
    }
}

/// Request to sell some or all of a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitIntent {
    pub intent_id: IntentId,
    pub position_id: PositionId,
    pub asset_id: String,
    /// Fraction of the remaining amount (1.0 = full exit)
    pub fraction: f64,
    /// Token amount this fraction corresponds to at emission time
    pub amount: f64,
    pub max_slippage_bps: u16,
    pub urgency: Urgency,
    pub reason: ExitReason,
    pub attempt: u8,
    pub created_at: DateTime<Utc>,
}

impl ExitIntent {
    pub fn direction(&self) -> Direction {
        Direction::Sell
    }

    pub fn is_full_exit(&self) -> bool {
        self.fraction >= 1.0
    }
}

/// Everything the engine hands to execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeIntent {
    Entry(EntryIntent),
    Exit(ExitIntent),
}

impl TradeIntent {
    pub fn id(&self) -> IntentId {
        match self {
            TradeIntent::Entry(i) => i.intent_id,
            TradeIntent::Exit(i) => i.intent_id,
        }
    }

    pub fn asset_id(&self) -> &str {
        match self {
            TradeIntent::Entry(i) => &i.asset_id,
            TradeIntent::Exit(i) => &i.asset_id,
        }
    }

    pub fn urgency(&self) -> Urgency {
        match self {
            TradeIntent::Entry(i) => i.urgency,
            TradeIntent::Exit(i) => i.urgency,
        }
    }

    pub fn max_slippage_bps(&self) -> u16 {
        match self {
            TradeIntent::Entry(i) => i.max_slippage_bps,
            TradeIntent::Exit(i) => i.max_slippage_bps,
        }
    }

    pub fn attempt(&self) -> u8 {
        match self {
            TradeIntent::Entry(i) => i.attempt,
            TradeIntent::Exit(i) => i.attempt,
        }
    }
}

/// Execution result fed back by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfirmation {
    pub intent_id: IntentId,
    /// Tokens received (entry) or sold (exit)
    pub filled_amount: f64,
    pub fill_price: f64,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExecutionConfirmation {
    pub fn filled(intent_id: IntentId, filled_amount: f64, fill_price: f64) -> Self {
        Self {
            intent_id,
            filled_amount,
            fill_price,
            success: true,
            error: None,
        }
    }

    pub fn failed(intent_id: IntentId, error: impl Into<String>) -> Self {
        Self {
            intent_id,
            filled_amount: 0.0,
            fill_price: 0.0,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_escalation_saturates() {
        assert_eq!(Urgency::Normal.escalate(), Urgency::High);
        assert_eq!(Urgency::High.escalate(), Urgency::Critical);
        assert_eq!(Urgency::Critical.escalate(), Urgency::Critical);
    }

    #[test]
    fn test_urgency_multipliers() {
        assert_eq!(Urgency::Normal.slippage_multiplier(), 1.0);
        assert_eq!(Urgency::High.slippage_multiplier(), 1.25);
        assert_eq!(Urgency::Critical.slippage_multiplier(), 1.5);
    }

    #[test]
    fn test_phase_shared_across_modes() {
        assert_eq!(ExitReason::Partial1.phase(), ExitReason::AdaptivePartial1.phase());
        assert_eq!(ExitReason::Partial2.phase(), ExitReason::AdaptivePartial2.phase());
        assert_eq!(ExitReason::StopLoss.phase(), None);
        assert_eq!(ExitReason::TrailingStop.phase(), None);
    }

    #[test]
    fn test_confirmation_constructors() {
        let ok = ExecutionConfirmation::filled(IntentId(7), 10.0, 0.5);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ExecutionConfirmation::failed(IntentId(7), "blockhash expired");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("blockhash expired"));
    }
}
