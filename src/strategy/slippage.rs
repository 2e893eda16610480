//! Profit-aware slippage bounds
//!
//! Deep in profit we accept more slippage to get out; at a loss we keep the
//! floor. Urgency scales the result and the emergency ceiling caps it.

use crate::domain::intent::Urgency;
use crate::domain::position::Position;

/// Minimum slippage bound, bps
pub const FLOOR_BPS: u16 = 500;
/// Maximum profit-derived bound before urgency, bps
pub const PROFIT_CAP_BPS: u16 = 2000;
/// Hard ceiling, also used for retries after a failed attempt
pub const EMERGENCY_BPS: u16 = 2500;
/// bps granted per percent of unrealized profit
const BPS_PER_PROFIT_PCT: f64 = 25.0;

/// Slippage bound for a given PnL percent and urgency
pub fn for_pnl(pnl_pct: f64, urgency: Urgency) -> u16 {
    let base = if pnl_pct.is_finite() && pnl_pct > 0.0 {
        (pnl_pct * BPS_PER_PROFIT_PCT).clamp(FLOOR_BPS as f64, PROFIT_CAP_BPS as f64)
    } else {
        FLOOR_BPS as f64
    };
    clamp_bps(base * urgency.slippage_multiplier())
}

/// Slippage bound for selling out of `position` at its current price
pub fn compute(position: &Position, urgency: Urgency) -> u16 {
    for_pnl(position.pnl_percent(), urgency)
}

/// Slippage bound for a buy. There is no profit to protect yet.
pub fn for_entry(urgency: Urgency) -> u16 {
    clamp_bps(FLOOR_BPS as f64 * urgency.slippage_multiplier())
}

fn clamp_bps(bps: f64) -> u16 {
    bps.round().clamp(FLOOR_BPS as f64, EMERGENCY_BPS as f64) as u16
}
