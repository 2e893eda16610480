use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Wallet and ledger view supplied by the execution collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Spendable base-currency balance
    pub wallet_balance: f64,
    pub open_positions: usize,
    /// Last trade time per asset, for cooldowns
    #[serde(default)]
    pub last_trade_at: HashMap<String, DateTime<Utc>>,
    /// Realized PnL since the start of the trading day (negative = loss)
    #[serde(default)]
    pub daily_realized_pnl: f64,
}

impl PortfolioState {
    pub fn new(wallet_balance: f64) -> Self {
        PortfolioState {
            wallet_balance,
            ..Default::default()
        }
    }

    pub fn with_open_positions(mut self, open_positions: usize) -> Self {
        self.open_positions = open_positions;
        self
    }

    pub fn record_trade(&mut self, asset_id: &str, at: DateTime<Utc>) {
        self.last_trade_at.insert(asset_id.to_string(), at);
    }

    /// Time left before `asset_id` may be traded again
    pub fn cooldown_remaining(&self, asset_id: &str, cooldown: Duration, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.last_trade_at.get(asset_id)?;
        let ready_at = *last + cooldown;
        if now < ready_at {
            Some(ready_at - now)
        } else {
            None
        }
    }

    pub fn daily_loss(&self) -> f64 {
        (-self.daily_realized_pnl).max(0.0)
    }
}

/// Risk flags computed outside the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    #[serde(default)]
    pub high_volatility: bool,
    #[serde(default)]
    pub low_liquidity: bool,
}
