use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::intent::{ExitReason, PositionId};
use crate::strategy::exits::ExitConfig;
use crate::strategy::momentum::MomentumBuffer;

/// Relative tolerance below which a remaining amount counts as fully exited
const DUST_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Open,
    PartiallyExited,
    Closed,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PositionError {
    #[error("Position is already closed")]
    AlreadyClosed,
    #[error("Position {0} is frozen pending manual review")]
    Frozen(PositionId),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(f64),
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),
    #[error("Ledger corrupted on {position}: fill {fill} exceeds remaining {remaining}")]
    LedgerCorrupted {
        position: PositionId,
        fill: f64,
        remaining: f64,
    },
}

/// One confirmed sell against a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitFill {
    pub reason: ExitReason,
    pub amount: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub asset_id: String,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub original_amount: f64,
    remaining_amount: f64,
    high_water_mark: f64,
    current_price: f64,
    fills: Vec<ExitFill>,
    status: Status,
    /// Exit targets fixed at entry
    pub exit_config: ExitConfig,
    pub momentum: MomentumBuffer,
    frozen: Option<String>,
}

impl Position {
    pub fn new(
        id: PositionId,
        asset_id: String,
        entry_price: f64,
        amount: f64,
        entry_time: DateTime<Utc>,
        exit_config: ExitConfig,
        momentum: MomentumBuffer,
    ) -> Result<Self, PositionError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(PositionError::InvalidQuantity(amount));
        }
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }

        Ok(Self {
            id,
            asset_id,
            entry_price,
            entry_time,
            original_amount: amount,
            remaining_amount: amount,
            high_water_mark: entry_price,
            current_price: entry_price,
            fills: Vec::new(),
            status: Status::Open,
            exit_config,
            momentum,
            frozen: None,
        })
    }

    pub fn remaining_amount(&self) -> f64 {
        self.remaining_amount
    }

    pub fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn fills(&self) -> &[ExitFill] {
        &self.fills
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn frozen_reason(&self) -> Option<&str> {
        self.frozen.as_deref()
    }

    /// Nothing left to sell
    pub fn is_terminal(&self) -> bool {
        self.status == Status::Closed || self.remaining_amount <= 0.0
    }

    /// Record a new market price. The high-water mark only moves up.
    pub fn observe_price(&mut self, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        self.current_price = price;
        if price > self.high_water_mark {
            self.high_water_mark = price;
        }
    }

    /// Unrealized PnL in percent at the current price
    pub fn pnl_percent(&self) -> f64 {
        self.pnl_percent_at(self.current_price)
    }

    pub fn pnl_percent_at(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price * 100.0
    }

    /// True once the price has ever traded above entry
    pub fn has_been_profitable(&self) -> bool {
        self.high_water_mark > self.entry_price
    }

    /// Percent fall from the high-water mark
    pub fn drawdown_from_high_pct(&self) -> f64 {
        if self.high_water_mark <= 0.0 {
            return 0.0;
        }
        ((self.high_water_mark - self.current_price) / self.high_water_mark * 100.0).max(0.0)
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    /// Whether partial phase `phase` has already been filled
    pub fn completed_phase(&self, phase: u8) -> bool {
        self.fills.iter().any(|f| f.reason.phase() == Some(phase))
    }

    pub fn exited_amount(&self) -> f64 {
        self.fills.iter().map(|f| f.amount).sum()
    }

    /// Base-currency PnL realized by the fills so far
    pub fn realized_pnl(&self) -> f64 {
        self.fills
            .iter()
            .map(|f| f.amount * (f.price - self.entry_price))
            .sum()
    }

    /// Apply a confirmed sell. A fill larger than what remains means the
    /// ledger is corrupted; the position is frozen and nothing is applied.
    pub fn record_fill(
        &mut self,
        reason: ExitReason,
        amount: f64,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Status, PositionError> {
        if self.frozen.is_some() {
            return Err(PositionError::Frozen(self.id));
        }
        if self.status == Status::Closed {
            return Err(PositionError::AlreadyClosed);
        }

        let tolerance = self.original_amount * DUST_TOLERANCE;
        if !amount.is_finite() || !price.is_finite() || amount > self.remaining_amount + tolerance {
            let err = PositionError::LedgerCorrupted {
                position: self.id,
                fill: amount,
                remaining: self.remaining_amount,
            };
            self.freeze(err.to_string());
            return Err(err);
        }
        if amount <= 0.0 {
            return Err(PositionError::InvalidQuantity(amount));
        }

        let amount = amount.min(self.remaining_amount);
        self.remaining_amount -= amount;
        if self.remaining_amount <= tolerance {
            // Absorb float dust so conservation holds exactly
            let dust = self.remaining_amount;
            self.remaining_amount = 0.0;
            self.fills.push(ExitFill { reason, amount: amount + dust, price, timestamp });
            self.status = Status::Closed;
        } else {
            self.fills.push(ExitFill { reason, amount, price, timestamp });
            self.status = Status::PartiallyExited;
        }

        Ok(self.status)
    }

    /// Stop all automated exits on this position
    pub fn freeze(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(position = %self.id, asset = %self.asset_id, %reason, "Position frozen");
        self.frozen = Some(reason);
    }

    /// Release a frozen position after manual review
    pub fn unfreeze(&mut self) {
        self.frozen = None;
    }
}
