//! Market Snapshot
//!
//! Fixed-shape view of a bonding-curve token at one tick. Produced by the
//! snapshot normalizer, consumed by the opportunity scorer. All percentages
//! are expressed on a 0-100 scale.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of price points retained in a snapshot's history
pub const DEFAULT_PRICE_LOOKBACK: usize = 120;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("Field {0} is NaN or infinite")]
    NotFinite(&'static str),

    #[error("Price history is not ordered by timestamp")]
    UnorderedHistory,
}

/// One observed price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Bounded, append-only price history. Oldest points are evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PRICE_LOOKBACK)
    }
}

impl PriceHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point. Points that do not advance time are refused.
    pub fn push(&mut self, point: PricePoint) -> bool {
        if let Some(last) = self.points.back() {
            if point.timestamp <= last.timestamp {
                return false;
            }
        }
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    pub fn oldest(&self) -> Option<&PricePoint> {
        self.points.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    /// Percent change between the oldest point inside `window_secs` and the latest
    pub fn change_pct_over(&self, window_secs: i64) -> Option<f64> {
        let latest = self.latest()?;
        let cutoff = latest.timestamp - chrono::Duration::seconds(window_secs);
        let base = self.points.iter().find(|p| p.timestamp >= cutoff)?;
        if base.price <= f64::EPSILON || base.timestamp == latest.timestamp {
            return None;
        }
        Some((latest.price - base.price) / base.price * 100.0)
    }

    fn is_ordered(&self) -> bool {
        self.points
            .iter()
            .zip(self.points.iter().skip(1))
            .all(|(a, b)| a.timestamp < b.timestamp)
    }
}

/// Normalized per-tick market view of a single asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Token mint address
    pub asset_id: String,
    /// Bonding curve completion (0-100)
    pub graduation_progress: f64,
    /// Progress gained over the last hour (percentage points)
    #[serde(default)]
    pub progress_change_1h: f64,

    // ===== Volume =====
    pub volume_5m: f64,
    pub volume_1h: f64,
    #[serde(default)]
    pub volume_24h: f64,
    pub trades_5m: u32,
    pub trades_1h: u32,
    /// Short-window volume rate relative to the hourly rate (1.0 = steady)
    pub volume_acceleration: f64,

    // ===== Holders =====
    pub holder_count: u32,
    /// Holder growth over the last hour, percent
    pub holder_growth_1h: f64,
    /// Share of supply held by the ten largest holders, percent
    pub top10_concentration: f64,
    /// Share of supply held by the creator, percent
    pub creator_holding: f64,
    /// Gini coefficient of holder balances (0-1)
    pub gini: f64,

    // ===== Flow =====
    pub buy_sell_ratio: f64,
    pub unique_buyers_1h: u32,
    /// Estimated share of volume that is wash trading, percent
    pub wash_trade_likelihood: f64,
    /// Base-currency reserve backing the curve
    pub liquidity: f64,
    #[serde(default)]
    pub market_cap: f64,
    /// Price change over the last hour, percent
    pub price_change_1h: f64,

    #[serde(default)]
    pub price_history: PriceHistory,
}

impl MarketSnapshot {
    /// Reject snapshots with missing or out-of-range fields
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.asset_id.trim().is_empty() {
            return Err(SnapshotError::MissingField("asset_id"));
        }

        let finite = [
            ("graduation_progress", self.graduation_progress),
            ("progress_change_1h", self.progress_change_1h),
            ("volume_5m", self.volume_5m),
            ("volume_1h", self.volume_1h),
            ("volume_24h", self.volume_24h),
            ("volume_acceleration", self.volume_acceleration),
            ("holder_growth_1h", self.holder_growth_1h),
            ("top10_concentration", self.top10_concentration),
            ("creator_holding", self.creator_holding),
            ("gini", self.gini),
            ("buy_sell_ratio", self.buy_sell_ratio),
            ("wash_trade_likelihood", self.wash_trade_likelihood),
            ("liquidity", self.liquidity),
            ("market_cap", self.market_cap),
            ("price_change_1h", self.price_change_1h),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(SnapshotError::NotFinite(field));
            }
        }

        let non_negative = [
            ("volume_5m", self.volume_5m),
            ("volume_1h", self.volume_1h),
            ("volume_24h", self.volume_24h),
            ("volume_acceleration", self.volume_acceleration),
            ("buy_sell_ratio", self.buy_sell_ratio),
            ("liquidity", self.liquidity),
            ("market_cap", self.market_cap),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(SnapshotError::OutOfRange { field, value });
            }
        }

        let percents = [
            ("graduation_progress", self.graduation_progress),
            ("top10_concentration", self.top10_concentration),
            ("creator_holding", self.creator_holding),
            ("wash_trade_likelihood", self.wash_trade_likelihood),
        ];
        for (field, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                return Err(SnapshotError::OutOfRange { field, value });
            }
        }

        if !(0.0..=1.0).contains(&self.gini) {
            return Err(SnapshotError::OutOfRange {
                field: "gini",
                value: self.gini,
            });
        }

        // A price can fall at most 100%
        if self.price_change_1h < -100.0 {
            return Err(SnapshotError::OutOfRange {
                field: "price_change_1h",
                value: self.price_change_1h,
            });
        }

        if !self.price_history.is_ordered() {
            return Err(SnapshotError::UnorderedHistory);
        }
        if self
            .price_history
            .iter()
            .any(|p| !p.price.is_finite() || p.price < 0.0)
        {
            return Err(SnapshotError::OutOfRange {
                field: "price_history",
                value: -1.0,
            });
        }

        Ok(())
    }

    /// Average trade size over the last hour
    pub fn avg_trade_size_1h(&self) -> Option<f64> {
        if self.trades_1h == 0 {
            None
        } else {
            Some(self.volume_1h / self.trades_1h as f64)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Healthy near-graduation token
    pub fn healthy_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            asset_id: "Mint111".to_string(),
            graduation_progress: 90.0,
            progress_change_1h: 12.0,
            volume_5m: 1.5,
            volume_1h: 12.0,
            volume_24h: 40.0,
            trades_5m: 25,
            trades_1h: 220,
            volume_acceleration: 1.5,
            holder_count: 150,
            holder_growth_1h: 30.0,
            top10_concentration: 25.0,
            creator_holding: 3.0,
            gini: 0.55,
            buy_sell_ratio: 2.2,
            unique_buyers_1h: 20,
            wash_trade_likelihood: 10.0,
            liquidity: 70.0,
            market_cap: 300.0,
            price_change_1h: 60.0,
            price_history: PriceHistory::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::healthy_snapshot;
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = PriceHistory::with_capacity(3);
        for i in 0..5 {
            assert!(history.push(PricePoint { timestamp: ts(i * 60), price: 1.0 + i as f64 }));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.oldest().unwrap().price, 3.0);
        assert_eq!(history.latest().unwrap().price, 5.0);
    }

    #[test]
    fn test_history_refuses_non_monotonic_point() {
        let mut history = PriceHistory::with_capacity(10);
        assert!(history.push(PricePoint { timestamp: ts(60), price: 1.0 }));
        assert!(!history.push(PricePoint { timestamp: ts(60), price: 2.0 }));
        assert!(!history.push(PricePoint { timestamp: ts(0), price: 2.0 }));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_change_pct_over_window() {
        let mut history = PriceHistory::with_capacity(10);
        history.push(PricePoint { timestamp: ts(0), price: 1.0 });
        history.push(PricePoint { timestamp: ts(1800), price: 1.2 });
        history.push(PricePoint { timestamp: ts(3600), price: 1.5 });

        let change = history.change_pct_over(3600).unwrap();
        assert!((change - 50.0).abs() < 1e-9);

        let change = history.change_pct_over(1800).unwrap();
        assert!((change - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_valid_snapshot() {
        assert!(healthy_snapshot().validate().is_ok());
    }

    #[test]
    fn test_rejects_missing_asset() {
        let mut snapshot = healthy_snapshot();
        snapshot.asset_id = "  ".to_string();
        assert_eq!(snapshot.validate(), Err(SnapshotError::MissingField("asset_id")));
    }

    #[test]
    fn test_rejects_nan() {
        let mut snapshot = healthy_snapshot();
        snapshot.volume_1h = f64::NAN;
        assert_eq!(snapshot.validate(), Err(SnapshotError::NotFinite("volume_1h")));
    }

    #[test]
    fn test_rejects_out_of_range_percent() {
        let mut snapshot = healthy_snapshot();
        snapshot.top10_concentration = 120.0;
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::OutOfRange { field: "top10_concentration", .. })
        ));

        let mut snapshot = healthy_snapshot();
        snapshot.gini = 1.5;
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_avg_trade_size() {
        let snapshot = healthy_snapshot();
        assert!((snapshot.avg_trade_size_1h().unwrap() - 12.0 / 220.0).abs() < 1e-12);

        let mut empty = healthy_snapshot();
        empty.trades_1h = 0;
        assert!(empty.avg_trade_size_1h().is_none());
    }
}
