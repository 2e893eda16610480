//! Snapshot Normalizer
//!
//! Turns raw venue data (bonding curve reserves, trade tape, holder list and
//! price history) into a fixed-shape `MarketSnapshot`.
//!
//! Graduation happens at roughly 85 SOL of real reserves on the bonding curve,
//! so progress is measured against that threshold unless configured otherwise.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::snapshot::{MarketSnapshot, PriceHistory, PricePoint, SnapshotError, DEFAULT_PRICE_LOOKBACK};

/// Real SOL reserves at which a curve graduates
pub const DEFAULT_GRADUATION_SOL: f64 = 85.0;

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Buy/sell ratio reported when there was buying but no selling
pub const BUY_SELL_RATIO_CAP: f64 = 10.0;

/// A single trade from the venue tape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueTrade {
    pub timestamp: DateTime<Utc>,
    pub trader: String,
    pub is_buy: bool,
    /// Trade size in SOL
    pub sol_amount: f64,
}

/// A holder balance from the venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderBalance {
    pub address: String,
    pub amount: u64,
    #[serde(default)]
    pub is_creator: bool,
}

/// Raw per-asset data pushed in by the ingestion collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVenueData {
    pub mint: String,
    /// Real SOL reserves on the bonding curve, in lamports
    pub real_sol_reserves: u64,
    #[serde(default)]
    pub token_total_supply: u64,
    #[serde(default)]
    pub market_cap_sol: f64,
    #[serde(default)]
    pub trades: Vec<VenueTrade>,
    #[serde(default)]
    pub holders: Vec<HolderBalance>,
    /// Holder count one hour ago, if known
    #[serde(default)]
    pub holder_count_1h_ago: Option<u32>,
    /// Graduation progress one hour ago, if known
    #[serde(default)]
    pub progress_1h_ago: Option<f64>,
    #[serde(default)]
    pub price_history: Vec<PricePoint>,
}

/// Normalizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_graduation_sol")]
    pub graduation_sol: f64,
    #[serde(default = "default_price_lookback")]
    pub price_lookback: usize,
}

fn default_graduation_sol() -> f64 { DEFAULT_GRADUATION_SOL }
fn default_price_lookback() -> usize { DEFAULT_PRICE_LOOKBACK }

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            graduation_sol: default_graduation_sol(),
            price_lookback: default_price_lookback(),
        }
    }
}

#[derive(Debug, Default)]
struct WindowStats {
    volume: f64,
    trades: u32,
}

/// Stateless raw-data -> snapshot converter
#[derive(Debug, Clone, Default)]
pub struct SnapshotNormalizer {
    config: NormalizerConfig,
}

impl SnapshotNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Build a validated snapshot as of `now`
    pub fn normalize(&self, raw: &RawVenueData, now: DateTime<Utc>) -> Result<MarketSnapshot, SnapshotError> {
        if raw.mint.trim().is_empty() {
            return Err(SnapshotError::MissingField("mint"));
        }
        if self.config.graduation_sol <= 0.0 {
            return Err(SnapshotError::OutOfRange {
                field: "graduation_sol",
                value: self.config.graduation_sol,
            });
        }

        let liquidity = raw.real_sol_reserves as f64 / LAMPORTS_PER_SOL;
        let graduation_progress = (liquidity / self.config.graduation_sol * 100.0).min(100.0);

        let window_5m = window(&raw.trades, now, Duration::minutes(5));
        let window_1h = window(&raw.trades, now, Duration::hours(1));
        let window_24h = window(&raw.trades, now, Duration::hours(24));

        let volume_acceleration = if window_1h.volume > f64::EPSILON {
            // 12 five-minute buckets per hour
            window_5m.volume * 12.0 / window_1h.volume
        } else {
            0.0
        };

        let recent: Vec<&VenueTrade> = raw
            .trades
            .iter()
            .filter(|t| t.timestamp > now - Duration::hours(1) && t.timestamp <= now)
            .collect();

        let (top10_concentration, creator_holding, gini) = holder_distribution(raw);

        let holder_count = raw.holders.iter().filter(|h| h.amount > 0).count() as u32;
        let holder_growth_1h = match raw.holder_count_1h_ago {
            Some(before) if before > 0 => (holder_count as f64 - before as f64) / before as f64 * 100.0,
            _ => 0.0,
        };

        let mut price_history = PriceHistory::with_capacity(self.config.price_lookback);
        for point in &raw.price_history {
            // Out-of-order points are dropped rather than reordered
            price_history.push(*point);
        }
        let price_change_1h = price_history.change_pct_over(3600).unwrap_or(0.0);

        let snapshot = MarketSnapshot {
            asset_id: raw.mint.clone(),
            graduation_progress,
            progress_change_1h: raw
                .progress_1h_ago
                .map(|before| graduation_progress - before)
                .unwrap_or(0.0),
            volume_5m: window_5m.volume,
            volume_1h: window_1h.volume,
            volume_24h: window_24h.volume,
            trades_5m: window_5m.trades,
            trades_1h: window_1h.trades,
            volume_acceleration,
            holder_count,
            holder_growth_1h,
            top10_concentration,
            creator_holding,
            gini,
            buy_sell_ratio: buy_sell_ratio(&recent),
            unique_buyers_1h: recent
                .iter()
                .filter(|t| t.is_buy)
                .map(|t| t.trader.as_str())
                .collect::<HashSet<_>>()
                .len() as u32,
            wash_trade_likelihood: wash_trade_likelihood(&recent),
            liquidity,
            market_cap: raw.market_cap_sol,
            price_change_1h: price_change_1h.max(-100.0),
            price_history,
        };

        snapshot.validate()?;
        Ok(snapshot)
    }
}

fn window(trades: &[VenueTrade], now: DateTime<Utc>, span: Duration) -> WindowStats {
    let cutoff = now - span;
    trades
        .iter()
        .filter(|t| t.timestamp > cutoff && t.timestamp <= now)
        .fold(WindowStats::default(), |mut acc, t| {
            acc.volume += t.sol_amount.max(0.0);
            acc.trades += 1;
            acc
        })
}

fn buy_sell_ratio(trades: &[&VenueTrade]) -> f64 {
    let (buys, sells) = trades.iter().fold((0.0, 0.0), |(b, s), t| {
        if t.is_buy {
            (b + t.sol_amount, s)
        } else {
            (b, s + t.sol_amount)
        }
    });
    if sells <= f64::EPSILON {
        if buys > 0.0 { BUY_SELL_RATIO_CAP } else { 0.0 }
    } else {
        (buys / sells).min(BUY_SELL_RATIO_CAP)
    }
}

/// Share of volume (percent) generated by wallets that both bought and sold
fn wash_trade_likelihood(trades: &[&VenueTrade]) -> f64 {
    let mut sides: HashMap<&str, (bool, bool, f64)> = HashMap::new();
    let mut total = 0.0;
    for trade in trades {
        let entry = sides.entry(trade.trader.as_str()).or_insert((false, false, 0.0));
        if trade.is_buy {
            entry.0 = true;
        } else {
            entry.1 = true;
        }
        entry.2 += trade.sol_amount;
        total += trade.sol_amount;
    }
    if total <= f64::EPSILON {
        return 0.0;
    }
    let round_trip: f64 = sides
        .values()
        .filter(|(bought, sold, _)| *bought && *sold)
        .map(|(_, _, volume)| volume)
        .sum();
    (round_trip / total * 100.0).clamp(0.0, 100.0)
}

/// Returns (top-10 percent, creator percent, gini)
fn holder_distribution(raw: &RawVenueData) -> (f64, f64, f64) {
    let mut amounts: Vec<f64> = raw
        .holders
        .iter()
        .filter(|h| h.amount > 0)
        .map(|h| h.amount as f64)
        .collect();
    if amounts.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let held: f64 = amounts.iter().sum();
    let supply = if raw.token_total_supply > 0 {
        (raw.token_total_supply as f64).max(held)
    } else {
        held
    };

    amounts.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let top10: f64 = amounts.iter().take(10).sum();
    let creator: f64 = raw
        .holders
        .iter()
        .filter(|h| h.is_creator)
        .map(|h| h.amount as f64)
        .sum();

    amounts.reverse();
    let n = amounts.len() as f64;
    let mean = amounts.iter().mean();
    let gini = if n < 2.0 || mean <= 0.0 {
        0.0
    } else {
        let weighted: f64 = amounts
            .iter()
            .enumerate()
            .map(|(i, x)| (2.0 * (i as f64 + 1.0) - n - 1.0) * x)
            .sum();
        (weighted / (n * n * mean)).clamp(0.0, 1.0)
    };

    (
        (top10 / supply * 100.0).clamp(0.0, 100.0),
        (creator / supply * 100.0).clamp(0.0, 100.0),
        gini,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_003_600, 0).unwrap()
    }

    fn trade(mins_ago: i64, trader: &str, is_buy: bool, sol: f64) -> VenueTrade {
        VenueTrade {
            timestamp: now() - Duration::minutes(mins_ago),
            trader: trader.to_string(),
            is_buy,
            sol_amount: sol,
        }
    }

    fn holder(address: &str, amount: u64, is_creator: bool) -> HolderBalance {
        HolderBalance {
            address: address.to_string(),
            amount,
            is_creator,
        }
    }

    fn raw() -> RawVenueData {
        RawVenueData {
            mint: "Mint111".to_string(),
            real_sol_reserves: 76_500_000_000, // 76.5 SOL -> 90%
            token_total_supply: 1_000,
            market_cap_sol: 300.0,
            trades: vec![
                trade(2, "a", true, 1.0),
                trade(3, "b", true, 2.0),
                trade(30, "c", false, 1.0),
                trade(50, "d", true, 1.0),
                trade(120, "e", true, 5.0),
            ],
            holders: vec![
                holder("creator", 30, true),
                holder("h1", 100, false),
                holder("h2", 100, false),
            ],
            holder_count_1h_ago: Some(2),
            progress_1h_ago: Some(80.0),
            price_history: vec![
                PricePoint { timestamp: now() - Duration::minutes(60), price: 1.0 },
                PricePoint { timestamp: now(), price: 1.5 },
            ],
        }
    }

    #[test]
    fn test_graduation_progress() {
        let snapshot = SnapshotNormalizer::default().normalize(&raw(), now()).unwrap();
        assert!((snapshot.graduation_progress - 90.0).abs() < 1e-9);
        assert!((snapshot.progress_change_1h - 10.0).abs() < 1e-9);
        assert!((snapshot.liquidity - 76.5).abs() < 1e-9);
    }

    #[test]
    fn test_progress_caps_at_100() {
        let mut data = raw();
        data.real_sol_reserves = 200_000_000_000;
        let snapshot = SnapshotNormalizer::default().normalize(&data, now()).unwrap();
        assert_eq!(snapshot.graduation_progress, 100.0);
    }

    #[test]
    fn test_volume_windows() {
        let snapshot = SnapshotNormalizer::default().normalize(&raw(), now()).unwrap();
        assert!((snapshot.volume_5m - 3.0).abs() < 1e-9);
        assert!((snapshot.volume_1h - 5.0).abs() < 1e-9);
        assert!((snapshot.volume_24h - 10.0).abs() < 1e-9);
        assert_eq!(snapshot.trades_5m, 2);
        assert_eq!(snapshot.trades_1h, 4);
        // 3.0 * 12 / 5.0
        assert!((snapshot.volume_acceleration - 7.2).abs() < 1e-9);
    }

    #[test]
    fn test_flow_metrics() {
        let snapshot = SnapshotNormalizer::default().normalize(&raw(), now()).unwrap();
        assert_eq!(snapshot.unique_buyers_1h, 3);
        assert!((snapshot.buy_sell_ratio - 4.0).abs() < 1e-9);
        assert_eq!(snapshot.wash_trade_likelihood, 0.0);
    }

    #[test]
    fn test_wash_trading_detected() {
        let mut data = raw();
        data.trades = vec![
            trade(1, "w", true, 3.0),
            trade(2, "w", false, 3.0),
            trade(3, "x", true, 4.0),
        ];
        let snapshot = SnapshotNormalizer::default().normalize(&data, now()).unwrap();
        assert!((snapshot.wash_trade_likelihood - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_holder_distribution() {
        let snapshot = SnapshotNormalizer::default().normalize(&raw(), now()).unwrap();
        assert_eq!(snapshot.holder_count, 3);
        assert!((snapshot.holder_growth_1h - 50.0).abs() < 1e-9);
        // 230 of 1000 supply
        assert!((snapshot.top10_concentration - 23.0).abs() < 1e-9);
        assert!((snapshot.creator_holding - 3.0).abs() < 1e-9);
        assert!(snapshot.gini > 0.0 && snapshot.gini < 1.0);
    }

    #[test]
    fn test_equal_holders_have_zero_gini() {
        let mut data = raw();
        data.holders = (0..20).map(|i| holder(&format!("h{}", i), 50, false)).collect();
        let snapshot = SnapshotNormalizer::default().normalize(&data, now()).unwrap();
        assert!(snapshot.gini.abs() < 1e-9);
    }

    #[test]
    fn test_price_change_from_history() {
        let snapshot = SnapshotNormalizer::default().normalize(&raw(), now()).unwrap();
        assert!((snapshot.price_change_1h - 50.0).abs() < 1e-9);
        assert_eq!(snapshot.price_history.len(), 2);
    }

    #[test]
    fn test_empty_mint_rejected() {
        let mut data = raw();
        data.mint = String::new();
        assert!(SnapshotNormalizer::default().normalize(&data, now()).is_err());
    }
}
