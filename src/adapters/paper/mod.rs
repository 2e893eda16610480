//! Paper Execution Adapter
//!
//! Simulates fills against the last price seen for each asset. Used by the
//! `simulate` command and for dry runs. Fill prices move against the trader
//! by a random amount bounded by half the intent's slippage ceiling.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::domain::intent::{ExecutionConfirmation, TradeIntent};
use crate::ports::execution::{ExecutionError, ExecutionPort};

/// Running totals for a paper session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperStats {
    pub attempts: u32,
    pub fills: u32,
    pub failures: u32,
    /// Base currency spent on entries
    pub spent: f64,
    /// Base currency received from exits
    pub received: f64,
}

impl PaperStats {
    /// Net base-currency result of everything filled so far
    pub fn net(&self) -> f64 {
        self.received - self.spent
    }
}

pub struct PaperExecution {
    prices: Mutex<HashMap<String, f64>>,
    rng: Mutex<StdRng>,
    failure_rate: f64,
    stats: Mutex<PaperStats>,
}

impl PaperExecution {
    /// `seed` makes fills reproducible; `None` seeds from the OS.
    pub fn new(failure_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            prices: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
            failure_rate: failure_rate.clamp(0.0, 1.0),
            stats: Mutex::new(PaperStats::default()),
        }
    }

    /// Update the reference price used for subsequent fills
    pub async fn set_price(&self, asset_id: &str, price: f64) {
        self.prices.lock().await.insert(asset_id.to_string(), price);
    }

    pub async fn stats(&self) -> PaperStats {
        self.stats.lock().await.clone()
    }
}

#[async_trait]
impl ExecutionPort for PaperExecution {
    async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionConfirmation, ExecutionError> {
        let price = self
            .prices
            .lock()
            .await
            .get(intent.asset_id())
            .copied()
            .ok_or_else(|| ExecutionError::Unavailable(format!("no price for {}", intent.asset_id())))?;
        if !price.is_finite() || price <= 0.0 {
            return Err(ExecutionError::InvalidParameters(format!("bad reference price {}", price)));
        }

        let (fails, slip) = {
            let mut rng = self.rng.lock().await;
            let fails = rng.gen::<f64>() < self.failure_rate;
            let ceiling = intent.max_slippage_bps() as f64 / 10_000.0 / 2.0;
            (fails, rng.gen_range(0.0..=ceiling))
        };

        let mut stats = self.stats.lock().await;
        stats.attempts += 1;
        if fails {
            stats.failures += 1;
            tracing::debug!(intent = %intent.id(), attempt = intent.attempt(), "Paper fill failed");
            return Ok(ExecutionConfirmation::failed(intent.id(), "simulated route failure"));
        }

        let confirmation = match intent {
            TradeIntent::Entry(entry) => {
                let fill_price = price * (1.0 + slip);
                stats.spent += entry.requested_amount;
                ExecutionConfirmation::filled(intent.id(), entry.requested_amount / fill_price, fill_price)
            }
            TradeIntent::Exit(exit) => {
                let fill_price = price * (1.0 - slip);
                stats.received += exit.amount * fill_price;
                ExecutionConfirmation::filled(intent.id(), exit.amount, fill_price)
            }
        };
        stats.fills += 1;

        tracing::info!(
            intent = %intent.id(),
            asset = %intent.asset_id(),
            price = confirmation.fill_price,
            amount = confirmation.filled_amount,
            "Paper fill"
        );
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::{EntryIntent, ExitIntent, ExitReason, IntentId, PositionId, Urgency};
    use chrono::Utc;

    fn entry(bps: u16) -> TradeIntent {
        TradeIntent::Entry(EntryIntent {
            intent_id: IntentId(1),
            asset_id: "Mint111".to_string(),
            requested_amount: 0.5,
            max_slippage_bps: bps,
            urgency: Urgency::Normal,
            attempt: 1,
            created_at: Utc::now(),
        })
    }

    fn exit() -> TradeIntent {
        TradeIntent::Exit(ExitIntent {
            intent_id: IntentId(2),
            position_id: PositionId(1),
            asset_id: "Mint111".to_string(),
            fraction: 0.4,
            amount: 100.0,
            max_slippage_bps: 800,
            urgency: Urgency::Normal,
            reason: ExitReason::Partial1,
            attempt: 1,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_entry_fill_within_slippage() {
        let paper = PaperExecution::new(0.0, Some(7));
        paper.set_price("Mint111", 0.002).await;

        let conf = paper.execute(&entry(1000)).await.unwrap();
        assert!(conf.success);
        assert!(conf.fill_price >= 0.002);
        assert!(conf.fill_price <= 0.002 * 1.05 + 1e-12);
        assert!((conf.filled_amount * conf.fill_price - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_exit_fills_requested_amount() {
        let paper = PaperExecution::new(0.0, Some(7));
        paper.set_price("Mint111", 0.004).await;

        let conf = paper.execute(&exit()).await.unwrap();
        assert!(conf.success);
        assert_eq!(conf.filled_amount, 100.0);
        assert!(conf.fill_price <= 0.004);

        let stats = paper.stats().await;
        assert_eq!(stats.fills, 1);
        assert!(stats.received > 0.0);
    }

    #[tokio::test]
    async fn test_unknown_asset_is_unavailable() {
        let paper = PaperExecution::new(0.0, Some(1));
        let err = paper.execute(&entry(500)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_fails() {
        let paper = PaperExecution::new(1.0, Some(3));
        paper.set_price("Mint111", 0.002).await;

        let conf = paper.execute(&entry(500)).await.unwrap();
        assert!(!conf.success);
        assert_eq!(paper.stats().await.failures, 1);
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let a = PaperExecution::new(0.0, Some(42));
        let b = PaperExecution::new(0.0, Some(42));
        a.set_price("Mint111", 0.002).await;
        b.set_price("Mint111", 0.002).await;

        let fa = a.execute(&entry(2000)).await.unwrap();
        let fb = b.execute(&entry(2000)).await.unwrap();
        assert_eq!(fa.fill_price, fb.fill_price);
    }

    #[test]
    fn test_exit_without_price_is_not_counted() {
        let paper = PaperExecution::new(0.0, None);
        let result = tokio_test::block_on(paper.execute(&exit()));
        assert!(matches!(result, Err(ExecutionError::Unavailable(_))));
        assert_eq!(tokio_test::block_on(paper.stats()).attempts, 0);
    }
}
