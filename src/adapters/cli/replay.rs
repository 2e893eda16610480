//! Replay driver for the `simulate` command
//!
//! A replay file is a JSON list of timed steps. Each step may carry raw venue
//! data, ready-made snapshots and a price per asset. Steps run in order:
//! prices are published to the paper venue, signals are scored, queued
//! intents are executed, then open positions are ticked.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::paper::{PaperExecution, PaperStats};
use crate::application::{ConfirmationOutcome, Dispatcher, LifecycleConfig, LifecycleManager};
use crate::config::EngineConfig;
use crate::domain::normalizer::{RawVenueData, SnapshotNormalizer};
use crate::domain::portfolio::{PortfolioState, RiskFlags};
use crate::domain::snapshot::{MarketSnapshot, PricePoint};
use crate::ports::audit::AuditSink;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    #[serde(default = "default_wallet_balance")]
    pub wallet_balance: f64,
    pub steps: Vec<ReplayStep>,
}

fn default_wallet_balance() -> f64 { 10.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStep {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub raw: Vec<RawVenueData>,
    #[serde(default)]
    pub snapshots: Vec<MarketSnapshot>,
    #[serde(default)]
    pub prices: HashMap<String, f64>,
    #[serde(default)]
    pub flags: RiskFlags,
}

/// Result of a closed position
#[derive(Debug, Clone, Serialize)]
pub struct ClosedSummary {
    pub asset_id: String,
    pub entry_price: f64,
    pub realized_pnl: f64,
    pub exit_reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    pub steps: usize,
    pub scored: usize,
    pub rejected_raw: usize,
    pub entries_requested: usize,
    pub opened: usize,
    pub partial_fills: usize,
    pub closed: Vec<ClosedSummary>,
    pub retries: usize,
    pub abandoned: usize,
    pub still_open: usize,
    pub attempts: u32,
    pub net: f64,
}

impl SimulationSummary {
    fn absorb(&mut self, outcomes: Vec<ConfirmationOutcome>) {
        for outcome in outcomes {
            match outcome {
                ConfirmationOutcome::Opened(_) => self.opened += 1,
                ConfirmationOutcome::Filled { .. } => self.partial_fills += 1,
                ConfirmationOutcome::Closed(_) => {}
                ConfirmationOutcome::Retried { .. } => self.retries += 1,
                ConfirmationOutcome::Abandoned(_) => self.abandoned += 1,
            }
        }
    }

    fn finish(&mut self, stats: PaperStats) {
        self.attempts = stats.attempts;
        self.net = stats.net();
    }
}

/// Run a replay against the paper venue
pub async fn run_replay(
    config: &EngineConfig,
    replay: &Replay,
    audit: Arc<dyn AuditSink>,
    seed: Option<u64>,
) -> Result<SimulationSummary> {
    let paper = Arc::new(PaperExecution::new(
        config.execution.paper_failure_rate,
        seed.or(config.execution.paper_seed),
    ));
    let (manager, rx) = LifecycleManager::new(LifecycleConfig::from(config), audit);
    let manager = Arc::new(manager);
    let mut dispatcher = Dispatcher::new(Arc::clone(&manager), paper.clone(), rx);
    let normalizer = SnapshotNormalizer::new(config.normalizer.clone());

    let mut summary = SimulationSummary::default();
    let mut portfolio = PortfolioState::new(replay.wallet_balance);

    for step in &replay.steps {
        summary.steps += 1;
        for (asset, price) in &step.prices {
            paper.set_price(asset, *price).await;
        }

        let mut snapshots = step.snapshots.clone();
        for raw in &step.raw {
            match normalizer.normalize(raw, step.at) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    tracing::warn!(asset = %raw.mint, error = %e, "Raw data rejected");
                    summary.rejected_raw += 1;
                }
            }
        }

        for snapshot in &snapshots {
            if !step.prices.contains_key(&snapshot.asset_id) {
                if let Some(point) = snapshot.price_history.latest() {
                    paper.set_price(&snapshot.asset_id, point.price).await;
                }
            }
            portfolio.open_positions = manager.open_count().await;
            let outcome = manager.evaluate_signal(snapshot, &portfolio, step.flags, step.at).await;
            summary.scored += 1;
            if let Ok(entry) = &outcome.entry {
                summary.entries_requested += 1;
                portfolio.wallet_balance -= entry.requested_amount;
                portfolio.record_trade(&entry.asset_id, step.at);
            }
        }
        summary.absorb(dispatcher.drain(step.at).await);

        let points: HashMap<String, PricePoint> = step
            .prices
            .iter()
            .map(|(asset, price)| (asset.clone(), PricePoint { timestamp: step.at, price: *price }))
            .collect();
        let report = manager.tick(&points, step.at).await;
        tracing::debug!(
            at = %step.at,
            evaluated = report.evaluated,
            exits = report.exits.len(),
            rejected = report.rejected_samples,
            "Replay step ticked"
        );
        summary.absorb(dispatcher.drain(step.at).await);
    }

    summary.closed = manager
        .closed_positions()
        .await
        .into_iter()
        .map(|p| ClosedSummary {
            asset_id: p.asset_id.clone(),
            entry_price: p.entry_price,
            realized_pnl: p.realized_pnl(),
            exit_reasons: p.fills().iter().map(|f| f.reason.tag().to_string()).collect(),
        })
        .collect();
    summary.still_open = manager.open_count().await;
    summary.finish(paper.stats().await);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::fixtures::healthy_snapshot;
    use crate::ports::audit::NullAuditSink;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn step(secs: i64, price: f64) -> ReplayStep {
        let asset = healthy_snapshot().asset_id;
        ReplayStep {
            at: t0() + Duration::seconds(secs),
            raw: Vec::new(),
            snapshots: Vec::new(),
            prices: HashMap::from([(asset, price)]),
            flags: RiskFlags::default(),
        }
    }

    #[tokio::test]
    async fn test_replay_enters_and_stops_out() {
        let mut first = step(0, 0.001);
        first.snapshots.push(healthy_snapshot());
        let replay = Replay {
            wallet_balance: 10.0,
            steps: vec![first, step(30, 0.0011), step(60, 0.0006)],
        };

        let summary = run_replay(&EngineConfig::default(), &replay, Arc::new(NullAuditSink), Some(9))
            .await
            .unwrap();

        assert_eq!(summary.steps, 3);
        assert_eq!(summary.entries_requested, 1);
        assert_eq!(summary.opened, 1);
        assert_eq!(summary.closed.len(), 1);
        assert_eq!(summary.closed[0].exit_reasons, vec!["stop_loss".to_string()]);
        assert!(summary.closed[0].realized_pnl < 0.0);
        assert_eq!(summary.still_open, 0);
        assert!(summary.net < 0.0);
    }

    #[test]
    fn test_replay_parses_minimal_json() {
        let json = r#"{"steps":[{"at":"2024-01-01T00:00:00Z","prices":{"Mint111":0.002}}]}"#;
        let replay: Replay = serde_json::from_str(json).unwrap();
        assert_eq!(replay.wallet_balance, 10.0);
        assert_eq!(replay.steps[0].prices["Mint111"], 0.002);
        assert!(replay.steps[0].snapshots.is_empty());
    }
}
