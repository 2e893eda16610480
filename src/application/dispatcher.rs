//! Intent Dispatcher
//!
//! Drains the lifecycle manager's outbound channel, hands each intent to the
//! execution port and feeds the confirmation back. Retries re-enter the same
//! channel, so they are picked up by the same loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::lifecycle::{ConfirmationOutcome, LifecycleManager};
use crate::domain::intent::TradeIntent;
use crate::ports::execution::{execute_or_fail, ExecutionPort};

pub struct Dispatcher {
    manager: Arc<LifecycleManager>,
    port: Arc<dyn ExecutionPort>,
    intents: mpsc::Receiver<TradeIntent>,
}

impl Dispatcher {
    pub fn new(manager: Arc<LifecycleManager>, port: Arc<dyn ExecutionPort>, intents: mpsc::Receiver<TradeIntent>) -> Self {
        Self { manager, port, intents }
    }

    /// Process intents until the manager is dropped
    pub async fn run(mut self) {
        tracing::info!("Dispatcher started");
        while let Some(intent) = self.intents.recv().await {
            self.process(intent, Utc::now()).await;
        }
        tracing::info!("Dispatcher stopped: intent channel closed");
    }

    /// Process everything queued right now, including retries queued along
    /// the way. Returns the confirmation outcomes in order.
    pub async fn drain(&mut self, now: DateTime<Utc>) -> Vec<ConfirmationOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(intent) = self.intents.try_recv() {
            if let Some(outcome) = self.process(intent, now).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    async fn process(&self, intent: TradeIntent, now: DateTime<Utc>) -> Option<ConfirmationOutcome> {
        tracing::debug!(
            intent = %intent.id(),
            asset = %intent.asset_id(),
            attempt = intent.attempt(),
            slippage_bps = intent.max_slippage_bps(),
            "Dispatching intent"
        );
        let confirmation = execute_or_fail(self.port.as_ref(), &intent).await;
        match self.manager.handle_confirmation(confirmation, now).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::error!(intent = %intent.id(), error = %e, "Confirmation not applied");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lifecycle::LifecycleConfig;
    use crate::domain::portfolio::{PortfolioState, RiskFlags};
    use crate::domain::snapshot::fixtures::healthy_snapshot;
    use crate::ports::audit::NullAuditSink;
    use crate::ports::mocks::{ScriptedExecution, ScriptedFill};

    #[tokio::test]
    async fn test_drain_opens_position() {
        let (manager, rx) = LifecycleManager::new(LifecycleConfig::default(), Arc::new(NullAuditSink));
        let manager = Arc::new(manager);
        let port = ScriptedExecution::new().then(ScriptedFill::FillAt(0.001));
        let mut dispatcher = Dispatcher::new(Arc::clone(&manager), Arc::new(port.clone()), rx);

        let now = Utc::now();
        manager
            .evaluate_signal(&healthy_snapshot(), &PortfolioState::new(10.0), RiskFlags::default(), now)
            .await;
        let outcomes = dispatcher.drain(now).await;

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], ConfirmationOutcome::Opened(_)));
        assert_eq!(port.calls().len(), 1);
        let positions = manager.open_positions().await;
        assert_eq!(positions.len(), 1);
        assert!((positions[0].original_amount - 225.0).abs() < 1e-6);
    }
}
