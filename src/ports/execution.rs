use async_trait::async_trait;
use thiserror::Error;

use crate::domain::intent::{ExecutionConfirmation, TradeIntent};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Execution venue unavailable: {0}")]
    Unavailable(String),
    #[error("Swap rejected: {0}")]
    Rejected(String),
    #[error("Slippage tolerance of {max_bps} bps exceeded")]
    SlippageExceeded { max_bps: u16 },
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Executes trade intents. Implementations build, sign and submit the swap;
/// the engine only sees the resulting confirmation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    /// Attempt an intent once. A venue-level failure may come back either as
    /// `Err` or as a confirmation with `success = false`.
    async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionConfirmation, ExecutionError>;
}

/// Execute once and fold errors into a failed confirmation
pub async fn execute_or_fail(port: &dyn ExecutionPort, intent: &TradeIntent) -> ExecutionConfirmation {
    match port.execute(intent).await {
        Ok(confirmation) => confirmation,
        Err(e) => ExecutionConfirmation::failed(intent.id(), e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::{EntryIntent, IntentId, Urgency};
    use chrono::Utc;

    fn entry() -> TradeIntent {
        TradeIntent::Entry(EntryIntent {
            intent_id: IntentId(9),
            asset_id: "Mint111".to_string(),
            requested_amount: 0.3,
            max_slippage_bps: 500,
            urgency: Urgency::Normal,
            attempt: 1,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_execute_or_fail_folds_errors() {
        let mut port = MockExecutionPort::new();
        port.expect_execute()
            .returning(|_| Err(ExecutionError::Unavailable("rpc down".to_string())));

        let confirmation = execute_or_fail(&port, &entry()).await;
        assert!(!confirmation.success);
        assert_eq!(confirmation.intent_id, IntentId(9));
        assert!(confirmation.error.unwrap().contains("rpc down"));
    }

    #[tokio::test]
    async fn test_execute_or_fail_passes_confirmation() {
        let mut port = MockExecutionPort::new();
        port.expect_execute()
            .times(1)
            .returning(|intent| Ok(ExecutionConfirmation::filled(intent.id(), 1000.0, 0.0003)));

        let confirmation = execute_or_fail(&port, &entry()).await;
        assert!(confirmation.success);
        assert_eq!(confirmation.filled_amount, 1000.0);
    }
}
