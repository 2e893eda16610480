//! Retry policy for failed executions
//!
//! Exits are re-requested with escalated urgency and the emergency slippage
//! ceiling until `MAX_ATTEMPTS` is reached. Failed entries are abandoned
//! on the first failure.

use chrono::{DateTime, Utc};

use crate::domain::intent::{PositionId, TradeIntent, MAX_ATTEMPTS};
use crate::strategy::slippage::EMERGENCY_BPS;

/// An intent handed to execution and not yet resolved
#[derive(Debug, Clone)]
pub struct PendingIntent {
    pub intent: TradeIntent,
    /// Set for exits
    pub position_id: Option<PositionId>,
    pub first_sent_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl PendingIntent {
    pub fn new(intent: TradeIntent, now: DateTime<Utc>) -> Self {
        let position_id = match &intent {
            TradeIntent::Exit(exit) => Some(exit.position_id),
            TradeIntent::Entry(_) => None,
        };
        Self {
            intent,
            position_id,
            first_sent_at: now,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(TradeIntent),
    Abandon,
}

/// What to do after a failed attempt of `intent`
pub fn next_attempt(intent: &TradeIntent) -> RetryDecision {
    match intent {
        TradeIntent::Entry(_) => RetryDecision::Abandon,
        TradeIntent::Exit(exit) if exit.attempt >= MAX_ATTEMPTS => RetryDecision::Abandon,
        TradeIntent::Exit(exit) => {
            let mut retry = exit.clone();
            retry.attempt += 1;
            retry.urgency = exit.urgency.escalate();
            retry.max_slippage_bps = EMERGENCY_BPS;
            RetryDecision::Retry(TradeIntent::Exit(retry))
        }
    }
}
