//! Audit Port
//!
//! Observational event stream. Sinks must not block and must not feed back
//! into decisions.

use serde::Serialize;

use crate::domain::intent::{ExitReason, IntentId, PositionId, Urgency};
use crate::strategy::scorer::{Recommendation, WeightProfile};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    ScoreComputed {
        asset_id: String,
        score: f64,
        recommendation: Recommendation,
        profile: WeightProfile,
        rejected: bool,
    },
    EntryRequested {
        intent_id: IntentId,
        asset_id: String,
        amount: f64,
        urgency: Urgency,
    },
    EntrySkipped {
        asset_id: String,
        reason: String,
    },
    PositionOpened {
        position_id: PositionId,
        asset_id: String,
        entry_price: f64,
        amount: f64,
    },
    ExitMatched {
        intent_id: IntentId,
        position_id: PositionId,
        reason: ExitReason,
        fraction: f64,
        amount: f64,
        urgency: Urgency,
        slippage_bps: u16,
        pnl_pct: f64,
    },
    PhaseCompleted {
        position_id: PositionId,
        reason: ExitReason,
        amount: f64,
        price: f64,
        remaining: f64,
    },
    IntentRetried {
        intent_id: IntentId,
        attempt: u8,
        urgency: Urgency,
        slippage_bps: u16,
        error: String,
    },
    IntentAbandoned {
        intent_id: IntentId,
        asset_id: String,
        attempts: u8,
        error: String,
    },
    SampleRejected {
        position_id: PositionId,
        error: String,
    },
    PositionFrozen {
        position_id: PositionId,
        reason: String,
    },
    PositionClosed {
        position_id: PositionId,
        asset_id: String,
        realized_pnl: f64,
    },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::ScoreComputed { .. } => "score_computed",
            AuditEvent::EntryRequested { .. } => "entry_requested",
            AuditEvent::EntrySkipped { .. } => "entry_skipped",
            AuditEvent::PositionOpened { .. } => "position_opened",
            AuditEvent::ExitMatched { .. } => "exit_matched",
            AuditEvent::PhaseCompleted { .. } => "phase_completed",
            AuditEvent::IntentRetried { .. } => "intent_retried",
            AuditEvent::IntentAbandoned { .. } => "intent_abandoned",
            AuditEvent::SampleRejected { .. } => "sample_rejected",
            AuditEvent::PositionFrozen { .. } => "position_frozen",
            AuditEvent::PositionClosed { .. } => "position_closed",
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events as structured logs under the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| format!("{:?}", event));
        match &event {
            AuditEvent::IntentAbandoned { .. } | AuditEvent::PositionFrozen { .. } => {
                tracing::warn!(target: "audit", event = event.name(), %payload);
            }
            AuditEvent::SampleRejected { .. } | AuditEvent::ScoreComputed { .. } => {
                tracing::debug!(target: "audit", event = event.name(), %payload);
            }
            _ => {
                tracing::info!(target: "audit", event = event.name(), %payload);
            }
        }
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = AuditEvent::PositionFrozen {
            position_id: PositionId(4),
            reason: "overfill".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "position_frozen");
        assert_eq!(json["position_id"], 4);
        assert_eq!(event.name(), "position_frozen");
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        TracingAuditSink.record(AuditEvent::EntrySkipped {
            asset_id: "Mint111".to_string(),
            reason: "paused".to_string(),
        });
    }
}
