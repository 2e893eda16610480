use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::audit::{AuditEvent, AuditSink};
use super::execution::{ExecutionError, ExecutionPort};
use crate::domain::intent::{ExecutionConfirmation, TradeIntent};

/// Audit sink that keeps every event for later inspection
#[derive(Debug, Default, Clone)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Recorded events with the given name, e.g. "exit_matched"
    pub fn named(&self, name: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == name)
            .collect()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Scripted outcome for one execution attempt
#[derive(Debug, Clone)]
pub enum ScriptedFill {
    /// Fill the requested amount at this price
    FillAt(f64),
    /// Fill an explicit amount at this price
    Exact { amount: f64, price: f64 },
    Fail(String),
}

/// Execution port that replays scripted outcomes and records every call.
/// Once the script runs out, every attempt fails.
#[derive(Debug, Default, Clone)]
pub struct ScriptedExecution {
    calls: Arc<Mutex<Vec<TradeIntent>>>,
    script: Arc<Mutex<VecDeque<ScriptedFill>>>,
}

impl ScriptedExecution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to queue the next outcome
    pub fn then(self, fill: ScriptedFill) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(fill);
        }
        self
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<TradeIntent> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionPort for ScriptedExecution {
    async fn execute(&self, intent: &TradeIntent) -> Result<ExecutionConfirmation, ExecutionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(intent.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());

        match next {
            Some(ScriptedFill::FillAt(price)) => {
                let amount = match intent {
                    // Entry buys tokens with base currency
                    TradeIntent::Entry(entry) => entry.requested_amount / price,
                    TradeIntent::Exit(exit) => exit.amount,
                };
                Ok(ExecutionConfirmation::filled(intent.id(), amount, price))
            }
            Some(ScriptedFill::Exact { amount, price }) => {
                Ok(ExecutionConfirmation::filled(intent.id(), amount, price))
            }
            Some(ScriptedFill::Fail(reason)) => Ok(ExecutionConfirmation::failed(intent.id(), reason)),
            None => Err(ExecutionError::Unavailable("script exhausted".to_string())),
        }
    }
}
