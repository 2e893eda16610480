//! Position Lifecycle Manager
//!
//! Owns every open position from entry confirmation to close:
//! - scores incoming snapshots and emits sized entry intents
//! - per tick, feeds price samples into each position's momentum buffer and
//!   evaluates the exit rule table, in parallel across positions
//! - applies execution confirmations to the fill ledger and retries failed
//!   exits with escalated urgency
//!
//! Each position sits behind its own async mutex so two ticks can never
//! evaluate the same position at once. An exit is claimed while that mutex
//! is held, so overlapping ticks cannot both sell the same phase. Intents leave through a bounded
//! channel; the manager never waits on execution.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinSet;

use super::retry::{self, PendingIntent, RetryDecision};
use crate::config::EngineConfig;
use crate::domain::intent::{
    EntryIntent, ExecutionConfirmation, ExitIntent, ExitReason, IntentId, PositionId, TradeIntent, Urgency,
};
use crate::domain::portfolio::{PortfolioState, RiskFlags};
use crate::domain::position::{Position, PositionError, Status};
use crate::domain::risk::RiskLimits;
use crate::domain::snapshot::{MarketSnapshot, PricePoint};
use crate::ports::audit::{AuditEvent, AuditSink};
use crate::strategy::exits::{self, ExitConfig, ExitDecision};
use crate::strategy::momentum::{self, MomentumBuffer, MomentumConfig, MomentumError};
use crate::strategy::scorer::{OpportunityScorer, Recommendation, ScoreResult, ScoringConfig};
use crate::strategy::sizer::{PositionSizer, SizingConfig, SizingRejection};
use crate::strategy::slippage;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Unknown intent: {0}")]
    UnknownIntent(IntentId),
    #[error("Unknown position: {0}")]
    UnknownPosition(PositionId),
    #[error("Exit already in flight for {0}")]
    ExitInFlight(PositionId),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error("Intent channel full, dropped {0}")]
    ChannelFull(IntentId),
    #[error("Intent channel closed")]
    ChannelClosed,
}

/// Immutable per-instance configuration
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub scoring: ScoringConfig,
    pub sizing: SizingConfig,
    pub limits: RiskLimits,
    pub momentum: MomentumConfig,
    /// Snapshotted onto each position at entry
    pub exit: ExitConfig,
    pub channel_capacity: usize,
    pub closed_history: usize,
}

impl From<&EngineConfig> for LifecycleConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            scoring: config.scoring_config(),
            sizing: config.sizing.clone(),
            limits: config.risk_limits(),
            momentum: config.momentum.clone(),
            exit: config.exit_config(),
            channel_capacity: config.execution.channel_capacity,
            closed_history: config.execution.closed_history,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Why a scored signal produced no entry
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotActionable(Recommendation),
    Paused,
    AlreadyHeld,
    Sizing(SizingRejection),
    Dispatch(LifecycleError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotActionable(rec) => write!(f, "not actionable ({})", rec),
            SkipReason::Paused => write!(f, "entries paused"),
            SkipReason::AlreadyHeld => write!(f, "asset already held or entry pending"),
            SkipReason::Sizing(rejection) => write!(f, "{}", rejection),
            SkipReason::Dispatch(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalOutcome {
    pub score: ScoreResult,
    pub entry: Result<EntryIntent, SkipReason>,
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub evaluated: usize,
    pub exits: Vec<ExitIntent>,
    pub rejected_samples: usize,
    /// Positions whose exit evaluation was skipped because an exit is pending
    pub in_flight: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    Opened(PositionId),
    Filled { position_id: PositionId, status: Status },
    Closed(PositionId),
    Retried { intent_id: IntentId, attempt: u8 },
    Abandoned(IntentId),
}

#[derive(Debug, Clone)]
struct PositionHandle {
    asset_id: String,
    inner: Arc<Mutex<Position>>,
    /// Set under `inner`'s lock when an exit is emitted, cleared once it resolves
    exit_claimed: Arc<AtomicBool>,
}

/// Exit matched by a per-position task, not yet assigned an intent id
#[derive(Debug)]
struct ExitPlan {
    position_id: PositionId,
    asset_id: String,
    decision: ExitDecision,
    slippage_bps: u16,
}

#[derive(Debug)]
struct PositionTick {
    position_id: PositionId,
    exit_pending: bool,
    rejected_sample: Option<MomentumError>,
    plan: Option<ExitPlan>,
}

pub struct LifecycleManager {
    config: Arc<LifecycleConfig>,
    scorer: OpportunityScorer,
    sizer: PositionSizer,
    positions: RwLock<HashMap<PositionId, PositionHandle>>,
    closed: RwLock<VecDeque<Position>>,
    pending: Mutex<HashMap<IntentId, PendingIntent>>,
    abandoned: Mutex<Vec<PendingIntent>>,
    /// Entry times per asset, merged into the caller's portfolio for cooldowns
    recent_entries: Mutex<HashMap<String, DateTime<Utc>>>,
    paused: AtomicBool,
    next_intent_id: AtomicU64,
    next_position_id: AtomicU64,
    outbound: mpsc::Sender<TradeIntent>,
    audit: Arc<dyn AuditSink>,
}

impl LifecycleManager {
    /// Create a manager and the receiving end of its intent channel
    pub fn new(config: LifecycleConfig, audit: Arc<dyn AuditSink>) -> (Self, mpsc::Receiver<TradeIntent>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let manager = Self {
            scorer: OpportunityScorer::new(config.scoring.clone()),
            sizer: PositionSizer::new(config.sizing.clone(), config.limits.clone()),
            config: Arc::new(config),
            positions: RwLock::new(HashMap::new()),
            closed: RwLock::new(VecDeque::new()),
            pending: Mutex::new(HashMap::new()),
            abandoned: Mutex::new(Vec::new()),
            recent_entries: Mutex::new(HashMap::new()),
            paused: AtomicBool::new(false),
            next_intent_id: AtomicU64::new(1),
            next_position_id: AtomicU64::new(1),
            outbound: tx,
            audit,
        };
        (manager, rx)
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Stop producing entries. Exit evaluation continues.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::warn!("Entries paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!("Entries resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn next_intent_id(&self) -> IntentId {
        IntentId(self.next_intent_id.fetch_add(1, Ordering::Relaxed))
    }

    fn next_position_id(&self) -> PositionId {
        PositionId(self.next_position_id.fetch_add(1, Ordering::Relaxed))
    }

    // ===== Entries =====

    /// Score a snapshot and, if actionable, size and emit an entry intent
    pub async fn evaluate_signal(
        &self,
        snapshot: &MarketSnapshot,
        portfolio: &PortfolioState,
        flags: RiskFlags,
        now: DateTime<Utc>,
    ) -> SignalOutcome {
        let score = self.scorer.score_default(snapshot);
        self.audit.record(AuditEvent::ScoreComputed {
            asset_id: score.asset_id.clone(),
            score: score.score,
            recommendation: score.recommendation,
            profile: score.profile,
            rejected: score.is_rejected(),
        });

        let entry = self.try_enter(&score, portfolio, flags, now).await;
        match &entry {
            Ok(intent) => {
                tracing::info!(
                    asset = %intent.asset_id,
                    intent = %intent.intent_id,
                    score = score.score,
                    amount = intent.requested_amount,
                    "Entry requested"
                );
                self.audit.record(AuditEvent::EntryRequested {
                    intent_id: intent.intent_id,
                    asset_id: intent.asset_id.clone(),
                    amount: intent.requested_amount,
                    urgency: intent.urgency,
                });
            }
            Err(SkipReason::NotActionable(_)) => {}
            Err(reason) => {
                tracing::debug!(asset = %score.asset_id, %reason, "Entry skipped");
                self.audit.record(AuditEvent::EntrySkipped {
                    asset_id: score.asset_id.clone(),
                    reason: reason.to_string(),
                });
            }
        }

        SignalOutcome { score, entry }
    }

    async fn try_enter(
        &self,
        score: &ScoreResult,
        portfolio: &PortfolioState,
        flags: RiskFlags,
        now: DateTime<Utc>,
    ) -> Result<EntryIntent, SkipReason> {
        if !score.recommendation.is_actionable() {
            return Err(SkipReason::NotActionable(score.recommendation));
        }
        if self.is_paused() {
            return Err(SkipReason::Paused);
        }
        if self.holds_asset(&score.asset_id).await {
            return Err(SkipReason::AlreadyHeld);
        }

        let mut view = portfolio.clone();
        view.open_positions = view.open_positions.max(self.exposure().await);
        for (asset, at) in self.recent_entries.lock().await.iter() {
            let last = view.last_trade_at.entry(asset.clone()).or_insert(*at);
            if *at > *last {
                *last = *at;
            }
        }

        let intent = self
            .sizer
            .size(self.next_intent_id(), score, &view, flags, now)
            .map_err(SkipReason::Sizing)?;

        let pending = PendingIntent::new(TradeIntent::Entry(intent.clone()), now);
        self.dispatch(pending).await.map_err(SkipReason::Dispatch)?;
        Ok(intent)
    }

    /// Open positions plus entries still awaiting confirmation
    async fn exposure(&self) -> usize {
        let open = self.positions.read().await.len();
        let entries = self
            .pending
            .lock()
            .await
            .values()
            .filter(|p| matches!(p.intent, TradeIntent::Entry(_)))
            .count();
        open + entries
    }

    async fn holds_asset(&self, asset_id: &str) -> bool {
        if self.positions.read().await.values().any(|h| h.asset_id == asset_id) {
            return true;
        }
        self.pending
            .lock()
            .await
            .values()
            .any(|p| matches!(&p.intent, TradeIntent::Entry(e) if e.asset_id == asset_id))
    }

    // ===== Ticks =====

    /// Feed the latest price per asset to every open position and emit exits.
    /// Positions are evaluated in parallel; each one is locked for the whole
    /// of its evaluation.
    pub async fn tick(&self, prices: &HashMap<String, PricePoint>, now: DateTime<Utc>) -> TickReport {
        let handles: Vec<(PositionId, PositionHandle)> = self
            .positions
            .read()
            .await
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect();

        let mut report = TickReport::default();
        let mut tasks = JoinSet::new();
        for (position_id, handle) in handles {
            let point = prices.get(&handle.asset_id).copied();
            let config = Arc::clone(&self.config);
            tasks.spawn(async move { evaluate_position(position_id, handle, point, config, now).await });
        }

        let mut plans = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.evaluated += 1;
                    if outcome.exit_pending {
                        report.in_flight += 1;
                    }
                    if let Some(err) = outcome.rejected_sample {
                        report.rejected_samples += 1;
                        tracing::debug!(position = %outcome.position_id, error = %err, "Price sample rejected");
                        self.audit.record(AuditEvent::SampleRejected {
                            position_id: outcome.position_id,
                            error: err.to_string(),
                        });
                    }
                    if let Some(plan) = outcome.plan {
                        plans.push(plan);
                    }
                }
                Err(e) => tracing::error!(error = %e, "Position evaluation task failed"),
            }
        }

        // Deterministic emission order regardless of task completion order
        plans.sort_by_key(|p| p.position_id);
        for plan in plans {
            match self.emit_exit(plan, now).await {
                Ok(intent) => report.exits.push(intent),
                Err(e) => tracing::warn!(error = %e, "Exit intent not dispatched"),
            }
        }

        report
    }

    async fn emit_exit(&self, plan: ExitPlan, now: DateTime<Utc>) -> Result<ExitIntent, LifecycleError> {
        let intent = ExitIntent {
            intent_id: self.next_intent_id(),
            position_id: plan.position_id,
            asset_id: plan.asset_id,
            fraction: plan.decision.fraction,
            amount: plan.decision.amount,
            max_slippage_bps: plan.slippage_bps,
            urgency: plan.decision.urgency,
            reason: plan.decision.reason,
            attempt: 1,
            created_at: now,
        };

        if let Err(e) = self.dispatch(PendingIntent::new(TradeIntent::Exit(intent.clone()), now)).await {
            self.release_exit_claim(intent.position_id).await;
            return Err(e);
        }

        tracing::info!(
            position = %intent.position_id,
            asset = %intent.asset_id,
            reason = %intent.reason,
            fraction = intent.fraction,
            urgency = ?intent.urgency,
            slippage_bps = intent.max_slippage_bps,
            pnl_pct = plan.decision.pnl_pct,
            "Exit requested"
        );
        self.audit.record(AuditEvent::ExitMatched {
            intent_id: intent.intent_id,
            position_id: intent.position_id,
            reason: intent.reason,
            fraction: intent.fraction,
            amount: intent.amount,
            urgency: intent.urgency,
            slippage_bps: intent.max_slippage_bps,
            pnl_pct: plan.decision.pnl_pct,
        });
        Ok(intent)
    }

    /// Operator-requested full exit at Critical urgency
    pub async fn force_exit(&self, position_id: PositionId, now: DateTime<Utc>) -> Result<ExitIntent, LifecycleError> {
        let handle = self.handle(position_id).await?;
        let position = handle.inner.lock().await;
        if position.is_frozen() {
            return Err(PositionError::Frozen(position_id).into());
        }
        if position.is_terminal() {
            return Err(PositionError::AlreadyClosed.into());
        }
        if handle.exit_claimed.swap(true, Ordering::AcqRel) {
            return Err(LifecycleError::ExitInFlight(position_id));
        }

        let urgency = Urgency::Critical;
        let plan = ExitPlan {
            position_id,
            asset_id: position.asset_id.clone(),
            decision: ExitDecision {
                reason: ExitReason::Manual,
                fraction: 1.0,
                amount: position.remaining_amount(),
                urgency,
                pnl_pct: position.pnl_percent(),
            },
            slippage_bps: slippage::compute(&position, urgency),
        };
        drop(position);
        self.emit_exit(plan, now).await
    }

    // ===== Confirmations =====

    /// Apply an execution result. Unknown intent ids are logged and discarded.
    pub async fn handle_confirmation(
        &self,
        confirmation: ExecutionConfirmation,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, LifecycleError> {
        let pending = self.pending.lock().await.remove(&confirmation.intent_id);
        let Some(pending) = pending else {
            tracing::warn!(intent = %confirmation.intent_id, "Confirmation for unknown intent discarded");
            return Err(LifecycleError::UnknownIntent(confirmation.intent_id));
        };

        let filled = confirmation.success && confirmation.filled_amount > 0.0;
        if !filled {
            let error = confirmation
                .error
                .clone()
                .unwrap_or_else(|| "empty fill".to_string());
            return self.handle_failure(pending, error).await;
        }

        match &pending.intent {
            TradeIntent::Entry(entry) => self.open_position(entry, &confirmation, now).await,
            TradeIntent::Exit(exit) => self.apply_exit_fill(exit, &confirmation, now).await,
        }
    }

    async fn open_position(
        &self,
        entry: &EntryIntent,
        confirmation: &ExecutionConfirmation,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, LifecycleError> {
        let position_id = self.next_position_id();
        let position = Position::new(
            position_id,
            entry.asset_id.clone(),
            confirmation.fill_price,
            confirmation.filled_amount,
            now,
            self.config.exit.clone(),
            MomentumBuffer::with_capacity(self.config.momentum.buffer_capacity),
        )?;

        self.positions.write().await.insert(
            position_id,
            PositionHandle {
                asset_id: entry.asset_id.clone(),
                inner: Arc::new(Mutex::new(position)),
                exit_claimed: Arc::new(AtomicBool::new(false)),
            },
        );
        self.recent_entries.lock().await.insert(entry.asset_id.clone(), now);

        tracing::info!(
            position = %position_id,
            asset = %entry.asset_id,
            entry_price = confirmation.fill_price,
            amount = confirmation.filled_amount,
            "Position opened"
        );
        self.audit.record(AuditEvent::PositionOpened {
            position_id,
            asset_id: entry.asset_id.clone(),
            entry_price: confirmation.fill_price,
            amount: confirmation.filled_amount,
        });
        Ok(ConfirmationOutcome::Opened(position_id))
    }

    async fn apply_exit_fill(
        &self,
        exit: &ExitIntent,
        confirmation: &ExecutionConfirmation,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationOutcome, LifecycleError> {
        let handle = self.handle(exit.position_id).await?;
        let mut position = handle.inner.lock().await;

        let recorded = position.record_fill(exit.reason, confirmation.filled_amount, confirmation.fill_price, now);
        handle.exit_claimed.store(false, Ordering::Release);
        let status = match recorded {
            Ok(status) => status,
            Err(e @ PositionError::LedgerCorrupted { .. }) => {
                self.audit.record(AuditEvent::PositionFrozen {
                    position_id: exit.position_id,
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        self.audit.record(AuditEvent::PhaseCompleted {
            position_id: exit.position_id,
            reason: exit.reason,
            amount: confirmation.filled_amount,
            price: confirmation.fill_price,
            remaining: position.remaining_amount(),
        });

        if status != Status::Closed {
            return Ok(ConfirmationOutcome::Filled {
                position_id: exit.position_id,
                status,
            });
        }

        let closed = position.clone();
        drop(position);
        self.positions.write().await.remove(&exit.position_id);

        tracing::info!(
            position = %closed.id,
            asset = %closed.asset_id,
            realized_pnl = closed.realized_pnl(),
            fills = closed.fills().len(),
            "Position closed"
        );
        self.audit.record(AuditEvent::PositionClosed {
            position_id: closed.id,
            asset_id: closed.asset_id.clone(),
            realized_pnl: closed.realized_pnl(),
        });

        let mut history = self.closed.write().await;
        history.push_back(closed);
        while history.len() > self.config.closed_history.max(1) {
            history.pop_front();
        }
        Ok(ConfirmationOutcome::Closed(exit.position_id))
    }

    async fn handle_failure(
        &self,
        mut pending: PendingIntent,
        error: String,
    ) -> Result<ConfirmationOutcome, LifecycleError> {
        let intent_id = pending.intent.id();
        match retry::next_attempt(&pending.intent) {
            RetryDecision::Retry(intent) => {
                let attempt = intent.attempt();
                let urgency = intent.urgency();
                let slippage_bps = intent.max_slippage_bps();
                tracing::warn!(intent = %intent_id, attempt, ?urgency, %error, "Execution failed, retrying");

                pending.intent = intent;
                pending.last_error = Some(error.clone());
                if let Err(e) = self.dispatch(pending.clone()).await {
                    return self.abandon(pending, e.to_string()).await;
                }
                self.audit.record(AuditEvent::IntentRetried {
                    intent_id,
                    attempt,
                    urgency,
                    slippage_bps,
                    error,
                });
                Ok(ConfirmationOutcome::Retried { intent_id, attempt })
            }
            RetryDecision::Abandon => self.abandon(pending, error).await,
        }
    }

    async fn abandon(&self, mut pending: PendingIntent, error: String) -> Result<ConfirmationOutcome, LifecycleError> {
        let intent_id = pending.intent.id();
        let attempts = pending.intent.attempt();
        tracing::error!(
            intent = %intent_id,
            asset = %pending.intent.asset_id(),
            attempts,
            %error,
            "Intent abandoned"
        );
        self.audit.record(AuditEvent::IntentAbandoned {
            intent_id,
            asset_id: pending.intent.asset_id().to_string(),
            attempts,
            error: error.clone(),
        });
        if let Some(position_id) = pending.position_id {
            self.release_exit_claim(position_id).await;
        }
        pending.last_error = Some(error);
        self.abandoned.lock().await.push(pending);
        Ok(ConfirmationOutcome::Abandoned(intent_id))
    }

    /// Register an intent as pending and hand it to the outbound channel
    async fn dispatch(&self, pending: PendingIntent) -> Result<(), LifecycleError> {
        let intent = pending.intent.clone();
        let intent_id = intent.id();
        self.pending.lock().await.insert(intent_id, pending);

        if let Err(e) = self.outbound.try_send(intent) {
            self.pending.lock().await.remove(&intent_id);
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => LifecycleError::ChannelFull(intent_id),
                mpsc::error::TrySendError::Closed(_) => LifecycleError::ChannelClosed,
            });
        }
        Ok(())
    }

    // ===== Queries and manual review =====

    async fn handle(&self, position_id: PositionId) -> Result<PositionHandle, LifecycleError> {
        self.positions
            .read()
            .await
            .get(&position_id)
            .cloned()
            .ok_or(LifecycleError::UnknownPosition(position_id))
    }

    async fn release_exit_claim(&self, position_id: PositionId) {
        if let Ok(handle) = self.handle(position_id).await {
            handle.exit_claimed.store(false, Ordering::Release);
        }
    }

    /// Snapshot of a single open position
    pub async fn position(&self, position_id: PositionId) -> Option<Position> {
        let handle = self.handle(position_id).await.ok()?;
        let position = handle.inner.lock().await;
        Some(position.clone())
    }

    /// Snapshots of all open positions, ordered by id
    pub async fn open_positions(&self) -> Vec<Position> {
        let handles: Vec<PositionHandle> = self.positions.read().await.values().cloned().collect();
        let mut positions = Vec::with_capacity(handles.len());
        for handle in handles {
            positions.push(handle.inner.lock().await.clone());
        }
        positions.sort_by_key(|p| p.id);
        positions
    }

    pub async fn open_count(&self) -> usize {
        self.positions.read().await.len()
    }

    pub async fn closed_positions(&self) -> Vec<Position> {
        self.closed.read().await.iter().cloned().collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Intents that ran out of attempts, for operator attention
    pub async fn abandoned_intents(&self) -> Vec<PendingIntent> {
        self.abandoned.lock().await.clone()
    }

    /// Release a frozen position back to automated exits
    pub async fn unfreeze(&self, position_id: PositionId) -> Result<(), LifecycleError> {
        let handle = self.handle(position_id).await?;
        let mut position = handle.inner.lock().await;
        position.unfreeze();
        tracing::warn!(position = %position_id, "Position unfrozen by operator");
        Ok(())
    }
}

/// One position's share of a tick: momentum update, then exit evaluation
async fn evaluate_position(
    position_id: PositionId,
    handle: PositionHandle,
    point: Option<PricePoint>,
    config: Arc<LifecycleConfig>,
    now: DateTime<Utc>,
) -> PositionTick {
    let mut position = handle.inner.lock().await;

    let mut rejected_sample = None;
    let snapshot = match point {
        Some(point) => match momentum::update(&mut position, point, &config.momentum) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                rejected_sample = Some(e);
                position.momentum.current()
            }
        },
        None => position.momentum.current(),
    };

    // Claimed while the lock is held; a concurrent tick sees the claim
    let exit_pending = handle.exit_claimed.load(Ordering::Acquire);
    let plan = if exit_pending {
        None
    } else {
        exits::evaluate(&position, &snapshot, now).map(|decision| ExitPlan {
            position_id,
            asset_id: handle.asset_id.clone(),
            slippage_bps: slippage::compute(&position, decision.urgency),
            decision,
        })
    };
    if plan.is_some() {
        handle.exit_claimed.store(true, Ordering::Release);
    }

    PositionTick {
        position_id,
        exit_pending,
        rejected_sample,
        plan,
    }
}
