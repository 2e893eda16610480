//! Domain Layer - Core types for the graduation engine
//!
//! This module contains pure domain types and logic with no I/O.
//! All external interactions happen through the ports layer.
//!
//! - `snapshot`: normalized per-tick market view and bounded price history
//! - `normalizer`: raw venue data -> `MarketSnapshot`
//! - `intent`: entry/exit intents and execution confirmations
//! - `position`: per-position ledger (remaining amount, fills, high-water mark)
//! - `portfolio`: wallet view and risk flags supplied by the caller
//! - `risk`: risk presets and their limits

pub mod snapshot;
pub mod normalizer;
pub mod intent;
pub mod position;
pub mod portfolio;
pub mod risk;

pub use snapshot::{MarketSnapshot, PriceHistory, PricePoint, SnapshotError};
pub use normalizer::{NormalizerConfig, RawVenueData, SnapshotNormalizer};
pub use intent::{
    EntryIntent, ExecutionConfirmation, ExitIntent, ExitReason, IntentId, PositionId, TradeIntent, Urgency,
};
pub use position::{ExitFill, Position, PositionError, Status};
pub use portfolio::{PortfolioState, RiskFlags};
pub use risk::{RiskLimits, RiskPreset, RiskViolation};
