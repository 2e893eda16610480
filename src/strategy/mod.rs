//! Strategy Layer - Scoring, Sizing and Momentum-Adaptive Exits
//!
//! Pure decision logic. Nothing here performs I/O or holds long-lived state:
//! - `scorer`: hard filters and weighted multi-factor opportunity score
//! - `sizer`: advisory entry size from score tier and portfolio state
//! - `momentum`: per-position velocity/acceleration tracking and classification
//! - `exits`: ordered exit rule table (stop, time, reversal, targets, trailing)
//! - `slippage`: profit-aware slippage bounds

pub mod scorer;
pub mod sizer;
pub mod momentum;
pub mod exits;
pub mod slippage;

pub use scorer::{OpportunityScorer, ScoringConfig, HardFilterConfig, PenaltyConfig, ScoreResult, ScoreRejection, Recommendation, WeightProfile, SubScores};
pub use sizer::{PositionSizer, SizingConfig, SizingRejection};
pub use momentum::{MomentumBuffer, MomentumClass, MomentumConfig, MomentumError, MomentumSample, MomentumSnapshot};
pub use exits::{ExitConfig, ExitDecision};
