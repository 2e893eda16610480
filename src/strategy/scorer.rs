//! Opportunity Scorer
//!
//! Scores a graduation candidate from a `MarketSnapshot`:
//! 1. Validate the snapshot (bad data is never guessed at)
//! 2. Apply hard filters - any failure forces `Avoid` with score 0
//! 3. Compute four positive factors, each clamped to 0-100
//! 4. Weight them by the active profile and apply the risk penalty
//!
//! Scoring is a pure function of (snapshot, profile, config).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::snapshot::{MarketSnapshot, SnapshotError};

/// Weighting of the four positive factors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightProfile {
    #[default]
    Default,
    Aggressive,
    Conservative,
}

impl fmt::Display for WeightProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightProfile::Default => write!(f, "default"),
            WeightProfile::Aggressive => write!(f, "aggressive"),
            WeightProfile::Conservative => write!(f, "conservative"),
        }
    }
}

impl FromStr for WeightProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(WeightProfile::Default),
            "aggressive" => Ok(WeightProfile::Aggressive),
            "conservative" => Ok(WeightProfile::Conservative),
            other => Err(format!("unknown weight profile: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeights {
    pub graduation: f64,
    pub volume: f64,
    pub holder: f64,
    pub momentum: f64,
}

impl WeightProfile {
    /// Factor weights; each profile sums to 1.0
    pub fn weights(&self) -> FactorWeights {
        match self {
            WeightProfile::Default => FactorWeights {
                graduation: 0.30,
                volume: 0.25,
                holder: 0.25,
                momentum: 0.20,
            },
            WeightProfile::Aggressive => FactorWeights {
                graduation: 0.35,
                volume: 0.30,
                holder: 0.15,
                momentum: 0.20,
            },
            WeightProfile::Conservative => FactorWeights {
                graduation: 0.20,
                volume: 0.20,
                holder: 0.40,
                momentum: 0.20,
            },
        }
    }
}

/// Recommendation tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Recommendation {
    Avoid,
    Hold,
    Buy,
    StrongBuy,
}

impl Recommendation {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Recommendation::StrongBuy
        } else if score >= 60.0 {
            Recommendation::Buy
        } else if score >= 40.0 {
            Recommendation::Hold
        } else {
            Recommendation::Avoid
        }
    }

    /// Only StrongBuy and Buy go on to sizing
    pub fn is_actionable(&self) -> bool {
        matches!(self, Recommendation::StrongBuy | Recommendation::Buy)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::StrongBuy => write!(f, "StrongBuy"),
            Recommendation::Buy => write!(f, "Buy"),
            Recommendation::Hold => write!(f, "Hold"),
            Recommendation::Avoid => write!(f, "Avoid"),
        }
    }
}

/// Hard filter thresholds. Failing any one forces `Avoid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardFilterConfig {
    /// Minimum graduation progress, whole percent
    #[serde(default = "default_min_progress")]
    pub min_progress: f64,
    /// Maximum graduation progress, whole percent
    #[serde(default = "default_max_progress")]
    pub max_progress: f64,
    #[serde(default = "default_min_volume_1h")]
    pub min_volume_1h: f64,
    #[serde(default = "default_min_holders")]
    pub min_holders: u32,
    #[serde(default = "default_max_top10")]
    pub max_top10_concentration: f64,
    #[serde(default = "default_max_creator")]
    pub max_creator_holding: f64,
    #[serde(default = "default_max_wash")]
    pub max_wash_trade_likelihood: f64,
    #[serde(default = "default_min_unique_buyers")]
    pub min_unique_buyers_1h: u32,
}

fn default_min_progress() -> f64 { 70.0 }
fn default_max_progress() -> f64 { 99.0 }
fn default_min_volume_1h() -> f64 { 1.0 }
fn default_min_holders() -> u32 { 50 }
fn default_max_top10() -> f64 { 70.0 }
fn default_max_creator() -> f64 { 15.0 }
fn default_max_wash() -> f64 { 60.0 }
fn default_min_unique_buyers() -> u32 { 5 }

impl Default for HardFilterConfig {
    fn default() -> Self {
        Self {
            min_progress: default_min_progress(),
            max_progress: default_max_progress(),
            min_volume_1h: default_min_volume_1h(),
            min_holders: default_min_holders(),
            max_top10_concentration: default_max_top10(),
            max_creator_holding: default_max_creator(),
            max_wash_trade_likelihood: default_max_wash(),
            min_unique_buyers_1h: default_min_unique_buyers(),
        }
    }
}

/// Thresholds for the risk penalty contributions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyConfig {
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: f64,
    #[serde(default = "default_min_market_cap")]
    pub min_market_cap: f64,
    #[serde(default = "default_min_trades_1h")]
    pub min_trades_1h: u32,
    /// Progress above which a stalled curve is penalized
    #[serde(default = "default_stall_progress")]
    pub stall_progress: f64,
    /// Minimum hourly progress gain to not count as stalled
    #[serde(default = "default_min_progress_change")]
    pub min_progress_change_1h: f64,
}

fn default_min_liquidity() -> f64 { 20.0 }
fn default_min_market_cap() -> f64 { 50.0 }
fn default_min_trades_1h() -> u32 { 20 }
fn default_stall_progress() -> f64 { 95.0 }
fn default_min_progress_change() -> f64 { 1.0 }

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            min_liquidity: default_min_liquidity(),
            min_market_cap: default_min_market_cap(),
            min_trades_1h: default_min_trades_1h(),
            stall_progress: default_stall_progress(),
            min_progress_change_1h: default_min_progress_change(),
        }
    }
}

/// Scorer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub profile: WeightProfile,
    #[serde(default)]
    pub filters: HardFilterConfig,
    #[serde(default)]
    pub penalties: PenaltyConfig,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        let f = &self.filters;
        if f.min_progress < 0.0 || f.max_progress > 100.0 || f.min_progress > f.max_progress {
            return Err(format!(
                "progress filter must satisfy 0 <= min <= max <= 100, got [{}, {}]",
                f.min_progress, f.max_progress
            ));
        }
        for (name, value) in [
            ("max_top10_concentration", f.max_top10_concentration),
            ("max_creator_holding", f.max_creator_holding),
            ("max_wash_trade_likelihood", f.max_wash_trade_likelihood),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(format!("{} must be 0-100, got {}", name, value));
            }
        }
        if f.min_volume_1h < 0.0 {
            return Err("min_volume_1h must be >= 0".to_string());
        }
        Ok(())
    }
}

/// Per-factor scores, each in 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub graduation: f64,
    pub volume: f64,
    pub holder: f64,
    pub momentum: f64,
    /// Percent reduction applied to the weighted sum
    pub risk_penalty: f64,
}

/// A hard filter that did not pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterFailure {
    pub filter: &'static str,
    pub value: f64,
    pub limit: f64,
}

impl fmt::Display for FilterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {:.2} (limit {:.2})", self.filter, self.value, self.limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreRejection {
    InvalidSnapshot(SnapshotError),
    HardFilter(Vec<FilterFailure>),
}

#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub asset_id: String,
    /// Composite score, 0-100
    pub score: f64,
    pub sub_scores: SubScores,
    pub recommendation: Recommendation,
    pub profile: WeightProfile,
    /// Human-readable justification, for audit only
    pub signals: Vec<String>,
    pub rejection: Option<ScoreRejection>,
}

impl ScoreResult {
    fn rejected(asset_id: &str, profile: WeightProfile, rejection: ScoreRejection, signals: Vec<String>) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            score: 0.0,
            sub_scores: SubScores::default(),
            recommendation: Recommendation::Avoid,
            profile,
            signals,
            rejection: Some(rejection),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }

    /// Recompute the composite from the stored sub-scores and profile
    pub fn rederive(&self) -> f64 {
        if self.is_rejected() {
            return 0.0;
        }
        composite(&self.sub_scores, self.profile)
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Weighted sum of the positive factors reduced by the risk penalty
pub fn composite(sub: &SubScores, profile: WeightProfile) -> f64 {
    let w = profile.weights();
    let positive = w.graduation * clamp_score(sub.graduation)
        + w.volume * clamp_score(sub.volume)
        + w.holder * clamp_score(sub.holder)
        + w.momentum * clamp_score(sub.momentum);
    clamp_score(positive * (1.0 - clamp_score(sub.risk_penalty) / 100.0))
}

/// Points for the first band whose threshold `value` meets, bands descending
fn band(value: f64, bands: &[(f64, f64)]) -> f64 {
    bands
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// Points for the first band whose ceiling `value` stays under, bands ascending
fn band_below(value: f64, bands: &[(f64, f64)]) -> f64 {
    bands
        .iter()
        .find(|(ceiling, _)| value <= *ceiling)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// Linear interpolation of `value` from [lo, hi] onto [from, to]
fn ramp(value: f64, lo: f64, hi: f64, from: f64, to: f64) -> f64 {
    from + (value - lo) / (hi - lo) * (to - from)
}

#[derive(Debug, Clone, Default)]
pub struct OpportunityScorer {
    config: ScoringConfig,
}

impl OpportunityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score with the configured weight profile
    pub fn score_default(&self, snapshot: &MarketSnapshot) -> ScoreResult {
        self.score(snapshot, self.config.profile)
    }

    pub fn score(&self, snapshot: &MarketSnapshot, profile: WeightProfile) -> ScoreResult {
        if let Err(e) = snapshot.validate() {
            return ScoreResult::rejected(
                &snapshot.asset_id,
                profile,
                ScoreRejection::InvalidSnapshot(e.clone()),
                vec![format!("Invalid snapshot: {}", e)],
            );
        }

        let failures = self.hard_filter_failures(snapshot);
        if !failures.is_empty() {
            let signals = failures.iter().map(|f| format!("Hard filter failed: {}", f)).collect();
            return ScoreResult::rejected(&snapshot.asset_id, profile, ScoreRejection::HardFilter(failures), signals);
        }

        let mut signals = Vec::new();
        let sub_scores = SubScores {
            graduation: self.graduation_score(snapshot, &mut signals),
            volume: self.volume_score(snapshot, &mut signals),
            holder: self.holder_score(snapshot, &mut signals),
            momentum: self.momentum_score(snapshot, &mut signals),
            risk_penalty: self.risk_penalty(snapshot, &mut signals),
        };
        let score = composite(&sub_scores, profile);
        let recommendation = Recommendation::from_score(score);
        signals.push(format!("Composite {:.1} -> {}", score, recommendation));

        ScoreResult {
            asset_id: snapshot.asset_id.clone(),
            score,
            sub_scores,
            recommendation,
            profile,
            signals,
            rejection: None,
        }
    }

    /// All hard filters that fail for this snapshot
    pub fn hard_filter_failures(&self, s: &MarketSnapshot) -> Vec<FilterFailure> {
        let f = &self.config.filters;
        let mut failures = Vec::new();

        // Whole-percent resolution: 99.5% still counts as 99%
        let progress = s.graduation_progress.floor();
        if progress < f.min_progress {
            failures.push(FilterFailure { filter: "graduation_progress", value: s.graduation_progress, limit: f.min_progress });
        }
        if progress > f.max_progress {
            failures.push(FilterFailure { filter: "graduation_progress", value: s.graduation_progress, limit: f.max_progress });
        }
        if s.volume_1h < f.min_volume_1h {
            failures.push(FilterFailure { filter: "volume_1h", value: s.volume_1h, limit: f.min_volume_1h });
        }
        if s.holder_count < f.min_holders {
            failures.push(FilterFailure { filter: "holder_count", value: s.holder_count as f64, limit: f.min_holders as f64 });
        }
        if s.top10_concentration > f.max_top10_concentration {
            failures.push(FilterFailure { filter: "top10_concentration", value: s.top10_concentration, limit: f.max_top10_concentration });
        }
        if s.creator_holding > f.max_creator_holding {
            failures.push(FilterFailure { filter: "creator_holding", value: s.creator_holding, limit: f.max_creator_holding });
        }
        if s.wash_trade_likelihood > f.max_wash_trade_likelihood {
            failures.push(FilterFailure { filter: "wash_trade_likelihood", value: s.wash_trade_likelihood, limit: f.max_wash_trade_likelihood });
        }
        if s.unique_buyers_1h < f.min_unique_buyers_1h {
            failures.push(FilterFailure { filter: "unique_buyers_1h", value: s.unique_buyers_1h as f64, limit: f.min_unique_buyers_1h as f64 });
        }

        failures
    }

    fn graduation_score(&self, s: &MarketSnapshot, signals: &mut Vec<String>) -> f64 {
        let p = s.graduation_progress;
        let score = if p >= 99.0 {
            100.0
        } else if p >= 95.0 {
            ramp(p, 95.0, 99.0, 90.0, 100.0)
        } else if p >= 85.0 {
            ramp(p, 85.0, 95.0, 70.0, 90.0)
        } else if p >= 70.0 {
            ramp(p, 70.0, 85.0, 40.0, 70.0)
        } else {
            ramp(p.max(0.0), 0.0, 70.0, 0.0, 40.0)
        };
        let score = clamp_score(score);
        signals.push(format!("Graduation {:.1}% -> {:.0}", p, score));
        score
    }

    fn volume_score(&self, s: &MarketSnapshot, signals: &mut Vec<String>) -> f64 {
        let base = band(s.volume_1h, &[(50.0, 60.0), (20.0, 50.0), (10.0, 40.0), (5.0, 30.0), (1.0, 15.0)]);
        let acceleration = band(s.volume_acceleration, &[(3.0, 20.0), (2.0, 15.0), (1.5, 10.0), (1.0, 5.0)]);
        let activity = band(s.trades_1h as f64, &[(500.0, 15.0), (200.0, 10.0), (50.0, 5.0)]);
        // Many mid-sized trades read as organic flow
        let trade_size = match s.avg_trade_size_1h() {
            Some(avg) if (0.05..=2.0).contains(&avg) => 10.0,
            Some(avg) if avg >= 0.01 => 5.0,
            _ => 0.0,
        };

        let score = clamp_score(base + acceleration + activity + trade_size);
        if acceleration >= 15.0 {
            signals.push(format!("Volume accelerating {:.1}x", s.volume_acceleration));
        }
        signals.push(format!("Volume {:.2} / {} trades (1h) -> {:.0}", s.volume_1h, s.trades_1h, score));
        score
    }

    fn holder_score(&self, s: &MarketSnapshot, signals: &mut Vec<String>) -> f64 {
        let count = band(s.holder_count as f64, &[(1000.0, 30.0), (500.0, 25.0), (200.0, 20.0), (100.0, 15.0), (50.0, 8.0)]);
        let concentration = band_below(s.top10_concentration, &[(20.0, 25.0), (30.0, 20.0), (40.0, 15.0), (50.0, 10.0), (70.0, 5.0)]);
        let creator = band_below(s.creator_holding, &[(2.0, 15.0), (5.0, 12.0), (10.0, 6.0)]);
        let inequality = band_below(s.gini, &[(0.5, 15.0), (0.65, 10.0), (0.8, 5.0)]);
        let growth = band(s.holder_growth_1h, &[(50.0, 15.0), (20.0, 10.0), (5.0, 5.0)]);

        let score = clamp_score(count + concentration + creator + inequality + growth);
        signals.push(format!(
            "Holders {} (top10 {:.1}%, creator {:.1}%, gini {:.2}) -> {:.0}",
            s.holder_count, s.top10_concentration, s.creator_holding, s.gini, score
        ));
        score
    }

    fn momentum_score(&self, s: &MarketSnapshot, signals: &mut Vec<String>) -> f64 {
        let price = band(s.price_change_1h, &[(100.0, 50.0), (50.0, 40.0), (20.0, 30.0), (5.0, 20.0), (0.0, 10.0)]);
        let pressure = band(s.buy_sell_ratio, &[(3.0, 50.0), (2.0, 40.0), (1.5, 30.0), (1.2, 20.0), (1.0, 10.0)]);

        let mut score = clamp_score(price + pressure);
        if s.buy_sell_ratio < 0.8 {
            score = score.min(10.0);
            signals.push(format!("Sell pressure: buy/sell {:.2}, momentum capped", s.buy_sell_ratio));
        }
        signals.push(format!(
            "Price {:+.1}% (1h), buy/sell {:.2} -> {:.0}",
            s.price_change_1h, s.buy_sell_ratio, score
        ));
        score
    }

    fn risk_penalty(&self, s: &MarketSnapshot, signals: &mut Vec<String>) -> f64 {
        let p = &self.config.penalties;
        let mut penalty = 0.0;
        let mut add = |points: f64, reason: String| {
            penalty += points;
            signals.push(format!("Risk -{:.0}%: {}", points, reason));
        };

        if s.wash_trade_likelihood >= 40.0 {
            add(25.0, format!("wash trading {:.0}%", s.wash_trade_likelihood));
        } else if s.wash_trade_likelihood >= 25.0 {
            add(10.0, format!("possible wash trading {:.0}%", s.wash_trade_likelihood));
        }
        if s.liquidity < p.min_liquidity {
            add(15.0, format!("low liquidity {:.1}", s.liquidity));
        }
        if s.market_cap < p.min_market_cap {
            add(10.0, format!("low market cap {:.1}", s.market_cap));
        }
        if s.top10_concentration > 50.0 {
            add(15.0, format!("top10 hold {:.0}%", s.top10_concentration));
        }
        if s.trades_1h < p.min_trades_1h || s.unique_buyers_1h < 10 {
            add(15.0, format!("thin activity ({} trades, {} buyers)", s.trades_1h, s.unique_buyers_1h));
        }
        if s.graduation_progress >= p.stall_progress && s.progress_change_1h < p.min_progress_change_1h {
            add(20.0, format!("stalled at {:.1}% progress", s.graduation_progress));
        }
        if s.creator_holding > 10.0 {
            add(15.0, format!("creator holds {:.1}%", s.creator_holding));
        }

        clamp_score(penalty)
    }
}
