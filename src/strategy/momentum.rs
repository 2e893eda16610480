//! Momentum Tracker
//!
//! Rolling per-position price samples with first and second differences:
//! - velocity: percent change per minute since the previous sample
//! - momentum: change in velocity between consecutive samples
//! - negative streak: consecutive samples with negative velocity
//!
//! Velocity needs two samples and momentum three. Until then the values are
//! undefined and the position classifies as `Normal`.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::position::Position;
use crate::domain::snapshot::PricePoint;

const DEFAULT_BUFFER_CAPACITY: usize = 32;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MomentumError {
    #[error("Stale sample at {at}: last sample was at {last}")]
    StaleSample {
        at: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("Invalid sample price: {0}")]
    InvalidPrice(f64),
}

/// Classification thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// Velocity (%/min) below which a sample can confirm a reversal
    #[serde(default = "default_reversal_velocity")]
    pub reversal_velocity: f64,
    #[serde(default = "default_reversal_momentum")]
    pub reversal_momentum: f64,
    /// Consecutive negative-velocity samples required for a reversal
    #[serde(default = "default_confirmation_count")]
    pub confirmation_count: u32,
    #[serde(default = "default_strong_velocity")]
    pub strong_velocity: f64,
    #[serde(default = "default_strong_momentum")]
    pub strong_momentum: f64,
    #[serde(default = "default_weak_velocity")]
    pub weak_velocity: f64,
    #[serde(default = "default_weak_momentum")]
    pub weak_momentum: f64,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

fn default_reversal_velocity() -> f64 { -0.5 }
fn default_reversal_momentum() -> f64 { -30.0 }
fn default_confirmation_count() -> u32 { 4 }
fn default_strong_velocity() -> f64 { 2.0 }
fn default_strong_momentum() -> f64 { 30.0 }
fn default_weak_velocity() -> f64 { 0.3 }
fn default_weak_momentum() -> f64 { 5.0 }
fn default_buffer_capacity() -> usize { DEFAULT_BUFFER_CAPACITY }

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            reversal_velocity: default_reversal_velocity(),
            reversal_momentum: default_reversal_momentum(),
            confirmation_count: default_confirmation_count(),
            strong_velocity: default_strong_velocity(),
            strong_momentum: default_strong_momentum(),
            weak_velocity: default_weak_velocity(),
            weak_momentum: default_weak_momentum(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl MomentumConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_capacity < 3 {
            return Err(format!("buffer_capacity must be >= 3, got {}", self.buffer_capacity));
        }
        if self.confirmation_count == 0 {
            return Err("confirmation_count must be >= 1".to_string());
        }
        if self.weak_velocity >= self.strong_velocity {
            return Err(format!(
                "weak_velocity ({}) must be below strong_velocity ({})",
                self.weak_velocity, self.strong_velocity
            ));
        }
        if self.reversal_velocity >= 0.0 {
            return Err("reversal_velocity must be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MomentumClass {
    Strong,
    #[default]
    Normal,
    Weak,
    Reversing,
}

impl fmt::Display for MomentumClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MomentumClass::Strong => write!(f, "STRONG"),
            MomentumClass::Normal => write!(f, "NORMAL"),
            MomentumClass::Weak => write!(f, "WEAK"),
            MomentumClass::Reversing => write!(f, "REVERSING"),
        }
    }
}

/// One stored observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumSample {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// %/min since the previous sample
    pub velocity: Option<f64>,
    /// Velocity change since the previous sample
    pub momentum: Option<f64>,
    pub negative_streak: u32,
}

/// Classification view handed to the exit state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumSnapshot {
    pub class: MomentumClass,
    pub velocity: Option<f64>,
    pub momentum: Option<f64>,
    pub negative_streak: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MomentumSnapshot {
    /// True until both velocity and momentum can be computed
    pub fn is_undefined(&self) -> bool {
        self.velocity.is_none() || self.momentum.is_none()
    }
}

impl Default for MomentumSnapshot {
    fn default() -> Self {
        Self {
            class: MomentumClass::Normal,
            velocity: None,
            momentum: None,
            negative_streak: 0,
            timestamp: None,
        }
    }
}

/// Bounded rolling buffer owned by a single position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumBuffer {
    samples: VecDeque<MomentumSample>,
    capacity: usize,
    current: MomentumSnapshot,
}

impl Default for MomentumBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl MomentumBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(3);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            current: MomentumSnapshot::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&MomentumSample> {
        self.samples.back()
    }

    pub fn samples(&self) -> impl Iterator<Item = &MomentumSample> {
        self.samples.iter()
    }

    /// Last computed classification. Held across rejected samples.
    pub fn current(&self) -> MomentumSnapshot {
        self.current
    }

    /// Append a price observation and reclassify
    pub fn push(&mut self, point: PricePoint, config: &MomentumConfig) -> Result<MomentumSnapshot, MomentumError> {
        if !point.price.is_finite() || point.price <= 0.0 {
            return Err(MomentumError::InvalidPrice(point.price));
        }

        let previous = self.samples.back().copied();
        let velocity = match previous {
            Some(prev) => {
                let stale = MomentumError::StaleSample {
                    at: point.timestamp,
                    last: prev.timestamp,
                };
                if point.timestamp <= prev.timestamp {
                    return Err(stale);
                }
                let elapsed = point.timestamp - prev.timestamp;
                let minutes = elapsed
                    .num_microseconds()
                    .map(|us| us as f64 / 60_000_000.0)
                    .unwrap_or_else(|| elapsed.num_milliseconds() as f64 / 60_000.0);
                let velocity = (point.price - prev.price) / prev.price * 100.0 / minutes;
                // Gaps below clock resolution would divide by zero
                if minutes <= 0.0 || !velocity.is_finite() {
                    return Err(stale);
                }
                Some(velocity)
            }
            None => None,
        };
        let momentum = match (velocity, previous.and_then(|p| p.velocity)) {
            (Some(v), Some(prev_v)) => Some(v - prev_v),
            _ => None,
        };
        let negative_streak = match velocity {
            Some(v) if v < 0.0 => previous.map(|p| p.negative_streak).unwrap_or(0) + 1,
            _ => 0,
        };

        let sample = MomentumSample {
            timestamp: point.timestamp,
            price: point.price,
            velocity,
            momentum,
            negative_streak,
        };
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }

        self.current = MomentumSnapshot {
            class: classify(&sample, config),
            velocity,
            momentum,
            negative_streak,
            timestamp: Some(point.timestamp),
        };
        Ok(self.current)
    }
}

/// First match wins: Reversing, Strong, Weak, then Normal
pub fn classify(sample: &MomentumSample, config: &MomentumConfig) -> MomentumClass {
    let (v, m) = match (sample.velocity, sample.momentum) {
        (Some(v), Some(m)) => (v, m),
        _ => return MomentumClass::Normal,
    };

    if v < config.reversal_velocity
        && m < config.reversal_momentum
        && sample.negative_streak >= config.confirmation_count
    {
        MomentumClass::Reversing
    } else if v > config.strong_velocity && m > config.strong_momentum {
        MomentumClass::Strong
    } else if v < config.weak_velocity && m < config.weak_momentum {
        MomentumClass::Weak
    } else {
        MomentumClass::Normal
    }
}

/// Feed one price sample into a position: updates its momentum buffer and
/// high-water mark. A rejected sample leaves the position untouched.
pub fn update(
    position: &mut Position,
    point: PricePoint,
    config: &MomentumConfig,
) -> Result<MomentumSnapshot, MomentumError> {
    let snapshot = position.momentum.push(point, config)?;
    position.observe_price(point.price);
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::exits::ExitConfig;
    use crate::domain::intent::PositionId;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn point(secs: i64, price: f64) -> PricePoint {
        PricePoint { timestamp: t0() + Duration::seconds(secs), price }
    }

    fn position() -> Position {
        Position::new(
            PositionId(1),
            "Mint111".to_string(),
            1.0,
            1000.0,
            t0(),
            ExitConfig::default(),
            MomentumBuffer::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_undefined_until_three_samples() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();

        let first = buffer.push(point(0, 1.0), &config).unwrap();
        assert!(first.velocity.is_none());
        assert!(first.is_undefined());
        assert_eq!(first.class, MomentumClass::Normal);

        let second = buffer.push(point(60, 1.1), &config).unwrap();
        assert_relative_eq!(second.velocity.unwrap(), 10.0, epsilon = 1e-9);
        assert!(second.momentum.is_none());
        assert_eq!(second.class, MomentumClass::Normal);

        let third = buffer.push(point(120, 1.1), &config).unwrap();
        assert!(!third.is_undefined());
        assert_relative_eq!(third.momentum.unwrap(), -10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_velocity_scales_with_elapsed_time() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();
        buffer.push(point(0, 2.0), &config).unwrap();
        // +1% over 30s is 2%/min
        let snapshot = buffer.push(point(30, 2.02), &config).unwrap();
        assert_relative_eq!(snapshot.velocity.unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_strong_classification() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();
        buffer.push(point(0, 1.0), &config).unwrap();
        buffer.push(point(60, 1.0), &config).unwrap();
        let snapshot = buffer.push(point(120, 1.5), &config).unwrap();
        assert_eq!(snapshot.class, MomentumClass::Strong);
    }

    #[test]
    fn test_weak_classification() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();
        buffer.push(point(0, 1.0), &config).unwrap();
        buffer.push(point(60, 1.05), &config).unwrap();
        let snapshot = buffer.push(point(120, 1.05), &config).unwrap();
        assert_eq!(snapshot.class, MomentumClass::Weak);
    }

    #[test]
    fn test_reversal_needs_confirmation() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();
        buffer.push(point(0, 2.2), &config).unwrap();
        buffer.push(point(6, 2.2), &config).unwrap();

        let mut price = 2.2;
        let mut classes = Vec::new();
        for (i, drop) in [0.031, 0.062, 0.093, 0.124].iter().enumerate() {
            price *= 1.0 - drop;
            let snapshot = buffer.push(point(12 + 6 * i as i64, price), &config).unwrap();
            classes.push(snapshot.class);
        }

        assert_eq!(buffer.latest().unwrap().negative_streak, 4);
        assert!(classes[..3].iter().all(|c| *c != MomentumClass::Reversing));
        assert_eq!(classes[3], MomentumClass::Reversing);
    }

    #[test]
    fn test_streak_resets_on_non_negative_velocity() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();
        buffer.push(point(0, 1.0), &config).unwrap();
        buffer.push(point(60, 0.9), &config).unwrap();
        buffer.push(point(120, 0.8), &config).unwrap();
        assert_eq!(buffer.latest().unwrap().negative_streak, 2);
        buffer.push(point(180, 0.8), &config).unwrap();
        assert_eq!(buffer.latest().unwrap().negative_streak, 0);
    }

    #[test]
    fn test_stale_sample_holds_classification() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();
        buffer.push(point(0, 1.0), &config).unwrap();
        buffer.push(point(60, 1.0), &config).unwrap();
        let held = buffer.push(point(120, 1.5), &config).unwrap();

        let result = buffer.push(point(120, 0.5), &config);
        assert!(matches!(result, Err(MomentumError::StaleSample { .. })));
        let result = buffer.push(point(90, 0.5), &config);
        assert!(matches!(result, Err(MomentumError::StaleSample { .. })));
        let result = buffer.push(point(180, f64::NAN), &config);
        assert!(matches!(result, Err(MomentumError::InvalidPrice(_))));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.current(), held);
    }

    #[test]
    fn test_sub_millisecond_gap_stays_finite() {
        let config = MomentumConfig::default();
        let mut buffer = MomentumBuffer::default();
        buffer.push(point(0, 1.0), &config).unwrap();

        let close = PricePoint { timestamp: t0() + Duration::microseconds(500), price: 1.01 };
        let fast = buffer.push(close, &config).unwrap();
        let velocity = fast.velocity.unwrap();
        assert!(velocity.is_finite());
        assert_relative_eq!(velocity, 120_000.0, max_relative = 1e-9);

        let next = buffer.push(point(60, 1.02), &config).unwrap();
        assert!(next.velocity.unwrap().is_finite());
        assert!(next.momentum.unwrap().is_finite());

        // Below microsecond resolution the gap reads as zero
        let same = PricePoint { timestamp: t0() + Duration::seconds(60) + Duration::nanoseconds(1), price: 1.03 };
        let result = buffer.push(same, &config);
        assert!(matches!(result, Err(MomentumError::StaleSample { .. })));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.current(), next);
    }

    #[test]
    fn test_buffer_is_bounded() {
        let config = MomentumConfig { buffer_capacity: 5, ..Default::default() };
        let mut buffer = MomentumBuffer::with_capacity(config.buffer_capacity);
        for i in 0..20 {
            buffer.push(point(i * 10, 1.0 + i as f64 * 0.01), &config).unwrap();
        }
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_update_moves_high_water_mark() {
        let config = MomentumConfig::default();
        let mut position = position();
        update(&mut position, point(10, 1.4), &config).unwrap();
        update(&mut position, point(20, 1.2), &config).unwrap();
        assert_eq!(position.high_water_mark(), 1.4);
        assert_eq!(position.current_price(), 1.2);

        assert!(update(&mut position, point(20, 3.0), &config).is_err());
        assert_eq!(position.high_water_mark(), 1.4);
    }
}
