//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Score boundedness - composite score stays in 0-100 for every profile
//! 2. Hard-filter dominance - any failed filter forces Avoid with score 0
//! 3. Exit priority - a stop-loss breach wins over every other rule
//! 4. Phase idempotence - a filled phase never fires again
//! 5. Ledger conservation - fills plus remaining always equal the entry amount
//! 6. Slippage bound - every computed bound lies in 500-2500 bps

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use gradsniper::domain::intent::{ExitReason, PositionId, Urgency};
use gradsniper::domain::position::{Position, PositionError};
use gradsniper::domain::snapshot::{MarketSnapshot, PriceHistory};
use gradsniper::strategy::exits::{self, ExitConfig};
use gradsniper::strategy::momentum::{MomentumBuffer, MomentumClass, MomentumSnapshot};
use gradsniper::strategy::scorer::{OpportunityScorer, Recommendation, WeightProfile};
use gradsniper::strategy::slippage::{self, EMERGENCY_BPS, FLOOR_BPS};

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn position(config: ExitConfig) -> Position {
    Position::new(PositionId(1), "MintAAA".to_string(), 1.0, 1000.0, t0(), config, MomentumBuffer::default())
        .unwrap()
}

fn momentum(class: MomentumClass) -> MomentumSnapshot {
    MomentumSnapshot {
        class,
        velocity: Some(0.0),
        momentum: Some(0.0),
        negative_streak: 0,
        timestamp: Some(t0()),
    }
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_profile() -> impl Strategy<Value = WeightProfile> {
    prop_oneof![
        Just(WeightProfile::Default),
        Just(WeightProfile::Aggressive),
        Just(WeightProfile::Conservative),
    ]
}

fn arb_class() -> impl Strategy<Value = MomentumClass> {
    prop_oneof![
        Just(MomentumClass::Strong),
        Just(MomentumClass::Normal),
        Just(MomentumClass::Weak),
        Just(MomentumClass::Reversing),
    ]
}

fn arb_urgency() -> impl Strategy<Value = Urgency> {
    prop_oneof![Just(Urgency::Normal), Just(Urgency::High), Just(Urgency::Critical)]
}

prop_compose! {
    /// Any in-range snapshot, whether or not it passes the hard filters
    fn arb_snapshot()(
        (progress, progress_change) in (0.0..=100.0_f64, -10.0..50.0_f64),
        (volume_5m, volume_1h, acceleration) in (0.0..20.0_f64, 0.0..500.0_f64, 0.0..8.0_f64),
        (trades_5m, trades_1h) in (0u32..500, 0u32..5000),
        (holders, growth) in (0u32..10_000, -50.0..300.0_f64),
        (top10, creator, gini) in (0.0..=100.0_f64, 0.0..=100.0_f64, 0.0..=1.0_f64),
        (buy_sell, buyers, wash) in (0.0..20.0_f64, 0u32..1000, 0.0..=100.0_f64),
        (liquidity, market_cap, price_change) in (0.0..500.0_f64, 0.0..5000.0_f64, -100.0..1000.0_f64),
    ) -> MarketSnapshot {
        MarketSnapshot {
            asset_id: "MintAAA".to_string(),
            graduation_progress: progress,
            progress_change_1h: progress_change,
            volume_5m,
            volume_1h,
            volume_24h: volume_1h * 4.0,
            trades_5m,
            trades_1h,
            volume_acceleration: acceleration,
            holder_count: holders,
            holder_growth_1h: growth,
            top10_concentration: top10,
            creator_holding: creator,
            gini,
            buy_sell_ratio: buy_sell,
            unique_buyers_1h: buyers,
            wash_trade_likelihood: wash,
            liquidity,
            market_cap,
            price_change_1h: price_change,
            price_history: PriceHistory::default(),
        }
    }
}

prop_compose! {
    /// Snapshot that clears every default hard filter
    fn arb_passing_snapshot()(
        base in arb_snapshot(),
        progress in 70.0..99.9_f64,
        volume_1h in 1.0..500.0_f64,
        holders in 50u32..10_000,
        (top10, creator, wash) in (0.0..=70.0_f64, 0.0..=15.0_f64, 0.0..=60.0_f64),
        buyers in 5u32..1000,
    ) -> MarketSnapshot {
        let mut snapshot = base;
        snapshot.graduation_progress = progress;
        snapshot.volume_1h = volume_1h;
        snapshot.holder_count = holders;
        snapshot.top10_concentration = top10;
        snapshot.creator_holding = creator;
        snapshot.wash_trade_likelihood = wash;
        snapshot.unique_buyers_1h = buyers;
        snapshot
    }
}

// ── 1. Score Boundedness ─────────────────────────────────────────────

proptest! {
    #[test]
    fn score_is_bounded(snapshot in arb_snapshot(), profile in arb_profile()) {
        let result = OpportunityScorer::default().score(&snapshot, profile);
        prop_assert!((0.0..=100.0).contains(&result.score), "score {}", result.score);
        prop_assert!((result.score - result.rederive()).abs() < 1e-9);
        if result.is_rejected() {
            prop_assert_eq!(result.recommendation, Recommendation::Avoid);
        } else {
            prop_assert_eq!(result.recommendation, Recommendation::from_score(result.score));
        }
    }

    #[test]
    fn passing_snapshot_is_never_rejected(snapshot in arb_passing_snapshot(), profile in arb_profile()) {
        let result = OpportunityScorer::default().score(&snapshot, profile);
        prop_assert!(!result.is_rejected(), "rejected: {:?}", result.rejection);
        prop_assert_eq!(result.recommendation, Recommendation::from_score(result.score));
    }
}

// ── 2. Hard-Filter Dominance ─────────────────────────────────────────

proptest! {
    #[test]
    fn failed_filter_forces_avoid(
        base in arb_passing_snapshot(),
        profile in arb_profile(),
        which in 0usize..4,
        excess in 0.5..30.0_f64,
    ) {
        let mut snapshot = base;
        match which {
            0 => snapshot.top10_concentration = 70.0 + excess,
            1 => snapshot.creator_holding = 15.0 + excess,
            2 => snapshot.wash_trade_likelihood = 60.0 + excess,
            _ => snapshot.holder_count = (excess as u32).min(49),
        }

        let result = OpportunityScorer::default().score(&snapshot, profile);
        prop_assert_eq!(result.recommendation, Recommendation::Avoid);
        prop_assert_eq!(result.score, 0.0);
        prop_assert!(result.is_rejected());
    }
}

// ── 3. Exit Priority ─────────────────────────────────────────────────

proptest! {
    /// A stop-loss breach wins regardless of momentum or elapsed time
    #[test]
    fn stop_loss_always_wins(
        price in 0.01..0.70_f64,
        class in arb_class(),
        minutes in 0i64..600,
        adaptive in any::<bool>(),
    ) {
        let mut position = position(ExitConfig { adaptive_enabled: adaptive, ..Default::default() });
        position.observe_price(price);

        let decision = exits::evaluate(&position, &momentum(class), t0() + Duration::minutes(minutes));
        let decision = decision.expect("stop loss must fire");
        prop_assert_eq!(decision.reason, ExitReason::StopLoss);
        prop_assert_eq!(decision.urgency, Urgency::Critical);
        prop_assert_eq!(decision.fraction, 1.0);
    }
}

// ── 4. Phase Idempotence ─────────────────────────────────────────────

proptest! {
    /// Once phase 1 has filled, no later price or momentum re-triggers it
    #[test]
    fn filled_phase_never_repeats(
        path in prop::collection::vec(0.71..10.0_f64, 1..20),
        class in arb_class(),
        adaptive in any::<bool>(),
    ) {
        let mut position = position(ExitConfig { adaptive_enabled: adaptive, ..Default::default() });
        let reason = if adaptive { ExitReason::AdaptivePartial1 } else { ExitReason::Partial1 };
        position.record_fill(reason, 400.0, 2.0, t0()).unwrap();

        for price in path {
            position.observe_price(price);
            if let Some(decision) = exits::evaluate(&position, &momentum(class), t0() + Duration::minutes(5)) {
                prop_assert_ne!(decision.reason.phase(), Some(1));
            }
        }
    }
}

// ── 5. Ledger Conservation ───────────────────────────────────────────

proptest! {
    #[test]
    fn remaining_is_monotonic_and_conserved(fractions in prop::collection::vec(0.01..=1.0_f64, 1..10)) {
        let mut position = position(ExitConfig::default());
        let mut previous = position.remaining_amount();

        for (i, fraction) in fractions.into_iter().enumerate() {
            if position.is_terminal() {
                break;
            }
            let amount = position.remaining_amount() * fraction;
            let ts = t0() + Duration::seconds(i as i64);
            prop_assert!(position.record_fill(ExitReason::Manual, amount, 1.5, ts).is_ok());

            let remaining = position.remaining_amount();
            prop_assert!(remaining <= previous);
            prop_assert!(remaining >= 0.0);
            let sold: f64 = position.fills().iter().map(|f| f.amount).sum();
            prop_assert!((sold + remaining - position.original_amount).abs() < 1e-6);
            previous = remaining;
        }
    }

    /// A fill larger than what remains is refused and freezes the position
    #[test]
    fn overfill_freezes_without_applying(excess in 1.0..1000.0_f64) {
        let mut position = position(ExitConfig::default());
        position.record_fill(ExitReason::Partial1, 400.0, 2.0, t0()).unwrap();

        let result = position.record_fill(ExitReason::Manual, 600.0 + excess, 2.0, t0());
        let is_corrupted = matches!(result, Err(PositionError::LedgerCorrupted { .. }));
        prop_assert!(is_corrupted);
        prop_assert!(position.is_frozen());
        prop_assert_eq!(position.remaining_amount(), 600.0);
        prop_assert_eq!(position.fills().len(), 1);
    }
}

// ── 6. Slippage Bound ────────────────────────────────────────────────

proptest! {
    #[test]
    fn slippage_is_bounded(pnl in prop::num::f64::ANY, urgency in arb_urgency()) {
        let bps = slippage::for_pnl(pnl, urgency);
        prop_assert!(bps >= FLOOR_BPS);
        prop_assert!(bps <= EMERGENCY_BPS);
    }

    #[test]
    fn entry_slippage_is_bounded(urgency in arb_urgency()) {
        let bps = slippage::for_entry(urgency);
        prop_assert!((FLOOR_BPS..=EMERGENCY_BPS).contains(&bps));
    }
}
