use chrono::{Duration, TimeZone, Utc};
use common::{Candle, OrderSide, Side};
use proptest::prelude::*;
use strategy::indicators::RsiIndicator;
use strategy::{
    GridConfig, GridPlanner, IndicatorConfig, IndicatorSnapshot, RegimeConfig, RegimeState,
};

/// Candle path from per-bar returns, each bar spanning `range` around its close.
fn candles(returns: &[f64], range: f64) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let mut close = 100.0;
    returns
        .iter()
        .enumerate()
        .map(|(i, r)| {
            close *= 1.0 + r;
            Candle {
                open_time: start + Duration::minutes(15 * i as i64),
                open: close,
                high: close * (1.0 + range),
                low: close * (1.0 - range),
                close,
                volume: 1.0,
            }
        })
        .collect()
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

proptest! {
    #[test]
    fn rsi_stays_between_zero_and_hundred(
        returns in prop::collection::vec(-0.05f64..0.05, 15..200),
    ) {
        let closes: Vec<f64> = candles(&returns, 0.001).iter().map(|c| c.close).collect();
        let rsi = RsiIndicator::new(14).compute(&closes).unwrap();
        prop_assert!((0.0..=100.0).contains(&rsi), "rsi {rsi}");
    }

    /// Any history yields a snapshot; only long enough ones are marked sufficient.
    #[test]
    fn snapshot_is_total_over_history_length(
        returns in prop::collection::vec(-0.03f64..0.03, 0..120),
        range in 0.0f64..0.02,
    ) {
        let cfg = IndicatorConfig::default();
        let snap = IndicatorSnapshot::from_candles(&candles(&returns, range), &cfg);
        prop_assert_eq!(snap.sufficient, returns.len() >= cfg.required_candles());
        prop_assert!(snap.atr >= 0.0);
        prop_assert!(snap.sigma7 >= 0.0);
        prop_assert!(snap.volatility_ratio() >= 0.0);
        if snap.sufficient {
            prop_assert!((0.0..=100.0).contains(&snap.rsi));
        }
    }

    /// The count equals the length of the current run of identical signals.
    #[test]
    fn confirmations_count_the_current_run(
        signals in prop::collection::vec(prop::option::of(side()), 1..40),
    ) {
        let mut state = RegimeState::default();
        for s in &signals {
            state.update(*s);
        }
        let last = *signals.last().unwrap();
        let run = signals.iter().rev().take_while(|s| **s == last).count() as u32;
        prop_assert_eq!(state.current_trend, last);
        prop_assert_eq!(state.confirmation_count, if last.is_some() { run } else { 0 });

        let cfg = RegimeConfig::default();
        prop_assert_eq!(state.confirmed(&cfg, cfg.volatility_ceiling), None);
    }

    /// Buys rest below the market, sells above, every level tradeable.
    #[test]
    fn grid_levels_bracket_the_market(
        price in 1.0f64..100_000.0,
        capital in 10.0f64..100_000.0,
        atr_pct in 0.0f64..5.0,
        trend in prop::option::of(side()),
    ) {
        let planner = GridPlanner::new(GridConfig::default());
        let range = planner.range_pct(atr_pct);
        prop_assert!((3.0..=15.0).contains(&range));

        let levels = match trend {
            Some(t) => planner.skewed(price, capital, range, t),
            None => planner.symmetric(price, capital, range),
        };
        prop_assert!(levels.len() <= 12);
        for l in &levels {
            match l.side {
                OrderSide::Buy => prop_assert!(l.price < price),
                OrderSide::Sell => prop_assert!(l.price > price),
            }
            prop_assert!(l.size >= GridConfig::default().min_order_size);
        }
    }
}
