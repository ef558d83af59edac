pub mod atr;
pub mod ema;
pub mod rsi;
pub mod volatility;

pub use atr::{AtrIndicator, AtrReading};
pub use ema::EmaIndicator;
pub use rsi::{RsiIndicator, NEUTRAL_RSI};

use common::Candle;
use serde::{Deserialize, Serialize};

use crate::config::IndicatorConfig;

/// Indicator values for the newest candle of a sequence.
///
/// Built fresh every cycle. When the sequence is too short the snapshot is
/// degenerate (`sufficient == false`): ATR 0, RSI 50, EMA = last close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub price: f64,
    pub ema: f64,
    pub rsi: f64,
    pub atr: f64,
    pub atr_prev: f64,
    /// Realized volatility of the last `sigma_window` returns.
    pub sigma7: f64,
    /// Minimum ATR / price for trend entries.
    pub min_atr_pct: f64,
    pub sufficient: bool,
}

impl IndicatorSnapshot {
    /// Compute all indicators from `candles` ordered oldest first.
    pub fn from_candles(candles: &[Candle], cfg: &IndicatorConfig) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let price = closes.last().copied().unwrap_or(0.0);

        let sigma7 = volatility::realized_sigma(&closes, cfg.sigma_window).unwrap_or(0.0);
        let min_atr_pct =
            volatility::adaptive_min_atr_pct(sigma7, cfg.min_atr_base, cfg.min_atr_range);

        if candles.len() < cfg.required_candles() {
            return Self::degenerate(price, sigma7, min_atr_pct);
        }

        let ema = EmaIndicator::new(cfg.ema_period).compute(&closes);
        let rsi = RsiIndicator::new(cfg.rsi_period).compute(&closes);
        let atr = AtrIndicator::new(cfg.atr_period).compute(candles);

        match (ema, rsi, atr) {
            (Some(ema), Some(rsi), Some(reading)) => Self {
                price,
                ema,
                rsi,
                atr: reading.atr,
                atr_prev: reading.atr_prev,
                sigma7,
                min_atr_pct,
                sufficient: true,
            },
            _ => Self::degenerate(price, sigma7, min_atr_pct),
        }
    }

    fn degenerate(price: f64, sigma7: f64, min_atr_pct: f64) -> Self {
        Self {
            price,
            ema: price,
            rsi: NEUTRAL_RSI,
            atr: 0.0,
            atr_prev: 0.0,
            sigma7,
            min_atr_pct,
            sufficient: false,
        }
    }

    /// ATR as a fraction of price.
    pub fn atr_fraction(&self) -> f64 {
        if self.price > 0.0 {
            self.atr / self.price
        } else {
            0.0
        }
    }

    /// ATR as percent of price.
    pub fn atr_pct(&self) -> f64 {
        self.atr_fraction() * 100.0
    }

    /// Current over previous ATR; 1.0 when undefined.
    pub fn volatility_ratio(&self) -> f64 {
        AtrReading { atr: self.atr, atr_prev: self.atr_prev }.ratio()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, TimeZone, Utc};
    use common::Candle;

    /// Uptrend with pullbacks: closes alternate +0.6% / -0.2% and bar ranges widen.
    pub fn rising_candles(n: usize) -> Vec<Candle> {
        trending_candles(n, 0.006, -0.002)
    }

    /// Mirror image of `rising_candles`.
    pub fn falling_candles(n: usize) -> Vec<Candle> {
        trending_candles(n, -0.006, 0.002)
    }

    fn trending_candles(n: usize, step: f64, pullback: f64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut close = 100.0;
        (0..n)
            .map(|i| {
                if i > 0 {
                    close *= 1.0 + if i % 2 == 1 { step } else { pullback };
                }
                let half_range = 0.002 + 0.00005 * i as f64;
                Candle {
                    open_time: start + Duration::minutes(15 * i as i64),
                    open: close,
                    high: close * (1.0 + half_range),
                    low: close * (1.0 - half_range),
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    /// Flat closes with a fixed range.
    pub fn flat_candles(n: usize, price: f64) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                open_time: start + Duration::minutes(15 * i as i64),
                open: price,
                high: price * 1.001,
                low: price * 0.999,
                close: price,
                volume: 1_000.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn short_history_yields_degenerate_snapshot() {
        let cfg = IndicatorConfig::default();
        let candles = rising_candles(cfg.required_candles() - 1);
        let snap = IndicatorSnapshot::from_candles(&candles, &cfg);
        assert!(!snap.sufficient);
        assert_eq!(snap.atr, 0.0);
        assert_eq!(snap.rsi, NEUTRAL_RSI);
        assert_eq!(snap.ema, candles.last().unwrap().close);
    }

    #[test]
    fn empty_history_does_not_panic() {
        let snap = IndicatorSnapshot::from_candles(&[], &IndicatorConfig::default());
        assert!(!snap.sufficient);
        assert_eq!(snap.price, 0.0);
        assert_eq!(snap.atr_pct(), 0.0);
    }

    #[test]
    fn rising_series_reads_bullish() {
        let cfg = IndicatorConfig::default();
        let snap = IndicatorSnapshot::from_candles(&rising_candles(100), &cfg);
        assert!(snap.sufficient);
        assert!(snap.price > snap.ema);
        assert!(snap.rsi > 55.0, "rsi {}", snap.rsi);
        assert!(snap.atr > snap.atr_prev * 1.02);
        assert!(snap.sigma7 < 0.01);
        assert!(snap.atr_fraction() > snap.min_atr_pct);
    }

    #[test]
    fn flat_series_has_no_rising_volatility() {
        let cfg = IndicatorConfig::default();
        let snap = IndicatorSnapshot::from_candles(&flat_candles(100, 50.0), &cfg);
        assert!(snap.sufficient);
        assert!((snap.ema - 50.0).abs() < 1e-9);
        assert_eq!(snap.rsi, NEUTRAL_RSI);
        assert!((snap.volatility_ratio() - 1.0).abs() < 1e-9);
        assert_eq!(snap.sigma7, 0.0);
    }
}
