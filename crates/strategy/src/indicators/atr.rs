use common::Candle;

/// Average True Range as a simple moving average of true ranges.
#[derive(Debug, Clone)]
pub struct AtrIndicator {
    pub period: usize,
}

/// ATR over the latest window and over the window right before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtrReading {
    pub atr: f64,
    pub atr_prev: f64,
}

impl AtrReading {
    /// Current over previous ATR; 1.0 when there is no previous reading.
    pub fn ratio(&self) -> f64 {
        if self.atr_prev > 0.0 {
            self.atr / self.atr_prev
        } else {
            1.0
        }
    }
}

/// True ranges of `candles[1..]` (each needs the previous close).
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let c = &w[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect()
}

impl AtrIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period }
    }

    /// Compute ATR from candles (oldest first).
    /// Returns `None` if there are fewer than `period + 1` candles.
    ///
    /// `atr_prev` averages the `period` true ranges preceding the current
    /// window, or as many as exist; with none it equals `atr`.
    pub fn compute(&self, candles: &[Candle]) -> Option<AtrReading> {
        if candles.len() < self.period + 1 {
            return None;
        }
        let trs = true_ranges(candles);
        let split = trs.len() - self.period;
        let atr = mean(&trs[split..]);

        let prev_start = split.saturating_sub(self.period);
        let atr_prev = if split > 0 { mean(&trs[prev_start..split]) } else { atr };

        Some(AtrReading { atr, atr_prev })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(i: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(i * 900, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn true_range_covers_gaps() {
        let candles = vec![candle(0, 101.0, 99.0, 100.0), candle(1, 106.0, 105.0, 105.5)];
        // gap up: |high - prev_close| = 6 beats high - low = 1
        assert_eq!(true_ranges(&candles), vec![6.0]);
    }

    #[test]
    fn atr_and_previous_window() {
        // Ranges 1,1,1 then 2,2,2 with flat closes
        let mut candles = vec![candle(0, 100.5, 99.5, 100.0)];
        for i in 1..=3 {
            candles.push(candle(i, 100.5, 99.5, 100.0));
        }
        for i in 4..=6 {
            candles.push(candle(i, 101.0, 99.0, 100.0));
        }
        let reading = AtrIndicator::new(3).compute(&candles).unwrap();
        assert!((reading.atr - 2.0).abs() < 1e-12);
        assert!((reading.atr_prev - 1.0).abs() < 1e-12);
        assert!((reading.ratio() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn atr_prev_equals_atr_without_history() {
        let candles: Vec<Candle> = (0..4).map(|i| candle(i, 101.0, 99.0, 100.0)).collect();
        let reading = AtrIndicator::new(3).compute(&candles).unwrap();
        assert_eq!(reading.atr, reading.atr_prev);
    }

    #[test]
    fn atr_returns_none_when_insufficient_data() {
        let candles: Vec<Candle> = (0..3).map(|i| candle(i, 101.0, 99.0, 100.0)).collect();
        assert!(AtrIndicator::new(3).compute(&candles).is_none());
    }
}
