/// RSI (Relative Strength Index) indicator.
///
/// Simple averages of gains and losses over the last `period` close-to-close
/// changes (no Wilder smoothing). A window without losses reads as neutral 50.
/// Returns `None` until at least `period + 1` closed price values are available.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

/// Value reported for a window with no losses.
pub const NEUTRAL_RSI: f64 = 50.0;

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self { period }
    }

    /// Compute RSI from a slice of close prices (oldest first).
    /// Returns `None` if there are fewer than `period + 1` values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 {
            return None;
        }

        let window = &closes[closes.len() - self.period - 1..];
        let (gains, losses) = window
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold((0.0, 0.0), |(g, l), change| {
                if change > 0.0 {
                    (g + change, l)
                } else {
                    (g, l - change)
                }
            });

        let avg_gain = gains / self.period as f64;
        let avg_loss = losses / self.period as f64;

        if avg_loss == 0.0 {
            return Some(NEUTRAL_RSI);
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_returns_none_when_insufficient_data() {
        let rsi = RsiIndicator::new(14);
        // Need at least period+1 = 15 values
        let prices = vec![100.0; 14];
        assert!(rsi.compute(&prices).is_none());
    }

    #[test]
    fn rsi_without_losses_is_neutral() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        assert_eq!(rsi.compute(&prices), Some(NEUTRAL_RSI));
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 0.0).abs() < 1e-9, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_uses_only_the_last_period_changes() {
        let rsi = RsiIndicator::new(4);
        // Old crash is outside the window: +3, -1, +3, -1 => RS = 3 => RSI 75
        let prices = vec![200.0, 100.0, 103.0, 102.0, 105.0, 104.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 75.0).abs() < 1e-9, "Expected 75, got {value}");
    }

    #[test]
    fn rsi_stays_in_range() {
        let rsi = RsiIndicator::new(14);
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09,
        ];
        let v = rsi.compute(&prices).unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI out of range: {v}");
    }
}
