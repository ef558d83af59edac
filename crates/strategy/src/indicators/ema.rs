/// Exponential moving average with multiplier `2 / (period + 1)`.
///
/// Seeded with the simple average of the first `period` closes, then recursed
/// forward to the newest close.
#[derive(Debug, Clone)]
pub struct EmaIndicator {
    pub period: usize,
}

impl EmaIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self { period }
    }

    pub fn multiplier(&self) -> f64 {
        2.0 / (self.period as f64 + 1.0)
    }

    /// Compute the EMA of `closes` (oldest first).
    /// Returns `None` if there are fewer than `period` values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period {
            return None;
        }
        let k = self.multiplier();
        let seed = closes[..self.period].iter().sum::<f64>() / self.period as f64;
        let ema = closes[self.period..]
            .iter()
            .fold(seed, |ema, &close| close * k + ema * (1.0 - k));
        Some(ema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_of_constant_series_is_the_constant() {
        let ema = EmaIndicator::new(5);
        let v = ema.compute(&[42.0; 20]).unwrap();
        assert!((v - 42.0).abs() < 1e-12);
    }

    #[test]
    fn ema_matches_hand_computed_recursion() {
        // period 3, k = 0.5, seed = (1+2+3)/3 = 2
        // 4 -> 3.0, 5 -> 4.0
        let ema = EmaIndicator::new(3);
        let v = ema.compute(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert!((v - 4.0).abs() < 1e-12, "got {v}");
    }

    #[test]
    fn ema_weights_recent_prices_more() {
        let ema = EmaIndicator::new(3);
        let rising = ema.compute(&[1.0, 1.0, 1.0, 1.0, 10.0]).unwrap();
        let early = ema.compute(&[1.0, 1.0, 10.0, 1.0, 1.0]).unwrap();
        assert!(rising > early);
    }

    #[test]
    fn ema_returns_none_when_insufficient_data() {
        assert!(EmaIndicator::new(50).compute(&[1.0; 49]).is_none());
    }
}
