/// Root-mean-square of the last `window` close-to-close simple returns.
/// Returns `None` if there are fewer than `window + 1` closes.
pub fn realized_sigma(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window + 1 {
        return None;
    }
    let tail = &closes[closes.len() - window - 1..];
    let sum_sq: f64 = tail
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| {
            let r = w[1] / w[0] - 1.0;
            r * r
        })
        .sum();
    Some((sum_sq / window as f64).sqrt())
}

/// Minimum ATR (fraction of price) for trend entries, following realized
/// volatility inside `base ± range`.
pub fn adaptive_min_atr_pct(sigma: f64, base: f64, range: f64) -> f64 {
    sigma.clamp(base - range, base + range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigma_of_alternating_returns() {
        // returns +1%, -1% ... => RMS 1%
        let mut closes = vec![100.0];
        for i in 0..7 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last * 1.01 } else { last * 0.99 });
        }
        let sigma = realized_sigma(&closes, 7).unwrap();
        assert!((sigma - 0.01).abs() < 1e-12, "got {sigma}");
    }

    #[test]
    fn min_atr_is_clamped_into_band() {
        assert_eq!(adaptive_min_atr_pct(0.0, 0.003, 0.0005), 0.0025);
        assert_eq!(adaptive_min_atr_pct(0.05, 0.003, 0.0005), 0.0035);
        assert!((adaptive_min_atr_pct(0.0031, 0.003, 0.0005) - 0.0031).abs() < 1e-15);
    }

    #[test]
    fn sigma_needs_window_plus_one_closes() {
        assert!(realized_sigma(&[1.0; 7], 7).is_none());
        assert_eq!(realized_sigma(&[1.0; 8], 7), Some(0.0));
    }
}
