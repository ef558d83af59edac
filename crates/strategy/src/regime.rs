use common::Side;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RegimeConfig;
use crate::indicators::IndicatorSnapshot;

/// Classify one snapshot: `Some(side)` when trending, `None` when ranging.
///
/// A trend needs price on the matching side of the EMA, RSI past the midline
/// in the same direction, and ATR rising by at least `atr_rise_factor`.
pub fn classify(snap: &IndicatorSnapshot, cfg: &RegimeConfig) -> Option<Side> {
    if !snap.sufficient {
        return None;
    }
    let atr_rising = snap.atr > snap.atr_prev * cfg.atr_rise_factor;
    if !atr_rising {
        return None;
    }
    if snap.price > snap.ema && snap.rsi > cfg.rsi_midline {
        Some(Side::Long)
    } else if snap.price < snap.ema && snap.rsi < cfg.rsi_midline {
        Some(Side::Short)
    } else {
        None
    }
}

/// Trend direction with its consecutive-cycle confirmation count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegimeState {
    pub current_trend: Option<Side>,
    pub confirmation_count: u32,
}

impl RegimeState {
    /// Fold in this cycle's classification.
    pub fn update(&mut self, signal: Option<Side>) {
        match signal {
            Some(side) if self.current_trend == Some(side) => {
                self.confirmation_count = self.confirmation_count.saturating_add(1);
            }
            Some(side) => {
                self.current_trend = Some(side);
                self.confirmation_count = 1;
            }
            None => {
                self.current_trend = None;
                self.confirmation_count = 0;
            }
        }
        debug!(
            trend = ?self.current_trend,
            confirmations = self.confirmation_count,
            "Regime updated"
        );
    }

    /// Trend direction once both the confirmation count and the volatility gate pass.
    pub fn confirmed(&self, cfg: &RegimeConfig, sigma: f64) -> Option<Side> {
        let counted = self.confirmation_count >= cfg.confirmation_threshold.max(1);
        let calm = sigma < cfg.volatility_ceiling;
        if counted && calm {
            self.current_trend
        } else {
            None
        }
    }
}
