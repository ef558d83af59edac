use common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Fraction of capital lost if the stop is hit (e.g. 0.008 = 0.8%).
    pub risk_per_trade: f64,
    /// Largest notional as a fraction of capital.
    pub max_exposure_pct: f64,
    /// Smallest tradeable size in base currency.
    pub min_order_size: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.008,
            max_exposure_pct: 0.30,
            min_order_size: 0.01,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade < 1.0) {
            return Err(Error::Config("sizing.risk_per_trade must be in (0, 1)".into()));
        }
        if !(self.max_exposure_pct > 0.0 && self.max_exposure_pct.is_finite()) {
            return Err(Error::Config("sizing.max_exposure_pct must be positive".into()));
        }
        if !(self.min_order_size > 0.0 && self.min_order_size.is_finite()) {
            return Err(Error::Config("sizing.min_order_size must be positive".into()));
        }
        Ok(())
    }
}

/// Turns a risk budget and a stop distance into an order size.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    cfg: SizingConfig,
}

impl PositionSizer {
    pub fn new(cfg: SizingConfig) -> Self {
        Self { cfg }
    }

    /// Size so that hitting `stop` loses `capital * risk_per_trade`, capped by
    /// the exposure limit and floored at the minimum order size.
    ///
    /// The floor wins when the cap itself is below the minimum size.
    pub fn size(&self, entry: f64, stop: f64, capital: f64) -> Result<f64> {
        if !entry.is_finite() || entry <= 0.0 {
            return Err(Error::InvalidInput(format!("entry must be positive, got {entry}")));
        }
        if !stop.is_finite() {
            return Err(Error::InvalidInput(format!("stop must be finite, got {stop}")));
        }
        if !capital.is_finite() || capital < 0.0 {
            return Err(Error::InvalidInput(format!(
                "capital must be non-negative, got {capital}"
            )));
        }

        let distance = (entry - stop).abs();
        if distance <= 0.0 {
            return Ok(self.cfg.min_order_size);
        }

        let risk_usd = capital * self.cfg.risk_per_trade;
        let cap = capital * self.cfg.max_exposure_pct / entry;
        let size = (risk_usd / distance).min(cap).max(self.cfg.min_order_size);
        debug!(entry, stop, capital, risk_usd, cap, size, "Position sized");
        Ok(size)
    }
}
