use common::{Error, Result, Side};
use serde::{Deserialize, Serialize};

/// Risk-multiple bands for the take-profit target. ATR thresholds are in percent of price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeProfitConfig {
    pub low_atr_pct: f64,
    pub high_atr_pct: f64,
    pub calm_mult: f64,
    pub default_mult: f64,
    pub volatile_mult: f64,
    pub price_precision: u32,
}

impl Default for TakeProfitConfig {
    fn default() -> Self {
        Self {
            low_atr_pct: 1.5,
            high_atr_pct: 2.5,
            calm_mult: 1.8,
            default_mult: 1.6,
            volatile_mult: 1.4,
            price_precision: 2,
        }
    }
}

impl TakeProfitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.low_atr_pct > self.high_atr_pct {
            return Err(Error::Config("take_profit.low_atr_pct must not exceed high_atr_pct".into()));
        }
        for (name, value) in [
            ("calm_mult", self.calm_mult),
            ("default_mult", self.default_mult),
            ("volatile_mult", self.volatile_mult),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::Config(format!("take_profit.{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn tp_multiplier(&self, atr_pct: f64) -> f64 {
        if atr_pct > self.high_atr_pct {
            self.volatile_mult
        } else if atr_pct < self.low_atr_pct {
            self.calm_mult
        } else {
            self.default_mult
        }
    }

    /// Target at `multiplier` times the stop distance beyond entry.
    pub fn tp_price(&self, entry: f64, stop: f64, side: Side, atr_pct: f64) -> f64 {
        let distance = (entry - stop).abs();
        let target = entry + side.sign() * distance * self.tp_multiplier(atr_pct);
        let factor = 10f64.powi(self.price_precision as i32);
        (target * factor).round() / factor
    }
}
