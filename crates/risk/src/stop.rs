//! Adaptive stop-loss ("Stop Voron").
//!
//! A stop is built in fixed stages: ATR-multiple base stop, minimum-risk
//! push-out, trailing ratchet, maximum-loss clamp, trigger buffer, rounding.
//! Each stage only ever moves the stop in a direction that keeps the
//! invariants of the previous stages intact.

use common::{Error, Result, Side};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Market condition the stop adapts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    #[default]
    Normal,
    Trending,
    Volatile,
}

/// Which price decides that a stop was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitMode {
    /// Bar low (long) / high (short): wicks through the stop count.
    #[default]
    Intrabar,
    /// Only the close counts.
    Close,
}

/// Named starting point for a [`StopConfig`]; explicit keys override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopPreset {
    #[default]
    Standard,
    Crypto,
}

impl StopPreset {
    pub fn config(self) -> StopConfig {
        match self {
            StopPreset::Standard => StopConfig::default(),
            StopPreset::Crypto => StopConfig::crypto(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub base_atr_mult: f64,
    /// Stop is never closer to entry than this fraction.
    pub min_risk_pct: f64,
    /// Stop is never farther from entry than this fraction (before regime adjustment).
    pub max_risk_pct: f64,
    pub trailing_enabled: bool,
    /// Scale the ATR multiple with volatility ratio and regime.
    pub dynamic_atr: bool,
    pub exit_mode: ExitMode,
    /// Trigger buffer as a fraction of the stop price.
    pub slippage_pct: f64,
    /// Favorable excursion, in ATRs, before trailing starts.
    pub trailing_activation_mult: f64,
    /// Trailing distance from price, in ATRs.
    pub trailing_atr_mult: f64,
    /// Trailing stop keeps at least this fraction of price between itself and price.
    pub trailing_min_gap_pct: f64,
    pub high_volatility_ratio: f64,
    pub low_volatility_ratio: f64,
    /// Decimals of the instrument's price.
    pub price_precision: u32,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            base_atr_mult: 2.0,
            min_risk_pct: 0.005,
            max_risk_pct: 0.04,
            trailing_enabled: true,
            dynamic_atr: true,
            exit_mode: ExitMode::Intrabar,
            slippage_pct: 0.001,
            trailing_activation_mult: 0.5,
            trailing_atr_mult: 0.7,
            trailing_min_gap_pct: 0.01,
            high_volatility_ratio: 1.5,
            low_volatility_ratio: 0.7,
            price_precision: 2,
        }
    }
}

impl StopConfig {
    /// Wider settings for crypto perpetuals.
    pub fn crypto() -> Self {
        Self {
            base_atr_mult: 2.5,
            min_risk_pct: 0.008,
            max_risk_pct: 0.06,
            exit_mode: ExitMode::Intrabar,
            slippage_pct: 0.002,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("base_atr_mult", self.base_atr_mult),
            ("min_risk_pct", self.min_risk_pct),
            ("max_risk_pct", self.max_risk_pct),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!("stop.{name} must be positive, got {value}")));
            }
        }
        if !(0.0..self.min_risk_pct).contains(&self.slippage_pct) {
            return Err(Error::Config(format!(
                "stop.slippage_pct ({}) must be in [0, min_risk_pct ({}))",
                self.slippage_pct, self.min_risk_pct
            )));
        }
        if self.min_risk_pct >= self.max_risk_pct * 0.8 {
            return Err(Error::Config(format!(
                "stop.min_risk_pct ({}) must stay below the narrowed max risk ({})",
                self.min_risk_pct,
                self.max_risk_pct * 0.8
            )));
        }
        if !(0.0..1.0).contains(&self.trailing_min_gap_pct) {
            return Err(Error::Config("stop.trailing_min_gap_pct must be in [0, 1)".into()));
        }
        Ok(())
    }
}

/// Computes stops and exit decisions for one instrument.
#[derive(Debug, Clone)]
pub struct StopEngine {
    cfg: StopConfig,
}

impl StopEngine {
    pub fn new(cfg: StopConfig) -> Self {
        Self { cfg }
    }

    pub fn atr_multiplier(&self, volatility_ratio: f64, regime: MarketRegime) -> f64 {
        if !self.cfg.dynamic_atr {
            return self.cfg.base_atr_mult;
        }
        let mut mult = self.cfg.base_atr_mult;
        if volatility_ratio > self.cfg.high_volatility_ratio {
            mult *= 1.3;
        } else if volatility_ratio < self.cfg.low_volatility_ratio {
            mult *= 0.8;
        }
        match regime {
            MarketRegime::Trending => mult *= 0.9,
            MarketRegime::Volatile => mult *= 1.2,
            MarketRegime::Normal => {}
        }
        (mult * 100.0).round() / 100.0
    }

    /// Largest allowed distance from entry, as a fraction of entry.
    pub fn max_loss_pct(&self, volatility_ratio: f64, regime: MarketRegime) -> f64 {
        if regime == MarketRegime::Trending {
            self.cfg.max_risk_pct * 1.2
        } else if regime == MarketRegime::Volatile
            || volatility_ratio > self.cfg.high_volatility_ratio
        {
            self.cfg.max_risk_pct * 0.8
        } else {
            self.cfg.max_risk_pct
        }
    }

    /// Stop price for a position opened at `entry`.
    ///
    /// Without `current_price` the result is strictly below entry for longs and
    /// strictly above for shorts. With it, the stop may trail past entry.
    pub fn compute_stop(
        &self,
        entry: f64,
        atr: f64,
        side: Side,
        current_price: Option<f64>,
        volatility_ratio: f64,
        regime: MarketRegime,
    ) -> Result<f64> {
        if !entry.is_finite() || entry <= 0.0 {
            return Err(Error::InvalidInput(format!("entry must be positive, got {entry}")));
        }
        if !atr.is_finite() || atr < 0.0 {
            return Err(Error::InvalidInput(format!("atr must be non-negative, got {atr}")));
        }
        if !volatility_ratio.is_finite() || volatility_ratio < 0.0 {
            return Err(Error::InvalidInput(format!(
                "volatility ratio must be non-negative, got {volatility_ratio}"
            )));
        }
        if let Some(price) = current_price {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::InvalidInput(format!(
                    "current price must be positive, got {price}"
                )));
            }
        }

        let mult = self.atr_multiplier(volatility_ratio, regime);
        let sign = side.sign();

        // Base stop, pushed out to at least min_risk_pct from entry.
        let min_risk_stop = entry * (1.0 - sign * self.cfg.min_risk_pct);
        let mut stop = further(side, entry - sign * atr * mult, min_risk_stop);

        // Trailing.
        let mut trailed = false;
        if let (true, Some(price)) = (self.cfg.trailing_enabled, current_price) {
            let excursion = (price - entry) * sign;
            if excursion > atr * self.cfg.trailing_activation_mult {
                let by_atr = price - sign * atr * self.cfg.trailing_atr_mult;
                let by_gap = price * (1.0 - sign * self.cfg.trailing_min_gap_pct);
                let candidate = further(side, by_atr, by_gap);
                let next = tighter(side, stop, candidate);
                trailed = next != stop;
                stop = next;
            }
        }

        // Maximum-loss clamp.
        let max_loss = self.max_loss_pct(volatility_ratio, regime);
        let max_loss_stop = entry * (1.0 - sign * max_loss);
        stop = tighter(side, stop, max_loss_stop);

        // Trigger buffer: fire early so the slipped fill lands on the modeled stop.
        stop *= 1.0 + sign * self.cfg.slippage_pct;

        let rounded = self.round(stop);
        let in_band = match side {
            Side::Long => rounded >= max_loss_stop && (trailed || rounded < entry),
            Side::Short => rounded <= max_loss_stop && (trailed || rounded > entry),
        };
        let result = if in_band { rounded } else { stop };

        debug!(
            entry,
            atr,
            side = %side,
            mult,
            max_loss,
            trailed,
            stop = result,
            "Stop computed"
        );
        Ok(result)
    }

    /// Whether the position should be closed at this bar/price.
    pub fn should_exit(
        &self,
        current_price: f64,
        stop: f64,
        side: Side,
        bar_low: Option<f64>,
        bar_high: Option<f64>,
        close: Option<f64>,
    ) -> bool {
        let probe = match self.cfg.exit_mode {
            ExitMode::Intrabar => match side {
                Side::Long => bar_low.unwrap_or(current_price),
                Side::Short => bar_high.unwrap_or(current_price),
            },
            ExitMode::Close => close.unwrap_or(current_price),
        };
        match side {
            Side::Long => probe <= stop,
            Side::Short => probe >= stop,
        }
    }

    /// Round a price to instrument precision.
    pub fn round(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.cfg.price_precision as i32);
        (price * factor).round() / factor
    }
}

/// The stop farther from price (looser) of the two.
fn further(side: Side, a: f64, b: f64) -> f64 {
    match side {
        Side::Long => a.min(b),
        Side::Short => a.max(b),
    }
}

/// The stop closer to price (tighter) of the two.
fn tighter(side: Side, a: f64, b: f64) -> f64 {
    match side {
        Side::Long => a.max(b),
        Side::Short => a.min(b),
    }
}

/// Stop bookkeeping for the one open position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopState {
    /// Ratcheted stop currently protecting the position.
    pub trail_stop_price: Option<f64>,
    pub last_computed_stop: Option<f64>,
    /// Exchange id of the protective trigger order, when one is known to rest.
    pub protective_order_id: Option<String>,
}

impl StopState {
    /// Record a freshly computed stop and ratchet the trailing stop toward it.
    /// Returns whether `trail_stop_price` changed.
    pub fn ratchet(&mut self, side: Side, candidate: f64) -> bool {
        self.last_computed_stop = Some(candidate);
        let next = match self.trail_stop_price {
            Some(prev) => tighter(side, prev, candidate),
            None => candidate,
        };
        let moved = self.trail_stop_price != Some(next);
        self.trail_stop_price = Some(next);
        moved
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
