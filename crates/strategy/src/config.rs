use serde::{Deserialize, Serialize};

/// Indicator windows and the adaptive min-ATR band.
///
/// Example `[indicators]` section of `config/bot.toml`:
/// ```toml
/// [indicators]
/// timeframe = "15m"
/// candle_limit = 100
/// ema_period = 50
/// rsi_period = 14
/// atr_period = 14
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Candle timeframe requested from the exchange.
    pub timeframe: String,
    /// Number of candles fetched per full cycle.
    pub candle_limit: usize,
    pub ema_period: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    /// Returns used for the short-horizon realized volatility.
    pub sigma_window: usize,
    /// Center of the adaptive min-ATR band, as a fraction of price.
    pub min_atr_base: f64,
    /// Half-width of the adaptive min-ATR band.
    pub min_atr_range: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            timeframe: "15m".to_string(),
            candle_limit: 100,
            ema_period: 50,
            rsi_period: 14,
            atr_period: 14,
            sigma_window: 7,
            min_atr_base: 0.003,
            min_atr_range: 0.0005,
        }
    }
}

impl IndicatorConfig {
    /// Candles required for a non-degenerate snapshot.
    pub fn required_candles(&self) -> usize {
        self.ema_period.max(self.rsi_period).max(self.atr_period) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub rsi_midline: f64,
    /// ATR must exceed the previous window's ATR by this factor to count as rising.
    pub atr_rise_factor: f64,
    /// Consecutive agreeing cycles before a trend is confirmed.
    pub confirmation_threshold: u32,
    /// sigma7 must stay below this for a trend to be confirmed.
    pub volatility_ceiling: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            rsi_midline: 50.0,
            atr_rise_factor: 1.02,
            confirmation_threshold: 1,
            volatility_ceiling: 0.01,
        }
    }
}

/// How the grid leans toward a confirmed trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewPolicy {
    /// Trend-side band widened by `skew_pct`, the other side narrowed by as much.
    #[default]
    Asymmetric,
    /// Both bands keep their width; the ladder center moves toward the trend.
    Shifted,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridConfig {
    /// Orders per side.
    pub levels: usize,
    /// Band half-width in percent when the dynamic range is off.
    pub static_range_pct: f64,
    pub dynamic_range: bool,
    /// Band half-width = ATR% x this, clamped into [min_range_pct, max_range_pct].
    pub atr_range_mult: f64,
    pub min_range_pct: f64,
    pub max_range_pct: f64,
    /// Skew applied in trend mode, in percent of the band.
    pub skew_pct: f64,
    pub skew_policy: SkewPolicy,
    /// Levels whose size falls below this are skipped.
    pub min_order_size: f64,
    /// Decimals used when rounding level prices.
    pub price_precision: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            levels: 6,
            static_range_pct: 15.0,
            dynamic_range: true,
            atr_range_mult: 6.0,
            min_range_pct: 3.0,
            max_range_pct: 15.0,
            skew_pct: 30.0,
            skew_policy: SkewPolicy::Asymmetric,
            min_order_size: 0.01,
            price_precision: 1,
        }
    }
}
