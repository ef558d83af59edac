use std::path::Path;

use chrono::NaiveTime;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use common::{Error, Result, RetryPolicy};
use risk::{SizingConfig, StopConfig, StopPreset, TakeProfitConfig};
use strategy::{GridConfig, IndicatorConfig, RegimeConfig};

/// Upper bound for the time-stop and cooldown durations.
const MAX_HOLD_DAYS: i64 = 365;

/// Strategy parameters loaded from `config/bot.toml`.
///
/// Every section is optional; missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub capital: CapitalConfig,
    pub indicators: IndicatorConfig,
    pub regime: RegimeConfig,
    /// `preset = "standard" | "crypto"` picks the base values; other keys override them.
    #[serde(deserialize_with = "stop_section")]
    pub stop: StopConfig,
    pub sizing: SizingConfig,
    pub take_profit: TakeProfitConfig,
    pub grid: GridConfig,
    pub schedule: ScheduleConfig,
    pub filters: FilterConfig,
    pub retry: RetryPolicy,
}

fn stop_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<StopConfig, D::Error> {
    let mut keys = toml::Table::deserialize(d)?;
    let preset = match keys.remove("preset") {
        Some(v) => StopPreset::deserialize(v).map_err(D::Error::custom)?,
        None => StopPreset::default(),
    };
    let mut table = match toml::Value::try_from(preset.config()).map_err(D::Error::custom)? {
        toml::Value::Table(t) => t,
        other => return Err(D::Error::custom(format!("stop preset is not a table: {other}"))),
    };
    table.extend(keys);
    toml::Value::Table(table).try_into().map_err(D::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalConfig {
    /// Starting equity in USDT; realized PnL is added on top.
    pub initial_capital: f64,
    pub grid_share: f64,
    pub trend_share: f64,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            initial_capital: 120.0,
            grid_share: 0.7,
            trend_share: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Regime and strategy re-evaluation.
    pub full_cycle_secs: u64,
    /// Stop trailing, exits and time-stop.
    pub fine_cycle_secs: u64,
    /// Pause after a cycle fails as a whole.
    pub error_backoff_secs: u64,
    /// No new entries for this long after a close.
    pub cooldown_hours: i64,
    pub time_stop_days: i64,
    /// `/health` reports unhealthy when the last cycle is older than this.
    pub stale_after_secs: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            full_cycle_secs: 3_600,
            fine_cycle_secs: 300,
            error_backoff_secs: 60,
            cooldown_hours: 6,
            time_stop_days: 12,
            stale_after_secs: 7_200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub volume_filter: bool,
    /// Entries need 24h quote volume of at least this share of the daily average.
    pub volume_ratio: f64,
    pub volume_lookback_days: usize,
    /// UTC windows with no new entries, e.g. around the daily funding settlement.
    pub no_entry_windows: Vec<TimeWindow>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            volume_filter: true,
            volume_ratio: 0.9,
            volume_lookback_days: 7,
            no_entry_windows: vec![TimeWindow {
                start: NaiveTime::default(),
                end: NaiveTime::from_hms_opt(0, 15, 0).unwrap_or_default(),
            }],
        }
    }
}

/// Half-open `[start, end)` time-of-day window; wraps past midnight when `end < start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl BotConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let cfg = match std::fs::read_to_string(path) {
            Ok(text) => {
                let cfg: BotConfig = toml::from_str(&text)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
                info!(path = %path.display(), "Bot config loaded");
                cfg
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Bot config not found, using defaults");
                BotConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.capital;
        if !(c.initial_capital > 0.0 && c.initial_capital.is_finite()) {
            return Err(Error::Config("capital.initial_capital must be positive".into()));
        }
        if !(0.0..=1.0).contains(&c.grid_share) || !(0.0..=1.0).contains(&c.trend_share) {
            return Err(Error::Config("capital shares must be within [0, 1]".into()));
        }
        if c.grid_share + c.trend_share > 1.0 + 1e-9 {
            return Err(Error::Config(format!(
                "capital.grid_share + capital.trend_share = {} exceeds 1",
                c.grid_share + c.trend_share
            )));
        }

        let i = &self.indicators;
        if i.ema_period == 0 || i.rsi_period == 0 || i.atr_period == 0 || i.sigma_window == 0 {
            return Err(Error::Config("indicator periods must be positive".into()));
        }
        if i.candle_limit < i.required_candles() {
            return Err(Error::Config(format!(
                "indicators.candle_limit ({}) is below the {} candles the periods need",
                i.candle_limit,
                i.required_candles()
            )));
        }

        if self.regime.atr_rise_factor < 1.0 {
            return Err(Error::Config("regime.atr_rise_factor must be at least 1".into()));
        }
        if self.regime.volatility_ceiling <= 0.0 {
            return Err(Error::Config("regime.volatility_ceiling must be positive".into()));
        }

        self.stop.validate()?;
        self.sizing.validate()?;
        self.take_profit.validate()?;

        let g = &self.grid;
        if g.levels == 0 {
            return Err(Error::Config("grid.levels must be positive".into()));
        }
        if g.min_range_pct <= 0.0 || g.min_range_pct > g.max_range_pct {
            return Err(Error::Config("grid range bounds must satisfy 0 < min <= max".into()));
        }
        if !(0.0..100.0).contains(&g.skew_pct) {
            return Err(Error::Config("grid.skew_pct must be in [0, 100)".into()));
        }

        let s = &self.schedule;
        if s.full_cycle_secs == 0 || s.fine_cycle_secs == 0 {
            return Err(Error::Config("cycle intervals must be positive".into()));
        }
        if !(0..=MAX_HOLD_DAYS * 24).contains(&s.cooldown_hours) {
            return Err(Error::Config(format!(
                "schedule.cooldown_hours must be in [0, {}]",
                MAX_HOLD_DAYS * 24
            )));
        }
        if !(1..=MAX_HOLD_DAYS).contains(&s.time_stop_days) {
            return Err(Error::Config(format!(
                "schedule.time_stop_days must be in [1, {MAX_HOLD_DAYS}]"
            )));
        }

        if self.filters.volume_ratio <= 0.0 || self.filters.volume_lookback_days == 0 {
            return Err(Error::Config("volume filter needs a positive ratio and lookback".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        BotConfig::default().validate().unwrap();
    }

    #[test]
    fn sections_parse_with_partial_keys() {
        let text = r#"
            [capital]
            initial_capital = 500.0

            [regime]
            confirmation_threshold = 2

            [stop]
            base_atr_mult = 2.5
            exit_mode = "close"

            [filters]
            no_entry_windows = [{ start = "23:55:00", end = "00:10:00" }]
        "#;
        let cfg: BotConfig = toml::from_str(text).unwrap();
        assert_eq!(cfg.capital.initial_capital, 500.0);
        assert_eq!(cfg.capital.grid_share, 0.7);
        assert_eq!(cfg.regime.confirmation_threshold, 2);
        assert_eq!(cfg.stop.exit_mode, risk::ExitMode::Close);
        assert_eq!(cfg.stop.min_risk_pct, StopConfig::default().min_risk_pct);
        assert_eq!(cfg.schedule, ScheduleConfig::default());
        cfg.validate().unwrap();
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        let mut cfg = BotConfig::default();
        cfg.capital.grid_share = 0.8;
        assert!(cfg.validate().is_err());

        let mut cfg = BotConfig::default();
        cfg.stop.slippage_pct = 0.01;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = BotConfig::default();
        cfg.indicators.candle_limit = 20;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn durations_beyond_a_year_are_rejected() {
        let mut cfg = BotConfig::default();
        cfg.schedule.time_stop_days = i64::MAX / 2;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        let mut cfg = BotConfig::default();
        cfg.schedule.cooldown_hours = 366 * 24;
        assert!(cfg.validate().is_err());

        let mut cfg = BotConfig::default();
        cfg.schedule.time_stop_days = 365;
        cfg.schedule.cooldown_hours = 365 * 24;
        cfg.validate().unwrap();
    }

    #[test]
    fn crypto_stop_preset_with_overrides() {
        let text = r#"
            [stop]
            preset = "crypto"
            slippage_pct = 0.003
        "#;
        let cfg: BotConfig = toml::from_str(text).unwrap();
        let crypto = StopConfig::crypto();
        assert_eq!(cfg.stop.base_atr_mult, crypto.base_atr_mult);
        assert_eq!(cfg.stop.min_risk_pct, crypto.min_risk_pct);
        assert_eq!(cfg.stop.max_risk_pct, crypto.max_risk_pct);
        assert_eq!(cfg.stop.slippage_pct, 0.003);
        cfg.validate().unwrap();

        let unknown: std::result::Result<BotConfig, _> = toml::from_str("[stop]\npreset = \"forex\"");
        assert!(unknown.is_err());
    }

    #[test]
    fn shipped_file_matches_defaults() {
        let cfg: BotConfig = toml::from_str(include_str!("../../../config/bot.toml")).unwrap();
        assert_eq!(cfg, BotConfig::default());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = BotConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(cfg, BotConfig::default());
    }

    #[test]
    fn time_windows_wrap_midnight() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        let settlement = FilterConfig::default().no_entry_windows[0];
        assert!(settlement.contains(t(0, 0)));
        assert!(settlement.contains(t(0, 14)));
        assert!(!settlement.contains(t(0, 15)));

        let wrap = TimeWindow { start: t(23, 55), end: t(0, 10) };
        assert!(wrap.contains(t(23, 58)));
        assert!(wrap.contains(t(0, 5)));
        assert!(!wrap.contains(t(12, 0)));
    }
}
