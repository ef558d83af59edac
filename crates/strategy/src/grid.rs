use common::{OrderSide, Side};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GridConfig, SkewPolicy};

/// One resting limit order of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

/// Builds ladders of limit orders around the market price.
#[derive(Debug, Clone)]
pub struct GridPlanner {
    cfg: GridConfig,
}

impl GridPlanner {
    pub fn new(cfg: GridConfig) -> Self {
        Self { cfg }
    }

    /// Band half-width in percent for the given ATR% of price.
    pub fn range_pct(&self, atr_pct: f64) -> f64 {
        if !self.cfg.dynamic_range || !atr_pct.is_finite() || atr_pct <= 0.0 {
            return self.cfg.static_range_pct;
        }
        (atr_pct * self.cfg.atr_range_mult).clamp(self.cfg.min_range_pct, self.cfg.max_range_pct)
    }

    /// Equal bands on both sides of `price`.
    pub fn symmetric(&self, price: f64, capital: f64, range_pct: f64) -> Vec<GridLevel> {
        self.ladder(price, price, capital, range_pct, range_pct)
    }

    /// Ladder leaning toward `trend` according to the configured skew policy.
    pub fn skewed(&self, price: f64, capital: f64, range_pct: f64, trend: Side) -> Vec<GridLevel> {
        let skew = (self.cfg.skew_pct / 100.0).clamp(0.0, 0.9);
        match self.cfg.skew_policy {
            SkewPolicy::Asymmetric => {
                let wide = range_pct * (1.0 + skew);
                let narrow = range_pct * (1.0 - skew);
                let (lower, upper) = match trend {
                    Side::Long => (narrow, wide),
                    Side::Short => (wide, narrow),
                };
                self.ladder(price, price, capital, lower, upper)
            }
            SkewPolicy::Shifted => {
                let shift = range_pct / 100.0 * skew * trend.sign();
                let center = price * (1.0 + shift);
                self.ladder(price, center, capital, range_pct, range_pct)
            }
        }
    }

    /// `levels` buys below and sells above `center`, spaced evenly across each band.
    /// Levels on the wrong side of `market` (they would fill at once) are dropped.
    fn ladder(
        &self,
        market: f64,
        center: f64,
        capital: f64,
        lower_pct: f64,
        upper_pct: f64,
    ) -> Vec<GridLevel> {
        let levels = self.cfg.levels;
        if levels == 0 || capital <= 0.0 || market <= 0.0 || center <= 0.0 {
            return Vec::new();
        }
        let notional = capital / (2 * levels) as f64;
        let mut out = Vec::with_capacity(2 * levels);

        for i in 1..=levels {
            let frac = i as f64 / levels as f64;
            let buy = self.round(center * (1.0 - lower_pct / 100.0 * frac));
            let sell = self.round(center * (1.0 + upper_pct / 100.0 * frac));

            if buy > 0.0 && buy < market {
                self.push_level(&mut out, OrderSide::Buy, buy, notional);
            }
            if sell > market {
                self.push_level(&mut out, OrderSide::Sell, sell, notional);
            }
        }
        debug!(levels = out.len(), center, lower_pct, upper_pct, "Grid ladder planned");
        out
    }

    fn push_level(&self, out: &mut Vec<GridLevel>, side: OrderSide, price: f64, notional: f64) {
        let size = notional / price;
        if size >= self.cfg.min_order_size {
            out.push(GridLevel { side, price, size });
        }
    }

    fn round(&self, price: f64) -> f64 {
        let factor = 10f64.powi(self.cfg.price_precision as i32);
        (price * factor).round() / factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(policy: SkewPolicy) -> GridPlanner {
        GridPlanner::new(GridConfig {
            levels: 4,
            skew_pct: 30.0,
            skew_policy: policy,
            min_order_size: 0.001,
            price_precision: 4,
            ..GridConfig::default()
        })
    }

    fn band(levels: &[GridLevel], side: OrderSide, price: f64) -> f64 {
        levels
            .iter()
            .filter(|l| l.side == side)
            .map(|l| (l.price - price).abs() / price * 100.0)
            .fold(0.0, f64::max)
    }

    #[test]
    fn symmetric_grid_is_evenly_spaced() {
        let grid = planner(SkewPolicy::Asymmetric).symmetric(100.0, 800.0, 8.0);
        assert_eq!(grid.len(), 8);

        let buys: Vec<f64> = grid.iter().filter(|l| l.side == OrderSide::Buy).map(|l| l.price).collect();
        assert_eq!(buys, vec![98.0, 96.0, 94.0, 92.0]);
        let sells: Vec<f64> = grid.iter().filter(|l| l.side == OrderSide::Sell).map(|l| l.price).collect();
        assert_eq!(sells, vec![102.0, 104.0, 106.0, 108.0]);

        // each level is worth capital / (2 * levels)
        for level in &grid {
            assert!((level.size * level.price - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn dynamic_range_follows_atr_within_bounds() {
        let p = planner(SkewPolicy::Asymmetric);
        assert_eq!(p.range_pct(1.0), 6.0);
        assert_eq!(p.range_pct(0.1), 3.0);
        assert_eq!(p.range_pct(10.0), 15.0);
        assert_eq!(p.range_pct(0.0), GridConfig::default().static_range_pct);
    }

    #[test]
    fn asymmetric_skew_widens_trend_side() {
        let grid = planner(SkewPolicy::Asymmetric).skewed(100.0, 800.0, 10.0, Side::Long);
        assert!((band(&grid, OrderSide::Sell, 100.0) - 13.0).abs() < 1e-9);
        assert!((band(&grid, OrderSide::Buy, 100.0) - 7.0).abs() < 1e-9);

        let grid = planner(SkewPolicy::Asymmetric).skewed(100.0, 800.0, 10.0, Side::Short);
        assert!((band(&grid, OrderSide::Buy, 100.0) - 13.0).abs() < 1e-9);
        assert!((band(&grid, OrderSide::Sell, 100.0) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn shifted_skew_never_places_marketable_orders() {
        let grid = planner(SkewPolicy::Shifted).skewed(100.0, 800.0, 10.0, Side::Long);
        // center at 103: the first buy level (100.425) would cross the market
        assert!(grid.iter().filter(|l| l.side == OrderSide::Buy).all(|l| l.price < 100.0));
        assert!(grid.iter().filter(|l| l.side == OrderSide::Sell).all(|l| l.price > 100.0));
        assert_eq!(grid.iter().filter(|l| l.side == OrderSide::Buy).count(), 3);
    }

    #[test]
    fn tiny_levels_are_skipped() {
        let p = GridPlanner::new(GridConfig { levels: 6, min_order_size: 0.01, ..GridConfig::default() });
        // 12 levels of 1 USD at ~60k are far below 0.01 contracts
        assert!(p.symmetric(60_000.0, 12.0, 10.0).is_empty());
        assert!(p.symmetric(100.0, 0.0, 10.0).is_empty());
    }
}
