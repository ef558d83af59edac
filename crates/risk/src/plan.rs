use common::{Error, Result, Side};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::sizing::PositionSizer;
use crate::stop::{MarketRegime, StopEngine};
use crate::take_profit::TakeProfitConfig;

/// A fully validated trend entry: nothing reaches the exchange without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPlan {
    pub side: Side,
    pub entry: f64,
    pub size: f64,
    pub stop: f64,
    pub take_profit: f64,
}

impl EntryPlan {
    /// Loss in quote currency if the stop fills exactly.
    pub fn risk_usd(&self) -> f64 {
        (self.entry - self.stop).abs() * self.size
    }
}

/// Combines stop, sizing and take-profit into one entry decision.
#[derive(Debug, Clone)]
pub struct EntryPlanner {
    stops: StopEngine,
    sizer: PositionSizer,
    take_profit: TakeProfitConfig,
}

impl EntryPlanner {
    pub fn new(stops: StopEngine, sizer: PositionSizer, take_profit: TakeProfitConfig) -> Self {
        Self { stops, sizer, take_profit }
    }

    pub fn plan(
        &self,
        side: Side,
        entry: f64,
        atr: f64,
        volatility_ratio: f64,
        regime: MarketRegime,
        capital: f64,
    ) -> Result<EntryPlan> {
        let stop = self.stops.compute_stop(entry, atr, side, None, volatility_ratio, regime)?;
        let size = self.sizer.size(entry, stop, capital)?;
        let atr_pct = atr / entry * 100.0;
        let take_profit = self.take_profit.tp_price(entry, stop, side, atr_pct);

        let plan = EntryPlan { side, entry, size, stop, take_profit };
        validate(&plan)?;
        info!(
            side = %side,
            entry,
            size,
            stop,
            take_profit,
            risk_usd = plan.risk_usd(),
            "Entry planned"
        );
        Ok(plan)
    }
}

fn validate(plan: &EntryPlan) -> Result<()> {
    let sign = plan.side.sign();
    let problem = if !(plan.size.is_finite() && plan.size > 0.0) {
        Some(format!("non-positive size {}", plan.size))
    } else if (plan.entry - plan.stop) * sign <= 0.0 {
        Some(format!("{} stop {} on the wrong side of entry {}", plan.side, plan.stop, plan.entry))
    } else if (plan.take_profit - plan.entry) * sign <= 0.0 {
        Some(format!(
            "{} take-profit {} on the wrong side of entry {}",
            plan.side, plan.take_profit, plan.entry
        ))
    } else {
        None
    };
    match problem {
        Some(msg) => {
            error!(%msg, "Entry rejected");
            Err(Error::InvariantViolation(msg))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::SizingConfig;
    use crate::stop::StopConfig;

    fn planner() -> EntryPlanner {
        EntryPlanner::new(
            StopEngine::new(StopConfig::default()),
            PositionSizer::new(SizingConfig::default()),
            TakeProfitConfig::default(),
        )
    }

    #[test]
    fn long_plan_brackets_entry() {
        let plan = planner()
            .plan(Side::Long, 100.0, 1.0, 1.0, MarketRegime::Normal, 10_000.0)
            .unwrap();
        assert_eq!(plan.stop, 98.1);
        // ATR 1% of price -> calm band, 1.9 * 1.8 = 3.42
        assert_eq!(plan.take_profit, 103.42);
        assert!(plan.size >= 0.01);
        assert!(plan.size <= 10_000.0 * 0.30 / 100.0 + 1e-9);
    }

    #[test]
    fn short_plan_brackets_entry() {
        let plan = planner()
            .plan(Side::Short, 100.0, 1.0, 1.0, MarketRegime::Normal, 10_000.0)
            .unwrap();
        assert!(plan.stop > 100.0);
        assert!(plan.take_profit < 100.0);
    }

    #[test]
    fn bad_inputs_never_produce_a_plan() {
        let res = planner().plan(Side::Long, 0.0, 1.0, 1.0, MarketRegime::Normal, 1_000.0);
        assert!(matches!(res, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn wrong_side_stop_is_an_invariant_violation() {
        let plan = EntryPlan {
            side: Side::Long,
            entry: 100.0,
            size: 1.0,
            stop: 100.5,
            take_profit: 103.0,
        };
        assert!(matches!(validate(&plan), Err(Error::InvariantViolation(_))));

        let plan = EntryPlan { stop: 99.0, size: 0.0, ..plan };
        assert!(matches!(validate(&plan), Err(Error::InvariantViolation(_))));
    }
}
