//! Risk core: stop placement, sizing, take-profit targets and equity bookkeeping.

pub mod equity;
pub mod plan;
pub mod sizing;
pub mod stop;
pub mod take_profit;

pub use equity::EquityStats;
pub use plan::{EntryPlan, EntryPlanner};
pub use sizing::{PositionSizer, SizingConfig};
pub use stop::{ExitMode, MarketRegime, StopConfig, StopEngine, StopPreset, StopState};
pub use take_profit::TakeProfitConfig;
