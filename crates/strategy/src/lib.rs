//! Market-reading side of the bot: indicators, regime classification and
//! grid ladders. Everything here is pure and synchronous.

pub mod config;
pub mod grid;
pub mod indicators;
pub mod regime;

pub use config::{GridConfig, IndicatorConfig, RegimeConfig, SkewPolicy};
pub use grid::{GridLevel, GridPlanner};
pub use indicators::IndicatorSnapshot;
pub use regime::{classify, RegimeState};
