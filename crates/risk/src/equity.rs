use serde::{Deserialize, Serialize};
use tracing::info;

/// Realized PnL counters with a high-watermark drawdown tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityStats {
    pub initial_capital: f64,
    /// Realized PnL only.
    pub total_pnl: f64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub equity_high_watermark: f64,
    /// Largest peak-to-trough drop seen, in percent.
    pub max_drawdown_pct: f64,
}

impl EquityStats {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            total_pnl: 0.0,
            total_trades: 0,
            winning_trades: 0,
            equity_high_watermark: initial_capital,
            max_drawdown_pct: 0.0,
        }
    }

    pub fn current_equity(&self) -> f64 {
        self.initial_capital + self.total_pnl
    }

    /// Book one closed trade.
    pub fn record_close(&mut self, realized_pnl: f64) {
        self.total_pnl += realized_pnl;
        self.total_trades += 1;
        if realized_pnl > 0.0 {
            self.winning_trades += 1;
        }
        self.observe(self.current_equity());
        info!(
            realized_pnl,
            total_pnl = self.total_pnl,
            trades = self.total_trades,
            "Trade booked"
        );
    }

    /// Update watermark and drawdown with open-position PnL included.
    pub fn mark_to_market(&mut self, unrealized_pnl: f64) {
        self.observe(self.current_equity() + unrealized_pnl);
    }

    fn observe(&mut self, equity: f64) {
        if equity > self.equity_high_watermark {
            self.equity_high_watermark = equity;
        }
        if self.equity_high_watermark > 0.0 {
            let dd = (self.equity_high_watermark - equity) / self.equity_high_watermark * 100.0;
            self.max_drawdown_pct = self.max_drawdown_pct.max(dd);
        }
    }

    pub fn win_rate_pct(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        }
    }
}
