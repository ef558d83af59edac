use common::StatusSnapshot;

/// `/status` reply.
pub fn status_text(s: &StatusSnapshot) -> String {
    let trend = match s.trend {
        Some(side) => format!("{side} ({} confirmations)", s.confirmation_count),
        None => "ranging".to_string(),
    };
    let position = match &s.position {
        Some(p) => format!("{} {:.4} @ {:.2} (uPnL {:+.2})", p.side, p.size, p.entry_price, p.unrealized_pnl),
        None => "flat".to_string(),
    };
    let stop = s
        .trail_stop_price
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "-".to_string());
    let price = s
        .last_price
        .map(|p| format!("{p:.2}"))
        .unwrap_or_else(|| "-".to_string());
    let last_cycle = s
        .last_cycle_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    let mut text = format!(
        "VoronBot {} [{}]\n\
         Phase: {}\n\
         Trend: {trend}\n\
         Price: {price}\n\
         Position: {position}\n\
         Stop: {stop}\n\
         Last cycle: {last_cycle}",
        s.symbol, s.mode, s.phase
    );
    if let Some(err) = &s.last_error {
        text.push_str(&format!("\nLast error: {err}"));
    }
    text
}

/// `/report` reply.
pub fn report_text(s: &StatusSnapshot) -> String {
    format!(
        "📊 {} report\n\
         Total PnL: {:+.2} USDT\n\
         Trades: {} (won {}, {:.1}%)\n\
         Max drawdown: {:.2}%",
        s.symbol,
        s.total_pnl,
        s.total_trades,
        s.winning_trades,
        s.win_rate_pct(),
        s.max_drawdown_pct,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{Phase, Position, Side, TradingMode};

    #[test]
    fn flat_status_without_history() {
        let s = StatusSnapshot::new("BTC-USDT-SWAP", TradingMode::Paper);
        let text = status_text(&s);
        assert!(text.contains("BTC-USDT-SWAP [paper]"));
        assert!(text.contains("Trend: ranging"));
        assert!(text.contains("Position: flat"));
        assert!(text.contains("Last cycle: never"));
        assert!(!text.contains("Last error"));
    }

    #[test]
    fn status_with_open_position_and_error() {
        let mut s = StatusSnapshot::new("BTC-USDT-SWAP", TradingMode::Live);
        s.phase = Phase::TrendMode;
        s.trend = Some(Side::Long);
        s.confirmation_count = 3;
        s.position = Some(Position {
            symbol: "BTC-USDT-SWAP".into(),
            side: Side::Long,
            size: 0.05,
            entry_price: 60_000.0,
            unrealized_pnl: 25.0,
            open_time: None,
        });
        s.trail_stop_price = Some(58_800.0);
        s.last_cycle_at = Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        s.last_error = Some("HTTP error: 503".into());

        let text = status_text(&s);
        assert!(text.contains("(3 confirmations)"));
        assert!(text.contains("0.0500 @ 60000.00 (uPnL +25.00)"));
        assert!(text.contains("Stop: 58800.00"));
        assert!(text.contains("Last cycle: 2025-03-01 12:00 UTC"));
        assert!(text.contains("Last error: HTTP error: 503"));
    }

    #[test]
    fn report_shows_win_rate() {
        let mut s = StatusSnapshot::new("BTC-USDT-SWAP", TradingMode::Paper);
        s.total_pnl = -4.5;
        s.total_trades = 4;
        s.winning_trades = 1;
        s.max_drawdown_pct = 2.5;
        let text = report_text(&s);
        assert!(text.contains("Total PnL: -4.50 USDT"));
        assert!(text.contains("Trades: 4 (won 1, 25.0%)"));
        assert!(text.contains("Max drawdown: 2.50%"));
    }
}
