//! One decision cycle of the bot.
//!
//! The dispatcher owns all mutable trading state (regime, equity, stop,
//! timers). Nothing else writes to it; readers get a `StatusSnapshot` through a
//! `watch` channel after every cycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use common::{
    Candle, CloseReason, Error, EventKind, EventRecord, EventSink, ExchangeClient, Notifier,
    OpenOrder, OrderKind, OrderRequest, Phase, Position, Result, Side, StatusSnapshot, Ticker,
    TradingMode,
};
use risk::{
    EntryPlanner, EquityStats, MarketRegime, PositionSizer, StopEngine, StopState,
};
use strategy::{classify, GridLevel, GridPlanner, IndicatorSnapshot, RegimeState};

use crate::config::BotConfig;

const QUOTE_CURRENCY: &str = "USDT";
const DAILY_TIMEFRAME: &str = "1D";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Hourly: indicators, regime and strategy placement.
    Full,
    /// Every few minutes: stop trailing, exits and time-stop only.
    Fine,
}

/// Why new entries are blocked this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    Cooldown,
    NoEntryWindow,
    LowVolume,
    VolumeUnavailable,
    QuietMarket,
}

/// Trading state carried across cycles and restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherState {
    pub regime: RegimeState,
    pub equity: EquityStats,
    pub stop: StopState,
    /// Strategy phase decided by the last full cycle.
    pub phase: Phase,
    pub last_close_time: Option<DateTime<Utc>>,
    pub position_open_time: Option<DateTime<Utc>>,
    /// Position seen on the previous cycle.
    pub last_position: Option<Position>,
    /// The open position was entered by trend mode (not accumulated by the grid).
    pub trend_position: bool,
    pub last_report_date: Option<NaiveDate>,
    #[serde(skip)]
    pub indicators: Option<IndicatorSnapshot>,
}

impl DispatcherState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            regime: RegimeState::default(),
            equity: EquityStats::new(initial_capital),
            stop: StopState::default(),
            phase: Phase::Idle,
            last_close_time: None,
            position_open_time: None,
            last_position: None,
            trend_position: false,
            last_report_date: None,
            indicators: None,
        }
    }

    pub fn snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn restore(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

pub struct Dispatcher {
    symbol: String,
    mode: TradingMode,
    cfg: BotConfig,
    exchange: Arc<dyn ExchangeClient>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn EventSink>,
    stops: StopEngine,
    planner: EntryPlanner,
    grid: GridPlanner,
    state: DispatcherState,
    phase: Phase,
    last_price: Option<f64>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl Dispatcher {
    pub fn new(
        symbol: impl Into<String>,
        mode: TradingMode,
        cfg: BotConfig,
        exchange: Arc<dyn ExchangeClient>,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let symbol = symbol.into();
        let stops = StopEngine::new(cfg.stop.clone());
        let planner = EntryPlanner::new(
            stops.clone(),
            PositionSizer::new(cfg.sizing.clone()),
            cfg.take_profit.clone(),
        );
        let grid = GridPlanner::new(cfg.grid.clone());
        let state = DispatcherState::new(cfg.capital.initial_capital);
        let (status_tx, _) = watch::channel(StatusSnapshot::new(symbol.clone(), mode));

        Self {
            symbol,
            mode,
            cfg,
            exchange,
            notifier,
            sink,
            stops,
            planner,
            grid,
            state,
            phase: Phase::Idle,
            last_price: None,
            status_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> &DispatcherState {
        &self.state
    }

    pub fn config(&self) -> &BotConfig {
        &self.cfg
    }

    /// Reload the last persisted state. A missing or unreadable snapshot keeps fresh state.
    pub async fn restore(&mut self) {
        match self.sink.load_snapshot().await {
            Ok(Some(value)) => match DispatcherState::restore(value) {
                Ok(state) => {
                    info!(
                        trades = state.equity.total_trades,
                        total_pnl = state.equity.total_pnl,
                        trend = ?state.regime.current_trend,
                        "Dispatcher state restored"
                    );
                    self.phase = state.phase;
                    self.state = state;
                }
                Err(e) => warn!(error = %e, "Stored snapshot unreadable, starting fresh"),
            },
            Ok(None) => info!("No stored snapshot, starting fresh"),
            Err(e) => warn!(error = %e, "Snapshot load failed, starting fresh"),
        }
        self.publish(None, None);
    }

    /// Run one cycle. Errors mean the cycle was abandoned (no price); state stays consistent.
    pub async fn run_cycle(&mut self, kind: CycleKind, now: DateTime<Utc>) -> Result<()> {
        let outcome = self.cycle(kind, now).await;
        self.phase = self.state.phase;
        let err = outcome.as_ref().err().map(|e| e.to_string());
        self.publish(Some(now), err);
        outcome
    }

    async fn cycle(&mut self, kind: CycleKind, now: DateTime<Utc>) -> Result<()> {
        self.set_phase(Phase::AssessingPosition);

        let ticker = self.exchange.ticker(&self.symbol).await?;
        let price = ticker.last;
        if !(price.is_finite() && price > 0.0) {
            return Err(Error::Exchange(format!("invalid last price {price}")));
        }
        self.last_price = Some(price);

        let positions = match self.exchange.open_positions(&self.symbol).await {
            Ok(list) => Some(list.into_iter().find(Position::is_open)),
            Err(e) => {
                warn!(error = %e, "Position fetch failed; skipping position management and entries");
                None
            }
        };

        if let Some(current) = &positions {
            self.reconcile(current.as_ref(), price, now).await;
        }

        let (snapshot, bar) = match kind {
            CycleKind::Full => self.refresh_indicators().await,
            CycleKind::Fine => (self.cached_indicators().await, None),
        };

        let mut position = positions.clone().flatten();
        if let Some(pos) = position.clone() {
            if self.manage_position(&pos, price, snapshot.as_ref(), bar.as_ref(), now).await {
                position = None;
            }
        }

        if kind == CycleKind::Full {
            self.set_phase(Phase::ChoosingRegime);
            match snapshot.filter(|s| s.sufficient) {
                Some(snap) if positions.is_some() => {
                    self.state.regime.update(classify(&snap, &self.cfg.regime));
                    self.decide(&ticker, &snap, position.as_ref(), now).await;
                }
                Some(_) => debug!("Position state unknown, strategy decision skipped"),
                None => info!("Insufficient market data, deferring strategy decision"),
            }
            if positions.is_some() {
                let unrealized = position.as_ref().map(|p| p.pnl_at(price)).unwrap_or(0.0);
                self.state.equity.mark_to_market(unrealized);
            }
        }

        self.daily_summary(now).await;

        if kind == CycleKind::Full {
            self.persist().await;
        }
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Phase transition");
            self.phase = phase;
        }
    }

    // ── Market data ─────────────────────────────────────────────────────────

    /// Fetch candles and recompute indicators. On failure the cached snapshot is reused.
    async fn refresh_indicators(&mut self) -> (Option<IndicatorSnapshot>, Option<Candle>) {
        let icfg = &self.cfg.indicators;
        match self
            .exchange
            .candles(&self.symbol, &icfg.timeframe, icfg.candle_limit)
            .await
        {
            Ok(candles) => {
                let snap = IndicatorSnapshot::from_candles(&candles, icfg);
                if !snap.sufficient {
                    let e = Error::InsufficientData {
                        needed: icfg.required_candles(),
                        got: candles.len(),
                    };
                    warn!(error = %e, "Indicators unavailable this cycle");
                }
                debug!(
                    price = snap.price,
                    ema = snap.ema,
                    rsi = snap.rsi,
                    atr = snap.atr,
                    atr_prev = snap.atr_prev,
                    sigma7 = snap.sigma7,
                    "Indicators refreshed"
                );
                self.state.indicators = Some(snap);
                (Some(snap), candles.last().copied())
            }
            Err(e) => {
                warn!(error = %e, "Candle fetch failed, using previous indicators");
                (self.state.indicators, None)
            }
        }
    }

    async fn cached_indicators(&mut self) -> Option<IndicatorSnapshot> {
        if self.state.indicators.is_some() || self.state.last_position.is_none() {
            return self.state.indicators;
        }
        self.refresh_indicators().await.0
    }

    // ── Position lifecycle ──────────────────────────────────────────────────

    /// Compare the exchange position with last cycle's mirror.
    async fn reconcile(&mut self, current: Option<&Position>, price: f64, now: DateTime<Utc>) {
        match (self.state.last_position.clone(), current) {
            (Some(prev), None) => {
                info!(side = %prev.side, size = prev.size, "Position closed on exchange");
                self.book_close(&prev, price, CloseReason::External, now).await;
            }
            (Some(prev), Some(cur)) if prev.side != cur.side => {
                info!(from = %prev.side, to = %cur.side, "Position flipped on exchange");
                self.book_close(&prev, price, CloseReason::External, now).await;
                self.on_new_position(cur, now);
            }
            (Some(prev), Some(cur)) => {
                if !prev.same_as(cur) {
                    debug!(size = cur.size, entry = cur.entry_price, "Position resized");
                }
            }
            (None, Some(cur)) => self.on_new_position(cur, now),
            (None, None) => self.state.trend_position = false,
        }
        self.state.last_position = current.cloned();
    }

    fn on_new_position(&mut self, pos: &Position, now: DateTime<Utc>) {
        let opened = pos.open_time.unwrap_or(now);
        info!(
            side = %pos.side,
            size = pos.size,
            entry = pos.entry_price,
            opened = %opened,
            "Tracking new position"
        );
        self.state.position_open_time = Some(opened);
        if self.state.stop.trail_stop_price.is_some() && !self.state.trend_position {
            self.state.stop.clear();
        }
    }

    /// Time-stop, stop exit and trailing for the open position. Returns true when it was closed.
    async fn manage_position(
        &mut self,
        pos: &Position,
        price: f64,
        snapshot: Option<&IndicatorSnapshot>,
        bar: Option<&Candle>,
        now: DateTime<Utc>,
    ) -> bool {
        let opened = self
            .state
            .position_open_time
            .or(pos.open_time)
            .unwrap_or(now);
        if now - opened >= Duration::days(self.cfg.schedule.time_stop_days) {
            info!(
                side = %pos.side,
                held_days = (now - opened).num_days(),
                "Time-stop reached"
            );
            return self.close_position(pos, price, CloseReason::TimeStop, now).await;
        }

        let previous = self.state.stop.trail_stop_price;
        if let Some(snap) = snapshot.filter(|s| s.sufficient) {
            let regime = self.stop_regime(snap);
            match self.stops.compute_stop(
                pos.entry_price,
                snap.atr,
                pos.side,
                Some(price),
                snap.volatility_ratio(),
                regime,
            ) {
                Ok(candidate) => {
                    self.state.stop.ratchet(pos.side, candidate);
                }
                Err(e) => error!(error = %e, "Stop computation failed, keeping previous stop"),
            }
        }

        let Some(stop) = self.state.stop.trail_stop_price else {
            warn!("No stop available for the open position yet");
            return false;
        };

        // the bar traded against the stop that was in force while it printed
        let bar_hit = match (previous, bar) {
            (Some(prev), Some(c)) => {
                self.stops
                    .should_exit(price, prev, pos.side, Some(c.low), Some(c.high), Some(c.close))
            }
            _ => false,
        };
        if bar_hit || self.stops.should_exit(price, stop, pos.side, None, None, None) {
            info!(side = %pos.side, price, stop, "Stop hit");
            return self.close_position(pos, price, CloseReason::StopHit, now).await;
        }

        if let Some(prev) = previous.filter(|&p| p != stop) {
            info!(side = %pos.side, from = prev, to = stop, "Trailing stop moved");
            let event = self
                .event(now, EventKind::StopUpdated, format!("stop {prev:.2} -> {stop:.2}"))
                .with_trade(pos.side, pos.size, pos.entry_price);
            self.record(event).await;
        }
        self.ensure_protective(pos, stop, now).await;
        false
    }

    fn stop_regime(&self, snap: &IndicatorSnapshot) -> MarketRegime {
        if snap.sigma7 >= self.cfg.regime.volatility_ceiling {
            MarketRegime::Volatile
        } else if self.state.regime.confirmed(&self.cfg.regime, snap.sigma7).is_some() {
            MarketRegime::Trending
        } else {
            MarketRegime::Normal
        }
    }

    /// Make sure exactly one reduce-only trigger at `stop` protects the position.
    ///
    /// Replacement is cancel-then-place; when placement fails the position is
    /// briefly unprotected and the next cycle tries again.
    async fn ensure_protective(&mut self, pos: &Position, stop: f64, now: DateTime<Utc>) {
        let orders = match self.exchange.open_orders(&self.symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Open orders unavailable, protective stop not verified");
                return;
            }
        };
        let protective: Vec<&OpenOrder> = orders.iter().filter(|o| o.protects(pos.side)).collect();
        let current = protective.iter().find(|o| match o.kind {
            OrderKind::Trigger { trigger_price } => {
                (trigger_price - stop).abs() <= stop * 1e-9 && (o.size - pos.size).abs() <= pos.size * 1e-6
            }
            _ => false,
        });
        if let (Some(order), 1) = (current, protective.len()) {
            self.state.stop.protective_order_id = Some(order.id.clone());
            return;
        }

        for order in &protective {
            if let Err(e) = self.exchange.cancel_order(&self.symbol, order).await {
                warn!(id = %order.id, error = %e, "Stale protective stop not cancelled");
            }
        }
        self.state.stop.protective_order_id = None;

        let request =
            OrderRequest::trigger(&self.symbol, pos.side.exit_order_side(), pos.size, stop).reduce_only();
        match self.exchange.place_order(&request).await {
            Ok(id) => {
                info!(id = %id, stop, size = pos.size, "Protective stop placed");
                self.state.stop.protective_order_id = Some(id);
            }
            Err(e) => {
                error!(error = %e, stop, "Protective stop placement failed; retrying next cycle");
                let msg = format!("protective stop at {stop:.2} failed: {e}");
                self.notifier
                    .notify(&format!("🚨 {} {msg}", self.symbol))
                    .await;
                let event = self.event(now, EventKind::Error, msg);
                self.record(event).await;
            }
        }
    }

    /// Market-close the position. Returns true when the close order went through.
    async fn close_position(
        &mut self,
        pos: &Position,
        price: f64,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> bool {
        let request =
            OrderRequest::market(&self.symbol, pos.side.exit_order_side(), pos.size).reduce_only();
        if let Err(e) = self.exchange.place_order(&request).await {
            error!(error = %e, reason = %reason, "Close order failed; will retry next cycle");
            return false;
        }
        self.cancel_orders(|o| o.reduce_only).await;
        self.book_close(pos, price, reason, now).await;
        true
    }

    /// Realize PnL for a closed position and start the cooldown.
    async fn book_close(&mut self, pos: &Position, exit: f64, reason: CloseReason, now: DateTime<Utc>) {
        let pnl = pos.pnl_at(exit);
        self.state.equity.record_close(pnl);
        self.state.stop.clear();
        self.state.last_close_time = Some(now);
        self.state.position_open_time = None;
        self.state.last_position = None;
        self.state.trend_position = false;

        let equity = &self.state.equity;
        let text = format!(
            "{} {} {} closed ({reason}) @ {exit:.2} | PnL {pnl:+.2} USDT | total {:+.2} | trades {} (win {:.0}%)",
            if pnl > 0.0 { "✅" } else { "🔻" },
            self.symbol,
            pos.side,
            equity.total_pnl,
            equity.total_trades,
            equity.win_rate_pct(),
        );
        let event = self
            .event(now, EventKind::TradeClosed, reason.to_string())
            .with_trade(pos.side, pos.size, pos.entry_price)
            .with_exit(exit, pnl);
        self.record(event).await;
        self.notifier.notify(&text).await;
        self.persist().await;
    }

    // ── Strategy ────────────────────────────────────────────────────────────

    async fn decide(
        &mut self,
        ticker: &Ticker,
        snap: &IndicatorSnapshot,
        position: Option<&Position>,
        now: DateTime<Utc>,
    ) {
        let suppression = self.suppression(ticker, snap, now).await;
        let confirmed = self.state.regime.confirmed(&self.cfg.regime, snap.sigma7);
        info!(
            trend = ?self.state.regime.current_trend,
            confirmations = self.state.regime.confirmation_count,
            confirmed = ?confirmed,
            suppression = ?suppression,
            "Regime evaluated"
        );
        match (confirmed, suppression) {
            (Some(side), None) => self.trend_mode(side, ticker.last, snap, position, now).await,
            _ => self.grid_mode(ticker.last, snap, position, suppression, now).await,
        }
    }

    async fn suppression(
        &self,
        ticker: &Ticker,
        snap: &IndicatorSnapshot,
        now: DateTime<Utc>,
    ) -> Option<Suppression> {
        if let Some(closed) = self.state.last_close_time {
            if now - closed < Duration::hours(self.cfg.schedule.cooldown_hours) {
                return Some(Suppression::Cooldown);
            }
        }
        let time = now.time();
        if self.cfg.filters.no_entry_windows.iter().any(|w| w.contains(time)) {
            return Some(Suppression::NoEntryWindow);
        }
        if self.cfg.filters.volume_filter {
            if let Some(s) = self.volume_check(ticker).await {
                return Some(s);
            }
        }
        if snap.atr_fraction() < snap.min_atr_pct {
            return Some(Suppression::QuietMarket);
        }
        None
    }

    /// 24h quote volume against the average of the completed daily candles.
    async fn volume_check(&self, ticker: &Ticker) -> Option<Suppression> {
        let lookback = self.cfg.filters.volume_lookback_days;
        let candles = match self
            .exchange
            .candles(&self.symbol, DAILY_TIMEFRAME, lookback + 1)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Daily candles unavailable, entries suppressed");
                return Some(Suppression::VolumeUnavailable);
            }
        };
        // the newest daily candle is still forming
        let completed = &candles[..candles.len().saturating_sub(1)];
        if completed.is_empty() {
            return Some(Suppression::VolumeUnavailable);
        }
        let avg = completed.iter().map(|c| c.volume * c.close).sum::<f64>() / completed.len() as f64;
        if avg.is_nan() || avg <= 0.0 {
            return Some(Suppression::VolumeUnavailable);
        }
        let threshold = avg * self.cfg.filters.volume_ratio;
        if ticker.quote_volume_24h < threshold {
            info!(
                volume_24h = ticker.quote_volume_24h,
                threshold, "Volume below filter threshold"
            );
            return Some(Suppression::LowVolume);
        }
        None
    }

    async fn trend_mode(
        &mut self,
        side: Side,
        price: f64,
        snap: &IndicatorSnapshot,
        position: Option<&Position>,
        now: DateTime<Utc>,
    ) {
        if let Some(pos) = position.filter(|p| self.state.trend_position && p.side != side) {
            info!(held = %pos.side, regime = %side, "Regime flipped against the trend position");
            self.close_position(pos, price, CloseReason::RegimeExit, now).await;
            return self.grid_mode(price, snap, None, Some(Suppression::Cooldown), now).await;
        }

        self.set_phase(Phase::TrendMode);
        self.state.phase = Phase::TrendMode;
        self.cancel_orders(|o| !o.reduce_only).await;

        let (trend_capital, grid_capital) = self.capital().await;
        if position.is_none() {
            self.open_trend(side, price, snap, trend_capital, now).await;
        }

        let range = self.grid.range_pct(snap.atr_pct());
        let levels = self.grid.skewed(price, grid_capital, range, side);
        self.place_grid(&levels, format!("{side} skewed grid ±{range:.2}%"), now).await;
    }

    async fn open_trend(
        &mut self,
        side: Side,
        price: f64,
        snap: &IndicatorSnapshot,
        capital: f64,
        now: DateTime<Utc>,
    ) {
        let plan = match self.planner.plan(
            side,
            price,
            snap.atr,
            snap.volatility_ratio(),
            MarketRegime::Trending,
            capital,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Trend entry skipped");
                return;
            }
        };

        let entry = OrderRequest::market(&self.symbol, side.entry_order_side(), plan.size);
        if let Err(e) = self.exchange.place_order(&entry).await {
            error!(error = %e, "Trend entry order failed");
            return;
        }
        self.state.trend_position = true;
        self.state.stop.clear();
        self.state.stop.ratchet(side, plan.stop);

        let protective = OrderRequest::trigger(&self.symbol, side.exit_order_side(), plan.size, plan.stop)
            .reduce_only();
        match self.exchange.place_order(&protective).await {
            Ok(id) => self.state.stop.protective_order_id = Some(id),
            Err(e) => error!(error = %e, "Protective stop for new entry failed; retrying next cycle"),
        }
        let take_profit =
            OrderRequest::limit(&self.symbol, side.exit_order_side(), plan.size, plan.take_profit)
                .reduce_only();
        if let Err(e) = self.exchange.place_order(&take_profit).await {
            warn!(error = %e, "Take-profit order failed");
        }

        let text = format!(
            "🟢 {} {side} {:.4} @ {price:.2} | SL {:.2} | TP {:.2}",
            self.symbol, plan.size, plan.stop, plan.take_profit
        );
        let event = self
            .event(now, EventKind::TradeOpened, format!("trend entry, stop {:.2}, tp {:.2}", plan.stop, plan.take_profit))
            .with_trade(side, plan.size, price);
        self.record(event).await;
        self.notifier.notify(&text).await;
    }

    async fn grid_mode(
        &mut self,
        price: f64,
        snap: &IndicatorSnapshot,
        position: Option<&Position>,
        suppression: Option<Suppression>,
        now: DateTime<Utc>,
    ) {
        let phase = if suppression == Some(Suppression::Cooldown) {
            Phase::Cooldown
        } else {
            Phase::GridMode
        };
        self.set_phase(phase);
        self.state.phase = phase;

        if let Some(pos) = position {
            let stray = self.state.trend_position && self.state.regime.current_trend != Some(pos.side);
            if stray {
                info!(side = %pos.side, "Closing trend position the regime no longer supports");
                self.close_position(pos, price, CloseReason::RegimeExit, now).await;
            }
        }
        self.cancel_orders(|o| !o.reduce_only).await;

        let (_, grid_capital) = self.capital().await;
        let range = self.grid.range_pct(snap.atr_pct());
        let levels = self.grid.symmetric(price, grid_capital, range);
        self.place_grid(&levels, format!("symmetric grid ±{range:.2}%"), now).await;
    }

    /// (trend, grid) capital: shares of equity, capped by the free balance.
    async fn capital(&self) -> (f64, f64) {
        let equity = self.state.equity.current_equity().max(0.0);
        let mut trend = equity * self.cfg.capital.trend_share;
        let mut grid = equity * self.cfg.capital.grid_share;
        match self.exchange.balance(QUOTE_CURRENCY).await {
            Ok(balance) => {
                trend = trend.min(balance.free);
                grid = grid.min(balance.free);
            }
            Err(e) => warn!(error = %e, "Balance unavailable, using configured capital"),
        }
        (trend, grid)
    }

    async fn place_grid(&mut self, levels: &[GridLevel], label: String, now: DateTime<Utc>) {
        if levels.is_empty() {
            info!("Grid has no placeable levels (capital or minimum size)");
            return;
        }
        let mut placed = 0;
        for level in levels {
            let request = OrderRequest::limit(&self.symbol, level.side, level.size, level.price);
            match self.exchange.place_order(&request).await {
                Ok(_) => placed += 1,
                Err(e) => warn!(side = %level.side, price = level.price, error = %e, "Grid order failed"),
            }
        }
        info!(placed, planned = levels.len(), "{label}");
        let event = self.event(now, EventKind::GridPlaced, format!("{label}: {placed}/{} orders", levels.len()));
        self.record(event).await;
    }

    async fn cancel_orders(&self, which: impl Fn(&OpenOrder) -> bool) {
        let orders = match self.exchange.open_orders(&self.symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Open orders unavailable, nothing cancelled");
                return;
            }
        };
        for order in orders.iter().filter(|&o| which(o)) {
            if let Err(e) = self.exchange.cancel_order(&self.symbol, order).await {
                warn!(id = %order.id, error = %e, "Cancel failed");
            }
        }
    }

    // ── Bookkeeping ─────────────────────────────────────────────────────────

    async fn daily_summary(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        match self.state.last_report_date {
            Some(last) if today > last => {
                let e = &self.state.equity;
                let text = format!(
                    "📊 Daily report {last} | {} | PnL {:+.2} USDT | trades {} | win rate {:.1}% | max DD {:.2}%",
                    self.symbol,
                    e.total_pnl,
                    e.total_trades,
                    e.win_rate_pct(),
                    e.max_drawdown_pct,
                );
                let event = self.event(now, EventKind::DailySummary, text.clone());
                self.record(event).await;
                self.notifier.notify(&text).await;
            }
            Some(_) => return,
            None => {}
        }
        self.state.last_report_date = Some(today);
    }

    fn event(&self, now: DateTime<Utc>, kind: EventKind, message: impl Into<String>) -> EventRecord {
        EventRecord::new(now, kind, &self.symbol, self.state.equity.total_pnl, message)
    }

    async fn record(&self, event: EventRecord) {
        if let Err(e) = self.sink.record(&event).await {
            warn!(error = %e, event = %event.event_type, "Event not persisted");
        }
    }

    async fn persist(&self) {
        let saved = match self.state.snapshot() {
            Ok(value) => self.sink.save_snapshot(&value).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!(error = %e, "Snapshot not persisted");
        }
    }

    fn publish(&self, at: Option<DateTime<Utc>>, last_error: Option<String>) {
        let s = &self.state;
        let previous_cycle = self.status_tx.borrow().last_cycle_at;
        let status = StatusSnapshot {
            symbol: self.symbol.clone(),
            mode: self.mode,
            phase: self.phase,
            trend: s.regime.current_trend,
            confirmation_count: s.regime.confirmation_count,
            position: s.last_position.clone(),
            trail_stop_price: s.stop.trail_stop_price,
            last_price: self.last_price,
            total_pnl: s.equity.total_pnl,
            total_trades: s.equity.total_trades,
            winning_trades: s.equity.winning_trades,
            max_drawdown_pct: s.equity.max_drawdown_pct,
            last_cycle_at: at.or(previous_cycle),
            last_error,
        };
        self.status_tx.send_replace(status);
    }
}
