use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use common::StatusSnapshot;

use crate::config::ScheduleConfig;
use crate::dispatcher::{CycleKind, Dispatcher};

/// Cloneable handle passed to other crates (Telegram, API).
#[derive(Clone)]
pub struct EngineHandle {
    status: watch::Receiver<StatusSnapshot>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl EngineHandle {
    /// Latest published status.
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    /// Ask the scheduler to stop after the running cycle.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Drives the dispatcher on two timers: a full cycle every hour and a fine
/// cycle every few minutes. Cycles never overlap; ticks missed while a cycle
/// runs are skipped.
pub struct Engine {
    dispatcher: Dispatcher,
    schedule: ScheduleConfig,
    shutdown: watch::Receiver<bool>,
}

impl Engine {
    pub fn new(dispatcher: Dispatcher) -> (Self, EngineHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = EngineHandle {
            status: dispatcher.subscribe(),
            shutdown: Arc::new(shutdown_tx),
        };
        let schedule = dispatcher.config().schedule.clone();
        let engine = Engine {
            dispatcher,
            schedule,
            shutdown: shutdown_rx,
        };
        (engine, handle)
    }

    /// Run until shutdown is requested. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        let full_period = Duration::from_secs(self.schedule.full_cycle_secs);
        let fine_period = Duration::from_secs(self.schedule.fine_cycle_secs);
        let backoff = Duration::from_secs(self.schedule.error_backoff_secs);

        // first full cycle fires immediately, the fine timer one period later
        let mut full = interval(full_period);
        full.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut fine = interval_at(Instant::now() + fine_period, fine_period);
        fine.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            full_secs = full_period.as_secs(),
            fine_secs = fine_period.as_secs(),
            "Scheduler started"
        );

        loop {
            let kind = tokio::select! {
                biased;
                Ok(()) = self.shutdown.changed() => break,
                _ = full.tick() => CycleKind::Full,
                _ = fine.tick() => CycleKind::Fine,
            };

            if let Err(e) = self.dispatcher.run_cycle(kind, Utc::now()).await {
                error!(cycle = ?kind, error = %e, backoff_secs = backoff.as_secs(), "Cycle failed");
                tokio::select! {
                    Ok(()) = self.shutdown.changed() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use common::{
        Balance, Candle, Error, ExchangeClient, LogNotifier, OpenOrder, OrderRequest, Position,
        Result, Ticker, TradingMode, EventRecord, EventSink,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::config::BotConfig;

    /// Counts ticker calls and always fails them.
    struct Unreachable {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ExchangeClient for Unreachable {
        async fn ticker(&self, _: &str) -> Result<Ticker> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Http("unreachable".into()))
        }
        async fn candles(&self, _: &str, _: &str, _: usize) -> Result<Vec<Candle>> {
            Ok(Vec::new())
        }
        async fn open_positions(&self, _: &str) -> Result<Vec<Position>> {
            Ok(Vec::new())
        }
        async fn place_order(&self, _: &OrderRequest) -> Result<String> {
            Err(Error::Http("unreachable".into()))
        }
        async fn cancel_order(&self, _: &str, _: &OpenOrder) -> Result<()> {
            Ok(())
        }
        async fn open_orders(&self, _: &str) -> Result<Vec<OpenOrder>> {
            Ok(Vec::new())
        }
        async fn balance(&self, _: &str) -> Result<Balance> {
            Err(Error::Http("unreachable".into()))
        }
    }

    struct NullSink;

    #[async_trait]
    impl EventSink for NullSink {
        async fn record(&self, _: &EventRecord) -> Result<()> {
            Ok(())
        }
        async fn save_snapshot(&self, _: &serde_json::Value) -> Result<()> {
            Ok(())
        }
        async fn load_snapshot(&self) -> Result<Option<serde_json::Value>> {
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycles_back_off_and_shutdown_stops_the_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let dispatcher = Dispatcher::new(
            "BTC-USDT-SWAP",
            TradingMode::Paper,
            BotConfig::default(),
            Arc::new(Unreachable { calls: calls.clone() }),
            Arc::new(LogNotifier),
            Arc::new(NullSink),
        );
        let (engine, handle) = Engine::new(dispatcher);
        let task = tokio::spawn(engine.run());

        // first full cycle fails immediately, then the 60s backoff holds the loop
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.status().last_error.is_some());

        handle.shutdown();
        task.await.unwrap();
    }
}
