use async_trait::async_trait;

use crate::{Balance, Candle, EventRecord, OpenOrder, OrderRequest, Position, Result, Ticker};

/// Abstraction over the exchange connection.
///
/// `OkxClient` implements this for live trading, `PaperClient` for simulation,
/// and `RetryingExchange` wraps either one with the retry policy.
///
/// Every call is fallible. Cancels and reduce-only closes must be safe to retry.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Last trade price and 24h volume.
    async fn ticker(&self, symbol: &str) -> Result<Ticker>;

    /// Most recent `limit` candles for `timeframe` (e.g. "15m", "1D"), oldest first.
    async fn candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>>;

    /// Open positions on `symbol` (size > 0 only).
    async fn open_positions(&self, symbol: &str) -> Result<Vec<Position>>;

    /// Submit an order and return the exchange order id.
    async fn place_order(&self, order: &OrderRequest) -> Result<String>;

    /// Cancel a resting order (limit or trigger).
    async fn cancel_order(&self, symbol: &str, order: &OpenOrder) -> Result<()>;

    /// Resting orders on `symbol`, trigger orders included.
    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>>;

    async fn balance(&self, currency: &str) -> Result<Balance>;
}

/// Fire-and-forget message delivery. Failures are logged by the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Notifier used when no chat transport is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        tracing::info!(target: "notify", "{text}");
    }
}

/// Best-effort durable sink for the event log and the dispatcher snapshot.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: &EventRecord) -> Result<()>;

    async fn save_snapshot(&self, snapshot: &serde_json::Value) -> Result<()>;

    async fn load_snapshot(&self) -> Result<Option<serde_json::Value>>;
}
