use std::sync::Arc;

use async_trait::async_trait;

use common::{
    Balance, Candle, ExchangeClient, OpenOrder, OrderRequest, Position, Result, RetryPolicy,
    Ticker,
};

/// Applies a `RetryPolicy` (timeout, bounded retries, backoff) to every call of
/// the wrapped client. Only transient failures are retried.
pub struct RetryingExchange {
    inner: Arc<dyn ExchangeClient>,
    policy: RetryPolicy,
}

impl RetryingExchange {
    pub fn new(inner: Arc<dyn ExchangeClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ExchangeClient for RetryingExchange {
    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        self.policy.run("ticker", || self.inner.ticker(symbol)).await
    }

    async fn candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        self.policy
            .run("candles", || self.inner.candles(symbol, timeframe, limit))
            .await
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        self.policy
            .run("open_positions", || self.inner.open_positions(symbol))
            .await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        // The client id stays fixed across attempts, so the exchange rejects duplicates.
        self.policy
            .run("place_order", || self.inner.place_order(order))
            .await
    }

    async fn cancel_order(&self, symbol: &str, order: &OpenOrder) -> Result<()> {
        self.policy
            .run("cancel_order", || self.inner.cancel_order(symbol, order))
            .await
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        self.policy
            .run("open_orders", || self.inner.open_orders(symbol))
            .await
    }

    async fn balance(&self, currency: &str) -> Result<Balance> {
        self.policy.run("balance", || self.inner.balance(currency)).await
    }
}
