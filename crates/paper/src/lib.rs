use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Balance, Candle, Error, ExchangeClient, OpenOrder, OrderKind, OrderRequest, OrderSide,
    Position, Result, Side, Ticker,
};

const QUOTE_CURRENCY: &str = "USDT";

/// Simulated perpetual-swap account for paper trading.
///
/// Keeps one net position per symbol. Market orders fill at the latest price
/// with configurable slippage; limit and trigger orders rest until the price
/// crosses them. Prices come from `set_price` or, when a market-data feed is
/// attached, from every `ticker` call. No real orders are ever sent.
pub struct PaperClient {
    book: Arc<RwLock<Book>>,
    /// Real exchange used for tickers and candles only.
    market_data: Option<Arc<dyn ExchangeClient>>,
    /// Slippage in basis points applied to market fills.
    slippage_bps: f64,
}

#[derive(Default)]
struct Book {
    balance: f64,
    prices: HashMap<String, f64>,
    quote_volumes: HashMap<String, f64>,
    candles: HashMap<(String, String), Vec<Candle>>,
    positions: HashMap<String, Position>,
    orders: Vec<OpenOrder>,
    placed: Vec<OrderRequest>,
    next_id: u64,
}

impl PaperClient {
    pub fn new(initial_balance_usd: f64, slippage_bps: f64) -> Self {
        info!(
            balance = initial_balance_usd,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        Self {
            book: Arc::new(RwLock::new(Book {
                balance: initial_balance_usd,
                ..Book::default()
            })),
            market_data: None,
            slippage_bps,
        }
    }

    /// Take tickers and candles from `feed` instead of the local book.
    pub fn with_market_data(mut self, feed: Arc<dyn ExchangeClient>) -> Self {
        self.market_data = Some(feed);
        self
    }

    /// Move the market. Resting orders crossed by `price` fill.
    pub async fn set_price(&self, symbol: &str, price: f64) {
        let mut book = self.book.write().await;
        book.prices.insert(symbol.to_string(), price);
        self.settle(&mut book, symbol, price);
    }

    pub async fn set_candles(&self, symbol: &str, timeframe: &str, candles: Vec<Candle>) {
        self.book
            .write()
            .await
            .candles
            .insert((symbol.to_string(), timeframe.to_string()), candles);
    }

    pub async fn set_quote_volume(&self, symbol: &str, volume_24h: f64) {
        self.book.write().await.quote_volumes.insert(symbol.to_string(), volume_24h);
    }

    /// Put an existing position on the book, as if opened earlier.
    pub async fn seed_position(&self, position: Position) {
        self.book
            .write()
            .await
            .positions
            .insert(position.symbol.clone(), position);
    }

    /// Every order accepted so far, oldest first.
    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.book.read().await.placed.clone()
    }

    pub async fn cash_balance(&self) -> f64 {
        self.book.read().await.balance
    }

    fn fill_price(&self, side: OrderSide, price: f64) -> f64 {
        match side {
            OrderSide::Buy => price * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => price * (1.0 - self.slippage_bps / 10_000.0),
        }
    }

    /// Fill resting orders that `price` has crossed.
    fn settle(&self, book: &mut Book, symbol: &str, price: f64) {
        let mut i = 0;
        while i < book.orders.len() {
            let order = &book.orders[i];
            if order.symbol != symbol {
                i += 1;
                continue;
            }
            let fill = match (order.kind, order.side) {
                (OrderKind::Limit { price: limit }, OrderSide::Buy) if price <= limit => Some(limit),
                (OrderKind::Limit { price: limit }, OrderSide::Sell) if price >= limit => Some(limit),
                (OrderKind::Trigger { trigger_price }, OrderSide::Sell) if price <= trigger_price => {
                    Some(self.fill_price(OrderSide::Sell, price))
                }
                (OrderKind::Trigger { trigger_price }, OrderSide::Buy) if price >= trigger_price => {
                    Some(self.fill_price(OrderSide::Buy, price))
                }
                _ => None,
            };
            match fill {
                Some(fill_price) => {
                    let order = book.orders.remove(i);
                    debug!(id = %order.id, side = %order.side, fill = fill_price, "Paper resting order filled");
                    // Reduce-only leftovers with nothing to reduce are dropped by apply_fill.
                    let _ = apply_fill(book, symbol, order.side, order.size, fill_price, order.reduce_only);
                    i = 0;
                }
                None => i += 1,
            }
        }
    }
}

/// Net the fill against the symbol's position. Returns the realized PnL.
fn apply_fill(
    book: &mut Book,
    symbol: &str,
    side: OrderSide,
    size: f64,
    price: f64,
    reduce_only: bool,
) -> Result<f64> {
    let existing = book.positions.remove(symbol);
    let (position, realized) = match existing {
        Some(mut pos) if pos.side.entry_order_side() == side => {
            if reduce_only {
                book.positions.insert(symbol.to_string(), pos);
                return Err(Error::Exchange("reduce-only order would increase the position".into()));
            }
            let new_size = pos.size + size;
            pos.entry_price = (pos.entry_price * pos.size + price * size) / new_size;
            pos.size = new_size;
            (Some(pos), 0.0)
        }
        Some(mut pos) => {
            let closed = size.min(pos.size);
            let realized = (price - pos.entry_price) * closed * pos.side.sign();
            pos.size -= closed;
            let remainder = size - closed;
            if pos.size > 1e-12 {
                (Some(pos), realized)
            } else if remainder > 1e-12 && !reduce_only {
                (Some(new_position(symbol, pos.side.opposite(), remainder, price)), realized)
            } else {
                (None, realized)
            }
        }
        None if reduce_only => {
            return Err(Error::Exchange("reduce-only order with no open position".into()));
        }
        None => {
            let side = match side {
                OrderSide::Buy => Side::Long,
                OrderSide::Sell => Side::Short,
            };
            (Some(new_position(symbol, side, size, price)), 0.0)
        }
    };

    book.balance += realized;
    match position {
        Some(pos) => {
            book.positions.insert(symbol.to_string(), pos);
        }
        None => {
            // Flat: reduce-only orders have nothing left to protect.
            book.orders.retain(|o| !(o.symbol == symbol && o.reduce_only));
        }
    }
    Ok(realized)
}

fn new_position(symbol: &str, side: Side, size: f64, price: f64) -> Position {
    Position {
        symbol: symbol.to_string(),
        side,
        size,
        entry_price: price,
        unrealized_pnl: 0.0,
        open_time: Some(Utc::now()),
    }
}

#[async_trait]
impl ExchangeClient for PaperClient {
    async fn ticker(&self, symbol: &str) -> Result<Ticker> {
        if let Some(feed) = &self.market_data {
            let ticker = feed.ticker(symbol).await?;
            self.set_price(symbol, ticker.last).await;
            return Ok(ticker);
        }
        let book = self.book.read().await;
        let last = book
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("No price available for {symbol}")))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            quote_volume_24h: book.quote_volumes.get(symbol).copied().unwrap_or(0.0),
            timestamp: Utc::now(),
        })
    }

    async fn candles(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        if let Some(feed) = &self.market_data {
            return feed.candles(symbol, timeframe, limit).await;
        }
        let book = self.book.read().await;
        let candles = book
            .candles
            .get(&(symbol.to_string(), timeframe.to_string()))
            .ok_or_else(|| Error::Exchange(format!("No {timeframe} candles available for {symbol}")))?;
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<Position>> {
        let book = self.book.read().await;
        let price = book.prices.get(symbol).copied();
        Ok(book
            .positions
            .get(symbol)
            .filter(|p| p.is_open())
            .map(|p| {
                let mut p = p.clone();
                if let Some(price) = price {
                    p.unrealized_pnl = p.pnl_at(price);
                }
                p
            })
            .into_iter()
            .collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        if !(order.size.is_finite() && order.size > 0.0) {
            return Err(Error::Exchange(format!("invalid order size {}", order.size)));
        }
        let mut book = self.book.write().await;
        let last = book.prices.get(&order.symbol).copied().ok_or_else(|| {
            Error::Exchange(format!(
                "PaperClient has no price for '{}'. Set one before trading.",
                order.symbol
            ))
        })?;

        book.next_id += 1;
        let id = format!("paper-{}", book.next_id);

        let immediate = match order.kind {
            OrderKind::Market => Some(self.fill_price(order.side, last)),
            OrderKind::Limit { price } => {
                let marketable = match order.side {
                    OrderSide::Buy => price >= last,
                    OrderSide::Sell => price <= last,
                };
                marketable.then_some(price)
            }
            OrderKind::Trigger { .. } => None,
        };

        match immediate {
            Some(fill) => {
                let realized = apply_fill(
                    &mut book,
                    &order.symbol,
                    order.side,
                    order.size,
                    fill,
                    order.reduce_only,
                )?;
                debug!(
                    symbol = %order.symbol,
                    side = %order.side,
                    last,
                    fill,
                    size = order.size,
                    realized,
                    "Paper fill simulated"
                );
            }
            None => {
                if order.reduce_only && !book.positions.contains_key(&order.symbol) {
                    return Err(Error::Exchange("reduce-only order with no open position".into()));
                }
                book.orders.push(OpenOrder {
                    id: id.clone(),
                    symbol: order.symbol.clone(),
                    side: order.side,
                    kind: order.kind,
                    size: order.size,
                    reduce_only: order.reduce_only,
                });
            }
        }
        book.placed.push(order.clone());
        Ok(id)
    }

    async fn cancel_order(&self, symbol: &str, order: &OpenOrder) -> Result<()> {
        let mut book = self.book.write().await;
        let before = book.orders.len();
        book.orders.retain(|o| !(o.symbol == symbol && o.id == order.id));
        if book.orders.len() == before {
            return Err(Error::Exchange(format!("order {} not found", order.id)));
        }
        Ok(())
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>> {
        Ok(self
            .book
            .read()
            .await
            .orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn balance(&self, currency: &str) -> Result<Balance> {
        if currency != QUOTE_CURRENCY {
            return Err(Error::Exchange(format!("paper account holds {QUOTE_CURRENCY} only")));
        }
        let book = self.book.read().await;
        let unrealized: f64 = book
            .positions
            .values()
            .filter_map(|p| book.prices.get(&p.symbol).map(|&price| p.pnl_at(price)))
            .sum();
        Ok(Balance {
            currency: currency.to_string(),
            total: book.balance + unrealized,
            free: book.balance,
        })
    }
}
