use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar. Sequences handed to the core are always ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Direction of a position or of a trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Order side that opens (or adds to) a position on this side.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces a position on this side.
    pub fn exit_order_side(self) -> OrderSide {
        self.entry_order_side().opposite()
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Execution style of an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit { price: f64 },
    /// Stop order: becomes a market order once `trigger_price` trades.
    Trigger { trigger_price: f64 },
}

impl OrderKind {
    pub fn is_trigger(&self) -> bool {
        matches!(self, OrderKind::Trigger { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    #[default]
    Isolated,
    Cross,
}

impl std::fmt::Display for MarginMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarginMode::Isolated => write!(f, "isolated"),
            MarginMode::Cross => write!(f, "cross"),
        }
    }
}

/// Account position mode. `Net` keeps one signed position per instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    #[default]
    Net,
    LongShort,
}

/// An order to be submitted to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client order id, alphanumeric and at most 32 chars.
    pub client_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub size: f64,
    pub reduce_only: bool,
    pub margin_mode: MarginMode,
    pub position_mode: PositionMode,
}

impl OrderRequest {
    fn new(symbol: impl Into<String>, side: OrderSide, kind: OrderKind, size: f64) -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().simple().to_string(),
            symbol: symbol.into(),
            side,
            kind,
            size,
            reduce_only: false,
            margin_mode: MarginMode::default(),
            position_mode: PositionMode::default(),
        }
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, size: f64) -> Self {
        Self::new(symbol, side, OrderKind::Market, size)
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, size: f64, price: f64) -> Self {
        Self::new(symbol, side, OrderKind::Limit { price }, size)
    }

    pub fn trigger(
        symbol: impl Into<String>,
        side: OrderSide,
        size: f64,
        trigger_price: f64,
    ) -> Self {
        Self::new(symbol, side, OrderKind::Trigger { trigger_price }, size)
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_margin_mode(mut self, mode: MarginMode) -> Self {
        self.margin_mode = mode;
        self
    }
}

/// An order resting on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub size: f64,
    pub reduce_only: bool,
}

impl OpenOrder {
    /// A reduce-only trigger order closing a position on `side`.
    pub fn protects(&self, side: Side) -> bool {
        self.kind.is_trigger() && self.reduce_only && self.side == side.exit_order_side()
    }
}

/// Exchange-reported position on the traded instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub unrealized_pnl: f64,
    /// Creation time when the exchange reports it.
    pub open_time: Option<DateTime<Utc>>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.size > 0.0
    }

    /// PnL of the whole position if it were closed at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.size * self.side.sign()
    }

    /// Same position as `other`, ignoring PnL drift.
    pub fn same_as(&self, other: &Position) -> bool {
        self.side == other.side
            && (self.size - other.size).abs() < 1e-12
            && (self.entry_price - other.entry_price).abs() < 1e-9
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub last: f64,
    /// 24h traded volume in quote currency.
    pub quote_volume_24h: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub total: f64,
    pub free: f64,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Where the dispatcher is within (or between) decision cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    AssessingPosition,
    ChoosingRegime,
    GridMode,
    TrendMode,
    Cooldown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::AssessingPosition => "assessing_position",
            Phase::ChoosingRegime => "choosing_regime",
            Phase::GridMode => "grid",
            Phase::TrendMode => "trend",
            Phase::Cooldown => "cooldown",
        };
        write!(f, "{s}")
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopHit,
    TimeStop,
    RegimeExit,
    /// Closed on the exchange side (protective or take-profit order filled).
    External,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopHit => write!(f, "stop hit"),
            CloseReason::TimeStop => write!(f, "time-stop"),
            CloseReason::RegimeExit => write!(f, "regime exit"),
            CloseReason::External => write!(f, "closed on exchange"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TradeOpened,
    TradeClosed,
    StopUpdated,
    GridPlaced,
    DailySummary,
    Error,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::TradeOpened => "trade_opened",
            EventKind::TradeClosed => "trade_closed",
            EventKind::StopUpdated => "stop_updated",
            EventKind::GridPlaced => "grid_placed",
            EventKind::DailySummary => "daily_summary",
            EventKind::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One row of the trade/event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    pub symbol: String,
    pub side: Option<Side>,
    pub size: Option<f64>,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub realized_pnl: Option<f64>,
    pub cumulative_pnl: f64,
    pub message: String,
}

impl EventRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        event_type: EventKind,
        symbol: impl Into<String>,
        cumulative_pnl: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            event_type,
            symbol: symbol.into(),
            side: None,
            size: None,
            entry_price: None,
            exit_price: None,
            realized_pnl: None,
            cumulative_pnl,
            message: message.into(),
        }
    }

    pub fn with_trade(mut self, side: Side, size: f64, entry_price: f64) -> Self {
        self.side = Some(side);
        self.size = Some(size);
        self.entry_price = Some(entry_price);
        self
    }

    pub fn with_exit(mut self, exit_price: f64, realized_pnl: f64) -> Self {
        self.exit_price = Some(exit_price);
        self.realized_pnl = Some(realized_pnl);
        self
    }
}

/// Read-only view published by the dispatcher after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub symbol: String,
    pub mode: TradingMode,
    pub phase: Phase,
    pub trend: Option<Side>,
    pub confirmation_count: u32,
    pub position: Option<Position>,
    pub trail_stop_price: Option<f64>,
    pub last_price: Option<f64>,
    pub total_pnl: f64,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub max_drawdown_pct: f64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    pub fn new(symbol: impl Into<String>, mode: TradingMode) -> Self {
        Self {
            symbol: symbol.into(),
            mode,
            phase: Phase::Idle,
            trend: None,
            confirmation_count: 0,
            position: None,
            trail_stop_price: None,
            last_price: None,
            total_pnl: 0.0,
            total_trades: 0,
            winning_trades: 0,
            max_drawdown_pct: 0.0,
            last_cycle_at: None,
            last_error: None,
        }
    }

    /// Win rate in percent, 0 when no trades closed yet.
    pub fn win_rate_pct(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        }
    }
}
