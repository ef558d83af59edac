use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed numeric argument. The caller must not proceed with the trade.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data: need {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A computed value broke a trading invariant (wrong-side stop, non-positive size).
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Exchange rejected the request at the API level.
    #[error("Exchange API error: {0}")]
    Exchange(String),

    /// Network or HTTP-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Timeout(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
