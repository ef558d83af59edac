use crate::{Error, Result, TradingMode};

/// Process configuration loaded from environment variables at startup.
///
/// Trading parameters live in the TOML file at `bot_config_path`; this struct
/// only carries credentials, endpoints and paths.
#[derive(Debug, Clone)]
pub struct Config {
    pub trading_mode: TradingMode,

    // Exchange
    pub okx_api_key: String,
    pub okx_secret: String,
    pub okx_passphrase: String,
    /// Route requests to the OKX demo-trading environment.
    pub okx_demo: bool,
    pub symbol: String,

    // Telegram (optional; alerts go to the log when unset)
    pub telegram_token: Option<String>,
    pub telegram_chat_ids: Vec<i64>,

    // Paper trading
    pub paper_slippage_bps: f64,
    pub paper_balance_usd: f64,

    pub database_url: String,
    pub bot_config_path: String,
    /// Port of the liveness/status endpoint.
    pub port: u16,
}

impl Config {
    /// Load configuration from the environment, reading `.env` if present.
    /// OKX credentials are required only in live mode.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match optional_env("TRADING_MODE")
            .unwrap_or_else(|| "paper".to_string())
            .to_lowercase()
            .as_str()
        {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => {
                return Err(Error::Config(format!(
                    "TRADING_MODE must be 'paper' or 'live', got: '{other}'"
                )))
            }
        };

        let credential = |key: &str| -> Result<String> {
            match trading_mode {
                TradingMode::Live => required_env(key),
                TradingMode::Paper => Ok(optional_env(key).unwrap_or_default()),
            }
        };

        let telegram_chat_ids = match optional_env("TELEGRAM_CHAT_IDS") {
            Some(raw) => parse_ids(&raw)?,
            None => Vec::new(),
        };

        Ok(Config {
            trading_mode,
            okx_api_key: credential("OKX_API_KEY")?,
            okx_secret: credential("OKX_SECRET")?,
            okx_passphrase: credential("OKX_PASSPHRASE")?,
            okx_demo: parse_or("OKX_DEMO", true)?,
            symbol: optional_env("SYMBOL").unwrap_or_else(|| "BTC-USDT-SWAP".to_string()),
            telegram_token: optional_env("TELEGRAM_TOKEN").filter(|t| !t.is_empty()),
            telegram_chat_ids,
            paper_slippage_bps: parse_or("PAPER_SLIPPAGE_BPS", 10.0)?,
            paper_balance_usd: parse_or("PAPER_BALANCE_USD", 1_000.0)?,
            database_url: optional_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://voronbot.db?mode=rwc".to_string()),
            bot_config_path: optional_env("BOT_CONFIG_PATH")
                .unwrap_or_else(|| "config/bot.toml".to_string()),
            port: parse_or("PORT", 10_000)?,
        })
    }
}

fn parse_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                Error::Config(format!("TELEGRAM_CHAT_IDS contains non-numeric ID: '{s}'"))
            })
        })
        .collect()
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ids_parse_with_spaces() {
        assert_eq!(parse_ids("1, 2 ,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_ids("1,abc").is_err());
        assert!(parse_ids("").unwrap().is_empty());
    }
}
