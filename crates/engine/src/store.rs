use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use common::{EventRecord, EventSink, Result};

const DISPATCHER_KEY: &str = "dispatcher";

/// SQLite-backed event log and snapshot store.
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // one connection keeps `sqlite::memory:` databases shared
        let max = if url.contains(":memory:") { 1 } else { 4 };
        let db = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(opts)
            .await?;
        sqlx::migrate!("../../migrations")
            .run(&db)
            .await
            .map_err(sqlx::Error::from)?;
        info!(url, "Database ready");
        Ok(Self { db })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, event_type, symbol, side, size, entry_price, exit_price,
                   realized_pnl, cumulative_pnl, message
            FROM events
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| -> Result<EventRecord> {
                let timestamp: String = row.try_get("timestamp")?;
                let event_type: String = row.try_get("event_type")?;
                let side: Option<String> = row.try_get("side")?;
                Ok(EventRecord {
                    timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                        .map_err(|e| common::Error::Other(format!("bad event timestamp: {e}")))?
                        .with_timezone(&Utc),
                    event_type: serde_json::from_value(serde_json::Value::String(event_type))?,
                    symbol: row.try_get("symbol")?,
                    side: side
                        .map(|s| serde_json::from_value(serde_json::Value::String(s)))
                        .transpose()?,
                    size: row.try_get("size")?,
                    entry_price: row.try_get("entry_price")?,
                    exit_price: row.try_get("exit_price")?,
                    realized_pnl: row.try_get("realized_pnl")?,
                    cumulative_pnl: row.try_get("cumulative_pnl")?,
                    message: row.try_get("message")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for SqliteStore {
    async fn record(&self, event: &EventRecord) -> Result<()> {
        let timestamp = event.timestamp.to_rfc3339();
        let event_type = event.event_type.to_string();
        let side = event.side.map(|s| s.to_string());

        sqlx::query(
            r#"
            INSERT INTO events (timestamp, event_type, symbol, side, size, entry_price,
                                exit_price, realized_pnl, cumulative_pnl, message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(timestamp)
        .bind(event_type)
        .bind(&event.symbol)
        .bind(side)
        .bind(event.size)
        .bind(event.entry_price)
        .bind(event.exit_price)
        .bind(event.realized_pnl)
        .bind(event.cumulative_pnl)
        .bind(&event.message)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &serde_json::Value) -> Result<()> {
        let body = snapshot.to_string();
        let updated_at = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO snapshots (key, body, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(DISPATCHER_KEY)
        .bind(body)
        .bind(updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT body FROM snapshots WHERE key = ?1")
            .bind(DISPATCHER_KEY)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::{EventKind, Side};
    use serde_json::json;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn events_round_trip() {
        let store = store().await;
        let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let opened = EventRecord::new(ts, EventKind::TradeOpened, "BTC-USDT-SWAP", 0.0, "trend entry")
            .with_trade(Side::Long, 0.01, 60_000.0);
        let closed = EventRecord::new(ts, EventKind::TradeClosed, "BTC-USDT-SWAP", 12.5, "stop hit")
            .with_trade(Side::Long, 0.01, 60_000.0)
            .with_exit(61_250.0, 12.5);

        store.record(&opened).await.unwrap();
        store.record(&closed).await.unwrap();

        let events = store.recent_events(10).await.unwrap();
        assert_eq!(events, vec![closed, opened]);
    }

    #[tokio::test]
    async fn snapshot_is_upserted() {
        let store = store().await;
        assert_eq!(store.load_snapshot().await.unwrap(), None);

        store.save_snapshot(&json!({ "total_trades": 1 })).await.unwrap();
        store.save_snapshot(&json!({ "total_trades": 2 })).await.unwrap();

        let snap = store.load_snapshot().await.unwrap().unwrap();
        assert_eq!(snap["total_trades"], 2);
    }
}
