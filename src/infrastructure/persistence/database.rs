use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Singleton database wrapper around the cold-tier SQLite pool shared by the
/// Candle Store's cold path and the relational audit sink.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize the cold-tier schema. Every amount column is stored as
    /// TEXT to preserve `Decimal` precision across the sqlx round-trip.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candle_points (
                instrument_key TEXT NOT NULL,
                time INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                PRIMARY KEY (instrument_key, time)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candle_points table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candle_points_instrument_time
            ON candle_points (instrument_key, time);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candle_points index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indicator_points (
                instrument_key TEXT NOT NULL,
                indicator_name TEXT NOT NULL,
                time INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (instrument_key, indicator_name, time)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create indicator_points table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                instrument TEXT,
                timestamp INTEGER NOT NULL,
                tags_json TEXT NOT NULL,
                fields_json TEXT NOT NULL,
                recorded_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create audit_events table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_audit_events_instrument_time
            ON audit_events (instrument, timestamp);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create audit_events index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                instrument TEXT NOT NULL,
                side TEXT NOT NULL,
                order_type TEXT NOT NULL,
                status TEXT NOT NULL,
                request_size TEXT NOT NULL,
                filled_size TEXT NOT NULL,
                price TEXT NOT NULL,
                fees TEXT NOT NULL,
                create_time INTEGER NOT NULL,
                update_time INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create orders table")?;

        // Risk state is persisted primarily as an atomically-rewritten JSON
        // file (`risk_state_file`); this table is a queryable mirror kept in
        // step so operators can inspect history without parsing the file.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_state_mirror (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                trading_date TEXT NOT NULL,
                daily_pnl_realized TEXT NOT NULL,
                blocked BOOLEAN NOT NULL,
                block_reason TEXT,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create risk_state_mirror table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
