//! sqlx-backed cold tier for the Candle Store (C1).

use crate::domain::candle::Candle;
use crate::domain::repositories::CandleRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub struct SqliteCandleRepository {
    pool: SqlitePool,
}

impl SqliteCandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decimal_col(row: &sqlx::sqlite::SqliteRow, name: &str) -> Result<Decimal> {
    let raw: String = row.try_get(name)?;
    Decimal::from_str(&raw).with_context(|| format!("invalid decimal in column {name}: {raw}"))
}

fn row_to_candle(row: sqlx::sqlite::SqliteRow) -> Result<Candle> {
    Ok(Candle {
        time: row.try_get("time")?,
        open: decimal_col(&row, "open")?,
        high: decimal_col(&row, "high")?,
        low: decimal_col(&row, "low")?,
        close: decimal_col(&row, "close")?,
        volume: decimal_col(&row, "volume")?,
    })
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    async fn save(&self, instrument_key: &str, candle: &Candle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candle_points (instrument_key, time, open, high, low, close, volume)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(instrument_key, time) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume
            "#,
        )
        .bind(instrument_key)
        .bind(candle.time)
        .bind(candle.open.to_string())
        .bind(candle.high.to_string())
        .bind(candle.low.to_string())
        .bind(candle.close.to_string())
        .bind(candle.volume.to_string())
        .execute(&self.pool)
        .await
        .context("failed to upsert candle")?;
        Ok(())
    }

    async fn save_batch(&self, instrument_key: &str, candles: &[Candle]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candle_points (instrument_key, time, open, high, low, close, volume)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(instrument_key, time) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(instrument_key)
            .bind(candle.time)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .execute(&mut *tx)
            .await
            .context("failed to upsert candle in batch")?;
        }
        tx.commit().await.context("failed to commit candle batch")?;
        Ok(())
    }

    async fn get_range(&self, instrument_key: &str, start_ts: i64, end_ts: i64) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT time, open, high, low, close, volume FROM candle_points \
             WHERE instrument_key = ?1 AND time >= ?2 AND time <= ?3 ORDER BY time ASC",
        )
        .bind(instrument_key)
        .bind(start_ts)
        .bind(end_ts)
        .fetch_all(&self.pool)
        .await
        .context("failed to query candle range")?;

        rows.into_iter().map(row_to_candle).collect()
    }

    async fn get_since(&self, instrument_key: &str, start_ts: i64) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT time, open, high, low, close, volume FROM candle_points \
             WHERE instrument_key = ?1 AND time >= ?2 ORDER BY time ASC",
        )
        .bind(instrument_key)
        .bind(start_ts)
        .fetch_all(&self.pool)
        .await
        .context("failed to query candles since")?;

        rows.into_iter().map(row_to_candle).collect()
    }

    async fn get_recent(&self, instrument_key: &str, limit: usize) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            "SELECT time, open, high, low, close, volume FROM candle_points \
             WHERE instrument_key = ?1 ORDER BY time DESC LIMIT ?2",
        )
        .bind(instrument_key)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to query recent candles")?;

        let mut candles: Vec<Candle> = rows.into_iter().map(row_to_candle).collect::<Result<_>>()?;
        candles.reverse();
        Ok(candles)
    }

    async fn prune(&self, days_retention: i64) -> Result<u64> {
        let cutoff = days_retention * 86_400;
        let result = sqlx::query(
            "DELETE FROM candle_points WHERE time < (strftime('%s', 'now') - ?1)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("failed to prune candle_points")?;
        Ok(result.rows_affected())
    }
}
