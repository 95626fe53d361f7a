//! SQLite-backed stand-in for the original InfluxDB time-series sink:
//! every numeric field on a published event becomes one row in
//! `indicator_points`, keyed by instrument and field name.

use super::EventSink;
use crate::domain::event::{Event, FieldValue};
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct TimeSeriesSink {
    pool: SqlitePool,
    metrics: Arc<Metrics>,
}

impl TimeSeriesSink {
    pub fn new(pool: SqlitePool, metrics: Arc<Metrics>) -> Self {
        Self { pool, metrics }
    }
}

#[async_trait]
impl EventSink for TimeSeriesSink {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn publish(&self, event: &Event) -> anyhow::Result<()> {
        let instrument_key = event.instrument.clone().unwrap_or_else(|| "_global".to_string());

        let numeric_fields: Vec<(&str, f64)> = event
            .fields
            .iter()
            .filter_map(|(k, v)| match v {
                FieldValue::Number(n) => Some((k.as_str(), *n)),
                FieldValue::Text(_) => None,
            })
            .collect();

        if numeric_fields.is_empty() {
            return Ok(());
        }

        let result: anyhow::Result<()> = async {
            let mut tx = self.pool.begin().await?;
            for (field, value) in &numeric_fields {
                sqlx::query(
                    r#"
                    INSERT INTO indicator_points (instrument_key, indicator_name, time, value)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(instrument_key, indicator_name, time) DO UPDATE SET value = excluded.value
                    "#,
                )
                .bind(&instrument_key)
                .bind(*field)
                .bind(event.timestamp)
                .bind(value.to_string())
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.metrics.inc_timeseries_write(&instrument_key);
                Ok(())
            }
            Err(err) => {
                self.metrics.inc_timeseries_error(&instrument_key);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventFamily;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool_with_schema() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE indicator_points (instrument_key TEXT, indicator_name TEXT, time INTEGER, \
             value TEXT, PRIMARY KEY (instrument_key, indicator_name, time))",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn writes_every_numeric_field_as_a_point() {
        let pool = pool_with_schema().await;
        let metrics = Arc::new(Metrics::new().unwrap());
        let sink = TimeSeriesSink::new(pool.clone(), metrics);

        let event = Event::new(EventFamily::Candle, Some("binance:BTCUSDT".into()), 100)
            .with_field("close", FieldValue::Number(42000.0))
            .with_field("volume", FieldValue::Number(1.5));
        sink.publish(&event).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indicator_points")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
