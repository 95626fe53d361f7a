//! Repository Pattern abstractions for the Candle Store's cold tier and the
//! relational audit sink, enabling clean separation between the application
//! layer and the `sqlx`-backed storage implementation.

use crate::domain::candle::Candle;
use crate::domain::event::Event;
use anyhow::Result;
use async_trait::async_trait;

/// Cold-tier candle storage, keyed by an instrument's `market_key()`.
#[async_trait]
pub trait CandleRepository: Send + Sync {
    async fn save(&self, instrument_key: &str, candle: &Candle) -> Result<()>;
    async fn save_batch(&self, instrument_key: &str, candles: &[Candle]) -> Result<()>;
    async fn get_range(&self, instrument_key: &str, start_ts: i64, end_ts: i64) -> Result<Vec<Candle>>;
    async fn get_since(&self, instrument_key: &str, start_ts: i64) -> Result<Vec<Candle>>;
    async fn get_recent(&self, instrument_key: &str, limit: usize) -> Result<Vec<Candle>>;
    async fn prune(&self, days_retention: i64) -> Result<u64>;
}

/// Connection-pooled writer for the relational audit sink: one row per
/// event, intended for compliance replay.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn record(&self, event: &Event) -> Result<()>;
}
