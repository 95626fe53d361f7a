//! Candle Store (C1): an in-memory hot cache backed by a `CandleRepository`
//! cold tier. Writes go to both; reads prefer the hot cache and only fall
//! back to the cold tier when it doesn't hold enough history.

use crate::domain::candle::{Candle, CandleSeries};
use crate::domain::repositories::CandleRepository;
use crate::infrastructure::observability::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Hot-cache retention per instrument; older candles stay in the cold tier
/// only.
const HOT_CACHE_CAPACITY: usize = 5_000;

pub struct CandleStore {
    hot: RwLock<HashMap<String, CandleSeries>>,
    cold: Arc<dyn CandleRepository>,
    metrics: Arc<Metrics>,
}

impl CandleStore {
    pub fn new(cold: Arc<dyn CandleRepository>, metrics: Arc<Metrics>) -> Self {
        Self { hot: RwLock::new(HashMap::new()), cold, metrics }
    }

    /// Warm the hot cache for an instrument from the cold tier, used once at
    /// startup per subscribed market.
    pub async fn warm(&self, instrument_key: &str) -> anyhow::Result<()> {
        let recent = self.cold.get_recent(instrument_key, HOT_CACHE_CAPACITY).await?;
        let mut hot = self.hot.write().await;
        let series = hot.entry(instrument_key.to_string()).or_default();
        series.upsert_batch(recent);
        Ok(())
    }

    /// Upsert one finalized candle: hot cache first (so readers never see a
    /// lag), then the cold tier, best-effort.
    pub async fn upsert(&self, instrument_key: &str, candle: Candle) {
        if let Err(err) = candle.validate() {
            tracing::warn!(instrument = instrument_key, error = %err, "dropping invalid candle");
            self.metrics.inc_candle_store_error(instrument_key);
            return;
        }

        {
            let mut hot = self.hot.write().await;
            let series = hot.entry(instrument_key.to_string()).or_default();
            series.upsert(candle);
            series.truncate_front(HOT_CACHE_CAPACITY);
        }

        if let Err(err) = self.cold.save(instrument_key, &candle).await {
            tracing::warn!(instrument = instrument_key, error = %err, "candle cold-store write failed");
            self.metrics.inc_candle_store_error(instrument_key);
        }

        self.metrics.inc_candles_processed(instrument_key);
    }

    pub async fn upsert_batch(&self, instrument_key: &str, candles: Vec<Candle>) {
        let valid: Vec<Candle> = candles
            .into_iter()
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(instrument = instrument_key, error = %err, "dropping invalid candle in batch");
                    self.metrics.inc_candle_store_error(instrument_key);
                    false
                }
            })
            .collect();

        {
            let mut hot = self.hot.write().await;
            let series = hot.entry(instrument_key.to_string()).or_default();
            series.upsert_batch(valid.clone());
            series.truncate_front(HOT_CACHE_CAPACITY);
        }

        if let Err(err) = self.cold.save_batch(instrument_key, &valid).await {
            tracing::warn!(instrument = instrument_key, error = %err, "candle cold-store batch write failed");
            self.metrics.inc_candle_store_error(instrument_key);
        }

        for _ in &valid {
            self.metrics.inc_candles_processed(instrument_key);
        }
    }

    /// Cache-first with cold fallback: the hot cache alone is not
    /// authoritative, so a miss (unwarmed instrument, or fewer candles than
    /// asked for) falls back to the cold tier rather than under-reporting.
    pub async fn recent(&self, instrument_key: &str, n: usize) -> Vec<Candle> {
        let cached = {
            let hot = self.hot.read().await;
            hot.get(instrument_key).map(|series| series.recent(n).to_vec())
        };

        match cached {
            Some(candles) if candles.len() >= n => candles,
            _ => match self.cold.get_recent(instrument_key, n).await {
                Ok(candles) => candles,
                Err(err) => {
                    tracing::warn!(instrument = instrument_key, error = %err, "cold-tier fallback for recent() failed");
                    self.metrics.inc_candle_store_error(instrument_key);
                    Vec::new()
                }
            },
        }
    }

    pub async fn len(&self, instrument_key: &str) -> usize {
        self.hot.read().await.get(instrument_key).map(CandleSeries::len).unwrap_or(0)
    }

    /// Full history for an instrument, read straight through to the cold
    /// tier (the hot cache only ever holds the most recent window).
    pub async fn get_all(&self, instrument_key: &str) -> anyhow::Result<Vec<Candle>> {
        self.cold.get_since(instrument_key, 0).await
    }

    pub async fn get_since(&self, instrument_key: &str, start_ts: i64) -> anyhow::Result<Vec<Candle>> {
        self.cold.get_since(instrument_key, start_ts).await
    }

    pub async fn get_range(&self, instrument_key: &str, start_ts: i64, end_ts: i64) -> anyhow::Result<Vec<Candle>> {
        self.cold.get_range(instrument_key, start_ts, end_ts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyRepo {
        fail_after: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CandleRepository for FlakyRepo {
        async fn save(&self, _instrument_key: &str, _candle: &Candle) -> anyhow::Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                anyhow::bail!("cold store offline");
            }
            Ok(())
        }
        async fn save_batch(&self, _instrument_key: &str, _candles: &[Candle]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_range(&self, _k: &str, _s: i64, _e: i64) -> anyhow::Result<Vec<Candle>> {
            Ok(Vec::new())
        }
        async fn get_since(&self, _k: &str, _s: i64) -> anyhow::Result<Vec<Candle>> {
            Ok(Vec::new())
        }
        async fn get_recent(&self, _k: &str, _n: usize) -> anyhow::Result<Vec<Candle>> {
            Ok(Vec::new())
        }
        async fn prune(&self, _days: i64) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn cold_store_failures_never_block_the_hot_cache() {
        let repo = Arc::new(FlakyRepo { fail_after: 0, calls: AtomicUsize::new(0) });
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = CandleStore::new(repo, metrics);

        for i in 0..100i64 {
            let candle = Candle::new(i, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1));
            store.upsert("binance:BTCUSDT", candle).await;
        }

        assert_eq!(store.len("binance:BTCUSDT").await, 100);
        let _ = Decimal::ZERO;
    }

    /// A cold tier that actually remembers what it's given, for exercising
    /// `recent()`'s cache-miss fallback and the `get_*` facade methods.
    struct RecordingRepo {
        candles: tokio::sync::Mutex<Vec<Candle>>,
    }

    #[async_trait]
    impl CandleRepository for RecordingRepo {
        async fn save(&self, _instrument_key: &str, candle: &Candle) -> anyhow::Result<()> {
            self.candles.lock().await.push(*candle);
            Ok(())
        }
        async fn save_batch(&self, _instrument_key: &str, candles: &[Candle]) -> anyhow::Result<()> {
            self.candles.lock().await.extend_from_slice(candles);
            Ok(())
        }
        async fn get_range(&self, _k: &str, start_ts: i64, end_ts: i64) -> anyhow::Result<Vec<Candle>> {
            Ok(self.candles.lock().await.iter().filter(|c| c.time >= start_ts && c.time <= end_ts).copied().collect())
        }
        async fn get_since(&self, _k: &str, start_ts: i64) -> anyhow::Result<Vec<Candle>> {
            Ok(self.candles.lock().await.iter().filter(|c| c.time >= start_ts).copied().collect())
        }
        async fn get_recent(&self, _k: &str, n: usize) -> anyhow::Result<Vec<Candle>> {
            let all = self.candles.lock().await;
            let start = all.len().saturating_sub(n);
            Ok(all[start..].to_vec())
        }
        async fn prune(&self, _days: i64) -> anyhow::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn recent_falls_back_to_cold_tier_on_hot_cache_miss() {
        let repo = Arc::new(RecordingRepo { candles: tokio::sync::Mutex::new(Vec::new()) });
        for i in 0..10i64 {
            let candle = Candle::new(i, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1));
            repo.candles.lock().await.push(candle);
        }
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = CandleStore::new(repo, metrics);

        // Hot cache was never warmed for this instrument; recent() must
        // still surface the cold tier's history instead of an empty vec.
        let recent = store.recent("binance:ETHUSDT", 5).await;
        assert_eq!(recent.len(), 5);
    }

    #[tokio::test]
    async fn get_all_get_since_get_range_delegate_to_cold_tier() {
        let repo = Arc::new(RecordingRepo { candles: tokio::sync::Mutex::new(Vec::new()) });
        for i in 0..20i64 {
            repo.candles.lock().await.push(Candle::new(i, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)));
        }
        let metrics = Arc::new(Metrics::new().unwrap());
        let store = CandleStore::new(repo, metrics);

        assert_eq!(store.get_all("binance:BTCUSDT").await.unwrap().len(), 20);
        assert_eq!(store.get_since("binance:BTCUSDT", 10).await.unwrap().len(), 10);
        assert_eq!(store.get_range("binance:BTCUSDT", 5, 9).await.unwrap().len(), 5);
    }
}
