//! Supervisor (C9): owns the init → run → shutdown lifecycle, aggregates
//! per-market heartbeats, and exposes the HTTP/metrics surface.

use crate::application::candle_store::CandleStore;
use crate::application::risk_gate::RiskGateHandle;
use crate::domain::instrument::Instrument;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::sinks::EventFanout;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;

/// How long `shutdown()` waits for markets to drain after broadcasting
/// `Draining` before forcing their tasks to abort.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct Heartbeat {
    pub instrument_key: String,
    pub last_seen_unix: i64,
}

pub struct Supervisor {
    pub candle_store: Arc<CandleStore>,
    pub risk_gate: RiskGateHandle,
    pub fanout: Arc<EventFanout>,
    pub metrics: Arc<Metrics>,
    pub state: watch::Sender<SupervisorState>,
    pub heartbeats: Arc<RwLock<HashMap<String, Heartbeat>>>,
    pub broadcast: broadcast::Sender<String>,
    markets: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(candle_store: Arc<CandleStore>, risk_gate: RiskGateHandle, fanout: Arc<EventFanout>, metrics: Arc<Metrics>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Starting);
        let (broadcast, _) = broadcast::channel(1024);
        Self {
            candle_store,
            risk_gate,
            fanout,
            metrics,
            state,
            heartbeats: Arc::new(RwLock::new(HashMap::new())),
            broadcast,
            markets: Vec::new(),
        }
    }

    /// Register a spawned per-instrument worker task so shutdown can wait
    /// on (and, failing that, abort) it.
    pub fn track_market(&mut self, handle: JoinHandle<()>) {
        self.markets.push(handle);
    }

    pub async fn record_heartbeat(&self, instrument: &Instrument, now_unix: i64) {
        let key = instrument.market_key();
        let mut heartbeats = self.heartbeats.write().await;
        heartbeats.insert(key.clone(), Heartbeat { instrument_key: key, last_seen_unix: now_unix });
    }

    pub async fn heartbeats_snapshot(&self) -> Vec<Heartbeat> {
        self.heartbeats.read().await.values().cloned().collect()
    }

    pub fn mark_running(&self) {
        let _ = self.state.send(SupervisorState::Running);
    }

    /// Stops accepting new work, broadcasts `draining` to every market
    /// worker, waits up to `DRAIN_TIMEOUT`, then aborts whatever remains.
    pub async fn shutdown(mut self) {
        let _ = self.state.send(SupervisorState::Draining);
        let _ = self.broadcast.send("draining".to_string());

        let drain = async {
            for handle in self.markets.drain(..) {
                let _ = handle.await;
            }
        };

        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!("drain timeout exceeded, forcing remaining market workers to stop");
        }

        let _ = self.state.send(SupervisorState::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::AssetType;
    use crate::infrastructure::persistence::candle_repository::SqliteCandleRepository;
    use crate::infrastructure::persistence::risk_state_file::RiskStateStore;
    use crate::domain::risk::state::{RiskLimits, RiskState};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> sqlx::SqlitePool {
        SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn heartbeats_track_most_recent_observation_per_instrument() {
        let db_pool = pool().await;
        sqlx::query("CREATE TABLE candle_points (instrument_key TEXT, time INTEGER, open TEXT, high TEXT, low TEXT, close TEXT, volume TEXT)")
            .execute(&db_pool)
            .await
            .unwrap();
        let candle_repo = Arc::new(SqliteCandleRepository::new(db_pool.clone()));
        let metrics = Arc::new(Metrics::new().unwrap());
        let candle_store = Arc::new(CandleStore::new(candle_repo, metrics.clone()));

        let mirror_pool = pool().await;
        sqlx::query(
            "CREATE TABLE risk_state_mirror (id INTEGER PRIMARY KEY, trading_date TEXT, daily_pnl_realized TEXT, blocked BOOLEAN, block_reason TEXT, updated_at INTEGER)",
        )
        .execute(&mirror_pool)
        .await
        .unwrap();
        let store = RiskStateStore::new(std::env::temp_dir().join("supervisor_test_state.json"), mirror_pool);
        let limits = RiskLimits {
            max_daily_loss_abs: dec!(1000),
            max_daily_loss_pct: rust_decimal::Decimal::ZERO,
            max_position_size_lots: 0,
            max_open_positions: 5,
            starting_capital: dec!(10000),
        };
        let risk_gate = crate::application::risk_gate::spawn(RiskState::new(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), limits), store);

        let fanout = Arc::new(EventFanout::new(Vec::new()));
        let supervisor = Supervisor::new(candle_store, risk_gate, fanout, metrics);

        let instrument = Instrument::new("binance", "BTCUSDT", AssetType::Crypto, "USDT", 1, 60);
        supervisor.record_heartbeat(&instrument, 1000).await;
        supervisor.record_heartbeat(&instrument, 2000).await;

        let snapshot = supervisor.heartbeats_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].last_seen_unix, 2000);
    }
}
