//! Wires every component named in the topology (config::Config) into a
//! running system: cold storage, the Risk Gate actor, the Event Fan-out
//! sinks, one Market Engine worker per configured product, and the admin
//! HTTP surface, all supervised by a single `Supervisor`.

use crate::application::candle_store::CandleStore;
use crate::application::event_fanout::EventPublisher;
use crate::application::indicator_engine::IndicatorEngine;
use crate::application::market_engine::MarketWorker;
use crate::application::risk_gate::{self, RiskGateHandle};
use crate::application::strategy_host::TradingStrategy;
use crate::application::strategy_host::dual_sma::DualSmaStrategy;
use crate::application::strategy_host::supertrend_adx::SupertrendAdxStrategy;
use crate::application::supervisor::Supervisor;
use crate::config::{Config, Mode};
use crate::domain::instrument::Instrument;
use crate::domain::ports::ExchangeAdapter;
use crate::domain::risk::state::{RiskLimits, RiskState};
use crate::infrastructure::adapters::{BinanceAdapter, PaperAdapter};
use crate::infrastructure::http::{self, AppState};
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::persistence::{Database, RiskStateStore, SqliteAuditRepository, SqliteCandleRepository};
use crate::infrastructure::sinks::{AuditSink, EventFanout, EventSink, MessageBusSink, MetricsSink, TimeSeriesSink};
use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything the entrypoint needs after `bootstrap()` returns: the
/// supervisor to run the lifecycle, and the HTTP router to serve it with.
pub struct System {
    pub supervisor: Supervisor,
    pub http_router: axum::Router,
    pub http_bind_address: String,
    pub http_port: u16,
}

pub async fn bootstrap(config: Config) -> Result<System> {
    let database = Database::new(&config.database_url).await.context("failed to open cold store")?;
    let metrics = Arc::new(Metrics::new().context("failed to build metrics registry")?);

    let candle_repo = Arc::new(SqliteCandleRepository::new(database.pool.clone()));
    let candle_store = Arc::new(CandleStore::new(candle_repo, metrics.clone()));

    let risk_gate = build_risk_gate(&config, database.pool.clone()).await?;

    let fanout = Arc::new(build_fanout(&config, database.pool.clone(), metrics.clone()).await);
    let publisher = Arc::new(EventPublisher::new(fanout.clone()));

    let mut supervisor = Supervisor::new(candle_store.clone(), risk_gate.clone(), fanout.clone(), metrics.clone());

    let mut market_keys = Vec::new();
    for exchange in &config.exchanges {
        let adapter = build_adapter(&config, exchange)?;
        adapter.init(exchange.name == config.primary_exchange).await.context("adapter init failed")?;

        for product in &exchange.products {
            let instrument = Instrument::new(
                exchange.name.clone(),
                product.id.clone(),
                product.asset_type,
                product.quote_type.clone(),
                product.lot_size,
                exchange.candle_interval_seconds,
            );
            let key = instrument.market_key();
            market_keys.push(key.clone());

            let inbox = adapter.market_init(&instrument).await.context("market_init failed")?;
            let indicator_engine = Arc::new(Mutex::new(IndicatorEngine::new(metrics.clone())));
            let strategy: Box<dyn TradingStrategy> = default_strategy();

            let worker = MarketWorker {
                instrument,
                adapter: adapter.clone(),
                candle_store: candle_store.clone(),
                indicator_engine,
                strategy: Arc::new(Mutex::new(strategy)),
                risk_gate: risk_gate.clone(),
                publisher: publisher.clone(),
                metrics: metrics.clone(),
                trade_lots: config.trade_lots,
                open_orders: Arc::new(Mutex::new(HashMap::new())),
            };

            let handle = tokio::spawn(worker.run(inbox));
            supervisor.track_market(handle);
        }
    }

    let http_state = AppState {
        candle_store,
        risk_gate,
        metrics,
        markets: Arc::new(market_keys),
        push: supervisor.broadcast.clone(),
    };

    Ok(System {
        supervisor,
        http_router: http::router(http_state),
        http_bind_address: config.http_bind_address,
        http_port: config.http_port,
    })
}

async fn build_risk_gate(config: &Config, mirror_pool: sqlx::SqlitePool) -> Result<RiskGateHandle> {
    let store = RiskStateStore::new(config.risk_state_path.clone(), mirror_pool);
    let today = Utc::now().date_naive();
    let limits = RiskLimits {
        max_daily_loss_abs: config.risk_limits.max_daily_loss_abs,
        max_daily_loss_pct: config.risk_limits.max_daily_loss_pct,
        max_position_size_lots: config.risk_limits.max_position_size_lots,
        max_open_positions: config.risk_limits.max_open_positions,
        starting_capital: config.risk_limits.starting_capital,
    };

    let initial = match store.load().await.context("failed to load persisted risk state")? {
        Some(state) if state.trading_date == today => state,
        _ => RiskState::new(today, limits),
    };

    Ok(risk_gate::spawn(initial, store))
}

async fn build_fanout(config: &Config, pool: sqlx::SqlitePool, metrics: Arc<Metrics>) -> EventFanout {
    let mut sinks: Vec<Box<dyn EventSink>> = vec![Box::new(TimeSeriesSink::new(pool.clone(), metrics.clone()))];

    if let Some(redis_url) = &config.redis_url {
        match MessageBusSink::connect(redis_url, metrics.clone()).await {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(err) => tracing::warn!(error = %err, "message bus sink unavailable, continuing without it"),
        }
    }

    sinks.push(Box::new(AuditSink::new(Arc::new(SqliteAuditRepository::new(pool)))));
    sinks.push(Box::new(MetricsSink::new(metrics)));

    EventFanout::new(sinks)
}

fn build_adapter(config: &Config, exchange: &crate::config::ExchangeConfig) -> Result<Arc<dyn ExchangeAdapter>> {
    match exchange.name.as_str() {
        "binance" => Ok(Arc::new(BinanceAdapter::new(config.binance_api_key.clone(), config.binance_api_secret.clone()))),
        "paper" => Ok(Arc::new(PaperAdapter::new(dec!(10), dec!(100000)))),
        other => anyhow::bail!("unsupported exchange adapter '{other}'"),
    }
}

fn default_strategy() -> Box<dyn TradingStrategy> {
    if let Ok(supertrend) = std::env::var("RUSTRADE_STRATEGY") {
        if supertrend == "supertrend_adx" {
            return Box::new(SupertrendAdxStrategy::new(10, 14, 3.0, 14, 20.0, 2.0));
        }
    }
    Box::new(DualSmaStrategy::new(9, 21, 0.0))
}

pub fn is_live(config: &Config) -> bool {
    matches!(config.mode, Mode::Live)
}
