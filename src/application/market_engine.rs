//! Market Engine (C8): one worker task per instrument, turning the
//! adapter's raw message stream into finalized candles, indicator updates,
//! strategy signals, and (after an `admit()` check) orders.

use crate::application::candle_store::CandleStore;
use crate::application::event_fanout::EventPublisher;
use crate::application::indicator_engine::IndicatorEngine;
use crate::application::risk_gate::RiskGateHandle;
use crate::application::strategy_host::{TradingStrategy, side_for_signal};
use crate::domain::candle::Candle;
use crate::domain::instrument::Instrument;
use crate::domain::order::{Order, OrderStatus, normalize_order_status};
use crate::domain::ports::{ExchangeAdapter, MarketMessage, TradeRequest};
use crate::domain::position::{Fill, apply_fill};
use crate::domain::risk::state::TradeRecord;
use crate::infrastructure::observability::Metrics;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bounded per-instrument inbox. When the adapter produces faster than the
/// worker drains, the oldest message is dropped and counted rather than
/// applying backpressure to the adapter's own read loop.
pub const INBOX_CAPACITY: usize = 2_000;

pub struct MarketWorker {
    pub instrument: Instrument,
    pub adapter: Arc<dyn ExchangeAdapter>,
    pub candle_store: Arc<CandleStore>,
    pub indicator_engine: Arc<Mutex<IndicatorEngine>>,
    pub strategy: Arc<Mutex<Box<dyn TradingStrategy>>>,
    pub risk_gate: RiskGateHandle,
    pub publisher: Arc<EventPublisher>,
    pub metrics: Arc<Metrics>,
    pub trade_lots: i64,
    /// Orders placed by this worker that haven't reached a terminal status
    /// yet, keyed by the adapter's order id — what `on_execution_report`
    /// reconciles asynchronous fills against.
    pub open_orders: Arc<Mutex<HashMap<String, Order>>>,
}

impl MarketWorker {
    /// Runs until the adapter's message channel closes (adapter shutdown or
    /// `close()`). Intended to be spawned as its own `tokio::task`.
    pub async fn run(self, mut inbox: tokio::sync::mpsc::Receiver<MarketMessage>) {
        let key = self.instrument.market_key();
        let mut current: Option<Candle> = None;

        while let Some(message) = inbox.recv().await {
            match message {
                MarketMessage::Trade { price, quantity, timestamp } => {
                    self.on_trade(&key, &mut current, price, quantity, timestamp).await;
                }
                MarketMessage::Kline { candle, closed } => {
                    if closed {
                        self.finalize_candle(&key, candle).await;
                    } else {
                        current = Some(candle);
                    }
                }
                MarketMessage::ExecutionReport { order_id, native_status, fill_delta, price, fees } => {
                    self.on_execution_report(&key, &order_id, &native_status, fill_delta, price, fees).await;
                }
            }
        }

        tracing::info!(instrument = %key, "market worker inbox closed, shutting down");
    }

    async fn on_trade(&self, key: &str, current: &mut Option<Candle>, price: Decimal, quantity: Decimal, timestamp: i64) {
        let interval = self.instrument.candle_interval_seconds.max(1) as i64;
        let bucket_start = (timestamp / interval) * interval;

        let rolled_over = match current {
            Some(c) if c.time != bucket_start => true,
            None => true,
            _ => false,
        };

        if rolled_over {
            if let Some(prev) = current.take() {
                self.finalize_candle(key, prev).await;
            }
            *current = Some(Candle::new(bucket_start, price, price, price, price, quantity));
        } else if let Some(c) = current.as_mut() {
            c.update_from_tick(price, quantity);
        }

        self.metrics.set_market_price(key, price.to_f64().unwrap_or(0.0), quantity.to_f64().unwrap_or(0.0));
        self.risk_gate.update_mark(key, price).await;
    }

    async fn finalize_candle(&self, key: &str, candle: Candle) {
        self.candle_store.upsert(key, candle).await;
        self.publisher.candle_closed(key, candle.time, candle.close, candle.volume).await;

        {
            let mut engine = self.indicator_engine.lock().await;
            engine.sma(key, &candle, 14);
        }

        let history = self.candle_store.recent(key, 512).await;
        let mut strategy = self.strategy.lock().await;
        if history.len() < strategy.warmup() {
            return;
        }

        let signal = strategy.generate_signal(&history);
        self.metrics.inc_signals(strategy.name(), &signal.to_string());
        let Some(side) = side_for_signal(signal) else { return };

        self.publisher
            .strategy_signal(key, candle.time, strategy.name(), side, signal)
            .await;

        let admit = self.risk_gate.admit(key, side, self.trade_lots, candle.close).await;
        if let Err(violation) = admit {
            tracing::info!(instrument = key, %violation, "risk gate denied signal");
            self.publisher.risk_event(candle.time, &violation.to_string()).await;
            return;
        }

        let request = TradeRequest {
            instrument: self.instrument.clone(),
            side,
            order_type: OrderType::Market,
            lots: self.trade_lots,
            limit_price: None,
        };

        let placed = match side {
            crate::domain::order::OrderSide::Buy => self.adapter.buy(request).await,
            crate::domain::order::OrderSide::Sell => self.adapter.sell(request).await,
        };

        match placed {
            Ok(Some(order)) => {
                self.metrics.inc_orders(
                    &self.instrument.venue,
                    &self.instrument.product_id,
                    &order.side.to_string(),
                    "market",
                    &order.status.to_string(),
                );
                self.publisher
                    .order_event(key, candle.time, crate::domain::event::trade_event_subtype::ORDER_PLACED, &order)
                    .await;

                if order.status == OrderStatus::Filled {
                    self.apply_order_fill(key, &order, self.trade_lots, candle.time).await;
                } else {
                    self.open_orders.lock().await.insert(order.id.clone(), order);
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(instrument = key, error = %err, "order placement failed");
                self.metrics.inc_order_rejected(&self.instrument.venue, &self.instrument.product_id, "adapter_error");
            }
        }
    }

    /// Reconciles a fill (synchronous or from `on_execution_report`) against
    /// the Risk Gate's authoritative position for `key`, then records the
    /// trade and notifies sinks. Shared so both paths stay in lockstep.
    async fn apply_order_fill(&self, key: &str, order: &Order, lots: i64, timestamp: i64) {
        let fill = Fill { side: order.side, lots, price: order.price, timestamp };
        let position = self.risk_gate.position(key).await.unwrap_or_else(|| crate::domain::position::Position::flat(key));
        let (resulting, realized) = apply_fill(position, &fill);

        self.risk_gate
            .record_trade(
                TradeRecord {
                    instrument: key.to_string(),
                    side: order.side,
                    lots,
                    price: order.price,
                    realized_pnl: realized,
                    trade_id: Some(order.id.clone()),
                    timestamp,
                },
                resulting,
            )
            .await;

        self.metrics.inc_order_filled(&self.instrument.venue, &self.instrument.product_id, &order.side.to_string());
        self.publisher
            .order_event(key, timestamp, crate::domain::event::trade_event_subtype::ORDER_FILLED, order)
            .await;
    }

    /// Reconciles an out-of-band execution report against the order this
    /// worker placed with the matching id (§4.8 intake), applying the fill
    /// through the same path as a synchronously-filled order.
    async fn on_execution_report(&self, key: &str, order_id: &str, native_status: &str, fill_delta: Decimal, price: Decimal, fees: Decimal) {
        let Ok(status) = normalize_order_status(native_status) else {
            tracing::warn!(instrument = key, order_id, native_status, "unmapped execution report status");
            return;
        };

        let mut order = {
            let orders = self.open_orders.lock().await;
            match orders.get(order_id) {
                Some(order) => order.clone(),
                None => {
                    tracing::warn!(instrument = key, order_id, native_status, "execution report for unknown order");
                    return;
                }
            }
        };

        let now = chrono::Utc::now().timestamp();
        if let Err(err) = order.transition(status, Some(fill_delta), Some(price), Some(fees), now) {
            tracing::warn!(instrument = key, order_id, error = %err, "execution report rejected by order state machine");
            return;
        }

        if order.status.is_terminal() {
            self.open_orders.lock().await.remove(order_id);
        } else {
            self.open_orders.lock().await.insert(order_id.to_string(), order.clone());
        }

        if order.status == OrderStatus::Filled {
            let filled_lots = fill_delta.round().to_i64().unwrap_or(self.trade_lots);
            self.apply_order_fill(key, &order, filled_lots, now).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_fanout::EventPublisher;
    use crate::application::indicator_engine::IndicatorEngine;
    use crate::application::strategy_host::dual_sma::DualSmaStrategy;
    use crate::domain::instrument::AssetType;
    use crate::domain::instrument::ProductInfo;
    use crate::domain::order::{OrderSide, OrderType};
    use crate::domain::ports::BalanceInfo;
    use crate::domain::repositories::CandleRepository;
    use crate::domain::risk::state::{RiskLimits, RiskState};
    use crate::infrastructure::observability::Metrics;
    use crate::infrastructure::persistence::risk_state_file::RiskStateStore;
    use crate::infrastructure::sinks::EventFanout;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn inbox_capacity_is_positive() {
        assert!(INBOX_CAPACITY > 0);
    }

    #[test]
    fn candle_interval_floor_divides_timestamp_into_buckets() {
        let instrument = Instrument::new("binance", "BTCUSDT", AssetType::Crypto, "USDT", 1, 60);
        let interval = instrument.candle_interval_seconds as i64;
        assert_eq!((125 / interval) * interval, 120);
    }

    struct NoopCandleRepo;

    #[async_trait]
    impl CandleRepository for NoopCandleRepo {
        async fn save(&self, _instrument_key: &str, _candle: &Candle) -> anyhow::Result<()> {
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

    struct DummyAdapter;

    #[async_trait]
    impl ExchangeAdapter for DummyAdapter {
        async fn init(&self, _primary: bool) -> anyhow::Result<()> {
            Ok(())
        }
        async fn products(&self) -> anyhow::Result<Vec<ProductInfo>> {
            Ok(Vec::new())
        }
        async fn accounts(&self) -> anyhow::Result<HashMap<String, BalanceInfo>> {
            Ok(HashMap::new())
        }
        async fn market_init(&self, _instrument: &Instrument) -> anyhow::Result<tokio::sync::mpsc::Receiver<MarketMessage>> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }
        async fn get_historic_rates(&self, _instrument: &Instrument, _start: Option<i64>, _end: Option<i64>) -> anyhow::Result<Vec<Candle>> {
            Ok(Vec::new())
        }
        async fn buy(&self, _request: TradeRequest) -> anyhow::Result<Option<Order>> {
            unimplemented!("not exercised by these tests")
        }
        async fn sell(&self, _request: TradeRequest) -> anyhow::Result<Option<Order>> {
            unimplemented!("not exercised by these tests")
        }
        async fn get_order(&self, _instrument: &Instrument, _id: &str) -> anyhow::Result<Option<Order>> {
            Ok(None)
        }
        async fn cancel_order(&self, _instrument: &Instrument, _id: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn cancel_all(&self, _instrument: &Instrument) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn test_worker() -> MarketWorker {
        let metrics = Arc::new(Metrics::new().unwrap());
        let candle_store = Arc::new(CandleStore::new(Arc::new(NoopCandleRepo), metrics.clone()));
        let indicator_engine = Arc::new(Mutex::new(IndicatorEngine::new(metrics.clone())));
        let strategy: Box<dyn TradingStrategy> = Box::new(DualSmaStrategy::new(5, 20, 0.0));
        let fanout = Arc::new(EventFanout::new(Vec::new()));
        let publisher = Arc::new(EventPublisher::new(fanout));

        let mirror_pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE risk_state_mirror (id INTEGER PRIMARY KEY, trading_date TEXT, \
             daily_pnl_realized TEXT, blocked BOOLEAN, block_reason TEXT, updated_at INTEGER)",
        )
        .execute(&mirror_pool)
        .await
        .unwrap();
        let store_path = std::env::temp_dir()
            .join(format!("market_engine_test_{}_{}", std::process::id(), rand_suffix()));
        let store = RiskStateStore::new(store_path.join("risk_state.json"), mirror_pool);
        let limits = RiskLimits {
            max_daily_loss_abs: Decimal::ZERO,
            max_daily_loss_pct: Decimal::ZERO,
            max_position_size_lots: 0,
            max_open_positions: 10,
            starting_capital: dec!(10000),
        };
        let risk_gate = crate::application::risk_gate::spawn(
            RiskState::new(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), limits),
            store,
        );

        MarketWorker {
            instrument: Instrument::new("binance", "BTCUSDT", AssetType::Crypto, "USDT", 1, 60),
            adapter: Arc::new(DummyAdapter),
            candle_store,
            indicator_engine,
            strategy: Arc::new(Mutex::new(strategy)),
            risk_gate,
            publisher,
            metrics,
            trade_lots: 1,
            open_orders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().subsec_nanos() as u64
    }

    #[tokio::test]
    async fn apply_order_fill_accumulates_position_across_calls() {
        let worker = test_worker().await;
        let key = worker.instrument.market_key();

        let mut buy_one = Order::new("o1", &key, OrderSide::Buy, OrderType::Market, dec!(2), dec!(100), 0);
        buy_one.transition(OrderStatus::Filled, Some(dec!(2)), Some(dec!(100)), None, 0).unwrap();
        worker.apply_order_fill(&key, &buy_one, 2, 0).await;

        let mut buy_two = Order::new("o2", &key, OrderSide::Buy, OrderType::Market, dec!(1), dec!(130), 1);
        buy_two.transition(OrderStatus::Filled, Some(dec!(1)), Some(dec!(130)), None, 1).unwrap();
        worker.apply_order_fill(&key, &buy_two, 1, 1).await;

        let position = worker.risk_gate.position(&key).await.unwrap();
        assert_eq!(position.lots, 3);
        assert_eq!(position.avg_entry_price, dec!(110));

        let mut sell = Order::new("o3", &key, OrderSide::Sell, OrderType::Market, dec!(3), dec!(140), 2);
        sell.transition(OrderStatus::Filled, Some(dec!(3)), Some(dec!(140)), None, 2).unwrap();
        worker.apply_order_fill(&key, &sell, 3, 2).await;

        assert!(worker.risk_gate.position(&key).await.is_none());
        let snapshot = worker.risk_gate.snapshot().await.unwrap();
        assert_eq!(snapshot.daily_pnl_realized, dec!(90));
    }

    #[tokio::test]
    async fn execution_report_reconciles_an_order_placed_by_this_worker() {
        let worker = test_worker().await;
        let key = worker.instrument.market_key();

        let order = Order::new("remote-1", &key, OrderSide::Buy, OrderType::Limit, dec!(4), dec!(100), 0);
        worker.open_orders.lock().await.insert(order.id.clone(), order);

        worker.on_execution_report(&key, "remote-1", "filled", dec!(4), dec!(101), dec!(0)).await;

        assert!(worker.open_orders.lock().await.is_empty());
        let position = worker.risk_gate.position(&key).await.unwrap();
        assert_eq!(position.lots, 4);
        assert_eq!(position.avg_entry_price, dec!(101));
    }

    #[tokio::test]
    async fn execution_report_for_an_unknown_order_is_a_no_op() {
        let worker = test_worker().await;
        let key = worker.instrument.market_key();

        worker.on_execution_report(&key, "ghost", "filled", dec!(1), dec!(100), dec!(0)).await;

        assert!(worker.risk_gate.position(&key).await.is_none());
    }
}
