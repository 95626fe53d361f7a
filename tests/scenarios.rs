//! End-to-end scenarios exercising more than one component together,
//! complementing the per-module unit tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use rustrade::application::candle_store::CandleStore;
use rustrade::application::strategy_host::dual_sma::DualSmaStrategy;
use rustrade::application::strategy_host::TradingStrategy;
use rustrade::domain::candle::Candle;
use rustrade::domain::order::{Order, OrderSide, OrderStatus, OrderType};
use rustrade::domain::position::{apply_fill, Fill, Position};
use rustrade::domain::repositories::CandleRepository;
use rustrade::domain::risk::state::{RiskLimits, RiskState, TradeRecord};
use rustrade::infrastructure::observability::Metrics;
use rustrade::infrastructure::persistence::candle_repository::SqliteCandleRepository;
use rustrade::infrastructure::persistence::risk_state_file::RiskStateStore;
use rustrade::infrastructure::sinks::{EventFanout, EventSink};
use rustrade::domain::event::{Event, EventFamily};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn sqlite_candle_store() -> (Arc<CandleStore>, Arc<Metrics>) {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::query(
        "CREATE TABLE candle_points (instrument_key TEXT, time INTEGER, open TEXT, high TEXT, low TEXT, close TEXT, volume TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();
    let repo = Arc::new(SqliteCandleRepository::new(pool));
    let metrics = Arc::new(Metrics::new().unwrap());
    (Arc::new(CandleStore::new(repo, metrics.clone())), metrics)
}

#[tokio::test]
async fn scenario_candle_upsert_round_trips_through_hot_and_cold_tiers() {
    let (store, _metrics) = sqlite_candle_store().await;
    let key = "binance:BTCUSDT";

    for i in 0..20i64 {
        let price = dec!(100) + Decimal::from(i);
        let candle = Candle::new(i * 60, price, price + dec!(1), price - dec!(1), price, dec!(10));
        store.upsert(key, candle).await;
    }

    assert_eq!(store.len(key).await, 20);
    let recent = store.recent(key, 5).await;
    assert_eq!(recent.len(), 5);
    assert_eq!(recent.last().unwrap().time, 19 * 60);
}

#[tokio::test]
async fn scenario_risk_latch_blocks_then_clears_on_unblock() {
    let mirror_pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::query(
        "CREATE TABLE risk_state_mirror (id INTEGER PRIMARY KEY, trading_date TEXT, daily_pnl_realized TEXT, blocked BOOLEAN, block_reason TEXT, updated_at INTEGER)",
    )
    .execute(&mirror_pool)
    .await
    .unwrap();
    let store_path = std::env::temp_dir().join(format!("scenario_risk_state_{}.json", std::process::id()));
    let store = RiskStateStore::new(store_path, mirror_pool);

    let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let limits = RiskLimits {
        max_daily_loss_abs: dec!(100),
        max_daily_loss_pct: Decimal::ZERO,
        max_position_size_lots: 0,
        max_open_positions: 10,
        starting_capital: dec!(10000),
    };
    let handle = rustrade::application::risk_gate::spawn(RiskState::new(today, limits), store);

    handle
        .record_trade(
            TradeRecord {
                instrument: "X".into(),
                side: OrderSide::Sell,
                lots: 1,
                price: dec!(200),
                realized_pnl: dec!(-150),
                trade_id: None,
                timestamp: 1,
            },
            Position::flat("X"),
        )
        .await;

    let admit = handle.admit("Y", OrderSide::Buy, 1, dec!(50)).await;
    assert!(admit.is_err());

    handle.force_unblock().await;
    let admit_after = handle.admit("Y", OrderSide::Buy, 1, dec!(50)).await;
    assert!(admit_after.is_ok());
}

#[test]
fn scenario_position_round_trip_matches_order_fills() {
    let mut order = Order::new("o1", "binance:BTCUSDT", OrderSide::Buy, OrderType::Market, dec!(5), dec!(100), 0);
    order.transition(OrderStatus::Filled, Some(dec!(5)), Some(dec!(100)), None, 1).unwrap();

    let position = Position::flat("binance:BTCUSDT");
    let fill = Fill { side: order.side, lots: 5, price: order.price, timestamp: order.update_time };
    let (position, realized) = apply_fill(position, &fill);

    assert_eq!(position.lots, 5);
    assert_eq!(realized, Decimal::ZERO);

    let mut closing = Order::new("o2", "binance:BTCUSDT", OrderSide::Sell, OrderType::Market, dec!(5), dec!(140), 2);
    closing.transition(OrderStatus::Filled, Some(dec!(5)), Some(dec!(140)), None, 3).unwrap();
    let closing_fill = Fill { side: closing.side, lots: 5, price: closing.price, timestamp: closing.update_time };
    let (closed, realized) = apply_fill(position, &closing_fill);

    assert_eq!(closed.lots, 0);
    assert_eq!(realized, dec!(200));
}

#[tokio::test]
async fn scenario_feed_to_signal_pipeline_gates_on_warmup_over_fifty_candles() {
    let (store, _metrics) = sqlite_candle_store().await;
    let key = "binance:ETHUSDT";
    let mut strategy = DualSmaStrategy::new(5, 20, 0.0);

    let mut invocations = 0usize;
    for i in 0..50i64 {
        let price = dec!(1000) + Decimal::from(i * 3);
        let candle = Candle::new(i * 60, price, price + dec!(1), price - dec!(1), price, dec!(2));
        store.upsert(key, candle).await;

        let history = store.recent(key, 512).await;
        if history.len() < strategy.warmup() {
            continue;
        }
        invocations += 1;
        let _ = strategy.generate_signal(&history);
    }

    // Warmup is 20 (slow_period); candles 20..50 inclusive of the warmup
    // boundary invoke the strategy, i.e. 50 - 20 + 1 times.
    assert_eq!(invocations, 31);
}

struct FlakySink {
    fail_after: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl EventSink for FlakySink {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn publish(&self, _event: &Event) -> anyhow::Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_after {
            anyhow::bail!("sink degraded");
        }
        Ok(())
    }
}

struct CountingSink {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSink for CountingSink {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn publish(&self, _event: &Event) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn scenario_sink_degradation_never_suppresses_healthy_sinks_over_a_hundred_events() {
    let counting_calls = Arc::new(AtomicUsize::new(0));
    let fanout = EventFanout::new(vec![
        Box::new(FlakySink { fail_after: 40, calls: AtomicUsize::new(0) }),
        Box::new(CountingSink { calls: counting_calls.clone() }),
    ]);

    for i in 0..100i64 {
        let event = Event::new(EventFamily::Candle, Some("binance:BTCUSDT".into()), i);
        fanout.publish(&event).await;
    }

    assert_eq!(counting_calls.load(Ordering::SeqCst), 100);
}
