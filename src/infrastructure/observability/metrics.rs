//! Prometheus metrics catalog.
//!
//! All metrics carry the `rustrade_` prefix and are read-only outside this
//! module; the admin HTTP surface exposes `render()` verbatim at `/metrics`.

use prometheus::{
    CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge, GenericGaugeVec},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // -- orders / execution --
    pub orders_total: CounterVec,
    pub orders_filled_total: CounterVec,
    pub orders_rejected_total: CounterVec,

    // -- adapter connectivity --
    pub api_requests_total: CounterVec,
    pub api_errors_total: CounterVec,
    pub api_latency_seconds: HistogramVec,
    pub websocket_reconnects_total: CounterVec,
    pub circuit_breaker_status: GenericGaugeVec<AtomicF64>,

    // -- event fan-out sinks --
    pub message_bus_messages_sent_total: CounterVec,
    pub message_bus_errors_total: CounterVec,
    pub influxdb_writes_total: CounterVec,
    pub influxdb_errors_total: CounterVec,

    // -- market data / indicators --
    pub candles_processed_total: CounterVec,
    pub candles_store_errors_total: CounterVec,
    pub indicators_calculated_total: CounterVec,
    pub trade_signals_total: CounterVec,

    // -- portfolio / risk gauges --
    pub positions_open: GenericGauge<AtomicF64>,
    pub account_balance: GenericGaugeVec<AtomicF64>,
    pub unrealized_pnl: GenericGauge<AtomicF64>,
    pub realized_pnl: GenericGauge<AtomicF64>,
    pub win_rate: GenericGauge<AtomicF64>,
    pub sharpe_ratio: GenericGauge<AtomicF64>,
    pub max_drawdown: GenericGauge<AtomicF64>,
    pub market_price: GenericGaugeVec<AtomicF64>,
    pub market_volume: GenericGaugeVec<AtomicF64>,
    pub uptime_seconds: GenericGauge<AtomicF64>,

    // -- histograms --
    pub trade_pnl: HistogramVec,
    pub trade_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        macro_rules! counter_vec {
            ($name:literal, $help:literal, $labels:expr) => {{
                let m = CounterVec::new(Opts::new($name, $help), $labels)?;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }
        macro_rules! gauge {
            ($name:literal, $help:literal) => {{
                let m = GenericGauge::<AtomicF64>::new($name, $help)?;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }
        macro_rules! gauge_vec {
            ($name:literal, $help:literal, $labels:expr) => {{
                let m = GaugeVec::new(Opts::new($name, $help), $labels)?;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }

        let orders_total = counter_vec!(
            "rustrade_orders_total",
            "Total orders submitted",
            &["venue", "product", "side", "order_type", "status"]
        );
        let orders_filled_total = counter_vec!(
            "rustrade_orders_filled_total",
            "Total orders reaching filled status",
            &["venue", "product", "side"]
        );
        let orders_rejected_total = counter_vec!(
            "rustrade_orders_rejected_total",
            "Total orders rejected by the venue or risk gate",
            &["venue", "product", "reason"]
        );

        let api_requests_total = counter_vec!(
            "rustrade_api_requests_total",
            "Total adapter API requests",
            &["venue", "endpoint"]
        );
        let api_errors_total = counter_vec!(
            "rustrade_api_errors_total",
            "Total adapter API errors",
            &["venue", "endpoint"]
        );
        let api_latency_seconds = {
            let m = HistogramVec::new(
                HistogramOpts::new("rustrade_api_request_duration_seconds", "Adapter API request latency")
                    .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
                &["venue", "endpoint"],
            )?;
            registry.register(Box::new(m.clone()))?;
            m
        };
        let websocket_reconnects_total = counter_vec!(
            "rustrade_websocket_reconnects_total",
            "Total WebSocket reconnection attempts",
            &["venue"]
        );
        let circuit_breaker_status = gauge_vec!(
            "rustrade_circuit_breaker_status",
            "Circuit breaker status (0=closed, 1=open, 2=half-open)",
            &["venue"]
        );

        let message_bus_messages_sent_total = counter_vec!(
            "rustrade_kafka_messages_sent_total",
            "Total messages published to the message bus",
            &["topic"]
        );
        let message_bus_errors_total = counter_vec!(
            "rustrade_kafka_errors_total",
            "Total message bus publish errors",
            &["topic"]
        );
        let influxdb_writes_total = counter_vec!(
            "rustrade_influxdb_writes_total",
            "Total time-series writes",
            &["instrument"]
        );
        let influxdb_errors_total = counter_vec!(
            "rustrade_influxdb_errors_total",
            "Total time-series write errors",
            &["instrument"]
        );

        let candles_processed_total = counter_vec!(
            "rustrade_candles_processed_total",
            "Total candles processed by the market engine",
            &["instrument"]
        );
        let candles_store_errors_total = counter_vec!(
            "rustrade_candles_store_errors_total",
            "Total candle store write errors",
            &["instrument"]
        );
        let indicators_calculated_total = counter_vec!(
            "rustrade_indicators_calculated_total",
            "Total indicator calculations performed",
            &["instrument", "indicator"]
        );
        let trade_signals_total = counter_vec!(
            "rustrade_trade_signals_total",
            "Total strategy signals generated",
            &["strategy", "signal_type"]
        );

        let positions_open = gauge!("rustrade_positions_open", "Number of open positions");
        let account_balance = gauge_vec!(
            "rustrade_account_balance",
            "Account balance by asset",
            &["venue", "asset"]
        );
        let unrealized_pnl = gauge!("rustrade_unrealized_pnl", "Aggregate unrealized P&L");
        let realized_pnl = gauge!("rustrade_realized_pnl", "Aggregate realized P&L for the trading day");
        let win_rate = gauge!("rustrade_win_rate", "Rolling win rate (0-1)");
        let sharpe_ratio = gauge!("rustrade_sharpe_ratio", "Rolling Sharpe ratio");
        let max_drawdown = gauge!("rustrade_max_drawdown", "Maximum observed drawdown (0-1)");
        let market_price = gauge_vec!("rustrade_market_price", "Last observed market price", &["instrument"]);
        let market_volume = gauge_vec!(
            "rustrade_market_volume",
            "Last observed candle volume",
            &["instrument"]
        );
        let uptime_seconds = gauge!("rustrade_uptime_seconds", "Server uptime in seconds");

        let trade_pnl = {
            let m = HistogramVec::new(
                HistogramOpts::new("rustrade_trade_pnl", "Realized P&L per closed trade")
                    .buckets(vec![-1000.0, -500.0, -100.0, -10.0, 0.0, 10.0, 100.0, 500.0, 1000.0]),
                &["instrument"],
            )?;
            registry.register(Box::new(m.clone()))?;
            m
        };
        let trade_duration_seconds = {
            let m = HistogramVec::new(
                HistogramOpts::new("rustrade_trade_duration_seconds", "Holding period per closed trade")
                    .buckets(vec![1.0, 10.0, 60.0, 300.0, 3600.0, 86400.0]),
                &["instrument"],
            )?;
            registry.register(Box::new(m.clone()))?;
            m
        };

        Ok(Self {
            registry: Arc::new(registry),
            orders_total,
            orders_filled_total,
            orders_rejected_total,
            api_requests_total,
            api_errors_total,
            api_latency_seconds,
            websocket_reconnects_total,
            circuit_breaker_status,
            message_bus_messages_sent_total,
            message_bus_errors_total,
            influxdb_writes_total,
            influxdb_errors_total,
            candles_processed_total,
            candles_store_errors_total,
            indicators_calculated_total,
            trade_signals_total,
            positions_open,
            account_balance,
            unrealized_pnl,
            realized_pnl,
            win_rate,
            sharpe_ratio,
            max_drawdown,
            market_price,
            market_volume,
            uptime_seconds,
            trade_pnl,
            trade_duration_seconds,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families).unwrap_or_default()
    }

    pub fn inc_orders(&self, venue: &str, product: &str, side: &str, order_type: &str, status: &str) {
        self.orders_total
            .with_label_values(&[venue, product, side, order_type, status])
            .inc();
    }

    pub fn inc_order_filled(&self, venue: &str, product: &str, side: &str) {
        self.orders_filled_total.with_label_values(&[venue, product, side]).inc();
    }

    pub fn inc_order_rejected(&self, venue: &str, product: &str, reason: &str) {
        self.orders_rejected_total.with_label_values(&[venue, product, reason]).inc();
    }

    pub fn observe_api_call(&self, venue: &str, endpoint: &str, latency_secs: f64, is_error: bool) {
        self.api_requests_total.with_label_values(&[venue, endpoint]).inc();
        self.api_latency_seconds.with_label_values(&[venue, endpoint]).observe(latency_secs);
        if is_error {
            self.api_errors_total.with_label_values(&[venue, endpoint]).inc();
        }
    }

    pub fn inc_reconnects(&self, venue: &str) {
        self.websocket_reconnects_total.with_label_values(&[venue]).inc();
    }

    pub fn set_circuit_breaker_status(&self, venue: &str, value: f64) {
        self.circuit_breaker_status.with_label_values(&[venue]).set(value);
    }

    pub fn inc_message_bus_sent(&self, topic: &str) {
        self.message_bus_messages_sent_total.with_label_values(&[topic]).inc();
    }

    pub fn inc_message_bus_error(&self, topic: &str) {
        self.message_bus_errors_total.with_label_values(&[topic]).inc();
    }

    pub fn inc_timeseries_write(&self, instrument: &str) {
        self.influxdb_writes_total.with_label_values(&[instrument]).inc();
    }

    pub fn inc_timeseries_error(&self, instrument: &str) {
        self.influxdb_errors_total.with_label_values(&[instrument]).inc();
    }

    pub fn inc_candles_processed(&self, instrument: &str) {
        self.candles_processed_total.with_label_values(&[instrument]).inc();
    }

    pub fn inc_candle_store_error(&self, instrument: &str) {
        self.candles_store_errors_total.with_label_values(&[instrument]).inc();
    }

    pub fn inc_indicators_calculated(&self, instrument: &str, indicator: &str) {
        self.indicators_calculated_total.with_label_values(&[instrument, indicator]).inc();
    }

    pub fn inc_signals(&self, strategy: &str, signal_type: &str) {
        self.trade_signals_total.with_label_values(&[strategy, signal_type]).inc();
    }

    pub fn set_market_price(&self, instrument: &str, price: f64, volume: f64) {
        self.market_price.with_label_values(&[instrument]).set(price);
        self.market_volume.with_label_values(&[instrument]).set(volume);
    }

    pub fn observe_trade(&self, instrument: &str, pnl: f64, duration_secs: f64) {
        self.trade_pnl.with_label_values(&[instrument]).observe(pnl);
        self.trade_duration_seconds.with_label_values(&[instrument]).observe(duration_secs);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default Metrics")
    }
}
