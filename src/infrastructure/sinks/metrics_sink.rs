//! Prometheus sink: every published event updates the counters that make
//! the system's behavior observable, independent of whether the other
//! sinks are healthy. This sink never fails.

use super::EventSink;
use crate::domain::event::{Event, EventFamily, trade_event_subtype};
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use std::sync::Arc;

pub struct MetricsSink {
    metrics: Arc<Metrics>,
}

impl MetricsSink {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl EventSink for MetricsSink {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn publish(&self, event: &Event) -> anyhow::Result<()> {
        let instrument = event.instrument.as_deref().unwrap_or("_global");

        match event.event_type {
            EventFamily::Candle => self.metrics.inc_candles_processed(instrument),
            EventFamily::Indicator => {
                let indicator = event.tags.get("indicator").map(String::as_str).unwrap_or("unknown");
                self.metrics.inc_indicators_calculated(instrument, indicator);
            }
            EventFamily::StrategySignal => {
                let strategy = event.tags.get("strategy").map(String::as_str).unwrap_or("unknown");
                let signal_type = event.tags.get("signal_type").map(String::as_str).unwrap_or("unknown");
                self.metrics.inc_signals(strategy, signal_type);
            }
            EventFamily::TradeEvent => {
                if event.tags.get("subtype").map(String::as_str) == Some(trade_event_subtype::ORDER_FILLED) {
                    let side = event.tags.get("side").map(String::as_str).unwrap_or("unknown");
                    self.metrics.inc_order_filled(instrument, instrument, side);
                }
            }
            EventFamily::SystemEvent => {}
        }

        Ok(())
    }
}
