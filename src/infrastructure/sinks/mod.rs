//! Event Fan-out (C2): a fixed-order, best-effort broadcast of every
//! published `Event` to each configured sink. A failing sink never blocks or
//! drops the event for the others — it increments its own error counter and
//! the fan-out moves on.

pub mod audit_sink;
pub mod message_bus_sink;
pub mod metrics_sink;
pub mod timeseries_sink;

pub use audit_sink::AuditSink;
pub use message_bus_sink::MessageBusSink;
pub use metrics_sink::MetricsSink;
pub use timeseries_sink::TimeSeriesSink;

use crate::domain::event::Event;
use async_trait::async_trait;

#[async_trait]
pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn publish(&self, event: &Event) -> anyhow::Result<()>;
}

/// Fans every event out to its sinks in a fixed order: time-series, then
/// message-bus, then audit, then metrics. The order matters only for the
/// degradation story: a time-series outage must not suppress the audit
/// trail or the metrics counters that make the outage observable.
pub struct EventFanout {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventFanout {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub async fn publish(&self, event: &Event) {
        for sink in &self.sinks {
            if let Err(err) = sink.publish(event).await {
                tracing::warn!(sink = sink.name(), error = %err, "event sink publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventFamily;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingSink {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn publish(&self, _event: &Event) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("sink offline")
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
    async fn a_failing_sink_does_not_block_the_others() {
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let counting_calls = Arc::new(AtomicUsize::new(0));
        let fanout = EventFanout::new(vec![
            Box::new(FailingSink { calls: failing_calls.clone() }),
            Box::new(CountingSink { calls: counting_calls.clone() }),
        ]);

        for _ in 0..100 {
            let event = Event::new(EventFamily::Candle, Some("binance:BTCUSDT".into()), 1);
            fanout.publish(&event).await;
        }

        assert_eq!(failing_calls.load(Ordering::SeqCst), 100);
        assert_eq!(counting_calls.load(Ordering::SeqCst), 100);
    }
}
