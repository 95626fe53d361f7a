//! Event Fan-out (C2): thin convenience layer over the fixed-order sink
//! pipeline (`infrastructure::sinks::EventFanout`), building the common
//! event shapes other components publish.

use crate::domain::event::{Event, EventFamily, FieldValue, trade_event_subtype};
use crate::domain::order::{Order, OrderSide};
use crate::infrastructure::sinks::EventFanout;
use std::sync::Arc;

pub struct EventPublisher {
    fanout: Arc<EventFanout>,
}

impl EventPublisher {
    pub fn new(fanout: Arc<EventFanout>) -> Self {
        Self { fanout }
    }

    pub async fn candle_closed(&self, instrument_key: &str, timestamp: i64, close: rust_decimal::Decimal, volume: rust_decimal::Decimal) {
        let event = Event::new(EventFamily::Candle, Some(instrument_key.to_string()), timestamp)
            .with_field("close", FieldValue::Number(close_as_f64(close)))
            .with_field("volume", FieldValue::Number(close_as_f64(volume)));
        self.fanout.publish(&event).await;
    }

    pub async fn order_event(&self, instrument_key: &str, timestamp: i64, subtype: &str, order: &Order) {
        let event = Event::new(EventFamily::TradeEvent, Some(instrument_key.to_string()), timestamp)
            .with_tag("subtype", subtype)
            .with_tag("side", order.side.to_string())
            .with_field("filled_size", FieldValue::Number(close_as_f64(order.filled_size)))
            .with_field("price", FieldValue::Number(close_as_f64(order.price)));
        self.fanout.publish(&event).await;
    }

    pub async fn strategy_signal(&self, instrument_key: &str, timestamp: i64, strategy: &str, side: OrderSide, strength: i8) {
        let event = Event::new(EventFamily::StrategySignal, Some(instrument_key.to_string()), timestamp)
            .with_tag("strategy", strategy)
            .with_tag("signal_type", side.to_string())
            .with_field("strength", FieldValue::Number(strength as f64));
        self.fanout.publish(&event).await;
    }

    pub async fn risk_event(&self, timestamp: i64, reason: &str) {
        let event = Event::new(EventFamily::TradeEvent, None, timestamp)
            .with_tag("subtype", trade_event_subtype::RISK_EVENT)
            .with_field("reason", FieldValue::Text(reason.to_string()));
        self.fanout.publish(&event).await;
    }

    pub async fn indicator(&self, instrument_key: &str, timestamp: i64, name: &str, value: f64) {
        let event = Event::new(EventFamily::Indicator, Some(instrument_key.to_string()), timestamp)
            .with_tag("indicator", name)
            .with_field(name, FieldValue::Number(value));
        self.fanout.publish(&event).await;
    }
}

fn close_as_f64(d: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}
