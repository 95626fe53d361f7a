//! Immutable event records published through the Event Fan-out (C2).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFamily {
    Candle,
    Indicator,
    TradeEvent,
    StrategySignal,
    SystemEvent,
}

impl EventFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            EventFamily::Candle => "candle",
            EventFamily::Indicator => "indicator",
            EventFamily::TradeEvent => "trade_event",
            EventFamily::StrategySignal => "strategy_signal",
            EventFamily::SystemEvent => "system_event",
        }
    }
}

/// `trade_event` subtypes, carried in the event's `tags["subtype"]`.
pub mod trade_event_subtype {
    pub const ORDER_PLACED: &str = "order_placed";
    pub const ORDER_FILLED: &str = "order_filled";
    pub const ORDER_CANCELED: &str = "order_canceled";
    pub const POSITION_OPENED: &str = "position_opened";
    pub const POSITION_CLOSED: &str = "position_closed";
    pub const RISK_EVENT: &str = "risk_event";
    pub const PERFORMANCE_SNAPSHOT: &str = "performance_snapshot";
}

/// Fixed wire topics, matching the original Kafka producer's topic names.
pub mod topic {
    pub const ORDERS_SUBMITTED: &str = "wolfinch.orders.submitted";
    pub const ORDERS_EXECUTED: &str = "wolfinch.orders.executed";
    pub const ORDERS_REJECTED: &str = "wolfinch.orders.rejected";
    pub const ORDERS_MODIFIED: &str = "wolfinch.orders.modified";
    pub const TRADES_COMPLETED: &str = "wolfinch.trades.completed";
    pub const POSITIONS_UPDATED: &str = "wolfinch.positions.updated";
    pub const RISKS_BREACHED: &str = "wolfinch.risks.breached";
    pub const SYSTEM_ALERTS: &str = "wolfinch.system.alerts";
    pub const MARKET_DATA: &str = "wolfinch.market.data";
    pub const MARKET_UPDATED: &str = "wolfinch.market.updated";
    pub const ACCOUNT_UPDATED: &str = "wolfinch.account.updated";
    pub const INDICATORS_CALCULATED: &str = "wolfinch.indicators.calculated";
    pub const STRATEGY_SIGNALS: &str = "wolfinch.strategy.signals";
    pub const PERFORMANCE_SNAPSHOTS: &str = "wolfinch.performance.snapshots";
    pub const ERRORS: &str = "wolfinch.errors";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventFamily,
    pub instrument: Option<String>,
    pub timestamp: i64,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, FieldValue>,
}

impl Event {
    pub fn new(event_type: EventFamily, instrument: Option<String>, timestamp: i64) -> Self {
        Self {
            event_type,
            instrument,
            timestamp,
            tags: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Topic this event should be published to, derived from its family and
    /// (for trade events) its subtype tag.
    pub fn topic(&self) -> &'static str {
        match self.event_type {
            EventFamily::Candle => topic::MARKET_UPDATED,
            EventFamily::Indicator => topic::INDICATORS_CALCULATED,
            EventFamily::StrategySignal => topic::STRATEGY_SIGNALS,
            EventFamily::SystemEvent => topic::SYSTEM_ALERTS,
            EventFamily::TradeEvent => match self.tags.get("subtype").map(String::as_str) {
                Some(trade_event_subtype::ORDER_PLACED) => topic::ORDERS_SUBMITTED,
                Some(trade_event_subtype::ORDER_FILLED) => topic::ORDERS_EXECUTED,
                Some(trade_event_subtype::ORDER_CANCELED) => topic::ORDERS_REJECTED,
                Some(trade_event_subtype::POSITION_OPENED)
                | Some(trade_event_subtype::POSITION_CLOSED) => topic::POSITIONS_UPDATED,
                Some(trade_event_subtype::RISK_EVENT) => topic::RISKS_BREACHED,
                Some(trade_event_subtype::PERFORMANCE_SNAPSHOT) => topic::PERFORMANCE_SNAPSHOTS,
                _ => topic::SYSTEM_ALERTS,
            },
        }
    }
}
