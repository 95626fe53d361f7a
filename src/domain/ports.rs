//! Exchange Adapter contract (C6): the uniform interface every brokerage
//! connector must satisfy, generalizing the teacher's former
//! `MarketDataService`/`ExecutionService` split into one trait object per
//! adapter.

use crate::domain::candle::Candle;
use crate::domain::instrument::{Instrument, ProductInfo};
use crate::domain::order::{Order, OrderSide, OrderType};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct BalanceInfo {
    pub free: Decimal,
    pub locked: Decimal,
}

/// The three feed message families the adapter enqueues into the Market
/// Engine's per-instrument queue. Anything else is ignored at the boundary.
#[derive(Debug, Clone)]
pub enum MarketMessage {
    Trade {
        price: Decimal,
        quantity: Decimal,
        timestamp: i64,
    },
    Kline {
        candle: Candle,
        closed: bool,
    },
    ExecutionReport {
        order_id: String,
        native_status: String,
        fill_delta: Decimal,
        price: Decimal,
        fees: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub instrument: Instrument,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub lots: i64,
    pub limit_price: Option<Decimal>,
}

/// The contract any broker connector must satisfy (spec §4.6).
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Load credentials, enumerate products, subscribe to feeds.
    /// `primary` marks this adapter as the one whose balances seed the
    /// market's initial fund/asset state.
    async fn init(&self, primary: bool) -> Result<()>;

    async fn products(&self) -> Result<Vec<ProductInfo>>;

    async fn accounts(&self) -> Result<HashMap<String, BalanceInfo>>;

    /// Wire initial fund/asset balances into the per-market state and
    /// register the feed callback, returning the receiving end of the
    /// instrument's message queue.
    async fn market_init(&self, instrument: &Instrument) -> Result<mpsc::Receiver<MarketMessage>>;

    /// Paginated historical backfill, adjusted for the adapter's
    /// server-time offset and chunked to respect rate limits.
    async fn get_historic_rates(
        &self,
        instrument: &Instrument,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>>;

    async fn buy(&self, request: TradeRequest) -> Result<Option<Order>>;
    async fn sell(&self, request: TradeRequest) -> Result<Option<Order>>;
    async fn get_order(&self, instrument: &Instrument, id: &str) -> Result<Option<Order>>;
    async fn cancel_order(&self, instrument: &Instrument, id: &str) -> Result<bool>;
    async fn cancel_all(&self, instrument: &Instrument) -> Result<bool>;

    /// Not every venue supports in-place modification; the default is
    /// "unsupported" rather than a silent no-op.
    async fn modify_order(
        &self,
        _id: &str,
        _new_price: Option<Decimal>,
        _new_qty: Option<Decimal>,
    ) -> Result<()> {
        anyhow::bail!("modify_order is not supported by this adapter")
    }

    async fn close(&self) -> Result<()>;
}
