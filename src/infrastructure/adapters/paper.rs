//! Paper-trading adapter: fills every request instantly at the last known
//! price with a configurable commission, so the rest of the system can run
//! end-to-end without a live venue.

use crate::domain::candle::Candle;
use crate::domain::instrument::{Instrument, ProductInfo};
use crate::domain::order::{Order, OrderSide, OrderStatus, OrderType};
use crate::domain::ports::{BalanceInfo, ExchangeAdapter, MarketMessage, TradeRequest};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub struct PaperAdapter {
    commission_bps: Decimal,
    next_order_id: AtomicI64,
    last_price: Mutex<HashMap<String, Decimal>>,
    starting_balance: Decimal,
}

impl PaperAdapter {
    pub fn new(commission_bps: Decimal, starting_balance: Decimal) -> Self {
        Self {
            commission_bps,
            next_order_id: AtomicI64::new(1),
            last_price: Mutex::new(HashMap::new()),
            starting_balance,
        }
    }

    fn mark(&self, instrument: &Instrument) -> Decimal {
        self.last_price
            .lock()
            .unwrap()
            .get(&instrument.market_key())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl ExchangeAdapter for PaperAdapter {
    async fn init(&self, _primary: bool) -> Result<()> {
        Ok(())
    }

    async fn products(&self) -> Result<Vec<ProductInfo>> {
        Ok(Vec::new())
    }

    async fn accounts(&self) -> Result<HashMap<String, BalanceInfo>> {
        let mut out = HashMap::new();
        out.insert(
            "USD".to_string(),
            BalanceInfo { free: self.starting_balance, locked: Decimal::ZERO },
        );
        Ok(out)
    }

    async fn market_init(&self, _instrument: &Instrument) -> Result<mpsc::Receiver<MarketMessage>> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn get_historic_rates(
        &self,
        _instrument: &Instrument,
        _start: Option<i64>,
        _end: Option<i64>,
    ) -> Result<Vec<Candle>> {
        Ok(Vec::new())
    }

    async fn buy(&self, request: TradeRequest) -> Result<Option<Order>> {
        self.fill(request, OrderSide::Buy)
    }

    async fn sell(&self, request: TradeRequest) -> Result<Option<Order>> {
        self.fill(request, OrderSide::Sell)
    }

    async fn get_order(&self, _instrument: &Instrument, _id: &str) -> Result<Option<Order>> {
        Ok(None)
    }

    async fn cancel_order(&self, _instrument: &Instrument, _id: &str) -> Result<bool> {
        Ok(true)
    }

    async fn cancel_all(&self, _instrument: &Instrument) -> Result<bool> {
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl PaperAdapter {
    fn fill(&self, request: TradeRequest, side: OrderSide) -> Result<Option<Order>> {
        let price = request.limit_price.unwrap_or_else(|| self.mark(&request.instrument));
        let id = self.next_order_id.fetch_add(1, Ordering::SeqCst).to_string();
        let now = chrono::Utc::now().timestamp();
        let lots = Decimal::from(request.lots);

        let mut order = Order::new(id, request.instrument.market_key(), side, request.order_type, lots, price, now);
        let fees = lots * price * self.commission_bps / Decimal::from(10_000);
        order.transition(OrderStatus::Filled, Some(lots), Some(price), Some(fees), now)?;
        Ok(Some(order))
    }
}
