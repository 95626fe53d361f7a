//! Command envelope for the Risk Gate actor: the serialized, single-threaded
//! interface generalized from the teacher's `RiskCommand`/`handle_command`
//! shape.

use crate::domain::errors::RiskViolation;
use crate::domain::order::OrderSide;
use crate::domain::position::Position;
use crate::domain::risk::state::TradeRecord;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct RiskSnapshot {
    pub trading_date: NaiveDate,
    pub daily_pnl_realized: Decimal,
    pub daily_pnl_total: Decimal,
    pub open_position_count: usize,
    pub max_open_positions: usize,
    pub daily_trade_count: usize,
    pub blocked: bool,
    pub block_reason: Option<String>,
}

pub enum RiskCommand {
    Admit {
        today: NaiveDate,
        instrument: String,
        side: OrderSide,
        lots: i64,
        price: Decimal,
        reply: oneshot::Sender<Result<(), RiskViolation>>,
    },
    RecordTrade {
        record: TradeRecord,
        resulting_position: Position,
        reply: oneshot::Sender<()>,
    },
    UpdateMark {
        instrument: String,
        current_price: Decimal,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<RiskSnapshot>,
    },
    GetPosition {
        instrument: String,
        reply: oneshot::Sender<Option<Position>>,
    },
    ForceUnblock {
        reply: oneshot::Sender<()>,
    },
    ForceCloseAll {
        reply: oneshot::Sender<Vec<String>>,
    },
}
