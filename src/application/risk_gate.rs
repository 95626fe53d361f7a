//! Risk Gate (C3): a single-threaded actor owning the process-wide
//! `RiskState`, serialized behind an mpsc command queue so `admit()` and
//! every state mutation that follows a trade happen in one consistent
//! order — no lock, no torn reads.

use crate::domain::risk::commands::{RiskCommand, RiskSnapshot};
use crate::domain::risk::state::RiskState;
use crate::infrastructure::persistence::risk_state_file::RiskStateStore;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{mpsc, oneshot};

const COMMAND_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct RiskGateHandle {
    tx: mpsc::Sender<RiskCommand>,
}

impl RiskGateHandle {
    pub async fn admit(
        &self,
        instrument: &str,
        side: crate::domain::order::OrderSide,
        lots: i64,
        price: rust_decimal::Decimal,
    ) -> Result<(), crate::domain::errors::RiskViolation> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(RiskCommand::Admit {
                today: Utc::now().date_naive(),
                instrument: instrument.to_string(),
                side,
                lots,
                price,
                reply,
            })
            .await;
        rx.await.unwrap_or(Err(crate::domain::errors::RiskViolation::Blocked {
            reason: "risk gate unavailable".into(),
        }))
    }

    pub async fn record_trade(
        &self,
        record: crate::domain::risk::state::TradeRecord,
        resulting_position: crate::domain::position::Position,
    ) {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(RiskCommand::RecordTrade { record, resulting_position, reply }).await;
        let _ = rx.await;
    }

    pub async fn update_mark(&self, instrument: &str, current_price: rust_decimal::Decimal) {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(RiskCommand::UpdateMark { instrument: instrument.to_string(), current_price, reply })
            .await;
        let _ = rx.await;
    }

    pub async fn snapshot(&self) -> Option<RiskSnapshot> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(RiskCommand::Snapshot { reply }).await;
        rx.await.ok()
    }

    /// Current open position for an instrument, as tracked by the gate's
    /// `RiskState`, or `None` if the instrument has never traded (flat).
    pub async fn position(&self, instrument: &str) -> Option<crate::domain::position::Position> {
        let (reply, rx) = oneshot::channel();
        let _ = self
            .tx
            .send(RiskCommand::GetPosition { instrument: instrument.to_string(), reply })
            .await;
        rx.await.ok().flatten()
    }

    pub async fn force_unblock(&self) {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(RiskCommand::ForceUnblock { reply }).await;
        let _ = rx.await;
    }

    pub async fn force_close_all(&self) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(RiskCommand::ForceCloseAll { reply }).await;
        rx.await.unwrap_or_default()
    }
}

/// Spawns the actor task, returning a cloneable handle. The task owns the
/// only live `RiskState` for the process; every mutation is persisted
/// before its reply is sent.
pub fn spawn(initial_state: RiskState, store: RiskStateStore) -> RiskGateHandle {
    let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    tokio::spawn(run(initial_state, store, rx));
    RiskGateHandle { tx }
}

async fn run(mut state: RiskState, store: RiskStateStore, mut rx: mpsc::Receiver<RiskCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            RiskCommand::Admit { today, instrument, side, lots, price, reply } => {
                let result = state.admit(today, &instrument, side, lots, price);
                if result.is_err() {
                    persist(&store, &state).await;
                }
                let _ = reply.send(result);
            }
            RiskCommand::RecordTrade { record, resulting_position, reply } => {
                state.record_trade(record, resulting_position);
                persist(&store, &state).await;
                let _ = reply.send(());
            }
            RiskCommand::UpdateMark { instrument, current_price, reply } => {
                state.update_mark(&instrument, current_price);
                let _ = reply.send(());
            }
            RiskCommand::Snapshot { reply } => {
                let _ = reply.send(snapshot_of(&state));
            }
            RiskCommand::GetPosition { instrument, reply } => {
                let _ = reply.send(state.open_positions.get(&instrument).cloned());
            }
            RiskCommand::ForceUnblock { reply } => {
                state.force_unblock();
                persist(&store, &state).await;
                let _ = reply.send(());
            }
            RiskCommand::ForceCloseAll { reply } => {
                let instruments = state.force_close_all();
                persist(&store, &state).await;
                let _ = reply.send(instruments);
            }
        }
    }
}

async fn persist(store: &RiskStateStore, state: &RiskState) {
    if let Err(err) = store.save(state).await {
        tracing::error!(error = %err, "failed to persist risk state");
    }
}

fn snapshot_of(state: &RiskState) -> RiskSnapshot {
    RiskSnapshot {
        trading_date: state.trading_date,
        daily_pnl_realized: state.daily_pnl_realized,
        daily_pnl_total: state.daily_pnl_total(),
        open_position_count: state.open_positions.len(),
        max_open_positions: state.limits.max_open_positions,
        daily_trade_count: state.daily_trades.len(),
        blocked: state.blocked,
        block_reason: state.block_reason.clone(),
    }
}

pub fn daily_pnl_total_as_f64(snapshot: &RiskSnapshot) -> f64 {
    snapshot.daily_pnl_total.to_f64().unwrap_or(0.0)
}
