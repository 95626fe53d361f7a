//! Risk State: the process-wide admission-control state the Risk Gate
//! actor owns exclusively (C3).

use crate::domain::errors::RiskViolation;
use crate::domain::order::OrderSide;
use crate::domain::position::Position;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_daily_loss_abs: Decimal,
    pub max_daily_loss_pct: Decimal,
    pub max_position_size_lots: i64,
    pub max_open_positions: usize,
    pub starting_capital: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub instrument: String,
    pub side: OrderSide,
    pub lots: i64,
    pub price: Decimal,
    pub realized_pnl: Decimal,
    pub trade_id: Option<String>,
    pub timestamp: i64,
}

/// Process-wide risk account state, born on first startup and advanced by
/// every `record_trade`. Persisted atomically after every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub trading_date: NaiveDate,
    pub daily_pnl_realized: Decimal,
    pub open_positions: HashMap<String, Position>,
    pub daily_trades: Vec<TradeRecord>,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub limits: RiskLimits,
}

impl RiskState {
    pub fn new(trading_date: NaiveDate, limits: RiskLimits) -> Self {
        Self {
            trading_date,
            daily_pnl_realized: Decimal::ZERO,
            open_positions: HashMap::new(),
            daily_trades: Vec::new(),
            blocked: false,
            block_reason: None,
            limits,
        }
    }

    pub fn daily_pnl_total(&self) -> Decimal {
        self.daily_pnl_realized
            + self
                .open_positions
                .values()
                .map(|p| p.unrealized_pnl)
                .sum::<Decimal>()
    }

    /// Resets daily counters if `today` differs from the stored
    /// `trading_date`, retaining open positions across the rollover.
    pub fn roll_date_if_needed(&mut self, today: NaiveDate) {
        if today != self.trading_date {
            self.trading_date = today;
            self.daily_pnl_realized = Decimal::ZERO;
            self.daily_trades.clear();
            self.blocked = false;
            self.block_reason = None;
        }
    }

    /// The six-step admission order from the Risk Gate contract. Does not
    /// mutate persisted state beyond the date rollover it performs first.
    pub fn admit(
        &mut self,
        today: NaiveDate,
        instrument: &str,
        side: OrderSide,
        lots: i64,
        _price: Decimal,
    ) -> Result<(), RiskViolation> {
        self.roll_date_if_needed(today);

        if self.blocked {
            return Err(RiskViolation::Blocked {
                reason: self.block_reason.clone().unwrap_or_default(),
            });
        }

        let daily_pnl = self.daily_pnl_total();

        if self.limits.max_daily_loss_abs > Decimal::ZERO
            && daily_pnl.abs() >= self.limits.max_daily_loss_abs
        {
            self.blocked = true;
            self.block_reason = Some(format!(
                "Daily loss limit reached: |{daily_pnl}| >= {}",
                self.limits.max_daily_loss_abs
            ));
            return Err(RiskViolation::DailyLossLimitAbs {
                daily_pnl: daily_pnl.to_string(),
                limit: self.limits.max_daily_loss_abs.to_string(),
            });
        }

        if self.limits.max_daily_loss_pct > Decimal::ZERO && self.limits.starting_capital > Decimal::ZERO {
            let pct = (daily_pnl.abs() / self.limits.starting_capital) * Decimal::ONE_HUNDRED;
            if pct >= self.limits.max_daily_loss_pct {
                self.blocked = true;
                self.block_reason = Some(format!(
                    "Daily loss percent limit reached: {pct:.2}% >= {:.2}%",
                    self.limits.max_daily_loss_pct
                ));
                return Err(RiskViolation::DailyLossLimitPct {
                    pct: pct.try_into().unwrap_or(0.0),
                    limit_pct: self.limits.max_daily_loss_pct.try_into().unwrap_or(0.0),
                });
            }
        }

        if self.limits.max_position_size_lots > 0 && lots > self.limits.max_position_size_lots {
            return Err(RiskViolation::PositionSizeLimit {
                lots,
                max_lots: self.limits.max_position_size_lots,
            });
        }

        if side == OrderSide::Buy
            && !self.open_positions.contains_key(instrument)
            && self.open_positions.len() >= self.limits.max_open_positions
        {
            return Err(RiskViolation::OpenPositionCap {
                count: self.open_positions.len(),
                max_count: self.limits.max_open_positions,
            });
        }

        Ok(())
    }

    pub fn record_trade(&mut self, record: TradeRecord, resulting_position: Position) {
        self.daily_pnl_realized += record.realized_pnl;

        if resulting_position.lots == 0 {
            self.open_positions.remove(&record.instrument);
        } else {
            self.open_positions.insert(record.instrument.clone(), resulting_position);
        }

        self.daily_trades.push(record);
    }

    pub fn update_mark(&mut self, instrument: &str, current_price: Decimal) {
        if let Some(pos) = self.open_positions.get_mut(instrument) {
            pos.mark(current_price);
        }
    }

    pub fn force_unblock(&mut self) {
        self.blocked = false;
        self.block_reason = None;
    }

    pub fn force_close_all(&mut self) -> Vec<String> {
        let instruments: Vec<String> = self.open_positions.keys().cloned().collect();
        self.open_positions.clear();
        instruments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_daily_loss_abs: dec!(100),
            max_daily_loss_pct: Decimal::ZERO,
            max_position_size_lots: 0,
            max_open_positions: 10,
            starting_capital: dec!(10000),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    #[test]
    fn blocked_denies_every_admit_until_unblocked() {
        let mut state = RiskState::new(today(), limits());
        state.blocked = true;
        state.block_reason = Some("manual".into());
        assert!(state.admit(today(), "X", OrderSide::Buy, 1, dec!(100)).is_err());
        state.force_unblock();
        assert!(state.admit(today(), "X", OrderSide::Buy, 1, dec!(100)).is_ok());
    }

    #[test]
    fn daily_loss_abs_latches_block_at_threshold() {
        let mut state = RiskState::new(today(), limits());
        let rec1 = TradeRecord {
            instrument: "X".into(),
            side: OrderSide::Sell,
            lots: 1,
            price: dec!(200),
            realized_pnl: dec!(-60),
            trade_id: None,
            timestamp: 1,
        };
        state.record_trade(rec1, Position::flat("X"));
        assert!(state.admit(today(), "Y", OrderSide::Buy, 1, dec!(50)).is_ok());

        let rec2 = TradeRecord {
            instrument: "X".into(),
            side: OrderSide::Sell,
            lots: 1,
            price: dec!(200),
            realized_pnl: dec!(-50),
            trade_id: None,
            timestamp: 2,
        };
        state.record_trade(rec2, Position::flat("X"));
        let result = state.admit(today(), "Y", OrderSide::Buy, 1, dec!(50));
        assert!(result.is_err());
        assert!(state.blocked);
    }

    #[test]
    fn open_position_cap_enforced_after_record_trade() {
        let mut lim = limits();
        lim.max_open_positions = 1;
        let mut state = RiskState::new(today(), lim);

        let mut pos = Position::flat("X");
        pos.lots = 2;
        state.record_trade(
            TradeRecord {
                instrument: "X".into(),
                side: OrderSide::Buy,
                lots: 2,
                price: dec!(100),
                realized_pnl: Decimal::ZERO,
                trade_id: None,
                timestamp: 1,
            },
            pos,
        );

        assert!(state.open_positions.len() <= state.limits.max_open_positions);
        assert!(state.admit(today(), "Y", OrderSide::Buy, 1, dec!(100)).is_err());
    }

    #[test]
    fn date_rollover_resets_daily_counters_but_keeps_positions() {
        let mut state = RiskState::new(today(), limits());
        state.blocked = true;
        state.block_reason = Some("daily loss".into());
        state.daily_pnl_realized = dec!(-200);
        let mut pos = Position::flat("X");
        pos.lots = 1;
        state.open_positions.insert("X".into(), pos);

        let tomorrow = today().succ_opt().unwrap();
        state.roll_date_if_needed(tomorrow);

        assert!(!state.blocked);
        assert_eq!(state.daily_pnl_realized, Decimal::ZERO);
        assert!(state.open_positions.contains_key("X"));
    }

    #[test]
    fn position_round_trip_weighted_entry_and_close() {
        let mut state = RiskState::new(today(), limits());
        let mut pos = Position::flat("X");
        pos.lots = 2;
        pos.avg_entry_price = dec!(100);
        state.record_trade(
            TradeRecord {
                instrument: "X".into(),
                side: OrderSide::Buy,
                lots: 2,
                price: dec!(100),
                realized_pnl: Decimal::ZERO,
                trade_id: None,
                timestamp: 1,
            },
            pos.clone(),
        );

        pos.lots = 3;
        pos.avg_entry_price = dec!(110);
        state.record_trade(
            TradeRecord {
                instrument: "X".into(),
                side: OrderSide::Buy,
                lots: 1,
                price: dec!(130),
                realized_pnl: Decimal::ZERO,
                trade_id: None,
                timestamp: 2,
            },
            pos,
        );
        assert_eq!(state.open_positions["X"].avg_entry_price, dec!(110));

        state.record_trade(
            TradeRecord {
                instrument: "X".into(),
                side: OrderSide::Sell,
                lots: 3,
                price: dec!(140),
                realized_pnl: dec!(90),
                trade_id: None,
                timestamp: 3,
            },
            Position::flat("X"),
        );
        assert!(!state.open_positions.contains_key("X"));
        assert_eq!(state.daily_pnl_realized, dec!(90));
    }
}
