//! Canonical order record and lifecycle state machine (C7).

use crate::domain::errors::TradingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Collapses the heterogeneous broker-native status vocabulary into the
/// four canonical statuses. Unknown statuses are a hard error per the
/// adapter's order-normalization contract.
pub fn normalize_order_status(native: &str) -> Result<OrderStatus, TradingError> {
    let lower = native.to_ascii_lowercase();
    match lower.as_str() {
        "new" | "accepted" | "confirmed" | "unconfirmed" | "queued" | "open" => Ok(OrderStatus::Open),
        "filled" | "executed" | "complete" => Ok(OrderStatus::Filled),
        "canceled" | "cancelled" | "expired" => Ok(OrderStatus::Canceled),
        "rejected" | "failed" => Ok(OrderStatus::Rejected),
        other => Err(TradingError::InvalidOrder {
            reason: format!("unmapped broker order status: {other}"),
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub request_size: Decimal,
    pub filled_size: Decimal,
    pub remaining_size: Decimal,
    pub price: Decimal,
    pub funds: Decimal,
    pub fees: Decimal,
    pub create_time: i64,
    pub update_time: i64,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        instrument: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        request_size: Decimal,
        price: Decimal,
        now: i64,
    ) -> Self {
        Self {
            id: id.into(),
            instrument: instrument.into(),
            side,
            order_type,
            status: OrderStatus::Open,
            request_size,
            filled_size: Decimal::ZERO,
            remaining_size: request_size,
            price,
            funds: Decimal::ZERO,
            fees: Decimal::ZERO,
            create_time: now,
            update_time: now,
        }
    }

    /// Enforces the legal-transition diagram:
    /// `open -> open` (partial fill), `open -> filled`, `open -> canceled`,
    /// `open -> rejected`; terminal states accept no further transition.
    pub fn transition(
        &mut self,
        new_status: OrderStatus,
        fill_delta: Option<Decimal>,
        price: Option<Decimal>,
        fees: Option<Decimal>,
        now: i64,
    ) -> Result<(), TradingError> {
        if self.status.is_terminal() {
            return Err(TradingError::StateMachineViolation {
                from: self.status.to_string(),
                to: new_status.to_string(),
            });
        }

        match new_status {
            OrderStatus::Open => {
                let delta = fill_delta.unwrap_or(Decimal::ZERO);
                if delta < Decimal::ZERO || delta > self.remaining_size {
                    return Err(TradingError::InvalidOrder {
                        reason: format!(
                            "fill_delta {delta} out of range for remaining_size {}",
                            self.remaining_size
                        ),
                    });
                }
                self.filled_size += delta;
                self.remaining_size -= delta;
                if let Some(p) = price {
                    self.price = p;
                }
                if let Some(f) = fees {
                    self.fees += f;
                }
                if self.remaining_size.is_zero() && delta > Decimal::ZERO {
                    self.status = OrderStatus::Filled;
                }
            }
            OrderStatus::Filled => {
                let delta = fill_delta.unwrap_or(self.remaining_size);
                self.filled_size += delta;
                self.remaining_size -= delta;
                if !self.remaining_size.is_zero() {
                    return Err(TradingError::InvalidOrder {
                        reason: format!(
                            "transition to filled left remaining_size {} nonzero",
                            self.remaining_size
                        ),
                    });
                }
                if let Some(p) = price {
                    self.price = p;
                }
                if let Some(f) = fees {
                    self.fees += f;
                }
                self.status = OrderStatus::Filled;
            }
            OrderStatus::Canceled | OrderStatus::Rejected => {
                self.status = new_status;
            }
        }

        self.update_time = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_order() -> Order {
        Order::new("o1", "binance:BTCUSDT", OrderSide::Buy, OrderType::Market, dec!(10), dec!(100), 0)
    }

    #[test]
    fn partial_fill_keeps_order_open() {
        let mut order = test_order();
        order.transition(OrderStatus::Open, Some(dec!(4)), None, None, 1).unwrap();
        assert_eq!(order.filled_size, dec!(4));
        assert_eq!(order.remaining_size, dec!(6));
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[test]
    fn full_fill_transitions_to_filled() {
        let mut order = test_order();
        order.transition(OrderStatus::Open, Some(dec!(4)), None, None, 1).unwrap();
        order.transition(OrderStatus::Filled, Some(dec!(6)), None, None, 2).unwrap();
        assert_eq!(order.filled_size, dec!(10));
        assert_eq!(order.remaining_size, Decimal::ZERO);
        assert_eq!(order.status, OrderStatus::Filled);
    }

    #[test]
    fn terminal_status_rejects_further_transitions() {
        let mut order = test_order();
        order.transition(OrderStatus::Rejected, None, None, None, 1).unwrap();
        let result = order.transition(OrderStatus::Canceled, None, None, None, 2);
        assert!(result.is_err());
    }

    #[test]
    fn invariant_filled_plus_remaining_equals_request() {
        let mut order = test_order();
        order.transition(OrderStatus::Open, Some(dec!(3)), None, None, 1).unwrap();
        assert_eq!(order.filled_size + order.remaining_size, order.request_size);
    }

    #[test]
    fn normalize_order_status_maps_known_states() {
        assert_eq!(normalize_order_status("NEW").unwrap(), OrderStatus::Open);
        assert_eq!(normalize_order_status("executed").unwrap(), OrderStatus::Filled);
        assert_eq!(normalize_order_status("expired").unwrap(), OrderStatus::Canceled);
        assert_eq!(normalize_order_status("failed").unwrap(), OrderStatus::Rejected);
    }

    #[test]
    fn normalize_order_status_errors_on_unknown() {
        assert!(normalize_order_status("bogus").is_err());
    }
}
