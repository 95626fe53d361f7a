//! Position model: signed-lots core, weighted-average entry on the
//! increasing-exposure side, realized P&L on the reducing side (C7).

use crate::domain::order::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    /// Positive = long, negative = short, zero = flat/closed.
    pub lots: i64,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub entry_time: i64,
    pub realized_pnl_cumulative: Decimal,
}

impl Position {
    pub fn flat(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            lots: 0,
            avg_entry_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            entry_time: 0,
            realized_pnl_cumulative: Decimal::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        self.lots != 0
    }

    /// Recompute `unrealized_pnl` against a fresh mark price.
    pub fn mark(&mut self, current_price: Decimal) {
        self.current_price = current_price;
        self.unrealized_pnl = Decimal::from(self.lots) * (current_price - self.avg_entry_price);
    }
}

/// A single fill event to apply to a position.
pub struct Fill {
    pub side: OrderSide,
    pub lots: i64,
    pub price: Decimal,
    pub timestamp: i64,
}

/// Applies a fill to a position, returning the updated position and the
/// realized P&L produced by the reducing portion of the fill (0 on a pure
/// exposure increase).
pub fn apply_fill(mut position: Position, fill: &Fill) -> (Position, Decimal) {
    let signed_lots = match fill.side {
        OrderSide::Buy => fill.lots,
        OrderSide::Sell => -fill.lots,
    };

    // Flat -> opening: direct entry at fill price.
    if position.lots == 0 {
        position.lots = signed_lots;
        position.avg_entry_price = fill.price;
        position.current_price = fill.price;
        position.entry_time = fill.timestamp;
        return (position, Decimal::ZERO);
    }

    let same_direction = (position.lots > 0) == (signed_lots > 0);

    if same_direction {
        // Increasing exposure: weighted-average entry.
        let prior_lots = Decimal::from(position.lots.abs());
        let added_lots = Decimal::from(signed_lots.abs());
        let total_lots = prior_lots + added_lots;
        position.avg_entry_price =
            (position.avg_entry_price * prior_lots + fill.price * added_lots) / total_lots;
        position.lots += signed_lots;
        position.current_price = fill.price;
        (position, Decimal::ZERO)
    } else {
        // Reducing (or flipping) exposure: realize P&L on the reduced portion.
        let reduced_lots = signed_lots.abs().min(position.lots.abs());
        let realized = Decimal::from(position.lots.signum() * reduced_lots)
            * (fill.price - position.avg_entry_price);

        position.realized_pnl_cumulative += realized;
        position.lots += signed_lots;
        position.current_price = fill.price;

        if position.lots == 0 {
            position.avg_entry_price = Decimal::ZERO;
        } else if position.lots.signum() != (position.lots - signed_lots).signum() {
            // Flipped through zero: the excess opens a fresh position at fill price.
            position.avg_entry_price = fill.price;
            position.entry_time = fill.timestamp;
        }

        (position, realized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn opening_a_flat_position_sets_entry_price() {
        let flat = Position::flat("X");
        let fill = Fill { side: OrderSide::Buy, lots: 2, price: dec!(100), timestamp: 1 };
        let (pos, realized) = apply_fill(flat, &fill);
        assert_eq!(pos.lots, 2);
        assert_eq!(pos.avg_entry_price, dec!(100));
        assert_eq!(realized, Decimal::ZERO);
    }

    #[test]
    fn adding_to_a_long_weights_entry_price() {
        let mut pos = Position::flat("X");
        pos.lots = 2;
        pos.avg_entry_price = dec!(100);
        let fill = Fill { side: OrderSide::Buy, lots: 1, price: dec!(130), timestamp: 2 };
        let (pos, _) = apply_fill(pos, &fill);
        assert_eq!(pos.lots, 3);
        assert_eq!(pos.avg_entry_price, dec!(110));
    }

    #[test]
    fn closing_a_long_realizes_pnl_and_flattens() {
        let mut pos = Position::flat("X");
        pos.lots = 3;
        pos.avg_entry_price = dec!(110);
        let fill = Fill { side: OrderSide::Sell, lots: 3, price: dec!(140), timestamp: 3 };
        let (pos, realized) = apply_fill(pos, &fill);
        assert_eq!(pos.lots, 0);
        assert_eq!(realized, dec!(90));
        assert_eq!(pos.avg_entry_price, Decimal::ZERO);
    }
}
