//! Strategy Host (C5): invokes a strategy once per finalized candle, after
//! its declared warmup has been satisfied, and turns its `i8` signal into a
//! published `strategy_signal` event.

pub mod dual_sma;
pub mod supertrend_adx;

use crate::domain::candle::Candle;
use crate::domain::order::OrderSide;

/// The contract every strategy plugged into the host must satisfy. Narrowed
/// from a much larger surface down to the single decision function the host
/// actually drives: given the full closed-candle history it owns, produce a
/// signed signal in `[-3, 3]` (negative = sell pressure, positive = buy
/// pressure, magnitude = conviction) or `0` for no opinion.
pub trait TradingStrategy: Send + Sync {
    /// Minimum candle count before `generate_signal` is called at all.
    fn warmup(&self) -> usize;

    fn name(&self) -> &str;

    /// Current parameter values, exposed read-only through the admin
    /// surface and the audit trail.
    fn params(&self) -> serde_json::Value;

    /// Names of the indicators this strategy consults, for operator
    /// visibility only — the strategy computes them itself.
    fn indicators(&self) -> Vec<&'static str>;

    /// Mutates internal indicator state before returning a signal in
    /// `[-3, 3]`.
    fn generate_signal(&mut self, candles: &[Candle]) -> i8;
}

pub fn side_for_signal(signal: i8) -> Option<OrderSide> {
    if signal > 0 {
        Some(OrderSide::Buy)
    } else if signal < 0 {
        Some(OrderSide::Sell)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_for_signal_maps_sign_to_direction() {
        assert_eq!(side_for_signal(3), Some(OrderSide::Buy));
        assert_eq!(side_for_signal(-1), Some(OrderSide::Sell));
        assert_eq!(side_for_signal(0), None);
    }
}
