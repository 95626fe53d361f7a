//! Dual Simple Moving Average crossover, carried over from the reference
//! golden-cross/death-cross strategy and adapted to the narrowed
//! `TradingStrategy` contract: a threshold-gated divergence between a fast
//! and slow SMA, each recomputed from the tail of the candle history it is
//! handed.

use super::TradingStrategy;
use crate::domain::candle::Candle;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone)]
pub struct DualSmaStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
    pub threshold: f64,
}

impl DualSmaStrategy {
    pub fn new(fast_period: usize, slow_period: usize, threshold: f64) -> Self {
        Self { fast_period, slow_period, threshold }
    }

    fn sma(candles: &[Candle], period: usize) -> f64 {
        let tail = &candles[candles.len().saturating_sub(period)..];
        let sum: f64 = tail.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).sum();
        sum / tail.len().max(1) as f64
    }
}

impl TradingStrategy for DualSmaStrategy {
    fn warmup(&self) -> usize {
        self.slow_period
    }

    fn name(&self) -> &str {
        "dual_sma"
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "fast_period": self.fast_period,
            "slow_period": self.slow_period,
            "threshold": self.threshold,
        })
    }

    fn indicators(&self) -> Vec<&'static str> {
        vec!["sma_fast", "sma_slow"]
    }

    fn generate_signal(&mut self, candles: &[Candle]) -> i8 {
        let fast = Self::sma(candles, self.fast_period);
        let slow = Self::sma(candles, self.slow_period);

        if fast > slow * (1.0 + self.threshold) {
            3
        } else if fast < slow * (1.0 - self.threshold) {
            -3
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn series(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(i as i64, dec!(1), dec!(1), dec!(1), rust_decimal::Decimal::try_from(c).unwrap(), dec!(1)))
            .collect()
    }

    #[test]
    fn golden_cross_yields_a_strong_buy_signal() {
        let mut strategy = DualSmaStrategy::new(2, 4, 0.001);
        let closes: Vec<f64> = vec![100.0, 100.0, 100.0, 100.0, 110.0, 120.0];
        let candles = series(&closes);
        assert_eq!(strategy.generate_signal(&candles), 3);
    }

    #[test]
    fn flat_series_yields_no_signal() {
        let mut strategy = DualSmaStrategy::new(2, 4, 0.001);
        let candles = series(&[100.0; 6]);
        assert_eq!(strategy.generate_signal(&candles), 0);
    }
}
