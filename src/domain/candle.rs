//! OHLC candle — the fixed-interval price aggregate the Candle Store
//! persists and the Indicator Engine/Strategy Host consume.

use crate::domain::errors::TradingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Epoch seconds, aligned to the candle boundary. Primary key per instrument.
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        time: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Enforces `low <= min(open, close) <= max(open, close) <= high` and
    /// `volume >= 0`. Violations are dropped by the caller with a counter
    /// increment, never propagated as a panic.
    pub fn validate(&self) -> Result<(), TradingError> {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);

        if self.low > body_low || body_high > self.high || self.low > self.high {
            return Err(TradingError::DataInvalid {
                reason: format!(
                    "candle at t={} violates low<=min(o,c)<=max(o,c)<=high: o={} h={} l={} c={}",
                    self.time, self.open, self.high, self.low, self.close
                ),
            });
        }

        if self.volume < Decimal::ZERO {
            return Err(TradingError::DataInvalid {
                reason: format!("candle at t={} has negative volume {}", self.time, self.volume),
            });
        }

        Ok(())
    }

    /// Incorporate a tick print into this candle's O/H/L/C, used by the
    /// Market Engine to roll up `trade` messages into the current
    /// (unfinalized) candle.
    pub fn update_from_tick(&mut self, price: Decimal, volume_delta: Decimal) {
        if self.high < price {
            self.high = price;
        }
        if self.low > price {
            self.low = price;
        }
        self.close = price;
        self.volume += volume_delta;
    }
}

/// An ordered, duplicate-free per-instrument sequence of finalized candles.
/// Insertion is upsert-by-time: a repeated write for an existing `time`
/// replaces the prior record in place, keeping the sequence sorted.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new() -> Self {
        Self { candles: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// Upsert by `time`; keeps the backing vec sorted ascending by `time`.
    pub fn upsert(&mut self, candle: Candle) {
        match self.candles.binary_search_by_key(&candle.time, |c| c.time) {
            Ok(idx) => self.candles[idx] = candle,
            Err(idx) => self.candles.insert(idx, candle),
        }
    }

    pub fn upsert_batch(&mut self, candles: impl IntoIterator<Item = Candle>) {
        for c in candles {
            self.upsert(c);
        }
    }

    pub fn recent(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    pub fn since(&self, t: i64) -> &[Candle] {
        let start = self.candles.partition_point(|c| c.time < t);
        &self.candles[start..]
    }

    pub fn range(&self, t0: i64, t1: i64) -> Vec<Candle> {
        self.candles
            .iter()
            .filter(|c| c.time >= t0 && c.time <= t1)
            .cloned()
            .collect()
    }

    pub fn truncate_front(&mut self, max_len: usize) {
        if self.candles.len() > max_len {
            let drop = self.candles.len() - max_len;
            self.candles.drain(0..drop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn validate_rejects_high_below_body() {
        let c = Candle::new(1, dec!(100), dec!(99), dec!(95), dec!(101), dec!(10));
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_volume() {
        let c = Candle::new(1, dec!(100), dec!(105), dec!(95), dec!(101), dec!(-1));
        assert!(c.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_candle() {
        let c = Candle::new(1, dec!(100), dec!(102), dec!(99), dec!(101), dec!(15));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn upsert_replaces_same_time_and_stays_sorted() {
        let mut series = CandleSeries::new();
        series.upsert(Candle::new(1700000000, dec!(100), dec!(101), dec!(99), dec!(100), dec!(10)));
        series.upsert(Candle::new(1700000000, dec!(100), dec!(102), dec!(99), dec!(101), dec!(15)));
        assert_eq!(series.len(), 1);
        assert_eq!(series.recent(1)[0].close, dec!(101));
        assert_eq!(series.recent(1)[0].volume, dec!(15));
    }

    #[test]
    fn upsert_keeps_series_ordered_by_time() {
        let mut series = CandleSeries::new();
        series.upsert(Candle::new(3, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)));
        series.upsert(Candle::new(1, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)));
        series.upsert(Candle::new(2, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1)));
        let times: Vec<i64> = series.as_slice().iter().map(|c| c.time).collect();
        assert_eq!(times, vec![1, 2, 3]);
    }
}
