//! Indicator Engine (C4): a name+params-keyed registry of stateful
//! indicators, updated once per finalized candle. Most indicators are the
//! `ta` crate's `Next`-driven implementations; Supertrend has no `ta`
//! counterpart and is hand-rolled here.

use crate::domain::candle::Candle;
use crate::infrastructure::observability::Metrics;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::Arc;
use ta::Next;
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendParams {
    pub period: usize,
    pub multiplier: f64,
}

/// Hand-rolled since `ta` has no Supertrend. Tracks the running basic bands
/// and the last trend direction the way the reference implementation does.
#[derive(Debug, Clone)]
struct SupertrendState {
    atr: AverageTrueRange,
    multiplier: f64,
    prev_final_upper: Option<f64>,
    prev_final_lower: Option<f64>,
    prev_close: Option<f64>,
    trend_up: bool,
    value: f64,
}

impl SupertrendState {
    fn new(params: SupertrendParams) -> Self {
        Self {
            atr: AverageTrueRange::new(params.period).expect("valid ATR period"),
            multiplier: params.multiplier,
            prev_final_upper: None,
            prev_final_lower: None,
            prev_close: None,
            trend_up: true,
            value: 0.0,
        }
    }

    fn next(&mut self, candle: &Candle) -> f64 {
        let high = candle.high.to_f64().unwrap_or(0.0);
        let low = candle.low.to_f64().unwrap_or(0.0);
        let close = candle.close.to_f64().unwrap_or(0.0);

        let atr = self.atr.next(&ta::DataItem::builder()
            .high(high)
            .low(low)
            .close(close)
            .open(candle.open.to_f64().unwrap_or(close))
            .volume(candle.volume.to_f64().unwrap_or(0.0))
            .build()
            .expect("candle fields are finite"));

        let mid = (high + low) / 2.0;
        let basic_upper = mid + self.multiplier * atr;
        let basic_lower = mid - self.multiplier * atr;

        let final_upper = match (self.prev_final_upper, self.prev_close) {
            (Some(prev_upper), Some(prev_close)) if basic_upper < prev_upper || prev_close > prev_upper => basic_upper,
            (Some(prev_upper), _) => prev_upper,
            (None, _) => basic_upper,
        };
        let final_lower = match (self.prev_final_lower, self.prev_close) {
            (Some(prev_lower), Some(prev_close)) if basic_lower > prev_lower || prev_close < prev_lower => basic_lower,
            (Some(prev_lower), _) => prev_lower,
            (None, _) => basic_lower,
        };

        if self.trend_up {
            if close < final_lower {
                self.trend_up = false;
            }
        } else if close > final_upper {
            self.trend_up = true;
        }

        self.value = if self.trend_up { final_lower } else { final_upper };
        self.prev_final_upper = Some(final_upper);
        self.prev_final_lower = Some(final_lower);
        self.prev_close = Some(close);
        self.value
    }
}

/// Wilder's Average Directional Index. `ta` has no ADX implementation, so
/// this tracks smoothed +DM/-DM/TR the way the reference strategy does.
#[derive(Debug, Clone)]
struct AdxState {
    period: usize,
    prev_high: Option<f64>,
    prev_low: Option<f64>,
    prev_close: Option<f64>,
    smoothed_plus_dm: f64,
    smoothed_minus_dm: f64,
    smoothed_tr: f64,
    adx: f64,
    count: usize,
}

impl AdxState {
    fn new(period: usize) -> Self {
        Self {
            period,
            prev_high: None,
            prev_low: None,
            prev_close: None,
            smoothed_plus_dm: 0.0,
            smoothed_minus_dm: 0.0,
            smoothed_tr: 0.0,
            adx: 0.0,
            count: 0,
        }
    }

    fn next(&mut self, candle: &Candle) -> f64 {
        let high = candle.high.to_f64().unwrap_or(0.0);
        let low = candle.low.to_f64().unwrap_or(0.0);
        let close = candle.close.to_f64().unwrap_or(0.0);

        let (Some(prev_high), Some(prev_low), Some(prev_close)) =
            (self.prev_high, self.prev_low, self.prev_close)
        else {
            self.prev_high = Some(high);
            self.prev_low = Some(low);
            self.prev_close = Some(close);
            return 0.0;
        };

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        let minus_dm = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };
        let tr = (high - low).max((high - prev_close).abs()).max((low - prev_close).abs());

        let n = self.period as f64;
        self.smoothed_plus_dm = self.smoothed_plus_dm - (self.smoothed_plus_dm / n) + plus_dm;
        self.smoothed_minus_dm = self.smoothed_minus_dm - (self.smoothed_minus_dm / n) + minus_dm;
        self.smoothed_tr = self.smoothed_tr - (self.smoothed_tr / n) + tr;

        let plus_di = if self.smoothed_tr > 0.0 { 100.0 * self.smoothed_plus_dm / self.smoothed_tr } else { 0.0 };
        let minus_di = if self.smoothed_tr > 0.0 { 100.0 * self.smoothed_minus_dm / self.smoothed_tr } else { 0.0 };
        let dx = if plus_di + minus_di > 0.0 { 100.0 * (plus_di - minus_di).abs() / (plus_di + minus_di) } else { 0.0 };

        self.count += 1;
        self.adx = if self.count <= self.period { dx } else { ((self.adx * (n - 1.0)) + dx) / n };

        self.prev_high = Some(high);
        self.prev_low = Some(low);
        self.prev_close = Some(close);
        self.adx
    }
}

enum Indicator {
    Sma(SimpleMovingAverage),
    Ema(ExponentialMovingAverage),
    Rsi(RelativeStrengthIndex),
    Atr(AverageTrueRange),
    Supertrend(SupertrendState),
    Adx(AdxState),
}

impl Indicator {
    fn next(&mut self, candle: &Candle) -> f64 {
        let close = candle.close.to_f64().unwrap_or(0.0);
        match self {
            Indicator::Sma(i) => i.next(close),
            Indicator::Ema(i) => i.next(close),
            Indicator::Rsi(i) => i.next(close),
            Indicator::Atr(i) => {
                let item = ta::DataItem::builder()
                    .high(candle.high.to_f64().unwrap_or(close))
                    .low(candle.low.to_f64().unwrap_or(close))
                    .close(close)
                    .open(candle.open.to_f64().unwrap_or(close))
                    .volume(candle.volume.to_f64().unwrap_or(0.0))
                    .build()
                    .expect("candle fields are finite");
                i.next(&item)
            }
            Indicator::Supertrend(s) => s.next(candle),
            Indicator::Adx(a) => a.next(candle),
        }
    }
}

/// Registry key: instrument + indicator name + its parameters, so two
/// strategies asking for `sma(20)` on the same instrument share one state
/// machine while `sma(20)` and `sma(50)` stay independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegistryKey {
    instrument_key: String,
    indicator_key: String,
}

/// The value `compute` hands back: a bare scalar for single-valued
/// indicators, or a tagged record for the multi-valued families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorOutput {
    Value(f64),
    Bollinger { upper: f64, middle: f64, lower: f64 },
    Macd { macd: f64, signal: f64, histogram: f64 },
    Stochastic { k: f64, d: f64 },
}

fn param_usize(params: &serde_json::Value, key: &str, default: usize) -> usize {
    params.get(key).and_then(serde_json::Value::as_u64).map(|v| v as usize).unwrap_or(default)
}

fn param_f64(params: &serde_json::Value, key: &str, default: f64) -> f64 {
    params.get(key).and_then(serde_json::Value::as_f64).unwrap_or(default)
}

fn required_window(name: &str, params: &serde_json::Value) -> Option<usize> {
    match name {
        "sma" | "ema" | "rsi" | "atr" | "adx" | "volume_sma" => Some(param_usize(params, "period", 14)),
        "supertrend" => Some(param_usize(params, "period", 10)),
        "bollinger" => Some(param_usize(params, "period", 20)),
        "vwap" => Some(1),
        "macd" => {
            let slow = param_usize(params, "slow_period", 26);
            let signal = param_usize(params, "signal_period", 9);
            Some(slow + signal)
        }
        "stochastic" => {
            let k = param_usize(params, "k_period", 14);
            let d = param_usize(params, "d_period", 3);
            Some(k + d - 1)
        }
        _ => None,
    }
}

fn sma_over(window: &[Candle], period: usize) -> f64 {
    let tail = &window[window.len().saturating_sub(period)..];
    let sum: f64 = tail.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).sum();
    sum / tail.len().max(1) as f64
}

fn ema_over(window: &[Candle], period: usize) -> f64 {
    let mut ema = ExponentialMovingAverage::new(period).expect("valid EMA period");
    let mut last = 0.0;
    for c in window {
        last = ema.next(c.close.to_f64().unwrap_or(0.0));
    }
    last
}

fn rsi_over(window: &[Candle], period: usize) -> f64 {
    let mut rsi = RelativeStrengthIndex::new(period).expect("valid RSI period");
    let mut last = 50.0;
    for c in window {
        last = rsi.next(c.close.to_f64().unwrap_or(0.0));
    }
    last
}

fn atr_over(window: &[Candle], period: usize) -> f64 {
    let mut atr = AverageTrueRange::new(period).expect("valid ATR period");
    let mut last = 0.0;
    for c in window {
        let close = c.close.to_f64().unwrap_or(0.0);
        let item = ta::DataItem::builder()
            .high(c.high.to_f64().unwrap_or(close))
            .low(c.low.to_f64().unwrap_or(close))
            .close(close)
            .open(c.open.to_f64().unwrap_or(close))
            .volume(c.volume.to_f64().unwrap_or(0.0))
            .build()
            .expect("candle fields are finite");
        last = atr.next(&item);
    }
    last
}

fn adx_over(window: &[Candle], period: usize) -> f64 {
    let mut state = AdxState::new(period);
    let mut last = 0.0;
    for c in window {
        last = state.next(c);
    }
    last
}

fn supertrend_over(window: &[Candle], period: usize, multiplier: f64) -> f64 {
    let mut state = SupertrendState::new(SupertrendParams { period, multiplier });
    let mut last = 0.0;
    for c in window {
        last = state.next(c);
    }
    last
}

fn volume_sma_over(window: &[Candle], period: usize) -> f64 {
    let tail = &window[window.len().saturating_sub(period)..];
    let sum: f64 = tail.iter().map(|c| c.volume.to_f64().unwrap_or(0.0)).sum();
    sum / tail.len().max(1) as f64
}

/// Typical-price volume-weighted average over the whole window handed in —
/// callers that want a session VWAP pass only that session's candles.
fn vwap_over(window: &[Candle]) -> f64 {
    let mut price_volume = 0.0;
    let mut volume = 0.0;
    for c in window {
        let typical = (c.high.to_f64().unwrap_or(0.0) + c.low.to_f64().unwrap_or(0.0) + c.close.to_f64().unwrap_or(0.0)) / 3.0;
        let vol = c.volume.to_f64().unwrap_or(0.0);
        price_volume += typical * vol;
        volume += vol;
    }
    if volume > 0.0 { price_volume / volume } else { 0.0 }
}

fn bollinger_over(window: &[Candle], period: usize, deviation: f64) -> (f64, f64, f64) {
    let tail = &window[window.len().saturating_sub(period)..];
    let closes: Vec<f64> = tail.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).collect();
    let mean = closes.iter().sum::<f64>() / closes.len().max(1) as f64;
    let variance = closes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / closes.len().max(1) as f64;
    let std_dev = variance.sqrt();
    (mean + deviation * std_dev, mean, mean - deviation * std_dev)
}

fn macd_over(window: &[Candle], fast_period: usize, slow_period: usize, signal_period: usize) -> (f64, f64, f64) {
    let mut fast_ema = ExponentialMovingAverage::new(fast_period).expect("valid fast period");
    let mut slow_ema = ExponentialMovingAverage::new(slow_period).expect("valid slow period");
    let mut signal_ema = ExponentialMovingAverage::new(signal_period).expect("valid signal period");
    let mut macd_line = 0.0;
    let mut signal_line = 0.0;
    for c in window {
        let close = c.close.to_f64().unwrap_or(0.0);
        let fast = fast_ema.next(close);
        let slow = slow_ema.next(close);
        macd_line = fast - slow;
        signal_line = signal_ema.next(macd_line);
    }
    (macd_line, signal_line, macd_line - signal_line)
}

/// `%K` from the last `d_period` lookback windows, `%D` as their average —
/// the plain (unsmoothed) stochastic oscillator.
fn stochastic_over(window: &[Candle], k_period: usize, d_period: usize) -> (f64, f64) {
    let n = window.len();
    let mut k_values = Vec::with_capacity(d_period);
    for i in 0..d_period {
        if n < i + k_period {
            break;
        }
        let end = n - i;
        let slice = &window[end - k_period..end];
        let close = slice.last().unwrap().close.to_f64().unwrap_or(0.0);
        let high = slice.iter().map(|c| c.high.to_f64().unwrap_or(0.0)).fold(f64::MIN, f64::max);
        let low = slice.iter().map(|c| c.low.to_f64().unwrap_or(0.0)).fold(f64::MAX, f64::min);
        let range = high - low;
        k_values.push(if range > 0.0 { 100.0 * (close - low) / range } else { 50.0 });
    }
    let k = k_values.first().copied().unwrap_or(50.0);
    let d = if k_values.is_empty() { 50.0 } else { k_values.iter().sum::<f64>() / k_values.len() as f64 };
    (k, d)
}

/// Pure-over-the-window indicator contract (§4.4): `series` is the sole
/// input, nothing persists between calls. `history` looks back that many
/// closed candles from the end of `series` before evaluating; `None` means
/// `len(series) < required_window(name, params)`.
pub fn compute(series: &[Candle], name: &str, params: &serde_json::Value, history: usize) -> Option<IndicatorOutput> {
    let required = required_window(name, params)?;
    if series.len() < required + history {
        return None;
    }
    let end = series.len() - history;
    let window = &series[..end];

    Some(match name {
        "sma" => IndicatorOutput::Value(sma_over(window, param_usize(params, "period", 14))),
        "ema" => IndicatorOutput::Value(ema_over(window, param_usize(params, "period", 14))),
        "rsi" => IndicatorOutput::Value(rsi_over(window, param_usize(params, "period", 14))),
        "atr" => IndicatorOutput::Value(atr_over(window, param_usize(params, "period", 14))),
        "adx" => IndicatorOutput::Value(adx_over(window, param_usize(params, "period", 14))),
        "supertrend" => IndicatorOutput::Value(supertrend_over(
            window,
            param_usize(params, "period", 10),
            param_f64(params, "multiplier", 3.0),
        )),
        "volume_sma" => IndicatorOutput::Value(volume_sma_over(window, param_usize(params, "period", 20))),
        "vwap" => IndicatorOutput::Value(vwap_over(window)),
        "bollinger" => {
            let (upper, middle, lower) =
                bollinger_over(window, param_usize(params, "period", 20), param_f64(params, "deviation", 2.0));
            IndicatorOutput::Bollinger { upper, middle, lower }
        }
        "macd" => {
            let (macd, signal, histogram) = macd_over(
                window,
                param_usize(params, "fast_period", 12),
                param_usize(params, "slow_period", 26),
                param_usize(params, "signal_period", 9),
            );
            IndicatorOutput::Macd { macd, signal, histogram }
        }
        "stochastic" => {
            let (k, d) =
                stochastic_over(window, param_usize(params, "k_period", 14), param_usize(params, "d_period", 3));
            IndicatorOutput::Stochastic { k, d }
        }
        _ => return None,
    })
}

pub struct IndicatorEngine {
    registry: HashMap<RegistryKey, Indicator>,
    metrics: Arc<Metrics>,
}

impl IndicatorEngine {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { registry: HashMap::new(), metrics }
    }

    pub fn sma(&mut self, instrument_key: &str, candle: &Candle, period: usize) -> f64 {
        self.eval(instrument_key, &format!("sma_{period}"), candle, || {
            Indicator::Sma(SimpleMovingAverage::new(period).expect("valid SMA period"))
        })
    }

    pub fn ema(&mut self, instrument_key: &str, candle: &Candle, period: usize) -> f64 {
        self.eval(instrument_key, &format!("ema_{period}"), candle, || {
            Indicator::Ema(ExponentialMovingAverage::new(period).expect("valid EMA period"))
        })
    }

    pub fn rsi(&mut self, instrument_key: &str, candle: &Candle, period: usize) -> f64 {
        self.eval(instrument_key, &format!("rsi_{period}"), candle, || {
            Indicator::Rsi(RelativeStrengthIndex::new(period).expect("valid RSI period"))
        })
    }

    pub fn atr(&mut self, instrument_key: &str, candle: &Candle, period: usize) -> f64 {
        self.eval(instrument_key, &format!("atr_{period}"), candle, || {
            Indicator::Atr(AverageTrueRange::new(period).expect("valid ATR period"))
        })
    }

    pub fn supertrend(&mut self, instrument_key: &str, candle: &Candle, params: SupertrendParams) -> f64 {
        let key = format!("supertrend_{}_{}", params.period, params.multiplier);
        self.eval(instrument_key, &key, candle, || Indicator::Supertrend(SupertrendState::new(params)))
    }

    pub fn adx(&mut self, instrument_key: &str, candle: &Candle, period: usize) -> f64 {
        self.eval(instrument_key, &format!("adx_{period}"), candle, || Indicator::Adx(AdxState::new(period)))
    }

    fn eval(
        &mut self,
        instrument_key: &str,
        indicator_key: &str,
        candle: &Candle,
        make: impl FnOnce() -> Indicator,
    ) -> f64 {
        let key = RegistryKey { instrument_key: instrument_key.to_string(), indicator_key: indicator_key.to_string() };
        let indicator = self.registry.entry(key).or_insert_with(make);
        let value = indicator.next(candle);
        self.metrics.inc_indicators_calculated(instrument_key, indicator_key);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(i: i64, close: f64) -> Candle {
        Candle::new(i, dec!(1), dec!(1), dec!(1), rust_decimal::Decimal::try_from(close).unwrap(), dec!(1))
    }

    #[test]
    fn sma_converges_to_a_flat_series_value() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut engine = IndicatorEngine::new(metrics);
        let mut last = 0.0;
        for i in 0..10 {
            last = engine.sma("X", &candle(i, 100.0), 5);
        }
        assert!((last - 100.0).abs() < 1e-6);
    }

    #[test]
    fn indicators_are_keyed_per_instrument() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let mut engine = IndicatorEngine::new(metrics);
        for i in 0..5 {
            engine.sma("A", &candle(i, 100.0), 3);
        }
        let first_b = engine.sma("B", &candle(0, 50.0), 3);
        assert_eq!(first_b, 50.0);
    }

    fn flat_series(n: i64, close: f64) -> Vec<Candle> {
        (0..n).map(|i| candle(i, close)).collect()
    }

    #[test]
    fn compute_returns_null_when_the_window_is_too_short() {
        let series = flat_series(5, 100.0);
        let params = serde_json::json!({"period": 14});
        assert!(compute(&series, "sma", &params, 0).is_none());
    }

    #[test]
    fn compute_sma_converges_to_a_flat_series_value() {
        let series = flat_series(20, 100.0);
        let params = serde_json::json!({"period": 10});
        match compute(&series, "sma", &params, 0).unwrap() {
            IndicatorOutput::Value(v) => assert!((v - 100.0).abs() < 1e-9),
            other => panic!("expected a scalar value, got {other:?}"),
        }
    }

    #[test]
    fn compute_supports_the_history_offset() {
        let mut series = flat_series(20, 100.0);
        series.push(candle(20, 200.0));
        let params = serde_json::json!({"period": 5});

        let latest = match compute(&series, "sma", &params, 0).unwrap() {
            IndicatorOutput::Value(v) => v,
            other => panic!("expected a scalar value, got {other:?}"),
        };
        let one_back = match compute(&series, "sma", &params, 1).unwrap() {
            IndicatorOutput::Value(v) => v,
            other => panic!("expected a scalar value, got {other:?}"),
        };
        assert!(latest > one_back);
    }

    #[test]
    fn compute_bollinger_bands_straddle_the_mean() {
        let series = flat_series(25, 100.0);
        let params = serde_json::json!({"period": 20, "deviation": 2.0});
        match compute(&series, "bollinger", &params, 0).unwrap() {
            IndicatorOutput::Bollinger { upper, middle, lower } => {
                assert_eq!(middle, 100.0);
                assert_eq!(upper, 100.0);
                assert_eq!(lower, 100.0);
            }
            other => panic!("expected a Bollinger record, got {other:?}"),
        }
    }

    #[test]
    fn compute_macd_and_stochastic_return_their_record_shapes() {
        let mut series = Vec::new();
        for i in 0..60 {
            series.push(candle(i, 100.0 + (i as f64) * 0.5));
        }
        let macd_params = serde_json::json!({});
        match compute(&series, "macd", &macd_params, 0).unwrap() {
            IndicatorOutput::Macd { histogram, .. } => assert!(histogram.is_finite()),
            other => panic!("expected a MACD record, got {other:?}"),
        }

        let stoch_params = serde_json::json!({"k_period": 14, "d_period": 3});
        match compute(&series, "stochastic", &stoch_params, 0).unwrap() {
            IndicatorOutput::Stochastic { k, d } => {
                assert!((0.0..=100.0).contains(&k));
                assert!((0.0..=100.0).contains(&d));
            }
            other => panic!("expected a stochastic record, got {other:?}"),
        }
    }

    #[test]
    fn compute_vwap_and_volume_sma_use_candle_volume() {
        let series: Vec<Candle> =
            (0..10i64).map(|i| Candle::new(i, dec!(100), dec!(100), dec!(100), dec!(100), dec!(1))).collect();
        let vwap = compute(&series, "vwap", &serde_json::json!({}), 0).unwrap();
        let volume_sma = compute(&series, "volume_sma", &serde_json::json!({"period": 5}), 0).unwrap();
        match (vwap, volume_sma) {
            (IndicatorOutput::Value(v), IndicatorOutput::Value(vs)) => {
                assert!((v - 100.0).abs() < 1e-9);
                assert!((vs - 1.0).abs() < 1e-9);
            }
            _ => panic!("expected scalar values"),
        }
    }

    #[test]
    fn compute_unknown_indicator_name_returns_null() {
        let series = flat_series(30, 100.0);
        assert!(compute(&series, "not_a_real_indicator", &serde_json::json!({}), 0).is_none());
    }
}
