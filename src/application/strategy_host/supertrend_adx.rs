//! Supertrend + ADX with an ATR trailing stop, carried over from the
//! reference trend-following strategy: Supertrend sets entry/exit
//! direction, ADX gates conviction on trend strength, and a trailing stop
//! forces an exit independent of either.

use super::TradingStrategy;
use crate::domain::candle::Candle;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone)]
pub struct SupertrendAdxStrategy {
    pub period: usize,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub trailing_atr_multiplier: f64,

    final_upper_band: Option<f64>,
    final_lower_band: Option<f64>,
    direction: i8,
    entry_price: Option<f64>,
    trailing_sl: Option<f64>,

    atr_smoothed: f64,
    adx_smoothed_plus_dm: f64,
    adx_smoothed_minus_dm: f64,
    adx_smoothed_tr: f64,
    adx_value: f64,
    seen: usize,
}

impl SupertrendAdxStrategy {
    pub fn new(
        period: usize,
        atr_period: usize,
        atr_multiplier: f64,
        adx_period: usize,
        adx_threshold: f64,
        trailing_atr_multiplier: f64,
    ) -> Self {
        Self {
            period,
            atr_period,
            atr_multiplier,
            adx_period,
            adx_threshold,
            trailing_atr_multiplier,
            final_upper_band: None,
            final_lower_band: None,
            direction: 0,
            entry_price: None,
            trailing_sl: None,
            atr_smoothed: 0.0,
            adx_smoothed_plus_dm: 0.0,
            adx_smoothed_minus_dm: 0.0,
            adx_smoothed_tr: 0.0,
            adx_value: 0.0,
            seen: 0,
        }
    }

    fn update_atr_and_adx(&mut self, prev: &Candle, cur: &Candle) -> (f64, f64) {
        let (ph, pl, pc) = (
            prev.high.to_f64().unwrap_or(0.0),
            prev.low.to_f64().unwrap_or(0.0),
            prev.close.to_f64().unwrap_or(0.0),
        );
        let (h, l, c) = (
            cur.high.to_f64().unwrap_or(0.0),
            cur.low.to_f64().unwrap_or(0.0),
            cur.close.to_f64().unwrap_or(0.0),
        );

        let tr = (h - l).max((h - pc).abs()).max((l - pc).abs());
        let n_atr = self.atr_period as f64;
        self.atr_smoothed = if self.seen == 0 { tr } else { self.atr_smoothed - (self.atr_smoothed / n_atr) + tr };

        let up_move = h - ph;
        let down_move = pl - l;
        let plus_dm = if up_move > down_move && up_move > 0.0 { up_move } else { 0.0 };
        let minus_dm = if down_move > up_move && down_move > 0.0 { down_move } else { 0.0 };

        let n_adx = self.adx_period as f64;
        self.adx_smoothed_plus_dm = self.adx_smoothed_plus_dm - (self.adx_smoothed_plus_dm / n_adx) + plus_dm;
        self.adx_smoothed_minus_dm = self.adx_smoothed_minus_dm - (self.adx_smoothed_minus_dm / n_adx) + minus_dm;
        self.adx_smoothed_tr = self.adx_smoothed_tr - (self.adx_smoothed_tr / n_adx) + tr;

        let plus_di = if self.adx_smoothed_tr > 0.0 { 100.0 * self.adx_smoothed_plus_dm / self.adx_smoothed_tr } else { 0.0 };
        let minus_di = if self.adx_smoothed_tr > 0.0 { 100.0 * self.adx_smoothed_minus_dm / self.adx_smoothed_tr } else { 0.0 };
        let dx = if plus_di + minus_di > 0.0 { 100.0 * (plus_di - minus_di).abs() / (plus_di + minus_di) } else { 0.0 };
        self.adx_value = if self.seen <= self.adx_period { dx } else { ((self.adx_value * (n_adx - 1.0)) + dx) / n_adx };

        let _ = c;
        (self.atr_smoothed, self.adx_value)
    }

    fn update_supertrend(&mut self, prev_close: Option<f64>, cur: &Candle, atr: f64) -> i8 {
        let h = cur.high.to_f64().unwrap_or(0.0);
        let l = cur.low.to_f64().unwrap_or(0.0);
        let close = cur.close.to_f64().unwrap_or(0.0);

        let hl_avg = (h + l) / 2.0;
        let basic_upper = hl_avg + self.atr_multiplier * atr;
        let basic_lower = hl_avg - self.atr_multiplier * atr;

        let final_upper = match (self.final_upper_band, prev_close) {
            (Some(prev_upper), Some(pc)) if basic_upper < prev_upper || pc > prev_upper => basic_upper,
            (Some(prev_upper), _) => prev_upper,
            (None, _) => basic_upper,
        };
        let final_lower = match (self.final_lower_band, prev_close) {
            (Some(prev_lower), Some(pc)) if basic_lower > prev_lower || pc < prev_lower => basic_lower,
            (Some(prev_lower), _) => prev_lower,
            (None, _) => basic_lower,
        };

        self.final_upper_band = Some(final_upper);
        self.final_lower_band = Some(final_lower);

        let direction = if close <= final_upper { -1 } else { 1 };
        direction
    }

    fn update_trailing_sl(&mut self, current_price: f64, atr: f64) {
        if self.entry_price.is_none() {
            return;
        }
        let new_sl = current_price - atr * self.trailing_atr_multiplier;
        match self.trailing_sl {
            Some(sl) if new_sl > sl => self.trailing_sl = Some(new_sl),
            None => self.trailing_sl = Some(new_sl),
            _ => {}
        }
    }
}

impl TradingStrategy for SupertrendAdxStrategy {
    fn warmup(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "supertrend_adx"
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "period": self.period,
            "atr_period": self.atr_period,
            "atr_multiplier": self.atr_multiplier,
            "adx_period": self.adx_period,
            "adx_threshold": self.adx_threshold,
            "trailing_atr_multiplier": self.trailing_atr_multiplier,
        })
    }

    fn indicators(&self) -> Vec<&'static str> {
        vec!["supertrend", "adx", "atr"]
    }

    fn generate_signal(&mut self, candles: &[Candle]) -> i8 {
        if candles.len() < self.atr_period + 1 {
            return 0;
        }

        let prev_direction = self.direction;
        let cur = &candles[candles.len() - 1];
        let prev = &candles[candles.len() - 2];
        let prev_close = prev.close.to_f64().ok();

        let (atr, adx) = self.update_atr_and_adx(prev, cur);
        let direction = self.update_supertrend(prev_close, cur, atr);
        self.direction = direction;

        let current_price = cur.close.to_f64().unwrap_or(0.0);
        self.update_trailing_sl(current_price, atr);
        self.seen += 1;

        if let Some(sl) = self.trailing_sl
            && current_price <= sl
        {
            self.entry_price = None;
            self.trailing_sl = None;
            return -3;
        }

        if direction == 1 && prev_direction != 1 {
            self.entry_price = Some(current_price);
            return if adx >= self.adx_threshold { 3 } else { 2 };
        }
        if direction == 1 && current_price > self.final_lower_band.unwrap_or(current_price) && adx >= self.adx_threshold * 1.2 {
            return 1;
        }

        if direction == -1 && prev_direction != -1 {
            self.entry_price = None;
            self.trailing_sl = None;
            return if adx >= self.adx_threshold { -3 } else { -2 };
        }
        if direction == -1 && current_price < self.final_upper_band.unwrap_or(current_price) && adx >= self.adx_threshold * 1.2 {
            return -1;
        }

        0
    }
}
