//! Configuration (§2/§6): a two-layer scheme — a YAML file hierarchy for
//! topology and risk parameters, with exchange credentials supplied only
//! through environment variables, never in the YAML tree itself.

mod yaml;

pub use yaml::{ExchangeDocument, RawConfig, RiskDocument};

use crate::domain::risk::state::RiskLimits;
use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Simulate,
    Live,
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulate" | "paper" => Ok(Mode::Simulate),
            "live" => Ok(Mode::Live),
            other => bail!("invalid mode '{other}': must be 'simulate' or 'live'"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub name: String,
    pub candle_interval_seconds: u32,
    pub products: Vec<ProductConfig>,
}

#[derive(Debug, Clone)]
pub struct ProductConfig {
    pub id: String,
    pub asset_type: crate::domain::instrument::AssetType,
    pub quote_type: String,
    pub lot_size: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub primary_exchange: String,
    pub candle_interval_seconds: u32,
    pub exchanges: Vec<ExchangeConfig>,
    pub risk_limits: RiskLimits,
    pub database_url: String,
    pub risk_state_path: std::path::PathBuf,
    pub redis_url: Option<String>,
    pub http_bind_address: String,
    pub http_port: u16,
    pub trade_lots: i64,

    // Secrets-only override layer, never read from YAML.
    pub binance_api_key: String,
    pub binance_api_secret: String,
}

impl Config {
    /// Loads the root YAML document at `path`, resolves its subordinate
    /// exchange/risk documents relative to the root's directory, and layers
    /// credentials on top from the environment (`dotenvy`-loaded first, per
    /// the teacher's convention).
    pub fn load(path: impl AsRef<Path>, primary_exchange: &str, mode: Mode) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = path.as_ref();
        let root_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let raw = RawConfig::load(path).context("failed to load root configuration")?;

        let risk_doc = raw
            .risk
            .resolve(root_dir)
            .context("failed to load risk configuration")?;

        let exchanges = raw
            .exchanges
            .iter()
            .map(|e| e.resolve(root_dir, raw.candle_interval))
            .collect::<Result<Vec<_>>>()
            .context("failed to resolve exchange configuration")?;

        if !exchanges.iter().any(|e| e.name == primary_exchange) {
            bail!("primary exchange '{primary_exchange}' not present in configuration");
        }

        let risk_limits = RiskLimits {
            max_daily_loss_abs: Decimal::from_f64(risk_doc.max_daily_loss).unwrap_or_default(),
            max_daily_loss_pct: Decimal::from_f64(risk_doc.max_daily_loss_percent).unwrap_or_default(),
            max_position_size_lots: risk_doc.max_position_size,
            max_open_positions: risk_doc.max_open_positions,
            starting_capital: Decimal::from_f64(risk_doc.starting_capital).unwrap_or_default(),
        };

        Ok(Self {
            mode,
            primary_exchange: primary_exchange.to_string(),
            candle_interval_seconds: raw.candle_interval,
            exchanges,
            risk_limits,
            database_url: raw.cache_db.database_url(),
            risk_state_path: raw.cache_db.risk_state_path(),
            redis_url: raw.cache_db.redis.as_ref().filter(|r| r.enabled).map(|r| format!("redis://{}:{}/{}", r.host, r.port, r.db)),
            http_bind_address: raw.http.as_ref().map(|h| h.bind_address.clone()).unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: raw.http.as_ref().map(|h| h.port).unwrap_or(9090),
            trade_lots: raw.trade_lots.unwrap_or(1),
            binance_api_key: std::env::var("BINANCE_API_KEY").unwrap_or_default(),
            binance_api_secret: std::env::var("BINANCE_API_SECRET").unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_accepts_simulate_and_live() {
        assert_eq!("simulate".parse::<Mode>().unwrap(), Mode::Simulate);
        assert_eq!("LIVE".parse::<Mode>().unwrap(), Mode::Live);
        assert!("bogus".parse::<Mode>().is_err());
    }
}
