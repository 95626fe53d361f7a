//! Root/subordinate YAML document shapes (§6), deserialized with
//! `serde_yaml` and resolved relative to the root file's directory.

use crate::config::{ExchangeConfig, ProductConfig};
use crate::domain::instrument::AssetType;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub exchanges: Vec<ExchangeDocument>,
    pub cache_db: CacheDbDocument,
    pub risk: RiskRef,
    pub candle_interval: u32,
    #[serde(default)]
    pub backfill: Option<BackfillDocument>,
    #[serde(default)]
    pub http: Option<HttpDocument>,
    #[serde(default)]
    pub trade_lots: Option<i64>,
}

impl RawConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
pub struct BackfillDocument {
    pub enabled: bool,
    pub period: u32,
}

#[derive(Debug, Deserialize)]
pub struct HttpDocument {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    9090
}

#[derive(Debug, Deserialize)]
pub struct ExchangeDocument {
    pub name: String,
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub candle_interval: Option<u32>,
    #[serde(default)]
    pub products: Vec<ProductDocument>,
    #[serde(default)]
    pub backfill: Option<BackfillDocument>,
}

impl ExchangeDocument {
    pub fn resolve(&self, root_dir: &Path, default_interval: u32) -> Result<ExchangeConfig> {
        let products = self
            .products
            .iter()
            .map(ProductDocument::resolve)
            .collect::<Result<Vec<_>>>()?;

        Ok(ExchangeConfig {
            name: self.name.clone(),
            candle_interval_seconds: self.candle_interval.unwrap_or(default_interval),
            products,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductDocument {
    pub id: String,
    pub asset_type: String,
    pub quote_type: String,
    #[serde(default)]
    pub lot_size: Option<u32>,
    #[serde(default)]
    pub product_type: Option<String>,
}

impl ProductDocument {
    fn resolve(&self) -> Result<ProductConfig> {
        let asset_type = match self.asset_type.to_lowercase().as_str() {
            "crypto" => AssetType::Crypto,
            "stock" => AssetType::Stock,
            "forex" => AssetType::Forex,
            other => anyhow::bail!("unknown asset_type '{other}' for product '{}'", self.id),
        };
        Ok(ProductConfig {
            id: self.id.clone(),
            asset_type,
            quote_type: self.quote_type.clone(),
            lot_size: self.lot_size.unwrap_or(1),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheDbDocument {
    #[serde(default)]
    pub influxdb: Option<InfluxDbDocument>,
    #[serde(default)]
    pub redis: Option<RedisDocument>,
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
    #[serde(default)]
    pub risk_state_path: Option<PathBuf>,
}

impl CacheDbDocument {
    /// `influxdb` is named in spec.md §6 but no InfluxDB client exists in
    /// the corpus; when it is absent or disabled, SQLite is the single
    /// authoritative cold store, resolved explicitly rather than silently.
    pub fn database_url(&self) -> String {
        match &self.sqlite_path {
            Some(path) => format!("sqlite://{}", path.display()),
            None => "sqlite://data/rustrade.db".to_string(),
        }
    }

    pub fn risk_state_path(&self) -> PathBuf {
        self.risk_state_path.clone().unwrap_or_else(|| PathBuf::from("data/risk_state.json"))
    }
}

#[derive(Debug, Deserialize)]
pub struct InfluxDbDocument {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct RedisDocument {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default)]
    pub enabled: bool,
}

/// The root `risk` key is itself a pointer to a subordinate document,
/// matching the `{config: path}` shape used for exchange credentials.
#[derive(Debug, Deserialize)]
pub struct RiskRef {
    pub config: PathBuf,
}

impl RiskRef {
    pub fn resolve(&self, root_dir: &Path) -> Result<RiskDocument> {
        let path = root_dir.join(&self.config);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read risk config file {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("failed to parse risk config file {}", path.display()))
    }
}

#[derive(Debug, Deserialize)]
pub struct RiskDocument {
    pub max_daily_loss: f64,
    pub max_daily_loss_percent: f64,
    pub max_position_size: i64,
    pub max_open_positions: usize,
    pub starting_capital: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_document_rejects_unknown_asset_type() {
        let doc = ProductDocument {
            id: "X".into(),
            asset_type: "nonsense".into(),
            quote_type: "USDT".into(),
            lot_size: None,
            product_type: None,
        };
        assert!(doc.resolve().is_err());
    }

    #[test]
    fn cache_db_falls_back_to_sqlite_when_influxdb_unset() {
        let doc = CacheDbDocument { influxdb: None, redis: None, sqlite_path: None, risk_state_path: None };
        assert_eq!(doc.database_url(), "sqlite://data/rustrade.db");
    }
}
