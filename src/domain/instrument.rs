//! Instrument identity — the `(venue, product_id)` key shared by every
//! per-market component (Candle Store, Risk Gate, Market Engine).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Crypto,
    Stock,
    Forex,
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetType::Crypto => "crypto",
            AssetType::Stock => "stock",
            AssetType::Forex => "forex",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub venue: String,
    pub product_id: String,
    pub asset_type: AssetType,
    pub quote_type: String,
    /// Venue-defined minimum tradeable unit multiplier. Must be >= 1.
    pub lot_size: u32,
    pub candle_interval_seconds: u32,
}

impl Instrument {
    pub fn new(
        venue: impl Into<String>,
        product_id: impl Into<String>,
        asset_type: AssetType,
        quote_type: impl Into<String>,
        lot_size: u32,
        candle_interval_seconds: u32,
    ) -> Self {
        Self {
            venue: venue.into(),
            product_id: product_id.into(),
            asset_type,
            quote_type: quote_type.into(),
            lot_size: lot_size.max(1),
            candle_interval_seconds,
        }
    }

    /// The `"{venue}:{product_id}"` routing/log/metric key, matching the
    /// original exchange client's `"%s-%s"` convention.
    pub fn market_key(&self) -> String {
        format!("{}:{}", self.venue, self.product_id)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.market_key())
    }
}

/// Broker-reported metadata for a tradable product, per the Exchange Adapter
/// `products()` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInfo {
    pub id: String,
    pub symbol: String,
    pub display_name: String,
    pub asset_type: AssetType,
    pub quote_type: String,
    pub lot_size: u32,
    pub venue: String,
}
