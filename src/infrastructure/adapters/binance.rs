//! Binance connector implementing the `ExchangeAdapter` contract (C6).
//! REST signing and the websocket reconnect loop are carried over from the
//! teacher's market-data/execution/websocket trio; both halves are unified
//! behind the one adapter trait the Market Engine drives.

use crate::domain::candle::Candle;
use crate::domain::instrument::{Instrument, ProductInfo};
use crate::domain::order::{Order, OrderSide, OrderType, normalize_order_status};
use crate::domain::ports::{BalanceInfo, ExchangeAdapter, MarketMessage, TradeRequest};
use crate::infrastructure::core::circuit_breaker::CircuitBreaker;
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use sha2::Sha256;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const REST_BASE: &str = "https://api.binance.com";
const WS_BASE: &str = "wss://stream.binance.com:9443/ws";

pub struct BinanceAdapter {
    client: ClientWithMiddleware,
    circuit_breaker: Arc<CircuitBreaker>,
    api_key: String,
    api_secret: String,
}

impl BinanceAdapter {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            circuit_breaker: Arc::new(CircuitBreaker::new("binance", 5, 2, Duration::from_secs(30))),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    fn sign_query(&self, query: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.api_secret.as_bytes())
            .context("invalid Binance API secret")?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn timestamp_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    async fn signed_request(&self, method: reqwest::Method, path: &str, mut params: Vec<(String, String)>) -> Result<serde_json::Value> {
        params.push(("timestamp".into(), Self::timestamp_ms().to_string()));
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign_query(&query)?;
        let url = format!("{REST_BASE}{path}?{query}&signature={signature}");

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let response = self
            .circuit_breaker
            .call(|| async {
                client
                    .request(method.clone(), &url)
                    .header("X-MBX-APIKEY", &api_key)
                    .send()
                    .await
            })
            .await
            .map_err(|e| anyhow::anyhow!("binance request failed: {e}"))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.context("invalid Binance JSON response")?;
        if !status.is_success() {
            bail!("binance error {status}: {body}");
        }
        Ok(body)
    }

    fn symbol_for(instrument: &Instrument) -> String {
        instrument.product_id.replace('-', "").replace('/', "").to_uppercase()
    }

    fn parse_order(instrument: &Instrument, body: &serde_json::Value) -> Result<Order> {
        let id = body["orderId"].as_i64().map(|n| n.to_string()).unwrap_or_default();
        let side = if body["side"].as_str() == Some("SELL") {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let order_type = if body["type"].as_str() == Some("LIMIT") {
            OrderType::Limit
        } else {
            OrderType::Market
        };
        let native_status = body["status"].as_str().unwrap_or("NEW");
        let status = normalize_order_status(native_status)?;
        let request_size = Decimal::from_str(body["origQty"].as_str().unwrap_or("0")).unwrap_or_default();
        let filled_size = Decimal::from_str(body["executedQty"].as_str().unwrap_or("0")).unwrap_or_default();
        let price = Decimal::from_str(body["price"].as_str().unwrap_or("0")).unwrap_or_default();
        let now = Self::timestamp_ms();

        let mut order = Order::new(id, instrument.market_key(), side, order_type, request_size, price, now);
        order.filled_size = filled_size;
        order.remaining_size = request_size - filled_size;
        order.status = status;
        Ok(order)
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    async fn init(&self, _primary: bool) -> Result<()> {
        self.client
            .get(format!("{REST_BASE}/api/v3/ping"))
            .send()
            .await
            .context("binance ping failed")?;
        Ok(())
    }

    async fn products(&self) -> Result<Vec<ProductInfo>> {
        let body: serde_json::Value = self
            .client
            .get(format!("{REST_BASE}/api/v3/exchangeInfo"))
            .send()
            .await
            .context("fetching exchangeInfo failed")?
            .json()
            .await
            .context("invalid exchangeInfo JSON")?;

        let symbols = body["symbols"].as_array().cloned().unwrap_or_default();
        let products = symbols
            .into_iter()
            .filter(|s| s["status"].as_str() == Some("TRADING"))
            .map(|s| {
                let symbol = s["symbol"].as_str().unwrap_or_default().to_string();
                let base = s["baseAsset"].as_str().unwrap_or_default().to_string();
                let quote = s["quoteAsset"].as_str().unwrap_or_default().to_string();
                ProductInfo {
                    id: symbol.clone(),
                    symbol: symbol.clone(),
                    display_name: format!("{base}/{quote}"),
                    asset_type: crate::domain::instrument::AssetType::Crypto,
                    quote_type: quote,
                    lot_size: 1,
                    venue: "binance".to_string(),
                }
            })
            .collect();
        Ok(products)
    }

    async fn accounts(&self) -> Result<HashMap<String, BalanceInfo>> {
        let body = self.signed_request(reqwest::Method::GET, "/api/v3/account", Vec::new()).await?;
        let balances = body["balances"].as_array().cloned().unwrap_or_default();

        let mut out = HashMap::new();
        for b in balances {
            let asset = b["asset"].as_str().unwrap_or_default().to_string();
            let free = Decimal::from_str(b["free"].as_str().unwrap_or("0")).unwrap_or_default();
            let locked = Decimal::from_str(b["locked"].as_str().unwrap_or("0")).unwrap_or_default();
            if free.is_zero() && locked.is_zero() {
                continue;
            }
            out.insert(asset, BalanceInfo { free, locked });
        }
        Ok(out)
    }

    async fn market_init(&self, instrument: &Instrument) -> Result<mpsc::Receiver<MarketMessage>> {
        let (tx, rx) = mpsc::channel(1024);
        let symbol = Self::symbol_for(instrument).to_lowercase();
        let stream_url = format!("{WS_BASE}/{symbol}@trade");

        tokio::spawn(async move {
            loop {
                match tokio_tungstenite::connect_async(&stream_url).await {
                    Ok((ws_stream, _)) => {
                        use futures_util::StreamExt;
                        let (_, mut read) = ws_stream.split();
                        while let Some(msg) = read.next().await {
                            let Ok(WsMessage::Text(text)) = msg else { continue };
                            let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
                            let (Some(price), Some(qty), Some(ts)) = (
                                value["p"].as_str().and_then(|s| Decimal::from_str(s).ok()),
                                value["q"].as_str().and_then(|s| Decimal::from_str(s).ok()),
                                value["T"].as_i64(),
                            ) else {
                                continue;
                            };
                            let sent = tx
                                .send(MarketMessage::Trade { price, quantity: qty, timestamp: ts })
                                .await;
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "binance websocket connect failed, retrying");
                    }
                }
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });

        Ok(rx)
    }

    async fn get_historic_rates(
        &self,
        instrument: &Instrument,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let symbol = Self::symbol_for(instrument);
        let mut url = format!(
            "{REST_BASE}/api/v3/klines?symbol={symbol}&interval=1m&limit=1000",
        );
        if let Some(s) = start {
            url.push_str(&format!("&startTime={}", s * 1000));
        }
        if let Some(e) = end {
            url.push_str(&format!("&endTime={}", e * 1000));
        }

        let body: Vec<serde_json::Value> = self
            .client
            .get(url)
            .send()
            .await
            .context("klines request failed")?
            .json()
            .await
            .context("invalid klines JSON")?;

        let candles = body
            .into_iter()
            .filter_map(|k| {
                let arr = k.as_array()?;
                Some(Candle::new(
                    arr.first()?.as_i64()? / 1000,
                    Decimal::from_str(arr.get(1)?.as_str()?).ok()?,
                    Decimal::from_str(arr.get(2)?.as_str()?).ok()?,
                    Decimal::from_str(arr.get(3)?.as_str()?).ok()?,
                    Decimal::from_str(arr.get(4)?.as_str()?).ok()?,
                    Decimal::from_str(arr.get(5)?.as_str()?).ok()?,
                ))
            })
            .collect();
        Ok(candles)
    }

    async fn buy(&self, request: TradeRequest) -> Result<Option<Order>> {
        self.place_order(request, OrderSide::Buy).await
    }

    async fn sell(&self, request: TradeRequest) -> Result<Option<Order>> {
        self.place_order(request, OrderSide::Sell).await
    }

    async fn get_order(&self, instrument: &Instrument, id: &str) -> Result<Option<Order>> {
        let symbol = Self::symbol_for(instrument);
        let params = vec![("symbol".into(), symbol), ("orderId".into(), id.into())];
        let body = self.signed_request(reqwest::Method::GET, "/api/v3/order", params).await?;
        Ok(Some(Self::parse_order(instrument, &body)?))
    }

    async fn cancel_order(&self, instrument: &Instrument, id: &str) -> Result<bool> {
        let symbol = Self::symbol_for(instrument);
        let params = vec![("symbol".into(), symbol), ("orderId".into(), id.into())];
        self.signed_request(reqwest::Method::DELETE, "/api/v3/order", params).await?;
        Ok(true)
    }

    async fn cancel_all(&self, instrument: &Instrument) -> Result<bool> {
        let symbol = Self::symbol_for(instrument);
        let params = vec![("symbol".into(), symbol)];
        self.signed_request(reqwest::Method::DELETE, "/api/v3/openOrders", params).await?;
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl BinanceAdapter {
    async fn place_order(&self, request: TradeRequest, side: OrderSide) -> Result<Option<Order>> {
        let symbol = Self::symbol_for(&request.instrument);
        let mut params = vec![
            ("symbol".into(), symbol),
            ("side".into(), side.to_string().to_uppercase()),
            ("type".into(), match request.order_type {
                OrderType::Market => "MARKET".to_string(),
                OrderType::Limit => "LIMIT".to_string(),
            }),
            ("quantity".into(), request.lots.to_string()),
        ];
        if let Some(price) = request.limit_price {
            params.push(("price".into(), price.to_string()));
            params.push(("timeInForce".into(), "GTC".into()));
        }

        let body = self.signed_request(reqwest::Method::POST, "/api/v3/order", params).await?;
        Ok(Some(Self::parse_order(&request.instrument, &body)?))
    }
}
