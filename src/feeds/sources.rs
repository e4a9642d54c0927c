use crate::errors::{EngineError, EngineResult};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;

/// One upstream spot-price provider. Each source handles its own network,
/// status and schema failures and reports them as `EngineError::Provider`.
/// Send + Sync required so the feed can be shared with the polling task.
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, EngineResult<f64>>;
}

// Binance ticker response format:
// { "symbol": "ETHUSDT", "price": "2501.37000000" }

#[derive(serde::Deserialize)]
struct BinanceTicker {
    price: Option<String>,
}

/// Binance public REST ticker (primary).
pub struct BinanceSource {
    url: String,
}

impl BinanceSource {
    pub const NAME: &'static str = "binance";

    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl PriceSource for BinanceSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fetch<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, EngineResult<f64>> {
        async move {
            let body = get_body(client, &self.url, Self::NAME).await?;
            parse_binance(&body)
        }
        .boxed()
    }
}

/// Extract the price from a Binance ticker body. The price is a decimal string.
pub fn parse_binance(body: &str) -> EngineResult<f64> {
    let ticker: BinanceTicker = serde_json::from_str(body)
        .map_err(|e| EngineError::provider(BinanceSource::NAME, format!("parse: {e}")))?;

    let price_str = ticker
        .price
        .ok_or_else(|| EngineError::provider(BinanceSource::NAME, "no price field in response"))?;

    let price: f64 = price_str.trim().parse().map_err(|_| {
        EngineError::provider(BinanceSource::NAME, format!("invalid price string: {price_str}"))
    })?;

    check_price(BinanceSource::NAME, price)
}

// CryptoCompare single-price response format:
// { "USD": 2501.37 }
// On error it returns { "Response": "Error", "Message": "..." } with HTTP 200.

#[derive(serde::Deserialize)]
struct CryptoComparePrice {
    #[serde(rename = "USD")]
    usd: Option<f64>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// CryptoCompare min-api (secondary).
pub struct CryptoCompareSource {
    url: String,
}

impl CryptoCompareSource {
    pub const NAME: &'static str = "cryptocompare";

    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl PriceSource for CryptoCompareSource {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fetch<'a>(&'a self, client: &'a Client) -> BoxFuture<'a, EngineResult<f64>> {
        async move {
            let body = get_body(client, &self.url, Self::NAME).await?;
            parse_cryptocompare(&body)
        }
        .boxed()
    }
}

/// Extract the USD price from a CryptoCompare body. The price is a JSON number.
pub fn parse_cryptocompare(body: &str) -> EngineResult<f64> {
    let data: CryptoComparePrice = serde_json::from_str(body)
        .map_err(|e| EngineError::provider(CryptoCompareSource::NAME, format!("parse: {e}")))?;

    let price = match (data.usd, data.message) {
        (Some(p), _) => p,
        (None, Some(msg)) => return Err(EngineError::provider(CryptoCompareSource::NAME, msg)),
        (None, None) => {
            return Err(EngineError::provider(CryptoCompareSource::NAME, "no USD field in response"))
        }
    };

    check_price(CryptoCompareSource::NAME, price)
}

/// GET a URL and return the body, mapping transport errors and non-2xx
/// statuses to a provider failure.
async fn get_body(client: &Client, url: &str, source_name: &'static str) -> EngineResult<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| EngineError::provider(source_name, format!("request failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(EngineError::provider(source_name, format!("HTTP {status}: {body}")));
    }

    resp.text()
        .await
        .map_err(|e| EngineError::provider(source_name, format!("read body: {e}")))
}

#[inline]
fn check_price(source_name: &'static str, price: f64) -> EngineResult<f64> {
    if price <= 0.0 || !price.is_finite() {
        return Err(EngineError::provider(source_name, format!("invalid price: {price}")));
    }
    Ok(price)
}
