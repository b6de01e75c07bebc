use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::trace;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{is_valid_price, CryptoAsset, Price};

pub const QUOTE_CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct CryptoCompareClient {
    client: Client,
    pub price_url: String,
    pub assets_url: String,
}

impl CryptoCompareClient {
    pub fn new(price_url: String, assets_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("couldn't build quote http client")?;
        Ok(Self {
            client,
            price_url,
            assets_url,
        })
    }
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        expexted_code: StatusCode,
    ) -> Result<Response> {
        let response = self.client.get(url).query(query).send().await?;
        crate::client::bail_if_err(response, expexted_code).await
    }
    pub async fn price(&self, symbol: &str) -> Result<Price> {
        let symbol = symbol.to_uppercase();
        let response = self
            .get(
                &self.price_url,
                &[
                    ("fsym", symbol.clone()),
                    ("tsyms", QUOTE_CURRENCY.to_string()),
                ],
                StatusCode::OK,
            )
            .await?;
        let body = response.json::<Value>().await?;
        let price = parse_price(&body, QUOTE_CURRENCY)?;
        trace!("Fetched price for {}: ${}", symbol, price);
        Ok(price)
    }
    pub async fn assets(&self) -> Result<Vec<CryptoAsset>> {
        let response = self
            .get(
                &self.assets_url,
                &[
                    ("vs_currency", QUOTE_CURRENCY.to_lowercase()),
                    ("order", "market_cap_desc".to_string()),
                    ("per_page", "100".to_string()),
                    ("page", "1".to_string()),
                    ("sparkline", "false".to_string()),
                ],
                StatusCode::OK,
            )
            .await?;
        let markets = response.json::<Vec<MarketResponse>>().await?;
        Ok(markets.into_iter().map(CryptoAsset::from).collect())
    }
}

/// Price endpoints answer `{"USD": 123.4}` on success and
/// `{"Response": "Error", "Message": "..."}` with a 200 status otherwise.
pub fn parse_price(body: &Value, currency: &str) -> Result<Price> {
    if let Some(price) = body.get(currency) {
        let price = price
            .as_f64()
            .ok_or(anyhow!("{} price is not a number: {}", currency, price))?;
        if !is_valid_price(price) {
            bail!("{} price out of range: {}", currency, price);
        }
        return Ok(price);
    }
    match body.get("Message").and_then(Value::as_str) {
        Some(message) => bail!("Price data not available: {}", message),
        None => bail!("Price data not available"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarketResponse {
    id: String,
    name: String,
    symbol: String,
    image: Option<String>,
}
impl From<MarketResponse> for CryptoAsset {
    fn from(market: MarketResponse) -> Self {
        Self {
            id: market.id,
            name: market.name,
            symbol: market.symbol,
            image: market.image,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_price_field() {
        let price = parse_price(&json!({"USD": 64123.5}), "USD").unwrap();
        assert_eq!(price, 64123.5);
    }

    #[test]
    fn missing_price_is_an_error() {
        let e = parse_price(
            &json!({"Response": "Error", "Message": "market does not exist for this coin pair (XYZ-USD)"}),
            "USD",
        )
        .unwrap_err();
        assert!(format!("{:#}", e).contains("XYZ-USD"));
        assert!(parse_price(&json!({}), "USD").is_err());
        assert!(parse_price(&json!({"USD": "cheap"}), "USD").is_err());
        assert!(parse_price(&json!({"USD": 1e29}), "USD").is_err());
        assert!(parse_price(&json!({"USD": -3.0}), "USD").is_err());
    }

    #[test]
    fn market_listing_maps_to_assets() {
        let markets: Vec<MarketResponse> = serde_json::from_value(json!([
            {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "image": "https://img/btc.png", "current_price": 1.0},
            {"id": "ethereum", "symbol": "eth", "name": "Ethereum", "image": null}
        ]))
        .unwrap();
        let assets: Vec<CryptoAsset> = markets.into_iter().map(CryptoAsset::from).collect();
        assert_eq!(assets[0].symbol, "btc");
        assert_eq!(assets[0].image.as_deref(), Some("https://img/btc.png"));
        assert_eq!(assets[1].image, None);
    }
}
