use crate::{
    api::{CryptoAsset, Price},
    quote_source::QuoteSource,
};
use anyhow::Result;

use super::client::CryptoCompareClient;

pub struct CryptoCompareQuoteSource {
    client: CryptoCompareClient,
}
impl CryptoCompareQuoteSource {
    pub fn new(client: CryptoCompareClient) -> Self {
        Self { client }
    }
}
#[async_trait::async_trait]
impl QuoteSource for CryptoCompareQuoteSource {
    async fn fetch_price(&self, symbol: &str) -> Result<Price> {
        self.client.price(symbol).await
    }
    async fn list_assets(&self) -> Result<Vec<CryptoAsset>> {
        self.client.assets().await
    }
}
