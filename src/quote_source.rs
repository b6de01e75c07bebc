use crate::api::{CryptoAsset, Price};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait QuoteSource {
    /// Spot price in USD for a ticker symbol.
    async fn fetch_price(&self, symbol: &str) -> Result<Price>;
    async fn list_assets(&self) -> Result<Vec<CryptoAsset>>;
}

/// Replays a scripted sequence of quotes. `None` entries fail the fetch.
/// Once the script runs dry the last good price is repeated.
#[derive(Debug, Clone)]
pub struct TestQuoteSource {
    script: Arc<Mutex<VecDeque<Option<Price>>>>,
    last: Arc<Mutex<Price>>,
}
impl Default for TestQuoteSource {
    fn default() -> Self {
        Self::new(vec![])
    }
}
impl TestQuoteSource {
    pub fn new(script: Vec<Option<Price>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            last: Arc::new(Mutex::new(100.0)),
        }
    }
    pub fn push(&self, quote: Option<Price>) -> Result<()> {
        self.script
            .lock()
            .map_err(|_| anyhow!("quote script lock poisoned"))?
            .push_back(quote);
        Ok(())
    }
}
#[async_trait]
impl QuoteSource for TestQuoteSource {
    async fn fetch_price(&self, symbol: &str) -> Result<Price> {
        let next = self
            .script
            .lock()
            .map_err(|_| anyhow!("quote script lock poisoned"))?
            .pop_front();
        let mut last = self
            .last
            .lock()
            .map_err(|_| anyhow!("last quote lock poisoned"))?;
        match next {
            Some(Some(price)) => {
                *last = price;
                Ok(price)
            }
            Some(None) => bail!("scripted quote failure for {}", symbol),
            None => Ok(*last),
        }
    }
    async fn list_assets(&self) -> Result<Vec<CryptoAsset>> {
        Ok(vec![
            CryptoAsset {
                id: "bitcoin".into(),
                name: "Bitcoin".into(),
                symbol: "btc".into(),
                image: None,
            },
            CryptoAsset {
                id: "ethereum".into(),
                name: "Ethereum".into(),
                symbol: "eth".into(),
                image: None,
            },
        ])
    }
}
