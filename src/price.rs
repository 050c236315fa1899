//! Bitcoin price lookup, used to convert USD guardrails into satoshis.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_TICKER_URL: &str = "https://blockchain.info/ticker";

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current USD price of one bitcoin.
    async fn bitcoin_price_usd(&self) -> anyhow::Result<f64>;
}

/// Blockchain.info ticker entry. The response maps currency codes to these.
#[derive(Debug, Deserialize)]
struct Ticker {
    last: f64,
}

/// Oracle backed by the blockchain.info ticker endpoint.
pub struct TickerOracle {
    url: String,
    client: reqwest::Client,
}

impl TickerOracle {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(TickerOracle { url, client })
    }
}

#[async_trait]
impl PriceOracle for TickerOracle {
    async fn bitcoin_price_usd(&self) -> anyhow::Result<f64> {
        let tickers: HashMap<String, Ticker> = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let usd = tickers
            .get("USD")
            .ok_or_else(|| anyhow::anyhow!("ticker response has no USD entry"))?;

        if usd.last <= 0.0 {
            anyhow::bail!("ticker returned non-positive USD price: {}", usd.last);
        }
        Ok(usd.last)
    }
}
