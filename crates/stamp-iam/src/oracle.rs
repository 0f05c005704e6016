//! HTTP ETH/USD price oracle

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;
use stamp_attest::PriceOracle;
use stamp_common::{Result, StampError};
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceResponse {
    usd_price: serde_json::Number,
}

/// Oracle answering `GET <url>` with `{"usdPrice": <number>}`
#[derive(Debug, Clone)]
pub struct HttpPriceOracle {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpPriceOracle {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StampError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl PriceOracle for HttpPriceOracle {
    #[instrument(skip(self))]
    async fn eth_usd_price(&self) -> Result<Decimal> {
        let mut request = self.client.get(&self.url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StampError::Network(format!("price oracle: {}", e)))?;
        if !response.status().is_success() {
            return Err(StampError::Network(format!(
                "price oracle returned {}",
                response.status()
            )));
        }

        let body: PriceResponse = response
            .json()
            .await
            .map_err(|e| StampError::Serialization(format!("price oracle: {}", e)))?;
        parse_price(&body.usd_price)
    }
}

fn parse_price(number: &serde_json::Number) -> Result<Decimal> {
    Decimal::from_str(&number.to_string())
        .or_else(|_| Decimal::from_scientific(&number.to_string()))
        .map_err(|e| StampError::Serialization(format!("price oracle: {}", e)))
}
