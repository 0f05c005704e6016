//! USD-pegged attestation fees
//!
//! The fee is a fixed USD amount converted to wei at the current ETH/USD
//! price. The price is cached in the shared key-value cache for a few minutes
//! and refreshed from an external oracle when stale. Pricing fails soft: an
//! oracle outage serves the last cached price, and a cache outage only costs
//! freshness.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use stamp_common::{AttestationError, KeyValueCache, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Cache key of the last known ETH price in USD
pub const ETH_PRICE_KEY: &str = "ethPrice";

/// Cache key of the epoch millis at which [`ETH_PRICE_KEY`] was written
pub const ETH_PRICE_UPDATED_KEY: &str = "ethPriceLastUpdate";

/// Price older than this is refreshed from the oracle
pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(5 * 60);

/// Cached prices outlive their freshness window so they can back an oracle outage
pub const PRICE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

const WEI_DECIMALS: u32 = 18;

/// ETH/USD price source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn eth_usd_price(&self) -> Result<Decimal>;
}

/// Cached ETH/USD price with oracle refresh
pub struct PriceFeed {
    cache: Arc<dyn KeyValueCache>,
    oracle: Arc<dyn PriceOracle>,
    ttl: Duration,
}

impl PriceFeed {
    pub fn new(cache: Arc<dyn KeyValueCache>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self {
            cache,
            oracle,
            ttl: DEFAULT_PRICE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Current ETH price in USD
    #[instrument(skip(self))]
    pub async fn eth_usd_price(&self) -> Result<Decimal> {
        let cached = self.read_cached().await;

        if let Some((price, updated_at)) = cached {
            let age_ms = Utc::now().timestamp_millis().saturating_sub(updated_at);
            if age_ms >= 0 && (age_ms as u128) < self.ttl.as_millis() {
                debug!(%price, age_ms, "ETH price cache hit");
                return Ok(price);
            }
        }

        match self.oracle.eth_usd_price().await {
            Ok(price) => {
                self.store(price).await;
                Ok(price)
            }
            Err(e) => match cached {
                Some((price, _)) => {
                    warn!(error = %e, %price, "Price oracle failed, serving stale ETH price");
                    Ok(price)
                }
                None => Err(AttestationError::PriceUnavailable(e.to_string()).into()),
            },
        }
    }

    /// Wei equivalent of a USD amount at the current price
    #[instrument(skip(self))]
    pub async fn fee_wei(&self, usd: Decimal) -> Result<u128> {
        let price = self.eth_usd_price().await?;
        Ok(usd_to_wei(usd, price)?)
    }

    async fn read_cached(&self) -> Option<(Decimal, i64)> {
        let price = self.read_key(ETH_PRICE_KEY).await?;
        let updated_at = self.read_key(ETH_PRICE_UPDATED_KEY).await?;

        match (Decimal::from_str(&price), updated_at.parse::<i64>()) {
            (Ok(price), Ok(updated_at)) => Some((price, updated_at)),
            _ => {
                warn!(price = %price, updated_at = %updated_at, "Ignoring unparseable cached ETH price");
                None
            }
        }
    }

    async fn read_key(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Price cache read failed");
                None
            }
        }
    }

    async fn store(&self, price: Decimal) {
        let now = Utc::now().timestamp_millis().to_string();
        for (key, value) in [(ETH_PRICE_KEY, price.to_string()), (ETH_PRICE_UPDATED_KEY, now)] {
            if let Err(e) = self.cache.set(key, &value, PRICE_RETENTION).await {
                warn!(key, error = %e, "Price cache write failed");
            }
        }
    }
}

/// `(usd / eth_price)` rounded to 18 decimals, expressed in wei
pub fn usd_to_wei(usd: Decimal, eth_price: Decimal) -> std::result::Result<u128, AttestationError> {
    if eth_price <= Decimal::ZERO {
        return Err(AttestationError::PriceUnavailable(format!(
            "non-positive ETH price {}",
            eth_price
        )));
    }

    usd.checked_div(eth_price)
        .map(|eth| eth.round_dp(WEI_DECIMALS))
        .and_then(|eth| eth.checked_mul(Decimal::from(10u64.pow(WEI_DECIMALS))))
        .and_then(|wei| wei.trunc().to_u128())
        .ok_or_else(|| AttestationError::PriceUnavailable(format!("cannot price {} USD", usd)))
}
