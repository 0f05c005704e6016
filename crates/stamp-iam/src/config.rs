//! IAM service configuration

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

/// IAM service configuration
#[derive(Debug, Clone)]
pub struct IamConfig {
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
    /// Redis URL; the service falls back to an in-memory cache without one
    pub redis_url: Option<String>,
    /// Scorer service settings
    pub scorer: ScorerSettings,
    /// Attestation settings
    pub attestation: AttestationSettings,
    /// Ed25519 seed of the credential issuer, hex
    pub issuer_key: String,
    /// Deadline for one provider call in milliseconds
    pub provider_timeout_ms: u64,
}

/// Scorer service settings
#[derive(Debug, Clone)]
pub struct ScorerSettings {
    /// Base URL of the scorer API
    pub endpoint: String,
    /// Key sent to the internal scorer API
    pub api_key: String,
    /// Scorer used by `/eas/score` when the request names none
    pub default_scorer_id: u32,
}

/// Attestation settings
#[derive(Debug, Clone)]
pub struct AttestationSettings {
    /// Fee per attestation in USD
    pub fee_usd: Decimal,
    /// ETH/USD price endpoint
    pub price_oracle_url: String,
    /// Optional API key for the price endpoint
    pub price_oracle_api_key: Option<String>,
    /// secp256k1 key used for production chains, hex
    pub production_key: String,
    /// secp256k1 key used for every other chain, hex
    pub testnet_key: String,
    /// Path of the chain configuration JSON
    pub chain_config_path: String,
    /// EIP-712 domain name
    pub domain_name: String,
}

impl IamConfig {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut missing = Vec::new();
        let mut required = |name: &str| match std::env::var(name) {
            Ok(value) if !value.is_empty() => value,
            _ => {
                missing.push(name.to_string());
                String::new()
            }
        };

        let issuer_key = required("IAM_ISSUER_KEY");
        let scorer_endpoint = required("SCORER_ENDPOINT");
        let scorer_api_key = required("SCORER_API_KEY");
        let production_key = required("ATTESTATION_SIGNER_PRIVATE_KEY");
        let testnet_key = required("TESTNET_ATTESTATION_SIGNER_PRIVATE_KEY");
        let price_oracle_url = required("PRICE_ORACLE_URL");

        if !missing.is_empty() {
            bail!("Missing required environment variables: {}", missing.join(", "));
        }

        let mut cfg = Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            scorer: ScorerSettings {
                endpoint: scorer_endpoint.trim_end_matches('/').to_string(),
                api_key: scorer_api_key,
                default_scorer_id: 1,
            },
            attestation: AttestationSettings {
                fee_usd: Decimal::from(2),
                price_oracle_url,
                price_oracle_api_key: std::env::var("PRICE_ORACLE_API_KEY").ok(),
                production_key,
                testnet_key,
                chain_config_path: "config/chains.json".to_string(),
                domain_name: "GitcoinVerifier".to_string(),
            },
            issuer_key,
            provider_timeout_ms: 30_000,
        };

        if let Ok(host) = std::env::var("IAM_HOST") {
            cfg.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse::<u16>() {
                cfg.port = p;
            }
        }
        if let Ok(val) = std::env::var("ALLO_SCORER_ID") {
            if let Ok(v) = val.parse() {
                cfg.scorer.default_scorer_id = v;
            }
        }
        if let Ok(val) = std::env::var("EAS_FEE_USD") {
            if let Ok(v) = Decimal::from_str(&val) {
                cfg.attestation.fee_usd = v;
            }
        }
        if let Ok(path) = std::env::var("CHAIN_CONFIG_PATH") {
            cfg.attestation.chain_config_path = path;
        }
        if let Ok(name) = std::env::var("ATTESTATION_DOMAIN_NAME") {
            cfg.attestation.domain_name = name;
        }
        if let Ok(val) = std::env::var("PROVIDER_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                cfg.provider_timeout_ms = v;
            }
        }

        Ok(cfg)
    }
}
