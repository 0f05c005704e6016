//! Shared application state

use anyhow::{Context, Result};
use stamp_attest::{AttestConfig, AttestationSigner, ChainTable, PriceFeed};
use stamp_common::{InMemoryCache, KeyValueCache, RedisCache};
use stamp_verify::challenge::ChallengeVerifier;
use stamp_verify::{
    BanRevocationFilter, CredentialIssuer, PlatformIndex, ProviderRegistry,
    VerificationOrchestrator, VerifyConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::IamConfig;
use crate::oracle::HttpPriceOracle;
use crate::providers::{default_platforms, default_providers};
use crate::rate_limit::RateLimiter;
use crate::scorer::{ScoreService, ScorerClient};

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<CredentialIssuer>,
    pub challenges: Arc<ChallengeVerifier>,
    pub orchestrator: Arc<VerificationOrchestrator>,
    pub filter: Arc<BanRevocationFilter>,
    pub signer: Arc<AttestationSigner>,
    pub scores: Arc<dyn ScoreService>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Scorer used when a score attestation names none
    pub default_scorer_id: u32,
}

impl AppState {
    /// Wire every service from configuration
    pub async fn from_config(config: &IamConfig) -> Result<Self> {
        let cache: Arc<dyn KeyValueCache> = match &config.redis_url {
            Some(url) => match RedisCache::new(url).await {
                Ok(cache) => {
                    info!("Connected to Redis cache");
                    Arc::new(cache.with_prefix("iam"))
                }
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, using in-memory cache");
                    Arc::new(InMemoryCache::default())
                }
            },
            None => {
                info!("REDIS_URL not set, using in-memory cache");
                Arc::new(InMemoryCache::default())
            }
        };

        let verify_config = VerifyConfig {
            provider_timeout_ms: config.provider_timeout_ms,
            ..Default::default()
        };
        let issuer = CredentialIssuer::from_seed_hex(&config.issuer_key)
            .context("IAM_ISSUER_KEY")?
            .with_config(&verify_config);
        info!(did = %issuer.did(), "Credential issuer loaded");

        let registry = ProviderRegistry::new(default_providers())
            .with_timeout(Duration::from_millis(verify_config.provider_timeout_ms));
        let index = PlatformIndex::new(&default_platforms());
        let orchestrator = VerificationOrchestrator::new(Arc::new(registry), Arc::new(index));

        let scorer = Arc::new(
            ScorerClient::new(&config.scorer.endpoint, &config.scorer.api_key)
                .context("scorer client")?,
        );
        let filter = BanRevocationFilter::new(scorer.clone(), scorer.clone());

        let oracle = HttpPriceOracle::new(
            &config.attestation.price_oracle_url,
            config.attestation.price_oracle_api_key.clone(),
        )
        .context("price oracle")?;
        let fees = PriceFeed::new(cache.clone(), Arc::new(oracle));
        let chains = ChainTable::from_file(&config.attestation.chain_config_path)
            .context("CHAIN_CONFIG_PATH")?;
        let signer = AttestationSigner::from_hex_keys(
            &config.attestation.production_key,
            &config.attestation.testnet_key,
            Arc::new(chains),
            Arc::new(fees),
            AttestConfig {
                fee_usd: config.attestation.fee_usd,
                domain_name: config.attestation.domain_name.clone(),
                ..Default::default()
            },
        )
        .context("attestation signer keys")?;

        Ok(Self {
            issuer: Arc::new(issuer),
            challenges: Arc::new(ChallengeVerifier::new(chrono::Duration::seconds(
                verify_config.max_did_session_age_secs,
            ))),
            orchestrator: Arc::new(orchestrator),
            filter: Arc::new(filter),
            signer: Arc::new(signer),
            scores: scorer.clone(),
            rate_limiter: Arc::new(RateLimiter::new(scorer, cache)),
            default_scorer_id: config.scorer.default_scorer_id,
        })
    }
}
