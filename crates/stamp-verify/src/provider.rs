//! Provider seam and registry
//!
//! A [`Provider`] checks one credential type against some external source.
//! The [`ProviderRegistry`] dispatches by type, races each call against a
//! deadline and turns every failure into a `VerifiedPayload` so a single
//! misbehaving provider never surfaces as an error to the caller.

use async_trait::async_trait;
use futures::FutureExt;
use stamp_common::{ProviderContext, RequestPayload, VerifiedPayload};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Message returned when no provider is registered for a type
pub const MISSING_PROVIDER: &str = "Missing provider";

/// Message returned for failures the provider did not anticipate
pub const UNEXPECTED_ERROR: &str = "There was an unexpected error during verification.";

/// Provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Anticipated failure whose message is safe to show the user
    #[error("{0}")]
    ExternalVerification(String),

    /// Anything else
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// A verifier for one credential type
#[async_trait]
pub trait Provider: Send + Sync {
    /// Credential type this provider verifies
    fn provider_type(&self) -> &str;

    /// Verify the payload, optionally reading or writing the platform context
    async fn verify(
        &self,
        payload: &RequestPayload,
        context: &mut ProviderContext,
    ) -> Result<VerifiedPayload, ProviderError>;
}

/// Type-indexed set of providers with a per-call deadline
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    timeout: Duration,
}

impl ProviderRegistry {
    /// Build a registry. When two providers claim the same type the first one wins.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut map: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for provider in providers {
            let provider_type = provider.provider_type().to_string();
            if map.contains_key(&provider_type) {
                warn!(provider_type = %provider_type, "Duplicate provider registration ignored");
                continue;
            }
            map.insert(provider_type, provider);
        }

        Self {
            providers: map,
            timeout: Duration::from_millis(crate::VerifyConfig::default().provider_timeout_ms),
        }
    }

    /// Set the per-call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn contains(&self, provider_type: &str) -> bool {
        self.providers.contains_key(provider_type)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run the provider for `provider_type`. Never fails.
    #[instrument(skip(self, payload, context), fields(address = %payload.address))]
    pub async fn verify(
        &self,
        provider_type: &str,
        payload: &RequestPayload,
        context: &mut ProviderContext,
    ) -> VerifiedPayload {
        let Some(provider) = self.providers.get(provider_type) else {
            debug!("No provider registered");
            return VerifiedPayload::invalid([MISSING_PROVIDER]);
        };

        let call = AssertUnwindSafe(provider.verify(payload, context)).catch_unwind();

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Provider timed out");
                VerifiedPayload::invalid([format!(
                    "Request timeout while verifying {}. It took over {} ms to complete.",
                    provider_type,
                    self.timeout.as_millis()
                )])
            }
            Ok(Err(_panic)) => {
                error!("Provider panicked during verification");
                VerifiedPayload::invalid([UNEXPECTED_ERROR])
            }
            Ok(Ok(Err(ProviderError::ExternalVerification(message)))) => {
                debug!(error = %message, "Provider rejected verification");
                VerifiedPayload::invalid([message])
            }
            Ok(Ok(Err(ProviderError::Unexpected(err)))) => {
                error!(error = ?err, "Unexpected provider error");
                VerifiedPayload::invalid([format!("{} {}", UNEXPECTED_ERROR, err)])
            }
            Ok(Ok(Ok(result))) => result,
        }
    }
}
