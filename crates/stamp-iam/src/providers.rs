//! Built-in providers and platform table
//!
//! Real providers live outside this service and plug in through the
//! [`Provider`] trait. The `Simple` provider ships for wiring checks: it
//! accepts any payload whose `proofs.valid` is `"true"`.

use async_trait::async_trait;
use stamp_common::{ProviderContext, Record, RequestPayload, VerifiedPayload};
use stamp_verify::{PlatformDefinition, Provider, ProviderError};
use std::sync::Arc;

/// Provider that trusts the `valid` proof of the request
#[derive(Debug, Clone)]
pub struct SimpleProvider {
    provider_type: String,
}

impl SimpleProvider {
    pub fn new(provider_type: &str) -> Self {
        Self {
            provider_type: provider_type.to_string(),
        }
    }
}

impl Default for SimpleProvider {
    fn default() -> Self {
        Self::new("Simple")
    }
}

#[async_trait]
impl Provider for SimpleProvider {
    fn provider_type(&self) -> &str {
        &self.provider_type
    }

    async fn verify(
        &self,
        payload: &RequestPayload,
        _context: &mut ProviderContext,
    ) -> Result<VerifiedPayload, ProviderError> {
        if payload.proofs.get("valid").map(String::as_str) != Some("true") {
            return Ok(VerifiedPayload::invalid([format!(
                "{} verification requires a valid proof",
                self.provider_type
            )]));
        }

        let mut record = Record::new();
        record.insert("username".to_string(), payload.proofs.get("username").cloned().unwrap_or_default());
        record.insert("address".to_string(), payload.address.to_lowercase());
        Ok(VerifiedPayload::valid(record))
    }
}

/// Providers registered at startup
pub fn default_providers() -> Vec<Arc<dyn Provider>> {
    vec![Arc::new(SimpleProvider::default())]
}

/// Platform table registered at startup
pub fn default_platforms() -> Vec<PlatformDefinition> {
    vec![PlatformDefinition::new("Simple", &["Simple"])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_provider() {
        let provider = SimpleProvider::default();
        let mut context = ProviderContext::new();

        let payload = RequestPayload::new("Simple", "0xABC")
            .with_proof("valid", "true")
            .with_proof("username", "alice");
        let verified = provider.verify(&payload, &mut context).await.unwrap();
        assert!(verified.valid);
        let record = verified.record.unwrap();
        assert_eq!(record["username"], "alice");
        assert_eq!(record["address"], "0xabc");

        let rejected = provider
            .verify(&RequestPayload::new("Simple", "0xabc"), &mut context)
            .await
            .unwrap();
        assert!(!rejected.valid);
        assert!(rejected.errors.is_some());
    }
}
