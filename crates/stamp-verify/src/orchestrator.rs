//! Verification orchestrator
//!
//! Runs a multi-type verification request:
//! 1. Groups requested types by owning platform
//! 2. Runs platform groups in parallel
//! 3. Runs the types of one group serially, sharing one [`ProviderContext`]
//! 4. Classifies every outcome into exactly one [`VerifyResult`] per type

use crate::platform::PlatformIndex;
use crate::provider::ProviderRegistry;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use stamp_common::{ProviderContext, RequestPayload, StampError, VerifiedPayload};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Upper bound on the joined error text of a failed verification
pub const MAX_ERROR_LENGTH: usize = 1000;

/// Error text used when a provider gives no reason
pub const UNABLE_TO_VERIFY: &str = "Unable to verify provider";

const ALLOW_LIST: &str = "AllowList";
const DEVELOPER_LIST: &str = "DeveloperList";

/// Outcome for one requested type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    /// Type as requested by the caller
    #[serde(rename = "type")]
    pub credential_type: String,
    pub verify_result: VerifiedPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResult {
    fn from_verified(credential_type: String, verify_result: VerifiedPayload) -> Self {
        if verify_result.valid {
            return Self {
                credential_type,
                verify_result,
                code: None,
                error: None,
            };
        }

        let error = verify_result
            .errors
            .as_ref()
            .map(|errors| errors.join(", "))
            .filter(|joined| !joined.is_empty())
            .map(|joined| joined.chars().take(MAX_ERROR_LENGTH).collect())
            .unwrap_or_else(|| UNABLE_TO_VERIFY.to_string());

        Self {
            credential_type,
            verify_result,
            code: Some(403),
            error: Some(error),
        }
    }

    fn failed(credential_type: String) -> Self {
        Self {
            credential_type,
            verify_result: VerifiedPayload::default(),
            code: Some(400),
            error: Some(UNABLE_TO_VERIFY.to_string()),
        }
    }
}

/// Lookup key of a requested type (custom list types share their base provider)
pub fn base_type(requested: &str) -> &str {
    requested.split('#').next().unwrap_or(requested)
}

/// Resolve the provider type and per-type payload for a requested type.
///
/// `AllowList#<list>` and `DeveloperList#<condition>#<hash>` route to their
/// base provider with the suffix injected into the proofs.
pub fn route_type(
    requested: &str,
    payload: &RequestPayload,
) -> Result<(String, RequestPayload), StampError> {
    let mut payload_for_type = payload.clone();
    let mut parts = requested.split('#');

    match parts.next() {
        Some(ALLOW_LIST) => {
            let list = parts
                .next()
                .filter(|l| !l.is_empty())
                .ok_or_else(|| StampError::InvalidInput(format!("Malformed type {}", requested)))?;
            payload_for_type
                .proofs
                .insert("allowList".to_string(), list.to_string());
            Ok((ALLOW_LIST.to_string(), payload_for_type))
        }
        Some(DEVELOPER_LIST) => {
            let (Some(condition_name), Some(condition_hash)) = (parts.next(), parts.next()) else {
                return Err(StampError::InvalidInput(format!("Malformed type {}", requested)));
            };
            payload_for_type
                .proofs
                .insert("conditionName".to_string(), condition_name.to_string());
            payload_for_type
                .proofs
                .insert("conditionHash".to_string(), condition_hash.to_string());
            Ok((DEVELOPER_LIST.to_string(), payload_for_type))
        }
        _ => Ok((requested.to_string(), payload_for_type)),
    }
}

/// Fans a request out over the provider registry
pub struct VerificationOrchestrator {
    registry: Arc<ProviderRegistry>,
    index: Arc<PlatformIndex>,
}

impl VerificationOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, index: Arc<PlatformIndex>) -> Self {
        Self { registry, index }
    }

    /// Verify every requested type. Returns one result per input type.
    #[instrument(skip(self, types, payload), fields(address = %payload.address, count = types.len()))]
    pub async fn verify_many(&self, types: &[String], payload: &RequestPayload) -> Vec<VerifyResult> {
        let groups = self.index.group_by(types, |t| base_type(t).to_string());
        debug!(groups = groups.len(), "Grouped types by platform");

        let results: Vec<VerifyResult> = join_all(
            groups
                .into_iter()
                .map(|group| self.verify_group(group, payload)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        let valid = results.iter().filter(|r| r.verify_result.valid).count();
        info!(valid, total = results.len(), "Verification finished");
        results
    }

    async fn verify_group(&self, group: Vec<String>, payload: &RequestPayload) -> Vec<VerifyResult> {
        let mut context = ProviderContext::new();
        let mut results = Vec::with_capacity(group.len());

        for requested in group {
            let result = match route_type(&requested, payload) {
                Ok((provider_type, payload_for_type)) => {
                    let verified = self
                        .registry
                        .verify(&provider_type, &payload_for_type, &mut context)
                        .await;
                    VerifyResult::from_verified(requested, verified)
                }
                Err(err) => {
                    warn!(credential_type = %requested, error = %err, "Unable to route type");
                    VerifyResult::failed(requested)
                }
            };
            results.push(result);
        }

        results
    }
}
