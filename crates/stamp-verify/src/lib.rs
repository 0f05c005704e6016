//! # Stamp Verify
//!
//! Everything between an incoming verification request and a list of issued
//! stamp credentials.
//!
//! ## Components
//!
//! - **Challenge**: nonce challenges and the two signature schemes that answer them
//! - **Provider**: the `Provider` seam plus a registry enforcing deadlines
//! - **Platform**: static index from provider type to owning platform
//! - **Orchestrator**: per-platform grouping, shared context, parallel fan-out
//! - **Issuer**: Ed25519-signed stamp and challenge credentials
//! - **Filter**: ban and revocation post-filters
//!
//! ## Flow
//!
//! ```text
//! payload ──► challenge ──► orchestrator ──► issuer ──► ban filter ──► responses
//!                               │
//!                   ┌───────────┼───────────┐
//!               platform A  platform B  generic      (parallel)
//!               t1 → t2       t3            t4        (serial, shared context)
//! ```

pub mod challenge;
pub mod filter;
pub mod issuer;
pub mod orchestrator;
pub mod platform;
pub mod provider;

pub use challenge::{cacao::SignedChallenge, Challenge};
pub use filter::{BanRevocationFilter, BanService, RevocationService};
pub use issuer::CredentialIssuer;
pub use orchestrator::{VerificationOrchestrator, VerifyResult};
pub use platform::{PlatformDefinition, PlatformIndex};
pub use provider::{Provider, ProviderError, ProviderRegistry};

/// Verification pipeline configuration
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Deadline for a single provider call in milliseconds
    pub provider_timeout_ms: u64,
    /// Default lifetime of an issued stamp credential in seconds
    pub credential_ttl_secs: i64,
    /// Lifetime of a challenge credential in seconds
    pub challenge_ttl_secs: i64,
    /// Maximum age of a DID session capability in seconds
    pub max_did_session_age_secs: i64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 30_000,
            credential_ttl_secs: 90 * 24 * 60 * 60,
            challenge_ttl_secs: 60,
            max_did_session_age_secs: 24 * 60 * 60,
        }
    }
}
