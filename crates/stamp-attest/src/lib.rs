//! # Stamp Attest
//!
//! On-chain attestation of stamps and scores through the Ethereum
//! Attestation Service verifier contract.
//!
//! ## Flow
//!
//! 1. [`schema`] encodes each stamp and the aggregate score as ABI packets
//! 2. [`signer::build_requests`] wraps packets into multi-attestation requests
//! 3. [`fees::PriceFeed`] converts the USD fee to wei
//! 4. [`eip712`] hashes the passport request under the chain's domain
//! 5. [`AttestationSigner`] signs with the key registered for that chain

pub mod chains;
pub mod eip712;
pub mod fees;
pub mod schema;
pub mod signer;

pub use chains::{ChainInfo, ChainTable};
pub use eip712::{AttestationRequestData, Eip712Domain, MultiAttestationRequest, PassportAttestationRequest};
pub use fees::{PriceFeed, PriceOracle};
pub use signer::{AttestationSigner, EthSignature, ScoreAttestation, SignedPassportAttestation};

use rust_decimal::Decimal;

/// Attestation settings
#[derive(Debug, Clone)]
pub struct AttestConfig {
    /// Fee charged per attestation, in USD
    pub fee_usd: Decimal,
    /// EIP-712 domain name of the verifier contract
    pub domain_name: String,
    /// EIP-712 domain version of the verifier contract
    pub domain_version: String,
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self {
            fee_usd: Decimal::from(2),
            domain_name: "GitcoinVerifier".to_string(),
            domain_version: "1".to_string(),
        }
    }
}
