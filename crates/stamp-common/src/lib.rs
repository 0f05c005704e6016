//! # Stamp Common
//!
//! Shared types, errors, and cryptographic primitives for the stamp
//! verification and attestation pipeline.
//!
//! ## Core Types
//!
//! - [`RequestPayload`]: what a client asks to have verified
//! - [`VerifiedPayload`]: the outcome of a single provider check
//! - [`ProviderContext`]: scratch space shared by providers of one platform
//! - [`VerifiableCredential`]: the signed stamp handed back to the client
//!
//! ## Crypto
//!
//! - [`crypto::merkle`]: SHA-256 merkle proofs over flat records
//! - [`crypto::did`]: did:key and did:pkh helpers
//! - [`crypto::eth`]: Keccak, address derivation and EIP-191 recovery
//!
//! ## Cache
//!
//! - [`cache`]: key-value cache shared by the price feed and rate limiter

pub mod cache;
pub mod crypto;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use cache::{InMemoryCache, KeyValueCache, RedisCache};
pub use error::{
    AttestationError, CacheError, ChallengeError, MerkleError, RateLimitError, Result, StampError,
};
pub use types::{
    credential::{CredentialProof, CredentialResponse, CredentialSubject, VerifiableCredential},
    payload::{ProviderContext, Record, RequestPayload, VerifiedPayload},
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version tag of the credential and hash formats
pub const CREDENTIAL_VERSION: &str = "0.0.0";

/// Chain id used when a wallet address is expressed as a did:pkh
pub const PKH_CHAIN_PREFIX: &str = "did:pkh:eip155:1:";
