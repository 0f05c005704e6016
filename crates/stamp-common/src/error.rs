//! Error types for the stamp pipeline
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using StampError
pub type Result<T> = std::result::Result<T, StampError>;

/// Unified error type for stamp operations
#[derive(Debug, Error)]
pub enum StampError {
    // Challenge / signature errors
    #[error("{0}")]
    Challenge(#[from] ChallengeError),

    // Merkle errors
    #[error("{0}")]
    Merkle(#[from] MerkleError),

    // Attestation errors
    #[error("{0}")]
    Attestation(#[from] AttestationError),

    // Rate limit errors
    #[error("Rate limit error: {0}")]
    RateLimit(#[from] RateLimitError),

    // Cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    // Malformed client input
    #[error("{0}")]
    InvalidInput(String),

    // Caller could not be authenticated
    #[error("{0}")]
    Unauthorized(String),

    // Upstream service errors
    #[error("Network error: {0}")]
    Network(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while checking that a caller controls an address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Credential too old")]
    CredentialTooOld,

    #[error("Challenge mismatch")]
    ChallengeMismatch,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid challenge '{0}'")]
    InvalidChallenge(String),
}

/// Merkle tree construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("Add more leafs before attempting to construct a merkleTree")]
    TooFewLeaves,
}

/// Attestation encoding and signing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    #[error("No onchainInfo found for chainId {0}")]
    UnknownChain(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Invalid credential hash: {0}")]
    InvalidCredentialHash(String),

    #[error("Invalid score: {0}")]
    InvalidScore(String),

    #[error("Schema encoding failed: {0}")]
    Encoding(String),

    #[error("Unable to determine ETH price: {0}")]
    PriceUnavailable(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Rate limit policy errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Invalid rate limit spec: {0}")]
    InvalidSpec(String),

    #[error("Rate limit exceeded")]
    Exceeded,
}

/// Key-value cache errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    Connection(String),

    #[error("Cache command failed: {0}")]
    Command(String),
}

impl From<serde_json::Error> for StampError {
    fn from(err: serde_json::Error) -> Self {
        StampError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for StampError {
    fn from(err: anyhow::Error) -> Self {
        StampError::Internal(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Command(err.to_string())
        }
    }
}
