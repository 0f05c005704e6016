//! DID (Decentralized Identifier) Operations
//!
//! Supports the two methods the pipeline meets:
//! - did:key - Ed25519 session keys and the credential issuer
//! - did:pkh - wallet accounts (`did:pkh:eip155:<chain>:<address>`)
//!
//! Reference: https://www.w3.org/TR/did-core/

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ed25519 multicodec prefix for did:key
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// DID method types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DidMethod {
    /// Ed25519 public key identity
    Key,
    /// Blockchain account identity
    Pkh,
}

impl std::fmt::Display for DidMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DidMethod::Key => write!(f, "key"),
            DidMethod::Pkh => write!(f, "pkh"),
        }
    }
}

/// Parsed DID components
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDid {
    /// Full DID string
    pub did: String,
    /// DID method
    pub method: DidMethod,
    /// Method-specific identifier
    pub identifier: String,
}

impl ParsedDid {
    /// Parse a DID string into components. A trailing `#fragment` is ignored.
    pub fn parse(did: &str) -> Result<Self, DidError> {
        if !did.starts_with("did:") {
            return Err(DidError::InvalidFormat("DID must start with 'did:'".into()));
        }

        let did = did.split('#').next().unwrap_or(did);
        let parts: Vec<&str> = did.splitn(3, ':').collect();
        if parts.len() < 3 || parts[2].is_empty() {
            return Err(DidError::InvalidFormat("DID must have method and identifier".into()));
        }

        let method = match parts[1] {
            "key" => DidMethod::Key,
            "pkh" => DidMethod::Pkh,
            other => return Err(DidError::UnsupportedMethod(other.to_string())),
        };

        Ok(Self {
            did: did.to_string(),
            method,
            identifier: parts[2].to_string(),
        })
    }

    /// Extract Ed25519 public key from did:key
    pub fn extract_public_key(&self) -> Result<[u8; 32], DidError> {
        if self.method != DidMethod::Key {
            return Err(DidError::WrongMethod {
                expected: DidMethod::Key,
                actual: self.method,
            });
        }

        decode_did_key(&self.identifier)
    }

    /// Get verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey, DidError> {
        let key_bytes = self.extract_public_key()?;
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| DidError::InvalidPublicKey)
    }

    /// Account address of a did:pkh (last `:`-separated segment)
    pub fn account_address(&self) -> Result<&str, DidError> {
        if self.method != DidMethod::Pkh {
            return Err(DidError::WrongMethod {
                expected: DidMethod::Pkh,
                actual: self.method,
            });
        }

        self.identifier
            .rsplit(':')
            .next()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| DidError::InvalidFormat("did:pkh without account".into()))
    }
}

/// Encode an Ed25519 public key as did:key identifier
pub fn encode_did_key(public_key: &[u8; 32]) -> String {
    let mut prefixed = Vec::with_capacity(34);
    prefixed.extend_from_slice(&ED25519_MULTICODEC);
    prefixed.extend_from_slice(public_key);

    let encoded = bs58::encode(&prefixed).into_string();
    format!("did:key:z{}", encoded)
}

/// Decode a did:key identifier to Ed25519 public key
pub fn decode_did_key(identifier: &str) -> Result<[u8; 32], DidError> {
    // Handle z-prefixed multibase
    let encoded = identifier.strip_prefix('z').unwrap_or(identifier);

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| DidError::InvalidEncoding)?;

    // Check multicodec prefix
    if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC {
        return Err(DidError::InvalidMulticodec);
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&decoded[2..34]);
    Ok(key)
}

/// did:pkh for a mainnet wallet address
pub fn pkh_did(address: &str) -> String {
    format!("{}{}", crate::PKH_CHAIN_PREFIX, address.to_lowercase())
}

/// Address inside a mainnet did:pkh, `None` for anything else
pub fn address_from_pkh(did: &str) -> Option<String> {
    did.strip_prefix(crate::PKH_CHAIN_PREFIX)
        .filter(|a| !a.is_empty())
        .map(str::to_lowercase)
}

/// Verify an Ed25519 signature using a did:key
pub fn verify_with_did(did: &str, message: &[u8], signature: &[u8]) -> Result<bool, DidError> {
    let parsed = ParsedDid::parse(did)?;
    let verifying_key = parsed.verifying_key()?;

    let sig = Signature::from_slice(signature).map_err(|_| DidError::SignatureVerificationFailed)?;

    Ok(verifying_key.verify(message, &sig).is_ok())
}

/// DID-related errors
#[derive(Debug, Error)]
pub enum DidError {
    #[error("Invalid DID format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported DID method: {0}")]
    UnsupportedMethod(String),

    #[error("Wrong DID method: expected {expected}, got {actual}")]
    WrongMethod { expected: DidMethod, actual: DidMethod },

    #[error("Invalid base58 encoding")]
    InvalidEncoding,

    #[error("Invalid multicodec prefix")]
    InvalidMulticodec,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}
