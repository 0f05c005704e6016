//! On-chain configuration per chain
//!
//! Loaded once at startup from a JSON document keyed by hex chain id:
//!
//! ```json
//! {
//!   "0xa": {
//!     "verifierAddress": "0x...",
//!     "issuerAddress": "0x...",
//!     "easSchemas": { "stamp": { "uid": "0x..." }, "score": { "uid": "0x..." } }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use stamp_common::crypto::eth::parse_address;
use stamp_common::{AttestationError, Result, StampError};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRef {
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EasSchemas {
    pub stamp: SchemaRef,
    pub score: SchemaRef,
}

/// Contracts and schemas deployed on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub verifier_address: String,
    pub issuer_address: String,
    pub eas_schemas: EasSchemas,
}

impl ChainInfo {
    pub fn verifier(&self) -> std::result::Result<[u8; 20], AttestationError> {
        parse_address(&self.verifier_address)
            .map_err(|_| AttestationError::Encoding(format!("bad verifierAddress {}", self.verifier_address)))
    }

    pub fn stamp_schema(&self) -> std::result::Result<[u8; 32], AttestationError> {
        parse_uid(&self.eas_schemas.stamp.uid)
    }

    pub fn score_schema(&self) -> std::result::Result<[u8; 32], AttestationError> {
        parse_uid(&self.eas_schemas.score.uid)
    }
}

/// Chain id → [`ChainInfo`] lookup
#[derive(Debug, Clone, Default)]
pub struct ChainTable {
    chains: HashMap<String, ChainInfo>,
}

impl ChainTable {
    pub fn new(chains: HashMap<String, ChainInfo>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|(id, info)| (id.to_lowercase(), info))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let chains: HashMap<String, ChainInfo> = serde_json::from_str(json)?;
        Ok(Self::new(chains))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| StampError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let table = Self::from_json(&json)?;
        info!(path = %path.display(), chains = table.len(), "Loaded chain configuration");
        Ok(table)
    }

    /// Configuration for a hex chain id such as `0xa`
    pub fn get(&self, chain_id_hex: &str) -> std::result::Result<&ChainInfo, AttestationError> {
        self.chains
            .get(&chain_id_hex.to_lowercase())
            .ok_or_else(|| AttestationError::UnknownChain(chain_id_hex.to_string()))
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// Numeric chain id of a `0x`-prefixed hex id
pub fn parse_chain_id(chain_id_hex: &str) -> std::result::Result<u64, AttestationError> {
    chain_id_hex
        .to_lowercase()
        .strip_prefix("0x")
        .and_then(|digits| u64::from_str_radix(digits, 16).ok())
        .ok_or_else(|| AttestationError::UnknownChain(chain_id_hex.to_string()))
}

fn parse_uid(uid: &str) -> std::result::Result<[u8; 32], AttestationError> {
    let mut out = [0u8; 32];
    uid.strip_prefix("0x")
        .and_then(|digits| hex::decode_to_slice(digits, &mut out).ok())
        .ok_or_else(|| AttestationError::Encoding(format!("bad schema uid {}", uid)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAINS: &str = r#"{
        "0xA": {
            "verifierAddress": "0x2222222222222222222222222222222222222222",
            "issuerAddress": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
            "easSchemas": {
                "stamp": { "uid": "0x1111111111111111111111111111111111111111111111111111111111111111" },
                "score": { "uid": "0x3333333333333333333333333333333333333333333333333333333333333333" }
            }
        }
    }"#;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = ChainTable::from_json(CHAINS).unwrap();
        assert_eq!(table.len(), 1);

        let chain = table.get("0xa").unwrap();
        assert_eq!(chain.verifier().unwrap(), [0x22; 20]);
        assert_eq!(chain.stamp_schema().unwrap(), [0x11; 32]);
        assert_eq!(chain.score_schema().unwrap(), [0x33; 32]);
        assert!(table.get("0XA").is_ok());
    }

    #[test]
    fn test_unknown_chain() {
        let table = ChainTable::from_json(CHAINS).unwrap();
        let err = table.get("0x1").unwrap_err();
        assert_eq!(err.to_string(), "No onchainInfo found for chainId 0x1");
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("0xa").unwrap(), 10);
        assert_eq!(parse_chain_id("0x14a34").unwrap(), 84532);
        assert!(parse_chain_id("10").is_err());
        assert!(parse_chain_id("0xzz").is_err());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(ChainTable::from_json("{\"0xa\": {}}").is_err());
    }
}
