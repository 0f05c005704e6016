//! Request and verification payload types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Flat record of verified facts, kept in sorted key order
pub type Record = BTreeMap<String, String>;

/// What a client asks to have verified
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    /// Single credential type (legacy single-type requests)
    #[serde(rename = "type", default)]
    pub credential_type: String,
    /// Credential types for a multi-type request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    /// Wallet address the stamps are claimed for
    pub address: String,
    /// Payload format version
    #[serde(default)]
    pub version: String,
    /// Provider specific proofs (OAuth codes, signatures, list names, ...)
    #[serde(default)]
    pub proofs: HashMap<String, String>,
    /// Signature scheme requested for the issued credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_type: Option<String>,
}

impl RequestPayload {
    /// Create a single-type payload
    pub fn new(credential_type: &str, address: &str) -> Self {
        Self {
            credential_type: credential_type.to_string(),
            address: address.to_string(),
            version: crate::CREDENTIAL_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Add a proof entry
    pub fn with_proof(mut self, key: &str, value: &str) -> Self {
        self.proofs.insert(key.to_string(), value.to_string());
        self
    }

    /// Requested types with empty entries dropped.
    ///
    /// Falls back to the single `type` field when `types` is absent.
    pub fn requested_types(&self) -> Vec<String> {
        match &self.types {
            Some(types) => types.iter().filter(|t| !t.is_empty()).cloned().collect(),
            None if !self.credential_type.is_empty() => vec![self.credential_type.clone()],
            None => Vec::new(),
        }
    }

    /// Whether the caller used the multi-type form
    pub fn is_multi(&self) -> bool {
        self.types.is_some()
    }
}

/// Outcome of a single provider invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPayload {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<u64>,
}

impl VerifiedPayload {
    /// A successful verification carrying its record
    pub fn valid(record: Record) -> Self {
        Self {
            valid: true,
            record: Some(record),
            errors: None,
            expires_in_seconds: None,
        }
    }

    /// A failed verification with the reasons the user should see
    pub fn invalid<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let errors: Vec<String> = errors.into_iter().map(Into::into).collect();
        Self {
            valid: false,
            record: None,
            errors: if errors.is_empty() { None } else { Some(errors) },
            expires_in_seconds: None,
        }
    }

    /// Override the default credential lifetime
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in_seconds = Some(seconds);
        self
    }
}

/// Scratch space shared by the providers of one platform during one request
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    entries: HashMap<String, serde_json::Value>,
}

impl ProviderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
