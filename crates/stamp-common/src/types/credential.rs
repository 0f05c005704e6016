//! Verifiable credential types

use crate::crypto::merkle::RecordProofs;
use crate::types::payload::Record;
use serde::{Deserialize, Serialize};

/// W3C credentials context
pub const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Signed stamp or challenge credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context", default)]
    pub context: Vec<String>,
    #[serde(rename = "type", default)]
    pub credential_type: Vec<String>,
    pub issuer: String,
    pub issuance_date: String,
    pub expiration_date: String,
    pub credential_subject: CredentialSubject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<CredentialProof>,
}

impl VerifiableCredential {
    /// The proof value, if the credential carries a non-empty one
    pub fn proof_value(&self) -> Option<&str> {
        self.proof
            .as_ref()
            .map(|p| p.proof_value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Provider named by the credential subject
    pub fn provider(&self) -> &str {
        &self.credential_subject.provider
    }
}

/// Subject of a credential
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubject {
    /// did:pkh of the wallet the credential is bound to
    pub id: String,
    pub provider: String,
    /// Versioned hash of the verified record (stamp credentials)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Challenge text (challenge credentials)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Linked-data style proof block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub proof_purpose: String,
    pub verification_method: String,
    pub created: String,
    #[serde(default)]
    pub proof_value: String,
}

/// One entry of a `/verify` response: either an issued credential or an error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<VerifiableCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle: Option<RecordProofs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl CredentialResponse {
    pub fn issued(record: Record, credential: VerifiableCredential) -> Self {
        Self {
            record: Some(record),
            credential: Some(credential),
            ..Default::default()
        }
    }

    pub fn error(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: Some(error.into()),
            code: Some(code),
            ..Default::default()
        }
    }

    pub fn with_merkle(mut self, merkle: RecordProofs) -> Self {
        self.merkle = Some(merkle);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
