//! Credential issuer
//!
//! Issues Ed25519-signed stamp credentials for successful verifications and
//! short-lived challenge credentials that carry a challenge text back to the
//! server without server-side storage.

use crate::challenge::Challenge;
use crate::orchestrator::VerifyResult;
use crate::VerifyConfig;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Datelike, Duration, SecondsFormat, Utc};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use stamp_common::crypto::{did, merkle};
use stamp_common::types::credential::CREDENTIALS_CONTEXT;
use stamp_common::{
    ChallengeError, CredentialProof, CredentialResponse, CredentialSubject, Record, Result,
    StampError, VerifiableCredential, CREDENTIAL_VERSION,
};
use tracing::{debug, error, instrument};

/// Prefix of challenge credential providers
pub const CHALLENGE_PROVIDER_PREFIX: &str = "challenge-";

const PROOF_TYPE: &str = "Ed25519Signature2020";
const PROOF_PURPOSE: &str = "assertionMethod";

/// Last year an RFC 3339 timestamp can express with four digits
const MAX_EXPIRY_YEAR: i32 = 9999;

/// Ed25519 credential issuer
pub struct CredentialIssuer {
    signing_key: SigningKey,
    did: String,
    credential_ttl: Duration,
    challenge_ttl: Duration,
}

impl CredentialIssuer {
    /// Create an issuer from its signing key
    pub fn new(signing_key: SigningKey) -> Self {
        let did = did::encode_did_key(&signing_key.verifying_key().to_bytes());
        let defaults = VerifyConfig::default();
        Self {
            signing_key,
            did,
            credential_ttl: Duration::seconds(defaults.credential_ttl_secs),
            challenge_ttl: Duration::seconds(defaults.challenge_ttl_secs),
        }
    }

    /// Create an issuer from a hex-encoded 32-byte seed
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(seed_hex.trim_start_matches("0x"), &mut seed)
            .map_err(|e| StampError::Config(format!("Invalid issuer key: {}", e)))?;
        Ok(Self::new(SigningKey::from_bytes(&seed)))
    }

    /// Override credential lifetimes
    pub fn with_config(mut self, config: &VerifyConfig) -> Self {
        self.credential_ttl = Duration::seconds(config.credential_ttl_secs);
        self.challenge_ttl = Duration::seconds(config.challenge_ttl_secs);
        self
    }

    /// did:key of the issuer
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Versioned keyed hash of a record: `v0.0.0:base64(sha256(secret || sorted pairs))`
    pub fn record_hash(&self, record: &Record) -> Result<String> {
        let pairs: Vec<[&str; 2]> = record.iter().map(|(k, v)| [k.as_str(), v.as_str()]).collect();
        let json = serde_json::to_string(&pairs)?;

        let mut hasher = Sha256::new();
        hasher.update(hex::encode(self.signing_key.to_bytes()).as_bytes());
        hasher.update(json.as_bytes());
        Ok(format!(
            "v{}:{}",
            CREDENTIAL_VERSION,
            BASE64.encode(hasher.finalize())
        ))
    }

    /// Issue a stamp credential for a verified record
    #[instrument(skip(self, record))]
    pub fn issue_stamp(
        &self,
        address: &str,
        record: &Record,
        expires_in_seconds: Option<u64>,
    ) -> Result<VerifiableCredential> {
        let provider = record
            .get("type")
            .cloned()
            .ok_or_else(|| StampError::InvalidInput("Record without type".to_string()))?;
        let ttl = match expires_in_seconds {
            Some(seconds) => i64::try_from(seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| lifetime_out_of_range(seconds))?,
            None => self.credential_ttl,
        };

        let subject = CredentialSubject {
            id: did::pkh_did(address),
            provider,
            hash: Some(self.record_hash(record)?),
            ..Default::default()
        };
        self.sign(subject, Utc::now(), ttl)
    }

    /// Issue a short-lived credential carrying a challenge
    #[instrument(skip(self, challenge), fields(address = %challenge.address))]
    pub fn issue_challenge_credential(&self, challenge: &Challenge) -> Result<VerifiableCredential> {
        let subject = CredentialSubject {
            id: did::pkh_did(&challenge.address),
            provider: format!("{}{}", CHALLENGE_PROVIDER_PREFIX, challenge.credential_type),
            challenge: Some(challenge.challenge_text.clone()),
            address: Some(challenge.address.clone()),
            ..Default::default()
        };
        self.sign(subject, Utc::now(), self.challenge_ttl)
    }

    /// Check a challenge credential and return its challenge text.
    ///
    /// The credential must be signed by this issuer, unexpired, and bound to
    /// the given address and credential type.
    pub fn verify_challenge_credential(
        &self,
        credential: &VerifiableCredential,
        address: &str,
        credential_type: &str,
    ) -> std::result::Result<String, ChallengeError> {
        let invalid = || {
            ChallengeError::InvalidChallenge("signer' and 'provider".to_string())
        };

        if credential.issuer != self.did || !self.verify_credential(credential) {
            return Err(invalid());
        }

        let subject = &credential.credential_subject;
        let expected_provider = format!("{}{}", CHALLENGE_PROVIDER_PREFIX, credential_type);
        if subject.id != did::pkh_did(address) || subject.provider != expected_provider {
            return Err(invalid());
        }

        subject.challenge.clone().ok_or_else(invalid)
    }

    /// Whether a credential carries a valid signature from its issuer and is unexpired
    pub fn verify_credential(&self, credential: &VerifiableCredential) -> bool {
        self.verify_credential_at(credential, Utc::now())
    }

    pub fn verify_credential_at(&self, credential: &VerifiableCredential, now: DateTime<Utc>) -> bool {
        let Some(proof_value) = credential.proof_value() else {
            return false;
        };
        let Some(signature) = proof_value
            .strip_prefix('z')
            .and_then(|v| bs58::decode(v).into_vec().ok())
        else {
            return false;
        };

        let expired = DateTime::parse_from_rfc3339(&credential.expiration_date)
            .map(|exp| exp.with_timezone(&Utc) <= now)
            .unwrap_or(true);
        if expired {
            debug!(expiration = %credential.expiration_date, "Credential expired");
            return false;
        }

        let mut unsigned = credential.clone();
        unsigned.proof = None;
        let Ok(message) = serde_json::to_vec(&unsigned) else {
            return false;
        };

        did::verify_with_did(&credential.issuer, &message, &signature).unwrap_or(false)
    }

    /// Turn verification results into credential responses.
    ///
    /// Valid results get a credential plus merkle proofs over the record;
    /// invalid ones keep their error and code.
    #[instrument(skip(self, results), fields(count = results.len()))]
    pub fn issue_for_results(&self, address: &str, results: Vec<VerifyResult>) -> Vec<CredentialResponse> {
        results
            .into_iter()
            .map(|result| {
                if !result.verify_result.valid {
                    return CredentialResponse::error(
                        result.error.unwrap_or_else(|| crate::orchestrator::UNABLE_TO_VERIFY.to_string()),
                        result.code.unwrap_or(403),
                    );
                }

                let record = stamp_record(&result.credential_type, result.verify_result.record.unwrap_or_default());
                let issued = self
                    .issue_stamp(address, &record, result.verify_result.expires_in_seconds)
                    .and_then(|credential| {
                        let proofs = merkle::build_record_proofs(&record)?;
                        Ok(CredentialResponse::issued(record, credential).with_merkle(proofs))
                    });

                issued.unwrap_or_else(|e| {
                    error!(credential_type = %result.credential_type, error = %e, "Credential issuance failed");
                    CredentialResponse::error("Unable to produce a verifiable credential", 500)
                })
            })
            .collect()
    }

    fn sign(&self, subject: CredentialSubject, now: DateTime<Utc>, ttl: Duration) -> Result<VerifiableCredential> {
        let expires_at = now
            .checked_add_signed(ttl)
            .filter(|at| at.year() <= MAX_EXPIRY_YEAR)
            .ok_or_else(|| lifetime_out_of_range(ttl.num_seconds()))?;

        let issuance_date = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut credential = VerifiableCredential {
            context: vec![CREDENTIALS_CONTEXT.to_string()],
            credential_type: vec!["VerifiableCredential".to_string()],
            issuer: self.did.clone(),
            issuance_date: issuance_date.clone(),
            expiration_date: expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            credential_subject: subject,
            proof: None,
        };

        let message = serde_json::to_vec(&credential)?;
        let signature = self.signing_key.sign(&message);

        credential.proof = Some(CredentialProof {
            proof_type: PROOF_TYPE.to_string(),
            proof_purpose: PROOF_PURPOSE.to_string(),
            verification_method: format!(
                "{}#{}",
                self.did,
                self.did.strip_prefix("did:key:").unwrap_or_default()
            ),
            created: issuance_date,
            proof_value: format!("z{}", bs58::encode(signature.to_bytes()).into_string()),
        });
        Ok(credential)
    }
}

fn lifetime_out_of_range(seconds: impl std::fmt::Display) -> StampError {
    StampError::InvalidInput(format!("Credential lifetime of {}s is out of range", seconds))
}

/// Record a stamp is issued over: the provider record plus type and version.
///
/// A `pii` field in the provider record is appended to the type.
pub fn stamp_record(credential_type: &str, provider_record: Record) -> Record {
    let stamp_type = match provider_record.get("pii") {
        Some(pii) => format!("{}#{}", credential_type, pii),
        None => credential_type.to_string(),
    };

    let mut record = Record::new();
    record.insert("type".to_string(), stamp_type);
    record.insert("version".to_string(), CREDENTIAL_VERSION.to_string());
    record.extend(provider_record);
    record
}
