//! DID-session (CACAO) challenge signatures
//!
//! A DID session is an Ed25519 session key that a wallet authorised through a
//! Sign-In-With-Ethereum message. The wallet signature over that message is
//! carried as a capability object (CACAO). The session key then signs a JWS
//! whose payload is the CID of the challenge text.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. capability decodes and is fresh → else [`ChallengeError::CredentialTooOld`]
//! 2. JWS payload is the CID of the expected challenge → else [`ChallengeError::ChallengeMismatch`]
//! 3. JWS and capability signatures are valid → else [`ChallengeError::InvalidSignature`]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stamp_common::crypto::{did, eth};
use stamp_common::ChallengeError;
use tracing::debug;

/// CIDv1 prefix: version 1, dag-cbor codec, sha2-256 multihash of 32 bytes
const CID_PREFIX: [u8; 4] = [0x01, 0x71, 0x12, 0x20];

/// Signed challenge produced by a DID session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedChallenge {
    /// JWS signatures over `payload`
    pub signatures: Vec<JwsSignature>,
    /// Base64url CID bytes of the challenge
    pub payload: String,
    /// Base64url JSON capability
    pub cacao: String,
    /// did:pkh of the wallet behind the session
    pub issuer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwsSignature {
    pub protected: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JwsHeader {
    alg: String,
    kid: String,
}

/// Capability object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cacao {
    pub h: CacaoHeader,
    pub p: CacaoPayload,
    pub s: CacaoSignature,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacaoHeader {
    pub t: String,
}

/// Sign-In-With-Ethereum fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacaoPayload {
    pub domain: String,
    /// did:pkh of the wallet
    pub iss: String,
    /// did:key of the session
    pub aud: String,
    pub version: String,
    pub nonce: String,
    pub iat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacaoSignature {
    pub t: String,
    pub s: String,
}

impl CacaoPayload {
    /// EIP-4361 message the wallet signed
    pub fn siwe_message(&self) -> Result<String, ChallengeError> {
        let parsed = did::ParsedDid::parse(&self.iss).map_err(|_| ChallengeError::InvalidSignature)?;
        let mut parts = parsed.identifier.split(':');
        let (Some("eip155"), Some(chain_id), Some(account), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ChallengeError::InvalidSignature);
        };
        let address = eth::parse_address(account).map_err(|_| ChallengeError::InvalidSignature)?;

        let mut suffix = vec![
            format!("URI: {}", self.aud),
            format!("Version: {}", self.version),
            format!("Chain ID: {}", chain_id),
            format!("Nonce: {}", self.nonce),
            format!("Issued At: {}", self.iat),
        ];
        if let Some(exp) = &self.exp {
            suffix.push(format!("Expiration Time: {}", exp));
        }
        if let Some(resources) = &self.resources {
            suffix.push("Resources:".to_string());
            suffix.extend(resources.iter().map(|r| format!("- {}", r)));
        }

        let mut prefix = format!(
            "{} wants you to sign in with your Ethereum account:\n{}\n\n{}",
            self.domain,
            eth::to_checksum_address(&address),
            self.statement.as_deref().unwrap_or("")
        );
        if self.statement.is_some() {
            prefix.push('\n');
        }

        Ok(format!("{}\n{}", prefix, suffix.join("\n")))
    }
}

impl Cacao {
    fn decode(encoded: &str) -> Option<Self> {
        let bytes = B64URL.decode(encoded).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn encode(&self) -> String {
        B64URL.encode(serde_json::to_vec(self).unwrap_or_default())
    }

    fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Ok(issued_at) = DateTime::parse_from_rfc3339(&self.p.iat) else {
            return false;
        };
        if now.signed_duration_since(issued_at.with_timezone(&Utc)) > max_age {
            return false;
        }

        match &self.p.exp {
            None => true,
            Some(exp) => DateTime::parse_from_rfc3339(exp)
                .map(|exp| exp.with_timezone(&Utc) > now)
                .unwrap_or(false),
        }
    }
}

/// CID bytes of a challenge encoded as a dag-cbor text string
pub fn challenge_cid(challenge: &str) -> Vec<u8> {
    let text = challenge.as_bytes();
    let len = text.len();

    let mut cbor = Vec::with_capacity(len + 9);
    match len {
        0..=23 => cbor.push(0x60 | len as u8),
        24..=0xff => cbor.extend_from_slice(&[0x78, len as u8]),
        0x100..=0xffff => {
            cbor.push(0x79);
            cbor.extend_from_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            cbor.push(0x7a);
            cbor.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
    cbor.extend_from_slice(text);

    let mut cid = CID_PREFIX.to_vec();
    cid.extend_from_slice(&Sha256::digest(&cbor));
    cid
}

/// Verify a DID-session signed challenge and return the wallet address
pub fn verify_signed_challenge(
    signed: &SignedChallenge,
    expected_challenge: &str,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<String, ChallengeError> {
    // (a) freshness
    let cacao = Cacao::decode(&signed.cacao).ok_or(ChallengeError::CredentialTooOld)?;
    if !cacao.is_fresh(now, max_age) {
        debug!(iat = %cacao.p.iat, "DID session capability is stale");
        return Err(ChallengeError::CredentialTooOld);
    }

    // (b) payload must be the CID of the expected challenge
    let payload = B64URL
        .decode(&signed.payload)
        .map_err(|_| ChallengeError::ChallengeMismatch)?;
    if payload != challenge_cid(expected_challenge) {
        return Err(ChallengeError::ChallengeMismatch);
    }

    // (c) signatures, no time checks here
    verify_signatures(signed, &cacao)?;

    did::address_from_pkh(&signed.issuer).ok_or(ChallengeError::InvalidSignature)
}

fn verify_signatures(signed: &SignedChallenge, cacao: &Cacao) -> Result<(), ChallengeError> {
    let jws = signed.signatures.first().ok_or(ChallengeError::InvalidSignature)?;

    let header: JwsHeader = B64URL
        .decode(&jws.protected)
        .ok()
        .and_then(|h| serde_json::from_slice(&h).ok())
        .ok_or(ChallengeError::InvalidSignature)?;
    let session = did::ParsedDid::parse(&header.kid).map_err(|_| ChallengeError::InvalidSignature)?;
    if session.did != cacao.p.aud {
        return Err(ChallengeError::InvalidSignature);
    }

    let signing_input = format!("{}.{}", jws.protected, signed.payload);
    let signature = B64URL
        .decode(&jws.signature)
        .ok()
        .and_then(|s| Signature::from_slice(&s).ok())
        .ok_or(ChallengeError::InvalidSignature)?;
    session
        .verifying_key()
        .map_err(|_| ChallengeError::InvalidSignature)?
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| ChallengeError::InvalidSignature)?;

    if cacao.p.iss != signed.issuer || cacao.h.t != "eip4361" || cacao.s.t != "eip191" {
        return Err(ChallengeError::InvalidSignature);
    }

    let message = cacao.p.siwe_message()?;
    let recovered = eth::recover_personal_signer(message.as_bytes(), &cacao.s.s)
        .map_err(|_| ChallengeError::InvalidSignature)?;
    let claimed = did::ParsedDid::parse(&cacao.p.iss)
        .ok()
        .and_then(|d| d.account_address().ok().map(str::to_lowercase))
        .ok_or(ChallengeError::InvalidSignature)?;

    if recovered != claimed {
        return Err(ChallengeError::InvalidSignature);
    }
    Ok(())
}

/// Client side of a DID session: a wallet-authorised Ed25519 session key
pub struct SessionSigner {
    session_key: SigningKey,
    cacao: Cacao,
    issuer: String,
}

impl SessionSigner {
    /// Authorise `session_key` with the wallet key
    pub fn authorize(
        wallet: &k256::ecdsa::SigningKey,
        session_key: SigningKey,
        domain: &str,
        issued_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ChallengeError> {
        let issuer = did::pkh_did(&eth::signer_address(wallet));
        let payload = CacaoPayload {
            domain: domain.to_string(),
            iss: issuer.clone(),
            aud: did::encode_did_key(&session_key.verifying_key().to_bytes()),
            version: "1".to_string(),
            nonce: hex::encode(rand::random::<[u8; 8]>()),
            iat: issued_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            exp: expires_at.map(|e| e.to_rfc3339_opts(SecondsFormat::Millis, true)),
            statement: Some("Give this application access to some of your data".to_string()),
            resources: None,
        };

        let message = payload.siwe_message()?;
        let signature = eth::sign_personal_message(wallet, message.as_bytes())
            .map_err(|_| ChallengeError::InvalidSignature)?;

        Ok(Self {
            session_key,
            cacao: Cacao {
                h: CacaoHeader { t: "eip4361".to_string() },
                p: payload,
                s: CacaoSignature { t: "eip191".to_string(), s: signature },
            },
            issuer,
        })
    }

    /// did:key of the session
    pub fn session_did(&self) -> &str {
        &self.cacao.p.aud
    }

    /// Sign a challenge text
    pub fn sign(&self, challenge: &str) -> SignedChallenge {
        let header = JwsHeader {
            alg: "EdDSA".to_string(),
            kid: format!(
                "{}#{}",
                self.cacao.p.aud,
                self.cacao.p.aud.strip_prefix("did:key:").unwrap_or_default()
            ),
        };
        let protected = B64URL.encode(serde_json::to_vec(&header).unwrap_or_default());
        let payload = B64URL.encode(challenge_cid(challenge));
        let signature = self
            .session_key
            .sign(format!("{}.{}", protected, payload).as_bytes());

        SignedChallenge {
            signatures: vec![JwsSignature {
                protected,
                signature: B64URL.encode(signature.to_bytes()),
            }],
            payload,
            cacao: self.cacao.encode(),
            issuer: self.issuer.clone(),
        }
    }
}
