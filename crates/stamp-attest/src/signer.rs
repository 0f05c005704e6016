//! Attestation signer
//!
//! Builds and signs the `PassportAttestationRequest` consumed by the on-chain
//! verifier contract:
//! 1. Resolve the chain configuration and validate the recipient
//! 2. Encode one stamp packet per credential, plus an optional score packet
//! 3. Price the fee in wei
//! 4. Hash as EIP-712 typed data under the chain's domain
//! 5. Sign with the production or testnet key, selected per chain

use crate::chains::{parse_chain_id, ChainInfo, ChainTable};
use crate::eip712::{
    AttestationRequestData, Eip712Domain, MultiAttestationRequest, PassportAttestationRequest,
};
use crate::fees::PriceFeed;
use crate::schema::{encode_score, encode_stamp_credential};
use crate::AttestConfig;
use k256::ecdsa::SigningKey;
use serde::Serialize;
use stamp_common::crypto::eth::{parse_address, sign_prehash, signer_address};
use stamp_common::{AttestationError, Result, StampError, VerifiableCredential};
use std::sync::Arc;
use tracing::{info, instrument};

/// Aggregate score to attest alongside (or instead of) stamps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreAttestation {
    pub score: f64,
    pub scorer_id: u32,
}

/// Signature split into its EVM components
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EthSignature {
    pub v: u8,
    pub r: String,
    pub s: String,
}

impl EthSignature {
    fn from_bytes(bytes: &[u8; 65]) -> Self {
        Self {
            v: bytes[64],
            r: format!("0x{}", hex::encode(&bytes[..32])),
            s: format!("0x{}", hex::encode(&bytes[32..64])),
        }
    }
}

/// Signed payload returned to the client for submission on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedPassportAttestation {
    pub passport: PassportAttestationRequest,
    pub signature: EthSignature,
}

/// Signs passport attestations for every configured chain
pub struct AttestationSigner {
    production: SigningKey,
    testnet: SigningKey,
    production_address: String,
    chains: Arc<ChainTable>,
    fees: Arc<PriceFeed>,
    config: AttestConfig,
}

impl AttestationSigner {
    pub fn new(
        production: SigningKey,
        testnet: SigningKey,
        chains: Arc<ChainTable>,
        fees: Arc<PriceFeed>,
        config: AttestConfig,
    ) -> Self {
        let production_address = signer_address(&production);
        info!(production = %production_address, testnet = %signer_address(&testnet), "Attestation signers loaded");
        Self {
            production,
            testnet,
            production_address,
            chains,
            fees,
            config,
        }
    }

    /// Build from hex-encoded secp256k1 private keys
    pub fn from_hex_keys(
        production_hex: &str,
        testnet_hex: &str,
        chains: Arc<ChainTable>,
        fees: Arc<PriceFeed>,
        config: AttestConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            parse_signing_key(production_hex)?,
            parse_signing_key(testnet_hex)?,
            chains,
            fees,
            config,
        ))
    }

    pub fn production_address(&self) -> &str {
        &self.production_address
    }

    /// Production key for chains whose issuer is the production signer, testnet key otherwise
    fn signer_for(&self, chain: &ChainInfo) -> &SigningKey {
        if chain.issuer_address.eq_ignore_ascii_case(&self.production_address) {
            &self.production
        } else {
            &self.testnet
        }
    }

    /// Encode, price and sign an attestation of `credentials` and `score` for `recipient`
    #[instrument(skip(self, credentials, score), fields(stamps = credentials.len(), score = score.is_some()))]
    pub async fn build_and_sign(
        &self,
        credentials: &[VerifiableCredential],
        score: Option<ScoreAttestation>,
        recipient: &str,
        chain_id_hex: &str,
        nonce: u128,
    ) -> Result<SignedPassportAttestation> {
        let chain = self.chains.get(chain_id_hex)?;
        let recipient_bytes = parse_address(recipient)
            .map_err(|_| AttestationError::InvalidRecipient(recipient.to_string()))?;

        let requests = build_requests(chain, recipient_bytes, credentials, score)?;
        if requests.is_empty() {
            return Err(StampError::InvalidInput("No verifiable credentials provided".to_string()));
        }

        let fee = self.fees.fee_wei(self.config.fee_usd).await?;

        let passport = PassportAttestationRequest {
            multi_attestation_request: requests,
            nonce,
            fee,
        };
        let domain = Eip712Domain {
            name: self.config.domain_name.clone(),
            version: self.config.domain_version.clone(),
            chain_id: parse_chain_id(chain_id_hex)?,
            verifying_contract: chain.verifier()?,
        };

        let digest = passport.signing_digest(&domain);
        let signature = sign_prehash(self.signer_for(chain), &digest)
            .map_err(|e| AttestationError::Signing(e.to_string()))?;

        info!(chain = %chain_id_hex, %recipient, fee = %fee, "Signed passport attestation");
        Ok(SignedPassportAttestation {
            passport,
            signature: EthSignature::from_bytes(&signature),
        })
    }
}

/// One multi-attestation request per schema present, stamps first
pub fn build_requests(
    chain: &ChainInfo,
    recipient: [u8; 20],
    credentials: &[VerifiableCredential],
    score: Option<ScoreAttestation>,
) -> std::result::Result<Vec<MultiAttestationRequest>, AttestationError> {
    let mut requests = Vec::with_capacity(2);

    if !credentials.is_empty() {
        let data = credentials
            .iter()
            .map(|credential| {
                encode_stamp_credential(credential)
                    .map(|packet| AttestationRequestData::new(recipient, packet))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        requests.push(MultiAttestationRequest {
            schema: chain.stamp_schema()?,
            data,
        });
    }

    if let Some(score) = score {
        requests.push(MultiAttestationRequest {
            schema: chain.score_schema()?,
            data: vec![AttestationRequestData::new(
                recipient,
                encode_score(score.score, score.scorer_id)?,
            )],
        });
    }

    Ok(requests)
}

fn parse_signing_key(key_hex: &str) -> Result<SigningKey> {
    let bytes = hex::decode(key_hex.trim_start_matches("0x"))
        .map_err(|e| StampError::Config(format!("Invalid attestation key hex: {}", e)))?;
    SigningKey::from_slice(&bytes)
        .map_err(|e| StampError::Config(format!("Invalid attestation key: {}", e)))
}
