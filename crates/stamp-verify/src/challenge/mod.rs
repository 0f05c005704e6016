//! Possession-of-address challenges
//!
//! A challenge is a provider-specific commitment text ending in a random
//! nonce. The caller proves control of the address by answering it with
//! either a legacy wallet signature or a DID-session signature.

pub mod cacao;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use stamp_common::crypto::eth;
use stamp_common::ChallengeError;
use tracing::debug;

pub use cacao::{verify_signed_challenge, SessionSigner, SignedChallenge};

/// Nonce size in bytes
pub const NONCE_BYTES: usize = 32;

/// Provider type used to link an additional wallet
pub const ADDRESS_LINK_TYPE: &str = "Signer";

const ADDRESS_LINK_COMMITMENT: &str =
    "I commit that this wallet is under my control and that I wish to link it with my Passport.";

/// Ephemeral challenge handed to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub address: String,
    pub credential_type: String,
    pub challenge_text: String,
}

/// Issue a fresh challenge for an address and credential type
pub fn issue_challenge(address: &str, credential_type: &str) -> Result<Challenge, ChallengeError> {
    if !eth::is_valid_address(address) {
        return Err(ChallengeError::InvalidAddress(address.to_string()));
    }
    if credential_type.is_empty() {
        return Err(ChallengeError::InvalidChallenge("missing type".to_string()));
    }

    let mut nonce = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    Ok(Challenge {
        address: address.to_lowercase(),
        credential_type: credential_type.to_string(),
        challenge_text: challenge_text(credential_type, &hex::encode(nonce)),
    })
}

/// Challenge text for a credential type and hex nonce
pub fn challenge_text(credential_type: &str, nonce: &str) -> String {
    let commitment = if credential_type == ADDRESS_LINK_TYPE {
        ADDRESS_LINK_COMMITMENT.to_string()
    } else {
        format!(
            "I commit that this wallet is under my control and that I wish to verify my {} stamp.",
            credential_type
        )
    };
    format!("{}\n\nnonce: {}", commitment, nonce)
}

/// Recover the address behind a legacy wallet signature of the challenge
pub fn verify_wallet_signature(challenge: &str, signature: &str) -> Result<String, ChallengeError> {
    eth::recover_personal_signer(challenge.as_bytes(), signature).map_err(|e| {
        debug!(error = %e, "Wallet signature recovery failed");
        ChallengeError::InvalidSignature
    })
}

/// Answer to a challenge, in whichever scheme the client used
#[derive(Debug, Clone, Copy)]
pub enum ChallengeAnswer<'a> {
    /// EIP-191 signature from the wallet itself
    Wallet(&'a str),
    /// DAG-JWS from a wallet-authorised DID session
    DidSession(&'a SignedChallenge),
}

/// Verifies challenge answers
#[derive(Debug, Clone)]
pub struct ChallengeVerifier {
    max_did_session_age: Duration,
}

impl Default for ChallengeVerifier {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl ChallengeVerifier {
    pub fn new(max_did_session_age: Duration) -> Self {
        Self { max_did_session_age }
    }

    /// Verify an answer and return the address that produced it
    pub fn verify(&self, answer: ChallengeAnswer<'_>, challenge: &str) -> Result<String, ChallengeError> {
        self.verify_at(answer, challenge, Utc::now())
    }

    pub fn verify_at(
        &self,
        answer: ChallengeAnswer<'_>,
        challenge: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ChallengeError> {
        match answer {
            ChallengeAnswer::Wallet(signature) => verify_wallet_signature(challenge, signature),
            ChallengeAnswer::DidSession(signed) => {
                verify_signed_challenge(signed, challenge, now, self.max_did_session_age)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn test_issue_challenge() {
        let address = "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED";
        let challenge = issue_challenge(address, ADDRESS_LINK_TYPE).unwrap();

        assert_eq!(challenge.address, address.to_lowercase());
        assert!(challenge
            .challenge_text
            .starts_with("I commit that this wallet is under my control and that I wish to link it with my Passport.\n\nnonce: "));
        let nonce = challenge.challenge_text.rsplit("nonce: ").next().unwrap();
        assert_eq!(nonce.len(), NONCE_BYTES * 2);
        assert!(hex::decode(nonce).is_ok());
    }

    #[test]
    fn test_nonces_differ() {
        let address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
        let a = issue_challenge(address, "Github").unwrap();
        let b = issue_challenge(address, "Github").unwrap();
        assert_ne!(a.challenge_text, b.challenge_text);
        assert!(a.challenge_text.contains("verify my Github stamp"));
    }

    #[test]
    fn test_issue_rejects_bad_address() {
        assert!(matches!(
            issue_challenge("0x123", "Github"),
            Err(ChallengeError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_wallet_signature() {
        let wallet = SigningKey::random(&mut OsRng);
        let address = eth::signer_address(&wallet);
        let challenge = issue_challenge(&address, "Github").unwrap();
        let signature =
            eth::sign_personal_message(&wallet, challenge.challenge_text.as_bytes()).unwrap();

        let verifier = ChallengeVerifier::default();
        assert_eq!(
            verifier
                .verify(ChallengeAnswer::Wallet(&signature), &challenge.challenge_text)
                .unwrap(),
            address
        );
    }

    #[test]
    fn test_wallet_signature_garbage() {
        let verifier = ChallengeVerifier::default();
        assert_eq!(
            verifier.verify(ChallengeAnswer::Wallet("0xdeadbeef"), "challenge"),
            Err(ChallengeError::InvalidSignature)
        );
    }

    #[test]
    fn test_did_session_answer() {
        let wallet = SigningKey::random(&mut OsRng);
        let session = SessionSigner::authorize(
            &wallet,
            ed25519_dalek::SigningKey::generate(&mut OsRng),
            "app.passport.xyz",
            Utc::now(),
            None,
        )
        .unwrap();
        let challenge = challenge_text("Github", "00");
        let signed = session.sign(&challenge);

        let verifier = ChallengeVerifier::default();
        assert_eq!(
            verifier
                .verify(ChallengeAnswer::DidSession(&signed), &challenge)
                .unwrap(),
            eth::signer_address(&wallet)
        );
    }
}
