//! EAS schema encoders
//!
//! ABI encodings of the two attestation schemas:
//! - stamp: `bytes32 provider, bytes32 hash`
//! - score: `uint256 score, uint32 scorer_id, uint8 score_decimals`
//!
//! Every field is static, so each encodes as one 32-byte word.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use stamp_common::{AttestationError, VerifiableCredential};
use std::str::FromStr;

/// ABI word size
pub const WORD: usize = 32;

/// Decimals of the fixed-point score
pub const SCORE_DECIMALS: u8 = 18;

/// Decoded stamp packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampData {
    pub provider: String,
    pub hash: [u8; 32],
}

/// Decoded score packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreData {
    /// Score scaled by 10^score_decimals
    pub score: u128,
    pub scorer_id: u32,
    pub score_decimals: u8,
}

/// Encode `bytes32 provider, bytes32 hash`.
///
/// The provider is UTF-8, right-padded with zeros, at most 31 bytes.
pub fn encode_stamp(provider: &str, hash: &[u8; 32]) -> Result<Vec<u8>, AttestationError> {
    let bytes = provider.as_bytes();
    if bytes.len() > WORD - 1 {
        return Err(AttestationError::Encoding(format!(
            "provider '{}' longer than 31 bytes",
            provider
        )));
    }

    let mut out = vec![0u8; 2 * WORD];
    out[..bytes.len()].copy_from_slice(bytes);
    out[WORD..].copy_from_slice(hash);
    Ok(out)
}

/// Encode a stamp credential's provider and content hash
pub fn encode_stamp_credential(credential: &VerifiableCredential) -> Result<Vec<u8>, AttestationError> {
    let subject = &credential.credential_subject;
    let hash = subject
        .hash
        .as_deref()
        .ok_or_else(|| AttestationError::InvalidCredentialHash("missing hash".to_string()))?;
    encode_stamp(&subject.provider, &decode_credential_hash(hash)?)
}

/// Decode the digest inside a `v<version>:<base64>` credential hash
pub fn decode_credential_hash(hash: &str) -> Result<[u8; 32], AttestationError> {
    let encoded = hash
        .split_once(':')
        .map(|(_, b64)| b64)
        .ok_or_else(|| AttestationError::InvalidCredentialHash(hash.to_string()))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| AttestationError::InvalidCredentialHash(hash.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| AttestationError::InvalidCredentialHash(hash.to_string()))
}

pub fn decode_stamp(data: &[u8]) -> Result<StampData, AttestationError> {
    if data.len() != 2 * WORD {
        return Err(AttestationError::Encoding(format!(
            "stamp packet must be {} bytes, got {}",
            2 * WORD,
            data.len()
        )));
    }

    let provider_bytes = &data[..WORD];
    let end = provider_bytes.iter().position(|b| *b == 0).unwrap_or(WORD);
    let provider = String::from_utf8(provider_bytes[..end].to_vec())
        .map_err(|e| AttestationError::Encoding(e.to_string()))?;

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&data[WORD..]);
    Ok(StampData { provider, hash })
}

/// Convert a floating score to an 18-decimal fixed-point integer
pub fn score_to_fixed(score: f64) -> Result<u128, AttestationError> {
    if !score.is_finite() || score < 0.0 {
        return Err(AttestationError::InvalidScore(score.to_string()));
    }

    // Go through the shortest decimal representation so 23.45 stays 23.45
    let decimal = Decimal::from_str(&score.to_string())
        .map_err(|e| AttestationError::InvalidScore(e.to_string()))?;
    decimal
        .checked_mul(Decimal::from(10u64.pow(SCORE_DECIMALS as u32)))
        .and_then(|scaled| scaled.trunc().to_u128())
        .ok_or_else(|| AttestationError::InvalidScore(score.to_string()))
}

/// Encode `uint256 score, uint32 scorer_id, uint8 score_decimals`
pub fn encode_score(score: f64, scorer_id: u32) -> Result<Vec<u8>, AttestationError> {
    let fixed = score_to_fixed(score)?;

    let mut out = Vec::with_capacity(3 * WORD);
    out.extend_from_slice(&uint_word(fixed));
    out.extend_from_slice(&uint_word(scorer_id as u128));
    out.extend_from_slice(&uint_word(SCORE_DECIMALS as u128));
    Ok(out)
}

pub fn decode_score(data: &[u8]) -> Result<ScoreData, AttestationError> {
    if data.len() != 3 * WORD {
        return Err(AttestationError::Encoding(format!(
            "score packet must be {} bytes, got {}",
            3 * WORD,
            data.len()
        )));
    }

    let score = read_uint(&data[..WORD])?;
    let scorer_id = u32::try_from(read_uint(&data[WORD..2 * WORD])?)
        .map_err(|_| AttestationError::Encoding("scorer_id exceeds uint32".to_string()))?;
    let score_decimals = u8::try_from(read_uint(&data[2 * WORD..])?)
        .map_err(|_| AttestationError::Encoding("score_decimals exceeds uint8".to_string()))?;

    Ok(ScoreData {
        score,
        scorer_id,
        score_decimals,
    })
}

/// Big-endian 32-byte word of an unsigned integer
pub fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn read_uint(word: &[u8]) -> Result<u128, AttestationError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(AttestationError::Encoding("integer exceeds 128 bits".to_string()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..WORD]);
    Ok(u128::from_be_bytes(low))
}
