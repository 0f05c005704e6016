//! Ethereum helpers
//!
//! Keccak-256, address derivation from secp256k1 keys and EIP-191
//! personal-message signing and recovery.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// 20-byte account address of a public key
pub fn address_of(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Lowercase `0x`-prefixed hex form of an address
pub fn format_address(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

/// EIP-55 mixed-case checksum form of an address
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Address of the key behind a signer
pub fn signer_address(key: &SigningKey) -> String {
    format_address(&address_of(key.verifying_key()))
}

/// Whether the string is `0x` followed by 40 hex characters
pub fn is_valid_address(address: &str) -> bool {
    parse_address(address).is_ok()
}

/// Parse a `0x`-prefixed hex address
pub fn parse_address(address: &str) -> Result<[u8; 20], EthError> {
    let hex_part = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .ok_or_else(|| EthError::InvalidAddress(address.to_string()))?;
    if hex_part.len() != 40 {
        return Err(EthError::InvalidAddress(address.to_string()));
    }

    let mut out = [0u8; 20];
    hex::decode_to_slice(hex_part, &mut out)
        .map_err(|_| EthError::InvalidAddress(address.to_string()))?;
    Ok(out)
}

/// EIP-191 personal message digest
pub fn hash_personal_message(message: &[u8]) -> [u8; 32] {
    let mut data = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    data.extend_from_slice(message);
    keccak256(&data)
}

/// Sign a prehashed digest, returning the 65-byte `r || s || v` form with `v` in {27, 28}
pub fn sign_prehash(key: &SigningKey, digest: &[u8; 32]) -> Result<[u8; 65], EthError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest)
        .map_err(|e| EthError::Signing(e.to_string()))?;

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = 27 + recovery_id.to_byte();
    Ok(out)
}

/// Sign a personal message, returning `0x`-prefixed hex
pub fn sign_personal_message(key: &SigningKey, message: &[u8]) -> Result<String, EthError> {
    let signature = sign_prehash(key, &hash_personal_message(message))?;
    Ok(format!("0x{}", hex::encode(signature)))
}

/// Recover the signer address of a personal message signature.
///
/// Accepts `v` either as 0/1 or 27/28.
pub fn recover_personal_signer(message: &[u8], signature_hex: &str) -> Result<String, EthError> {
    let raw = hex::decode(signature_hex.trim_start_matches("0x"))
        .map_err(|_| EthError::MalformedSignature)?;
    if raw.len() != 65 {
        return Err(EthError::MalformedSignature);
    }

    let signature = Signature::from_slice(&raw[..64]).map_err(|_| EthError::MalformedSignature)?;
    let v = match raw[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        _ => return Err(EthError::MalformedSignature),
    };
    let recovery_id = RecoveryId::from_byte(v).ok_or(EthError::MalformedSignature)?;

    let digest = hash_personal_message(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| EthError::RecoveryFailed)?;

    Ok(format_address(&address_of(&key)))
}

/// Ethereum helper errors
#[derive(Debug, Error)]
pub enum EthError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Malformed signature")]
    MalformedSignature,

    #[error("Signer recovery failed")]
    RecoveryFailed,

    #[error("Signing failed: {0}")]
    Signing(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_known_address() {
        // Private key 1 maps to a well known address
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKey::from_slice(&secret).unwrap();
        assert_eq!(
            signer_address(&key),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_checksum_address() {
        let address = parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            to_checksum_address(&address),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_personal_sign_and_recover() {
        let key = SigningKey::random(&mut OsRng);
        let message = b"I commit that this wallet is under my control";
        let signature = sign_personal_message(&key, message).unwrap();

        let recovered = recover_personal_signer(message, &signature).unwrap();
        assert_eq!(recovered, signer_address(&key));

        let other = recover_personal_signer(b"another message", &signature);
        assert_ne!(other.ok(), Some(signer_address(&key)));
    }

    #[test]
    fn test_malformed_signature() {
        assert!(matches!(
            recover_personal_signer(b"msg", "0x1234"),
            Err(EthError::MalformedSignature)
        ));
        assert!(matches!(
            recover_personal_signer(b"msg", "zz"),
            Err(EthError::MalformedSignature)
        ));
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
        assert!(!is_valid_address("7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
        assert!(!is_valid_address("0x7e5f"));
        assert!(!is_valid_address("0xzz5f4552091a69125d5dfcb7b8c2659029395bdf"));
    }
}
