//! EIP-712 typed data for passport attestations
//!
//! The signed object is a `PassportAttestationRequest`:
//!
//! ```text
//! PassportAttestationRequest {
//!     multiAttestationRequest: MultiAttestationRequest[] {
//!         schema: bytes32,
//!         data: AttestationRequestData[] { recipient, expirationTime, revocable, refUID, data, value },
//!     },
//!     nonce: uint256,
//!     fee: uint256,
//! }
//! ```
//!
//! JSON serialization follows the wire format expected by the verifier
//! contract's clients: byte strings as `0x` hex, big integers as decimal
//! strings.

use serde::{Serialize, Serializer};
use stamp_common::crypto::eth::{format_address, keccak256};

use crate::schema::{uint_word, WORD};

pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub const ATTESTATION_REQUEST_DATA_TYPE: &str = "AttestationRequestData(address recipient,uint64 expirationTime,bool revocable,bytes32 refUID,bytes data,uint256 value)";

pub const MULTI_ATTESTATION_REQUEST_TYPE: &str =
    "MultiAttestationRequest(bytes32 schema,AttestationRequestData[] data)";

pub const PASSPORT_ATTESTATION_REQUEST_TYPE: &str = "PassportAttestationRequest(MultiAttestationRequest[] multiAttestationRequest,uint256 nonce,uint256 fee)";

/// Domain separating signatures per chain and verifier contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: [u8; 20],
}

impl Eip712Domain {
    pub fn separator(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(5 * WORD);
        encoded.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.name.as_bytes()));
        encoded.extend_from_slice(&keccak256(self.version.as_bytes()));
        encoded.extend_from_slice(&uint_word(self.chain_id as u128));
        encoded.extend_from_slice(&address_word(&self.verifying_contract));
        keccak256(&encoded)
    }
}

/// One attestation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRequestData {
    #[serde(serialize_with = "serialize_address")]
    pub recipient: [u8; 20],
    #[serde(serialize_with = "serialize_decimal")]
    pub expiration_time: u64,
    pub revocable: bool,
    #[serde(rename = "refUID", serialize_with = "serialize_hex")]
    pub ref_uid: [u8; 32],
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
    #[serde(serialize_with = "serialize_decimal")]
    pub value: u128,
}

impl AttestationRequestData {
    /// Non-expiring, revocable, unreferenced, zero-value entry
    pub fn new(recipient: [u8; 20], data: Vec<u8>) -> Self {
        Self {
            recipient,
            expiration_time: 0,
            revocable: true,
            ref_uid: [0u8; 32],
            data,
            value: 0,
        }
    }

    pub fn type_hash() -> [u8; 32] {
        keccak256(ATTESTATION_REQUEST_DATA_TYPE.as_bytes())
    }

    pub fn hash_struct(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(7 * WORD);
        encoded.extend_from_slice(&Self::type_hash());
        encoded.extend_from_slice(&address_word(&self.recipient));
        encoded.extend_from_slice(&uint_word(self.expiration_time as u128));
        encoded.extend_from_slice(&uint_word(self.revocable as u128));
        encoded.extend_from_slice(&self.ref_uid);
        encoded.extend_from_slice(&keccak256(&self.data));
        encoded.extend_from_slice(&uint_word(self.value));
        keccak256(&encoded)
    }
}

/// Attestation entries sharing one schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiAttestationRequest {
    #[serde(serialize_with = "serialize_hex")]
    pub schema: [u8; 32],
    pub data: Vec<AttestationRequestData>,
}

impl MultiAttestationRequest {
    pub fn type_hash() -> [u8; 32] {
        keccak256(format!("{}{}", MULTI_ATTESTATION_REQUEST_TYPE, ATTESTATION_REQUEST_DATA_TYPE).as_bytes())
    }

    pub fn hash_struct(&self) -> [u8; 32] {
        let data: Vec<[u8; 32]> = self.data.iter().map(AttestationRequestData::hash_struct).collect();

        let mut encoded = Vec::with_capacity(3 * WORD);
        encoded.extend_from_slice(&Self::type_hash());
        encoded.extend_from_slice(&self.schema);
        encoded.extend_from_slice(&hash_array(&data));
        keccak256(&encoded)
    }
}

/// The object hashed and signed for the verifier contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportAttestationRequest {
    pub multi_attestation_request: Vec<MultiAttestationRequest>,
    #[serde(serialize_with = "serialize_decimal")]
    pub nonce: u128,
    #[serde(serialize_with = "serialize_decimal")]
    pub fee: u128,
}

impl PassportAttestationRequest {
    pub fn type_hash() -> [u8; 32] {
        // Referenced types follow the primary type in alphabetical order
        keccak256(
            format!(
                "{}{}{}",
                PASSPORT_ATTESTATION_REQUEST_TYPE,
                ATTESTATION_REQUEST_DATA_TYPE,
                MULTI_ATTESTATION_REQUEST_TYPE
            )
            .as_bytes(),
        )
    }

    pub fn hash_struct(&self) -> [u8; 32] {
        let requests: Vec<[u8; 32]> = self
            .multi_attestation_request
            .iter()
            .map(MultiAttestationRequest::hash_struct)
            .collect();

        let mut encoded = Vec::with_capacity(4 * WORD);
        encoded.extend_from_slice(&Self::type_hash());
        encoded.extend_from_slice(&hash_array(&requests));
        encoded.extend_from_slice(&uint_word(self.nonce));
        encoded.extend_from_slice(&uint_word(self.fee));
        keccak256(&encoded)
    }

    /// `keccak256(0x1901 || domainSeparator || hashStruct)`
    pub fn signing_digest(&self, domain: &Eip712Domain) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(2 + 2 * WORD);
        encoded.extend_from_slice(&[0x19, 0x01]);
        encoded.extend_from_slice(&domain.separator());
        encoded.extend_from_slice(&self.hash_struct());
        keccak256(&encoded)
    }
}

fn address_word(address: &[u8; 20]) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address);
    word
}

fn hash_array(hashes: &[[u8; 32]]) -> [u8; 32] {
    keccak256(&hashes.concat())
}

fn serialize_address<S: Serializer>(address: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_address(address))
}

fn serialize_hex<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn serialize_decimal<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: ToString,
{
    serializer.serialize_str(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stamp_common::crypto::eth::parse_address;

    fn passport(nonce: u128) -> PassportAttestationRequest {
        let recipient = parse_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        PassportAttestationRequest {
            multi_attestation_request: vec![MultiAttestationRequest {
                schema: [0x11; 32],
                data: vec![AttestationRequestData::new(recipient, vec![1, 2, 3])],
            }],
            nonce,
            fee: 1_000,
        }
    }

    fn domain(chain_id: u64) -> Eip712Domain {
        Eip712Domain {
            name: "GitcoinVerifier".to_string(),
            version: "1".to_string(),
            chain_id,
            verifying_contract: [0x22; 20],
        }
    }

    #[test]
    fn test_domain_type_hash() {
        assert_eq!(
            hex::encode(keccak256(DOMAIN_TYPE.as_bytes())),
            "8b73c3c69bb8fe3d512ecc4cf759cc79239f7b179b0ffacaa9a75d522b39400f"
        );
    }

    #[test]
    fn test_domain_separator_reference_vector() {
        // "Ether Mail" domain from the EIP-712 reference test
        let domain = Eip712Domain {
            name: "Ether Mail".to_string(),
            version: "1".to_string(),
            chain_id: 1,
            verifying_contract: parse_address("0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC").unwrap(),
        };
        assert_eq!(
            hex::encode(domain.separator()),
            "f2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f"
        );
    }

    #[test]
    fn test_digest_binds_nonce_and_chain() {
        let base = passport(1).signing_digest(&domain(10));
        assert_eq!(base, passport(1).signing_digest(&domain(10)));
        assert_ne!(base, passport(2).signing_digest(&domain(10)));
        assert_ne!(base, passport(1).signing_digest(&domain(11)));
    }

    #[test]
    fn test_request_data_defaults() {
        let entry = AttestationRequestData::new([0u8; 20], vec![]);
        assert_eq!(entry.expiration_time, 0);
        assert!(entry.revocable);
        assert_eq!(entry.ref_uid, [0u8; 32]);
        assert_eq!(entry.value, 0);
    }

    #[test]
    fn test_json_is_string_encoded() {
        let json = serde_json::to_value(passport(u128::MAX)).unwrap();

        assert_eq!(json["nonce"], u128::MAX.to_string());
        assert_eq!(json["fee"], "1000");

        let request = &json["multiAttestationRequest"][0];
        assert_eq!(request["schema"], format!("0x{}", "11".repeat(32)));

        let entry = &request["data"][0];
        assert_eq!(entry["recipient"], "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        assert_eq!(entry["expirationTime"], "0");
        assert_eq!(entry["revocable"], true);
        assert_eq!(entry["refUID"], format!("0x{}", "00".repeat(32)));
        assert_eq!(entry["data"], "0x010203");
        assert_eq!(entry["value"], "0");
    }
}
