//! Merkle Tree for Record Proofs
//!
//! Implements a binary Merkle tree using SHA-256 hashing for:
//! - A compact commitment (root) to every field of a verification record
//! - Per-field inclusion proofs that reveal one value without the others
//!
//! Leaves are `sha256(value)`, interior nodes `sha256(left || right)`. When a
//! level has an odd number of nodes the last one is promoted unchanged.

use crate::error::MerkleError;
use crate::types::payload::Record;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hash size in bytes (SHA-256 output)
pub const HASH_SIZE: usize = 32;

/// Side of the sibling relative to the running hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingPosition {
    Left,
    Right,
}

/// One step of a proof: a sibling hash and the side it sits on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub position: SiblingPosition,
    /// Base64 sibling hash
    pub data: String,
}

/// Merkle proof containing sibling hashes from leaf to root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub siblings: Vec<ProofStep>,
}

impl MerkleProof {
    /// Verify the proof for a plaintext value against a base64 root.
    ///
    /// Never fails: malformed hashes simply yield `false`.
    pub fn verify(&self, value: &str, root: &str) -> bool {
        let Ok(expected) = decode_hash(root) else {
            return false;
        };

        let mut current = hash_leaf(value.as_bytes());
        for step in &self.siblings {
            let Ok(sibling) = decode_hash(&step.data) else {
                return false;
            };
            current = match step.position {
                SiblingPosition::Left => hash_pair(&sibling, &current),
                SiblingPosition::Right => hash_pair(&current, &sibling),
            };
        }

        current == expected
    }
}

/// Root plus one proof per record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordProofs {
    /// Base64 root hash
    pub root: String,
    pub proofs: BTreeMap<String, MerkleProof>,
}

/// Binary Merkle tree implementation
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Levels from leaves (index 0) up to the root level
    levels: Vec<Vec<[u8; HASH_SIZE]>>,
}

impl MerkleTree {
    /// Create a tree from leaf hashes. Requires at least two leaves.
    pub fn from_leaves(leaves: Vec<[u8; HASH_SIZE]>) -> Result<Self, MerkleError> {
        if leaves.len() < 2 {
            return Err(MerkleError::TooFewLeaves);
        }

        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next: Vec<[u8; HASH_SIZE]> = level
                .chunks(2)
                .map(|pair| match pair.get(1) {
                    Some(right) => hash_pair(&pair[0], right),
                    None => pair[0],
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Get current root hash
    pub fn root(&self) -> [u8; HASH_SIZE] {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; HASH_SIZE])
    }

    /// Get number of leaves
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(Vec::len).unwrap_or(0)
    }

    /// Generate proof for a leaf at the given index
    pub fn generate_proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::new();
        let mut index = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = index ^ 1;
            // Promoted nodes have no sibling at this level
            if let Some(sibling) = level.get(sibling_index) {
                let position = if index % 2 == 0 {
                    SiblingPosition::Right
                } else {
                    SiblingPosition::Left
                };
                siblings.push(ProofStep {
                    position,
                    data: BASE64.encode(sibling),
                });
            }
            index /= 2;
        }

        Some(MerkleProof { siblings })
    }
}

/// Build a tree over a record and return its root with a proof per field.
///
/// Fields are taken in sorted key order. At least two fields must carry a
/// non-empty value.
pub fn build_record_proofs(record: &Record) -> Result<RecordProofs, MerkleError> {
    let populated = record.values().filter(|v| !v.is_empty()).count();
    if populated < 2 {
        return Err(MerkleError::TooFewLeaves);
    }

    let leaves = record.values().map(|v| hash_leaf(v.as_bytes())).collect();
    let tree = MerkleTree::from_leaves(leaves)?;

    let proofs = record
        .keys()
        .enumerate()
        .filter_map(|(index, key)| tree.generate_proof(index).map(|p| (key.clone(), p)))
        .collect();

    Ok(RecordProofs {
        root: BASE64.encode(tree.root()),
        proofs,
    })
}

/// Check a field value against a root. A missing proof is simply `false`.
pub fn verify(proof: Option<&MerkleProof>, value: &str, root: &str) -> bool {
    proof.map(|p| p.verify(value, root)).unwrap_or(false)
}

/// Hash a leaf value
pub fn hash_leaf(data: &[u8]) -> [u8; HASH_SIZE] {
    Sha256::digest(data).into()
}

/// Hash two nodes together
pub fn hash_pair(left: &[u8; HASH_SIZE], right: &[u8; HASH_SIZE]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn decode_hash(encoded: &str) -> Result<[u8; HASH_SIZE], ()> {
    let bytes = BASE64.decode(encoded).map_err(|_| ())?;
    bytes.try_into().map_err(|_| ())
}
