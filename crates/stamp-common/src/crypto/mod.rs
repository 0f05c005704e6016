//! Cryptographic primitives for the stamp pipeline
//!
//! This module provides:
//! - Merkle proofs over flat verification records
//! - DID operations (did:key session keys, did:pkh wallets)
//! - Ethereum helpers (Keccak, addresses, EIP-191 personal messages)

pub mod did;
pub mod eth;
pub mod merkle;

// Re-export commonly used items
pub use merkle::{MerkleProof, MerkleTree, RecordProofs};
