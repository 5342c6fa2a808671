//! Leaf hashing, Merkle multi-proofs and message normalization for CCIP manual execution.
//!
//! Everything in this crate is pure and synchronous: callers hand in decoded
//! events and commit reports, and get back leaves, proofs and encoded
//! execution reports. Fetching logs and submitting transactions happen
//! elsewhere.

pub mod codec;
pub mod error;
pub mod extra_args;
pub mod hasher;
pub mod lane;
pub mod merkle;
pub mod report;
pub mod sol;
pub mod types;

use alloy_primitives::{B256, U256};
use tiny_keccak::{Hasher, Keccak};

pub use codec::{
    AptosCodec, AptosEvent, ChainCodec, CodecRegistry, DecodeContext, EvmCodec, EvmLog, RawEvent, SolanaCodec,
    SolanaLog, KNOWN_CHAINS,
};
pub use error::{DecodeError, ExtraArgsError, HasherError, ProofError, ReportError};
pub use extra_args::{ExtraArgs, ExtraArgsEncoding, SvmExtraArgs};
pub use hasher::{hash_leaf, LeafHasher};
pub use lane::{Lane, LaneRegistry};
pub use merkle::{
    build_execution_proof, committed_tree, verify_multi_proof, BatchLeaf, ExecutionProof, MerkleTree, MultiProof,
};
pub use report::{build_execution_report, ExecutionReport};
pub use types::{
    CanonicalMessage, ChainAddress, ChainFamily, CommitReport, Hash256, LegacyFields, MessageHeader,
    ProtocolVersion, TokenAmount,
};

pub(crate) fn keccak256(data: &[u8]) -> B256 {
    let mut keccak = Keccak::v256();
    keccak.update(data);
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    B256::from(out)
}

/// Hashes the concatenation of 32-byte words, i.e. `keccak256(abi.encode(w0, w1, ...))`
/// for static word-sized values.
pub(crate) fn keccak256_words(words: &[[u8; 32]]) -> B256 {
    let mut keccak = Keccak::v256();
    for word in words {
        keccak.update(word);
    }
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    B256::from(out)
}

pub(crate) fn u64_to_bytes32(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

pub(crate) fn u256_to_bytes32(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

pub(crate) fn bool_to_bytes32(value: bool) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[31] = value as u8;
    out
}

pub(crate) fn copy_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
