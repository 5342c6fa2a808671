use alloy_primitives::B256;
use thiserror::Error;

use crate::types::{ChainFamily, ProtocolVersion};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExtraArgsError {
    #[error("extra args shorter than the 4-byte tag")]
    TooShort,
    #[error("unknown extra args tag 0x{}", hex::encode(.0))]
    UnknownTag([u8; 4]),
    #[error("malformed {tag} payload: {reason}")]
    Malformed { tag: &'static str, reason: String },
    #[error("{field} does not fit the {encoding} encoding")]
    OutOfRange { field: &'static str, encoding: &'static str },
}

/// A raw event could not be turned into a [`CanonicalMessage`](crate::types::CanonicalMessage).
///
/// Retrying the same bytes cannot succeed, so callers surface these immediately.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unrecognized event: {0}")]
    UnknownEvent(String),
    #[error("expected a {expected} event, got a {found} event")]
    FamilyMismatch { expected: ChainFamily, found: ChainFamily },
    #[error("no codec registered for the {0} family")]
    UnsupportedFamily(ChainFamily),
    #[error("unknown chain selector {0}")]
    UnknownChainSelector(u64),
    #[error("invalid {family} address: {reason}")]
    InvalidAddress { family: ChainFamily, reason: String },
    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("legacy event from on-ramp {0} needs lane context")]
    MissingLane(String),
    #[error("protocol {version} events are not emitted by {family} on-ramps")]
    UnsupportedVersion { version: ProtocolVersion, family: ChainFamily },
    #[error(transparent)]
    ExtraArgs(#[from] ExtraArgsError),
}

impl DecodeError {
    pub(crate) fn malformed(field: &'static str, reason: impl ToString) -> Self {
        Self::Malformed {
            field,
            reason: reason.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HasherError {
    #[error("no leaf hasher for protocol {version} with a {family} destination")]
    UnsupportedHasher { version: ProtocolVersion, family: ChainFamily },
    #[error("legacy leaf hash needs {0}")]
    MissingLegacyField(&'static str),
    #[error("{0} is not a 20-byte EVM address")]
    NotEvmAddress(&'static str),
    #[error("{field} exceeds {bits} bits")]
    OutOfRange { field: &'static str, bits: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("batch is empty")]
    EmptyBatch,
    #[error("commit interval [{min}, {max}] is inverted")]
    InvalidInterval { min: u64, max: u64 },
    /// The supplied run is missing or misorders a sequence number. Retryable
    /// by whoever fetched the batch, with a wider window.
    #[error("incomplete batch: expected sequence number {expected}, found {found:?}")]
    IncompleteBatch { expected: u64, found: Option<u64> },
    #[error("sequence number {0} lies outside the commit interval")]
    UnexpectedLeaf(u64),
    #[error("no messages requested for execution")]
    NoTargets,
    #[error("message {0} is not part of the committed batch")]
    MessageNotInBatch(B256),
    /// The batch is not the one the destination chain committed to.
    #[error("merkle root mismatch: committed {expected}, computed {computed}")]
    RootMismatch { expected: B256, computed: B256 },
    #[error("proof needs {0} hashes, verifier accepts at most 256")]
    ProofTooLarge(usize),
    #[error("invalid proof: {0}")]
    InvalidProof(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error(transparent)]
    Hasher(#[from] HasherError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    ExtraArgs(#[from] ExtraArgsError),
    #[error("commit report does not belong to this lane: {0}")]
    LaneMismatch(&'static str),
    #[error("message {message_id} has {transfers} transfers but {attestations} attestations")]
    AttestationMismatch { message_id: B256, transfers: usize, attestations: usize },
    #[error("duplicate sequence number {0} in batch")]
    DuplicateSequenceNumber(u64),
    #[error("failed {encoding} encoding of the report: {reason}")]
    Encode { encoding: &'static str, reason: String },
}
