//! Manual-execution reports: the subset of a committed batch being executed,
//! its multi-proof, and the encodings destination off-ramps accept.

use std::collections::HashMap;

use alloy_primitives::{Bytes, B256, U256};
use alloy_sol_types::SolValue;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    error::{HasherError, ReportError},
    hasher::{self, LeafHasher},
    lane::Lane,
    merkle::{build_execution_proof, BatchLeaf},
    sol,
    types::{CanonicalMessage, ChainFamily, CommitReport, ProtocolVersion},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionReport {
    pub source_chain_selector: u64,
    pub dest_family: ChainFamily,
    pub version: ProtocolVersion,
    pub merkle_root: B256,
    /// Messages being executed, ascending by sequence number.
    pub messages: Vec<CanonicalMessage>,
    /// One entry per message, one attestation per token transfer.
    pub offchain_token_data: Vec<Vec<Bytes>>,
    pub proofs: Vec<B256>,
    pub proof_flag_bits: U256,
}

/// Builds the report for `targets` out of the full committed `batch`.
///
/// `batch` may be in any order; it must cover the commit interval exactly.
/// `attestations` maps a message id to one blob per token transfer; messages
/// without an entry get an empty blob per transfer.
pub fn build_execution_report(
    batch: &[CanonicalMessage],
    lane: &Lane,
    commit: &CommitReport,
    targets: &[B256],
    attestations: &HashMap<B256, Vec<Bytes>>,
) -> Result<ExecutionReport, ReportError> {
    if commit.source_chain_selector != lane.source_chain_selector {
        return Err(ReportError::LaneMismatch("source chain selector"));
    }
    if commit.on_ramp_address != lane.on_ramp {
        return Err(ReportError::LaneMismatch("on-ramp address"));
    }

    let mut ordered = batch.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|message| message.header.sequence_number);
    if let Some(pair) = ordered
        .windows(2)
        .find(|pair| pair[0].header.sequence_number == pair[1].header.sequence_number)
    {
        return Err(ReportError::DuplicateSequenceNumber(pair[0].header.sequence_number));
    }

    let hasher = LeafHasher::for_lane(lane)?;
    let leaves = ordered
        .iter()
        .map(|message| {
            Ok(BatchLeaf {
                sequence_number: message.header.sequence_number,
                message_id: message.header.message_id,
                leaf: hasher.hash(message)?,
            })
        })
        .collect::<Result<Vec<_>, HasherError>>()?;

    let proof = build_execution_proof(&leaves, commit, targets)?;

    let messages = proof
        .indices
        .iter()
        .map(|&i| ordered[i].clone())
        .collect::<Vec<_>>();

    let offchain_token_data = messages
        .iter()
        .map(|message| {
            let transfers = message.token_amounts.len();
            match attestations.get(&message.header.message_id) {
                Some(data) if data.len() == transfers => Ok(data.clone()),
                Some(data) => Err(ReportError::AttestationMismatch {
                    message_id: message.header.message_id,
                    transfers,
                    attestations: data.len(),
                }),
                None => Ok(vec![Bytes::new(); transfers]),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        source = lane.source_chain_selector,
        dest = lane.dest_chain_selector,
        messages = messages.len(),
        proofs = proof.proofs.len(),
        "built execution report"
    );

    Ok(ExecutionReport {
        source_chain_selector: lane.source_chain_selector,
        dest_family: lane.dest_family,
        version: lane.version,
        merkle_root: proof.merkle_root,
        messages,
        offchain_token_data,
        proofs: proof.proofs,
        proof_flag_bits: proof.proof_flag_bits,
    })
}

impl ExecutionReport {
    pub fn message_ids(&self) -> impl Iterator<Item = B256> + '_ {
        self.messages.iter().map(|message| message.header.message_id)
    }

    /// Encodes the report for the destination off-ramp's manual-execution
    /// entry point: ABI for EVM, Borsh for Solana, BCS for Aptos.
    pub fn encode(&self) -> Result<Bytes, ReportError> {
        let bytes = match (self.dest_family, self.version.is_legacy()) {
            (ChainFamily::Evm, true) => self.encode_legacy_abi()?,
            (ChainFamily::Evm, false) => self.encode_abi()?,
            (family @ (ChainFamily::Solana | ChainFamily::Aptos), true) => {
                return Err(HasherError::UnsupportedHasher {
                    version: self.version,
                    family,
                }
                .into())
            }
            (ChainFamily::Solana, false) => borsh::to_vec(&self.to_binary()?).map_err(|e| ReportError::Encode {
                encoding: "borsh",
                reason: e.to_string(),
            })?,
            (ChainFamily::Aptos, false) => bcs::to_bytes(&self.to_binary()?).map_err(|e| ReportError::Encode {
                encoding: "bcs",
                reason: e.to_string(),
            })?,
        };
        Ok(Bytes::from(bytes))
    }

    fn encode_abi(&self) -> Result<Vec<u8>, ReportError> {
        let messages = self
            .messages
            .iter()
            .map(|message| {
                Ok(sol::Any2EVMRampMessage {
                    header: sol::RampMessageHeader {
                        messageId: message.header.message_id,
                        sourceChainSelector: message.header.source_chain_selector,
                        destChainSelector: message.header.dest_chain_selector,
                        sequenceNumber: message.header.sequence_number,
                        nonce: message.header.nonce,
                    },
                    sender: Bytes::copy_from_slice(message.sender.as_word()),
                    data: message.data.clone(),
                    receiver: hasher::evm_address(&message.receiver, "receiver")?,
                    gasLimit: message.extra_args.gas_limit(),
                    tokenAmounts: hasher::evm_token_transfers(&message.token_amounts)?,
                })
            })
            .collect::<Result<Vec<_>, HasherError>>()?;

        Ok(sol::ExecutionReport {
            sourceChainSelector: self.source_chain_selector,
            messages,
            offchainTokenData: self.offchain_token_data.clone(),
            proofs: self.proofs.clone(),
            proofFlagBits: self.proof_flag_bits,
        }
        .abi_encode())
    }

    fn encode_legacy_abi(&self) -> Result<Vec<u8>, ReportError> {
        let messages = self
            .messages
            .iter()
            .map(hasher::legacy_message)
            .collect::<Result<Vec<_>, HasherError>>()?;

        Ok(sol::LegacyExecutionReport {
            messages,
            offchainTokenData: self.offchain_token_data.clone(),
            proofs: self.proofs.clone(),
            proofFlagBits: self.proof_flag_bits,
        }
        .abi_encode())
    }

    /// Same fields and order as the ABI report. Receivers and destination
    /// tokens are full 32-byte words; extra args travel in their original
    /// encoding.
    fn to_binary(&self) -> Result<BinaryExecutionReport, ReportError> {
        let messages = self
            .messages
            .iter()
            .map(|message| {
                let token_amounts = message
                    .token_amounts
                    .iter()
                    .map(|token| {
                        Ok(BinaryTokenTransfer {
                            source_pool_address: token.source_pool_address.as_word().to_vec(),
                            dest_token_address: *token.dest_token_address.as_word(),
                            dest_gas_amount: hasher::dest_gas_amount(token)?,
                            extra_data: token.extra_data.to_vec(),
                            amount: token.amount.to_le_bytes::<32>(),
                        })
                    })
                    .collect::<Result<Vec<_>, HasherError>>()?;
                Ok(BinaryRampMessage {
                    header: BinaryMessageHeader {
                        message_id: message.header.message_id.0,
                        source_chain_selector: message.header.source_chain_selector,
                        dest_chain_selector: message.header.dest_chain_selector,
                        sequence_number: message.header.sequence_number,
                        nonce: message.header.nonce,
                    },
                    sender: message.sender.as_word().to_vec(),
                    data: message.data.to_vec(),
                    receiver: *message.receiver.as_word(),
                    extra_args: message.raw_extra_args.to_vec(),
                    token_amounts,
                })
            })
            .collect::<Result<Vec<_>, HasherError>>()?;

        Ok(BinaryExecutionReport {
            source_chain_selector: self.source_chain_selector,
            messages,
            offchain_token_data: self
                .offchain_token_data
                .iter()
                .map(|per_message| per_message.iter().map(|data| data.to_vec()).collect())
                .collect(),
            proofs: self.proofs.iter().map(|proof| proof.0).collect(),
            proof_flag_bits: self.proof_flag_bits.to_le_bytes::<32>(),
        })
    }
}

/// Execution report accepted by the Solana (Borsh) and Aptos (BCS)
/// off-ramps. Integers are little-endian, `u256` values 32 raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
struct BinaryExecutionReport {
    source_chain_selector: u64,
    messages: Vec<BinaryRampMessage>,
    offchain_token_data: Vec<Vec<Vec<u8>>>,
    proofs: Vec<[u8; 32]>,
    proof_flag_bits: [u8; 32],
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
struct BinaryMessageHeader {
    message_id: [u8; 32],
    source_chain_selector: u64,
    dest_chain_selector: u64,
    sequence_number: u64,
    nonce: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
struct BinaryRampMessage {
    header: BinaryMessageHeader,
    sender: Vec<u8>,
    data: Vec<u8>,
    receiver: [u8; 32],
    extra_args: Vec<u8>,
    token_amounts: Vec<BinaryTokenTransfer>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
struct BinaryTokenTransfer {
    source_pool_address: Vec<u8>,
    dest_token_address: [u8; 32],
    dest_gas_amount: u32,
    extra_data: Vec<u8>,
    amount: [u8; 32],
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;

    use super::*;
    use crate::{
        error::ProofError,
        hasher::{
            hash_leaf,
            tests::{current_message_fixture, evm_lane, legacy_message_fixture},
        },
        merkle::{verify_multi_proof, MerkleTree},
        types::ChainAddress,
    };

    fn batch(lane: &Lane, legacy: bool) -> Vec<CanonicalMessage> {
        (10..=14u64)
            .map(|seq| {
                let mut message = if legacy {
                    legacy_message_fixture()
                } else {
                    current_message_fixture()
                };
                message.header.sequence_number = seq;
                message.header.nonce = seq;
                message.header.source_chain_selector = lane.source_chain_selector;
                message.header.dest_chain_selector = lane.dest_chain_selector;
                message.header.message_id = B256::with_last_byte(seq as u8);
                if legacy {
                    message.legacy.as_mut().unwrap().source_token_data = vec![Bytes::new()];
                }
                message
            })
            .collect()
    }

    fn commit(lane: &Lane, batch: &[CanonicalMessage]) -> CommitReport {
        let leaves = batch.iter().map(|m| hash_leaf(m, lane).unwrap()).collect();
        CommitReport {
            merkle_root: MerkleTree::new(leaves).unwrap().root(),
            min_seq_nr: 10,
            max_seq_nr: 14,
            source_chain_selector: lane.source_chain_selector,
            on_ramp_address: lane.on_ramp,
        }
    }

    #[test]
    fn builds_report_for_one_message() {
        let lane = evm_lane(ProtocolVersion::V1_6);
        let mut batch = batch(&lane, false);
        let commit = commit(&lane, &batch);
        batch.reverse();

        let target = B256::with_last_byte(12);
        let report = build_execution_report(&batch, &lane, &commit, &[target], &HashMap::new()).unwrap();

        assert_eq!(report.message_ids().collect::<Vec<_>>(), vec![target]);
        assert_eq!(report.offchain_token_data, vec![vec![Bytes::new()]]);
        assert!(report.proofs.len() <= 3);

        let leaf = hash_leaf(&report.messages[0], &lane).unwrap();
        assert_eq!(
            verify_multi_proof(&[leaf], &report.proofs, report.proof_flag_bits).unwrap(),
            commit.merkle_root
        );
    }

    #[test]
    fn orders_messages_by_sequence_number() {
        let lane = evm_lane(ProtocolVersion::V1_6);
        let batch = batch(&lane, false);
        let commit = commit(&lane, &batch);
        let targets = [B256::with_last_byte(14), B256::with_last_byte(10), B256::with_last_byte(11)];

        let report = build_execution_report(&batch, &lane, &commit, &targets, &HashMap::new()).unwrap();
        let seqs = report
            .messages
            .iter()
            .map(|m| m.header.sequence_number)
            .collect::<Vec<_>>();
        assert_eq!(seqs, vec![10, 11, 14]);
    }

    #[test]
    fn uses_supplied_attestations() {
        let lane = evm_lane(ProtocolVersion::V1_6);
        let batch = batch(&lane, false);
        let commit = commit(&lane, &batch);
        let target = B256::with_last_byte(13);

        let attestation = Bytes::from_static(b"attestation");
        let mut attestations = HashMap::from([(target, vec![attestation.clone()])]);
        let report = build_execution_report(&batch, &lane, &commit, &[target], &attestations).unwrap();
        assert_eq!(report.offchain_token_data, vec![vec![attestation.clone()]]);

        attestations.insert(target, vec![attestation.clone(), attestation]);
        assert_eq!(
            build_execution_report(&batch, &lane, &commit, &[target], &attestations),
            Err(ReportError::AttestationMismatch {
                message_id: target,
                transfers: 1,
                attestations: 2,
            })
        );
    }

    #[test]
    fn rejects_foreign_commit_and_duplicates() {
        let lane = evm_lane(ProtocolVersion::V1_6);
        let mut batch = batch(&lane, false);
        let mut foreign = commit(&lane, &batch);
        foreign.on_ramp_address = ChainAddress::from(Address::repeat_byte(1));
        assert_eq!(
            build_execution_report(&batch, &lane, &foreign, &[B256::with_last_byte(10)], &HashMap::new()),
            Err(ReportError::LaneMismatch("on-ramp address"))
        );

        let commit = commit(&lane, &batch);
        batch[1].header.sequence_number = 10;
        assert_eq!(
            build_execution_report(&batch, &lane, &commit, &[B256::with_last_byte(10)], &HashMap::new()),
            Err(ReportError::DuplicateSequenceNumber(10))
        );
    }

    #[test]
    fn tampered_batch_is_a_root_mismatch() {
        let lane = evm_lane(ProtocolVersion::V1_6);
        let mut batch = batch(&lane, false);
        let commit = commit(&lane, &batch);
        batch[3].data = Bytes::from_static(b"tampered");
        assert!(matches!(
            build_execution_report(&batch, &lane, &commit, &[B256::with_last_byte(10)], &HashMap::new()),
            Err(ReportError::Proof(ProofError::RootMismatch { .. }))
        ));
    }

    #[test]
    fn abi_report_matches_off_ramp_layout() {
        let lane = evm_lane(ProtocolVersion::V1_6);
        let batch = batch(&lane, false);
        let commit = commit(&lane, &batch);
        let report =
            build_execution_report(&batch, &lane, &commit, &[B256::with_last_byte(12)], &HashMap::new()).unwrap();

        let encoded = report.encode().unwrap();
        let decoded = sol::ExecutionReport::abi_decode(&encoded, true).unwrap();
        assert_eq!(decoded.sourceChainSelector, 1);
        assert_eq!(decoded.proofs, report.proofs);
        assert_eq!(decoded.proofFlagBits, report.proof_flag_bits);
        let message = &decoded.messages[0];
        assert_eq!(message.header.sequenceNumber, 12);
        assert_eq!(message.gasLimit, U256::from(100_000u64));
        assert_eq!(message.tokenAmounts[0].destGasAmount, 50_000);
        assert_eq!(message.sender.len(), 32);
    }

    #[test]
    fn legacy_report_carries_evm2evm_messages() {
        let lane = evm_lane(ProtocolVersion::V1_5);
        let batch = batch(&lane, true);
        let commit = commit(&lane, &batch);
        let report =
            build_execution_report(&batch, &lane, &commit, &[B256::with_last_byte(11)], &HashMap::new()).unwrap();

        let decoded = sol::LegacyExecutionReport::abi_decode(&report.encode().unwrap(), true).unwrap();
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].sequenceNumber, 11);
        assert_eq!(decoded.messages[0].gasLimit, U256::from(100u64));
        assert_eq!(decoded.messages[0].messageId, B256::with_last_byte(11));
        assert_eq!(decoded.offchainTokenData, vec![vec![Bytes::new()]]);
    }

    #[test]
    fn binary_reports_use_family_length_prefixes() {
        let mut lane = evm_lane(ProtocolVersion::V1_6);
        lane.dest_family = ChainFamily::Solana;
        let batch = batch(&lane, false);
        let commit = commit(&lane, &batch);
        let report =
            build_execution_report(&batch, &lane, &commit, &[B256::with_last_byte(12)], &HashMap::new()).unwrap();

        let borsh = report.encode().unwrap();
        assert_eq!(&borsh[..8], &1u64.to_le_bytes());
        assert_eq!(&borsh[8..12], &1u32.to_le_bytes());
        assert_eq!(&borsh[12..44], B256::with_last_byte(12).as_slice());
        assert_eq!(&borsh[borsh.len() - 32..], &report.proof_flag_bits.to_le_bytes::<32>());

        let aptos = ExecutionReport {
            dest_family: ChainFamily::Aptos,
            ..report
        };
        let bcs = aptos.encode().unwrap();
        assert_eq!(bcs[8], 1);
        assert!(bcs.len() < borsh.len());
    }

    #[test]
    fn binary_reports_decode_with_each_codec() {
        let mut lane = evm_lane(ProtocolVersion::V1_6);
        lane.dest_family = ChainFamily::Solana;
        let batch = batch(&lane, false);
        let commit = commit(&lane, &batch);
        let targets = [B256::with_last_byte(11), B256::with_last_byte(13)];
        let report = build_execution_report(&batch, &lane, &commit, &targets, &HashMap::new()).unwrap();
        let expected = report.to_binary().unwrap();

        let borsh = BinaryExecutionReport::try_from_slice(&report.encode().unwrap()).unwrap();
        assert_eq!(borsh, expected);
        assert_eq!(borsh.messages.len(), 2);
        assert_eq!(borsh.messages[1].header.sequence_number, 13);
        assert_eq!(borsh.messages[0].token_amounts[0].dest_gas_amount, 50_000);
        assert_eq!(
            borsh.messages[0].extra_args,
            report.messages[0].raw_extra_args.to_vec()
        );
        assert_eq!(U256::from_le_bytes(borsh.proof_flag_bits), report.proof_flag_bits);

        let aptos = ExecutionReport {
            dest_family: ChainFamily::Aptos,
            ..report
        };
        let bcs = bcs::from_bytes::<BinaryExecutionReport>(&aptos.encode().unwrap()).unwrap();
        assert_eq!(bcs, expected);
    }
}
