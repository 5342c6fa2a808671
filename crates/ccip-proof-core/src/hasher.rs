//! Message leaf hashing.
//!
//! Reproduces the off-ramp's `Internal._hash` for each protocol generation.
//! The layouts here are consensus-critical: any change to field order,
//! padding or a domain tag yields a root the destination never accepts.

use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::SolValue;

use crate::{
    bool_to_bytes32,
    error::HasherError,
    keccak256, keccak256_words,
    lane::Lane,
    sol,
    types::{CanonicalMessage, ChainAddress, ChainFamily, TokenAmount},
    u256_to_bytes32, u64_to_bytes32,
};

/// Leaves are domain-separated from internal nodes by a zero word.
pub const LEAF_DOMAIN_SEPARATOR: [u8; 32] = [0u8; 32];

pub const EVM_2_EVM_MESSAGE_HASH_TAG: &str = "EVM2EVMMessageHashV2";
pub const ANY_2_EVM_MESSAGE_HASH_TAG: &str = "Any2EVMMessageHashV1";
pub const ANY_2_SVM_MESSAGE_HASH_TAG: &str = "Any2SVMMessageHashV1";
pub const ANY_2_APTOS_MESSAGE_HASH_TAG: &str = "Any2AptosMessageHashV1";

/// A leaf hasher bound to one lane. The metadata hash is lane-constant, so
/// it is computed once and reused for every message in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafHasher {
    /// `EVM2EVMMessage` leaves (protocol 1.2 and 1.5, EVM to EVM only).
    Legacy { metadata_hash: B256 },
    /// `Any2AnyRampMessage` leaves (protocol 1.6). The destination family
    /// only decides address widths.
    Current {
        metadata_hash: B256,
        dest_family: ChainFamily,
    },
}

impl LeafHasher {
    pub fn for_lane(lane: &Lane) -> Result<Self, HasherError> {
        if lane.is_legacy() {
            if (lane.source_family, lane.dest_family) != (ChainFamily::Evm, ChainFamily::Evm) {
                return Err(HasherError::UnsupportedHasher {
                    version: lane.version,
                    family: lane.dest_family,
                });
            }
            let metadata_hash = keccak256_words(&[
                keccak256(EVM_2_EVM_MESSAGE_HASH_TAG.as_bytes()).0,
                u64_to_bytes32(lane.source_chain_selector),
                u64_to_bytes32(lane.dest_chain_selector),
                *lane.on_ramp.as_word(),
            ]);
            return Ok(Self::Legacy { metadata_hash });
        }

        let tag = match lane.dest_family {
            ChainFamily::Evm => ANY_2_EVM_MESSAGE_HASH_TAG,
            ChainFamily::Solana => ANY_2_SVM_MESSAGE_HASH_TAG,
            ChainFamily::Aptos => ANY_2_APTOS_MESSAGE_HASH_TAG,
        };
        let metadata_hash = keccak256_words(&[
            keccak256(tag.as_bytes()).0,
            u64_to_bytes32(lane.source_chain_selector),
            u64_to_bytes32(lane.dest_chain_selector),
            keccak256(lane.on_ramp.as_word()).0,
        ]);
        Ok(Self::Current {
            metadata_hash,
            dest_family: lane.dest_family,
        })
    }

    pub fn metadata_hash(&self) -> B256 {
        match self {
            Self::Legacy { metadata_hash } | Self::Current { metadata_hash, .. } => *metadata_hash,
        }
    }

    pub fn hash(&self, message: &CanonicalMessage) -> Result<B256, HasherError> {
        match self {
            Self::Legacy { metadata_hash } => hash_legacy(metadata_hash, message),
            Self::Current {
                metadata_hash,
                dest_family,
            } => hash_current(metadata_hash, *dest_family, message),
        }
    }
}

/// One-shot convenience over [`LeafHasher::for_lane`] and [`LeafHasher::hash`].
pub fn hash_leaf(message: &CanonicalMessage, lane: &Lane) -> Result<B256, HasherError> {
    LeafHasher::for_lane(lane)?.hash(message)
}

fn hash_legacy(metadata_hash: &B256, message: &CanonicalMessage) -> Result<B256, HasherError> {
    let legacy = legacy_message(message)?;

    let fixed_size_values_hash = keccak256_words(&[
        legacy.sender.into_word().0,
        legacy.receiver.into_word().0,
        u64_to_bytes32(legacy.sequenceNumber),
        u256_to_bytes32(legacy.gasLimit),
        bool_to_bytes32(legacy.strict),
        u64_to_bytes32(legacy.nonce),
        legacy.feeToken.into_word().0,
        u256_to_bytes32(legacy.feeTokenAmount),
    ]);

    Ok(keccak256_words(&[
        LEAF_DOMAIN_SEPARATOR,
        metadata_hash.0,
        fixed_size_values_hash.0,
        keccak256(&legacy.data).0,
        keccak256(&legacy.tokenAmounts.abi_encode()).0,
        keccak256(&legacy.sourceTokenData.abi_encode()).0,
    ]))
}

fn hash_current(
    metadata_hash: &B256,
    dest_family: ChainFamily,
    message: &CanonicalMessage,
) -> Result<B256, HasherError> {
    let receiver = match dest_family {
        ChainFamily::Evm => evm_address(&message.receiver, "receiver")?.into_word().0,
        ChainFamily::Solana | ChainFamily::Aptos => *message.receiver.as_word(),
    };

    let fixed_size_values_hash = keccak256_words(&[
        message.header.message_id.0,
        receiver,
        u64_to_bytes32(message.header.sequence_number),
        u256_to_bytes32(message.extra_args.gas_limit()),
        u64_to_bytes32(message.header.nonce),
    ]);

    let token_amounts = match dest_family {
        ChainFamily::Evm => evm_token_transfers(&message.token_amounts)?.abi_encode(),
        ChainFamily::Solana | ChainFamily::Aptos => any_token_transfers(&message.token_amounts)?.abi_encode(),
    };

    Ok(keccak256_words(&[
        LEAF_DOMAIN_SEPARATOR,
        metadata_hash.0,
        fixed_size_values_hash.0,
        keccak256(message.sender.as_word()).0,
        keccak256(&message.data).0,
        keccak256(&token_amounts).0,
    ]))
}

pub(crate) fn evm_address(address: &ChainAddress, field: &'static str) -> Result<Address, HasherError> {
    address.evm_address().ok_or(HasherError::NotEvmAddress(field))
}

pub(crate) fn dest_gas_amount(token: &TokenAmount) -> Result<u32, HasherError> {
    u32::try_from(token.dest_gas_amount).map_err(|_| HasherError::OutOfRange {
        field: "destGasAmount",
        bits: 32,
    })
}

pub(crate) fn evm_token_transfers(tokens: &[TokenAmount]) -> Result<Vec<sol::Any2EVMTokenTransfer>, HasherError> {
    tokens
        .iter()
        .map(|token| {
            Ok(sol::Any2EVMTokenTransfer {
                sourcePoolAddress: Bytes::copy_from_slice(token.source_pool_address.as_word()),
                destTokenAddress: evm_address(&token.dest_token_address, "destTokenAddress")?,
                destGasAmount: dest_gas_amount(token)?,
                extraData: token.extra_data.clone(),
                amount: token.amount,
            })
        })
        .collect()
}

fn any_token_transfers(tokens: &[TokenAmount]) -> Result<Vec<sol::Any2AnyTokenTransfer>, HasherError> {
    tokens
        .iter()
        .map(|token| {
            Ok(sol::Any2AnyTokenTransfer {
                sourcePoolAddress: Bytes::copy_from_slice(token.source_pool_address.as_word()),
                destTokenAddress: token.dest_token_address.to_b256(),
                destGasAmount: dest_gas_amount(token)?,
                extraData: token.extra_data.clone(),
                amount: token.amount,
            })
        })
        .collect()
}

/// Rebuilds the `EVM2EVMMessage` a legacy on-ramp emitted.
pub(crate) fn legacy_message(message: &CanonicalMessage) -> Result<sol::EVM2EVMMessage, HasherError> {
    let legacy = message
        .legacy
        .as_ref()
        .ok_or(HasherError::MissingLegacyField("strict flag and source token data"))?;

    let token_amounts = message
        .token_amounts
        .iter()
        .map(|token| {
            let source_token = token.token.ok_or(HasherError::MissingLegacyField("source token address"))?;
            Ok(sol::EVMTokenAmount {
                token: evm_address(&source_token, "token")?,
                amount: token.amount,
            })
        })
        .collect::<Result<Vec<_>, HasherError>>()?;

    Ok(sol::EVM2EVMMessage {
        sourceChainSelector: message.header.source_chain_selector,
        sender: evm_address(&message.sender, "sender")?,
        receiver: evm_address(&message.receiver, "receiver")?,
        sequenceNumber: message.header.sequence_number,
        gasLimit: message.extra_args.gas_limit(),
        strict: legacy.strict,
        nonce: message.header.nonce,
        feeToken: evm_address(&message.fee_token, "feeToken")?,
        feeTokenAmount: message.fee_token_amount,
        data: message.data.clone(),
        tokenAmounts: token_amounts,
        sourceTokenData: legacy.source_token_data.clone(),
        messageId: message.header.message_id,
    })
}
