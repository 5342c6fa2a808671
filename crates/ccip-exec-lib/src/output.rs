//! JSON shapes written by the pipeline.
//!
//! Hashes, ids, proofs and encoded reports are `0x`-prefixed lowercase hex;
//! chain selectors and token amounts are decimal strings.

use alloy_primitives::B256;
use ccip_proof_core::{CanonicalMessage, ChainCodec, TokenAmount};
use serde::{Deserialize, Serialize};

use crate::hex0x;

/// A message's position in the batch and its leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafView {
    pub sequence_number: u64,
    pub message_id: String,
    pub leaf: String,
}

impl LeafView {
    pub fn new(message: &CanonicalMessage, leaf: B256) -> Self {
        Self {
            sequence_number: message.header.sequence_number,
            message_id: hex0x(message.header.message_id),
            leaf: hex0x(leaf),
        }
    }
}

/// Result of `prove`: everything needed to call the off-ramp's manual
/// execution entry point, plus the leaves to re-check the proof offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutput {
    pub version: String,
    pub source_chain_selector: String,
    pub dest_chain_selector: String,
    pub protocol_version: String,
    pub dest_family: String,
    pub merkle_root: String,
    /// Executed messages, in report order.
    pub messages: Vec<LeafView>,
    pub proofs: Vec<String>,
    /// Fixed-width 32-byte big-endian hex.
    pub proof_flag_bits: String,
    pub encoded_report: String,
}

/// Result of `hash`: every leaf of the batch and the committed root they
/// reproduce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashOutput {
    pub source_chain_selector: String,
    pub metadata_hash: String,
    pub merkle_root: String,
    pub leaves: Vec<LeafView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraArgsView {
    pub kind: String,
    pub gas_limit: String,
    pub allow_out_of_order_execution: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmountView {
    pub source_pool_address: String,
    pub dest_token_address: String,
    pub amount: String,
    pub dest_gas_amount: u64,
    pub extra_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// A decoded message with addresses rendered in their chains' native forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub message_id: String,
    pub sequence_number: u64,
    pub nonce: u64,
    pub source_chain_selector: String,
    pub dest_chain_selector: String,
    pub sender: String,
    pub receiver: String,
    pub data: String,
    pub extra_args: ExtraArgsView,
    pub fee_token: String,
    pub fee_token_amount: String,
    pub token_amounts: Vec<TokenAmountView>,
    pub leaf: String,
}

impl MessageView {
    /// `source` renders sender-side addresses, `dest` receiver-side ones.
    pub fn new(message: &CanonicalMessage, leaf: B256, source: &dyn ChainCodec, dest: &dyn ChainCodec) -> Self {
        let token_view = |token: &TokenAmount| TokenAmountView {
            source_pool_address: source.format_address(&token.source_pool_address),
            dest_token_address: dest.format_address(&token.dest_token_address),
            amount: token.amount.to_string(),
            dest_gas_amount: token.dest_gas_amount,
            extra_data: hex0x(&token.extra_data),
            token: token.token.as_ref().map(|address| source.format_address(address)),
        };

        Self {
            message_id: hex0x(message.header.message_id),
            sequence_number: message.header.sequence_number,
            nonce: message.header.nonce,
            source_chain_selector: message.header.source_chain_selector.to_string(),
            dest_chain_selector: message.header.dest_chain_selector.to_string(),
            sender: source.format_address(&message.sender),
            receiver: dest.format_address(&message.receiver),
            data: hex0x(&message.data),
            extra_args: ExtraArgsView {
                kind: message.extra_args.name().to_string(),
                gas_limit: message.extra_args.gas_limit().to_string(),
                allow_out_of_order_execution: message.extra_args.allow_out_of_order_execution(),
            },
            fee_token: source.format_address(&message.fee_token),
            fee_token_amount: message.fee_token_amount.to_string(),
            token_amounts: message.token_amounts.iter().map(token_view).collect(),
            leaf: hex0x(leaf),
        }
    }
}
