use alloy_primitives::{Bytes, B256, U256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use borsh::{BorshDeserialize, BorshSerialize};
use sha2::{Digest, Sha256};

use super::{parse_dest_exec_data, ChainCodec, DecodeContext, RawEvent, SolanaLog};
use crate::{
    copy_array,
    error::DecodeError,
    extra_args::ExtraArgs,
    types::{CanonicalMessage, ChainAddress, ChainFamily, MessageHeader, TokenAmount},
};

const PROGRAM_DATA_PREFIX: &str = "Program data:";
const MESSAGE_SENT_EVENT: &str = "CCIPMessageSent";

/// Anchor event discriminator: `sha256("event:<Name>")[..8]`.
pub fn event_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("event:{name}").as_bytes());
    copy_array::<8>(&digest[..8])
}

/// Solana router program: Anchor `CCIPMessageSent` events, Borsh encoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolanaCodec;

fn invalid(reason: impl ToString) -> DecodeError {
    DecodeError::InvalidAddress {
        family: ChainFamily::Solana,
        reason: reason.to_string(),
    }
}

impl ChainCodec for SolanaCodec {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn parse_address(&self, bytes: &[u8]) -> Result<ChainAddress, DecodeError> {
        if bytes.len() != 32 {
            return Err(invalid(format!("expected 32 bytes, got {}", bytes.len())));
        }
        Ok(ChainAddress::from_word(copy_array::<32>(bytes)))
    }

    fn parse_address_str(&self, s: &str) -> Result<ChainAddress, DecodeError> {
        let bytes = bs58::decode(s.trim()).into_vec().map_err(invalid)?;
        self.parse_address(&bytes)
    }

    fn format_address(&self, address: &ChainAddress) -> String {
        bs58::encode(address.as_word()).into_string()
    }

    fn decode_message(&self, event: &RawEvent, ctx: &DecodeContext<'_>) -> Result<CanonicalMessage, DecodeError> {
        let RawEvent::Solana(log) = event else {
            return Err(DecodeError::FamilyMismatch {
                expected: ChainFamily::Solana,
                found: event.family(),
            });
        };
        ctx.require_current(ChainFamily::Solana)?;

        if let (Some(lane), Some(program_id)) = (ctx.lane, log.program_id) {
            if lane.on_ramp != program_id {
                return Err(DecodeError::malformed(
                    "program_id",
                    format!(
                        "log emitted by {}, lane router is {}",
                        self.format_address(&program_id),
                        self.format_address(&lane.on_ramp)
                    ),
                ));
            }
        }

        let payload = program_data(log)?;
        if payload.len() < 8 {
            return Err(DecodeError::UnknownEvent("program data shorter than a discriminator".to_string()));
        }
        let (discriminator, body) = payload.split_at(8);
        if discriminator != event_discriminator(MESSAGE_SENT_EVENT) {
            return Err(DecodeError::UnknownEvent(format!(
                "discriminator 0x{}",
                hex::encode(discriminator)
            )));
        }

        let CcipMessageSent {
            dest_chain_selector,
            sequence_number,
            message: raw,
        } = CcipMessageSent::try_from_slice(body).map_err(|e| DecodeError::malformed("CCIPMessageSent", e))?;
        if dest_chain_selector != raw.header.dest_chain_selector || sequence_number != raw.header.sequence_number {
            return Err(DecodeError::malformed(
                "header",
                "event fields disagree with the message header",
            ));
        }

        let dest = ctx.dest_codec(raw.header.dest_chain_selector)?;
        let header = MessageHeader::from(&raw.header);
        let receiver = dest.parse_address(&raw.receiver)?;
        let extra_args = ExtraArgs::decode_for_source(&raw.extra_args, ChainFamily::Solana)?;
        let token_amounts = raw
            .token_amounts
            .into_iter()
            .map(|transfer| {
                Ok(TokenAmount {
                    source_pool_address: ChainAddress::from_word(transfer.source_pool_address),
                    dest_token_address: dest.parse_address(&transfer.dest_token_address)?,
                    amount: U256::from_le_bytes(transfer.amount),
                    extra_data: transfer.extra_data.into(),
                    dest_gas_amount: parse_dest_exec_data(&transfer.dest_exec_data)?,
                    token: None,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Ok(CanonicalMessage {
            header,
            sender: ChainAddress::from_word(raw.sender),
            receiver,
            data: raw.data.into(),
            token_amounts,
            fee_token: ChainAddress::from_word(raw.fee_token),
            fee_token_amount: U256::from_le_bytes(raw.fee_token_amount),
            fee_value_juels: U256::from_le_bytes(raw.fee_value_juels),
            extra_args,
            raw_extra_args: Bytes::from(raw.extra_args),
            legacy: None,
        })
    }
}

fn program_data(log: &SolanaLog) -> Result<Vec<u8>, DecodeError> {
    let encoded = log
        .data
        .trim()
        .strip_prefix(PROGRAM_DATA_PREFIX)
        .unwrap_or(log.data.trim())
        .trim();
    STANDARD
        .decode(encoded)
        .map_err(|e| DecodeError::malformed("program data", e))
}

/// Anchor `CCIPMessageSent` event body, after the discriminator.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
struct CcipMessageSent {
    dest_chain_selector: u64,
    sequence_number: u64,
    message: Svm2AnyRampMessage,
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
struct RampMessageHeader {
    message_id: [u8; 32],
    source_chain_selector: u64,
    dest_chain_selector: u64,
    sequence_number: u64,
    nonce: u64,
}

impl From<&RampMessageHeader> for MessageHeader {
    fn from(header: &RampMessageHeader) -> Self {
        Self {
            message_id: B256::from(header.message_id),
            source_chain_selector: header.source_chain_selector,
            dest_chain_selector: header.dest_chain_selector,
            sequence_number: header.sequence_number,
            nonce: header.nonce,
        }
    }
}

/// `SVM2AnyRampMessage`. Amounts are `CrossChainAmount`: 32 little-endian bytes.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
struct Svm2AnyRampMessage {
    header: RampMessageHeader,
    sender: [u8; 32],
    data: Vec<u8>,
    receiver: Vec<u8>,
    extra_args: Vec<u8>,
    fee_token: [u8; 32],
    token_amounts: Vec<Svm2AnyTokenTransfer>,
    fee_token_amount: [u8; 32],
    fee_value_juels: [u8; 32],
}

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
struct Svm2AnyTokenTransfer {
    source_pool_address: [u8; 32],
    dest_token_address: Vec<u8>,
    extra_data: Vec<u8>,
    amount: [u8; 32],
    dest_exec_data: Vec<u8>,
}
