use alloy_primitives::{Bytes, B256, U256};
use serde::{de::Error as _, Deserialize, Deserializer};

use super::{parse_dest_exec_data, ChainCodec, DecodeContext, RawEvent};
use crate::{
    error::DecodeError,
    extra_args::ExtraArgs,
    types::{CanonicalMessage, ChainAddress, ChainFamily, MessageHeader, TokenAmount},
};

const MESSAGE_SENT_SUFFIX: &str = "::CCIPMessageSent";

/// Aptos on-ramp module: `CCIPMessageSent` events as served by the REST API,
/// with integers as decimal strings and byte vectors as `0x` hex.
#[derive(Clone, Copy, Debug, Default)]
pub struct AptosCodec;

fn invalid(reason: impl ToString) -> DecodeError {
    DecodeError::InvalidAddress {
        family: ChainFamily::Aptos,
        reason: reason.to_string(),
    }
}

impl ChainCodec for AptosCodec {
    fn family(&self) -> ChainFamily {
        ChainFamily::Aptos
    }

    fn parse_address(&self, bytes: &[u8]) -> Result<ChainAddress, DecodeError> {
        if bytes.is_empty() {
            return Err(invalid("empty address"));
        }
        ChainAddress::from_slice_padded(bytes)
            .ok_or_else(|| invalid(format!("expected at most 32 bytes, got {}", bytes.len())))
    }

    /// Accepts the short form (`0x1`) as well as the full 64-digit form.
    fn parse_address_str(&self, s: &str) -> Result<ChainAddress, DecodeError> {
        let digits = s.trim().trim_start_matches("0x");
        if digits.is_empty() {
            return Err(invalid("empty address"));
        }
        let padded = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(padded).map_err(invalid)?;
        self.parse_address(&bytes)
    }

    fn format_address(&self, address: &ChainAddress) -> String {
        format!("0x{}", hex::encode(address.as_word()))
    }

    fn decode_message(&self, event: &RawEvent, ctx: &DecodeContext<'_>) -> Result<CanonicalMessage, DecodeError> {
        let RawEvent::Aptos(event) = event else {
            return Err(DecodeError::FamilyMismatch {
                expected: ChainFamily::Aptos,
                found: event.family(),
            });
        };
        ctx.require_current(ChainFamily::Aptos)?;

        let Some(module) = event.event_type.strip_suffix(MESSAGE_SENT_SUFFIX) else {
            return Err(DecodeError::UnknownEvent(event.event_type.clone()));
        };
        if let Some(lane) = ctx.lane {
            // "<address>::<module>"
            let emitter = module.split("::").next().unwrap_or_default();
            if self.parse_address_str(emitter)? != lane.on_ramp {
                return Err(DecodeError::malformed(
                    "type",
                    format!(
                        "event emitted by {emitter}, lane on-ramp is {}",
                        self.format_address(&lane.on_ramp)
                    ),
                ));
            }
        }

        let raw: MessageSentEvent =
            serde_json::from_value(event.data.clone()).map_err(|e| DecodeError::malformed("CCIPMessageSent", e))?;
        let message = raw.message;
        let header = message.header;
        if raw.dest_chain_selector != header.dest_chain_selector || raw.sequence_number != header.sequence_number {
            return Err(DecodeError::malformed(
                "header",
                "event fields disagree with the message header",
            ));
        }

        let message_id = <[u8; 32]>::try_from(header.message_id.as_slice())
            .map(B256::from)
            .map_err(|_| DecodeError::malformed("message_id", "expected 32 bytes"))?;

        let dest = ctx.dest_codec(header.dest_chain_selector)?;
        let receiver = dest.parse_address(&message.receiver)?;
        let extra_args = ExtraArgs::decode_for_source(&message.extra_args, ChainFamily::Aptos)?;
        let token_amounts = message
            .token_amounts
            .into_iter()
            .map(|transfer| {
                Ok(TokenAmount {
                    source_pool_address: self.parse_address_str(&transfer.source_pool_address)?,
                    dest_token_address: dest.parse_address(&transfer.dest_token_address)?,
                    amount: transfer.amount,
                    extra_data: transfer.extra_data.into(),
                    dest_gas_amount: parse_dest_exec_data(&transfer.dest_exec_data)?,
                    token: None,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        Ok(CanonicalMessage {
            header: MessageHeader {
                message_id,
                source_chain_selector: header.source_chain_selector,
                dest_chain_selector: header.dest_chain_selector,
                sequence_number: header.sequence_number,
                nonce: header.nonce,
            },
            sender: self.parse_address_str(&message.sender)?,
            receiver,
            data: message.data.into(),
            token_amounts,
            fee_token: self.parse_address_str(&message.fee_token)?,
            fee_token_amount: message.fee_token_amount,
            fee_value_juels: message.fee_value_juels,
            extra_args,
            raw_extra_args: Bytes::from(message.extra_args),
            legacy: None,
        })
    }
}

#[derive(Deserialize)]
struct MessageSentEvent {
    #[serde(deserialize_with = "de_u64")]
    dest_chain_selector: u64,
    #[serde(deserialize_with = "de_u64")]
    sequence_number: u64,
    message: RampMessage,
}

#[derive(Deserialize)]
struct RampMessage {
    header: RampMessageHeader,
    sender: String,
    #[serde(deserialize_with = "de_hex")]
    data: Vec<u8>,
    #[serde(deserialize_with = "de_hex")]
    receiver: Vec<u8>,
    #[serde(deserialize_with = "de_hex")]
    extra_args: Vec<u8>,
    fee_token: String,
    #[serde(deserialize_with = "de_u256")]
    fee_token_amount: U256,
    #[serde(deserialize_with = "de_u256")]
    fee_value_juels: U256,
    #[serde(default)]
    token_amounts: Vec<TokenTransfer>,
}

#[derive(Deserialize)]
struct RampMessageHeader {
    #[serde(deserialize_with = "de_hex")]
    message_id: Vec<u8>,
    #[serde(deserialize_with = "de_u64")]
    source_chain_selector: u64,
    #[serde(deserialize_with = "de_u64")]
    dest_chain_selector: u64,
    #[serde(deserialize_with = "de_u64")]
    sequence_number: u64,
    #[serde(deserialize_with = "de_u64")]
    nonce: u64,
}

#[derive(Deserialize)]
struct TokenTransfer {
    source_pool_address: String,
    #[serde(deserialize_with = "de_hex")]
    dest_token_address: Vec<u8>,
    #[serde(deserialize_with = "de_hex")]
    extra_data: Vec<u8>,
    #[serde(deserialize_with = "de_u256")]
    amount: U256,
    #[serde(deserialize_with = "de_hex")]
    dest_exec_data: Vec<u8>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

fn de_u256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(U256::from(n)),
        NumberOrString::String(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

fn de_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s.trim().trim_start_matches("0x")).map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        codec::{AptosEvent, CodecRegistry},
        extra_args::EVM_EXTRA_ARGS_V2_TAG,
        lane::Lane,
        types::ProtocolVersion,
    };

    const ETHEREUM: u64 = 5_009_297_550_715_157_269;
    const APTOS: u64 = 4_741_433_654_826_277_614;
    const ON_RAMP: &str = "0xc748085bd02022a9696dfa2058774f92a07401208bbd34cfd0c6d0ac0287ee45";

    fn bcs_extra_args(gas: u64) -> String {
        let mut bytes = EVM_EXTRA_ARGS_V2_TAG.to_vec();
        bytes.extend_from_slice(&U256::from(gas).to_le_bytes::<32>());
        bytes.push(1);
        format!("0x{}", hex::encode(bytes))
    }

    fn event(extra_args: String) -> RawEvent {
        RawEvent::Aptos(AptosEvent {
            event_type: format!("{ON_RAMP}::onramp::CCIPMessageSent"),
            data: json!({
                "dest_chain_selector": ETHEREUM.to_string(),
                "sequence_number": "21",
                "message": {
                    "header": {
                        "message_id": format!("0x{}", "ab".repeat(32)),
                        "source_chain_selector": APTOS.to_string(),
                        "dest_chain_selector": ETHEREUM.to_string(),
                        "sequence_number": "21",
                        "nonce": 0
                    },
                    "sender": "0x1",
                    "data": "0xbeef",
                    "receiver": "0x0000000000000000000000002220000000000000000000000000000000000001",
                    "extra_args": extra_args,
                    "fee_token": "0xa",
                    "fee_token_amount": "1000",
                    "fee_value_juels": "0x10",
                    "token_amounts": [{
                        "source_pool_address": "0xcafe",
                        "dest_token_address": "0x6660000000000000000000000000000000000001",
                        "extra_data": "0x",
                        "amount": "340282366920938463463374607431768211456",
                        "dest_exec_data": "0x50c30000"
                    }]
                }
            }),
        })
    }

    #[test]
    fn decodes_rest_api_event() {
        let registry = CodecRegistry::with_defaults();
        let message = registry
            .decode(&event(bcs_extra_args(250_000)), ChainFamily::Aptos, None, None)
            .unwrap();

        assert_eq!(message.header.message_id, B256::repeat_byte(0xab));
        assert_eq!(message.header.source_chain_selector, APTOS);
        assert_eq!(message.header.sequence_number, 21);
        assert_eq!(message.sender, ChainAddress::from_slice_padded(&[1]).unwrap());
        assert_eq!(message.fee_token, ChainAddress::from_slice_padded(&[0x0a]).unwrap());
        assert_eq!(message.fee_value_juels, U256::from(16u64));
        assert_eq!(message.data.as_ref(), &[0xbe, 0xef]);
        assert_eq!(message.extra_args.gas_limit(), U256::from(250_000u64));
        assert!(message.extra_args.allow_out_of_order_execution());

        let token = &message.token_amounts[0];
        assert_eq!(token.amount, U256::from(1u64) << 128);
        assert_eq!(token.dest_gas_amount, 50_000);
        assert_eq!(token.source_pool_address, ChainAddress::from_slice_padded(&[0xca, 0xfe]).unwrap());
    }

    #[test]
    fn checks_emitter_against_lane() {
        let registry = CodecRegistry::with_defaults();
        let codec = AptosCodec;
        let mut lane = Lane {
            source_chain_selector: APTOS,
            dest_chain_selector: ETHEREUM,
            on_ramp: codec.parse_address_str(ON_RAMP).unwrap(),
            version: ProtocolVersion::V1_6,
            source_family: ChainFamily::Aptos,
            dest_family: ChainFamily::Evm,
        };
        let event = event(bcs_extra_args(1));
        assert!(registry.decode(&event, ChainFamily::Aptos, None, Some(&lane)).is_ok());

        lane.on_ramp = ChainAddress::from_slice_padded(&[1]).unwrap();
        assert!(matches!(
            registry.decode(&event, ChainFamily::Aptos, None, Some(&lane)),
            Err(DecodeError::Malformed { field: "type", .. })
        ));
    }

    #[test]
    fn rejects_other_event_types() {
        let registry = CodecRegistry::with_defaults();
        let RawEvent::Aptos(mut raw) = event(bcs_extra_args(1)) else {
            unreachable!()
        };
        raw.event_type = format!("{ON_RAMP}::onramp::FeeTokenAdded");
        assert!(matches!(
            registry.decode(&RawEvent::Aptos(raw), ChainFamily::Aptos, None, None),
            Err(DecodeError::UnknownEvent(_))
        ));
    }

    #[test]
    fn short_and_long_address_forms() {
        let codec = AptosCodec;
        let short = codec.parse_address_str("0x1").unwrap();
        assert_eq!(
            codec.format_address(&short),
            "0x0000000000000000000000000000000000000000000000000000000000000001"
        );
        assert!(codec.parse_address_str("0x").is_err());
        assert!(codec.parse_address_str(&format!("0x{}", "11".repeat(33))).is_err());
    }
}
