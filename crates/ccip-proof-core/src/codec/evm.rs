use alloy_primitives::Address;
use alloy_sol_types::{SolEvent, SolValue};

use super::{parse_dest_exec_data, ChainCodec, DecodeContext, EvmLog, RawEvent};
use crate::{
    copy_array,
    error::DecodeError,
    extra_args::{ExtraArgs, ExtraArgsEncoding},
    sol,
    types::{CanonicalMessage, ChainAddress, ChainFamily, LegacyFields, MessageHeader, ProtocolVersion, TokenAmount},
};

/// EVM on-ramps: `CCIPSendRequested` (1.2, 1.5) and `CCIPMessageSent` (1.6).
#[derive(Clone, Copy, Debug, Default)]
pub struct EvmCodec;

fn invalid(reason: impl ToString) -> DecodeError {
    DecodeError::InvalidAddress {
        family: ChainFamily::Evm,
        reason: reason.to_string(),
    }
}

impl ChainCodec for EvmCodec {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn parse_address(&self, bytes: &[u8]) -> Result<ChainAddress, DecodeError> {
        match bytes.len() {
            20 => Ok(Address::from_slice(bytes).into()),
            32 => {
                let address = ChainAddress::from_word(copy_array::<32>(bytes));
                match address.evm_address() {
                    Some(_) => Ok(address),
                    None => Err(invalid("32-byte address has non-zero high bytes")),
                }
            }
            n => Err(invalid(format!("expected 20 or 32 bytes, got {n}"))),
        }
    }

    fn parse_address_str(&self, s: &str) -> Result<ChainAddress, DecodeError> {
        s.trim().parse::<Address>().map(Into::into).map_err(invalid)
    }

    fn format_address(&self, address: &ChainAddress) -> String {
        match address.evm_address() {
            Some(address) => address.to_checksum(None),
            None => format!("0x{}", hex::encode(address.as_word())),
        }
    }

    fn decode_message(&self, event: &RawEvent, ctx: &DecodeContext<'_>) -> Result<CanonicalMessage, DecodeError> {
        let RawEvent::Evm(log) = event else {
            return Err(DecodeError::FamilyMismatch {
                expected: ChainFamily::Evm,
                found: event.family(),
            });
        };

        if let Some(lane) = ctx.lane {
            if lane.on_ramp != ChainAddress::from(log.address) {
                return Err(DecodeError::malformed(
                    "address",
                    format!(
                        "log emitted by {}, lane on-ramp is {}",
                        log.address.to_checksum(None),
                        self.format_address(&lane.on_ramp)
                    ),
                ));
            }
        }

        let topic0 = log
            .topics
            .first()
            .ok_or_else(|| DecodeError::UnknownEvent("log without topics".to_string()))?;

        if *topic0 == sol::CCIPMessageSent::SIGNATURE_HASH {
            tracing::trace!(on_ramp = %log.address, "CCIPMessageSent");
            decode_message_sent(log, ctx)
        } else if *topic0 == sol::CCIPSendRequested::SIGNATURE_HASH {
            tracing::trace!(on_ramp = %log.address, "CCIPSendRequested");
            decode_send_requested(log, ctx)
        } else {
            Err(DecodeError::UnknownEvent(format!("topic0 {topic0}")))
        }
    }
}

fn decode_message_sent(log: &EvmLog, ctx: &DecodeContext<'_>) -> Result<CanonicalMessage, DecodeError> {
    ctx.require_current(ChainFamily::Evm)?;

    let event = sol::CCIPMessageSent::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| DecodeError::malformed("CCIPMessageSent", e))?;
    let message = event.message;
    let header = message.header;
    if event.destChainSelector != header.destChainSelector || event.sequenceNumber != header.sequenceNumber {
        return Err(DecodeError::malformed(
            "header",
            "indexed topics disagree with the message header",
        ));
    }

    let dest = ctx.dest_codec(header.destChainSelector)?;
    let receiver = dest.parse_address(&message.receiver)?;
    let extra_args = ExtraArgs::decode_for_source(&message.extraArgs, ChainFamily::Evm)?;
    let token_amounts = message
        .tokenAmounts
        .into_iter()
        .map(|transfer| {
            Ok(TokenAmount {
                source_pool_address: transfer.sourcePoolAddress.into(),
                dest_token_address: dest.parse_address(&transfer.destTokenAddress)?,
                amount: transfer.amount,
                extra_data: transfer.extraData,
                dest_gas_amount: parse_dest_exec_data(&transfer.destExecData)?,
                token: None,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(CanonicalMessage {
        header: MessageHeader {
            message_id: header.messageId,
            source_chain_selector: header.sourceChainSelector,
            dest_chain_selector: header.destChainSelector,
            sequence_number: header.sequenceNumber,
            nonce: header.nonce,
        },
        sender: message.sender.into(),
        receiver,
        data: message.data,
        token_amounts,
        fee_token: message.feeToken.into(),
        fee_token_amount: message.feeTokenAmount,
        fee_value_juels: message.feeValueJuels,
        extra_args,
        raw_extra_args: message.extraArgs,
        legacy: None,
    })
}

fn decode_send_requested(log: &EvmLog, ctx: &DecodeContext<'_>) -> Result<CanonicalMessage, DecodeError> {
    let lane = ctx
        .lane
        .ok_or_else(|| DecodeError::MissingLane(log.address.to_checksum(None)))?;
    let version = ctx.version_hint.unwrap_or(lane.version);
    if !version.is_legacy() {
        return Err(DecodeError::malformed(
            "event",
            format!("CCIPSendRequested is not emitted by {version} on-ramps"),
        ));
    }

    let event = sol::CCIPSendRequested::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| DecodeError::malformed("CCIPSendRequested", e))?;
    let message = event.message;

    if message.sourceChainSelector != lane.source_chain_selector {
        return Err(DecodeError::malformed(
            "sourceChainSelector",
            format!(
                "message from {} on a lane from {}",
                message.sourceChainSelector, lane.source_chain_selector
            ),
        ));
    }
    if message.sourceTokenData.len() != message.tokenAmounts.len() {
        return Err(DecodeError::malformed(
            "sourceTokenData",
            format!(
                "{} entries for {} token transfers",
                message.sourceTokenData.len(),
                message.tokenAmounts.len()
            ),
        ));
    }

    let mut token_amounts = Vec::with_capacity(message.tokenAmounts.len());
    for (transfer, source_data) in message.tokenAmounts.iter().zip(&message.sourceTokenData) {
        let mut token = TokenAmount {
            amount: transfer.amount,
            token: Some(transfer.token.into()),
            ..Default::default()
        };
        if version == ProtocolVersion::V1_5 {
            merge_source_token_data(&mut token, source_data)?;
        } else if token.extra_data.is_empty() {
            // 1.2 pools emit opaque bytes.
            token.extra_data = source_data.clone();
        }
        token_amounts.push(token);
    }

    // Legacy messages carry the gas limit explicitly; a zero nonce is how
    // they opt into out-of-order execution.
    let extra_args = ExtraArgs::EvmV2 {
        gas_limit: message.gasLimit,
        allow_out_of_order_execution: message.nonce == 0,
    };
    let raw_extra_args = extra_args.encode(ExtraArgsEncoding::Abi)?;

    Ok(CanonicalMessage {
        header: MessageHeader {
            message_id: message.messageId,
            source_chain_selector: message.sourceChainSelector,
            dest_chain_selector: lane.dest_chain_selector,
            sequence_number: message.sequenceNumber,
            nonce: message.nonce,
        },
        sender: message.sender.into(),
        receiver: message.receiver.into(),
        data: message.data,
        token_amounts,
        fee_token: message.feeToken.into(),
        fee_token_amount: message.feeTokenAmount,
        fee_value_juels: Default::default(),
        extra_args,
        raw_extra_args,
        legacy: Some(LegacyFields {
            strict: message.strict,
            source_token_data: message.sourceTokenData,
        }),
    })
}

/// Fills fields from a 1.5 `SourceTokenData` blob without touching any
/// field that is already populated.
fn merge_source_token_data(token: &mut TokenAmount, raw: &[u8]) -> Result<(), DecodeError> {
    if raw.is_empty() {
        return Ok(());
    }
    let data = sol::SourceTokenData::abi_decode(raw, true).map_err(|e| DecodeError::malformed("sourceTokenData", e))?;

    if token.source_pool_address.is_zero() {
        token.source_pool_address = ChainAddress::from_slice_padded(&data.sourcePoolAddress)
            .ok_or_else(|| DecodeError::malformed("sourcePoolAddress", "longer than 32 bytes"))?;
    }
    if token.dest_token_address.is_zero() {
        token.dest_token_address = EvmCodec.parse_address(&data.destTokenAddress)?;
    }
    if token.extra_data.is_empty() {
        token.extra_data = data.extraData;
    }
    if token.dest_gas_amount == 0 {
        token.dest_gas_amount = u64::from(data.destGasAmount);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, b256, Bytes, B256, U256};

    use super::*;
    use crate::{
        codec::CodecRegistry,
        extra_args::EVM_EXTRA_ARGS_V2_TAG,
        hasher::{
            hash_leaf,
            tests::{evm_lane, legacy_message_fixture},
        },
        lane::Lane,
        u64_to_bytes32,
    };

    const ON_RAMP: Address = address!("5550000000000000000000000000000000000001");

    fn registry() -> CodecRegistry {
        let mut registry = CodecRegistry::with_defaults();
        registry.register_chain(1, ChainFamily::Evm);
        registry.register_chain(4, ChainFamily::Evm);
        registry
    }

    fn to_log(data: alloy_primitives::LogData) -> RawEvent {
        RawEvent::Evm(EvmLog {
            address: ON_RAMP,
            topics: data.topics().to_vec(),
            data: data.data,
        })
    }

    fn word(address: Address) -> Bytes {
        Bytes::copy_from_slice(address.into_word().as_slice())
    }

    fn extra_args_v2(gas: u64, allow_ooo: bool) -> Bytes {
        let mut out = EVM_EXTRA_ARGS_V2_TAG.to_vec();
        out.extend_from_slice(&u64_to_bytes32(gas));
        out.extend_from_slice(&crate::bool_to_bytes32(allow_ooo));
        out.into()
    }

    fn message_sent(nonce: u64) -> sol::CCIPMessageSent {
        sol::CCIPMessageSent {
            destChainSelector: 4,
            sequenceNumber: 1337,
            message: sol::EVM2AnyRampMessage {
                header: sol::RampMessageHeader {
                    messageId: B256::repeat_byte(0x42),
                    sourceChainSelector: 1,
                    destChainSelector: 4,
                    sequenceNumber: 1337,
                    nonce,
                },
                sender: address!("1110000000000000000000000000000000000001"),
                data: Bytes::from_static(b"hello"),
                receiver: word(address!("2220000000000000000000000000000000000001")),
                extraArgs: extra_args_v2(100_000, false),
                feeToken: Address::ZERO,
                feeTokenAmount: U256::ZERO,
                feeValueJuels: U256::ZERO,
                tokenAmounts: vec![sol::EVM2AnyTokenTransfer {
                    sourcePoolAddress: address!("4440000000000000000000000000000000000001"),
                    destTokenAddress: word(address!("6660000000000000000000000000000000000001")),
                    extraData: Bytes::new(),
                    amount: U256::from(12_345_678_900u64),
                    destExecData: Bytes::copy_from_slice(&u64_to_bytes32(50_000)),
                }],
            },
        }
    }

    fn send_requested(nonce: u64, source_token_data: Vec<Bytes>) -> sol::CCIPSendRequested {
        let fixture = legacy_message_fixture();
        sol::CCIPSendRequested {
            message: sol::EVM2EVMMessage {
                sourceChainSelector: 1,
                sender: address!("1110000000000000000000000000000000000001"),
                receiver: address!("2220000000000000000000000000000000000001"),
                sequenceNumber: 1337,
                gasLimit: U256::from(100u64),
                strict: false,
                nonce,
                feeToken: Address::ZERO,
                feeTokenAmount: U256::from(1u64),
                data: Bytes::new(),
                tokenAmounts: vec![sol::EVMTokenAmount {
                    token: address!("4440000000000000000000000000000000000001"),
                    amount: fixture.token_amounts[0].amount,
                }],
                sourceTokenData: source_token_data,
                messageId: B256::repeat_byte(0x07),
            },
        }
    }

    #[test]
    fn decodes_v1_6_and_matches_known_leaf() {
        let registry = registry();
        let event = to_log(message_sent(1337).encode_log_data());
        let message = registry
            .decode(&event, ChainFamily::Evm, None, None)
            .unwrap();

        assert_eq!(message.header.dest_chain_selector, 4);
        assert_eq!(message.token_amounts[0].dest_gas_amount, 50_000);
        assert_eq!(message.extra_args.gas_limit(), U256::from(100_000u64));
        assert!(message.legacy.is_none());

        let leaf = hash_leaf(&message, &evm_lane(ProtocolVersion::V1_6)).unwrap();
        assert_eq!(
            leaf,
            b256!("f1dd62355134f44ab8c2328933a72c2931694f9f1e5cdb859e87d2e1dd44eb02")
        );
    }

    #[test]
    fn zero_nonce_does_not_imply_out_of_order_on_v1_6() {
        let registry = registry();
        let event = to_log(message_sent(0).encode_log_data());
        let message = registry.decode(&event, ChainFamily::Evm, None, None).unwrap();
        assert_eq!(message.header.nonce, 0);
        assert!(!message.extra_args.allow_out_of_order_execution());
    }

    #[test]
    fn v1_6_needs_a_known_destination() {
        let registry = CodecRegistry::with_defaults();
        let event = to_log(message_sent(1).encode_log_data());
        assert_eq!(
            registry.decode(&event, ChainFamily::Evm, None, None),
            Err(DecodeError::UnknownChainSelector(4))
        );
    }

    #[test]
    fn decodes_v1_2_and_matches_known_leaf() {
        let registry = registry();
        let lane = evm_lane(ProtocolVersion::V1_2);
        let event = to_log(send_requested(1337, vec![Bytes::new()]).encode_log_data());
        let message = registry
            .decode(&event, ChainFamily::Evm, None, Some(&lane))
            .unwrap();

        assert_eq!(message.header.source_chain_selector, 1);
        assert_eq!(message.header.dest_chain_selector, 4);
        assert_eq!(message.header.message_id, B256::repeat_byte(0x07));
        assert!(!message.extra_args.allow_out_of_order_execution());
        assert_eq!(message.extra_args.gas_limit(), U256::from(100u64));
        assert_eq!(
            message.raw_extra_args,
            message.extra_args.encode(ExtraArgsEncoding::Abi).unwrap()
        );

        // The reference vector hashes an empty sourceTokenData array.
        let mut as_fixture = message.clone();
        as_fixture.legacy.as_mut().unwrap().source_token_data.clear();
        assert_eq!(
            hash_leaf(&as_fixture, &lane).unwrap(),
            b256!("46ad031bfb052db2e4a2514fed8dc480b98e5ce4acb55d5640d91407e0d8a3e9")
        );
    }

    #[test]
    fn legacy_zero_nonce_allows_out_of_order() {
        let registry = registry();
        let lane = evm_lane(ProtocolVersion::V1_5);
        let event = to_log(send_requested(0, vec![Bytes::new()]).encode_log_data());
        let message = registry
            .decode(&event, ChainFamily::Evm, None, Some(&lane))
            .unwrap();
        assert!(message.extra_args.allow_out_of_order_execution());
    }

    #[test]
    fn legacy_needs_a_lane() {
        let registry = registry();
        let event = to_log(send_requested(1, vec![Bytes::new()]).encode_log_data());
        assert!(matches!(
            registry.decode(&event, ChainFamily::Evm, None, None),
            Err(DecodeError::MissingLane(_))
        ));
    }

    #[test]
    fn v1_5_merges_source_token_data() {
        let registry = registry();
        let lane = evm_lane(ProtocolVersion::V1_5);
        let pool = address!("7770000000000000000000000000000000000001");
        let dest_token = address!("8880000000000000000000000000000000000001");
        let source_data = sol::SourceTokenData {
            sourcePoolAddress: word(pool),
            destTokenAddress: word(dest_token),
            extraData: Bytes::from_static(&[0xaa, 0xbb]),
            destGasAmount: 90_000,
        }
        .abi_encode();

        let event = to_log(send_requested(5, vec![source_data.clone().into()]).encode_log_data());
        let message = registry
            .decode(&event, ChainFamily::Evm, None, Some(&lane))
            .unwrap();

        let token = &message.token_amounts[0];
        assert_eq!(token.source_pool_address, ChainAddress::from(pool));
        assert_eq!(token.dest_token_address, ChainAddress::from(dest_token));
        assert_eq!(token.extra_data.as_ref(), &[0xaa, 0xbb]);
        assert_eq!(token.dest_gas_amount, 90_000);
        assert_eq!(
            token.token,
            Some(address!("4440000000000000000000000000000000000001").into())
        );
        // The raw blob is still what gets hashed.
        assert_eq!(
            message.legacy.as_ref().unwrap().source_token_data[0].as_ref(),
            source_data.as_slice()
        );
    }

    #[test]
    fn v1_2_keeps_source_token_data_opaque() {
        let registry = registry();
        let lane = evm_lane(ProtocolVersion::V1_2);
        let event = to_log(send_requested(5, vec![Bytes::from_static(&[1, 2, 3])]).encode_log_data());
        let message = registry
            .decode(&event, ChainFamily::Evm, None, Some(&lane))
            .unwrap();
        assert_eq!(message.token_amounts[0].extra_data.as_ref(), &[1, 2, 3]);
        assert!(message.token_amounts[0].source_pool_address.is_zero());
    }

    #[test]
    fn rejects_logs_from_another_on_ramp() {
        let registry = registry();
        let lane = Lane {
            on_ramp: ChainAddress::from(Address::repeat_byte(0x99)),
            ..evm_lane(ProtocolVersion::V1_5)
        };
        let event = to_log(send_requested(1, vec![Bytes::new()]).encode_log_data());
        assert!(matches!(
            registry.decode(&event, ChainFamily::Evm, None, Some(&lane)),
            Err(DecodeError::Malformed { field: "address", .. })
        ));
    }

    #[test]
    fn rejects_unknown_topics() {
        let registry = registry();
        let event = RawEvent::Evm(EvmLog {
            address: ON_RAMP,
            topics: vec![B256::repeat_byte(0x01)],
            data: Bytes::new(),
        });
        assert!(matches!(
            registry.decode(&event, ChainFamily::Evm, None, None),
            Err(DecodeError::UnknownEvent(_))
        ));
    }

    #[test]
    fn address_forms() {
        let codec = EvmCodec;
        let addr = codec
            .parse_address_str("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed")
            .unwrap();
        assert_eq!(codec.format_address(&addr), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert!(codec.parse_address(&[0xff; 32]).is_err());
        assert!(codec.parse_address(&[0x01; 21]).is_err());
    }
}
