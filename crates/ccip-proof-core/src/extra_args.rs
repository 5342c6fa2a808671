//! Tagged execution options carried by every message.
//!
//! Wire form is a 4-byte tag followed by a payload. EVM chains encode the
//! payload with the Solidity ABI, Solana programs with Borsh and Aptos
//! modules with BCS. A missing or unknown tag is always an error.

use alloy_primitives::{Bytes, B256, U256};
use alloy_sol_types::{SolType, SolValue};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{error::ExtraArgsError, sol, types::ChainFamily};

/// `bytes4(keccak256("CCIP EVMExtraArgsV1"))`
pub const EVM_EXTRA_ARGS_V1_TAG: [u8; 4] = [0x97, 0xa6, 0x57, 0xc9];
/// `bytes4(keccak256("CCIP EVMExtraArgsV2"))`, shared with `GenericExtraArgsV2`.
pub const EVM_EXTRA_ARGS_V2_TAG: [u8; 4] = [0x18, 0x1d, 0xcf, 0x10];
/// `bytes4(keccak256("CCIP SVMExtraArgsV1"))`
pub const SVM_EXTRA_ARGS_V1_TAG: [u8; 4] = [0x1f, 0x3b, 0x3a, 0xba];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtraArgsEncoding {
    Abi,
    Borsh,
    Bcs,
}

impl ExtraArgsEncoding {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Abi => "abi",
            Self::Borsh => "borsh",
            Self::Bcs => "bcs",
        }
    }

    /// Encodings an on-ramp of `family` may emit, most likely first.
    ///
    /// Non-EVM on-ramps re-encode arguments bound for EVM chains with the ABI,
    /// so ABI is always a fallback.
    pub const fn candidates_for(family: ChainFamily) -> &'static [Self] {
        match family {
            ChainFamily::Evm => &[Self::Abi],
            ChainFamily::Solana => &[Self::Borsh, Self::Abi],
            ChainFamily::Aptos => &[Self::Bcs, Self::Abi],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SvmExtraArgs {
    pub compute_units: u32,
    pub account_is_writable_bitmap: u64,
    pub allow_out_of_order_execution: bool,
    pub token_receiver: B256,
    pub accounts: Vec<B256>,
}

/// Borsh `EVMExtraArgsV1` as written by the Solana router.
#[derive(BorshSerialize, BorshDeserialize)]
struct BorshEvmExtraArgsV1 {
    gas_limit: u128,
}

#[derive(BorshSerialize, BorshDeserialize)]
struct BorshGenericExtraArgsV2 {
    gas_limit: u128,
    allow_out_of_order_execution: bool,
}

/// Move `u256` is 32 little-endian bytes under BCS.
#[derive(Serialize, Deserialize)]
struct BcsEvmExtraArgsV1 {
    gas_limit: [u8; 32],
}

#[derive(Serialize, Deserialize)]
struct BcsGenericExtraArgsV2 {
    gas_limit: [u8; 32],
    allow_out_of_order_execution: bool,
}

/// `SVMExtraArgsV1` has the same field layout under Borsh and BCS; only the
/// length prefix of `accounts` differs.
#[derive(BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
struct SvmExtraArgsPayload {
    compute_units: u32,
    account_is_writable_bitmap: u64,
    allow_out_of_order_execution: bool,
    token_receiver: [u8; 32],
    accounts: Vec<[u8; 32]>,
}

impl From<&SvmExtraArgs> for SvmExtraArgsPayload {
    fn from(args: &SvmExtraArgs) -> Self {
        Self {
            compute_units: args.compute_units,
            account_is_writable_bitmap: args.account_is_writable_bitmap,
            allow_out_of_order_execution: args.allow_out_of_order_execution,
            token_receiver: args.token_receiver.0,
            accounts: args.accounts.iter().map(|account| account.0).collect(),
        }
    }
}

impl From<SvmExtraArgsPayload> for SvmExtraArgs {
    fn from(payload: SvmExtraArgsPayload) -> Self {
        Self {
            compute_units: payload.compute_units,
            account_is_writable_bitmap: payload.account_is_writable_bitmap,
            allow_out_of_order_execution: payload.allow_out_of_order_execution,
            token_receiver: B256::from(payload.token_receiver),
            accounts: payload.accounts.into_iter().map(B256::from).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtraArgs {
    EvmV1 { gas_limit: U256 },
    EvmV2 { gas_limit: U256, allow_out_of_order_execution: bool },
    SvmV1(SvmExtraArgs),
}

impl ExtraArgs {
    pub const fn tag(&self) -> [u8; 4] {
        match self {
            Self::EvmV1 { .. } => EVM_EXTRA_ARGS_V1_TAG,
            Self::EvmV2 { .. } => EVM_EXTRA_ARGS_V2_TAG,
            Self::SvmV1(_) => SVM_EXTRA_ARGS_V1_TAG,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::EvmV1 { .. } => "EVMExtraArgsV1",
            Self::EvmV2 { .. } => "EVMExtraArgsV2",
            Self::SvmV1(_) => "SVMExtraArgsV1",
        }
    }

    /// Execution limit the destination enforces: gas for EVM targets,
    /// compute units for SVM targets.
    pub fn gas_limit(&self) -> U256 {
        match self {
            Self::EvmV1 { gas_limit } | Self::EvmV2 { gas_limit, .. } => *gas_limit,
            Self::SvmV1(args) => U256::from(args.compute_units),
        }
    }

    pub fn allow_out_of_order_execution(&self) -> bool {
        match self {
            Self::EvmV1 { .. } => false,
            Self::EvmV2 {
                allow_out_of_order_execution,
                ..
            } => *allow_out_of_order_execution,
            Self::SvmV1(args) => args.allow_out_of_order_execution,
        }
    }

    pub fn decode(bytes: &[u8], encoding: ExtraArgsEncoding) -> Result<Self, ExtraArgsError> {
        let (tag, payload) = split_tag(bytes)?;
        match encoding {
            ExtraArgsEncoding::Abi => decode_abi(tag, payload),
            ExtraArgsEncoding::Borsh => decode_borsh(tag, payload),
            ExtraArgsEncoding::Bcs => decode_bcs(tag, payload),
        }
    }

    /// Decodes extra args emitted by an on-ramp of the given family, trying
    /// each plausible payload encoding and keeping the first that consumes
    /// the payload exactly.
    pub fn decode_for_source(bytes: &[u8], source: ChainFamily) -> Result<Self, ExtraArgsError> {
        let (tag, _) = split_tag(bytes)?;
        if ![EVM_EXTRA_ARGS_V1_TAG, EVM_EXTRA_ARGS_V2_TAG, SVM_EXTRA_ARGS_V1_TAG].contains(&tag) {
            return Err(ExtraArgsError::UnknownTag(tag));
        }

        let mut first_err = None;
        for encoding in ExtraArgsEncoding::candidates_for(source) {
            match Self::decode(bytes, *encoding) {
                Ok(args) => {
                    tracing::trace!(encoding = encoding.name(), kind = args.name(), "decoded extra args");
                    return Ok(args);
                }
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or(ExtraArgsError::TooShort))
    }

    pub fn encode(&self, encoding: ExtraArgsEncoding) -> Result<Bytes, ExtraArgsError> {
        let payload = match encoding {
            ExtraArgsEncoding::Abi => self.encode_abi(),
            ExtraArgsEncoding::Borsh => self.encode_borsh()?,
            ExtraArgsEncoding::Bcs => self.encode_bcs()?,
        };
        let mut out = Vec::with_capacity(4 + payload.len());
        out.extend_from_slice(&self.tag());
        out.extend_from_slice(&payload);
        Ok(Bytes::from(out))
    }

    fn encode_abi(&self) -> Vec<u8> {
        match self {
            Self::EvmV1 { gas_limit } => sol::EVMExtraArgsV1 {
                gasLimit: *gas_limit,
            }
            .abi_encode(),
            Self::EvmV2 {
                gas_limit,
                allow_out_of_order_execution,
            } => sol::GenericExtraArgsV2 {
                gasLimit: *gas_limit,
                allowOutOfOrderExecution: *allow_out_of_order_execution,
            }
            .abi_encode(),
            Self::SvmV1(args) => sol::SVMExtraArgsV1 {
                computeUnits: args.compute_units,
                accountIsWritableBitmap: args.account_is_writable_bitmap,
                allowOutOfOrderExecution: args.allow_out_of_order_execution,
                tokenReceiver: args.token_receiver,
                accounts: args.accounts.clone(),
            }
            .abi_encode(),
        }
    }

    fn encode_borsh(&self) -> Result<Vec<u8>, ExtraArgsError> {
        let encoded = match self {
            Self::EvmV1 { gas_limit } => borsh::to_vec(&BorshEvmExtraArgsV1 {
                gas_limit: borsh_gas_limit(*gas_limit)?,
            }),
            Self::EvmV2 {
                gas_limit,
                allow_out_of_order_execution,
            } => borsh::to_vec(&BorshGenericExtraArgsV2 {
                gas_limit: borsh_gas_limit(*gas_limit)?,
                allow_out_of_order_execution: *allow_out_of_order_execution,
            }),
            Self::SvmV1(args) => borsh::to_vec(&SvmExtraArgsPayload::from(args)),
        };
        // Borsh only fails on sequences longer than u32::MAX.
        encoded.map_err(|_| out_of_range("accounts", ExtraArgsEncoding::Borsh))
    }

    fn encode_bcs(&self) -> Result<Vec<u8>, ExtraArgsError> {
        let encoded = match self {
            Self::EvmV1 { gas_limit } => bcs::to_bytes(&BcsEvmExtraArgsV1 {
                gas_limit: gas_limit.to_le_bytes::<32>(),
            }),
            Self::EvmV2 {
                gas_limit,
                allow_out_of_order_execution,
            } => bcs::to_bytes(&BcsGenericExtraArgsV2 {
                gas_limit: gas_limit.to_le_bytes::<32>(),
                allow_out_of_order_execution: *allow_out_of_order_execution,
            }),
            Self::SvmV1(args) => bcs::to_bytes(&SvmExtraArgsPayload::from(args)),
        };
        encoded.map_err(|_| out_of_range("accounts", ExtraArgsEncoding::Bcs))
    }
}

fn split_tag(bytes: &[u8]) -> Result<([u8; 4], &[u8]), ExtraArgsError> {
    if bytes.len() < 4 {
        return Err(ExtraArgsError::TooShort);
    }
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&bytes[..4]);
    Ok((tag, &bytes[4..]))
}

fn decode_abi(tag: [u8; 4], payload: &[u8]) -> Result<ExtraArgs, ExtraArgsError> {
    match tag {
        EVM_EXTRA_ARGS_V1_TAG => {
            let args = abi_decode_exact::<sol::EVMExtraArgsV1>(payload, "EVMExtraArgsV1")?;
            Ok(ExtraArgs::EvmV1 {
                gas_limit: args.gasLimit,
            })
        }
        EVM_EXTRA_ARGS_V2_TAG => {
            let args = abi_decode_exact::<sol::GenericExtraArgsV2>(payload, "EVMExtraArgsV2")?;
            Ok(ExtraArgs::EvmV2 {
                gas_limit: args.gasLimit,
                allow_out_of_order_execution: args.allowOutOfOrderExecution,
            })
        }
        SVM_EXTRA_ARGS_V1_TAG => {
            let args = abi_decode_exact::<sol::SVMExtraArgsV1>(payload, "SVMExtraArgsV1")?;
            Ok(ExtraArgs::SvmV1(SvmExtraArgs {
                compute_units: args.computeUnits,
                account_is_writable_bitmap: args.accountIsWritableBitmap,
                allow_out_of_order_execution: args.allowOutOfOrderExecution,
                token_receiver: args.tokenReceiver,
                accounts: args.accounts,
            }))
        }
        other => Err(ExtraArgsError::UnknownTag(other)),
    }
}

fn abi_decode_exact<T>(payload: &[u8], tag: &'static str) -> Result<T, ExtraArgsError>
where
    T: SolValue + From<<T::SolType as SolType>::RustType>,
{
    let decoded = T::abi_decode(payload, true).map_err(|e| ExtraArgsError::Malformed {
        tag,
        reason: e.to_string(),
    })?;
    // The ABI decoder tolerates trailing data; the canonical encoding must be exact.
    let canonical_len = decoded.abi_encode().len();
    if canonical_len != payload.len() {
        return Err(ExtraArgsError::Malformed {
            tag,
            reason: format!("expected {canonical_len} payload bytes, got {}", payload.len()),
        });
    }
    Ok(decoded)
}

/// `try_from_slice` rejects payloads with bytes left over.
fn borsh_exact<T: BorshDeserialize>(payload: &[u8], tag: &'static str) -> Result<T, ExtraArgsError> {
    T::try_from_slice(payload).map_err(|e| ExtraArgsError::Malformed {
        tag,
        reason: e.to_string(),
    })
}

fn bcs_exact<T: DeserializeOwned>(payload: &[u8], tag: &'static str) -> Result<T, ExtraArgsError> {
    bcs::from_bytes(payload).map_err(|e| ExtraArgsError::Malformed {
        tag,
        reason: e.to_string(),
    })
}

fn decode_borsh(tag: [u8; 4], payload: &[u8]) -> Result<ExtraArgs, ExtraArgsError> {
    match tag {
        EVM_EXTRA_ARGS_V1_TAG => {
            let args = borsh_exact::<BorshEvmExtraArgsV1>(payload, "EVMExtraArgsV1")?;
            Ok(ExtraArgs::EvmV1 {
                gas_limit: U256::from(args.gas_limit),
            })
        }
        EVM_EXTRA_ARGS_V2_TAG => {
            let args = borsh_exact::<BorshGenericExtraArgsV2>(payload, "EVMExtraArgsV2")?;
            Ok(ExtraArgs::EvmV2 {
                gas_limit: U256::from(args.gas_limit),
                allow_out_of_order_execution: args.allow_out_of_order_execution,
            })
        }
        SVM_EXTRA_ARGS_V1_TAG => {
            let args = borsh_exact::<SvmExtraArgsPayload>(payload, "SVMExtraArgsV1")?;
            Ok(ExtraArgs::SvmV1(args.into()))
        }
        other => Err(ExtraArgsError::UnknownTag(other)),
    }
}

fn decode_bcs(tag: [u8; 4], payload: &[u8]) -> Result<ExtraArgs, ExtraArgsError> {
    match tag {
        EVM_EXTRA_ARGS_V1_TAG => {
            let args = bcs_exact::<BcsEvmExtraArgsV1>(payload, "EVMExtraArgsV1")?;
            Ok(ExtraArgs::EvmV1 {
                gas_limit: U256::from_le_bytes(args.gas_limit),
            })
        }
        EVM_EXTRA_ARGS_V2_TAG => {
            let args = bcs_exact::<BcsGenericExtraArgsV2>(payload, "EVMExtraArgsV2")?;
            Ok(ExtraArgs::EvmV2 {
                gas_limit: U256::from_le_bytes(args.gas_limit),
                allow_out_of_order_execution: args.allow_out_of_order_execution,
            })
        }
        SVM_EXTRA_ARGS_V1_TAG => {
            let args = bcs_exact::<SvmExtraArgsPayload>(payload, "SVMExtraArgsV1")?;
            Ok(ExtraArgs::SvmV1(args.into()))
        }
        other => Err(ExtraArgsError::UnknownTag(other)),
    }
}

/// Borsh carries the gas limit as `u128`.
fn borsh_gas_limit(gas_limit: U256) -> Result<u128, ExtraArgsError> {
    u128::try_from(gas_limit).map_err(|_| out_of_range("gasLimit", ExtraArgsEncoding::Borsh))
}

fn out_of_range(field: &'static str, encoding: ExtraArgsEncoding) -> ExtraArgsError {
    ExtraArgsError::OutOfRange {
        field,
        encoding: encoding.name(),
    }
}
