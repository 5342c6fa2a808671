//! Canonical, version-agnostic message model shared by the decoders, the
//! leaf hasher and the report builder.

use core::{fmt, str::FromStr};

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::extra_args::ExtraArgs;

pub type Hash256 = B256;

/// Chain family, which decides address width, event layout and binary encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    #[serde(alias = "svm")]
    Solana,
    Aptos,
}

impl ChainFamily {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Solana => "solana",
            Self::Aptos => "aptos",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evm" => Ok(Self::Evm),
            "solana" | "svm" => Ok(Self::Solana),
            "aptos" => Ok(Self::Aptos),
            other => Err(format!("unknown chain family: {other}")),
        }
    }
}

/// On-ramp/off-ramp protocol generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V1_2,
    V1_5,
    V1_6,
}

impl ProtocolVersion {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::V1_2 => "1.2.0",
            Self::V1_5 => "1.5.0",
            Self::V1_6 => "1.6.0",
        }
    }

    /// Versions that emit `EVM2EVMMessage` and hash with the legacy leaf layout.
    pub const fn is_legacy(&self) -> bool {
        matches!(self, Self::V1_2 | Self::V1_5)
    }

    /// Parses a contract `typeAndVersion()` string such as `"EVM2EVMOnRamp 1.5.0"`.
    pub fn from_type_and_version(type_and_version: &str) -> Option<Self> {
        let version = type_and_version.split_whitespace().last()?;
        version.parse().ok()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches(|c: char| c == 'v' || c == 'V');
        let mut parts = trimmed.split('.');
        let major = parts.next().unwrap_or_default();
        let minor = parts.next().unwrap_or_default();
        // Patch versions and pre-release suffixes ("1.6.0-dev") do not change the wire format.
        match (major, minor) {
            ("1", "2") => Ok(Self::V1_2),
            ("1", "5") => Ok(Self::V1_5),
            ("1", "6") => Ok(Self::V1_6),
            _ => Err(format!("unsupported protocol version: {s}")),
        }
    }
}

/// A chain-native address held as a left-zero-padded 32-byte word.
///
/// Rendering back to the native textual form is the job of the family's
/// [`ChainCodec`](crate::codec::ChainCodec).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChainAddress([u8; 32]);

impl ChainAddress {
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn from_word(word: [u8; 32]) -> Self {
        Self(word)
    }

    /// Left-pads up to 32 bytes. Returns `None` for longer inputs.
    pub fn from_slice_padded(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(bytes);
        Some(Self(out))
    }

    pub const fn as_word(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_b256(&self) -> B256 {
        B256::from(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// The EVM view of this address, if the high 12 bytes are zero.
    pub fn evm_address(&self) -> Option<Address> {
        if self.0[..12].iter().any(|b| *b != 0) {
            return None;
        }
        Some(Address::from_word(self.to_b256()))
    }
}

impl From<Address> for ChainAddress {
    fn from(address: Address) -> Self {
        Self(address.into_word().0)
    }
}

impl From<B256> for ChainAddress {
    fn from(word: B256) -> Self {
        Self(word.0)
    }
}

impl fmt::Debug for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainAddress(0x{})", hex::encode(self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_id: B256,
    pub source_chain_selector: u64,
    pub dest_chain_selector: u64,
    pub sequence_number: u64,
    pub nonce: u64,
}

/// One token transfer. Order inside a message is part of the leaf hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenAmount {
    pub source_pool_address: ChainAddress,
    pub dest_token_address: ChainAddress,
    pub amount: U256,
    pub extra_data: Bytes,
    pub dest_gas_amount: u64,
    /// Source-chain token address. Only legacy (<= 1.5) messages carry it, and
    /// only the legacy leaf hash reads it.
    pub token: Option<ChainAddress>,
}

/// Fields that exist only on `EVM2EVMMessage` (protocol <= 1.5).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegacyFields {
    pub strict: bool,
    /// Raw per-transfer pool data exactly as emitted; hashed verbatim.
    pub source_token_data: Vec<Bytes>,
}

/// Normalized cross-chain message. Built once by a decoder and then only read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CanonicalMessage {
    pub header: MessageHeader,
    pub sender: ChainAddress,
    pub receiver: ChainAddress,
    pub data: Bytes,
    pub token_amounts: Vec<TokenAmount>,
    pub fee_token: ChainAddress,
    pub fee_token_amount: U256,
    pub fee_value_juels: U256,
    pub extra_args: ExtraArgs,
    /// Encoded form of `extra_args` as it appeared on the wire (or as
    /// synthesized for legacy messages).
    pub raw_extra_args: Bytes,
    pub legacy: Option<LegacyFields>,
}

impl CanonicalMessage {
    pub fn message_id(&self) -> B256 {
        self.header.message_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.header.sequence_number
    }
}

/// Commit event data covering the closed interval `[min_seq_nr, max_seq_nr]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitReport {
    pub merkle_root: B256,
    pub min_seq_nr: u64,
    pub max_seq_nr: u64,
    pub source_chain_selector: u64,
    pub on_ramp_address: ChainAddress,
}

impl CommitReport {
    /// Number of sequence numbers in the interval, or `None` if `min > max`.
    pub fn interval_len(&self) -> Option<u64> {
        self.max_seq_nr
            .checked_sub(self.min_seq_nr)
            .and_then(|d| d.checked_add(1))
    }

    pub fn contains(&self, sequence_number: u64) -> bool {
        (self.min_seq_nr..=self.max_seq_nr).contains(&sequence_number)
    }
}
