//! Per-family event decoding and address codecs.
//!
//! Each chain family implements [`ChainCodec`]. A [`CodecRegistry`] owns one
//! codec per family plus the chain-selector table that tells a decoder which
//! family a message's destination belongs to.

mod aptos;
mod evm;
mod solana;

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, B256};

pub use self::{aptos::AptosCodec, evm::EvmCodec, solana::SolanaCodec};
use crate::{
    error::DecodeError,
    lane::Lane,
    types::{CanonicalMessage, ChainAddress, ChainFamily, ProtocolVersion},
};

/// Well-known chain selectors. Anything else must be registered explicitly.
pub const KNOWN_CHAINS: &[(&str, u64, ChainFamily)] = &[
    ("ethereum-mainnet", 5_009_297_550_715_157_269, ChainFamily::Evm),
    ("ethereum-testnet-sepolia", 16_015_286_601_757_825_753, ChainFamily::Evm),
    ("solana-mainnet", 124_615_329_519_749_607, ChainFamily::Solana),
    ("solana-devnet", 16_423_721_717_087_811_551, ChainFamily::Solana),
    ("aptos-mainnet", 4_741_433_654_826_277_614, ChainFamily::Aptos),
    ("aptos-testnet", 743_186_221_051_783_445, ChainFamily::Aptos),
];

/// An EVM log as returned by `eth_getLogs`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvmLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// A Solana program log line, either the full `Program data: <base64>`
/// entry or the bare base64 payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolanaLog {
    pub program_id: Option<ChainAddress>,
    pub data: String,
}

/// An Aptos module event as returned by the node's REST API.
#[derive(Clone, Debug, PartialEq)]
pub struct AptosEvent {
    pub event_type: String,
    pub data: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawEvent {
    Evm(EvmLog),
    Solana(SolanaLog),
    Aptos(AptosEvent),
}

impl RawEvent {
    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Evm(_) => ChainFamily::Evm,
            Self::Solana(_) => ChainFamily::Solana,
            Self::Aptos(_) => ChainFamily::Aptos,
        }
    }
}

/// Everything a codec may consult besides the raw event.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    pub registry: &'a CodecRegistry,
    pub version_hint: Option<ProtocolVersion>,
    /// Required for legacy EVM events, which do not carry a destination selector.
    pub lane: Option<&'a Lane>,
}

impl DecodeContext<'_> {
    /// Codec of the family that will execute a message bound for `dest_chain_selector`.
    pub fn dest_codec(&self, dest_chain_selector: u64) -> Result<&dyn ChainCodec, DecodeError> {
        self.registry.codec_for_selector(dest_chain_selector)
    }

    /// Source-family events that only exist from 1.6 on reject a legacy hint.
    pub(crate) fn require_current(&self, family: ChainFamily) -> Result<(), DecodeError> {
        match self.version_hint.or(self.lane.map(|lane| lane.version)) {
            Some(version) if version.is_legacy() => Err(DecodeError::UnsupportedVersion { version, family }),
            _ => Ok(()),
        }
    }
}

pub trait ChainCodec: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Normalizes raw address bytes as they appear inside a message.
    fn parse_address(&self, bytes: &[u8]) -> Result<ChainAddress, DecodeError>;

    /// Parses the family's native textual address form.
    fn parse_address_str(&self, s: &str) -> Result<ChainAddress, DecodeError>;

    /// Renders an address in the family's native textual form.
    fn format_address(&self, address: &ChainAddress) -> String;

    fn decode_message(&self, event: &RawEvent, ctx: &DecodeContext<'_>) -> Result<CanonicalMessage, DecodeError>;
}

pub struct CodecRegistry {
    codecs: HashMap<ChainFamily, Box<dyn ChainCodec>>,
    chains: HashMap<u64, ChainFamily>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecRegistry {
    /// A registry with no codecs and no chains.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
            chains: HashMap::new(),
        }
    }

    /// All built-in codecs and [`KNOWN_CHAINS`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(EvmCodec));
        registry.register(Box::new(SolanaCodec));
        registry.register(Box::new(AptosCodec));
        for (_, selector, family) in KNOWN_CHAINS {
            registry.register_chain(*selector, *family);
        }
        registry
    }

    pub fn register(&mut self, codec: Box<dyn ChainCodec>) {
        self.codecs.insert(codec.family(), codec);
    }

    pub fn register_chain(&mut self, chain_selector: u64, family: ChainFamily) {
        if let Some(previous) = self.chains.insert(chain_selector, family) {
            if previous != family {
                tracing::warn!(chain_selector, %previous, %family, "chain selector family overridden");
            }
        }
    }

    pub fn codec(&self, family: ChainFamily) -> Result<&dyn ChainCodec, DecodeError> {
        self.codecs
            .get(&family)
            .map(|codec| codec.as_ref())
            .ok_or(DecodeError::UnsupportedFamily(family))
    }

    pub fn family_of(&self, chain_selector: u64) -> Result<ChainFamily, DecodeError> {
        self.chains
            .get(&chain_selector)
            .copied()
            .ok_or(DecodeError::UnknownChainSelector(chain_selector))
    }

    pub fn codec_for_selector(&self, chain_selector: u64) -> Result<&dyn ChainCodec, DecodeError> {
        self.codec(self.family_of(chain_selector)?)
    }

    /// Decodes one on-ramp event into a [`CanonicalMessage`].
    ///
    /// `family` is the source chain's family and must match the event shape.
    /// Either the whole message decodes or a single error is returned.
    pub fn decode(
        &self,
        event: &RawEvent,
        family: ChainFamily,
        version_hint: Option<ProtocolVersion>,
        lane: Option<&Lane>,
    ) -> Result<CanonicalMessage, DecodeError> {
        if event.family() != family {
            return Err(DecodeError::FamilyMismatch {
                expected: family,
                found: event.family(),
            });
        }
        if let Some(lane) = lane {
            if lane.source_family != family {
                return Err(DecodeError::FamilyMismatch {
                    expected: lane.source_family,
                    found: family,
                });
            }
        }

        let ctx = DecodeContext {
            registry: self,
            version_hint,
            lane,
        };
        let message = self.codec(family)?.decode_message(event, &ctx)?;
        tracing::trace!(
            family = %family,
            seq = message.header.sequence_number,
            message_id = %message.header.message_id,
            "decoded message"
        );
        Ok(message)
    }
}

/// Per-transfer destination gas, as `abi.encode(uint32)` from EVM on-ramps
/// or a little-endian `u32` from Borsh/BCS on-ramps.
pub(crate) fn parse_dest_exec_data(bytes: &[u8]) -> Result<u64, DecodeError> {
    match bytes.len() {
        32 => {
            if bytes[..28].iter().any(|b| *b != 0) {
                return Err(DecodeError::malformed("destExecData", "uint32 word has high bits set"));
            }
            Ok(u64::from(u32::from_be_bytes(crate::copy_array::<4>(&bytes[28..]))))
        }
        4 => Ok(u64::from(u32::from_le_bytes(crate::copy_array::<4>(bytes)))),
        n => Err(DecodeError::malformed("destExecData", format!("unexpected length {n}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors_resolve_to_their_family() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.family_of(124_615_329_519_749_607), Ok(ChainFamily::Solana));
        assert_eq!(registry.family_of(5_009_297_550_715_157_269), Ok(ChainFamily::Evm));
        assert_eq!(registry.family_of(42), Err(DecodeError::UnknownChainSelector(42)));
    }

    #[test]
    fn empty_registry_has_no_codecs() {
        let registry = CodecRegistry::empty();
        assert!(matches!(
            registry.codec(ChainFamily::Evm),
            Err(DecodeError::UnsupportedFamily(ChainFamily::Evm))
        ));
    }

    #[test]
    fn rejects_event_of_another_family() {
        let registry = CodecRegistry::with_defaults();
        let event = RawEvent::Solana(SolanaLog {
            program_id: None,
            data: String::new(),
        });
        assert_eq!(
            registry.decode(&event, ChainFamily::Evm, None, None),
            Err(DecodeError::FamilyMismatch {
                expected: ChainFamily::Evm,
                found: ChainFamily::Solana,
            })
        );
    }

    #[test]
    fn dest_exec_data_widths() {
        let mut word = [0u8; 32];
        word[28..].copy_from_slice(&50_000u32.to_be_bytes());
        assert_eq!(parse_dest_exec_data(&word), Ok(50_000));
        assert_eq!(parse_dest_exec_data(&50_000u32.to_le_bytes()), Ok(50_000));
        assert!(parse_dest_exec_data(&[]).is_err());

        word[0] = 1;
        assert!(parse_dest_exec_data(&word).is_err());
    }
}
