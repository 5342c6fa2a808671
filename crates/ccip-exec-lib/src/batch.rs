//! Batch request loading and validation.
//!
//! Handles the v1 batch file format:
//! ```json
//! {
//!   "version": "v1",
//!   "lane": {
//!     "sourceChainSelector": "5009297550715157269",
//!     "destChainSelector": "124615329519749607",
//!     "onRamp": "0x...",
//!     "version": "1.6.0"
//!   },
//!   "commit": { "merkleRoot": "0x...", "minSeqNr": "10", "maxSeqNr": "14" },
//!   "events": [
//!     { "family": "evm", "address": "0x...", "topics": ["0x..."], "data": "0x..." },
//!     { "family": "solana", "programId": "...", "data": "Program data: ..." },
//!     { "family": "aptos", "type": "0x1::onramp::CCIPMessageSent", "data": { ... } }
//!   ],
//!   "targets": ["0x..."],
//!   "attestations": { "0x<messageId>": ["0x..."] }
//! }
//! ```
//!
//! Lane families may be omitted, in which case they are looked up from the
//! chain selectors. `lane.version` also accepts a `typeAndVersion()` string.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::Path,
};

use alloy_primitives::{Address, Bytes, B256};
use anyhow::{anyhow, bail, Context, Result};
use ccip_proof_core::{
    AptosEvent, ChainFamily, CodecRegistry, CommitReport, EvmLog, Lane, ProtocolVersion, RawEvent, SolanaLog,
};
use serde::{Deserialize, Serialize};

use crate::{parse_b256, parse_hex_bytes, parse_u64};

pub const BATCH_VERSION: &str = "v1";

/// A parsed batch file (v1 schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFile {
    pub version: String,
    pub lane: LaneEntry,
    pub commit: CommitEntry,
    pub events: Vec<EventEntry>,
    #[serde(default)]
    pub targets: Vec<String>,
    /// Per-message attestation overrides, one blob per token transfer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attestations: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneEntry {
    pub source_chain_selector: String,
    pub dest_chain_selector: String,
    pub on_ramp: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_family: Option<String>,
}

/// Commit report for the interval. Source selector and on-ramp default to the lane's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEntry {
    pub merkle_root: String,
    pub min_seq_nr: String,
    pub max_seq_nr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_chain_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_ramp_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum EventEntry {
    Evm(EvmLogEntry),
    Solana(SolanaLogEntry),
    Aptos(AptosEventEntry),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmLogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AptosEventEntry {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
}

/// A batch with every field parsed into core types.
#[derive(Debug, Clone)]
pub struct ResolvedBatch {
    pub lane: Lane,
    pub commit: CommitReport,
    pub events: Vec<RawEvent>,
    pub targets: Vec<B256>,
    pub attestations: HashMap<B256, Vec<Bytes>>,
}

/// Load a batch file from disk.
pub fn load_batch(path: &Path) -> Result<BatchFile> {
    let raw = fs::read(path).with_context(|| format!("failed reading batch {}", path.display()))?;
    let batch: BatchFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed parsing batch JSON {}", path.display()))?;
    Ok(batch)
}

/// Validate a batch file against the v1 schema constraints.
///
/// Address fields are checked later by [`resolve_batch`], since their
/// format depends on the lane's chain families.
pub fn validate_batch(batch: &BatchFile) -> Result<()> {
    if batch.version != BATCH_VERSION {
        bail!(
            "unsupported batch version: {} (expected {BATCH_VERSION})",
            batch.version
        );
    }

    parse_u64(&batch.lane.source_chain_selector).context("invalid lane.sourceChainSelector")?;
    parse_u64(&batch.lane.dest_chain_selector).context("invalid lane.destChainSelector")?;
    parse_protocol_version(&batch.lane.version)?;

    parse_b256(&batch.commit.merkle_root).context("invalid commit.merkleRoot")?;
    let min = parse_u64(&batch.commit.min_seq_nr).context("invalid commit.minSeqNr")?;
    let max = parse_u64(&batch.commit.max_seq_nr).context("invalid commit.maxSeqNr")?;
    if min > max {
        bail!("commit interval is empty: minSeqNr {min} > maxSeqNr {max}");
    }
    if let Some(ref selector) = batch.commit.source_chain_selector {
        parse_u64(selector).context("invalid commit.sourceChainSelector")?;
    }

    if batch.events.is_empty() {
        bail!("batch has no events");
    }

    let mut seen = HashSet::new();
    for (i, target) in batch.targets.iter().enumerate() {
        let id = parse_b256(target).with_context(|| format!("invalid target {i}"))?;
        if !seen.insert(id) {
            bail!("duplicate target {target}");
        }
    }

    for (id, blobs) in &batch.attestations {
        parse_b256(id).with_context(|| format!("invalid attestation key {id}"))?;
        for (i, blob) in blobs.iter().enumerate() {
            parse_hex_bytes(blob).with_context(|| format!("invalid attestation {i} for {id}"))?;
        }
    }

    Ok(())
}

/// Validate `batch` and parse it into core types.
///
/// Families left out of the lane entry are looked up in `codecs`, and
/// addresses are parsed by the family's codec.
pub fn resolve_batch(batch: &BatchFile, codecs: &CodecRegistry) -> Result<ResolvedBatch> {
    validate_batch(batch)?;

    let lane = resolve_lane(&batch.lane, codecs)?;
    let source = codecs.codec(lane.source_family)?;

    let commit = CommitReport {
        merkle_root: parse_b256(&batch.commit.merkle_root)?,
        min_seq_nr: parse_u64(&batch.commit.min_seq_nr)?,
        max_seq_nr: parse_u64(&batch.commit.max_seq_nr)?,
        source_chain_selector: match batch.commit.source_chain_selector {
            Some(ref selector) => parse_u64(selector)?,
            None => lane.source_chain_selector,
        },
        on_ramp_address: match batch.commit.on_ramp_address {
            Some(ref address) => source
                .parse_address_str(address)
                .context("invalid commit.onRampAddress")?,
            None => lane.on_ramp,
        },
    };

    let events = batch
        .events
        .iter()
        .enumerate()
        .map(|(i, event)| resolve_event(event, codecs).with_context(|| format!("invalid event {i}")))
        .collect::<Result<Vec<_>>>()?;

    let targets = batch
        .targets
        .iter()
        .map(|target| parse_b256(target))
        .collect::<Result<Vec<_>>>()?;

    let attestations = batch
        .attestations
        .iter()
        .map(|(id, blobs)| {
            let blobs = blobs
                .iter()
                .map(|blob| parse_hex_bytes(blob))
                .collect::<Result<Vec<_>>>()?;
            Ok((parse_b256(id)?, blobs))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    Ok(ResolvedBatch {
        lane,
        commit,
        events,
        targets,
        attestations,
    })
}

fn resolve_lane(entry: &LaneEntry, codecs: &CodecRegistry) -> Result<Lane> {
    let source_chain_selector = parse_u64(&entry.source_chain_selector)?;
    let dest_chain_selector = parse_u64(&entry.dest_chain_selector)?;

    let family = |explicit: &Option<String>, selector: u64, field: &str| -> Result<ChainFamily> {
        match explicit {
            Some(family) => family
                .parse::<ChainFamily>()
                .map_err(|e| anyhow!("invalid lane.{field}: {e}")),
            None => codecs
                .family_of(selector)
                .with_context(|| format!("lane.{field} not given and chain selector is not configured")),
        }
    };
    let source_family = family(&entry.source_family, source_chain_selector, "sourceFamily")?;
    let dest_family = family(&entry.dest_family, dest_chain_selector, "destFamily")?;

    let on_ramp = codecs
        .codec(source_family)?
        .parse_address_str(&entry.on_ramp)
        .context("invalid lane.onRamp")?;

    Ok(Lane {
        source_chain_selector,
        dest_chain_selector,
        on_ramp,
        version: parse_protocol_version(&entry.version)?,
        source_family,
        dest_family,
    })
}

fn resolve_event(entry: &EventEntry, codecs: &CodecRegistry) -> Result<RawEvent> {
    let event = match entry {
        EventEntry::Evm(log) => RawEvent::Evm(EvmLog {
            address: log
                .address
                .parse::<Address>()
                .with_context(|| format!("invalid log address {}", log.address))?,
            topics: log
                .topics
                .iter()
                .map(|topic| parse_b256(topic))
                .collect::<Result<Vec<_>>>()
                .context("invalid log topic")?,
            data: parse_hex_bytes(&log.data).context("invalid log data")?,
        }),
        EventEntry::Solana(log) => RawEvent::Solana(SolanaLog {
            program_id: log
                .program_id
                .as_deref()
                .map(|id| codecs.codec(ChainFamily::Solana)?.parse_address_str(id))
                .transpose()
                .context("invalid programId")?,
            data: log.data.clone(),
        }),
        EventEntry::Aptos(event) => RawEvent::Aptos(AptosEvent {
            event_type: event.event_type.clone(),
            data: event.data.clone(),
        }),
    };
    Ok(event)
}

/// Accepts `"1.5.0"` as well as `"EVM2EVMOnRamp 1.5.0"`.
fn parse_protocol_version(value: &str) -> Result<ProtocolVersion> {
    value
        .parse::<ProtocolVersion>()
        .ok()
        .or_else(|| ProtocolVersion::from_type_and_version(value))
        .ok_or_else(|| anyhow!("unsupported lane.version: {value}"))
}
