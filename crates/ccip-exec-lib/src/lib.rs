//! CCIP manual-execution library: batch loading, decoding, proving and verifying.
//!
//! This crate drives `ccip-proof-core` from JSON files so the same pipeline
//! can be shared between the CLI binary and tests.

pub mod batch;
pub mod network;
pub mod output;

use std::{fs, path::Path};

use alloy_primitives::{Bytes, B256, U256};
use anyhow::{anyhow, bail, Context, Result};
use ccip_proof_core::{
    build_execution_report, committed_tree, verify_multi_proof, BatchLeaf, CanonicalMessage, CodecRegistry, Lane,
    LaneRegistry, LeafHasher,
};

pub use batch::{load_batch, resolve_batch, validate_batch, BatchFile, ResolvedBatch};
pub use network::{build_codec_registry, chain_name, load_networks, validate_networks, NetworksFile};
pub use output::{ExecutionOutput, HashOutput, LeafView, MessageView};

/// Version tag written into every output file.
pub const OUTPUT_VERSION: &str = "v1";

/// Decodes, hashes and proves batches against one codec registry.
///
/// Lanes are cached across batches. A batch that describes an already seen
/// on-ramp differently is rejected, since lane configuration never changes.
pub struct ManualExec {
    codecs: CodecRegistry,
    lanes: LaneRegistry,
}

impl ManualExec {
    pub fn new(codecs: CodecRegistry) -> Self {
        Self {
            codecs,
            lanes: LaneRegistry::new(),
        }
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Decode every event of the batch, ascending by sequence number.
    pub fn decode(&mut self, batch: &ResolvedBatch) -> Result<Vec<CanonicalMessage>> {
        let lane = self.lane(batch)?;

        let mut messages = Vec::with_capacity(batch.events.len());
        for (i, event) in batch.events.iter().enumerate() {
            let message = self
                .codecs
                .decode(event, lane.source_family, None, Some(&lane))
                .with_context(|| format!("failed decoding event {i}"))?;
            if message.header.source_chain_selector != lane.source_chain_selector
                || message.header.dest_chain_selector != lane.dest_chain_selector
            {
                bail!(
                    "event {i} belongs to lane {} -> {}, batch lane is {} -> {}",
                    message.header.source_chain_selector,
                    message.header.dest_chain_selector,
                    lane.source_chain_selector,
                    lane.dest_chain_selector
                );
            }
            messages.push(message);
        }
        messages.sort_by_key(|message| message.header.sequence_number);

        tracing::info!(
            source = lane.source_chain_selector,
            dest = lane.dest_chain_selector,
            version = %lane.version,
            messages = messages.len(),
            "decoded batch"
        );
        Ok(messages)
    }

    /// Decoded messages in their native address forms, with their leaves.
    pub fn inspect(&mut self, batch: &ResolvedBatch) -> Result<Vec<MessageView>> {
        let lane = self.lane(batch)?;
        let messages = self.decode(batch)?;
        let hasher = LeafHasher::for_lane(&lane)?;

        let source = self.codecs.codec(lane.source_family)?;
        let dest = self.codecs.codec(lane.dest_family)?;
        messages
            .iter()
            .map(|message| {
                let leaf = hasher.hash(message)?;
                Ok(MessageView::new(message, leaf, source, dest))
            })
            .collect::<Result<Vec<_>>>()
    }

    /// Leaves of the whole batch and the root they produce.
    ///
    /// Fails with [`ProofError::IncompleteBatch`] unless the messages cover
    /// the commit interval exactly, and with [`ProofError::RootMismatch`]
    /// unless they hash to the committed root.
    ///
    /// [`ProofError::IncompleteBatch`]: ccip_proof_core::ProofError::IncompleteBatch
    /// [`ProofError::RootMismatch`]: ccip_proof_core::ProofError::RootMismatch
    pub fn hash(&mut self, batch: &ResolvedBatch) -> Result<HashOutput> {
        let lane = self.lane(batch)?;
        let messages = self.decode(batch)?;
        let hasher = LeafHasher::for_lane(&lane)?;

        let leaves = messages
            .iter()
            .map(|message| {
                Ok(BatchLeaf {
                    sequence_number: message.header.sequence_number,
                    message_id: message.header.message_id,
                    leaf: hasher.hash(message)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let root = committed_tree(&leaves, &batch.commit)
            .context("batch does not match its commit report")?
            .root();

        tracing::info!(root = %root, leaves = leaves.len(), "batch matches its commit report");

        Ok(HashOutput {
            source_chain_selector: lane.source_chain_selector.to_string(),
            metadata_hash: hex0x(hasher.metadata_hash()),
            merkle_root: hex0x(root),
            leaves: messages
                .iter()
                .zip(&leaves)
                .map(|(message, leaf)| LeafView::new(message, leaf.leaf))
                .collect(),
        })
    }

    /// Build, self-check and encode the execution report for the batch targets.
    pub fn prove(&mut self, batch: &ResolvedBatch) -> Result<ExecutionOutput> {
        let lane = self.lane(batch)?;
        let messages = self.decode(batch)?;

        for message_id in batch.attestations.keys() {
            if !batch.targets.contains(message_id) {
                tracing::warn!(message_id = %message_id, "attestation given for a message that is not executed");
            }
        }

        let report = build_execution_report(&messages, &lane, &batch.commit, &batch.targets, &batch.attestations)
            .context("failed building execution report")?;
        let encoded = report.encode().context("failed encoding execution report")?;

        let hasher = LeafHasher::for_lane(&lane)?;
        let leaves = report
            .messages
            .iter()
            .map(|message| Ok(LeafView::new(message, hasher.hash(message)?)))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            root = %report.merkle_root,
            messages = report.messages.len(),
            proofs = report.proofs.len(),
            encoded_len = encoded.len(),
            "execution report ready"
        );

        Ok(ExecutionOutput {
            version: OUTPUT_VERSION.to_string(),
            source_chain_selector: lane.source_chain_selector.to_string(),
            dest_chain_selector: lane.dest_chain_selector.to_string(),
            protocol_version: lane.version.to_string(),
            dest_family: lane.dest_family.to_string(),
            merkle_root: hex0x(report.merkle_root),
            messages: leaves,
            proofs: report.proofs.iter().map(hex0x).collect(),
            proof_flag_bits: hex0x(report.proof_flag_bits.to_be_bytes::<32>()),
            encoded_report: hex0x(&encoded),
        })
    }

    fn lane(&mut self, batch: &ResolvedBatch) -> Result<Lane> {
        let wanted = batch.lane;
        let cached = *self
            .lanes
            .get_or_insert_with(wanted.source_family, wanted.on_ramp, || Ok::<_, anyhow::Error>(wanted))?;
        if cached != wanted {
            bail!(
                "lane for on-ramp {} conflicts with an earlier batch",
                self.codecs.codec(wanted.source_family)?.format_address(&wanted.on_ramp)
            );
        }
        Ok(cached)
    }
}

/// Replay the proof in a written output against its own merkle root.
pub fn verify_output(output: &ExecutionOutput) -> Result<B256> {
    if output.version != OUTPUT_VERSION {
        bail!("unsupported output version: {} (expected {OUTPUT_VERSION})", output.version);
    }

    let leaves = output
        .messages
        .iter()
        .map(|message| parse_b256(&message.leaf).with_context(|| format!("invalid leaf for {}", message.message_id)))
        .collect::<Result<Vec<_>>>()?;
    let proofs = output
        .proofs
        .iter()
        .map(|proof| parse_b256(proof))
        .collect::<Result<Vec<_>>>()
        .context("invalid proof entry")?;
    let flags = parse_u256(&output.proof_flag_bits).context("invalid proofFlagBits")?;
    let expected = parse_b256(&output.merkle_root).context("invalid merkleRoot")?;

    let root = verify_multi_proof(&leaves, &proofs, flags).context("proof does not replay")?;
    if root != expected {
        bail!("proof resolves to {}, output commits to {}", hex0x(root), hex0x(expected));
    }
    Ok(root)
}

/// Load an execution output previously written by [`write_json`].
pub fn load_output(path: &Path) -> Result<ExecutionOutput> {
    let raw = fs::read(path).with_context(|| format!("failed reading output {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed parsing output JSON {}", path.display()))
}

/// Write a value as pretty-printed JSON to a file.
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let encoded = serde_json::to_vec_pretty(value).context("failed encoding json")?;
    fs::write(path, encoded).with_context(|| format!("failed writing json {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed creating parent dir {}", parent.display()))?;
    Ok(())
}

/// `0x`-prefixed lowercase hex.
pub fn hex0x(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ---------------------------------------------------------------------------
// String parsing helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_u64(value: &str) -> Result<u64> {
    if let Some(hex_str) = value.strip_prefix("0x") {
        u64::from_str_radix(hex_str, 16).with_context(|| format!("invalid u64 hex: {value}"))
    } else {
        value
            .parse::<u64>()
            .with_context(|| format!("invalid u64 value: {value}"))
    }
}

pub(crate) fn parse_u256(value: &str) -> Result<U256> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex_str) => U256::from_str_radix(hex_str, 16),
        None => U256::from_str_radix(value, 10),
    };
    parsed.map_err(|e| anyhow!("invalid u256 value {value}: {e}"))
}

pub(crate) fn parse_b256(value: &str) -> Result<B256> {
    let bytes = parse_hex_bytes(value)?;
    if bytes.len() != 32 {
        bail!("expected 32 bytes (64 hex chars), got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

pub(crate) fn parse_hex_bytes(value: &str) -> Result<Bytes> {
    let stripped = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .with_context(|| format!("hex value must start with 0x: {value}"))?;
    let bytes = hex::decode(stripped).with_context(|| format!("invalid hex: {value}"))?;
    Ok(bytes.into())
}
