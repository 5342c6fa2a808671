//! Network configuration: which chain family each chain selector belongs to.
//!
//! ```json
//! {
//!   "networks": [
//!     { "name": "my-devnet", "chainSelector": "1234", "family": "evm" }
//!   ]
//! }
//! ```
//!
//! Entries are merged over the built-in well-known chains.

use std::{collections::HashSet, fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use ccip_proof_core::{ChainFamily, CodecRegistry, KNOWN_CHAINS};
use serde::{Deserialize, Serialize};

use crate::parse_u64;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworksFile {
    pub networks: Vec<NetworkEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub name: String,
    pub chain_selector: String,
    pub family: String,
}

impl NetworkEntry {
    fn resolve(&self) -> Result<(u64, ChainFamily)> {
        let selector = parse_u64(&self.chain_selector)
            .with_context(|| format!("invalid chainSelector for network {}", self.name))?;
        let family = self
            .family
            .parse::<ChainFamily>()
            .map_err(|e| anyhow!("network {}: {e}", self.name))?;
        Ok((selector, family))
    }
}

/// Load a networks file from disk.
pub fn load_networks(path: &Path) -> Result<NetworksFile> {
    let raw = fs::read(path).with_context(|| format!("failed reading networks {}", path.display()))?;
    let networks: NetworksFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed parsing networks JSON {}", path.display()))?;
    Ok(networks)
}

pub fn validate_networks(networks: &NetworksFile) -> Result<()> {
    let mut names = HashSet::new();
    let mut selectors = HashSet::new();
    for (i, entry) in networks.networks.iter().enumerate() {
        if entry.name.trim().is_empty() {
            bail!("network {} has an empty name", i);
        }
        if !names.insert(entry.name.as_str()) {
            bail!("duplicate network name: {}", entry.name);
        }
        let (selector, _) = entry.resolve()?;
        if !selectors.insert(selector) {
            bail!("duplicate chainSelector {} (network {})", selector, entry.name);
        }
    }
    Ok(())
}

/// The default codec registry with `networks` registered on top.
pub fn build_codec_registry(networks: Option<&NetworksFile>) -> Result<CodecRegistry> {
    let mut registry = CodecRegistry::with_defaults();
    if let Some(networks) = networks {
        validate_networks(networks)?;
        for entry in &networks.networks {
            let (selector, family) = entry.resolve()?;
            registry.register_chain(selector, family);
        }
        tracing::info!(networks = networks.networks.len(), "loaded network configuration");
    }
    Ok(registry)
}

/// Human-readable name of a chain selector, configured entries first.
pub fn chain_name(chain_selector: u64, networks: Option<&NetworksFile>) -> Option<String> {
    let configured = networks.and_then(|networks| {
        networks
            .networks
            .iter()
            .find(|entry| parse_u64(&entry.chain_selector).ok() == Some(chain_selector))
            .map(|entry| entry.name.clone())
    });
    configured.or_else(|| {
        KNOWN_CHAINS
            .iter()
            .find(|(_, selector, _)| *selector == chain_selector)
            .map(|(name, _, _)| name.to_string())
    })
}
