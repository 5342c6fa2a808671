use std::collections::HashMap;

use crate::types::{ChainAddress, ChainFamily, ProtocolVersion};

/// Immutable on-ramp configuration: which chains it connects and which
/// hashing rules its messages follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lane {
    pub source_chain_selector: u64,
    pub dest_chain_selector: u64,
    pub on_ramp: ChainAddress,
    pub version: ProtocolVersion,
    pub source_family: ChainFamily,
    pub dest_family: ChainFamily,
}

impl Lane {
    pub fn is_legacy(&self) -> bool {
        self.version.is_legacy()
    }
}

/// Lanes keyed by `(source family, on-ramp address)`.
///
/// Lane configuration never changes on-chain, so an entry is resolved once
/// and reused for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct LaneRegistry {
    lanes: HashMap<(ChainFamily, ChainAddress), Lane>,
}

impl LaneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn get(&self, family: ChainFamily, on_ramp: &ChainAddress) -> Option<&Lane> {
        self.lanes.get(&(family, *on_ramp))
    }

    /// Inserts `lane`, returning the previous entry for the same on-ramp.
    pub fn insert(&mut self, lane: Lane) -> Option<Lane> {
        self.lanes.insert((lane.source_family, lane.on_ramp), lane)
    }

    /// Returns the cached lane, resolving and caching it on first use.
    pub fn get_or_insert_with<E>(
        &mut self,
        family: ChainFamily,
        on_ramp: ChainAddress,
        resolve: impl FnOnce() -> Result<Lane, E>,
    ) -> Result<&Lane, E> {
        use std::collections::hash_map::Entry;

        match self.lanes.entry((family, on_ramp)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let lane = resolve()?;
                tracing::debug!(
                    family = %family,
                    source = lane.source_chain_selector,
                    dest = lane.dest_chain_selector,
                    version = %lane.version,
                    "cached lane"
                );
                Ok(entry.insert(lane))
            }
        }
    }
}
