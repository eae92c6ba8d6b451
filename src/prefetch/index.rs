//! Address index over the current prefetch cycle.

use std::collections::HashMap;

use crate::address::PageAddr;
use crate::error::{Result, SmcError};

/// Maps a guest page address to the slot of the prefetch record holding it.
///
/// Rebuilt every prefetch cycle. Each address may be indexed at most once per
/// cycle; a second insertion is a contract violation and is never treated as
/// an overwrite.
#[derive(Debug, Default)]
pub struct PrefetchIndex {
    slots: HashMap<PageAddr, u32>,
}

impl PrefetchIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry. Must run once per cycle before repopulating.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Index `addr` at `slot`.
    pub fn insert(&mut self, addr: PageAddr, slot: u32) -> Result<()> {
        match self.slots.entry(addr) {
            std::collections::hash_map::Entry::Occupied(existing) => {
                Err(SmcError::invariant(format!(
                    "prefetch index already holds {addr} at slot {}",
                    existing.get()
                )))
            }
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(())
            }
        }
    }

    /// Slot indexed for `addr` this cycle
    #[inline]
    pub fn lookup(&self, addr: PageAddr) -> Option<u32> {
        self.slots.get(&addr).copied()
    }

    /// Number of indexed addresses
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
