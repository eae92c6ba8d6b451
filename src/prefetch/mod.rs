//! Speculative prefetch bookkeeping
//!
//! A prefetch cycle collects the pages the standby fetched ahead of the
//! authoritative checkpoint stream. The records live in a `RecordSet`; the
//! `PrefetchIndex` resolves an address to its record in O(1) during
//! validation.

mod config;
mod index;
mod policy;

pub use config::{PolicyKind, PrefetchConfig};
pub use index::PrefetchIndex;
pub use policy::{
    policy_from_config, BudgetPolicy, PrefetchAll, PrefetchNone, PrefetchPolicy, SampledPolicy,
};

use crate::address::PageAddr;
use crate::codec::{decode_entries, Fingerprint};
use crate::error::{Result, SmcError};
use crate::memory::MemoryResolver;
use crate::record::FetchPage;
use crate::record_set::RecordSet;

/// Prefetch records of the current cycle plus their address index.
#[derive(Debug, Default)]
pub struct PrefetchSet {
    pages: RecordSet<FetchPage>,
    index: PrefetchIndex,
}

impl PrefetchSet {
    /// Create an empty prefetch set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return it so the caller can index it.
    pub fn insert(
        &mut self,
        region_id: u64,
        region_offset: u64,
        size: u32,
        fingerprint: Fingerprint,
    ) -> &mut FetchPage {
        let slot = self.pages.len();
        let slot_index = u32::try_from(slot).unwrap_or(u32::MAX);
        self.pages.append(FetchPage {
            region_id,
            region_offset,
            size,
            slot_index,
            fingerprint,
        });
        self.pages.at_mut(slot)
    }

    /// Append every fingerprinted entry in `buf`, all or nothing.
    ///
    /// Returns the number of records added.
    pub fn insert_from_buf(&mut self, buf: &[u8]) -> Result<usize> {
        let entries = decode_entries(buf)?;
        let base = self.pages.len();
        let records: Vec<FetchPage> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| FetchPage {
                region_id: e.region_id,
                region_offset: e.region_offset,
                size: e.size,
                slot_index: u32::try_from(base + i).unwrap_or(u32::MAX),
                fingerprint: e.fingerprint,
            })
            .collect();
        let added = records.len();
        self.pages.extend_from_vec(records);
        Ok(added)
    }

    /// Clear records for a new cycle. The index is reset separately.
    pub fn reset(&mut self) {
        self.pages.reset();
    }

    /// Recompute the fingerprint of the record at `slot` from live memory.
    pub fn compute_fingerprint<M: MemoryResolver>(
        &mut self,
        slot: usize,
        memory: &M,
    ) -> Result<Fingerprint> {
        let page = self.pages.get_mut(slot).ok_or_else(|| {
            SmcError::invariant(format!("prefetch slot {slot} out of range"))
        })?;
        let fp = memory.fingerprint(page.addr(), page.size as usize)?;
        page.fingerprint = fp;
        Ok(fp)
    }

    /// Clear the address index. Must run once per cycle before repopulating.
    pub fn index_reset(&mut self) {
        self.index.reset();
    }

    /// Index `addr` at the record in `slot`.
    pub fn index_insert(&mut self, addr: PageAddr, slot: u32) -> Result<()> {
        if (slot as usize) >= self.pages.len() {
            return Err(SmcError::invariant(format!(
                "indexing {addr} at slot {slot} beyond {} records",
                self.pages.len()
            )));
        }
        self.index.insert(addr, slot)
    }

    /// Record holding `addr` this cycle.
    ///
    /// A stale entry whose slot no longer holds `addr` is reported as a miss.
    pub fn index_lookup(&self, addr: PageAddr) -> Option<&FetchPage> {
        let slot = self.index.lookup(addr)?;
        self.pages
            .get(slot as usize)
            .filter(|page| page.addr() == addr)
    }

    /// Rebuild the index from every record currently in the set.
    pub fn map_gen_from_pages(&mut self) -> Result<()> {
        self.index.reset();
        for page in self.pages.iter() {
            self.index.insert(page.addr(), page.slot_index)?;
        }
        Ok(())
    }

    /// Number of records this cycle
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether nothing was prefetched this cycle
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Records in fetch order
    pub fn pages(&self) -> &[FetchPage] {
        self.pages.as_slice()
    }

    /// Address index
    pub fn index(&self) -> &PrefetchIndex {
        &self.index
    }
}
