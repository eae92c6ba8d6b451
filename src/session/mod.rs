//! Checkpoint session
//!
//! One `CheckpointSession` exists per replicated VM. It owns the three page
//! record sets (dirty, prefetch, backup), the prefetch index, the persistent
//! fingerprint cache and the epoch state machine.
//!
//! ## Lifecycle
//!
//! `new` -> `init` -> (epoch loop) -> `teardown`. Touching any record set
//! before `init` is a contract violation. So is any call after a contract
//! violation has poisoned the session.
//!
//! The session is driven by a single task; nothing here is synchronised.

mod backup;
mod state;

pub use backup::BackupSet;
pub use state::SmcState;

use std::collections::HashMap;

use uuid::Uuid;

use crate::address::PageAddr;
use crate::cache::{FingerprintCache, FingerprintCacheConfig};
use crate::codec::{decode_descriptors, Fingerprint, PageEntry};
use crate::error::{Result, SmcError};
use crate::memory::MemoryResolver;
use crate::prefetch::PrefetchSet;
use crate::record::{BackupPage, DirtyPage, FetchPage, DIRTY_FLAG_IN_CHECKPOINT};
use crate::record_set::RecordSet;

/// Per-VM replication bookkeeping.
#[derive(Debug)]
pub struct CheckpointSession {
    id: Uuid,
    init: bool,
    poisoned: bool,
    dirty_pages: RecordSet<DirtyPage>,
    prefetch: PrefetchSet,
    backups: BackupSet,
    cache: FingerprintCache,
    state: SmcState,
    need_rollback: bool,
    epoch_counter: u64,
}

impl CheckpointSession {
    /// Create an uninitialised session
    pub fn new(cache_config: FingerprintCacheConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            init: false,
            poisoned: false,
            dirty_pages: RecordSet::new(),
            prefetch: PrefetchSet::new(),
            backups: BackupSet::new(),
            cache: FingerprintCache::new(cache_config),
            state: SmcState::RecvCheckpoint,
            need_rollback: false,
            epoch_counter: 0,
        }
    }

    /// Prepare the session for its first epoch.
    pub fn init(&mut self) {
        self.dirty_pages = RecordSet::with_capacity(256);
        self.prefetch = PrefetchSet::new();
        self.backups = BackupSet::new();
        self.cache.clear();
        self.state = SmcState::RecvCheckpoint;
        self.need_rollback = false;
        self.poisoned = false;
        self.epoch_counter = 0;
        self.init = true;
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(session = %self.id, "checkpoint session initialised");
        }
    }

    /// Release every record and return to the uninitialised state.
    pub fn teardown(&mut self) {
        self.dirty_pages = RecordSet::new();
        self.prefetch = PrefetchSet::new();
        self.backups = BackupSet::new();
        self.cache.clear();
        self.init = false;
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(session = %self.id, epochs = self.epoch_counter, "checkpoint session torn down");
        }
    }

    /// Session identifier used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether `init` has run (and `teardown` has not)
    pub fn is_init(&self) -> bool {
        self.init
    }

    /// Whether a contract violation aborted the session
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Fail unless the session is initialised and healthy.
    pub fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(SmcError::SessionPoisoned);
        }
        if !self.init {
            return Err(SmcError::invariant("checkpoint session used before init"));
        }
        Ok(())
    }

    /// Mark the session unusable after a contract violation.
    pub fn poison(&mut self, reason: &SmcError) {
        if !self.poisoned && tracing::enabled!(tracing::Level::WARN) {
            tracing::warn!(session = %self.id, epoch = self.epoch_counter, error = %reason, "checkpoint session aborted");
        }
        self.poisoned = true;
    }

    /// Pass `result` through, poisoning the session on a fatal error.
    pub fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                self.poison(err);
            }
        }
        result
    }

    // === State ===

    /// Current state
    pub fn state(&self) -> SmcState {
        self.state
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn set_state(&mut self, next: SmcState) -> Result<()> {
        self.ensure_usable()?;
        if !self.state.can_transition_to(next) {
            let err = SmcError::invariant(format!(
                "illegal state transition {} -> {}",
                self.state, next
            ));
            self.poison(&err);
            return Err(err);
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(session = %self.id, epoch = self.epoch_counter, from = %self.state, to = %next, "state transition");
        }
        self.state = next;
        Ok(())
    }

    /// Whether a failed validation demands a rollback
    pub fn need_rollback(&self) -> bool {
        self.need_rollback
    }

    /// Number of committed epochs
    pub fn epoch(&self) -> u64 {
        self.epoch_counter
    }

    /// Count a committed epoch.
    pub fn advance_epoch(&mut self) -> u64 {
        self.epoch_counter += 1;
        self.epoch_counter
    }

    // === Dirty pages ===

    /// Append a dirty page descriptor.
    pub fn insert_dirty(&mut self, region_id: u64, region_offset: u64, size: u32, flags: u32) -> Result<usize> {
        self.ensure_usable()?;
        Ok(self
            .dirty_pages
            .append(DirtyPage::new(region_id, region_offset, size, flags)))
    }

    /// Append every descriptor in a wire buffer, all or nothing.
    pub fn insert_dirty_from_buf(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_usable()?;
        let pages = decode_descriptors(buf)?;
        let added = pages.len();
        self.dirty_pages.extend_from_vec(pages);
        Ok(added)
    }

    /// Clear dirty pages for the next epoch.
    pub fn reset_dirty(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.dirty_pages.reset();
        Ok(())
    }

    /// Drop the committed checkpoint's descriptors and promote the rest.
    ///
    /// Descriptors recorded without `IN_CHECKPOINT` accumulated while the
    /// checkpoint was in flight; they become the next checkpoint. Returns the
    /// number carried over.
    pub fn carry_over_dirty(&mut self) -> usize {
        let carried: Vec<DirtyPage> = self
            .dirty_pages
            .iter()
            .filter(|page| !page.in_checkpoint())
            .map(|page| DirtyPage {
                flags: page.flags | DIRTY_FLAG_IN_CHECKPOINT,
                ..*page
            })
            .collect();
        let count = carried.len();
        self.dirty_pages.reset();
        self.dirty_pages.extend_from_vec(carried);
        count
    }

    /// Distinct `IN_CHECKPOINT` pages in first-seen order.
    ///
    /// Re-dirtied pages appear once, with the size of their latest descriptor.
    pub fn checkpoint_pages(&self) -> Vec<DirtyPage> {
        let mut positions: HashMap<PageAddr, usize> = HashMap::new();
        let mut pages: Vec<DirtyPage> = Vec::new();
        for page in self.dirty_pages.iter().filter(|p| p.in_checkpoint()) {
            match positions.get(&page.addr()) {
                Some(&at) => pages[at] = *page,
                None => {
                    positions.insert(page.addr(), pages.len());
                    pages.push(*page);
                }
            }
        }
        pages
    }

    /// Number of dirty pages this epoch
    pub fn dirty_count(&self) -> usize {
        self.dirty_pages.len()
    }

    /// Dirty pages in insertion order
    pub fn dirty_pages(&self) -> &[DirtyPage] {
        self.dirty_pages.as_slice()
    }

    // === Prefetch ===

    /// Append a prefetch record.
    pub fn insert_prefetch(
        &mut self,
        region_id: u64,
        region_offset: u64,
        size: u32,
        fingerprint: Fingerprint,
    ) -> Result<&mut FetchPage> {
        self.ensure_usable()?;
        Ok(self
            .prefetch
            .insert(region_id, region_offset, size, fingerprint))
    }

    /// Append every fingerprinted entry in a wire buffer, all or nothing.
    pub fn insert_prefetch_from_buf(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_usable()?;
        self.prefetch.insert_from_buf(buf)
    }

    /// Clear prefetch records for a new cycle.
    pub fn reset_prefetch(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.prefetch.reset();
        Ok(())
    }

    /// Refresh the fingerprint of prefetch record `slot` from live memory.
    pub fn compute_prefetch_fingerprint<M: MemoryResolver>(
        &mut self,
        slot: usize,
        memory: &M,
    ) -> Result<Fingerprint> {
        self.ensure_usable()?;
        let result = self.prefetch.compute_fingerprint(slot, memory);
        self.guard(result)
    }

    /// Clear the prefetch index.
    pub fn index_reset(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.prefetch.index_reset();
        Ok(())
    }

    /// Index `addr` at prefetch record `slot`. A duplicate aborts the session.
    pub fn index_insert(&mut self, addr: PageAddr, slot: u32) -> Result<()> {
        self.ensure_usable()?;
        let result = self.prefetch.index_insert(addr, slot);
        self.guard(result)
    }

    /// Prefetch record holding `addr` this cycle.
    ///
    /// A pure query: it does not check the lifecycle. Before `init` the index
    /// is empty and every lookup misses; the mutating calls that populate the
    /// index are the ones that reject an unusable session.
    pub fn index_lookup(&self, addr: PageAddr) -> Option<&FetchPage> {
        self.prefetch.index_lookup(addr)
    }

    /// Rebuild the index from all prefetch records.
    pub fn rebuild_prefetch_index(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let result = self.prefetch.map_gen_from_pages();
        self.guard(result)
    }

    /// Prefetch records and index
    pub fn prefetch(&self) -> &PrefetchSet {
        &self.prefetch
    }

    /// Apply speculative content for one page.
    ///
    /// Captures a backup of the live range, writes `content` over it,
    /// fingerprints the result from live memory and indexes the record.
    pub fn stage_prefetched_page<M: MemoryResolver>(
        &mut self,
        memory: &M,
        entry: &PageEntry,
        content: &[u8],
    ) -> Result<&FetchPage> {
        self.ensure_usable()?;
        let addr = PageAddr::new(entry.region_id, entry.region_offset);
        if content.len() != entry.size as usize {
            return Err(SmcError::Malformed {
                what: "prefetch content",
                detail: format!("{addr}: {} bytes for a {} byte page", content.len(), entry.size),
            });
        }
        if self.prefetch.index_lookup(addr).is_some() {
            let err = SmcError::invariant(format!("{addr} prefetched twice in one cycle"));
            self.poison(&err);
            return Err(err);
        }

        self.backups
            .capture(memory, entry.region_id, entry.region_offset, entry.size as u64)?;
        memory.write_from(addr, content)?;

        let slot = self
            .prefetch
            .insert(entry.region_id, entry.region_offset, entry.size, 0)
            .slot_index;
        let result = self
            .prefetch
            .compute_fingerprint(slot as usize, memory)
            .and_then(|_| self.prefetch.index_insert(addr, slot));
        self.guard(result)?;

        Ok(&self.prefetch.pages()[slot as usize])
    }

    // === Backups ===

    /// Snapshot a live range before a speculative write.
    pub fn capture_backup<M: MemoryResolver>(
        &mut self,
        memory: &M,
        region_id: u64,
        region_offset: u64,
        size: u64,
    ) -> Result<&BackupPage> {
        self.ensure_usable()?;
        self.backups.capture(memory, region_id, region_offset, size)
    }

    /// Record a caller-supplied preimage.
    pub fn insert_backup_with_data(&mut self, region_id: u64, region_offset: u64, data: &[u8]) -> Result<&BackupPage> {
        self.ensure_usable()?;
        Ok(self.backups.insert_with_data(region_id, region_offset, data))
    }

    /// Record a zeroed preimage for the caller to fill.
    pub fn insert_backup_empty(&mut self, region_id: u64, region_offset: u64, size: u64) -> Result<&mut [u8]> {
        self.ensure_usable()?;
        Ok(self.backups.insert_empty(region_id, region_offset, size))
    }

    /// Discard every backup once the epoch is known good.
    pub fn reset_backups(&mut self) -> Result<()> {
        self.ensure_usable()?;
        self.backups.reset();
        Ok(())
    }

    /// Restore every backup newest first, then discard them.
    pub fn restore_backups<M: MemoryResolver>(&mut self, memory: &M) -> Result<usize> {
        self.ensure_usable()?;
        self.backups.restore_all(memory)
    }

    /// Captured backups
    pub fn backups(&self) -> &BackupSet {
        &self.backups
    }

    // === Validation ===

    /// Persistent fingerprint cache
    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    /// Mutable persistent fingerprint cache
    pub fn cache_mut(&mut self) -> &mut FingerprintCache {
        &mut self.cache
    }

    /// Absorb this cycle's prefetch records into the persistent cache.
    pub fn update_prefetch_cache(&mut self) {
        self.cache.update(&self.prefetch);
    }

    /// Validation gate for one page of the authoritative checkpoint.
    ///
    /// A `false` result flags the session for rollback.
    pub fn check_dirty_page<M: MemoryResolver>(
        &mut self,
        memory: &M,
        region_id: u64,
        region_offset: u64,
        size: u32,
        claimed: Fingerprint,
    ) -> Result<bool> {
        self.ensure_usable()?;
        let addr = PageAddr::new(region_id, region_offset);
        let matched = self
            .cache
            .check(&self.prefetch, memory, addr, size, claimed)?;
        if !matched {
            self.need_rollback = true;
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(session = %self.id, epoch = self.epoch_counter, page = %addr, claimed, "fingerprint mismatch");
            }
        }
        Ok(matched)
    }

    /// Whether the load path must consult prefetch validation this epoch.
    pub fn need_check_prefetch(&self) -> bool {
        self.init && !self.prefetch.is_empty()
    }

    /// Undo all speculation of the current epoch.
    ///
    /// Restores backups newest first, clears prefetch records and index, and
    /// leaves the session in PREFETCH_ABANDON. Returns the ranges restored.
    pub fn rollback_with_prefetch<M: MemoryResolver>(&mut self, memory: &M) -> Result<usize> {
        self.ensure_usable()?;
        if self.state != SmcState::PrefetchAbandon {
            self.set_state(SmcState::PrefetchAbandon)?;
        }
        let restored = self.backups.restore_all(memory)?;
        self.prefetch.reset();
        self.prefetch.index_reset();
        self.need_rollback = false;
        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(session = %self.id, epoch = self.epoch_counter, restored, "speculation rolled back");
        }
        Ok(restored)
    }
}

impl Default for CheckpointSession {
    fn default() -> Self {
        Self::new(FingerprintCacheConfig::default())
    }
}
