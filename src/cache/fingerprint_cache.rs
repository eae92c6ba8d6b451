//! Fingerprint cache implementation
//!
//! Entries live in a slab of nodes threaded onto an intrusive recency list.
//! The map resolves an address to its node; the list head is the most
//! recently used entry and the tail is the next eviction victim.

use std::collections::HashMap;

use crate::address::PageAddr;
use crate::cache::config::FingerprintCacheConfig;
use crate::cache::stats::FingerprintCacheStats;
use crate::codec::Fingerprint;
use crate::error::Result;
use crate::memory::MemoryResolver;
use crate::prefetch::PrefetchSet;

const NIL: u32 = u32::MAX;

/// A remembered page fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedFingerprint {
    /// Length of the page the fingerprint covers
    pub size: u32,
    /// Last observed fingerprint
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    addr: PageAddr,
    entry: CachedFingerprint,
    prev: u32,
    next: u32,
}

/// Bounded LRU map from page address to its last known fingerprint.
///
/// Persists across epochs. Never holds more than its configured capacity.
#[derive(Debug)]
pub struct FingerprintCache {
    config: FingerprintCacheConfig,
    map: HashMap<PageAddr, u32>,
    nodes: Vec<Node>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    stats: FingerprintCacheStats,
}

impl FingerprintCache {
    /// Create a cache with the given configuration
    pub fn new(config: FingerprintCacheConfig) -> Self {
        Self {
            config,
            map: HashMap::new(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            stats: FingerprintCacheStats::new(),
        }
    }

    /// Create an enabled cache holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(FingerprintCacheConfig::new(capacity))
    }

    /// Get the configuration
    pub fn config(&self) -> &FingerprintCacheConfig {
        &self.config
    }

    /// Get the statistics
    pub fn stats(&self) -> &FingerprintCacheStats {
        &self.stats
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.config.effective_capacity()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Whether `addr` has an entry (recency untouched)
    pub fn contains(&self, addr: PageAddr) -> bool {
        self.map.contains_key(&addr)
    }

    /// Entry for `addr` without touching recency
    pub fn peek(&self, addr: PageAddr) -> Option<CachedFingerprint> {
        self.map.get(&addr).map(|&n| self.nodes[n as usize].entry)
    }

    /// Entry for `addr`, marking it most recently used
    pub fn lookup(&mut self, addr: PageAddr) -> Option<CachedFingerprint> {
        let node = *self.map.get(&addr)?;
        self.touch(node);
        Some(self.nodes[node as usize].entry)
    }

    /// Insert or refresh the fingerprint for `addr`.
    ///
    /// Returns the address evicted to make room, if any.
    pub fn insert(&mut self, addr: PageAddr, size: u32, fingerprint: Fingerprint) -> Option<PageAddr> {
        if self.capacity() == 0 {
            return None;
        }
        let entry = CachedFingerprint { size, fingerprint };

        if let Some(&node) = self.map.get(&addr) {
            self.nodes[node as usize].entry = entry;
            self.touch(node);
            self.stats.record_refresh();
            return None;
        }

        let evicted = if self.map.len() >= self.capacity() {
            self.evict_lru()
        } else {
            None
        };

        let node = self.alloc_node(addr, entry);
        self.push_front(node);
        self.map.insert(addr, node);
        self.stats.record_insert();
        evicted
    }

    /// Drop the entry for `addr`. Returns whether one existed.
    pub fn invalidate(&mut self, addr: PageAddr) -> bool {
        match self.map.remove(&addr) {
            Some(node) => {
                self.unlink(node);
                self.free.push(node);
                true
            }
            None => false,
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Absorb the records of the current prefetch cycle.
    ///
    /// Each record inserts or refreshes its page; least recently used entries
    /// are evicted once the cache is full.
    pub fn update(&mut self, prefetch: &PrefetchSet) {
        for page in prefetch.pages() {
            self.insert(page.addr(), page.size, page.fingerprint);
        }
    }

    /// Decide whether the page at `addr` matches `claimed` without a transfer.
    ///
    /// The current prefetch cycle is consulted first; its recorded fingerprint
    /// was taken from live memory when the speculative content landed. On a
    /// miss the persistent cache is consulted, and a candidate hit is confirmed
    /// by fingerprinting the live bytes. A miss in both returns `false`.
    pub fn check<M: MemoryResolver>(
        &mut self,
        prefetch: &PrefetchSet,
        memory: &M,
        addr: PageAddr,
        size: u32,
        claimed: Fingerprint,
    ) -> Result<bool> {
        self.stats.record_check();

        if let Some(page) = prefetch.index_lookup(addr) {
            let matched = page.size == size && page.fingerprint == claimed;
            if matched {
                self.stats.record_prefetch_hit();
            } else {
                self.stats.record_miss();
            }
            return Ok(matched);
        }

        let cached = match self.lookup(addr) {
            Some(cached) if cached.size == size && cached.fingerprint == claimed => cached,
            _ => {
                self.stats.record_miss();
                return Ok(false);
            }
        };

        let live = memory.fingerprint(addr, size as usize)?;
        if live != cached.fingerprint {
            // Memory moved on since the entry was recorded.
            self.insert(addr, size, live);
        }
        if live == claimed {
            self.stats.record_cache_hit();
            Ok(true)
        } else {
            self.stats.record_miss();
            Ok(false)
        }
    }

    /// Addresses from most to least recently used
    pub fn recency_order(&self) -> Vec<PageAddr> {
        let mut order = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while cursor != NIL {
            let node = &self.nodes[cursor as usize];
            order.push(node.addr);
            cursor = node.next;
        }
        order
    }

    fn alloc_node(&mut self, addr: PageAddr, entry: CachedFingerprint) -> u32 {
        let node = Node {
            addr,
            entry,
            prev: NIL,
            next: NIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    fn evict_lru(&mut self) -> Option<PageAddr> {
        if self.tail == NIL {
            return None;
        }
        let victim = self.tail;
        let addr = self.nodes[victim as usize].addr;
        self.unlink(victim);
        self.map.remove(&addr);
        self.free.push(victim);
        self.stats.record_eviction();
        Some(addr)
    }

    fn touch(&mut self, node: u32) {
        if self.head == node {
            return;
        }
        self.unlink(node);
        self.push_front(node);
    }

    fn push_front(&mut self, node: u32) {
        let old_head = self.head;
        {
            let n = &mut self.nodes[node as usize];
            n.prev = NIL;
            n.next = old_head;
        }
        if old_head != NIL {
            self.nodes[old_head as usize].prev = node;
        }
        self.head = node;
        if self.tail == NIL {
            self.tail = node;
        }
    }

    fn unlink(&mut self, node: u32) {
        let Node { prev, next, .. } = self.nodes[node as usize];
        if prev != NIL {
            self.nodes[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.nodes[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
        let n = &mut self.nodes[node as usize];
        n.prev = NIL;
        n.next = NIL;
    }
}

impl Default for FingerprintCache {
    fn default() -> Self {
        Self::new(FingerprintCacheConfig::default())
    }
}
