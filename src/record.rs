//! Page records tracked by a checkpoint session.
//!
//! Three kinds of record exist, one per `RecordSet` in the session:
//! - `DirtyPage`: a byte range that changed since the last committed epoch
//! - `FetchPage`: a speculatively prefetched page and its content fingerprint
//! - `BackupPage`: the pre-speculation bytes of a page, used for rollback

use crate::address::PageAddr;
use crate::codec::Fingerprint;

/// Dirty page flag: the descriptor belongs to the checkpoint being committed
/// rather than to the epoch accumulating behind it.
pub const DIRTY_FLAG_IN_CHECKPOINT: u32 = 0x1;

/// Entry flag: the page content follows the entry table in the frame.
pub const ENTRY_FLAG_HAS_CONTENT: u32 = 0x2;

/// A changed byte range inside a memory region.
///
/// Duplicate (region, offset) pairs within one epoch are legal and mean the
/// page was dirtied more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyPage {
    /// Region that contains the page
    pub region_id: u64,
    /// Offset of the page inside the region
    pub region_offset: u64,
    /// Length in bytes
    pub size: u32,
    /// `DIRTY_FLAG_*` bits
    pub flags: u32,
}

impl DirtyPage {
    /// Create a dirty page descriptor
    pub const fn new(region_id: u64, region_offset: u64, size: u32, flags: u32) -> Self {
        Self {
            region_id,
            region_offset,
            size,
            flags,
        }
    }

    /// Address of the first byte
    #[inline]
    pub const fn addr(&self) -> PageAddr {
        PageAddr::new(self.region_id, self.region_offset)
    }

    /// Whether the page is part of the checkpoint currently being committed.
    #[inline]
    pub const fn in_checkpoint(&self) -> bool {
        self.flags & DIRTY_FLAG_IN_CHECKPOINT != 0
    }
}

/// A page fetched ahead of the authoritative checkpoint stream.
///
/// `slot_index` is the record's own position in the prefetch set; the
/// prefetch index stores slots rather than references so entries stay valid
/// across growth of the backing array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchPage {
    /// Region that contains the page
    pub region_id: u64,
    /// Offset of the page inside the region
    pub region_offset: u64,
    /// Length in bytes
    pub size: u32,
    /// Position of this record in the prefetch set
    pub slot_index: u32,
    /// Fingerprint of the fetched content
    pub fingerprint: Fingerprint,
}

impl FetchPage {
    /// Address of the first byte
    #[inline]
    pub const fn addr(&self) -> PageAddr {
        PageAddr::new(self.region_id, self.region_offset)
    }
}

/// Pre-speculation content of a guest range.
///
/// The preimage is owned by the record. The live location it was copied from
/// is kept as an address and re-resolved through the `MemoryResolver` when
/// the preimage is written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPage {
    /// Region that contains the page
    pub region_id: u64,
    /// Offset of the page inside the region
    pub region_offset: u64,
    /// Length in bytes
    pub size: u64,
    /// Bytes observed before the speculative write
    pub preimage: Box<[u8]>,
}

impl BackupPage {
    /// Address of the live range this backup restores
    #[inline]
    pub const fn host_ref(&self) -> PageAddr {
        PageAddr::new(self.region_id, self.region_offset)
    }
}
