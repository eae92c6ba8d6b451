//! Backup capture and rollback
//!
//! A backup records the bytes of a guest range immediately before a
//! speculative write lands there. Rollback writes the preimages back newest
//! first, so a range captured twice in one epoch ends at its oldest preimage.

use crate::address::PageAddr;
use crate::error::Result;
use crate::memory::MemoryResolver;
use crate::record::BackupPage;
use crate::record_set::RecordSet;

/// Preimages captured during the current epoch, in capture order.
#[derive(Debug, Default)]
pub struct BackupSet {
    pages: RecordSet<BackupPage>,
    bytes: u64,
}

impl BackupSet {
    /// Create an empty backup set
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `size` live bytes at (`region_id`, `region_offset`).
    ///
    /// The copy is taken while the resolver excludes guest writers.
    pub fn capture<M: MemoryResolver>(
        &mut self,
        memory: &M,
        region_id: u64,
        region_offset: u64,
        size: u64,
    ) -> Result<&BackupPage> {
        let addr = PageAddr::new(region_id, region_offset);
        let preimage = memory.resolve(addr, size as usize, |live| {
            live.to_vec().into_boxed_slice()
        })?;
        Ok(self.push(region_id, region_offset, preimage))
    }

    /// Record a caller-supplied preimage.
    pub fn insert_with_data(&mut self, region_id: u64, region_offset: u64, data: &[u8]) -> &BackupPage {
        self.push(region_id, region_offset, data.to_vec().into_boxed_slice())
    }

    /// Record a zeroed preimage of `size` bytes for the caller to fill.
    pub fn insert_empty(&mut self, region_id: u64, region_offset: u64, size: u64) -> &mut [u8] {
        self.push(region_id, region_offset, vec![0u8; size as usize].into_boxed_slice());
        let last = self.pages.len() - 1;
        &mut self.pages.at_mut(last).preimage[..]
    }

    /// Discard every preimage. Used once an epoch is known good.
    pub fn reset(&mut self) {
        self.pages.reset();
        self.bytes = 0;
    }

    /// Write every preimage back, newest first, then discard them.
    ///
    /// Returns the number of ranges restored. On a resolver failure the
    /// remaining records are kept so the caller can report them.
    pub fn restore_all<M: MemoryResolver>(&mut self, memory: &M) -> Result<usize> {
        for page in self.pages.as_slice().iter().rev() {
            memory.write_from(page.host_ref(), &page.preimage)?;
        }
        let restored = self.pages.len();
        self.reset();
        Ok(restored)
    }

    /// Number of captured ranges
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether nothing has been captured
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Total preimage bytes held
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Captured records in capture order
    pub fn pages(&self) -> &[BackupPage] {
        self.pages.as_slice()
    }

    fn push(&mut self, region_id: u64, region_offset: u64, preimage: Box<[u8]>) -> &BackupPage {
        let size = preimage.len() as u64;
        self.bytes += size;
        let slot = self.pages.append(BackupPage {
            region_id,
            region_offset,
            size,
            preimage,
        });
        self.pages.at(slot)
    }
}
