//! Guest page addresses
//!
//! A guest page is named by the memory region that contains it and the byte
//! offset inside that region. The pair is the key for the prefetch index and
//! the fingerprint cache.

use std::fmt;

/// Composite (region, offset) address of a guest page.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageAddr {
    region_id: u64,
    offset: u64,
}

impl PageAddr {
    /// Create a new page address
    #[inline]
    pub const fn new(region_id: u64, offset: u64) -> Self {
        Self { region_id, offset }
    }

    /// Identifier of the memory region
    #[inline]
    pub const fn region_id(&self) -> u64 {
        self.region_id
    }

    /// Byte offset inside the region
    #[inline]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Address `delta` bytes further into the same region.
    #[inline]
    pub const fn advance(&self, delta: u64) -> Self {
        Self {
            region_id: self.region_id,
            offset: self.offset + delta,
        }
    }
}

impl fmt::Debug for PageAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageAddr({:#x}:{:#x})", self.region_id, self.offset)
    }
}

impl fmt::Display for PageAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{:#x}", self.region_id, self.offset)
    }
}

impl From<(u64, u64)> for PageAddr {
    fn from((region_id, offset): (u64, u64)) -> Self {
        Self::new(region_id, offset)
    }
}
