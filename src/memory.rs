//! Access to live guest memory
//!
//! The replication core never holds raw pointers into guest RAM. Every access
//! goes through a `MemoryResolver`, which maps a (region, offset) pair to the
//! live bytes for the duration of a closure. Implementations must exclude guest
//! writers while the closure runs so that backup snapshots are never torn.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::address::PageAddr;
use crate::codec::{fingerprint, Fingerprint};
use crate::error::{Result, SmcError};

/// Translates guest addresses into host-accessible buffers.
pub trait MemoryResolver {
    /// Run `f` over the `size` live bytes starting at `addr`.
    ///
    /// Guest writes to the range are excluded while `f` runs.
    fn resolve<R>(&self, addr: PageAddr, size: usize, f: impl FnOnce(&mut [u8]) -> R)
        -> Result<R>;

    /// Copy live bytes into `dst`.
    fn read_into(&self, addr: PageAddr, dst: &mut [u8]) -> Result<()> {
        self.resolve(addr, dst.len(), |live| dst.copy_from_slice(live))
    }

    /// Overwrite live bytes with `src`.
    fn write_from(&self, addr: PageAddr, src: &[u8]) -> Result<()> {
        self.resolve(addr, src.len(), |live| live.copy_from_slice(src))
    }

    /// Fingerprint the live content of a range.
    fn fingerprint(&self, addr: PageAddr, size: usize) -> Result<Fingerprint> {
        self.resolve(addr, size, |live| fingerprint(live))
    }
}

impl<M: MemoryResolver> MemoryResolver for Arc<M> {
    fn resolve<R>(
        &self,
        addr: PageAddr,
        size: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        (**self).resolve(addr, size, f)
    }
}

impl<M: MemoryResolver> MemoryResolver for &M {
    fn resolve<R>(
        &self,
        addr: PageAddr,
        size: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        (**self).resolve(addr, size, f)
    }
}

/// Host-resident guest RAM organised as named regions.
///
/// Shared between the replication task and guest vCPU threads; a single
/// lock serialises resolver access against guest writes.
#[derive(Debug, Default)]
pub struct GuestMemory {
    regions: RwLock<HashMap<u64, Box<[u8]>>>,
}

impl GuestMemory {
    /// Create guest memory with no regions
    pub fn new() -> Self {
        Self::default()
    }

    /// Create guest memory with zeroed regions of the given sizes.
    pub fn with_regions(regions: &[(u64, usize)]) -> Self {
        let memory = Self::new();
        for &(region_id, size) in regions {
            memory.add_region(region_id, size);
        }
        memory
    }

    /// Add (or replace) a zeroed region.
    pub fn add_region(&self, region_id: u64, size: usize) {
        self.regions
            .write()
            .insert(region_id, vec![0u8; size].into_boxed_slice());
    }

    /// Size of a region, if it exists
    pub fn region_size(&self, region_id: u64) -> Option<usize> {
        self.regions.read().get(&region_id).map(|r| r.len())
    }

    /// Copy `size` bytes out of guest memory.
    pub fn read(&self, addr: PageAddr, size: usize) -> Result<Vec<u8>> {
        let regions = self.regions.read();
        let region = regions
            .get(&addr.region_id())
            .ok_or_else(|| unresolvable(addr, size))?;
        let range = checked_range(region.len(), addr, size)?;
        Ok(region[range].to_vec())
    }

    /// Guest-side write, as a vCPU would perform it.
    pub fn write(&self, addr: PageAddr, bytes: &[u8]) -> Result<()> {
        self.write_from(addr, bytes)
    }
}

impl MemoryResolver for GuestMemory {
    fn resolve<R>(
        &self,
        addr: PageAddr,
        size: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        let mut regions = self.regions.write();
        let region = regions
            .get_mut(&addr.region_id())
            .ok_or_else(|| unresolvable(addr, size))?;
        let range = checked_range(region.len(), addr, size)?;
        Ok(f(&mut region[range]))
    }
}

fn checked_range(region_len: usize, addr: PageAddr, size: usize) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(addr.offset()).map_err(|_| unresolvable(addr, size))?;
    let end = start
        .checked_add(size)
        .filter(|&end| end <= region_len)
        .ok_or_else(|| unresolvable(addr, size))?;
    Ok(start..end)
}

fn unresolvable(addr: PageAddr, size: usize) -> SmcError {
    SmcError::Unresolvable {
        region_id: addr.region_id(),
        offset: addr.offset(),
        size: size as u64,
    }
}
