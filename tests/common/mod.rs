//! Shared test utilities for protocol and fault injection tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use smc_replica::cache::FingerprintCacheConfig;
use smc_replica::memory::GuestMemory;
use smc_replica::prefetch::{PolicyKind, PrefetchConfig};
use smc_replica::protocol::{Replicator, Role};
use smc_replica::transport::{ChannelTransport, Transport};
use smc_replica::{PageAddr, Result, SmcError};

/// Region used by most tests.
pub const REGION: u64 = 1;
/// Page size used by most tests.
pub const PAGE: u32 = 4096;
/// Size of the test region.
pub const REGION_SIZE: usize = 64 * PAGE as usize;

/// A fault-injection wrapper around any `Transport`.
///
/// Allows deterministic injection of:
/// - send errors at a specific operation count
/// - a receive error on demand
/// - a truncated (torn) outgoing message
pub struct FaultInjectionTransport<T> {
    inner: T,
    /// Total number of send calls observed so far.
    send_count: AtomicU64,
    /// When non-zero, the Nth send (1-based) will return an I/O error.
    fail_send_at: AtomicU64,
    /// When true, the next recv call will return an error.
    fail_next_recv: AtomicBool,
    /// When true, the next send drops its final byte.
    truncate_next_send: AtomicBool,
}

impl<T: Transport> FaultInjectionTransport<T> {
    /// Wrap an existing transport for fault injection.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            send_count: AtomicU64::new(0),
            fail_send_at: AtomicU64::new(0),
            fail_next_recv: AtomicBool::new(false),
            truncate_next_send: AtomicBool::new(false),
        }
    }

    /// Make the Nth send (1-based) fail with `io::ErrorKind::Other`.
    pub fn inject_send_error_at(&self, operation_n: u64) {
        self.fail_send_at.store(operation_n, Ordering::SeqCst);
    }

    /// Make the next `recv` call fail.
    pub fn inject_recv_error(&self) {
        self.fail_next_recv.store(true, Ordering::SeqCst);
    }

    /// Make the next send deliver all but its last byte.
    pub fn inject_truncated_send(&self) {
        self.truncate_next_send.store(true, Ordering::SeqCst);
    }

    /// Return the total number of send calls observed.
    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    /// Access the wrapped transport.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Transport> Transport for FaultInjectionTransport<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let n = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;

        let target = self.fail_send_at.load(Ordering::SeqCst);
        if target != 0 && n == target {
            return Err(SmcError::Transport(std::io::Error::other(format!(
                "injected send error at operation {n}"
            ))));
        }

        if self.truncate_next_send.swap(false, Ordering::SeqCst) && !bytes.is_empty() {
            return self.inner.send(&bytes[..bytes.len() - 1]);
        }

        self.inner.send(bytes)
    }

    fn recv(&mut self) -> Result<Bytes> {
        if self.fail_next_recv.swap(false, Ordering::SeqCst) {
            return Err(SmcError::Transport(std::io::Error::other(
                "injected recv error",
            )));
        }
        self.inner.recv()
    }
}

/// Guest memory with a single zeroed test region.
pub fn guest() -> Arc<GuestMemory> {
    Arc::new(GuestMemory::with_regions(&[(REGION, REGION_SIZE)]))
}

/// Page content filled with `byte`.
pub fn page_of(byte: u8) -> Vec<u8> {
    vec![byte; PAGE as usize]
}

/// Address of the `n`th page of the test region.
pub fn page_addr(n: u64) -> PageAddr {
    PageAddr::new(REGION, n * PAGE as u64)
}

/// Prefetch configuration that speculates on every candidate.
pub fn prefetch_all() -> PrefetchConfig {
    PrefetchConfig::new(PolicyKind::All).with_batch_pages(2)
}

/// A connected primary and standby over an in-process channel.
pub fn replicator_pair(
    prefetch: PrefetchConfig,
) -> (
    Replicator<ChannelTransport, Arc<GuestMemory>>,
    Replicator<ChannelTransport, Arc<GuestMemory>>,
) {
    let (a, b) = ChannelTransport::pair();
    let primary = Replicator::with_parts(
        Role::Primary,
        a,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch.clone(),
    );
    let standby = Replicator::with_parts(
        Role::Standby,
        b,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch,
    );
    (primary, standby)
}
