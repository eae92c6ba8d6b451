//! smc-replica - Checkpoint replication core for continuous VM fault tolerance
//!
//! A primary host replicates its guest's memory to a standby in discrete
//! epochs. This crate holds the bookkeeping and protocol for one epoch:
//! - **Dirty tracking**: the byte ranges that changed since the last commit
//! - **Speculative prefetch**: the standby pulls a subset of dirty pages ahead
//!   of the authoritative checkpoint and applies them, keeping backups
//! - **Validation**: each checkpoint page is compared by fingerprint against
//!   the prefetched copy or a persistent fingerprint cache, so matching pages
//!   never cross the wire twice
//! - **Rollback**: a mismatch restores every backup newest first before the
//!   authoritative content is applied
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use smc_replica::prelude::*;
//!
//! let (a, b) = ChannelTransport::pair();
//! let config = SmcConfig::load_from_env()?;
//! let mut primary = Replicator::primary(a, Arc::clone(&primary_ram), &config);
//! let mut standby = Replicator::standby(b, Arc::clone(&standby_ram), &config);
//!
//! primary.mark_dirty(1, 0x1000, 4096, DIRTY_FLAG_IN_CHECKPOINT)?;
//! // On two threads:
//! primary.run_primary_epoch()?;
//! standby.run_standby_epoch()?;
//! ```

#![warn(missing_docs)]

pub mod address;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod prefetch;
pub mod protocol;
pub mod record;
pub mod record_set;
pub mod session;
pub mod stats;
pub mod transport;

// Re-exports for convenience
pub use address::PageAddr;
pub use error::{Result, SmcError};
pub use record::{BackupPage, DirtyPage, FetchPage, DIRTY_FLAG_IN_CHECKPOINT};
pub use session::{CheckpointSession, SmcState};

/// Constants used throughout the library
pub mod constants {
    pub use crate::cache::FINGERPRINT_CACHE_CAPACITY;
    pub use crate::codec::{DESCRIPTOR_WIRE_SIZE, ENTRY_WIRE_SIZE, FINGERPRINT_SEED};
    pub use crate::record::{DIRTY_FLAG_IN_CHECKPOINT, ENTRY_FLAG_HAS_CONTENT};
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::address::PageAddr;
    pub use crate::cache::{FingerprintCache, FingerprintCacheConfig};
    pub use crate::config::SmcConfig;
    pub use crate::error::{Result, SmcError};
    pub use crate::memory::{GuestMemory, MemoryResolver};
    pub use crate::prefetch::{PolicyKind, PrefetchConfig, PrefetchPolicy};
    pub use crate::protocol::{CheckpointVerdict, EpochReport, Replicator, Role};
    pub use crate::record::DIRTY_FLAG_IN_CHECKPOINT;
    pub use crate::session::{CheckpointSession, SmcState};
    pub use crate::transport::{ChannelTransport, StreamTransport, Transport};
}
