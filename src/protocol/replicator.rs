//! Protocol coordinator
//!
//! A `Replicator` owns one `CheckpointSession` together with the transport
//! and memory collaborators it needs, and sequences the per-epoch message
//! exchange. Primary-side steps live in `primary.rs`, standby-side steps in
//! `standby.rs`.
//!
//! Every step checks the role and the session state before touching the
//! channel. A transport failure leaves the state where it was so the caller
//! can retry the step or tear the session down. A contract violation poisons
//! the session.

mod primary;
mod standby;

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;

use crate::address::PageAddr;
use crate::cache::FingerprintCacheConfig;
use crate::codec::PageEntry;
use crate::config::SmcConfig;
use crate::error::{Result, SmcError};
use crate::memory::MemoryResolver;
use crate::prefetch::{policy_from_config, PrefetchConfig, PrefetchPolicy};
use crate::protocol::message::{Frame, MessageKind, PagePayload};
use crate::record::DirtyPage;
use crate::session::{CheckpointSession, SmcState};
use crate::stats::ReplicationStats;
use crate::transport::Transport;

/// Which end of the replication channel a coordinator drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Source host running the guest
    Primary,
    /// Replica host receiving checkpoints
    Standby,
}

impl Role {
    /// Name for logs
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "primary",
            Role::Standby => "standby",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating a checkpoint payload on the standby
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointVerdict {
    /// Every entry without content and every speculated page matched.
    Validated {
        /// Entries in the payload
        pages: usize,
        /// Entries accepted by fingerprint
        checked: usize,
    },
    /// Validation failed; the speculation must be rolled back.
    Abandoned {
        /// Entries in the payload
        pages: usize,
        /// First page that failed
        page: PageAddr,
    },
}

impl CheckpointVerdict {
    /// Whether a rollback is required before commit
    pub fn is_abandoned(&self) -> bool {
        matches!(self, CheckpointVerdict::Abandoned { .. })
    }
}

/// Summary of one committed epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochReport {
    /// Epoch number after commit
    pub epoch: u64,
    /// Pages in the checkpoint
    pub pages: usize,
    /// Pages prefetched this epoch
    pub prefetched: usize,
    /// Whether the standby rolled back its speculation
    pub rolled_back: bool,
    /// Checkpoint content bytes carried on the wire
    pub content_bytes_sent: u64,
    /// Checkpoint content bytes omitted from the wire
    pub content_bytes_skipped: u64,
}

/// Where the standby is in its prefetch exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrefetchPhase {
    /// No request sent this epoch
    Idle,
    /// A non-empty `PrefetchRequest` awaits its `PrefetchData`
    AwaitingData,
    /// The terminating empty request was sent
    Finished,
}

/// Drives one side of checkpoint replication.
pub struct Replicator<T: Transport, M: MemoryResolver> {
    role: Role,
    session: CheckpointSession,
    transport: T,
    memory: M,
    policy: Box<dyn PrefetchPolicy>,
    prefetch_config: PrefetchConfig,
    stats: ReplicationStats,
    /// Standby: selected pages not yet requested
    pending_requests: VecDeque<DirtyPage>,
    prefetch_phase: PrefetchPhase,
    /// Standby: checkpoint payload held between validation and commit
    pending_payload: Option<PagePayload>,
    /// Standby: a rollback during prefetch left the lean checkpoint unread
    discard_checkpoint: bool,
    /// Primary: checkpoint entries and content held until acknowledged
    in_flight: Vec<(PageEntry, Bytes)>,
    report: EpochReport,
}

impl<T: Transport, M: MemoryResolver> Replicator<T, M> {
    /// Create a coordinator with an initialised session.
    pub fn new(role: Role, transport: T, memory: M, config: &SmcConfig) -> Self {
        Self::with_parts(
            role,
            transport,
            memory,
            config.to_cache_config(),
            config.to_prefetch_config(),
        )
    }

    /// Create a coordinator from component configurations.
    pub fn with_parts(
        role: Role,
        transport: T,
        memory: M,
        cache_config: FingerprintCacheConfig,
        prefetch_config: PrefetchConfig,
    ) -> Self {
        let mut session = CheckpointSession::new(cache_config);
        session.init();
        let policy = policy_from_config(&prefetch_config);
        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(
                session = %session.id(),
                role = %role,
                policy = policy.name(),
                "replicator started"
            );
        }
        Self {
            role,
            session,
            transport,
            memory,
            policy,
            prefetch_config,
            stats: ReplicationStats::new(),
            pending_requests: VecDeque::new(),
            prefetch_phase: PrefetchPhase::Idle,
            pending_payload: None,
            discard_checkpoint: false,
            in_flight: Vec::new(),
            report: EpochReport::default(),
        }
    }

    /// Create a primary coordinator
    pub fn primary(transport: T, memory: M, config: &SmcConfig) -> Self {
        Self::new(Role::Primary, transport, memory, config)
    }

    /// Create a standby coordinator
    pub fn standby(transport: T, memory: M, config: &SmcConfig) -> Self {
        Self::new(Role::Standby, transport, memory, config)
    }

    /// Replace the prefetch selection strategy.
    pub fn with_policy(mut self, policy: Box<dyn PrefetchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Role of this coordinator
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current session state
    pub fn state(&self) -> SmcState {
        self.session.state()
    }

    /// Committed epochs
    pub fn epoch(&self) -> u64 {
        self.session.epoch()
    }

    /// Underlying session
    pub fn session(&self) -> &CheckpointSession {
        &self.session
    }

    /// Mutable session, used by the primary to record dirty pages
    pub fn session_mut(&mut self) -> &mut CheckpointSession {
        &mut self.session
    }

    /// Memory collaborator
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Transport collaborator
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Replication counters
    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    /// Prefetch tuning in effect
    pub fn prefetch_config(&self) -> &PrefetchConfig {
        &self.prefetch_config
    }

    /// Record a dirty page for the next checkpoint (primary).
    pub fn mark_dirty(&mut self, region_id: u64, region_offset: u64, size: u32, flags: u32) -> Result<usize> {
        let result = self.session.insert_dirty(region_id, region_offset, size, flags);
        self.session.guard(result)
    }

    /// Tear the session down and hand back the collaborators.
    pub fn teardown(mut self) -> (T, M) {
        self.session.teardown();
        (self.transport, self.memory)
    }

    // === Shared plumbing ===

    fn require(&self, role: Role, op: &'static str, states: &[SmcState]) -> Result<()> {
        self.session.ensure_usable()?;
        if self.role != role {
            return Err(SmcError::invariant(format!(
                "{op} is a {role} operation, called on the {}",
                self.role
            )));
        }
        let state = self.session.state();
        if !states.contains(&state) {
            return Err(SmcError::invariant(format!("{op} called in state {state}")));
        }
        Ok(())
    }

    /// Log transport failures and poison on contract violations.
    fn finish<R>(&mut self, op: &'static str, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            if err.is_transport() && tracing::enabled!(tracing::Level::WARN) {
                tracing::warn!(
                    session = %self.session.id(),
                    role = %self.role,
                    epoch = self.session.epoch(),
                    state = %self.session.state(),
                    op,
                    error = %err,
                    "transport failure"
                );
            }
        }
        self.session.guard(result)
    }

    fn send_frame(&mut self, kind: MessageKind, payload: Bytes) -> Result<()> {
        let bytes = Frame::new(kind, payload).encode()?;
        self.transport.send(&bytes)
    }

    fn recv_frame(&mut self) -> Result<Frame> {
        let bytes = self.transport.recv()?;
        Frame::decode(bytes)
    }

    fn recv_expect(&mut self, kind: MessageKind) -> Result<Bytes> {
        self.recv_frame()?.expect(kind)
    }

    /// Close the epoch bookkeeping common to both roles.
    fn close_epoch(&mut self) -> Result<EpochReport> {
        self.session.reset_prefetch()?;
        self.session.index_reset()?;
        self.session.reset_backups()?;
        let epoch = self.session.advance_epoch();
        self.session.set_state(SmcState::RecvCheckpoint)?;
        self.stats.record_epoch();

        let mut report = std::mem::take(&mut self.report);
        report.epoch = epoch;
        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(
                session = %self.session.id(),
                role = %self.role,
                epoch,
                pages = report.pages,
                prefetched = report.prefetched,
                rolled_back = report.rolled_back,
                "epoch committed"
            );
        }
        Ok(report)
    }
}

impl<T: Transport, M: MemoryResolver> fmt::Debug for Replicator<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicator")
            .field("role", &self.role)
            .field("session", &self.session.id())
            .field("state", &self.session.state())
            .field("epoch", &self.session.epoch())
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}
