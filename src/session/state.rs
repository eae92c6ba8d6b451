//! Checkpoint session state machine
//!
//! ```text
//! RECV_CHECKPOINT  -> PREFETCH_START | TRANSACTION_START
//! PREFETCH_START   -> PREFETCH_DONE | PREFETCH_ABANDON
//! PREFETCH_DONE    -> TRANSACTION_START | PREFETCH_ABANDON
//! PREFETCH_ABANDON -> TRANSACTION_START
//! TRANSACTION_START -> RECV_CHECKPOINT
//! ```
//!
//! An epoch with no speculation goes straight from RECV_CHECKPOINT to
//! TRANSACTION_START.

use std::fmt;

/// Phase of a checkpoint session within the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u8)]
pub enum SmcState {
    /// Idle, waiting for the next epoch's dirty info
    #[default]
    RecvCheckpoint = 0,
    /// Dirty info received; speculative fetch in progress
    PrefetchStart = 1,
    /// Speculation validated against the authoritative stream
    PrefetchDone = 2,
    /// Speculation invalidated; rollback required
    PrefetchAbandon = 3,
    /// Applying and committing the authoritative payload
    TransactionStart = 4,
}

impl SmcState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub const fn can_transition_to(self, next: SmcState) -> bool {
        matches!(
            (self, next),
            (SmcState::RecvCheckpoint, SmcState::PrefetchStart)
                | (SmcState::RecvCheckpoint, SmcState::TransactionStart)
                | (SmcState::PrefetchStart, SmcState::PrefetchDone)
                | (SmcState::PrefetchStart, SmcState::PrefetchAbandon)
                | (SmcState::PrefetchDone, SmcState::PrefetchAbandon)
                | (SmcState::PrefetchDone, SmcState::TransactionStart)
                | (SmcState::PrefetchAbandon, SmcState::TransactionStart)
                | (SmcState::TransactionStart, SmcState::RecvCheckpoint)
        )
    }

    /// Get the state as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            SmcState::RecvCheckpoint => "RECV_CHECKPOINT",
            SmcState::PrefetchStart => "PREFETCH_START",
            SmcState::PrefetchDone => "PREFETCH_DONE",
            SmcState::PrefetchAbandon => "PREFETCH_ABANDON",
            SmcState::TransactionStart => "TRANSACTION_START",
        }
    }
}

impl TryFrom<u8> for SmcState {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SmcState::RecvCheckpoint),
            1 => Ok(SmcState::PrefetchStart),
            2 => Ok(SmcState::PrefetchDone),
            3 => Ok(SmcState::PrefetchAbandon),
            4 => Ok(SmcState::TransactionStart),
            other => Err(other),
        }
    }
}

impl fmt::Display for SmcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
