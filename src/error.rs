//! Error types for checkpoint replication
//!
//! Validation mismatches are not errors: a failed fingerprint check is an
//! expected protocol outcome and is reported as `false` by the check APIs.

use std::io;

use crate::protocol::MessageKind;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SmcError>;

/// Errors returned by session and protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum SmcError {
    /// The channel reported an I/O failure.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    /// The peer end of the channel has gone away.
    #[error("transport channel closed")]
    ChannelClosed,
    /// A buffer could not be decoded.
    #[error("malformed {what}: {len} bytes is not a multiple of {unit}")]
    Format {
        /// What was being decoded.
        what: &'static str,
        /// Length of the rejected buffer.
        len: usize,
        /// Expected record size.
        unit: usize,
    },
    /// A frame or payload was truncated or internally inconsistent.
    #[error("malformed {what}: {detail}")]
    Malformed {
        /// What was being decoded.
        what: &'static str,
        /// Human readable reason.
        detail: String,
    },
    /// The peer sent a message out of protocol order.
    #[error("unexpected message: expected {expected}, got {got}")]
    UnexpectedMessage {
        /// Message kind the protocol step was waiting for.
        expected: MessageKind,
        /// Message kind actually received.
        got: MessageKind,
    },
    /// A programming-contract violation. The session must be abandoned.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// The session was aborted by an earlier invariant violation.
    #[error("session poisoned by an earlier invariant violation")]
    SessionPoisoned,
    /// The memory resolver could not map the requested guest range.
    #[error("unresolvable guest range: region={region_id:#x} offset={offset:#x} size={size}")]
    Unresolvable {
        /// Region identifier.
        region_id: u64,
        /// Offset inside the region.
        offset: u64,
        /// Length of the range in bytes.
        size: u64,
    },
}

impl SmcError {
    /// Build an invariant violation from any message.
    pub fn invariant(msg: impl Into<String>) -> Self {
        SmcError::InvariantViolation(msg.into())
    }

    /// Whether the error must abort the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SmcError::InvariantViolation(_) | SmcError::SessionPoisoned
        )
    }

    /// Whether the error came from the transport collaborator.
    pub fn is_transport(&self) -> bool {
        matches!(self, SmcError::Transport(_) | SmcError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(SmcError::invariant("dup").is_fatal());
        assert!(SmcError::SessionPoisoned.is_fatal());
        assert!(!SmcError::ChannelClosed.is_fatal());
        assert!(SmcError::ChannelClosed.is_transport());
        assert!(SmcError::from(io::Error::new(io::ErrorKind::BrokenPipe, "x")).is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = SmcError::Format {
            what: "dirty descriptors",
            len: 25,
            unit: 24,
        };
        assert_eq!(
            err.to_string(),
            "malformed dirty descriptors: 25 bytes is not a multiple of 24"
        );
        let err = SmcError::UnexpectedMessage {
            expected: MessageKind::SyncSrcReady,
            got: MessageKind::DirtyInfo,
        };
        assert_eq!(
            err.to_string(),
            "unexpected message: expected SyncSrcReady, got DirtyInfo"
        );
    }
}
