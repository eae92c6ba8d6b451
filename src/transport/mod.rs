//! Message channel between the primary and the standby
//!
//! The replication core only needs whole-message delivery. Retry and timeout
//! policy belong to the transport; the coordinator sees one outcome per call.

mod channel;
mod stream;

pub use channel::ChannelTransport;
pub use stream::{StreamTransport, MAX_FRAME_BYTES};

use bytes::Bytes;

use crate::error::Result;

/// Reliable, ordered message channel.
///
/// Both operations may block the calling task.
pub trait Transport {
    /// Send one message
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receive the next message
    fn recv(&mut self) -> Result<Bytes>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    fn recv(&mut self) -> Result<Bytes> {
        (**self).recv()
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    fn recv(&mut self) -> Result<Bytes> {
        (**self).recv()
    }
}
