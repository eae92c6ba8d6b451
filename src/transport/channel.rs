//! In-process transport backed by crossbeam channels.

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::error::{Result, SmcError};
use crate::transport::Transport;

/// One end of an in-process duplex channel.
///
/// Used to run a primary and a standby on separate threads of one process.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
}

impl ChannelTransport {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }

    /// Number of messages waiting to be received
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| SmcError::ChannelClosed)
    }

    fn recv(&mut self) -> Result<Bytes> {
        self.rx.recv().map_err(|_| SmcError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_duplex() {
        let (mut a, mut b) = ChannelTransport::pair();
        a.send(b"ping").unwrap();
        assert_eq!(b.pending(), 1);
        assert_eq!(&b.recv().unwrap()[..], b"ping");
        b.send(b"pong").unwrap();
        assert_eq!(&a.recv().unwrap()[..], b"pong");
    }

    #[test]
    fn test_closed_peer() {
        let (mut a, b) = ChannelTransport::pair();
        drop(b);
        assert!(matches!(a.send(b"x"), Err(SmcError::ChannelClosed)));
        assert!(matches!(a.recv(), Err(SmcError::ChannelClosed)));
    }
}
