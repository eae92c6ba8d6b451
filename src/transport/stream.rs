//! Length-delimited transport over any byte stream (e.g. `TcpStream`).
//!
//! ## Frame Format
//!
//! ```text
//! +----------------+----------------------+
//! |  Length (BE)   |       Message        |
//! |    4 bytes     |  `Length` bytes      |
//! +----------------+----------------------+
//! ```

use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};

use crate::error::{Result, SmcError};
use crate::transport::Transport;

/// Largest message accepted from the peer (256 MiB).
pub const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Transport that delimits messages on a stream with a length prefix.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a connected stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Get the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(SmcError::Malformed {
                what: "outgoing frame",
                detail: format!("{} bytes exceeds limit {}", bytes.len(), MAX_FRAME_BYTES),
            });
        }
        self.stream.write_all(&(bytes.len() as u32).to_be_bytes())?;
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Bytes> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(SmcError::ChannelClosed)
            }
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_BYTES {
            return Err(SmcError::Malformed {
                what: "incoming frame",
                detail: format!("{len} bytes exceeds limit {MAX_FRAME_BYTES}"),
            });
        }
        let mut buf = BytesMut::zeroed(len);
        self.stream.read_exact(&mut buf)?;
        Ok(buf.freeze())
    }
}
