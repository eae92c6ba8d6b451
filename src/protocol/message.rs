//! Replication message framing
//!
//! Every message on the channel is one frame:
//!
//! ```text
//! +----------------+----------------+
//! |      Kind      |  Payload len   |
//! |   4 bytes BE   |   4 bytes BE   |
//! +----------------+----------------+
//! |             Payload             |
//! +---------------------------------+
//! ```
//!
//! `PrefetchData` and `CheckpointPayload` carry a page payload:
//!
//! ```text
//! +-----------+-------------------------+--------------------------------+
//! | count u32 | count x 28-byte entries | content of HAS_CONTENT entries |
//! +-----------+-------------------------+--------------------------------+
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    decode_descriptors, decode_entries, encode_descriptor, encode_entry, PageEntry, ENTRY_WIRE_SIZE,
};
use crate::error::{Result, SmcError};
use crate::record::{DirtyPage, ENTRY_FLAG_HAS_CONTENT};

/// Frame header size in bytes (4 + 4)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Kind of a replication message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    /// Dirty page descriptors for the epoch (primary -> standby)
    DirtyInfo = 1,
    /// Standby has reset its prefetch bookkeeping
    SyncDestReady = 2,
    /// Primary completes the rendezvous
    SyncSrcReady = 3,
    /// Descriptors the standby wants prefetched; empty ends the phase
    PrefetchRequest = 4,
    /// Prefetched entries and content
    PrefetchData = 5,
    /// Authoritative checkpoint entries
    CheckpointPayload = 6,
    /// Standby rolled back and needs every page with content
    RollbackNotice = 7,
    /// Standby committed the epoch
    CheckpointAck = 8,
}

impl MessageKind {
    /// Convert from the wire value
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(MessageKind::DirtyInfo),
            2 => Some(MessageKind::SyncDestReady),
            3 => Some(MessageKind::SyncSrcReady),
            4 => Some(MessageKind::PrefetchRequest),
            5 => Some(MessageKind::PrefetchData),
            6 => Some(MessageKind::CheckpointPayload),
            7 => Some(MessageKind::RollbackNotice),
            8 => Some(MessageKind::CheckpointAck),
            _ => None,
        }
    }

    /// Wire value
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    /// Name for logs and errors
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageKind::DirtyInfo => "DirtyInfo",
            MessageKind::SyncDestReady => "SyncDestReady",
            MessageKind::SyncSrcReady => "SyncSrcReady",
            MessageKind::PrefetchRequest => "PrefetchRequest",
            MessageKind::PrefetchData => "PrefetchData",
            MessageKind::CheckpointPayload => "CheckpointPayload",
            MessageKind::RollbackNotice => "RollbackNotice",
            MessageKind::CheckpointAck => "CheckpointAck",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message kind
    pub kind: MessageKind,
    /// Payload bytes, shared with the received buffer
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Build a frame with no payload
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// Serialize header and payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = u32::try_from(self.payload.len()).map_err(|_| SmcError::Malformed {
            what: "frame",
            detail: format!("{} payload of {} bytes", self.kind, self.payload.len()),
        })?;
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.put_u32(self.kind.to_u32());
        buf.put_u32(len);
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a whole received message.
    pub fn decode(mut bytes: Bytes) -> Result<Self> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(SmcError::Malformed {
                what: "frame",
                detail: format!("{} bytes is shorter than the header", bytes.len()),
            });
        }
        let raw_kind = bytes.get_u32();
        let len = bytes.get_u32() as usize;
        let kind = MessageKind::from_u32(raw_kind).ok_or_else(|| SmcError::Malformed {
            what: "frame",
            detail: format!("unknown message kind {raw_kind}"),
        })?;
        if bytes.len() != len {
            return Err(SmcError::Malformed {
                what: "frame",
                detail: format!("{kind} declares {len} payload bytes, carries {}", bytes.len()),
            });
        }
        Ok(Self {
            kind,
            payload: bytes,
        })
    }

    /// Fail unless this frame is of kind `expected`.
    pub fn expect(self, expected: MessageKind) -> Result<Bytes> {
        if self.kind != expected {
            return Err(SmcError::UnexpectedMessage {
                expected,
                got: self.kind,
            });
        }
        Ok(self.payload)
    }
}

/// Encode dirty descriptors as a `DirtyInfo` (or `PrefetchRequest`) payload.
pub fn encode_descriptors<'a>(pages: impl IntoIterator<Item = &'a DirtyPage>) -> Bytes {
    let mut buf = BytesMut::new();
    for page in pages {
        encode_descriptor(page, &mut buf);
    }
    buf.freeze()
}

/// Decode a `DirtyInfo` or `PrefetchRequest` payload.
pub fn decode_descriptor_payload(payload: &[u8]) -> Result<Vec<DirtyPage>> {
    decode_descriptors(payload)
}

/// Accumulates entries and their optional content into a page payload.
#[derive(Debug, Default)]
pub struct PagePayloadBuilder {
    count: u32,
    table: BytesMut,
    content: BytesMut,
}

impl PagePayloadBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. `HAS_CONTENT` is set exactly when `content` is present.
    pub fn push(&mut self, mut entry: PageEntry, content: Option<&[u8]>) -> Result<()> {
        match content {
            Some(bytes) => {
                if bytes.len() != entry.size as usize {
                    return Err(SmcError::Malformed {
                        what: "page payload",
                        detail: format!(
                            "{} bytes of content for a {} byte entry",
                            bytes.len(),
                            entry.size
                        ),
                    });
                }
                entry.flags |= ENTRY_FLAG_HAS_CONTENT;
                self.content.extend_from_slice(bytes);
            }
            None => entry.flags &= !ENTRY_FLAG_HAS_CONTENT,
        }
        encode_entry(&entry, &mut self.table);
        self.count += 1;
        Ok(())
    }

    /// Number of entries added
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Whether no entry was added
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Content bytes carried so far
    pub fn content_bytes(&self) -> usize {
        self.content.len()
    }

    /// Finish the payload.
    pub fn finish(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.table.len() + self.content.len());
        buf.put_u32(self.count);
        buf.extend_from_slice(&self.table);
        buf.extend_from_slice(&self.content);
        buf.freeze()
    }
}

/// A decoded page payload.
///
/// `contents[i]` holds the content of `entries[i]` when the entry carries
/// `HAS_CONTENT`; the slices share the received buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagePayload {
    /// Entries in wire order
    pub entries: Vec<PageEntry>,
    /// Content per entry
    pub contents: Vec<Option<Bytes>>,
}

impl PagePayload {
    /// Parse a `PrefetchData` or `CheckpointPayload` payload.
    pub fn decode(mut payload: Bytes) -> Result<Self> {
        if payload.len() < 4 {
            return Err(SmcError::Malformed {
                what: "page payload",
                detail: "missing entry count".to_string(),
            });
        }
        let count = payload.get_u32() as usize;
        let table_len = count
            .checked_mul(ENTRY_WIRE_SIZE)
            .filter(|&n| n <= payload.len())
            .ok_or_else(|| SmcError::Malformed {
                what: "page payload",
                detail: format!("{count} entries do not fit in {} bytes", payload.len()),
            })?;
        let table = payload.split_to(table_len);
        let entries = decode_entries(&table)?;

        let mut contents = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.flags & ENTRY_FLAG_HAS_CONTENT == 0 {
                contents.push(None);
                continue;
            }
            let size = entry.size as usize;
            if payload.len() < size {
                return Err(SmcError::Malformed {
                    what: "page payload",
                    detail: format!(
                        "content of {}:{:#x} truncated",
                        entry.region_id, entry.region_offset
                    ),
                });
            }
            contents.push(Some(payload.split_to(size)));
        }
        if payload.has_remaining() {
            return Err(SmcError::Malformed {
                what: "page payload",
                detail: format!("{} trailing content bytes", payload.len()),
            });
        }
        Ok(Self { entries, contents })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the payload names no pages
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries paired with their content
    pub fn iter(&self) -> impl Iterator<Item = (&PageEntry, Option<&Bytes>)> {
        self.entries.iter().zip(self.contents.iter().map(Option::as_ref))
    }

    /// Whether every entry carries content
    pub fn is_complete(&self) -> bool {
        self.contents.iter().all(Option::is_some)
    }
}
