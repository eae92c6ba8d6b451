//! Fixed-layout page descriptors.
//!
//! ## Layout (big-endian)
//!
//! ```text
//! +-------------+---------------+--------+--------------+---------------+
//! |  region_id  | region_offset |  size  | flags/extra  | [fingerprint] |
//! |   8 bytes   |    8 bytes    | 4 bytes|   4 bytes    |   4 bytes     |
//! +-------------+---------------+--------+--------------+---------------+
//! ```
//!
//! Dirty-info messages carry the 24-byte descriptor. Prefetch and checkpoint
//! messages carry the 28-byte entry that appends the fingerprint.

use bytes::{Buf, BufMut};

use crate::codec::Fingerprint;
use crate::error::{Result, SmcError};
use crate::record::DirtyPage;

/// Size of an encoded dirty-page descriptor
pub const DESCRIPTOR_WIRE_SIZE: usize = 24;

/// Size of an encoded descriptor followed by a fingerprint
pub const ENTRY_WIRE_SIZE: usize = DESCRIPTOR_WIRE_SIZE + 4;

/// A descriptor with a fingerprint, as carried by prefetch and checkpoint frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageEntry {
    /// Region that contains the page
    pub region_id: u64,
    /// Offset of the page inside the region
    pub region_offset: u64,
    /// Length in bytes
    pub size: u32,
    /// Flags or extra data, depending on the message
    pub flags: u32,
    /// Content fingerprint
    pub fingerprint: Fingerprint,
}

/// Append the wire form of `page` to `dst`.
pub fn encode_descriptor(page: &DirtyPage, dst: &mut impl BufMut) {
    dst.put_u64(page.region_id);
    dst.put_u64(page.region_offset);
    dst.put_u32(page.size);
    dst.put_u32(page.flags);
}

/// Append the wire form of `entry` to `dst`.
pub fn encode_entry(entry: &PageEntry, dst: &mut impl BufMut) {
    dst.put_u64(entry.region_id);
    dst.put_u64(entry.region_offset);
    dst.put_u32(entry.size);
    dst.put_u32(entry.flags);
    dst.put_u32(entry.fingerprint);
}

/// Decode a buffer holding a whole number of dirty-page descriptors.
///
/// Fails without decoding anything if the length is not an exact multiple of
/// [`DESCRIPTOR_WIRE_SIZE`].
pub fn decode_descriptors(mut buf: &[u8]) -> Result<Vec<DirtyPage>> {
    if buf.len() % DESCRIPTOR_WIRE_SIZE != 0 {
        return Err(SmcError::Format {
            what: "dirty descriptors",
            len: buf.len(),
            unit: DESCRIPTOR_WIRE_SIZE,
        });
    }
    let mut pages = Vec::with_capacity(buf.len() / DESCRIPTOR_WIRE_SIZE);
    while buf.has_remaining() {
        pages.push(DirtyPage {
            region_id: buf.get_u64(),
            region_offset: buf.get_u64(),
            size: buf.get_u32(),
            flags: buf.get_u32(),
        });
    }
    Ok(pages)
}

/// Decode a buffer holding a whole number of fingerprinted entries.
pub fn decode_entries(mut buf: &[u8]) -> Result<Vec<PageEntry>> {
    if buf.len() % ENTRY_WIRE_SIZE != 0 {
        return Err(SmcError::Format {
            what: "page entries",
            len: buf.len(),
            unit: ENTRY_WIRE_SIZE,
        });
    }
    let mut entries = Vec::with_capacity(buf.len() / ENTRY_WIRE_SIZE);
    while buf.has_remaining() {
        entries.push(PageEntry {
            region_id: buf.get_u64(),
            region_offset: buf.get_u64(),
            size: buf.get_u32(),
            flags: buf.get_u32(),
            fingerprint: buf.get_u32(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_layout() {
        let page = DirtyPage::new(0x0102_0304_0506_0708, 0x1000, 4096, 1);
        let mut buf = Vec::new();
        encode_descriptor(&page, &mut buf);
        assert_eq!(buf.len(), DESCRIPTOR_WIRE_SIZE);
        assert_eq!(&buf[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&buf[16..20], &4096u32.to_be_bytes());
        assert_eq!(&buf[20..24], &1u32.to_be_bytes());
        assert_eq!(decode_descriptors(&buf).unwrap(), vec![page]);
    }

    #[test]
    fn test_entry_layout_appends_fingerprint() {
        let entry = PageEntry {
            region_id: 1,
            region_offset: 0x2000,
            size: 512,
            flags: 0,
            fingerprint: 0xDEAD_BEEF,
        };
        let mut buf = Vec::new();
        encode_entry(&entry, &mut buf);
        assert_eq!(buf.len(), ENTRY_WIRE_SIZE);
        assert_eq!(&buf[24..], &0xDEAD_BEEFu32.to_be_bytes());
        assert_eq!(decode_entries(&buf).unwrap(), vec![entry]);
    }

    #[test]
    fn test_decode_rejects_partial_record() {
        let mut buf = Vec::new();
        encode_descriptor(&DirtyPage::new(1, 0, 4096, 0), &mut buf);
        buf.push(0);
        assert!(matches!(
            decode_descriptors(&buf),
            Err(SmcError::Format { len: 25, unit: 24, .. })
        ));
        assert!(matches!(
            decode_entries(&buf[..20]),
            Err(SmcError::Format { .. })
        ));
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_descriptors(&[]).unwrap().is_empty());
        assert!(decode_entries(&[]).unwrap().is_empty());
    }
}
