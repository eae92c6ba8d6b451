//! Encoding model for the replication channel.
//!
//! This module defines the fixed-layout page descriptors exchanged between the
//! primary and the standby, and the content fingerprint used to compare pages
//! without transferring them.

mod fingerprint;
mod wire;

pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_SEED};
pub use wire::{
    decode_descriptors, decode_entries, encode_descriptor, encode_entry, PageEntry,
    DESCRIPTOR_WIRE_SIZE, ENTRY_WIRE_SIZE,
};
