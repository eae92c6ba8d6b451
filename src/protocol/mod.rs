//! Replication protocol
//!
//! Framing for the messages exchanged between primary and standby, and the
//! `Replicator` that drives a `CheckpointSession` through one epoch:
//!
//! ```text
//! primary                                   standby
//!   DirtyInfo            ------------------>  recv_dirty_info
//!   sync_src_ready_to_recv <--- SyncDestReady  sync_notice_dest_to_recv
//!                        ---- SyncSrcReady -->
//!   serve_prefetch       <--- PrefetchRequest  prefetch_dirty_pages
//!                        ---- PrefetchData -->  recv_prefetch_info
//!                        <--- PrefetchRequest (empty)
//!   send_checkpoint      - CheckpointPayload ->  recv_checkpoint
//!                        <-- RollbackNotice --   rollback_with_prefetch (on mismatch)
//!                        - CheckpointPayload ->
//!   await_checkpoint_ack <-- CheckpointAck ---   commit_checkpoint
//! ```

mod message;
mod replicator;

pub use message::{
    decode_descriptor_payload, encode_descriptors, Frame, MessageKind, PagePayload,
    PagePayloadBuilder, FRAME_HEADER_SIZE,
};
pub use replicator::{CheckpointVerdict, EpochReport, Replicator, Role};
