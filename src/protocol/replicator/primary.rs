use bytes::Bytes;

use crate::address::PageAddr;
use crate::codec::{fingerprint, PageEntry};
use crate::error::{Result, SmcError};
use crate::memory::MemoryResolver;
use crate::protocol::message::{
    decode_descriptor_payload, encode_descriptors, MessageKind, PagePayloadBuilder,
};
use crate::session::SmcState;
use crate::transport::Transport;

use super::{EpochReport, Replicator, Role};

impl<T: Transport, M: MemoryResolver> Replicator<T, M> {
    /// Send every dirty descriptor of the epoch to the standby.
    ///
    /// Returns the number of descriptors sent.
    pub fn send_dirty_info(&mut self) -> Result<usize> {
        let result = self.send_dirty_info_inner();
        self.finish("send_dirty_info", result)
    }

    fn send_dirty_info_inner(&mut self) -> Result<usize> {
        self.require(Role::Primary, "send_dirty_info", &[SmcState::RecvCheckpoint])?;
        let count = self.session.dirty_count();
        let payload = encode_descriptors(self.session.dirty_pages());
        self.send_frame(MessageKind::DirtyInfo, payload)?;
        self.stats.record_dirty_sent(count as u64);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(session = %self.session.id(), epoch = self.session.epoch(), count, "dirty info sent");
        }
        Ok(count)
    }

    /// Complete the prefetch rendezvous started by the standby.
    ///
    /// Waits for `SyncDestReady`, clears the record of pages served last
    /// cycle, then answers with `SyncSrcReady`.
    pub fn sync_src_ready_to_recv(&mut self) -> Result<()> {
        let result = self.sync_src_ready_to_recv_inner();
        self.finish("sync_src_ready_to_recv", result)
    }

    fn sync_src_ready_to_recv_inner(&mut self) -> Result<()> {
        self.require(Role::Primary, "sync_src_ready_to_recv", &[SmcState::RecvCheckpoint])?;
        self.recv_expect(MessageKind::SyncDestReady)?;
        self.session.reset_prefetch()?;
        self.session.index_reset()?;
        self.send_frame(MessageKind::SyncSrcReady, Bytes::new())?;
        self.session.set_state(SmcState::PrefetchStart)
    }

    /// Answer prefetch requests until the standby ends the phase.
    ///
    /// Each served page is remembered with the fingerprint sent, so the
    /// checkpoint can omit content the standby already holds. Returns the
    /// number of pages served.
    pub fn serve_prefetch(&mut self) -> Result<usize> {
        let result = self.serve_prefetch_inner();
        self.finish("serve_prefetch", result)
    }

    fn serve_prefetch_inner(&mut self) -> Result<usize> {
        self.require(Role::Primary, "serve_prefetch", &[SmcState::PrefetchStart])?;
        loop {
            let payload = self.recv_expect(MessageKind::PrefetchRequest)?;
            if payload.is_empty() {
                break;
            }
            let requests = decode_descriptor_payload(&payload)?;
            let mut builder = PagePayloadBuilder::new();
            for page in &requests {
                let addr = page.addr();
                if self.session.index_lookup(addr).is_some() {
                    return Err(SmcError::Malformed {
                        what: "prefetch request",
                        detail: format!("{addr} requested twice in one cycle"),
                    });
                }
                let content = self
                    .memory
                    .resolve(addr, page.size as usize, |live| live.to_vec())?;
                let fp = fingerprint(&content);
                let slot = self
                    .session
                    .insert_prefetch(page.region_id, page.region_offset, page.size, fp)?
                    .slot_index;
                self.session.index_insert(addr, slot)?;
                builder.push(
                    PageEntry {
                        region_id: page.region_id,
                        region_offset: page.region_offset,
                        size: page.size,
                        flags: 0,
                        fingerprint: fp,
                    },
                    Some(&content[..]),
                )?;
                self.stats.record_prefetch(page.size as u64);
            }
            self.report.prefetched += builder.len();
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(session = %self.session.id(), epoch = self.session.epoch(), pages = builder.len(), "prefetch batch served");
            }
            self.send_frame(MessageKind::PrefetchData, builder.finish())?;
        }
        self.session.set_state(SmcState::PrefetchDone)?;
        Ok(self.session.prefetch().len())
    }

    /// Send the authoritative checkpoint.
    ///
    /// Content is omitted for a page whose current fingerprint equals the one
    /// served this cycle, or the one the standby acknowledged in an earlier
    /// epoch. Returns the number of pages in the checkpoint.
    pub fn send_checkpoint(&mut self) -> Result<usize> {
        let result = self.send_checkpoint_inner();
        self.finish("send_checkpoint", result)
    }

    fn send_checkpoint_inner(&mut self) -> Result<usize> {
        self.require(Role::Primary, "send_checkpoint", &[SmcState::PrefetchDone])?;

        let pages = self.session.checkpoint_pages();
        let mut in_flight = Vec::with_capacity(pages.len());
        for page in &pages {
            let content = self
                .memory
                .resolve(page.addr(), page.size as usize, |live| Bytes::copy_from_slice(live))?;
            let entry = PageEntry {
                region_id: page.region_id,
                region_offset: page.region_offset,
                size: page.size,
                flags: 0,
                fingerprint: fingerprint(&content),
            };
            in_flight.push((entry, content));
        }

        let mut builder = PagePayloadBuilder::new();
        let mut skipped = 0u64;
        for (entry, content) in &in_flight {
            if self.standby_holds(entry) {
                builder.push(*entry, None)?;
                skipped += entry.size as u64;
            } else {
                builder.push(*entry, Some(&content[..]))?;
            }
        }
        let sent = builder.content_bytes() as u64;
        self.send_frame(MessageKind::CheckpointPayload, builder.finish())?;

        self.stats.record_content_sent(sent);
        self.stats.record_content_skipped(skipped);
        self.report.pages = in_flight.len();
        self.report.content_bytes_sent += sent;
        self.report.content_bytes_skipped += skipped;
        self.in_flight = in_flight;
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                session = %self.session.id(),
                epoch = self.session.epoch(),
                pages = self.in_flight.len(),
                content_bytes = sent,
                skipped_bytes = skipped,
                "checkpoint sent"
            );
        }
        self.session.set_state(SmcState::TransactionStart)?;
        Ok(self.in_flight.len())
    }

    /// Wait for the standby to commit the checkpoint.
    ///
    /// A `RollbackNotice` is answered once with every page and its content.
    pub fn await_checkpoint_ack(&mut self) -> Result<EpochReport> {
        let result = self.await_checkpoint_ack_inner();
        self.finish("await_checkpoint_ack", result)
    }

    fn await_checkpoint_ack_inner(&mut self) -> Result<EpochReport> {
        self.require(Role::Primary, "await_checkpoint_ack", &[SmcState::TransactionStart])?;
        loop {
            let frame = self.recv_frame()?;
            match frame.kind {
                MessageKind::CheckpointAck => break,
                MessageKind::RollbackNotice if !self.report.rolled_back => {
                    self.resend_full_checkpoint()?;
                }
                other => {
                    return Err(SmcError::UnexpectedMessage {
                        expected: MessageKind::CheckpointAck,
                        got: other,
                    })
                }
            }
        }

        for (entry, _) in std::mem::take(&mut self.in_flight) {
            self.session.cache_mut().insert(
                PageAddr::new(entry.region_id, entry.region_offset),
                entry.size,
                entry.fingerprint,
            );
        }
        let carried = self.session.carry_over_dirty();
        if carried > 0 && tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(session = %self.session.id(), carried, "dirty pages carried into next checkpoint");
        }
        self.close_epoch()
    }

    fn resend_full_checkpoint(&mut self) -> Result<()> {
        let mut builder = PagePayloadBuilder::new();
        for (entry, content) in &self.in_flight {
            builder.push(*entry, Some(&content[..]))?;
        }
        let sent = builder.content_bytes() as u64;
        self.send_frame(MessageKind::CheckpointPayload, builder.finish())?;
        self.stats.record_content_sent(sent);
        self.report.content_bytes_sent += sent;
        self.report.rolled_back = true;
        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(session = %self.session.id(), epoch = self.session.epoch(), pages = self.in_flight.len(), "standby rolled back, checkpoint resent in full");
        }
        Ok(())
    }

    /// Whether the standby is known to hold `entry`'s content already.
    fn standby_holds(&self, entry: &PageEntry) -> bool {
        let addr = PageAddr::new(entry.region_id, entry.region_offset);
        if let Some(served) = self.session.index_lookup(addr) {
            return served.size == entry.size && served.fingerprint == entry.fingerprint;
        }
        self.session
            .cache()
            .peek(addr)
            .is_some_and(|acked| acked.size == entry.size && acked.fingerprint == entry.fingerprint)
    }

    /// Run one full primary epoch.
    pub fn run_primary_epoch(&mut self) -> Result<EpochReport> {
        self.send_dirty_info()?;
        self.sync_src_ready_to_recv()?;
        self.serve_prefetch()?;
        self.send_checkpoint()?;
        self.await_checkpoint_ack()
    }
}
