use std::collections::HashSet;

use bytes::Bytes;

use crate::address::PageAddr;
use crate::error::{Result, SmcError};
use crate::memory::MemoryResolver;
use crate::protocol::message::{encode_descriptors, MessageKind, PagePayload};
use crate::record::DirtyPage;
use crate::session::SmcState;
use crate::transport::Transport;

use super::{CheckpointVerdict, EpochReport, PrefetchPhase, Replicator, Role};

impl<T: Transport, M: MemoryResolver> Replicator<T, M> {
    /// Receive the primary's dirty descriptors for the epoch.
    ///
    /// A malformed buffer is rejected whole. Returns the number received.
    pub fn recv_dirty_info(&mut self) -> Result<usize> {
        let result = self.recv_dirty_info_inner();
        self.finish("recv_dirty_info", result)
    }

    fn recv_dirty_info_inner(&mut self) -> Result<usize> {
        self.require(Role::Standby, "recv_dirty_info", &[SmcState::RecvCheckpoint])?;
        let payload = self.recv_expect(MessageKind::DirtyInfo)?;
        let count = self.session.insert_dirty_from_buf(&payload)?;
        self.stats.record_dirty_received(count as u64);
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(session = %self.session.id(), epoch = self.session.epoch(), count, "dirty info received");
        }
        Ok(count)
    }

    /// Prepare prefetch bookkeeping and rendezvous with the primary.
    ///
    /// The prefetch records and index are cleared before `SyncDestReady` is
    /// sent, so no prefetch content can arrive ahead of them. The session
    /// enters PREFETCH_START once `SyncSrcReady` is received.
    pub fn sync_notice_dest_to_recv(&mut self) -> Result<()> {
        let result = self.sync_notice_dest_to_recv_inner();
        self.finish("sync_notice_dest_to_recv", result)
    }

    fn sync_notice_dest_to_recv_inner(&mut self) -> Result<()> {
        self.require(Role::Standby, "sync_notice_dest_to_recv", &[SmcState::RecvCheckpoint])?;
        self.session.reset_prefetch()?;
        self.session.index_reset()?;
        self.pending_requests.clear();
        self.prefetch_phase = PrefetchPhase::Idle;
        self.discard_checkpoint = false;
        self.send_frame(MessageKind::SyncDestReady, Bytes::new())?;
        self.recv_expect(MessageKind::SyncSrcReady)?;
        self.session.set_state(SmcState::PrefetchStart)?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(session = %self.session.id(), epoch = self.session.epoch(), "prefetch rendezvous complete");
        }
        Ok(())
    }

    /// Select pages to speculate on and request the first batch.
    ///
    /// Candidates are the distinct `IN_CHECKPOINT` dirty pages. When the
    /// policy selects nothing the prefetch phase is closed immediately.
    /// Returns the number of pages selected.
    pub fn prefetch_dirty_pages(&mut self) -> Result<usize> {
        let result = self.prefetch_dirty_pages_inner();
        self.finish("prefetch_dirty_pages", result)
    }

    fn prefetch_dirty_pages_inner(&mut self) -> Result<usize> {
        self.require(Role::Standby, "prefetch_dirty_pages", &[SmcState::PrefetchStart])?;
        if self.prefetch_phase != PrefetchPhase::Idle {
            return Err(SmcError::invariant("prefetch already started this epoch"));
        }
        let candidates = self.session.checkpoint_pages();
        let offered: HashSet<PageAddr> = candidates.iter().map(DirtyPage::addr).collect();
        let mut chosen = HashSet::new();
        // A selection outside the candidates, or a repeat, would break the
        // one-record-per-address rule of the prefetch index.
        let selected: Vec<DirtyPage> = self
            .policy
            .select(&candidates)
            .into_iter()
            .filter(|page| offered.contains(&page.addr()) && chosen.insert(page.addr()))
            .collect();
        let count = selected.len();
        self.pending_requests = selected.into();
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                session = %self.session.id(),
                epoch = self.session.epoch(),
                policy = self.policy.name(),
                candidates = candidates.len(),
                selected = count,
                "prefetch selection"
            );
        }
        self.request_next_batch()?;
        Ok(count)
    }

    /// Receive one batch of prefetched content and apply it speculatively.
    ///
    /// For each page a backup of the live range is captured, the content is
    /// written, and the record is fingerprinted from live memory and indexed.
    /// With `request_info` set the next batch is requested (or the phase is
    /// closed when none is left); without it the phase is closed and the
    /// remaining selection is dropped. Returns the number of pages applied.
    pub fn recv_prefetch_info(&mut self, request_info: bool) -> Result<usize> {
        let result = self.recv_prefetch_info_inner(request_info);
        self.finish("recv_prefetch_info", result)
    }

    fn recv_prefetch_info_inner(&mut self, request_info: bool) -> Result<usize> {
        self.require(Role::Standby, "recv_prefetch_info", &[SmcState::PrefetchStart])?;
        if self.prefetch_phase != PrefetchPhase::AwaitingData {
            return Err(SmcError::invariant("no prefetch request outstanding"));
        }
        let payload = PagePayload::decode(self.recv_expect(MessageKind::PrefetchData)?)?;
        if !payload.is_complete() {
            return Err(SmcError::Malformed {
                what: "prefetch data",
                detail: "entry without content".to_string(),
            });
        }
        for (entry, content) in payload.iter() {
            let Some(content) = content else { continue };
            self.session
                .stage_prefetched_page(&self.memory, entry, content)?;
            self.stats.record_prefetch(entry.size as u64);
        }
        self.report.prefetched += payload.len();

        if !request_info {
            self.pending_requests.clear();
        }
        self.request_next_batch()?;
        Ok(payload.len())
    }

    /// Whether a prefetch request still awaits its data
    pub fn prefetch_outstanding(&self) -> bool {
        self.prefetch_phase == PrefetchPhase::AwaitingData
    }

    /// Select, request and apply every prefetch batch of the epoch.
    pub fn run_prefetch(&mut self) -> Result<usize> {
        self.prefetch_dirty_pages()?;
        let mut applied = 0;
        while self.prefetch_outstanding() {
            applied += self.recv_prefetch_info(true)?;
        }
        Ok(applied)
    }

    fn request_next_batch(&mut self) -> Result<()> {
        let take = self
            .prefetch_config
            .batch_pages
            .max(1)
            .min(self.pending_requests.len());
        let payload = encode_descriptors(self.pending_requests.range(..take));
        self.send_frame(MessageKind::PrefetchRequest, payload)?;
        drop(self.pending_requests.drain(..take));
        self.prefetch_phase = if take == 0 {
            PrefetchPhase::Finished
        } else {
            PrefetchPhase::AwaitingData
        };
        Ok(())
    }

    /// Receive the authoritative checkpoint and validate it.
    ///
    /// Every entry sent without content, and every entry for a page that was
    /// speculated this epoch, goes through `check_dirty_page`. The first
    /// mismatch moves the session to PREFETCH_ABANDON; otherwise it reaches
    /// PREFETCH_DONE and the prefetch records are absorbed into the cache.
    pub fn recv_checkpoint(&mut self) -> Result<CheckpointVerdict> {
        let result = self.recv_checkpoint_inner();
        self.finish("recv_checkpoint", result)
    }

    fn recv_checkpoint_inner(&mut self) -> Result<CheckpointVerdict> {
        self.require(Role::Standby, "recv_checkpoint", &[SmcState::PrefetchStart])?;
        match self.prefetch_phase {
            PrefetchPhase::AwaitingData => {
                return Err(SmcError::invariant("checkpoint received while prefetch data is outstanding"));
            }
            PrefetchPhase::Idle => {
                // Prefetch skipped: release the primary from serving.
                self.pending_requests.clear();
                self.request_next_batch()?;
            }
            PrefetchPhase::Finished => {}
        }

        let payload = PagePayload::decode(self.recv_expect(MessageKind::CheckpointPayload)?)?;
        let pages = payload.len();
        let mut checked = 0;
        let mut failed = None;
        for (entry, content) in payload.iter() {
            let addr = PageAddr::new(entry.region_id, entry.region_offset);
            if content.is_some() && self.session.index_lookup(addr).is_none() {
                continue;
            }
            let matched = self.check_dirty_page(
                entry.region_id,
                entry.region_offset,
                entry.size,
                entry.fingerprint,
            )?;
            if !matched {
                failed = Some(addr);
                break;
            }
            checked += 1;
        }
        self.report.pages = pages;
        self.pending_payload = Some(payload);

        match failed {
            Some(page) => {
                self.session.set_state(SmcState::PrefetchAbandon)?;
                if tracing::enabled!(tracing::Level::WARN) {
                    tracing::warn!(
                        session = %self.session.id(),
                        epoch = self.session.epoch(),
                        page = %page,
                        speculated = self.session.prefetch().len(),
                        "checkpoint validation failed, abandoning prefetch"
                    );
                }
                Ok(CheckpointVerdict::Abandoned { pages, page })
            }
            None => {
                self.session.set_state(SmcState::PrefetchDone)?;
                self.session.update_prefetch_cache();
                Ok(CheckpointVerdict::Validated { pages, checked })
            }
        }
    }

    /// Validation gate for one page of the authoritative checkpoint.
    ///
    /// A `false` result flags the session for rollback.
    pub fn check_dirty_page(
        &mut self,
        region_id: u64,
        region_offset: u64,
        size: u32,
        claimed: u32,
    ) -> Result<bool> {
        let result = self.session.check_dirty_page(
            &self.memory,
            region_id,
            region_offset,
            size,
            claimed,
        );
        let matched = self.session.guard(result)?;
        self.stats.record_validation(matched);
        Ok(matched)
    }

    /// Undo the epoch's speculation and fetch the checkpoint in full.
    ///
    /// Backups are restored newest first and the prefetch state is cleared.
    /// The primary is then sent a `RollbackNotice` and answers with every page
    /// and its content. Returns the number of ranges restored.
    ///
    /// Also accepted in PREFETCH_START, after a prefetch batch failed part way.
    /// The remaining selection is dropped, the primary is released from
    /// serving, and the checkpoint it sends next is read and discarded.
    pub fn rollback_with_prefetch(&mut self) -> Result<usize> {
        let result = self.rollback_with_prefetch_inner();
        self.finish("rollback_with_prefetch", result)
    }

    fn rollback_with_prefetch_inner(&mut self) -> Result<usize> {
        self.require(
            Role::Standby,
            "rollback_with_prefetch",
            &[
                SmcState::PrefetchStart,
                SmcState::PrefetchDone,
                SmcState::PrefetchAbandon,
            ],
        )?;
        if self.session.state() == SmcState::PrefetchStart {
            self.discard_checkpoint = true;
        }
        self.pending_payload = None;
        let restored = self.session.rollback_with_prefetch(&self.memory)?;
        if !self.report.rolled_back {
            self.stats.record_rollback(restored as u64);
            self.report.rolled_back = true;
        }

        if self.prefetch_phase != PrefetchPhase::Finished {
            self.pending_requests.clear();
            self.request_next_batch()?;
        }
        if self.discard_checkpoint {
            // Omits content for pages the primary believes we hold.
            self.recv_expect(MessageKind::CheckpointPayload)?;
            self.discard_checkpoint = false;
        }

        self.send_frame(MessageKind::RollbackNotice, Bytes::new())?;
        let payload = PagePayload::decode(self.recv_expect(MessageKind::CheckpointPayload)?)?;
        if !payload.is_complete() {
            return Err(SmcError::Malformed {
                what: "checkpoint payload",
                detail: "entry without content after rollback".to_string(),
            });
        }
        self.report.pages = payload.len();
        self.pending_payload = Some(payload);
        Ok(restored)
    }

    /// Whether the load path must consult prefetch validation this epoch.
    ///
    /// False when nothing was speculated, which lets the caller skip every
    /// fingerprint check.
    pub fn loadvm_need_check_prefetch(&self) -> bool {
        self.session.need_check_prefetch()
    }

    /// Apply the validated checkpoint and acknowledge it.
    ///
    /// Content is written to guest memory, backups are discarded, every
    /// page's fingerprint is recorded in the cache and the epoch advances. If
    /// the acknowledgement cannot be sent the session stays in
    /// TRANSACTION_START and the call may be retried.
    pub fn commit_checkpoint(&mut self) -> Result<EpochReport> {
        let result = self.commit_checkpoint_inner();
        self.finish("commit_checkpoint", result)
    }

    fn commit_checkpoint_inner(&mut self) -> Result<EpochReport> {
        self.require(
            Role::Standby,
            "commit_checkpoint",
            &[
                SmcState::PrefetchDone,
                SmcState::PrefetchAbandon,
                SmcState::TransactionStart,
            ],
        )?;
        if self.session.need_rollback() {
            return Err(SmcError::invariant("commit attempted before rollback"));
        }
        let payload = self
            .pending_payload
            .take()
            .ok_or_else(|| SmcError::invariant("commit attempted without a checkpoint payload"))?;
        if self.session.state() == SmcState::PrefetchAbandon && !payload.is_complete() {
            return Err(SmcError::invariant("abandoned epoch committed without full content"));
        }
        if self.session.state() != SmcState::TransactionStart {
            self.session.set_state(SmcState::TransactionStart)?;
        }

        let applied = self.apply_payload(&payload);
        // Keep the payload for a retry until the acknowledgement is out.
        self.pending_payload = Some(payload);
        applied?;
        self.session.reset_backups()?;
        self.send_frame(MessageKind::CheckpointAck, Bytes::new())?;

        if let Some(payload) = self.pending_payload.take() {
            for entry in &payload.entries {
                self.session.cache_mut().insert(
                    PageAddr::new(entry.region_id, entry.region_offset),
                    entry.size,
                    entry.fingerprint,
                );
            }
        }
        self.session.reset_dirty()?;
        self.pending_requests.clear();
        self.prefetch_phase = PrefetchPhase::Idle;
        self.close_epoch()
    }

    fn apply_payload(&mut self, payload: &PagePayload) -> Result<()> {
        for (entry, content) in payload.iter() {
            if let Some(content) = content {
                let addr = PageAddr::new(entry.region_id, entry.region_offset);
                self.memory.write_from(addr, content)?;
            }
        }
        Ok(())
    }

    /// Run one full standby epoch, rolling back when validation fails.
    pub fn run_standby_epoch(&mut self) -> Result<EpochReport> {
        self.recv_dirty_info()?;
        self.sync_notice_dest_to_recv()?;
        self.run_prefetch()?;
        if self.recv_checkpoint()?.is_abandoned() {
            self.rollback_with_prefetch()?;
        }
        self.commit_checkpoint()
    }
}
