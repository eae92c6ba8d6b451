//! End-to-end tests for the replication protocol between a primary and a
//! standby running on separate threads.

mod common;

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use smc_replica::cache::FingerprintCacheConfig;
use smc_replica::codec::{fingerprint, PageEntry};
use smc_replica::config::SmcConfig;
use smc_replica::memory::GuestMemory;
use smc_replica::prefetch::{PolicyKind, PrefetchConfig};
use smc_replica::protocol::{
    encode_descriptors, CheckpointVerdict, EpochReport, Frame, MessageKind, PagePayloadBuilder,
    Replicator, Role,
};
use smc_replica::transport::{ChannelTransport, StreamTransport, Transport};
use smc_replica::{DirtyPage, SmcError, SmcState, DIRTY_FLAG_IN_CHECKPOINT};

use common::*;

#[test]
fn test_prefetch_validated_without_rollback() {
    let (mut primary, mut standby) = replicator_pair(prefetch_all());
    let addr = page_addr(1);
    primary.memory().write(addr, &page_of(0xC1)).unwrap();
    primary
        .mark_dirty(REGION, addr.offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();

    thread::scope(|s| {
        let primary_run = s.spawn(|| primary.run_primary_epoch().unwrap());

        assert_eq!(standby.recv_dirty_info().unwrap(), 1);
        standby.sync_notice_dest_to_recv().unwrap();
        assert_eq!(standby.state(), SmcState::PrefetchStart);
        assert!(!standby.loadvm_need_check_prefetch());

        assert_eq!(standby.run_prefetch().unwrap(), 1);
        assert!(standby.loadvm_need_check_prefetch());
        assert_eq!(standby.memory().read(addr, PAGE as usize).unwrap(), page_of(0xC1));

        let verdict = standby.recv_checkpoint().unwrap();
        assert_eq!(verdict, CheckpointVerdict::Validated { pages: 1, checked: 1 });
        assert_eq!(standby.state(), SmcState::PrefetchDone);
        assert!(!standby.session().need_rollback());

        let report = standby.commit_checkpoint().unwrap();
        assert_eq!(report.epoch, 1);
        assert!(!report.rolled_back);

        let primary_report = primary_run.join().unwrap();
        assert_eq!(primary_report.epoch, 1);
        assert_eq!(primary_report.content_bytes_sent, 0);
        assert_eq!(primary_report.content_bytes_skipped, PAGE as u64);
    });

    assert_eq!(standby.state(), SmcState::RecvCheckpoint);
    assert!(standby.session().backups().is_empty());
    assert_eq!(standby.stats().summary().rollbacks, 0);
    assert_eq!(standby.memory().read(addr, PAGE as usize).unwrap(), page_of(0xC1));
    assert_eq!(
        standby.session().cache().peek(addr).unwrap().fingerprint,
        fingerprint(&page_of(0xC1))
    );
}

#[test]
fn test_changed_page_forces_rollback() {
    let (mut primary, mut standby) = replicator_pair(prefetch_all());
    let addr = page_addr(1);
    primary.memory().write(addr, &page_of(0xC1)).unwrap();
    standby.memory().write(addr, &page_of(0xAA)).unwrap();
    primary
        .mark_dirty(REGION, addr.offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();

    thread::scope(|s| {
        let primary_run = s.spawn(|| {
            primary.send_dirty_info().unwrap();
            primary.sync_src_ready_to_recv().unwrap();
            primary.serve_prefetch().unwrap();
            // The guest keeps running between prefetch and checkpoint.
            primary.memory().write(addr, &page_of(0xC2)).unwrap();
            primary.send_checkpoint().unwrap();
            primary.await_checkpoint_ack().unwrap()
        });

        standby.recv_dirty_info().unwrap();
        standby.sync_notice_dest_to_recv().unwrap();
        standby.run_prefetch().unwrap();
        assert_eq!(standby.session().backups().len(), 1);

        let verdict = standby.recv_checkpoint().unwrap();
        assert_eq!(verdict, CheckpointVerdict::Abandoned { pages: 1, page: addr });
        assert_eq!(standby.state(), SmcState::PrefetchAbandon);
        assert!(standby.session().need_rollback());

        assert_eq!(standby.rollback_with_prefetch().unwrap(), 1);
        assert!(standby.session().backups().is_empty());
        assert!(!standby.loadvm_need_check_prefetch());
        assert_eq!(standby.memory().read(addr, PAGE as usize).unwrap(), page_of(0xAA));

        let report = standby.commit_checkpoint().unwrap();
        assert!(report.rolled_back);

        let primary_report = primary_run.join().unwrap();
        assert!(primary_report.rolled_back);
        assert_eq!(primary_report.content_bytes_sent, 2 * PAGE as u64);
    });

    assert_eq!(standby.memory().read(addr, PAGE as usize).unwrap(), page_of(0xC2));
    let stats = standby.stats().summary();
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.pages_restored, 1);
    assert_eq!(stats.validation_misses, 1);
}

#[test]
fn test_multi_epoch_cache_skips_unchanged_pages() {
    let (mut primary, mut standby) = replicator_pair(PrefetchConfig::new(PolicyKind::None));

    for n in 0..4 {
        primary.memory().write(page_addr(n), &page_of(n as u8 + 1)).unwrap();
        primary
            .mark_dirty(REGION, page_addr(n).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
            .unwrap();
    }
    let (first, _) = run_epoch(&mut primary, &mut standby);
    assert_eq!(first.content_bytes_sent, 4 * PAGE as u64);
    assert_eq!(first.content_bytes_skipped, 0);

    // Page 0 is reported dirty but rewritten with the same bytes; page 1 changes.
    primary.memory().write(page_addr(0), &page_of(1)).unwrap();
    primary.memory().write(page_addr(1), &page_of(0x77)).unwrap();
    for n in 0..2 {
        primary
            .mark_dirty(REGION, page_addr(n).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
            .unwrap();
    }
    let (second, standby_report) = run_epoch(&mut primary, &mut standby);
    assert_eq!(second.epoch, 2);
    assert_eq!(second.content_bytes_sent, PAGE as u64);
    assert_eq!(second.content_bytes_skipped, PAGE as u64);
    assert!(!standby_report.rolled_back);

    for n in 0..4u64 {
        assert_eq!(
            standby.memory().read(page_addr(n), PAGE as usize).unwrap(),
            primary.memory().read(page_addr(n), PAGE as usize).unwrap(),
        );
    }
    assert_eq!(standby.session().cache().stats().cache_hits(), 1);
}

#[test]
fn test_diverged_standby_page_recovers_through_rollback() {
    let (mut primary, mut standby) = replicator_pair(PrefetchConfig::new(PolicyKind::None));
    primary.memory().write(page_addr(2), &page_of(9)).unwrap();
    primary
        .mark_dirty(REGION, page_addr(2).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();
    run_epoch(&mut primary, &mut standby);

    // Something scribbled on the standby copy after commit.
    standby.memory().write(page_addr(2), &page_of(0xEE)).unwrap();
    primary
        .mark_dirty(REGION, page_addr(2).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();
    let (report, standby_report) = run_epoch(&mut primary, &mut standby);

    assert!(report.rolled_back);
    assert!(standby_report.rolled_back);
    assert_eq!(standby.memory().read(page_addr(2), PAGE as usize).unwrap(), page_of(9));
}

#[test]
fn test_batched_prefetch_and_early_stop() {
    let prefetch = PrefetchConfig::new(PolicyKind::All).with_batch_pages(2);
    let (mut primary, mut standby) = replicator_pair(prefetch);
    for n in 0..5 {
        primary.memory().write(page_addr(n), &page_of(0x10 + n as u8)).unwrap();
        primary
            .mark_dirty(REGION, page_addr(n).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
            .unwrap();
    }

    thread::scope(|s| {
        let primary_run = s.spawn(|| primary.run_primary_epoch().unwrap());

        standby.recv_dirty_info().unwrap();
        standby.sync_notice_dest_to_recv().unwrap();
        assert_eq!(standby.prefetch_dirty_pages().unwrap(), 5);
        assert!(standby.prefetch_outstanding());
        assert_eq!(standby.recv_prefetch_info(true).unwrap(), 2);
        assert!(standby.prefetch_outstanding());
        // Stop after the second batch; the fifth page is never speculated.
        assert_eq!(standby.recv_prefetch_info(false).unwrap(), 2);
        assert!(!standby.prefetch_outstanding());
        assert_eq!(standby.session().prefetch().len(), 4);

        let verdict = standby.recv_checkpoint().unwrap();
        assert!(!verdict.is_abandoned());
        standby.commit_checkpoint().unwrap();

        let report = primary_run.join().unwrap();
        assert_eq!(report.prefetched, 4);
        assert_eq!(report.content_bytes_sent, PAGE as u64);
        assert_eq!(report.content_bytes_skipped, 4 * PAGE as u64);
    });

    for n in 0..5u64 {
        assert_eq!(
            standby.memory().read(page_addr(n), PAGE as usize).unwrap(),
            page_of(0x10 + n as u8)
        );
    }
}

#[test]
fn test_redirtied_and_next_epoch_pages() {
    let (mut primary, mut standby) = replicator_pair(prefetch_all());
    primary.memory().write(page_addr(3), &page_of(3)).unwrap();
    primary
        .mark_dirty(REGION, page_addr(3).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();
    primary
        .mark_dirty(REGION, page_addr(3).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();
    primary.mark_dirty(REGION, page_addr(4).offset(), PAGE, 0).unwrap();

    let (report, _) = run_epoch(&mut primary, &mut standby);
    assert_eq!(report.pages, 1);
    assert_eq!(report.prefetched, 1);

    // The page recorded for the next epoch is promoted into it.
    assert_eq!(primary.session().dirty_count(), 1);
    assert!(primary.session().dirty_pages()[0].in_checkpoint());
    assert_eq!(standby.session().dirty_count(), 0);
}

#[test]
fn test_send_failure_does_not_advance_state() {
    let (a, b) = ChannelTransport::pair();
    let mut primary = Replicator::with_parts(
        Role::Primary,
        a,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch_all(),
    );
    let mut standby = Replicator::with_parts(
        Role::Standby,
        FaultInjectionTransport::new(b),
        guest(),
        FingerprintCacheConfig::default(),
        prefetch_all(),
    );
    primary.memory().write(page_addr(0), &page_of(5)).unwrap();
    primary
        .mark_dirty(REGION, 0, PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();

    thread::scope(|s| {
        let primary_run = s.spawn(|| primary.run_primary_epoch().unwrap());

        standby.transport_mut().inject_recv_error();
        let err = standby.recv_dirty_info().unwrap_err();
        assert!(err.is_transport());
        assert_eq!(standby.state(), SmcState::RecvCheckpoint);
        standby.recv_dirty_info().unwrap();

        standby.transport_mut().inject_send_error_at(1);
        let err = standby.sync_notice_dest_to_recv().unwrap_err();
        assert!(matches!(err, SmcError::Transport(_)));
        assert_eq!(standby.state(), SmcState::RecvCheckpoint);
        assert!(!standby.session().is_poisoned());

        standby.sync_notice_dest_to_recv().unwrap();
        standby.run_prefetch().unwrap();
        assert!(!standby.recv_checkpoint().unwrap().is_abandoned());
        standby.commit_checkpoint().unwrap();

        primary_run.join().unwrap();
    });

    assert_eq!(standby.epoch(), 1);
    assert_eq!(standby.memory().read(page_addr(0), PAGE as usize).unwrap(), page_of(5));
}

#[test]
fn test_lost_ack_allows_commit_retry() {
    let (a, b) = ChannelTransport::pair();
    let mut primary = Replicator::with_parts(
        Role::Primary,
        a,
        guest(),
        FingerprintCacheConfig::default(),
        PrefetchConfig::new(PolicyKind::None),
    );
    let mut standby = Replicator::with_parts(
        Role::Standby,
        FaultInjectionTransport::new(b),
        guest(),
        FingerprintCacheConfig::default(),
        PrefetchConfig::new(PolicyKind::None),
    );
    primary.memory().write(page_addr(0), &page_of(8)).unwrap();
    primary
        .mark_dirty(REGION, 0, PAGE, DIRTY_FLAG_IN_CHECKPOINT)
        .unwrap();

    thread::scope(|s| {
        let primary_run = s.spawn(|| primary.run_primary_epoch().unwrap());

        standby.recv_dirty_info().unwrap();
        standby.sync_notice_dest_to_recv().unwrap();
        standby.run_prefetch().unwrap();
        standby.recv_checkpoint().unwrap();

        // Sends so far: SyncDestReady, empty PrefetchRequest. The ack is third.
        standby.transport_mut().inject_send_error_at(3);
        assert!(standby.commit_checkpoint().unwrap_err().is_transport());
        assert_eq!(standby.state(), SmcState::TransactionStart);
        assert_eq!(standby.epoch(), 0);

        let report = standby.commit_checkpoint().unwrap();
        assert_eq!(report.epoch, 1);
        primary_run.join().unwrap();
    });
}

#[test]
fn test_malformed_dirty_info_is_rejected_whole() {
    let (mut peer, b) = ChannelTransport::pair();
    let mut standby = Replicator::with_parts(
        Role::Standby,
        b,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch_all(),
    );

    let mut payload = encode_descriptors(&[DirtyPage::new(REGION, 0, PAGE, DIRTY_FLAG_IN_CHECKPOINT)]).to_vec();
    payload.push(0xFF);
    peer.send(&Frame::new(MessageKind::DirtyInfo, payload).encode().unwrap())
        .unwrap();

    assert!(matches!(
        standby.recv_dirty_info(),
        Err(SmcError::Format { len: 25, unit: 24, .. })
    ));
    assert_eq!(standby.session().dirty_count(), 0);
    assert_eq!(standby.state(), SmcState::RecvCheckpoint);
    assert!(!standby.session().is_poisoned());
}

#[test]
fn test_out_of_order_message() {
    let (mut peer, b) = ChannelTransport::pair();
    let mut standby = Replicator::with_parts(
        Role::Standby,
        b,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch_all(),
    );
    peer.send(&Frame::empty(MessageKind::SyncSrcReady).encode().unwrap())
        .unwrap();

    let err = standby.recv_dirty_info().unwrap_err();
    assert!(matches!(
        err,
        SmcError::UnexpectedMessage {
            expected: MessageKind::DirtyInfo,
            got: MessageKind::SyncSrcReady,
        }
    ));
    assert_eq!(
        err.to_string(),
        "unexpected message: expected DirtyInfo, got SyncSrcReady"
    );
}

#[test]
fn test_closed_channel_surfaces_as_transport_error() {
    let (peer, b) = ChannelTransport::pair();
    let mut standby = Replicator::with_parts(
        Role::Standby,
        b,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch_all(),
    );
    drop(peer);
    assert!(matches!(standby.recv_dirty_info(), Err(SmcError::ChannelClosed)));
    assert!(!standby.session().is_poisoned());
}

#[test]
fn test_contract_violation_poisons_replicator() {
    let (mut primary, _standby) = replicator_pair(prefetch_all());
    assert!(matches!(
        primary.recv_dirty_info(),
        Err(SmcError::InvariantViolation(_))
    ));
    assert!(primary.session().is_poisoned());
    assert!(matches!(primary.send_dirty_info(), Err(SmcError::SessionPoisoned)));
}

#[test]
fn test_checkpoint_before_prefetch_phase_is_violation() {
    let (_primary, mut standby) = replicator_pair(prefetch_all());
    assert!(matches!(
        standby.recv_checkpoint(),
        Err(SmcError::InvariantViolation(_))
    ));
    assert!(standby.session().is_poisoned());
}

#[test]
fn test_epoch_over_tcp_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let primary_ram = Arc::new(GuestMemory::with_regions(&[(REGION, REGION_SIZE)]));
    let standby_ram = Arc::new(GuestMemory::with_regions(&[(REGION, REGION_SIZE)]));
    primary_ram.write(page_addr(7), &page_of(0x42)).unwrap();

    thread::scope(|s| {
        let primary_ram = Arc::clone(&primary_ram);
        let primary_run = s.spawn(move || {
            let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            let mut primary = Replicator::with_parts(
                Role::Primary,
                StreamTransport::new(stream),
                primary_ram,
                FingerprintCacheConfig::default(),
                prefetch_all(),
            );
            primary
                .mark_dirty(REGION, page_addr(7).offset(), PAGE, DIRTY_FLAG_IN_CHECKPOINT)
                .unwrap();
            primary.run_primary_epoch().unwrap()
        });

        let (stream, _) = listener.accept().unwrap();
        let mut standby = Replicator::with_parts(
            Role::Standby,
            StreamTransport::new(stream),
            Arc::clone(&standby_ram),
            FingerprintCacheConfig::default(),
            prefetch_all(),
        );
        let report = standby.run_standby_epoch().unwrap();
        assert_eq!(report.prefetched, 1);
        assert!(!report.rolled_back);
        primary_run.join().unwrap();
    });

    assert_eq!(standby_ram.read(page_addr(7), PAGE as usize).unwrap(), page_of(0x42));
}

#[test]
fn test_unresolvable_prefetch_content_is_not_fatal() {
    let (mut peer, b) = ChannelTransport::pair();
    let mut standby = Replicator::with_parts(
        Role::Standby,
        b,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch_all(),
    );

    // Drive the standby by hand up to its first prefetch request.
    let far = DirtyPage::new(99, 0, PAGE, DIRTY_FLAG_IN_CHECKPOINT);
    peer.send(&Frame::new(MessageKind::DirtyInfo, encode_descriptors(&[far])).encode().unwrap())
        .unwrap();
    peer.send(&Frame::empty(MessageKind::SyncSrcReady).encode().unwrap())
        .unwrap();
    standby.recv_dirty_info().unwrap();
    standby.sync_notice_dest_to_recv().unwrap();
    standby.prefetch_dirty_pages().unwrap();

    let sync = Frame::decode(peer.recv().unwrap()).unwrap();
    assert_eq!(sync.kind, MessageKind::SyncDestReady);
    let request = Frame::decode(peer.recv().unwrap()).unwrap();
    assert_eq!(request.kind, MessageKind::PrefetchRequest);

    let mut builder = PagePayloadBuilder::new();
    builder
        .push(
            PageEntry {
                region_id: 99,
                region_offset: 0,
                size: PAGE,
                flags: 0,
                fingerprint: 0,
            },
            Some(&page_of(1)[..]),
        )
        .unwrap();
    peer.send(&Frame::new(MessageKind::PrefetchData, builder.finish()).encode().unwrap())
        .unwrap();

    assert!(matches!(
        standby.recv_prefetch_info(true),
        Err(SmcError::Unresolvable { region_id: 99, .. })
    ));
    assert!(!standby.session().is_poisoned());
}

fn page_entry(region_id: u64, n: u64, content: &[u8]) -> PageEntry {
    PageEntry {
        region_id,
        region_offset: n * PAGE as u64,
        size: PAGE,
        flags: 0,
        fingerprint: fingerprint(content),
    }
}

#[test]
fn test_interrupted_prefetch_batch_rolls_back() {
    let (mut peer, b) = ChannelTransport::pair();
    let mut standby = Replicator::with_parts(
        Role::Standby,
        b,
        guest(),
        FingerprintCacheConfig::default(),
        prefetch_all(),
    );
    standby.memory().write(page_addr(1), &page_of(0xAA)).unwrap();

    let dirty = [
        DirtyPage::new(REGION, PAGE as u64, PAGE, DIRTY_FLAG_IN_CHECKPOINT),
        DirtyPage::new(99, 0, PAGE, DIRTY_FLAG_IN_CHECKPOINT),
    ];
    peer.send(&Frame::new(MessageKind::DirtyInfo, encode_descriptors(&dirty)).encode().unwrap())
        .unwrap();
    peer.send(&Frame::empty(MessageKind::SyncSrcReady).encode().unwrap())
        .unwrap();
    standby.recv_dirty_info().unwrap();
    standby.sync_notice_dest_to_recv().unwrap();
    assert_eq!(standby.prefetch_dirty_pages().unwrap(), 2);
    assert_eq!(Frame::decode(peer.recv().unwrap()).unwrap().kind, MessageKind::SyncDestReady);
    assert_eq!(Frame::decode(peer.recv().unwrap()).unwrap().kind, MessageKind::PrefetchRequest);

    // The first page lands, the second cannot be resolved.
    let mut builder = PagePayloadBuilder::new();
    builder
        .push(page_entry(REGION, 1, &page_of(0x55)), Some(&page_of(0x55)[..]))
        .unwrap();
    builder
        .push(page_entry(99, 0, &page_of(0x66)), Some(&page_of(0x66)[..]))
        .unwrap();
    peer.send(&Frame::new(MessageKind::PrefetchData, builder.finish()).encode().unwrap())
        .unwrap();
    assert!(matches!(
        standby.recv_prefetch_info(true),
        Err(SmcError::Unresolvable { region_id: 99, .. })
    ));
    assert_eq!(standby.state(), SmcState::PrefetchStart);
    assert_eq!(standby.memory().read(page_addr(1), PAGE as usize).unwrap(), page_of(0x55));

    // Lean checkpoint the primary sends once released, then the full one.
    let mut lean = PagePayloadBuilder::new();
    lean.push(page_entry(REGION, 1, &page_of(0x77)), None).unwrap();
    peer.send(&Frame::new(MessageKind::CheckpointPayload, lean.finish()).encode().unwrap())
        .unwrap();
    let mut full = PagePayloadBuilder::new();
    full.push(page_entry(REGION, 1, &page_of(0x77)), Some(&page_of(0x77)[..]))
        .unwrap();
    peer.send(&Frame::new(MessageKind::CheckpointPayload, full.finish()).encode().unwrap())
        .unwrap();

    assert_eq!(standby.rollback_with_prefetch().unwrap(), 1);
    assert_eq!(standby.state(), SmcState::PrefetchAbandon);
    assert_eq!(standby.memory().read(page_addr(1), PAGE as usize).unwrap(), page_of(0xAA));
    assert!(standby.session().backups().is_empty());
    assert!(standby.session().prefetch().is_empty());
    assert!(!standby.session().is_poisoned());

    let release = Frame::decode(peer.recv().unwrap()).unwrap();
    assert_eq!(release.kind, MessageKind::PrefetchRequest);
    assert!(release.payload.is_empty());
    assert_eq!(Frame::decode(peer.recv().unwrap()).unwrap().kind, MessageKind::RollbackNotice);

    let report = standby.commit_checkpoint().unwrap();
    assert!(report.rolled_back);
    assert_eq!(standby.state(), SmcState::RecvCheckpoint);
    assert_eq!(standby.memory().read(page_addr(1), PAGE as usize).unwrap(), page_of(0x77));
    assert_eq!(Frame::decode(peer.recv().unwrap()).unwrap().kind, MessageKind::CheckpointAck);
}

fn run_epoch(
    primary: &mut Replicator<ChannelTransport, Arc<GuestMemory>>,
    standby: &mut Replicator<ChannelTransport, Arc<GuestMemory>>,
) -> (EpochReport, EpochReport) {
    thread::scope(|s| {
        let primary_run = s.spawn(|| primary.run_primary_epoch().unwrap());
        let standby_report = standby.run_standby_epoch().unwrap();
        (primary_run.join().unwrap(), standby_report)
    })
}

#[test]
fn test_config_constructors_and_teardown() {
    let config = SmcConfig::from_toml_str("[prefetch]\npolicy = \"none\"\n").unwrap();
    let (a, b) = ChannelTransport::pair();
    let primary = Replicator::primary(a, guest(), &config);
    let standby = Replicator::standby(b, guest(), &config);
    assert_eq!(primary.role(), Role::Primary);
    assert_eq!(standby.prefetch_config().policy, PolicyKind::None);
    assert!(standby.session().is_init());

    let (mut a, _) = primary.teardown();
    let (mut b, _) = standby.teardown();
    a.send(b"bye").unwrap();
    assert_eq!(&b.recv().unwrap()[..], b"bye");
}
