// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use accel::hal::Command;
use accel::hal::RawResponse;
use accel::mailbox::MailboxResponse;
use accel::mailbox::ResponseStatus;
use accel::mailbox::RESP_OK;
use accel::mock::MockPlatform;
use accel::AccelDevice;
use accel::DeviceConfig;
use accel::Error;
use accel::VirtualDevice;
use base::TimerQueue;

struct Fixture {
    hw: Arc<MockPlatform>,
    dev: Arc<AccelDevice>,
    timers: Arc<TimerQueue>,
}

fn setup(num_cores: usize) -> Fixture {
    base::syslog::test_only_ensure_inited();
    let hw = MockPlatform::new(num_cores);
    let timers = Arc::new(TimerQueue::new_manual());
    let cfg = DeviceConfig {
        num_cores,
        ..Default::default()
    };
    let dev = AccelDevice::with_timers(cfg, hw.platform(), timers.clone()).unwrap();
    Fixture { hw, dev, timers }
}

fn running_vd(f: &Fixture, num_cores: usize) -> VirtualDevice {
    let mut vd = f.dev.allocate_vd(num_cores).unwrap();
    f.dev.start_vd(&mut vd).unwrap();
    vd
}

fn ok(seq: u64, retval: u32) -> RawResponse {
    RawResponse {
        seq,
        status: RESP_OK,
        retval,
    }
}

fn past_timeout() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

#[test]
fn end_to_end() {
    let f = setup(4);
    let vd = running_vd(&f, 2);
    let seq = f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    assert_eq!(seq, 1);

    let core = f.dev.virt_to_phys(&vd, 0).unwrap();
    assert_eq!(f.dev.deliver_responses(core, &[ok(1, 42)]), 1);
    assert_eq!(
        f.dev.mailbox_response(&vd, 0).unwrap(),
        MailboxResponse {
            sequence_number: 1,
            status: ResponseStatus::Ok,
            retval: 42,
        }
    );
    assert_eq!(f.timers.pending(), 0);
}

#[test]
fn command_payload_reaches_transport() {
    let f = setup(4);
    let mut other = running_vd(&f, 1);
    let vd = running_vd(&f, 2);
    let cmd = Command {
        device_address: 0x1000,
        size: 64,
        flags: 3,
    };
    f.dev.mailbox_command(&vd, 1, &cmd).unwrap();
    let sent = f.hw.sent();
    assert_eq!(sent.len(), 1);
    // Virtual core 1 of the second VD is physical core 2.
    assert_eq!(sent[0].core, 2);
    assert_eq!(sent[0].seq, 1);
    assert_eq!(sent[0].command, cmd);
    f.dev.stop_vd(&mut other);
}

#[test]
fn command_rejected_without_running_firmware() {
    let f = setup(4);
    let mut vd = f.dev.allocate_vd(2).unwrap();
    assert!(matches!(
        f.dev.mailbox_command(&vd, 0, &Command::default()),
        Err(Error::InvalidState(_))
    ));
    f.dev.start_vd(&mut vd).unwrap();
    assert!(matches!(
        f.dev.mailbox_command(&vd, 2, &Command::default()),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        f.dev.mailbox_response(&vd, 5),
        Err(Error::InvalidArgument(_))
    ));
    assert!(f.hw.sent().is_empty());
}

#[test]
fn sequence_numbers_strictly_increase() {
    let f = setup(1);
    let vd = Arc::new(running_vd(&f, 1));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dev = f.dev.clone();
            let vd = vd.clone();
            thread::spawn(move || {
                (0..25)
                    .map(|_| dev.mailbox_command(&vd, 0, &Command::default()).unwrap())
                    .collect::<Vec<u64>>()
            })
        })
        .collect();
    let mut all = BTreeSet::new();
    for h in handles {
        let seqs = h.join().unwrap();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        for seq in seqs {
            assert!(all.insert(seq), "sequence number {} issued twice", seq);
        }
    }
    assert_eq!(all, (1..=100).collect());
    let sent: Vec<u64> = f.hw.sent().iter().map(|c| c.seq).collect();
    assert_eq!(sent, (1..=100).collect::<Vec<u64>>());
}

#[test]
fn timeout_delivers_cancelled_and_late_completion_is_dropped() {
    let f = setup(2);
    let vd = running_vd(&f, 1);
    let seq = f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    assert_eq!(f.timers.fire_expired(past_timeout()), 1);
    assert_eq!(f.dev.deliver_responses(0, &[ok(seq, 5)]), 0);

    let resp = f.dev.mailbox_response(&vd, 0).unwrap();
    assert_eq!(resp.sequence_number, seq);
    assert_eq!(resp.status, ResponseStatus::Cancelled);
    assert_eq!(vd.queued_responses(0), 0);
}

#[test]
fn completion_and_timeout_race() {
    let f = setup(1);
    let vd = running_vd(&f, 1);
    for _ in 0..200 {
        let seq = f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
        let timers = f.timers.clone();
        let dev = f.dev.clone();
        let timeout = thread::spawn(move || timers.fire_expired(past_timeout()));
        let completion = thread::spawn(move || dev.deliver_responses(0, &[ok(seq, 9)]));
        let fired = timeout.join().unwrap();
        let delivered = completion.join().unwrap();
        // The timer may fire and lose the race, but only one side finalizes.
        assert!(fired <= 1);

        let resp = f.dev.mailbox_response(&vd, 0).unwrap();
        assert_eq!(resp.sequence_number, seq);
        match resp.status {
            ResponseStatus::Ok => {
                assert_eq!(delivered, 1);
                assert_eq!(resp.retval, 9);
            }
            ResponseStatus::Cancelled => assert_eq!(delivered, 0),
            ResponseStatus::InternalError => panic!("entry finalized with a bad status"),
        }
        assert_eq!(vd.queued_responses(0), 0);
    }
    assert_eq!(f.dev.status().pending_commands, 0);
}

#[test]
fn each_waiter_gets_a_distinct_entry() {
    const K: usize = 8;
    let f = setup(2);
    let vd = Arc::new(running_vd(&f, 2));
    let waiters: Vec<_> = (0..K)
        .map(|_| {
            let dev = f.dev.clone();
            let vd = vd.clone();
            thread::spawn(move || dev.mailbox_response(&vd, 1).unwrap())
        })
        .collect();

    let seqs: Vec<u64> = (0..K)
        .map(|_| f.dev.mailbox_command(&vd, 1, &Command::default()).unwrap())
        .collect();
    let core = f.dev.virt_to_phys(&vd, 1).unwrap();
    let responses: Vec<RawResponse> = seqs.iter().map(|&s| ok(s, s as u32 * 10)).collect();
    assert_eq!(f.dev.deliver_responses(core, &responses), K);

    let mut got = BTreeSet::new();
    for w in waiters {
        let resp = w.join().unwrap();
        assert_eq!(resp.status, ResponseStatus::Ok);
        assert_eq!(resp.retval, resp.sequence_number as u32 * 10);
        assert!(got.insert(resp.sequence_number));
    }
    assert_eq!(got, seqs.into_iter().collect());
}

#[test]
fn responses_keep_arrival_order() {
    let f = setup(1);
    let vd = running_vd(&f, 1);
    for _ in 0..3 {
        f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    }
    f.dev.deliver_responses(0, &[ok(3, 0), ok(1, 0), ok(2, 0)]);
    let order: Vec<u64> = (0..3)
        .map(|_| f.dev.mailbox_response(&vd, 0).unwrap().sequence_number)
        .collect();
    assert_eq!(order, vec![3, 1, 2]);
}

#[test]
fn unknown_status_is_internal_error() {
    let f = setup(1);
    let vd = running_vd(&f, 1);
    let seq = f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    f.dev.deliver_responses(
        0,
        &[RawResponse {
            seq,
            status: 77,
            retval: 1,
        }],
    );
    let resp = f.dev.mailbox_response(&vd, 0).unwrap();
    assert_eq!(resp.status, ResponseStatus::InternalError);
    assert_eq!(resp.retval, 0);
}

#[test]
fn stop_cancels_outstanding_commands() {
    let f = setup(2);
    let mut vd = running_vd(&f, 2);
    f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    f.dev.mailbox_command(&vd, 1, &Command::default()).unwrap();
    assert_eq!(f.dev.status().pending_commands, 2);

    f.dev.stop_vd(&mut vd);
    assert_eq!(f.dev.status().pending_commands, 0);
    assert_eq!(f.timers.fire_expired(past_timeout()), 0);
    for virt_core in 0..2 {
        let resp = f.dev.try_mailbox_response(&vd, virt_core).unwrap().unwrap();
        assert_eq!(resp.status, ResponseStatus::Cancelled);
    }
    f.dev.release_vd(vd);
}

#[test]
fn transport_failure_consumes_no_sequence_number() {
    let f = setup(1);
    let vd = running_vd(&f, 1);
    f.hw.fail_transport(true);
    assert!(matches!(
        f.dev.mailbox_command(&vd, 0, &Command::default()),
        Err(Error::Transport(_))
    ));
    assert_eq!(f.dev.status().pending_commands, 0);
    assert_eq!(f.timers.pending(), 0);
    f.hw.fail_transport(false);
    assert_eq!(
        f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap(),
        1
    );
}

#[test]
fn real_timer_thread_times_out() {
    base::syslog::test_only_ensure_inited();
    let hw = MockPlatform::new(1);
    let cfg = DeviceConfig {
        num_cores: 1,
        mailbox_timeout_ms: 10,
        ..Default::default()
    };
    let dev = AccelDevice::new(cfg, hw.platform()).unwrap();
    let mut vd = dev.allocate_vd(1).unwrap();
    dev.start_vd(&mut vd).unwrap();
    let seq = dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    let resp = dev.mailbox_response(&vd, 0).unwrap();
    assert_eq!(resp.sequence_number, seq);
    assert_eq!(resp.status, ResponseStatus::Cancelled);
    dev.release_vd(vd);
}

#[test]
fn release_drains_uncollected_responses() {
    let f = setup(1);
    let vd = running_vd(&f, 1);
    let done = f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    assert_eq!(f.dev.deliver_responses(0, &[ok(done, 1)]), 1);
    assert_eq!(f.timers.fire_expired(past_timeout()), 1);
    // Still in flight when the VD goes away.
    f.dev.mailbox_command(&vd, 0, &Command::default()).unwrap();
    assert_eq!(vd.queued_responses(0), 2);
    assert_eq!(f.timers.pending(), 1);

    f.dev.release_vd(vd);
    assert_eq!(f.timers.pending(), 0);
    assert_eq!(f.timers.fire_expired(past_timeout()), 0);
    let status = f.dev.status();
    assert_eq!(status.pending_commands, 0);
    assert_eq!(status.free_cores, 1);
    assert_eq!(f.hw.live_domains(), 0);
}
