// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use accel::mock::CoreFault;
use accel::mock::MockPlatform;
use accel::AccelDevice;
use accel::CoreFailure;
use accel::DeviceConfig;
use accel::Error;
use accel::VdState;
use base::TimerQueue;

fn setup(num_cores: usize) -> (Arc<MockPlatform>, Arc<AccelDevice>) {
    base::syslog::test_only_ensure_inited();
    let hw = MockPlatform::new(num_cores);
    let cfg = DeviceConfig {
        num_cores,
        resume_poll_iterations: 3,
        resume_poll_delay_us: 1,
        ..Default::default()
    };
    let dev =
        AccelDevice::with_timers(cfg, hw.platform(), Arc::new(TimerQueue::new_manual())).unwrap();
    (hw, dev)
}

fn assert_pool_consistent(dev: &AccelDevice, num_cores: usize) {
    let status = dev.status();
    assert_eq!(status.owners.len(), num_cores);
    assert_eq!(
        status.free_cores,
        status.owners.iter().filter(|o| o.is_none()).count()
    );
}

#[test]
fn allocate_more_than_pool() {
    let (hw, dev) = setup(4);
    assert!(matches!(
        dev.allocate_vd(5),
        Err(Error::InsufficientResources {
            requested: 5,
            available: 4
        })
    ));
    assert_eq!(dev.free_cores(), 4);
    assert_eq!(hw.live_domains(), 0);
}

#[test]
fn allocate_zero_is_invalid() {
    let (_hw, dev) = setup(4);
    assert!(matches!(dev.allocate_vd(0), Err(Error::InvalidArgument(_))));
}

#[test]
fn allocate_rolls_back_domains() {
    let (hw, dev) = setup(4);
    hw.limit_domain_creation(2);
    assert!(matches!(dev.allocate_vd(3), Err(Error::AllocationFailed(_))));
    assert_eq!(hw.live_domains(), 0);
}

#[test]
fn allocate_binds_nothing() {
    let (hw, dev) = setup(4);
    let vd = dev.allocate_vd(2).unwrap();
    assert_eq!(vd.state(), VdState::Off);
    assert_eq!(vd.num_cores(), 2);
    assert_eq!(dev.free_cores(), 4);
    assert_eq!(hw.live_domains(), 2);
    dev.release_vd(vd);
    assert_eq!(hw.live_domains(), 0);
}

#[test]
fn start_takes_lowest_free_cores() {
    let (hw, dev) = setup(4);
    let mut a = dev.allocate_vd(1).unwrap();
    let mut b = dev.allocate_vd(2).unwrap();
    dev.start_vd(&mut a).unwrap();
    dev.start_vd(&mut b).unwrap();

    assert_eq!(dev.cores_of(&a), vec![0]);
    assert_eq!(dev.cores_of(&b), vec![1, 2]);
    assert_eq!(b.state(), VdState::Running);
    assert_eq!(dev.virt_to_phys(&b, 1), Some(2));
    assert_eq!(dev.phys_to_virt(&b, 1), Some(0));
    assert_eq!(dev.virt_mask_to_phys_mask(&b, 0b11), 0b110);
    assert_eq!(dev.virt_mask_to_phys_mask(&b, 0b100), 0);
    assert_eq!(hw.started_cores(), vec![0, 1, 2]);
    assert!(dev.is_fw_running(2));
    assert!(!dev.is_fw_running(3));
    assert_pool_consistent(&dev, 4);
}

#[test]
fn start_busy_leaves_no_binding() {
    let (_hw, dev) = setup(4);
    let mut a = dev.allocate_vd(3).unwrap();
    let mut b = dev.allocate_vd(3).unwrap();
    dev.start_vd(&mut a).unwrap();
    assert!(matches!(dev.start_vd(&mut b), Err(Error::Busy(_))));
    assert_eq!(b.state(), VdState::Off);
    assert!(dev.cores_of(&b).is_empty());
    assert_eq!(dev.free_cores(), 1);
}

#[test]
fn start_failure_frees_every_core() {
    let (hw, dev) = setup(4);
    hw.inject(2, CoreFault::FirmwareStart);
    let mut vd = dev.allocate_vd(3).unwrap();
    match dev.start_vd(&mut vd) {
        Err(Error::FirmwareStartFailed { core, .. }) => assert_eq!(core, 2),
        other => panic!("unexpected start result {:?}", other),
    }
    assert_eq!(vd.state(), VdState::Off);
    assert_eq!(dev.free_cores(), 4);
    assert!(hw.attached_cores().is_empty());
    assert!(hw.mapped_cores().is_empty());
    assert!(hw.started_cores().is_empty());
    assert_eq!(hw.live_apps(), 0);
    assert_eq!(dev.status().fw_running_mask, 0);

    // Nothing is left behind that would stop a clean retry.
    hw.clear_faults();
    dev.start_vd(&mut vd).unwrap();
    assert_eq!(dev.cores_of(&vd), vec![0, 1, 2]);
}

#[test]
fn map_failure_unwinds_partial_core() {
    let (hw, dev) = setup(2);
    hw.inject(1, CoreFault::MapResources);
    let mut vd = dev.allocate_vd(2).unwrap();
    assert!(matches!(
        dev.start_vd(&mut vd),
        Err(Error::FirmwareStartFailed { core: 1, .. })
    ));
    assert_eq!(dev.free_cores(), 2);
    assert!(hw.attached_cores().is_empty());
}

#[test]
fn stop_returns_cores_and_is_idempotent() {
    let (hw, dev) = setup(4);
    dev.wakelock().acquire().unwrap();
    let mut vd = dev.allocate_vd(2).unwrap();
    dev.start_vd(&mut vd).unwrap();
    dev.stop_vd(&mut vd);
    assert_eq!(vd.state(), VdState::Off);
    assert_eq!(dev.free_cores(), 4);
    // Running cores are not parked, so they are forced into reset.
    assert_eq!(hw.resets(), vec![0, 1]);
    assert_eq!(hw.live_apps(), 0);

    dev.stop_vd(&mut vd);
    assert_eq!(hw.resets(), vec![0, 1]);
    assert_eq!(dev.free_cores(), 4);
}

#[test]
fn release_stops_bound_vd() {
    let (hw, dev) = setup(4);
    let mut vd = dev.allocate_vd(4).unwrap();
    dev.start_vd(&mut vd).unwrap();
    dev.release_vd(vd);
    assert_eq!(dev.free_cores(), 4);
    assert_eq!(hw.live_domains(), 0);
    assert!(hw.started_cores().is_empty());
}

#[test]
fn cores_never_owned_twice() {
    let (_hw, dev) = setup(4);
    let mut vds = Vec::new();
    for round in 0..20usize {
        let want = round % 3 + 1;
        if let Ok(mut vd) = dev.allocate_vd(want) {
            if dev.start_vd(&mut vd).is_ok() {
                vds.push(vd);
            } else {
                dev.release_vd(vd);
            }
        }
        if round % 2 == 1 && !vds.is_empty() {
            let vd = vds.remove(0);
            dev.release_vd(vd);
        }

        let mut seen = [false; 4];
        for vd in &vds {
            for core in dev.cores_of(vd) {
                assert!(!seen[core], "core {} owned twice", core);
                seen[core] = true;
                assert_eq!(dev.core_owner(core), Some(vd.id()));
            }
        }
        assert_pool_consistent(&dev, 4);
    }
    for vd in vds {
        dev.release_vd(vd);
    }
    assert_eq!(dev.free_cores(), 4);
}

#[test]
fn suspend_resume_keeps_membership() {
    let (hw, dev) = setup(4);
    let mut other = dev.allocate_vd(1).unwrap();
    let mut vd = dev.allocate_vd(2).unwrap();
    dev.start_vd(&mut other).unwrap();
    dev.start_vd(&mut vd).unwrap();
    let cores = dev.cores_of(&vd);

    dev.suspend_vd(&mut vd).unwrap();
    assert_eq!(vd.state(), VdState::Suspended);
    assert_eq!(hw.attached_cores(), vec![0]);
    assert!(matches!(dev.suspend_vd(&mut vd), Err(Error::AlreadySuspended)));

    dev.resume_vd(&mut vd).unwrap();
    assert_eq!(vd.state(), VdState::Running);
    assert_eq!(dev.cores_of(&vd), cores);
    assert_eq!(hw.attached_cores(), vec![0, 1, 2]);
    assert!(matches!(dev.resume_vd(&mut vd), Err(Error::NotSuspended)));
    assert!(hw.core_offs().is_empty());
}

#[test]
fn suspend_accepts_completed_status() {
    let (hw, dev) = setup(2);
    hw.inject(1, CoreFault::SuspendStatusOnly);
    let mut vd = dev.allocate_vd(2).unwrap();
    dev.start_vd(&mut vd).unwrap();
    dev.suspend_vd(&mut vd).unwrap();
    assert_eq!(vd.state(), VdState::Suspended);
}

#[test]
fn suspend_failure_names_every_core() {
    let (hw, dev) = setup(4);
    hw.inject(0, CoreFault::StuckActive);
    hw.inject(2, CoreFault::IgnoreSuspend);
    let mut vd = dev.allocate_vd(3).unwrap();
    dev.start_vd(&mut vd).unwrap();

    match dev.suspend_vd(&mut vd) {
        Err(Error::CoresFailed(failures)) => {
            assert_eq!(failures.cores().collect::<Vec<_>>(), vec![0, 2]);
            assert_eq!(failures.0[&0], CoreFailure::StuckActive);
            assert_eq!(failures.0[&2], CoreFailure::SuspendTimeout);
        }
        other => panic!("unexpected suspend result {:?}", other),
    }
    assert_eq!(vd.state(), VdState::Unavailable);
    assert_eq!(hw.core_offs(), vec![0, 1, 2]);
    assert_eq!(hw.resets(), vec![0, 2]);
    // Every domain was detached, including the healthy core's.
    assert!(hw.attached_cores().is_empty());

    // Unavailable devices are only good for stopping and releasing.
    assert!(matches!(
        dev.start_vd(&mut vd),
        Err(Error::InvalidState(VdState::Unavailable))
    ));
    assert!(matches!(dev.resume_vd(&mut vd), Err(Error::NotSuspended)));
    dev.stop_vd(&mut vd);
    assert_eq!(vd.state(), VdState::Unavailable);
    assert_eq!(dev.free_cores(), 4);
    dev.release_vd(vd);
}

#[test]
fn resume_reinitializes_after_power_cycle() {
    let (hw, dev) = setup(2);
    let mut vd = dev.allocate_vd(2).unwrap();
    dev.start_vd(&mut vd).unwrap();
    dev.suspend_vd(&mut vd).unwrap();
    hw.power_cycle();
    hw.inject(1, CoreFault::HwSetup);

    match dev.resume_vd(&mut vd) {
        Err(Error::CoresFailed(failures)) => {
            assert_eq!(failures.cores().collect::<Vec<_>>(), vec![1]);
            assert!(matches!(failures.0[&1], CoreFailure::HwSetup(_)));
        }
        other => panic!("unexpected resume result {:?}", other),
    }
    assert_eq!(vd.state(), VdState::Unavailable);
    assert!(hw.attached_cores().is_empty());
    assert_eq!(hw.core_offs(), vec![0, 1]);
}

#[test]
fn resume_without_power_cycle_skips_setup() {
    let (hw, dev) = setup(2);
    hw.inject(0, CoreFault::HwSetup);
    let mut vd = dev.allocate_vd(2).unwrap();
    dev.start_vd(&mut vd).unwrap();
    dev.suspend_vd(&mut vd).unwrap();
    dev.resume_vd(&mut vd).unwrap();
    assert_eq!(vd.state(), VdState::Running);
}

#[test]
fn resume_timeout_marks_unavailable() {
    let (hw, dev) = setup(2);
    hw.inject(0, CoreFault::IgnoreResume);
    let mut vd = dev.allocate_vd(2).unwrap();
    dev.start_vd(&mut vd).unwrap();
    dev.suspend_vd(&mut vd).unwrap();
    match dev.resume_vd(&mut vd) {
        Err(Error::CoresFailed(failures)) => {
            assert_eq!(failures.0.len(), 1);
            assert_eq!(failures.0[&0], CoreFailure::ResumeTimeout);
        }
        other => panic!("unexpected resume result {:?}", other),
    }
    assert_eq!(vd.state(), VdState::Unavailable);
}

#[test]
fn suspend_requires_running() {
    let (_hw, dev) = setup(2);
    let mut vd = dev.allocate_vd(1).unwrap();
    assert!(matches!(
        dev.suspend_vd(&mut vd),
        Err(Error::InvalidState(VdState::Off))
    ));
}
