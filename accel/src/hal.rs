// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interfaces to the hardware-facing collaborators of the control plane.
//!
//! Everything behind these traits (register access, buffer mapping, firmware loading, power
//! sequencing) lives elsewhere. The lifecycle code only depends on the contracts below, so the
//! same logic drives real hardware and `mock::MockPlatform`.

use std::sync::Arc;
use std::time::Duration;

use resources::VdId;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Failure reported by a hardware collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HwError(pub String);

impl HwError {
    pub fn new(msg: impl Into<String>) -> HwError {
        HwError(msg.into())
    }
}

pub type HwResult<T> = std::result::Result<T, HwError>;

/// Handle to an isolation domain created by a `DomainProvider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainId(pub u32);

/// Handle to the per-VD application state the firmware keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FwAppHandle(pub u32);

/// Low-power state of a single core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LpmState {
    Active = 0,
    ClockGated = 1,
    PowerGatedRetention = 2,
    PowerGated = 3,
}

/// What the firmware last reported through a core's boot-mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStatus {
    Running,
    SuspendRequested,
    SuspendCompleted,
    ResumeRequested,
    ResumeCompleted,
}

/// Command payload handed to the firmware. Only the host side of the exchange is modelled, so the
/// buffer is described by its device address and never dereferenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Command {
    pub device_address: u64,
    pub size: u32,
    pub flags: u32,
}

/// Completion as it arrives from the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawResponse {
    pub seq: u64,
    pub status: u16,
    pub retval: u32,
}

pub trait Firmware: Send + Sync {
    /// Boots the firmware on `core`, which serves `virt_core` of `vd`.
    fn start(&self, core: usize, vd: VdId, virt_core: usize) -> HwResult<()>;
    fn stop(&self, core: usize, vd: VdId, virt_core: usize);
    /// Re-initializes a core after its power domain went through an off/on cycle.
    fn setup_hw_after_power_cycle(&self, core: usize) -> HwResult<()>;
    fn create_app(&self, vd: VdId, core_mask: u64) -> HwResult<FwAppHandle>;
    fn destroy_app(&self, app: FwAppHandle);
    /// Marks the boot mode as a suspend request and notifies the core.
    fn request_suspend(&self, core: usize);
    /// Marks the boot mode as a resume request.
    fn request_resume(&self, core: usize);
    fn boot_status(&self, core: usize) -> BootStatus;
}

pub trait DomainProvider: Send + Sync {
    fn create(&self) -> HwResult<DomainId>;
    fn attach(&self, domain: DomainId, core: usize) -> HwResult<()>;
    fn detach(&self, domain: DomainId, core: usize);
    fn destroy(&self, domain: DomainId);
}

pub trait ResourceMapper: Send + Sync {
    fn map_core_resources(&self, domain: DomainId, core: usize) -> HwResult<()>;
    fn unmap_core_resources(&self, domain: DomainId, core: usize);
    fn map_telemetry_buffers(&self, domain: DomainId, core: usize) -> HwResult<()>;
    fn unmap_telemetry_buffers(&self, domain: DomainId, core: usize);
}

/// The power domain shared by every core.
pub trait PowerDomain: Send + Sync {
    fn power_on(&self) -> HwResult<()>;
    fn power_off(&self) -> HwResult<()>;
    fn is_on(&self) -> bool;
    /// Counter bumped each time the domain is switched off and on again.
    fn switch_generation(&self) -> u64;
}

pub trait LowPowerStates: Send + Sync {
    fn state(&self, core: usize) -> LpmState;
    /// Waits up to `timeout` for `core` to leave `state`. Returns false on timeout.
    fn wait_until_not(&self, core: usize, state: LpmState, timeout: Duration) -> bool;
    /// Waits up to `timeout` for `core` to reach `state`. Returns false on timeout.
    fn wait_until(&self, core: usize, state: LpmState, timeout: Duration) -> bool;
    /// Holds `core` in reset.
    fn force_reset(&self, core: usize);
    fn set_active(&self, core: usize);
    /// Makes `state` the default low-power state of `core`.
    fn enable_state(&self, core: usize, state: LpmState);
    fn core_off(&self, core: usize);
}

/// Doorbell side of a core's mailbox.
pub trait MailboxTransport: Send + Sync {
    fn send(&self, core: usize, seq: u64, command: &Command) -> HwResult<()>;
}

/// The full set of collaborators an `AccelDevice` drives.
#[derive(Clone)]
pub struct Platform {
    pub firmware: Arc<dyn Firmware>,
    pub domains: Arc<dyn DomainProvider>,
    pub mapper: Arc<dyn ResourceMapper>,
    pub power: Arc<dyn PowerDomain>,
    pub lpm: Arc<dyn LowPowerStates>,
    pub transport: Arc<dyn MailboxTransport>,
}

impl Platform {
    /// Uses one object for every collaborator.
    pub fn from_single<T>(hw: Arc<T>) -> Platform
    where
        T: Firmware
            + DomainProvider
            + ResourceMapper
            + PowerDomain
            + LowPowerStates
            + MailboxTransport
            + 'static,
    {
        Platform {
            firmware: hw.clone(),
            domains: hw.clone(),
            mapper: hw.clone(),
            power: hw.clone(),
            lpm: hw.clone(),
            transport: hw,
        }
    }
}
