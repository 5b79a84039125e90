// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-memory stand-in for the accelerator hardware, for tests and the simulator.
//!
//! `MockPlatform` implements every collaborator trait. Cores behave like well-mannered firmware
//! by default: they park on a suspend request and report completion on resume. Individual cores
//! can be told to misbehave, and the calls the control plane makes are recorded for inspection.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use resources::VdId;
use sync::Mutex;

use crate::hal::BootStatus;
use crate::hal::Command;
use crate::hal::DomainId;
use crate::hal::DomainProvider;
use crate::hal::Firmware;
use crate::hal::FwAppHandle;
use crate::hal::HwError;
use crate::hal::HwResult;
use crate::hal::LowPowerStates;
use crate::hal::LpmState;
use crate::hal::MailboxTransport;
use crate::hal::Platform;
use crate::hal::PowerDomain;
use crate::hal::ResourceMapper;

/// A command the control plane handed to the doorbell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentCommand {
    pub core: usize,
    pub seq: u64,
    pub command: Command,
}

/// Ways a single core can be told to misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoreFault {
    /// Firmware start fails.
    FirmwareStart,
    /// Mapping the core's resources fails.
    MapResources,
    /// Attaching a domain to the core fails.
    Attach,
    /// The core never leaves the active state.
    StuckActive,
    /// Suspend requests are ignored entirely.
    IgnoreSuspend,
    /// The core reports suspend completion without ever reaching the parked state.
    SuspendStatusOnly,
    /// Resume requests are never acknowledged.
    IgnoreResume,
    /// Re-initialization after a power cycle fails.
    HwSetup,
}

#[derive(Default)]
struct MockState {
    faults: BTreeSet<(usize, CoreFault)>,
    lpm: Vec<LpmState>,
    boot: Vec<Option<BootStatus>>,
    powered: bool,
    fail_power_on: bool,
    fail_transport: bool,
    generation: u64,
    power_on_count: usize,
    power_off_count: usize,
    next_domain: u32,
    domain_create_budget: Option<usize>,
    live_domains: BTreeSet<u32>,
    attached: BTreeMap<usize, DomainId>,
    next_app: u32,
    live_apps: BTreeSet<u32>,
    fw_started: BTreeSet<usize>,
    mapped: BTreeSet<usize>,
    telemetry: BTreeSet<usize>,
    resets: Vec<usize>,
    core_offs: Vec<usize>,
    sent: Vec<SentCommand>,
    sink: Option<Sender<SentCommand>>,
}

pub struct MockPlatform {
    num_cores: usize,
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new(num_cores: usize) -> Arc<MockPlatform> {
        Arc::new(MockPlatform {
            num_cores,
            state: Mutex::new(MockState {
                lpm: vec![LpmState::PowerGated; num_cores],
                boot: vec![None; num_cores],
                ..Default::default()
            }),
        })
    }

    /// Wraps this mock as the full set of collaborators.
    pub fn platform(self: &Arc<Self>) -> Platform {
        Platform::from_single(self.clone())
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn inject(&self, core: usize, fault: CoreFault) {
        self.state.lock().faults.insert((core, fault));
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    pub fn fail_power_on(&self, fail: bool) {
        self.state.lock().fail_power_on = fail;
    }

    pub fn fail_transport(&self, fail: bool) {
        self.state.lock().fail_transport = fail;
    }

    /// Lets the next `count` domain creations succeed and fails every one after that.
    pub fn limit_domain_creation(&self, count: usize) {
        self.state.lock().domain_create_budget = Some(count);
    }

    /// Simulates the power domain going through an off/on cycle.
    pub fn power_cycle(&self) {
        self.state.lock().generation += 1;
    }

    /// Forwards every accepted command to `sink`, e.g. to a thread playing the firmware.
    pub fn set_command_sink(&self, sink: Sender<SentCommand>) {
        self.state.lock().sink = Some(sink);
    }

    pub fn clear_command_sink(&self) {
        self.state.lock().sink = None;
    }

    pub fn power_on_count(&self) -> usize {
        self.state.lock().power_on_count
    }

    pub fn power_off_count(&self) -> usize {
        self.state.lock().power_off_count
    }

    pub fn resets(&self) -> Vec<usize> {
        self.state.lock().resets.clone()
    }

    pub fn core_offs(&self) -> Vec<usize> {
        self.state.lock().core_offs.clone()
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.state.lock().sent.clone()
    }

    pub fn live_domains(&self) -> usize {
        self.state.lock().live_domains.len()
    }

    pub fn live_apps(&self) -> usize {
        self.state.lock().live_apps.len()
    }

    pub fn attached_cores(&self) -> Vec<usize> {
        self.state.lock().attached.keys().copied().collect()
    }

    pub fn started_cores(&self) -> Vec<usize> {
        self.state.lock().fw_started.iter().copied().collect()
    }

    pub fn mapped_cores(&self) -> Vec<usize> {
        self.state.lock().mapped.iter().copied().collect()
    }

    pub fn lpm_state(&self, core: usize) -> LpmState {
        self.state.lock().lpm[core]
    }

    fn fail(state: &MockState, core: usize, fault: CoreFault) -> bool {
        state.faults.contains(&(core, fault))
    }
}

impl Firmware for MockPlatform {
    fn start(&self, core: usize, _vd: VdId, _virt_core: usize) -> HwResult<()> {
        let mut state = self.state.lock();
        if Self::fail(&state, core, CoreFault::FirmwareStart) {
            return Err(HwError(format!("core {} firmware did not boot", core)));
        }
        state.fw_started.insert(core);
        state.lpm[core] = LpmState::Active;
        state.boot[core] = Some(BootStatus::Running);
        Ok(())
    }

    fn stop(&self, core: usize, _vd: VdId, _virt_core: usize) {
        let mut state = self.state.lock();
        state.fw_started.remove(&core);
        state.boot[core] = None;
    }

    fn setup_hw_after_power_cycle(&self, core: usize) -> HwResult<()> {
        let state = self.state.lock();
        if Self::fail(&state, core, CoreFault::HwSetup) {
            return Err(HwError(format!("core {} did not come back", core)));
        }
        Ok(())
    }

    fn create_app(&self, _vd: VdId, _core_mask: u64) -> HwResult<FwAppHandle> {
        let mut state = self.state.lock();
        state.next_app += 1;
        let id = state.next_app;
        state.live_apps.insert(id);
        Ok(FwAppHandle(id))
    }

    fn destroy_app(&self, app: FwAppHandle) {
        self.state.lock().live_apps.remove(&app.0);
    }

    fn request_suspend(&self, core: usize) {
        let mut state = self.state.lock();
        state.boot[core] = Some(BootStatus::SuspendRequested);
        if Self::fail(&state, core, CoreFault::IgnoreSuspend) {
            return;
        }
        state.boot[core] = Some(BootStatus::SuspendCompleted);
        if !Self::fail(&state, core, CoreFault::SuspendStatusOnly) {
            state.lpm[core] = LpmState::PowerGated;
        }
    }

    fn request_resume(&self, core: usize) {
        self.state.lock().boot[core] = Some(BootStatus::ResumeRequested);
    }

    fn boot_status(&self, core: usize) -> BootStatus {
        self.state.lock().boot[core].unwrap_or(BootStatus::Running)
    }
}

impl DomainProvider for MockPlatform {
    fn create(&self) -> HwResult<DomainId> {
        let mut state = self.state.lock();
        if let Some(budget) = state.domain_create_budget.as_mut() {
            if *budget == 0 {
                return Err(HwError::new("out of isolation domains"));
            }
            *budget -= 1;
        }
        state.next_domain += 1;
        let id = state.next_domain;
        state.live_domains.insert(id);
        Ok(DomainId(id))
    }

    fn attach(&self, domain: DomainId, core: usize) -> HwResult<()> {
        let mut state = self.state.lock();
        if Self::fail(&state, core, CoreFault::Attach) {
            return Err(HwError(format!("cannot attach core {}", core)));
        }
        state.attached.insert(core, domain);
        Ok(())
    }

    fn detach(&self, _domain: DomainId, core: usize) {
        self.state.lock().attached.remove(&core);
    }

    fn destroy(&self, domain: DomainId) {
        self.state.lock().live_domains.remove(&domain.0);
    }
}

impl ResourceMapper for MockPlatform {
    fn map_core_resources(&self, _domain: DomainId, core: usize) -> HwResult<()> {
        let mut state = self.state.lock();
        if Self::fail(&state, core, CoreFault::MapResources) {
            return Err(HwError(format!("cannot map resources of core {}", core)));
        }
        state.mapped.insert(core);
        Ok(())
    }

    fn unmap_core_resources(&self, _domain: DomainId, core: usize) {
        self.state.lock().mapped.remove(&core);
    }

    fn map_telemetry_buffers(&self, _domain: DomainId, core: usize) -> HwResult<()> {
        self.state.lock().telemetry.insert(core);
        Ok(())
    }

    fn unmap_telemetry_buffers(&self, _domain: DomainId, core: usize) {
        self.state.lock().telemetry.remove(&core);
    }
}

impl PowerDomain for MockPlatform {
    fn power_on(&self) -> HwResult<()> {
        let mut state = self.state.lock();
        if state.fail_power_on {
            return Err(HwError::new("power rail did not come up"));
        }
        state.powered = true;
        state.power_on_count += 1;
        Ok(())
    }

    fn power_off(&self) -> HwResult<()> {
        let mut state = self.state.lock();
        state.powered = false;
        state.power_off_count += 1;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.state.lock().powered
    }

    fn switch_generation(&self) -> u64 {
        self.state.lock().generation
    }
}

impl LowPowerStates for MockPlatform {
    fn state(&self, core: usize) -> LpmState {
        self.state.lock().lpm[core]
    }

    fn wait_until_not(&self, core: usize, state: LpmState, _timeout: Duration) -> bool {
        let mut s = self.state.lock();
        if Self::fail(&s, core, CoreFault::StuckActive) {
            return state != LpmState::Active;
        }
        // Firmware idles between commands.
        if s.lpm[core] == LpmState::Active && state == LpmState::Active {
            s.lpm[core] = LpmState::ClockGated;
        }
        s.lpm[core] != state
    }

    fn wait_until(&self, core: usize, state: LpmState, _timeout: Duration) -> bool {
        self.state.lock().lpm[core] == state
    }

    fn force_reset(&self, core: usize) {
        let mut state = self.state.lock();
        state.resets.push(core);
        state.lpm[core] = LpmState::PowerGated;
    }

    fn set_active(&self, core: usize) {
        let mut state = self.state.lock();
        state.lpm[core] = LpmState::Active;
        if state.boot[core] == Some(BootStatus::ResumeRequested)
            && !Self::fail(&state, core, CoreFault::IgnoreResume)
        {
            state.boot[core] = Some(BootStatus::ResumeCompleted);
        }
    }

    fn enable_state(&self, _core: usize, _state: LpmState) {}

    fn core_off(&self, core: usize) {
        let mut state = self.state.lock();
        state.core_offs.push(core);
        state.lpm[core] = LpmState::PowerGated;
    }
}

impl MailboxTransport for MockPlatform {
    fn send(&self, core: usize, seq: u64, command: &Command) -> HwResult<()> {
        let mut state = self.state.lock();
        if state.fail_transport {
            return Err(HwError(format!("doorbell of core {} is stuck", core)));
        }
        let sent = SentCommand {
            core,
            seq,
            command: *command,
        };
        state.sent.push(sent);
        if let Some(sink) = state.sink.as_ref() {
            // A consumer that went away just stops answering.
            let _ = sink.send(sent);
        }
        Ok(())
    }
}
