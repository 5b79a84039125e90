// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! State transitions of a virtual device.
//!
//! Every function here runs with the core table write lock held by the caller, so transitions of
//! different VDs never interleave. Multi-core loops keep going past a failing core and record
//! each core's outcome; whether the whole operation failed is decided afterwards by `aggregate`.

use std::collections::BTreeMap;
use std::thread;

use base::error;
use base::info;
use base::warn;

use crate::error::BusyReason;
use crate::error::CoreFailure;
use crate::error::CoreFailures;
use crate::hal::BootStatus;
use crate::hal::LpmState;
use crate::manager::CoreTable;
use crate::virtual_device::VdState;
use crate::AccelDevice;
use crate::Error;
use crate::Result;
use crate::VirtualDevice;

type CoreResults = BTreeMap<usize, std::result::Result<(), CoreFailure>>;

/// Collects the failed cores out of a per-core result map.
fn aggregate(results: &CoreResults) -> std::result::Result<(), CoreFailures> {
    let failed: BTreeMap<usize, CoreFailure> = results
        .iter()
        .filter_map(|(&core, r)| r.as_ref().err().map(|f| (core, f.clone())))
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CoreFailures(failed))
    }
}

// How far a core got while being brought up. Later stages imply the earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Bound,
    Attached,
    ResourcesMapped,
    TelemetryMapped,
}

impl AccelDevice {
    pub(crate) fn start_locked(&self, table: &mut CoreTable, vd: &mut VirtualDevice) -> Result<()> {
        if vd.state != VdState::Off {
            return Err(Error::InvalidState(vd.state));
        }
        let cores = table.pool.find_free(vd.num_cores).map_err(|_| {
            Error::Busy(BusyReason::Cores {
                requested: vd.num_cores,
                available: table.pool.free_count(),
            })
        })?;
        let core_mask = cores.iter().fold(0u64, |mask, core| mask | (1 << core));
        let app = self
            .platform
            .firmware
            .create_app(vd.id, core_mask)
            .map_err(Error::FirmwareApp)?;
        vd.fw_app = Some(app);

        // Cores are bound in ascending order, so the i-th one is virtual core i.
        for (virt_core, &core) in cores.iter().enumerate() {
            if let Err(e) = self.bring_up_core(table, vd, core, virt_core) {
                error!("{}: failed to start core {}: {}", vd.id, core, e);
                self.stop_locked(table, vd);
                return Err(e);
            }
        }
        vd.state = VdState::Running;
        info!("{}: running on cores {:?}", vd.id, cores);
        Ok(())
    }

    fn bring_up_core(
        &self,
        table: &mut CoreTable,
        vd: &mut VirtualDevice,
        core: usize,
        virt_core: usize,
    ) -> Result<()> {
        let p = &self.platform;
        let domain = vd.domains[virt_core];
        table.pool.bind(core, vd.id).map_err(Error::Pool)?;

        let mut reached = Stage::Bound;
        let result = p
            .domains
            .attach(domain, core)
            .and_then(|()| {
                reached = Stage::Attached;
                vd.attached[virt_core] = true;
                p.mapper.map_core_resources(domain, core)
            })
            .and_then(|()| {
                reached = Stage::ResourcesMapped;
                p.mapper.map_telemetry_buffers(domain, core)
            })
            .and_then(|()| {
                reached = Stage::TelemetryMapped;
                p.firmware.start(core, vd.id, virt_core)
            });

        match result {
            Ok(()) => {
                table.fw_running |= 1 << core;
                Ok(())
            }
            Err(source) => {
                if reached >= Stage::TelemetryMapped {
                    p.mapper.unmap_telemetry_buffers(domain, core);
                }
                if reached >= Stage::ResourcesMapped {
                    p.mapper.unmap_core_resources(domain, core);
                }
                if reached >= Stage::Attached {
                    p.domains.detach(domain, core);
                    vd.attached[virt_core] = false;
                }
                table.pool.unbind(core, vd.id).map_err(Error::Pool)?;
                Err(Error::FirmwareStartFailed { core, source })
            }
        }
    }

    /// Tears down every core bound to `vd`. Never fails; per-core problems are logged.
    pub(crate) fn stop_locked(&self, table: &mut CoreTable, vd: &mut VirtualDevice) {
        let p = &self.platform;
        let cores = table.pool.cores_owned_by(vd.id);

        if matches!(vd.state, VdState::Off | VdState::Running) && p.power.is_on() {
            for &core in &cores {
                if p.lpm.state(core) != LpmState::PowerGated {
                    warn!("{}: forcing core {} into reset", vd.id, core);
                    p.lpm.force_reset(core);
                }
            }
        }

        for (virt_core, &core) in cores.iter().enumerate() {
            p.firmware.stop(core, vd.id, virt_core);
            table.fw_running &= !(1 << core);
            self.mailboxes[core].abort_pending();

            let domain = vd.domains[virt_core];
            p.mapper.unmap_telemetry_buffers(domain, core);
            p.mapper.unmap_core_resources(domain, core);
            if vd.attached[virt_core] {
                p.domains.detach(domain, core);
                vd.attached[virt_core] = false;
            }
            if let Err(e) = table.pool.unbind(core, vd.id) {
                error!("{}: {}", vd.id, e);
            }
        }

        if let Some(app) = vd.fw_app.take() {
            p.firmware.destroy_app(app);
        }
        if vd.state != VdState::Unavailable {
            vd.state = VdState::Off;
        }
        info!("{}: stopped, released cores {:?}", vd.id, cores);
    }

    pub(crate) fn suspend_locked(&self, table: &CoreTable, vd: &mut VirtualDevice) -> Result<()> {
        match vd.state {
            VdState::Running => {}
            VdState::Suspended => return Err(Error::AlreadySuspended),
            state => return Err(Error::InvalidState(state)),
        }
        let p = &self.platform;
        let timeout = self.config.lpm_timeout();
        let cores = table.pool.cores_owned_by(vd.id);
        let mut results = CoreResults::new();

        // Kick off every core first, then wait for them.
        for &core in &cores {
            if !p.lpm.wait_until_not(core, LpmState::Active, timeout) {
                error!("{}: core {} stuck in active state", vd.id, core);
                p.lpm.force_reset(core);
                results.insert(core, Err(CoreFailure::StuckActive));
                continue;
            }
            p.firmware.request_suspend(core);
        }

        for (virt_core, &core) in cores.iter().enumerate() {
            if !results.contains_key(&core) {
                let outcome = if p.lpm.wait_until(core, LpmState::PowerGated, timeout) {
                    p.lpm.enable_state(core, LpmState::ClockGated);
                    Ok(())
                } else {
                    let status = p.firmware.boot_status(core);
                    if status == BootStatus::SuspendCompleted {
                        Ok(())
                    } else {
                        error!(
                            "{}: suspend request on core {} failed (status {:?})",
                            vd.id, core, status
                        );
                        p.lpm.force_reset(core);
                        Err(CoreFailure::SuspendTimeout)
                    }
                };
                results.insert(core, outcome);
            }
            if vd.attached[virt_core] {
                p.domains.detach(vd.domains[virt_core], core);
                vd.attached[virt_core] = false;
            }
        }

        match aggregate(&results) {
            Ok(()) => {
                vd.blk_switch_count_when_suspended = p.power.switch_generation();
                vd.state = VdState::Suspended;
                info!("{}: suspended", vd.id);
                Ok(())
            }
            Err(failures) => {
                vd.state = VdState::Unavailable;
                for &core in &cores {
                    p.lpm.core_off(core);
                }
                error!("{}: suspend failed: {}", vd.id, failures);
                Err(Error::CoresFailed(failures))
            }
        }
    }

    pub(crate) fn resume_locked(&self, table: &CoreTable, vd: &mut VirtualDevice) -> Result<()> {
        if vd.state != VdState::Suspended {
            return Err(Error::NotSuspended);
        }
        let p = &self.platform;
        let cores = table.pool.cores_owned_by(vd.id);
        let generation = p.power.switch_generation();
        let mut results = CoreResults::new();

        for (virt_core, &core) in cores.iter().enumerate() {
            if let Err(e) = p.domains.attach(vd.domains[virt_core], core) {
                error!("{}: failed to attach core {}: {}", vd.id, core, e);
                results.insert(core, Err(CoreFailure::Attach(e)));
                continue;
            }
            vd.attached[virt_core] = true;
            // The block lost power while we were suspended.
            if vd.blk_switch_count_when_suspended != generation {
                if let Err(e) = p.firmware.setup_hw_after_power_cycle(core) {
                    error!("{}: failed to power up core {}: {}", vd.id, core, e);
                    results.insert(core, Err(CoreFailure::HwSetup(e)));
                    continue;
                }
            }
            p.firmware.request_resume(core);
            p.lpm.set_active(core);
        }

        for &core in &cores {
            if !results.contains_key(&core) {
                results.insert(core, self.wait_resume_completed(core));
            }
        }

        match aggregate(&results) {
            Ok(()) => {
                vd.state = VdState::Running;
                info!("{}: resumed", vd.id);
                Ok(())
            }
            Err(failures) => {
                vd.state = VdState::Unavailable;
                for (virt_core, &core) in cores.iter().enumerate() {
                    if vd.attached[virt_core] {
                        p.domains.detach(vd.domains[virt_core], core);
                        vd.attached[virt_core] = false;
                    }
                    p.lpm.core_off(core);
                }
                error!("{}: resume failed: {}", vd.id, failures);
                Err(Error::CoresFailed(failures))
            }
        }
    }

    fn wait_resume_completed(&self, core: usize) -> std::result::Result<(), CoreFailure> {
        let delay = self.config.resume_poll_delay();
        let mut status = self.platform.firmware.boot_status(core);
        for _ in 1..self.config.resume_poll_iterations {
            if status == BootStatus::ResumeCompleted {
                return Ok(());
            }
            thread::sleep(delay);
            status = self.platform.firmware.boot_status(core);
        }
        if status == BootStatus::ResumeCompleted {
            return Ok(());
        }
        error!("resume request on core {} failed (status {:?})", core, status);
        Err(CoreFailure::ResumeTimeout)
    }
}
