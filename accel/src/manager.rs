// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use base::debug;
use base::info;
use base::warn;
use base::TimerQueue;
use resources::CorePool;
use resources::VdId;
use serde::Serialize;
use sync::RwLock;

use crate::hal::Command;
use crate::hal::DomainId;
use crate::hal::Platform;
use crate::hal::RawResponse;
use crate::mailbox::Mailbox;
use crate::mailbox::MailboxResponse;
use crate::mailbox::ResponseQueue;
use crate::virtual_device::VdState;
use crate::wakelock::Wakelock;
use crate::DeviceConfig;
use crate::Error;
use crate::Result;
use crate::VirtualDevice;

/// Core ownership plus which cores have firmware up. Guarded by a single reader/writer lock.
pub(crate) struct CoreTable {
    pub pool: CorePool,
    pub fw_running: u64,
}

/// Point-in-time view of the device, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub num_cores: usize,
    pub free_cores: usize,
    pub owners: Vec<Option<VdId>>,
    pub fw_running_mask: u64,
    pub wakelock_holders: usize,
    pub pending_commands: usize,
}

/// The control plane of one accelerator.
pub struct AccelDevice {
    pub(crate) config: DeviceConfig,
    pub(crate) platform: Platform,
    pub(crate) cores: RwLock<CoreTable>,
    pub(crate) mailboxes: Vec<Arc<Mailbox>>,
    wakelock: Wakelock,
    timers: Arc<TimerQueue>,
    next_vd_id: AtomicU32,
}

impl AccelDevice {
    /// Creates a device whose command timeouts run on their own thread.
    pub fn new(config: DeviceConfig, platform: Platform) -> Result<Arc<AccelDevice>> {
        let timers = TimerQueue::new("accel_mbox_timer").map_err(Error::SpawnTimer)?;
        Self::with_timers(config, platform, Arc::new(timers))
    }

    /// Creates a device that uses `timers` for command timeouts.
    pub fn with_timers(
        config: DeviceConfig,
        platform: Platform,
        timers: Arc<TimerQueue>,
    ) -> Result<Arc<AccelDevice>> {
        config.validate()?;
        let pool = CorePool::new(config.num_cores).map_err(Error::Pool)?;
        let mailboxes = (0..config.num_cores)
            .map(|core| Mailbox::new(core, platform.transport.clone()))
            .collect();
        let wakelock = Wakelock::new(platform.power.clone());
        info!("accelerator with {} cores", config.num_cores);
        Ok(Arc::new(AccelDevice {
            config,
            platform,
            cores: RwLock::new(CoreTable {
                pool,
                fw_running: 0,
            }),
            mailboxes,
            wakelock,
            timers,
            next_vd_id: AtomicU32::new(1),
        }))
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn wakelock(&self) -> &Wakelock {
        &self.wakelock
    }

    /// Creates a VD for `num_cores` cores. No core is bound until the VD is started.
    pub fn allocate_vd(&self, num_cores: usize) -> Result<VirtualDevice> {
        if num_cores == 0 {
            return Err(Error::InvalidArgument(
                "a virtual device needs at least one core".to_string(),
            ));
        }
        let table = self.cores.write();
        let available = table.pool.free_count();
        if num_cores > available {
            return Err(Error::InsufficientResources {
                requested: num_cores,
                available,
            });
        }

        let mut domains: Vec<DomainId> = Vec::with_capacity(num_cores);
        for _ in 0..num_cores {
            match self.platform.domains.create() {
                Ok(domain) => domains.push(domain),
                Err(e) => {
                    for domain in domains {
                        self.platform.domains.destroy(domain);
                    }
                    return Err(Error::AllocationFailed(e));
                }
            }
        }
        drop(table);

        let id = VdId(self.next_vd_id.fetch_add(1, Ordering::Relaxed));
        info!("{}: allocated with {} cores", id, num_cores);
        Ok(VirtualDevice::new(id, domains))
    }

    /// Releases `vd`, stopping it first if it still owns cores.
    pub fn release_vd(&self, mut vd: VirtualDevice) {
        {
            let mut table = self.cores.write();
            if table.pool.core_mask(vd.id) != 0 {
                warn!("{}: released while still holding cores", vd.id);
                self.stop_locked(&mut table, &mut vd);
            }
        }
        for domain in vd.domains.drain(..) {
            self.platform.domains.destroy(domain);
        }
        let drained: usize = vd.resp_queues.iter().map(|q| q.drain()).sum();
        if drained > 0 {
            debug!("{}: dropped {} uncollected responses", vd.id, drained);
        }
        info!("{}: released", vd.id);
    }

    pub fn start_vd(&self, vd: &mut VirtualDevice) -> Result<()> {
        let mut table = self.cores.write();
        self.start_locked(&mut table, vd)
    }

    pub fn stop_vd(&self, vd: &mut VirtualDevice) {
        let mut table = self.cores.write();
        self.stop_locked(&mut table, vd)
    }

    pub fn suspend_vd(&self, vd: &mut VirtualDevice) -> Result<()> {
        let table = self.cores.write();
        self.suspend_locked(&table, vd)
    }

    pub fn resume_vd(&self, vd: &mut VirtualDevice) -> Result<()> {
        let table = self.cores.write();
        self.resume_locked(&table, vd)
    }

    // Resolves `virt_core` of `vd` to a physical core whose firmware is up.
    fn running_core(&self, vd: &VirtualDevice, virt_core: usize) -> Result<usize> {
        let table = self.cores.read();
        let core = table.pool.virt_to_phys(vd.id, virt_core).ok_or_else(|| {
            Error::InvalidArgument(format!("{} has no virtual core {}", vd.id, virt_core))
        })?;
        if table.fw_running & (1 << core) == 0 {
            return Err(Error::InvalidArgument(format!(
                "firmware is not running on core {}",
                core
            )));
        }
        Ok(core)
    }

    /// Sends `command` to `virt_core` of `vd` and returns its sequence number.
    pub fn mailbox_command(
        &self,
        vd: &VirtualDevice,
        virt_core: usize,
        command: &Command,
    ) -> Result<u64> {
        if vd.state != VdState::Running {
            return Err(Error::InvalidState(vd.state));
        }
        let table = self.cores.read();
        let core = table
            .pool
            .virt_to_phys(vd.id, virt_core)
            .filter(|&core| table.fw_running & (1 << core) != 0)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "virtual core {} of {} is not running",
                    virt_core, vd.id
                ))
            })?;
        let seq = self.mailboxes[core].submit(
            &self.timers,
            command,
            vd.resp_queues[virt_core].clone(),
            self.config.mailbox_timeout(),
        )?;
        debug!("{}: command {} on core {}", vd.id, seq, core);
        Ok(seq)
    }

    /// Blocks until a response for `virt_core` of `vd` is available and returns it.
    pub fn mailbox_response(&self, vd: &VirtualDevice, virt_core: usize) -> Result<MailboxResponse> {
        let queue = self.response_queue(vd, virt_core)?;
        // Waiting happens without the core table lock.
        Ok(queue.wait_pop().finish())
    }

    /// The queue responses for `virt_core` of `vd` land in, provided its firmware is up.
    pub(crate) fn response_queue(
        &self,
        vd: &VirtualDevice,
        virt_core: usize,
    ) -> Result<Arc<ResponseQueue>> {
        self.running_core(vd, virt_core)?;
        Ok(vd.resp_queues[virt_core].clone())
    }

    /// Returns a response for `virt_core` of `vd` if one is already queued.
    pub fn try_mailbox_response(
        &self,
        vd: &VirtualDevice,
        virt_core: usize,
    ) -> Result<Option<MailboxResponse>> {
        if virt_core >= vd.num_cores {
            return Err(Error::InvalidArgument(format!(
                "{} has no virtual core {}",
                vd.id, virt_core
            )));
        }
        Ok(vd.resp_queues[virt_core].try_pop().map(|e| e.finish()))
    }

    /// Entry point for completions read out of `core`'s mailbox.
    ///
    /// Returns how many of them matched a waiting command.
    pub fn deliver_responses(&self, core: usize, responses: &[RawResponse]) -> usize {
        let Some(mailbox) = self.mailboxes.get(core) else {
            warn!("responses for nonexistent core {}", core);
            return 0;
        };
        responses
            .iter()
            .filter(|resp| mailbox.handle_response(resp))
            .count()
    }

    pub fn virt_to_phys(&self, vd: &VirtualDevice, virt_core: usize) -> Option<usize> {
        self.cores.read().pool.virt_to_phys(vd.id, virt_core)
    }

    pub fn phys_to_virt(&self, vd: &VirtualDevice, phys_core: usize) -> Option<usize> {
        self.cores.read().pool.phys_to_virt(vd.id, phys_core)
    }

    /// Converts a mask of `vd`'s virtual cores to physical cores, or 0 if any of them is invalid.
    pub fn virt_mask_to_phys_mask(&self, vd: &VirtualDevice, virt_mask: u64) -> u64 {
        self.cores.read().pool.virt_mask_to_phys_mask(vd.id, virt_mask)
    }

    pub fn cores_of(&self, vd: &VirtualDevice) -> Vec<usize> {
        self.cores.read().pool.cores_owned_by(vd.id)
    }

    pub fn core_owner(&self, core: usize) -> Option<VdId> {
        self.cores.read().pool.owner(core)
    }

    pub fn free_cores(&self) -> usize {
        self.cores.read().pool.free_count()
    }

    pub fn is_fw_running(&self, core: usize) -> bool {
        core < self.config.num_cores && self.cores.read().fw_running & (1 << core) != 0
    }

    /// Called before the system sleeps. Fails while any wakelock is held.
    pub fn prepare_system_suspend(&self) -> Result<()> {
        self.wakelock.mark_suspending()?;
        info!("system suspend prepared");
        Ok(())
    }

    pub fn finish_system_resume(&self) {
        self.wakelock.mark_resumed();
        info!("system resumed");
    }

    pub fn status(&self) -> DeviceStatus {
        let table = self.cores.read();
        DeviceStatus {
            num_cores: table.pool.num_cores(),
            free_cores: table.pool.free_count(),
            owners: (0..table.pool.num_cores())
                .map(|core| table.pool.owner(core))
                .collect(),
            fw_running_mask: table.fw_running,
            wakelock_holders: self.wakelock.count(),
            pending_commands: self.mailboxes.iter().map(|m| m.pending()).sum(),
        }
    }
}
