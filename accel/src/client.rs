// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use base::error;
use sync::RwLock;

use crate::hal::Command;
use crate::mailbox::MailboxResponse;
use crate::virtual_device::VdState;
use crate::AccelDevice;
use crate::Error;
use crate::Result;
use crate::VirtualDevice;

#[derive(Default)]
struct ClientState {
    vd: Option<VirtualDevice>,
    has_block_wakelock: bool,
    has_vd_wakelock: bool,
}

/// Per-process state of one user of the device.
///
/// A client owns at most one VD. The block wakelock keeps the power domain up; the VD wakelock
/// keeps the client's VD running. Dropping the client gives everything back.
pub struct Client {
    dev: Arc<AccelDevice>,
    state: RwLock<ClientState>,
}

impl Client {
    pub fn new(dev: Arc<AccelDevice>) -> Client {
        Client {
            dev,
            state: RwLock::new(ClientState::default()),
        }
    }

    pub fn device(&self) -> &Arc<AccelDevice> {
        &self.dev
    }

    pub fn allocate_vd(&self, num_cores: usize) -> Result<()> {
        let mut state = self.state.write();
        if state.vd.is_some() {
            return Err(Error::VdAlreadyAllocated);
        }
        state.vd = Some(self.dev.allocate_vd(num_cores)?);
        Ok(())
    }

    pub fn acquire_block_wakelock(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.has_block_wakelock {
            return Ok(());
        }
        self.dev.wakelock().acquire()?;
        state.has_block_wakelock = true;

        // A failed resume leaves the block wakelock held; the power domain is up regardless.
        let has_vd_wakelock = state.has_vd_wakelock;
        if let Some(vd) = state.vd.as_mut() {
            if has_vd_wakelock && vd.state() == VdState::Suspended {
                if let Err(e) = self.dev.resume_vd(vd) {
                    error!("{}: failed to resume: {}", vd.id(), e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Drops the block wakelock, suspending the VD first if it is held running.
    pub fn release_block_wakelock(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.has_block_wakelock {
            return Err(Error::WakelockNotHeld("block"));
        }
        let has_vd_wakelock = state.has_vd_wakelock;
        if let Some(vd) = state.vd.as_mut() {
            if has_vd_wakelock && vd.state() == VdState::Running {
                if let Err(e) = self.dev.suspend_vd(vd) {
                    error!("{}: failed to suspend: {}", vd.id(), e);
                }
            }
        }
        self.dev.wakelock().release();
        state.has_block_wakelock = false;
        Ok(())
    }

    /// Takes the VD wakelock, starting the VD. Requires the block wakelock.
    pub fn acquire_vd_wakelock(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.has_block_wakelock {
            return Err(Error::WakelockNotHeld("block"));
        }
        if state.has_vd_wakelock {
            return Ok(());
        }
        let vd = state.vd.as_mut().ok_or(Error::VdMissing)?;
        match vd.state() {
            VdState::Off => self.dev.start_vd(vd)?,
            VdState::Suspended => self.dev.resume_vd(vd)?,
            other => return Err(Error::InvalidState(other)),
        }
        state.has_vd_wakelock = true;
        Ok(())
    }

    /// Drops the VD wakelock and stops the VD.
    pub fn release_vd_wakelock(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.has_vd_wakelock {
            return Err(Error::WakelockNotHeld("virtual device"));
        }
        if let Some(vd) = state.vd.as_mut() {
            self.dev.stop_vd(vd);
        }
        state.has_vd_wakelock = false;
        Ok(())
    }

    pub fn mailbox_command(&self, virt_core: usize, command: &Command) -> Result<u64> {
        let state = self.state.read();
        if !state.has_vd_wakelock {
            return Err(Error::WakelockNotHeld("virtual device"));
        }
        let vd = state.vd.as_ref().ok_or(Error::VdMissing)?;
        self.dev.mailbox_command(vd, virt_core, command)
    }

    /// Waits for the next response on `virt_core`. No client lock is held while waiting, so the
    /// client can still be stopped or released from another thread.
    pub fn mailbox_response(&self, virt_core: usize) -> Result<MailboxResponse> {
        let queue = {
            let state = self.state.read();
            let vd = state.vd.as_ref().ok_or(Error::VdMissing)?;
            self.dev.response_queue(vd, virt_core)?
        };
        Ok(queue.wait_pop().finish())
    }

    pub fn vd_state(&self) -> Option<VdState> {
        self.state.read().vd.as_ref().map(|vd| vd.state())
    }

    pub fn vd_cores(&self) -> Vec<usize> {
        self.state
            .read()
            .vd
            .as_ref()
            .map(|vd| self.dev.cores_of(vd))
            .unwrap_or_default()
    }

    pub fn has_block_wakelock(&self) -> bool {
        self.state.read().has_block_wakelock
    }

    pub fn has_vd_wakelock(&self) -> bool {
        self.state.read().has_vd_wakelock
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.has_vd_wakelock {
            if let Some(vd) = state.vd.as_mut() {
                self.dev.stop_vd(vd);
            }
            state.has_vd_wakelock = false;
        }
        if state.has_block_wakelock {
            self.dev.wakelock().release();
            state.has_block_wakelock = false;
        }
        if let Some(vd) = state.vd.take() {
            self.dev.release_vd(vd);
        }
    }
}
