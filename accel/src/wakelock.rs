// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::sync::Arc;

use base::error;
use base::info;
use base::warn;
use sync::Mutex;

use crate::error::BusyReason;
use crate::hal::PowerDomain;
use crate::Error;
use crate::Result;

struct WakelockState {
    count: usize,
    suspending: bool,
}

/// Reference-counted gate on the shared power domain.
///
/// The domain is powered on when the first holder arrives and off when the last one leaves. While
/// a system suspend is pending no new holder is admitted.
pub struct Wakelock {
    power: Arc<dyn PowerDomain>,
    state: Mutex<WakelockState>,
}

impl Wakelock {
    pub fn new(power: Arc<dyn PowerDomain>) -> Wakelock {
        Wakelock {
            power,
            state: Mutex::new(WakelockState {
                count: 0,
                suspending: false,
            }),
        }
    }

    pub fn acquire(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.suspending {
            warn!("refusing wakelock while a system suspend is in progress");
            return Err(Error::SuspendInProgress);
        }
        state.count += 1;
        if state.count == 1 {
            if let Err(e) = self.power.power_on() {
                state.count -= 1;
                error!("failed to power on the block: {}", e);
                return Err(Error::PowerOn(e));
            }
            info!("power domain on");
        }
        Ok(())
    }

    /// Drops one hold. Releasing with no holders is logged and otherwise ignored.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if state.count == 0 {
            warn!("wakelock released with no holders");
            return;
        }
        state.count -= 1;
        if state.count == 0 {
            match self.power.power_off() {
                Ok(()) => info!("power domain off"),
                Err(e) => error!("failed to power off the block: {}", e),
            }
        }
    }

    /// Blocks new acquisitions for a system suspend. Fails while anyone holds the wakelock.
    pub fn mark_suspending(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.count != 0 {
            return Err(Error::Busy(BusyReason::WakelockHeld(state.count)));
        }
        state.suspending = true;
        Ok(())
    }

    pub fn mark_resumed(&self) {
        self.state.lock().suspending = false;
    }

    pub fn count(&self) -> usize {
        self.state.lock().count
    }
}
