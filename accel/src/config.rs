// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::time::Duration;

use resources::MAX_CORES;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Tunables of an `AccelDevice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Number of physical cores.
    pub num_cores: usize,
    /// How long a mailbox command may stay unanswered before it is cancelled.
    pub mailbox_timeout_ms: u64,
    /// Bound on each wait for a core's low-power state during suspend.
    pub lpm_timeout_ms: u64,
    /// Number of boot-mode polls per core while resuming.
    pub resume_poll_iterations: u32,
    /// Delay between two boot-mode polls.
    pub resume_poll_delay_us: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            num_cores: 4,
            mailbox_timeout_ms: 8000,
            lpm_timeout_ms: 1000,
            resume_poll_iterations: 1000,
            resume_poll_delay_us: 1000,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_cores == 0 || self.num_cores > MAX_CORES {
            return Err(Error::InvalidConfig(format!(
                "num_cores must be in 1..={}, got {}",
                MAX_CORES, self.num_cores
            )));
        }
        if self.mailbox_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "mailbox_timeout_ms must be nonzero".to_string(),
            ));
        }
        if self.lpm_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "lpm_timeout_ms must be nonzero".to_string(),
            ));
        }
        if self.resume_poll_iterations == 0 {
            return Err(Error::InvalidConfig(
                "resume_poll_iterations must be nonzero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mailbox_timeout(&self) -> Duration {
        Duration::from_millis(self.mailbox_timeout_ms)
    }

    pub fn lpm_timeout(&self) -> Duration {
        Duration::from_millis(self.lpm_timeout_ms)
    }

    pub fn resume_poll_delay(&self) -> Duration {
        Duration::from_micros(self.resume_poll_delay_us)
    }
}
