// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use remain::sorted;
use thiserror::Error;

use crate::hal::HwError;
use crate::virtual_device::VdState;

/// Why a request was refused without any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    /// Not enough free cores to bring a VD up.
    Cores { requested: usize, available: usize },
    /// The power gate still has holders.
    WakelockHeld(usize),
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BusyReason::Cores {
                requested,
                available,
            } => write!(f, "{} cores needed, {} free", requested, available),
            BusyReason::WakelockHeld(holders) => write!(f, "wakelock has {} holders", holders),
        }
    }
}

/// Why a single core failed to suspend or resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreFailure {
    /// Attaching the isolation domain failed.
    Attach(HwError),
    /// Re-initialization after a power cycle failed.
    HwSetup(HwError),
    /// The core never left the active state.
    StuckActive,
    /// The core neither parked nor reported suspend completion.
    SuspendTimeout,
    /// The firmware never reported resume completion.
    ResumeTimeout,
}

impl fmt::Display for CoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoreFailure::Attach(e) => write!(f, "attach failed: {}", e),
            CoreFailure::HwSetup(e) => write!(f, "hardware setup failed: {}", e),
            CoreFailure::StuckActive => write!(f, "stuck in active state"),
            CoreFailure::SuspendTimeout => write!(f, "suspend timed out"),
            CoreFailure::ResumeTimeout => write!(f, "resume timed out"),
        }
    }
}

/// Every core that failed during one multi-core operation, keyed by physical core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreFailures(pub BTreeMap<usize, CoreFailure>);

impl CoreFailures {
    pub fn cores(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }
}

impl fmt::Display for CoreFailures {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (core, failure) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "core {}: {}", core, failure)?;
        }
        Ok(())
    }
}

#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to create isolation domain: {0}")]
    AllocationFailed(HwError),
    #[error("virtual device is already suspended")]
    AlreadySuspended,
    #[error("device busy: {0}")]
    Busy(BusyReason),
    #[error("cores failed: {0}")]
    CoresFailed(CoreFailures),
    #[error("failed to create firmware application: {0}")]
    FirmwareApp(HwError),
    #[error("failed to start core {core}: {source}")]
    FirmwareStartFailed { core: usize, source: HwError },
    #[error("{requested} cores requested but only {available} are free")]
    InsufficientResources { requested: usize, available: usize },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid device config: {0}")]
    InvalidConfig(String),
    #[error("operation not allowed while virtual device is {0}")]
    InvalidState(VdState),
    #[error("virtual device is not suspended")]
    NotSuspended,
    #[error("core pool bookkeeping failed: {0}")]
    Pool(resources::Error),
    #[error("failed to power on: {0}")]
    PowerOn(HwError),
    #[error("failed to spawn timer thread: {0}")]
    SpawnTimer(io::Error),
    #[error("system suspend in progress")]
    SuspendInProgress,
    #[error("mailbox transport failed: {0}")]
    Transport(HwError),
    #[error("client already owns a virtual device")]
    VdAlreadyAllocated,
    #[error("client has no virtual device")]
    VdMissing,
    #[error("{0} wakelock is not held")]
    WakelockNotHeld(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
