// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Manages the physical accelerator cores that can be handed out to virtual devices.

use std::fmt;

use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub use crate::core_pool::CorePool;
pub use crate::core_pool::MAX_CORES;

mod core_pool;

/// Identifies a virtual device for the lifetime of the device that created it.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Copy, Clone, Serialize, Deserialize)]
pub struct VdId(pub u32);

impl fmt::Display for VdId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "vd{}", self.0)
    }
}

#[sorted]
#[derive(Error, Debug, Eq, PartialEq)]
pub enum Error {
    #[error("core {core} is already owned by {owner}")]
    CoreAlreadyOwned { core: usize, owner: VdId },
    #[error("core {core} is not owned by {vd}")]
    CoreNotOwned { core: usize, vd: VdId },
    #[error("core {0} is out of range")]
    CoreOutOfRange(usize),
    #[error("{requested} cores requested but only {available} are free")]
    NotEnoughFreeCores { requested: usize, available: usize },
    #[error("pool size {0} is out of range")]
    PoolSize(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
