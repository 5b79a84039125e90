// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;
use std::sync::Arc;

use resources::VdId;
use serde::Deserialize;
use serde::Serialize;

use crate::hal::DomainId;
use crate::hal::FwAppHandle;
use crate::mailbox::ResponseQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VdState {
    Off,
    Running,
    Suspended,
    /// A suspend or resume failed. The VD can only be stopped and released.
    Unavailable,
}

impl fmt::Display for VdState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            VdState::Off => "off",
            VdState::Running => "running",
            VdState::Suspended => "suspended",
            VdState::Unavailable => "unavailable",
        };
        write!(f, "{}", s)
    }
}

/// A set of cores handed to one client, with the isolation state that goes with them.
///
/// Per-core vectors are indexed by virtual core. Which physical cores back the VD is recorded in
/// the device's core pool, not here.
pub struct VirtualDevice {
    pub(crate) id: VdId,
    pub(crate) num_cores: usize,
    pub(crate) domains: Vec<DomainId>,
    pub(crate) attached: Vec<bool>,
    pub(crate) resp_queues: Vec<Arc<ResponseQueue>>,
    pub(crate) state: VdState,
    pub(crate) fw_app: Option<FwAppHandle>,
    pub(crate) blk_switch_count_when_suspended: u64,
}

impl VirtualDevice {
    pub(crate) fn new(id: VdId, domains: Vec<DomainId>) -> VirtualDevice {
        let num_cores = domains.len();
        VirtualDevice {
            id,
            num_cores,
            domains,
            attached: vec![false; num_cores],
            resp_queues: (0..num_cores)
                .map(|_| Arc::new(ResponseQueue::new()))
                .collect(),
            state: VdState::Off,
            fw_app: None,
            blk_switch_count_when_suspended: 0,
        }
    }

    pub fn id(&self) -> VdId {
        self.id
    }

    pub fn num_cores(&self) -> usize {
        self.num_cores
    }

    pub fn state(&self) -> VdState {
        self.state
    }

    /// Number of finalized responses not yet collected on `virt_core`.
    pub fn queued_responses(&self, virt_core: usize) -> usize {
        self.resp_queues.get(virt_core).map_or(0, |q| q.len())
    }
}

impl fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("id", &self.id)
            .field("num_cores", &self.num_cores)
            .field("state", &self.state)
            .finish()
    }
}
