// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::Error;
use crate::Result;
use crate::VdId;

/// Largest pool supported. Core sets are passed around as `u64` masks.
pub const MAX_CORES: usize = 64;

/// Tracks which virtual device, if any, owns each physical core.
///
/// The pool is the ground truth for availability: a core is free exactly when its slot is empty.
/// Virtual core indices are derived from it too. The virtual index of a physical core within a
/// VD is the number of lower-numbered physical cores owned by the same VD, so binding or
/// unbinding a core can shift the virtual indices of that VD's higher cores.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CorePool {
    slots: Vec<Option<VdId>>,
}

impl CorePool {
    /// Creates a pool of `num_cores` free cores.
    pub fn new(num_cores: usize) -> Result<Self> {
        if num_cores == 0 || num_cores > MAX_CORES {
            return Err(Error::PoolSize(num_cores));
        }
        Ok(CorePool {
            slots: vec![None; num_cores],
        })
    }

    /// Total number of physical cores, free or not.
    pub fn num_cores(&self) -> usize {
        self.slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Returns the VD owning `core`, or `None` if the core is free or out of range.
    pub fn owner(&self, core: usize) -> Option<VdId> {
        self.slots.get(core).copied().flatten()
    }

    /// Picks the `count` lowest-numbered free cores without binding them.
    pub fn find_free(&self, count: usize) -> Result<Vec<usize>> {
        let free: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(core, _)| core)
            .take(count)
            .collect();
        if free.len() < count {
            return Err(Error::NotEnoughFreeCores {
                requested: count,
                available: free.len(),
            });
        }
        Ok(free)
    }

    /// Records `vd` as the owner of `core`.
    pub fn bind(&mut self, core: usize, vd: VdId) -> Result<()> {
        let slot = self.slots.get_mut(core).ok_or(Error::CoreOutOfRange(core))?;
        match *slot {
            Some(owner) => Err(Error::CoreAlreadyOwned { core, owner }),
            None => {
                *slot = Some(vd);
                Ok(())
            }
        }
    }

    /// Returns `core` to the pool. Fails if `vd` is not its owner.
    pub fn unbind(&mut self, core: usize, vd: VdId) -> Result<()> {
        let slot = self.slots.get_mut(core).ok_or(Error::CoreOutOfRange(core))?;
        if *slot != Some(vd) {
            return Err(Error::CoreNotOwned { core, vd });
        }
        *slot = None;
        Ok(())
    }

    /// Physical cores owned by `vd`, ascending.
    pub fn cores_owned_by(&self, vd: VdId) -> Vec<usize> {
        self.owned(vd).collect()
    }

    /// Bitmask of the physical cores owned by `vd`.
    pub fn core_mask(&self, vd: VdId) -> u64 {
        self.owned(vd).fold(0, |mask, core| mask | (1 << core))
    }

    /// Translates a VD-local core index into the physical core it refers to.
    pub fn virt_to_phys(&self, vd: VdId, virt_core: usize) -> Option<usize> {
        self.owned(vd).nth(virt_core)
    }

    /// Translates a physical core into its index within `vd`, if `vd` owns it.
    pub fn phys_to_virt(&self, vd: VdId, phys_core: usize) -> Option<usize> {
        if self.owner(phys_core) != Some(vd) {
            return None;
        }
        Some(self.owned(vd).take_while(|&core| core < phys_core).count())
    }

    /// Converts a mask of VD-local core indices to a mask of physical cores.
    ///
    /// Returns 0 if any bit names a virtual core `vd` does not have, so a caller can never act on
    /// part of a list.
    pub fn virt_mask_to_phys_mask(&self, vd: VdId, virt_mask: u64) -> u64 {
        let owned = self.cores_owned_by(vd);
        let mut phys_mask = 0;
        for virt_core in 0..MAX_CORES {
            if virt_mask & (1 << virt_core) == 0 {
                continue;
            }
            match owned.get(virt_core) {
                Some(&phys) => phys_mask |= 1 << phys,
                None => return 0,
            }
        }
        phys_mask
    }

    fn owned(&self, vd: VdId) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(move |(_, s)| **s == Some(vd))
            .map(|(core, _)| core)
    }
}
