// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Control plane of a multi-tenant accelerator.
//!
//! The physical cores of the accelerator are partitioned into virtual devices (VDs). Each VD owns
//! an exclusive set of cores, an isolation domain per core and a response queue per core. Clients
//! drive their VD through `AccelDevice` (or the per-process `Client` wrapper), talk to the
//! firmware through per-core mailboxes, and keep the shared power domain up with a wakelock.

pub mod client;
mod config;
mod error;
pub mod hal;
mod lifecycle;
pub mod mailbox;
mod manager;
pub mod mock;
mod virtual_device;
mod wakelock;

pub use resources::VdId;

pub use crate::client::Client;
pub use crate::config::DeviceConfig;
pub use crate::error::BusyReason;
pub use crate::error::CoreFailure;
pub use crate::error::CoreFailures;
pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::manager::AccelDevice;
pub use crate::manager::DeviceStatus;
pub use crate::virtual_device::VdState;
pub use crate::virtual_device::VirtualDevice;
pub use crate::wakelock::Wakelock;
