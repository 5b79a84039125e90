// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Logging and timer facilities shared by the accelerator control-plane crates.

pub mod syslog;
mod timer;

pub use log::debug;
pub use log::error;
pub use log::info;
pub use log::trace;
pub use log::warn;
pub use timer::Timer;
pub use timer::TimerQueue;
