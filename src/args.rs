// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::PathBuf;

use argh::FromArgs;

#[derive(Clone, Debug, Default, FromArgs)]
/// Runs simulated clients against an accelerator control plane backed by mock hardware.
pub struct Args {
    /// path to a JSON config file. Options given on the command line take precedence.
    #[argh(option)]
    pub cfg: Option<PathBuf>,
    /// number of physical cores. (default: 4)
    #[argh(option, short = 'n')]
    pub cores: Option<usize>,
    /// number of concurrent clients. (default: 3)
    #[argh(option, short = 'c')]
    pub clients: Option<usize>,
    /// cores requested by each client's virtual device. (default: 1)
    #[argh(option)]
    pub vd_cores: Option<usize>,
    /// commands each client sends to every one of its cores. (default: 8)
    #[argh(option)]
    pub commands: Option<usize>,
    /// block wakelock release/reacquire cycles per client. (default: 1)
    #[argh(option)]
    pub suspend_cycles: Option<usize>,
    /// the simulated firmware ignores every Nth command, which then times out. 0 answers all.
    #[argh(option)]
    pub drop_every: Option<u64>,
    /// mailbox command timeout in milliseconds. (default: 8000)
    #[argh(option)]
    pub mailbox_timeout_ms: Option<u64>,
    /// log filter, e.g. `debug` or `info,accel::mailbox=trace`. (default: info)
    #[argh(option)]
    pub log_level: Option<String>,
    /// whether or not to print the summary in json format
    #[argh(switch)]
    pub json: bool,
}
