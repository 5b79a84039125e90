// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Exercises the accelerator control plane with simulated clients and firmware.

mod args;
mod config;
mod simulator;

use anyhow::Context;
use anyhow::Result;
use base::info;
use base::syslog;

use crate::args::Args;
use crate::config::Config;

fn run() -> Result<()> {
    let args: Args = argh::from_env();
    let cfg = Config::load(&args)?;
    syslog::init_with(cfg.log.clone()).context("failed to initialize logging")?;
    info!(
        "simulating {} clients on {} cores",
        cfg.scenario.clients, cfg.device.num_cores
    );

    let report = simulator::run(&cfg)?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
    } else {
        println!("{}", report);
    }

    let failed = report.clients.iter().filter(|c| c.error.is_some()).count();
    if failed != 0 {
        anyhow::bail!("{} of {} clients failed", failed, report.clients.len());
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("accelvd: {:#}", e);
        std::process::exit(1);
    }
}
