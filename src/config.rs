// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use accel::DeviceConfig;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use base::syslog::LogConfig;
use serde::Deserialize;
use serde::Serialize;

use crate::args::Args;

/// What the simulated clients do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub clients: usize,
    pub vd_cores: usize,
    pub commands_per_core: usize,
    pub suspend_cycles: usize,
    /// The firmware leaves every Nth command unanswered. 0 answers all of them.
    pub drop_every: u64,
    /// How long the firmware takes to answer a command.
    pub response_delay_us: u64,
    /// How many times a client retries starting its VD while cores are busy.
    pub start_attempts: usize,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            clients: 3,
            vd_cores: 1,
            commands_per_core: 8,
            suspend_cycles: 1,
            drop_every: 0,
            response_delay_us: 100,
            start_attempts: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub device: DeviceConfig,
    pub scenario: Scenario,
    pub log: LogConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Builds the configuration from an optional file plus command line overrides.
    pub fn load(args: &Args) -> Result<Config> {
        let mut cfg = match &args.cfg {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        cfg.apply(args);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, args: &Args) {
        if let Some(cores) = args.cores {
            self.device.num_cores = cores;
        }
        if let Some(timeout) = args.mailbox_timeout_ms {
            self.device.mailbox_timeout_ms = timeout;
        }
        if let Some(clients) = args.clients {
            self.scenario.clients = clients;
        }
        if let Some(vd_cores) = args.vd_cores {
            self.scenario.vd_cores = vd_cores;
        }
        if let Some(commands) = args.commands {
            self.scenario.commands_per_core = commands;
        }
        if let Some(cycles) = args.suspend_cycles {
            self.scenario.suspend_cycles = cycles;
        }
        if let Some(drop_every) = args.drop_every {
            self.scenario.drop_every = drop_every;
        }
        if let Some(level) = &args.log_level {
            self.log.log_level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.device.validate().context("invalid device config")?;
        if self.scenario.vd_cores == 0 || self.scenario.vd_cores > self.device.num_cores {
            bail!(
                "vd_cores must be in 1..={}, got {}",
                self.device.num_cores,
                self.scenario.vd_cores
            );
        }
        if self.scenario.start_attempts == 0 {
            bail!("start_attempts must be nonzero");
        }
        Ok(())
    }
}
