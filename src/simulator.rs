// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Drives an `AccelDevice` over mock hardware with a set of concurrent clients.

use std::fmt;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Weak;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use accel::hal::Command;
use accel::hal::RawResponse;
use accel::mailbox::ResponseStatus;
use accel::mailbox::RESP_OK;
use accel::mock::MockPlatform;
use accel::mock::SentCommand;
use accel::AccelDevice;
use accel::Client;
use accel::DeviceStatus;
use accel::Error as AccelError;
use accel::VdState;
use anyhow::anyhow;
use anyhow::Context;
use anyhow::Result;
use base::debug;
use base::info;
use base::warn;
use serde::Serialize;

use crate::config::Config;
use crate::config::Scenario;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientReport {
    pub client: usize,
    pub cores: Vec<usize>,
    pub completed: usize,
    pub cancelled: usize,
    pub internal_errors: usize,
    pub suspend_cycles: usize,
    /// Set when the client could not finish its session.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub clients: Vec<ClientReport>,
    pub commands_sent: usize,
    pub elapsed_ms: u64,
    pub final_status: DeviceStatus,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "clients: {}", self.clients.len())?;
        for c in &self.clients {
            write!(
                f,
                "  client {}: cores {:?}, {} ok, {} cancelled, {} internal errors, {} suspend cycles",
                c.client, c.cores, c.completed, c.cancelled, c.internal_errors, c.suspend_cycles
            )?;
            if let Some(e) = &c.error {
                write!(f, ", failed: {}", e)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "commands sent: {}", self.commands_sent)?;
        writeln!(
            f,
            "free cores at exit: {}/{}",
            self.final_status.free_cores, self.final_status.num_cores
        )?;
        write!(f, "elapsed: {} ms", self.elapsed_ms)
    }
}

// Plays the firmware: answers every command it is handed unless told to drop it.
fn run_firmware(
    dev: Weak<AccelDevice>,
    commands: mpsc::Receiver<SentCommand>,
    drop_every: u64,
    delay: Duration,
) {
    for sent in commands {
        if drop_every != 0 && sent.seq % drop_every == 0 {
            debug!("firmware ignoring command {} on core {}", sent.seq, sent.core);
            continue;
        }
        thread::sleep(delay);
        let Some(dev) = dev.upgrade() else {
            break;
        };
        let response = RawResponse {
            seq: sent.seq,
            status: RESP_OK,
            retval: sent.command.flags.wrapping_add(sent.seq as u32),
        };
        dev.deliver_responses(sent.core, &[response]);
    }
}

fn start_with_retries(client: &Client, attempts: usize) -> accel::Result<()> {
    let mut last = None;
    for _ in 0..attempts {
        match client.acquire_vd_wakelock() {
            Err(e @ AccelError::Busy(_)) => {
                last = Some(e);
                thread::sleep(Duration::from_millis(5));
            }
            other => return other,
        }
    }
    Err(last.unwrap_or(AccelError::VdMissing))
}

fn run_client(
    index: usize,
    dev: Arc<AccelDevice>,
    scenario: &Scenario,
    report: &mut ClientReport,
) -> accel::Result<()> {
    let client = Client::new(dev);
    client.acquire_block_wakelock()?;
    client.allocate_vd(scenario.vd_cores)?;
    start_with_retries(&client, scenario.start_attempts)?;
    report.cores = client.vd_cores();
    info!("client {} running on cores {:?}", index, report.cores);

    for cycle in 0..=scenario.suspend_cycles {
        for virt_core in 0..scenario.vd_cores {
            for i in 0..scenario.commands_per_core {
                let command = Command {
                    device_address: 0x1000 * (i as u64 + 1),
                    size: 256,
                    flags: index as u32,
                };
                client.mailbox_command(virt_core, &command)?;
            }
            for _ in 0..scenario.commands_per_core {
                match client.mailbox_response(virt_core)?.status {
                    ResponseStatus::Ok => report.completed += 1,
                    ResponseStatus::Cancelled => report.cancelled += 1,
                    ResponseStatus::InternalError => report.internal_errors += 1,
                }
            }
        }
        if cycle == scenario.suspend_cycles {
            break;
        }
        client.release_block_wakelock()?;
        client.acquire_block_wakelock()?;
        match client.vd_state() {
            Some(VdState::Running) => report.suspend_cycles += 1,
            state => {
                warn!("client {} came back in state {:?}", index, state);
                return Err(AccelError::InvalidState(state.unwrap_or(VdState::Off)));
            }
        }
    }
    Ok(())
}

pub fn run(cfg: &Config) -> Result<Report> {
    let started = Instant::now();
    let hw = MockPlatform::new(cfg.device.num_cores);
    let dev = AccelDevice::new(cfg.device.clone(), hw.platform())
        .context("failed to create accelerator")?;

    let (tx, rx) = mpsc::channel();
    hw.set_command_sink(tx);
    let firmware = {
        let dev = Arc::downgrade(&dev);
        let drop_every = cfg.scenario.drop_every;
        let delay = Duration::from_micros(cfg.scenario.response_delay_us);
        thread::Builder::new()
            .name("sim_firmware".to_string())
            .spawn(move || run_firmware(dev, rx, drop_every, delay))
            .context("failed to spawn firmware thread")?
    };

    let handles = (0..cfg.scenario.clients)
        .map(|index| {
            let dev = dev.clone();
            let scenario = cfg.scenario.clone();
            thread::Builder::new()
                .name(format!("sim_client{}", index))
                .spawn(move || {
                    let mut report = ClientReport {
                        client: index,
                        ..Default::default()
                    };
                    if let Err(e) = run_client(index, dev, &scenario, &mut report) {
                        warn!("client {} failed: {}", index, e);
                        report.error = Some(e.to_string());
                    }
                    report
                })
                .context("failed to spawn client thread")
        })
        .collect::<Result<Vec<_>>>()?;

    let mut clients = Vec::with_capacity(handles.len());
    for handle in handles {
        clients.push(
            handle
                .join()
                .map_err(|_| anyhow!("client thread panicked"))?,
        );
    }

    hw.clear_command_sink();
    firmware
        .join()
        .map_err(|_| anyhow!("firmware thread panicked"))?;

    Ok(Report {
        clients,
        commands_sent: hw.sent().len(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        final_status: dev.status(),
    })
}
