// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Process-wide logger setup.
//!
//! Library crates only emit records through the `log` macros re-exported from `base`. A binary
//! calls `syslog::init()` (or `init_with`) once, early in `main`, to decide where those records go.
//! Until then every record is silently dropped.
//!
//! # Examples
//!
//! ```
//! use base::syslog;
//! use base::warn;
//!
//! if let Err(e) = syslog::init() {
//!     println!("failed to initialize syslog: {}", e);
//!     return;
//! }
//! warn!("this is your {} warning", "final");
//! ```

use std::env;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use env_logger::Target;
use remain::sorted;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

/// Errors returned by `syslog::init()`.
#[sorted]
#[derive(ThisError, Debug)]
pub enum Error {
    /// The filter string could not be understood.
    #[error("empty log filter")]
    EmptyFilter,
    /// Some other logger was installed before us.
    #[error("another logger is already installed: {0}")]
    SetLogger(log::SetLoggerError),
}

/// Where and how much to log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `env_logger` style filter, e.g. `info` or `info,accel::mailbox=trace`.
    pub log_level: String,
    /// Write to stderr when set, stdout otherwise.
    pub stderr: bool,
    /// Name printed in front of every record.
    pub proc_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            log_level: String::from("info"),
            stderr: true,
            proc_name: get_proc_name().unwrap_or_else(|| String::from("accelvd")),
        }
    }
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);

fn get_proc_name() -> Option<String> {
    env::args_os()
        .next()
        .map(PathBuf::from)
        .and_then(|s| s.file_name().map(OsStr::to_os_string))
        .map(OsString::into_string)
        .and_then(Result::ok)
}

/// Initialize the logger with the default configuration.
pub fn init() -> Result<(), Error> {
    init_with(LogConfig::default())
}

/// Initialize the logger.
///
/// Every call made after the first successful one has no effect besides returning `Ok`.
pub fn init_with(cfg: LogConfig) -> Result<(), Error> {
    init_internal(cfg, false)
}

fn init_internal(cfg: LogConfig, is_test: bool) -> Result<(), Error> {
    if INITIALIZED.load(Ordering::Acquire) {
        return Ok(());
    }
    if cfg.log_level.trim().is_empty() {
        return Err(Error::EmptyFilter);
    }

    let mut builder = env_logger::Builder::new();
    builder
        .parse_filters(&cfg.log_level)
        .target(if cfg.stderr {
            Target::Stderr
        } else {
            Target::Stdout
        })
        .is_test(is_test);

    let proc_name = cfg.proc_name;
    builder.format(move |buf, record| {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        match (record.file(), record.line()) {
            (Some(file), Some(line)) => writeln!(
                buf,
                "[{} {:5} {}: {}:{}] {}",
                timestamp,
                record.level(),
                proc_name,
                file,
                line,
                record.args()
            ),
            _ => writeln!(
                buf,
                "[{} {:5} {}] {}",
                timestamp,
                record.level(),
                proc_name,
                record.args()
            ),
        }
    });

    match builder.try_init() {
        Ok(()) => {
            INITIALIZED.store(true, Ordering::Release);
            Ok(())
        }
        // Lost a race against a concurrent init of ours.
        Err(_) if INITIALIZED.load(Ordering::Acquire) => Ok(()),
        Err(e) => Err(Error::SetLogger(e)),
    }
}

/// Installs a test-friendly logger at debug level, ignoring a logger that is already present.
pub fn test_only_ensure_inited() {
    let _ = init_internal(
        LogConfig {
            log_level: String::from("debug"),
            ..Default::default()
        },
        true,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        test_only_ensure_inited();
        test_only_ensure_inited();
        assert!(init().is_ok());
        log::info!("logger survives repeated init");
    }

    #[test]
    fn empty_filter_rejected() {
        let cfg = LogConfig {
            log_level: String::from("  "),
            ..Default::default()
        };
        // Only meaningful before the first successful init in this process.
        if !INITIALIZED.load(Ordering::Acquire) {
            assert!(matches!(init_with(cfg), Err(Error::EmptyFilter)));
        }
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg: LogConfig = serde_json::from_str(r#"{"log_level": "debug"}"#).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.stderr);
        assert!(!cfg.proc_name.is_empty());
    }
}
