// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::VecDeque;

use base::error;
use base::Timer;
use serde::Deserialize;
use serde::Serialize;
use sync::Condvar;
use sync::Mutex;

/// Status values carried by firmware completions.
pub const RESP_OK: u16 = 0;
pub const RESP_WAITING: u16 = 1;
pub const RESP_CANCELLED: u16 = 2;

/// Outcome of a command as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Ok,
    /// The command timed out or its core was stopped before it completed.
    Cancelled,
    /// The entry was finalized with a status no producer should leave behind.
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxResponse {
    pub sequence_number: u64,
    pub status: ResponseStatus,
    /// Only meaningful when `status` is `Ok`.
    pub retval: u32,
}

/// A finalized command waiting in a response queue.
///
/// Holds the command's timeout timer so the entry cannot be released while the timer might still
/// reference it.
pub(crate) struct AsyncResponse {
    pub seq: u64,
    pub status: u16,
    pub retval: u32,
    pub timer: Timer,
}

impl AsyncResponse {
    /// Consumes the entry once its timer is known to be quiescent.
    pub fn finish(self) -> MailboxResponse {
        self.timer.cancel_sync();
        let status = match self.status {
            RESP_OK => ResponseStatus::Ok,
            RESP_CANCELLED => ResponseStatus::Cancelled,
            other => {
                error!(
                    "response {} finalized with unexpected status {}",
                    self.seq, other
                );
                ResponseStatus::InternalError
            }
        };
        MailboxResponse {
            sequence_number: self.seq,
            status,
            retval: if status == ResponseStatus::Ok {
                self.retval
            } else {
                0
            },
        }
    }
}

/// FIFO of finalized responses for one core of one VD.
#[derive(Default)]
pub struct ResponseQueue {
    entries: Mutex<VecDeque<AsyncResponse>>,
    ready: Condvar,
}

impl ResponseQueue {
    pub fn new() -> ResponseQueue {
        Default::default()
    }

    pub(crate) fn push(&self, entry: AsyncResponse) {
        self.entries.lock().push_back(entry);
        // Each entry is for exactly one waiter.
        self.ready.notify_one();
    }

    /// Blocks until an entry is available and removes the oldest one.
    pub(crate) fn wait_pop(&self) -> AsyncResponse {
        let mut entries = self.entries.lock();
        loop {
            if let Some(entry) = entries.pop_front() {
                return entry;
            }
            entries = self.ready.wait_while(entries, |e| e.is_empty());
        }
    }

    pub(crate) fn try_pop(&self) -> Option<AsyncResponse> {
        self.entries.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry, releasing each one only after its timer is quiescent.
    pub(crate) fn drain(&self) -> usize {
        let entries: Vec<AsyncResponse> = self.entries.lock().drain(..).collect();
        let count = entries.len();
        for entry in entries {
            entry.timer.cancel_sync();
        }
        count
    }
}
