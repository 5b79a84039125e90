// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-core asynchronous command channel.
//!
//! Each submitted command gets a sequence number and an entry in the mailbox's wait list. The
//! entry leaves the wait list exactly once, either when the firmware's completion for that
//! sequence number arrives or when the command's timer fires, and whoever removes it delivers it
//! to the destination response queue. The loser of that race finds nothing to remove and does
//! nothing.

mod response;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use base::debug;
use base::trace;
use base::Timer;
use base::TimerQueue;
use sync::Mutex;

pub use self::response::MailboxResponse;
pub use self::response::ResponseQueue;
pub use self::response::ResponseStatus;
pub use self::response::RESP_CANCELLED;
pub use self::response::RESP_OK;
pub use self::response::RESP_WAITING;

pub(crate) use self::response::AsyncResponse;
use crate::hal::Command;
use crate::hal::MailboxTransport;
use crate::hal::RawResponse;
use crate::Error;
use crate::Result;

struct PendingResponse {
    dest: Arc<ResponseQueue>,
    timer: Timer,
}

pub struct Mailbox {
    core: usize,
    transport: Arc<dyn MailboxTransport>,
    // Next sequence number. Held for the whole submission so numbers are handed out in order.
    next_seq: Mutex<u64>,
    wait_list: Mutex<BTreeMap<u64, PendingResponse>>,
}

impl Mailbox {
    pub fn new(core: usize, transport: Arc<dyn MailboxTransport>) -> Arc<Mailbox> {
        Arc::new(Mailbox {
            core,
            transport,
            next_seq: Mutex::new(1),
            wait_list: Mutex::new(BTreeMap::new()),
        })
    }

    /// Sends `command` and arranges for its completion to land in `dest`.
    ///
    /// If the firmware does not answer within `timeout`, a `Cancelled` response is delivered
    /// instead. A rejected send consumes no sequence number and leaves nothing behind.
    pub fn submit(
        self: &Arc<Self>,
        timers: &TimerQueue,
        command: &Command,
        dest: Arc<ResponseQueue>,
        timeout: Duration,
    ) -> Result<u64> {
        let mut next_seq = self.next_seq.lock();
        let seq = *next_seq;

        // Registered before sending so a fast completion always finds its entry.
        self.wait_list.lock().insert(
            seq,
            PendingResponse {
                dest,
                timer: timers.timer(),
            },
        );

        if let Err(e) = self.transport.send(self.core, seq, command) {
            let pending = self.wait_list.lock().remove(&seq);
            drop(pending);
            return Err(Error::Transport(e));
        }

        {
            let wait_list = self.wait_list.lock();
            // Absent if the completion already arrived.
            if let Some(pending) = wait_list.get(&seq) {
                let mailbox = Arc::downgrade(self);
                pending
                    .timer
                    .arm(timeout, move || Mailbox::on_timeout(&mailbox, seq));
            }
        }

        *next_seq += 1;
        trace!("core {}: submitted command {}", self.core, seq);
        Ok(seq)
    }

    fn on_timeout(mailbox: &Weak<Mailbox>, seq: u64) {
        if let Some(mailbox) = mailbox.upgrade() {
            mailbox.handle_timeout(seq);
        }
    }

    /// Finalizes `seq` as cancelled if it is still waiting. Returns whether it was.
    pub fn handle_timeout(&self, seq: u64) -> bool {
        let mut wait_list = self.wait_list.lock();
        let Some(pending) = wait_list.remove(&seq) else {
            return false;
        };
        debug!("core {}: command {} timed out", self.core, seq);
        pending.dest.push(AsyncResponse {
            seq,
            status: RESP_CANCELLED,
            retval: 0,
            timer: pending.timer,
        });
        true
    }

    /// Finalizes the command `response` answers. Returns false for a completion that matches no
    /// waiting command, which happens when the command already timed out.
    pub fn handle_response(&self, response: &RawResponse) -> bool {
        let mut wait_list = self.wait_list.lock();
        let Some(pending) = wait_list.remove(&response.seq) else {
            debug!(
                "core {}: dropping response {} with no waiter",
                self.core, response.seq
            );
            return false;
        };
        // Non-blocking: a callback already running will find the entry gone.
        pending.timer.cancel();
        pending.dest.push(AsyncResponse {
            seq: response.seq,
            status: response.status,
            retval: response.retval,
            timer: pending.timer,
        });
        true
    }

    /// Finalizes every waiting command as cancelled. Used when the core is stopped.
    pub fn abort_pending(&self) -> usize {
        let drained: Vec<(u64, PendingResponse)> = {
            let mut wait_list = self.wait_list.lock();
            std::mem::take(&mut *wait_list).into_iter().collect()
        };
        let count = drained.len();
        for (seq, pending) in drained {
            pending.timer.cancel_sync();
            pending.dest.push(AsyncResponse {
                seq,
                status: RESP_CANCELLED,
                retval: 0,
                timer: pending.timer,
            });
        }
        if count > 0 {
            debug!("core {}: aborted {} pending commands", self.core, count);
        }
        count
    }

    /// Number of commands still waiting for a completion or a timeout.
    pub fn pending(&self) -> usize {
        self.wait_list.lock().len()
    }
}
