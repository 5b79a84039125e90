// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! One-shot delayed callbacks with synchronous cancellation.
//!
//! A `TimerQueue` runs callbacks once their deadline passes. Each callback belongs to a `Timer`
//! handle that can be armed at most once. Cancelling a timer never blocks unless the callback is
//! executing at that moment, in which case `cancel_sync` waits until it has returned. Once
//! `cancel_sync` returns, the callback is guaranteed to be neither running nor going to run.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::thread::ThreadId;
use std::time::Duration;
use std::time::Instant;

use sync::Condvar;
use sync::Mutex;

type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Slot {
    Idle,
    Armed { deadline: Instant, callback: Callback },
    Running(ThreadId),
    Done,
}

#[derive(Default)]
struct State {
    slots: HashMap<u64, Slot>,
    deadlines: BTreeSet<(Instant, u64)>,
    next_id: u64,
    shutting_down: bool,
}

impl State {
    // Moves the earliest timer due at `now` into the running state and hands back its callback.
    fn take_due(&mut self, now: Instant) -> Option<(u64, Callback)> {
        let &(deadline, id) = self.deadlines.iter().next()?;
        if deadline > now {
            return None;
        }
        self.deadlines.remove(&(deadline, id));
        let slot = self.slots.get_mut(&id)?;
        match std::mem::replace(slot, Slot::Running(thread::current().id())) {
            Slot::Armed { callback, .. } => Some((id, callback)),
            other => {
                *slot = other;
                None
            }
        }
    }

    fn finish(&mut self, id: u64) {
        if let Some(slot) = self.slots.get_mut(&id) {
            *slot = Slot::Done;
        }
    }
}

struct Inner {
    state: Mutex<State>,
    // Signalled whenever the deadline set changes or a callback finishes running.
    condvar: Condvar,
}

impl Inner {
    fn run_due(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let due = self.state.lock().take_due(now);
            let Some((id, callback)) = due else {
                return fired;
            };
            callback();
            fired += 1;
            self.state.lock().finish(id);
            self.condvar.notify_all();
        }
    }
}

fn run_timer_thread(inner: Arc<Inner>) {
    let mut state = inner.state.lock();
    while !state.shutting_down {
        let next = state.deadlines.iter().next().map(|&(deadline, _)| deadline);
        match next {
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    drop(state);
                    inner.run_due(now);
                    state = inner.state.lock();
                } else {
                    state = inner.condvar.wait_timeout(state, deadline - now);
                }
            }
            None => {
                state = inner
                    .condvar
                    .wait_while(state, |s| !s.shutting_down && s.deadlines.is_empty());
            }
        }
    }
}

/// Runs timer callbacks, either on a dedicated thread or when the owner asks it to.
pub struct TimerQueue {
    inner: Arc<Inner>,
    worker: Option<JoinHandle<()>>,
}

impl TimerQueue {
    /// Creates a queue whose callbacks run on a worker thread named `thread_name`.
    pub fn new(thread_name: impl Into<String>) -> std::io::Result<TimerQueue> {
        let inner = Arc::new(Inner {
            state: Mutex::new(State::default()),
            condvar: Condvar::new(),
        });
        let thread_inner = inner.clone();
        let worker = thread::Builder::new()
            .name(thread_name.into())
            .spawn(move || run_timer_thread(thread_inner))?;
        Ok(TimerQueue {
            inner,
            worker: Some(worker),
        })
    }

    /// Creates a queue without a worker thread. Callbacks only run from `fire_expired`.
    ///
    /// Tests use this to decide exactly when a deadline passes.
    pub fn new_manual() -> TimerQueue {
        TimerQueue {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                condvar: Condvar::new(),
            }),
            worker: None,
        }
    }

    /// Returns a new, unarmed timer.
    pub fn timer(&self) -> Timer {
        let mut state = self.inner.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.slots.insert(id, Slot::Idle);
        Timer {
            id,
            inner: self.inner.clone(),
        }
    }

    /// Runs, on the calling thread, every callback whose deadline is at or before `now`.
    ///
    /// Returns the number of callbacks that ran.
    pub fn fire_expired(&self, now: Instant) -> usize {
        self.inner.run_due(now)
    }

    /// Returns the number of armed timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().deadlines.len()
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.condvar.notify_all();
        if let Some(worker) = self.worker.take() {
            // The last reference can go away inside a callback.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

/// Handle to a single one-shot callback in a `TimerQueue`.
///
/// Dropping the handle cancels the timer synchronously.
pub struct Timer {
    id: u64,
    inner: Arc<Inner>,
}

impl Timer {
    /// Schedules `callback` to run once `delay` has elapsed.
    ///
    /// Returns false without scheduling anything if the timer was already armed or cancelled.
    pub fn arm<F>(&self, delay: Duration, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let deadline = Instant::now() + delay;
        match state.slots.get_mut(&self.id) {
            Some(slot @ Slot::Idle) => {
                *slot = Slot::Armed {
                    deadline,
                    callback: Box::new(callback),
                };
            }
            _ => return false,
        }
        state.deadlines.insert((deadline, self.id));
        drop(state);
        self.inner.condvar.notify_all();
        true
    }

    /// Prevents the callback from running if it has not started yet.
    ///
    /// Returns true if this call is what stopped the callback from ever running. Does not wait for
    /// a callback that is already executing.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state.slots.get_mut(&self.id) else {
            return false;
        };
        match std::mem::replace(slot, Slot::Done) {
            Slot::Idle => true,
            Slot::Armed { deadline, .. } => {
                state.deadlines.remove(&(deadline, self.id));
                true
            }
            running @ Slot::Running(_) => {
                *slot = running;
                false
            }
            Slot::Done => false,
        }
    }

    /// Cancels the timer and, if its callback is executing right now, blocks until it returns.
    pub fn cancel_sync(&self) {
        self.cancel();
        let me = thread::current().id();
        let state = self.inner.state.lock();
        // A callback cancelling its own timer would otherwise wait on itself.
        let _state = self.inner.condvar.wait_while(state, |s| {
            matches!(s.slots.get(&self.id), Some(Slot::Running(tid)) if *tid != me)
        });
    }

    /// Returns true once the callback has run or can no longer run.
    #[cfg(test)]
    fn is_done(&self) -> bool {
        matches!(
            self.inner.state.lock().slots.get(&self.id),
            Some(Slot::Done) | None
        )
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel_sync();
        let mut state = self.inner.state.lock();
        if matches!(state.slots.get(&self.id), Some(Slot::Done)) {
            state.slots.remove(&self.id);
        }
    }
}
