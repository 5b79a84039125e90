// Copyright 2026 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Lock types that panic on poison instead of returning an error.
//!
//! Release builds abort on panic, so a poisoned lock means the process is already going down.
//! Use these anywhere the `std::sync` equivalents would otherwise be used.

use std::fmt;
use std::fmt::Debug;
use std::sync::Condvar as StdCondvar;
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::RwLock as StdRwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::Duration;

const POISONED: &str = "lock is poisoned";

/// Mutual exclusion around `T`.
#[derive(Default)]
pub struct Mutex<T: ?Sized> {
    std: StdMutex<T>,
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Mutex<T> {
        Mutex {
            std: StdMutex::new(value),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Blocks until the lock is held. It is released when the guard drops.
    pub fn lock(&self) -> MutexGuard<T> {
        self.std.lock().expect(POISONED)
    }
}

impl<T: ?Sized + Debug> Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&self.std, f)
    }
}

/// Shared readers or one writer.
#[derive(Default)]
pub struct RwLock<T: ?Sized> {
    std: StdRwLock<T>,
}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> RwLock<T> {
        RwLock {
            std: StdRwLock::new(value),
        }
    }
}

impl<T: ?Sized> RwLock<T> {
    pub fn read(&self) -> RwLockReadGuard<T> {
        self.std.read().expect(POISONED)
    }

    pub fn write(&self) -> RwLockWriteGuard<T> {
        self.std.write().expect(POISONED)
    }

    /// No locking happens; the exclusive borrow already rules out other holders.
    pub fn get_mut(&mut self) -> &mut T {
        self.std.get_mut().expect(POISONED)
    }
}

impl<T: ?Sized + Debug> Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&self.std, f)
    }
}

/// Condition variable paired with a [`Mutex`] guard.
#[derive(Default)]
pub struct Condvar {
    std: StdCondvar,
}

impl Condvar {
    pub const fn new() -> Condvar {
        Condvar {
            std: StdCondvar::new(),
        }
    }

    /// Blocks while `condition` holds, re-checking it after every wakeup.
    pub fn wait_while<'a, T, F>(&self, guard: MutexGuard<'a, T>, condition: F) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        self.std.wait_while(guard, condition).expect(POISONED)
    }

    /// Blocks until notified or until `dur` has passed. Spurious wakeups are possible, so callers
    /// re-check their state.
    pub fn wait_timeout<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        dur: Duration,
    ) -> MutexGuard<'a, T> {
        self.std.wait_timeout(guard, dur).expect(POISONED).0
    }

    pub fn notify_one(&self) {
        self.std.notify_one();
    }

    pub fn notify_all(&self) {
        self.std.notify_all();
    }
}

impl Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Debug::fmt(&self.std, f)
    }
}
