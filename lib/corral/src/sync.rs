// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mutexes, ordered and plain, and their scope guards.
//!
//! The ordered [`Mutex`] carries a fixed positive ID, and every task keeps
//! a stack of the IDs it holds: locking is only legal with an ID strictly
//! above the current top. All tasks therefore acquire along one global
//! order, and a lock cycle -- the shape of every deadlock -- cannot be
//! expressed. Violations are caught at the offending `lock`, not at the
//! eventual deadlock.
//!
//! [`SimpleMutex`] skips the discipline. It is reserved for scopes that
//! can never hold a second mutex, like the one inside [`crate::Pool`].
//!
//! Prefer the section guards over raw lock/unlock; they release on every
//! exit path.

use kapi::{RawMutex, Timeout};

use crate::task::Task;

/// Kernel mutex with a deadlock-order ID. ID 0 is reserved to mean
/// "holding nothing".
pub struct Mutex {
    id: u32,
    raw: RawMutex,
}

impl Mutex {
    pub fn new(id: u32) -> Mutex {
        assert!(id != 0, "mutex ID 0 is reserved");
        Mutex {
            id,
            raw: RawMutex::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Acquires on behalf of the calling task, which must be `task`.
    /// Asserts the ordering discipline; retries transient kernel refusals
    /// with a yield in between, which keeps watchdogs fed.
    pub fn lock(&self, task: &Task) {
        assert!(
            self.id > task.mutex_stack_top(),
            "mutex lock order violation"
        );
        loop {
            match self.raw.acquire(Timeout::Forever) {
                Ok(()) => break,
                Err(_) => kapi::yield_now(),
            }
        }
        task.push_mutex_id(self.id);
    }

    pub fn unlock(&self, task: &Task) {
        let popped = task.pop_mutex_id();
        assert!(popped == self.id, "mutex unlock out of order");
        self.raw.release();
    }
}

/// Scope guard over an ordered [`Mutex`]: locks on construction, unlocks
/// on drop.
pub struct MutexSection<'a> {
    task: &'a Task,
    mutex: &'a Mutex,
}

impl<'a> MutexSection<'a> {
    pub fn new(task: &'a Task, mutex: &'a Mutex) -> Self {
        mutex.lock(task);
        MutexSection { task, mutex }
    }
}

impl Drop for MutexSection<'_> {
    fn drop(&mut self) {
        self.mutex.unlock(self.task);
    }
}

/// Kernel mutex without the ordering discipline. Only for scopes that by
/// construction never take a second mutex.
pub struct SimpleMutex {
    raw: RawMutex,
}

impl SimpleMutex {
    pub fn new() -> SimpleMutex {
        SimpleMutex {
            raw: RawMutex::new(),
        }
    }

    pub fn lock(&self) {
        loop {
            match self.raw.acquire(Timeout::Forever) {
                Ok(()) => break,
                Err(_) => kapi::yield_now(),
            }
        }
    }

    pub fn unlock(&self) {
        self.raw.release();
    }
}

impl Default for SimpleMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope guard over a [`SimpleMutex`].
pub struct SimpleMutexSection<'a> {
    mutex: &'a SimpleMutex,
}

impl<'a> SimpleMutexSection<'a> {
    pub fn new(mutex: &'a SimpleMutex) -> Self {
        mutex.lock();
        SimpleMutexSection { mutex }
    }
}

impl Drop for SimpleMutexSection<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
