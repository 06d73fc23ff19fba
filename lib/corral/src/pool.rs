// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pools: shared data without visible locking.
//!
//! A pool is a single protected cell. Readers and writers move whole
//! copies in and out, and the update operators run a caller-provided
//! operation on the cell under the pool's own mutex, so a read-modify-
//! write cannot interleave with anyone else's.
//!
//! The internal mutex is a [`SimpleMutex`]: a pool section never takes a
//! second mutex, so the ordering discipline has nothing to order.

use core::cell::UnsafeCell;

use crate::sync::{SimpleMutex, SimpleMutexSection};

pub struct Pool<T: Copy> {
    data: UnsafeCell<T>,
    mutex: SimpleMutex,
}

// Safety: all access to `data` happens under `mutex`.
unsafe impl<T: Copy + Send> Sync for Pool<T> {}

impl<T: Copy> Pool<T> {
    pub fn new(initial: T) -> Pool<T> {
        Pool {
            data: UnsafeCell::new(initial),
            mutex: SimpleMutex::new(),
        }
    }

    pub fn read(&self) -> T {
        let _section = SimpleMutexSection::new(&self.mutex);
        unsafe { *self.data.get() }
    }

    pub fn write(&self, value: T) {
        let _section = SimpleMutexSection::new(&self.mutex);
        unsafe { *self.data.get() = value }
    }

    /// Runs `op` on the cell contents atomically with respect to every
    /// other pool operation.
    pub fn atomic_update(&self, op: impl FnOnce(&mut T)) {
        let _section = SimpleMutexSection::new(&self.mutex);
        op(unsafe { &mut *self.data.get() });
    }

    /// Like [`Pool::atomic_update`], for operations needing an argument.
    /// Bundle several into a struct if one is not enough.
    pub fn atomic_update_with<A>(&self, op: impl FnOnce(&mut T, A), arg: A) {
        let _section = SimpleMutexSection::new(&self.mutex);
        op(unsafe { &mut *self.data.get() }, arg);
    }

    /// Atomically updates and returns the post-update contents.
    pub fn read_atomic_update(&self, op: impl FnOnce(&mut T)) -> T {
        let _section = SimpleMutexSection::new(&self.mutex);
        let data = unsafe { &mut *self.data.get() };
        op(data);
        *data
    }

    /// Atomically updates with an argument and returns the post-update
    /// contents.
    pub fn read_atomic_update_with<A>(
        &self,
        op: impl FnOnce(&mut T, A),
        arg: A,
    ) -> T {
        let _section = SimpleMutexSection::new(&self.mutex);
        let data = unsafe { &mut *self.data.get() };
        op(data, arg);
        *data
    }
}
