// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small utility bits shared across the workspace.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A RefCell-alike for use in statics.
///
/// Unlike `RefCell` this is `Sync`, and it hands out only mutable borrows.
/// A second borrow while one is outstanding panics: callers are expected to
/// hold borrows only for short, non-overlapping critical moments (a trace
/// entry, a stack push). The panic is the diagnostic, not a control path.
pub struct StaticCell<T> {
    borrowed: AtomicBool,
    cell: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for StaticCell<T> {}

impl<T> StaticCell<T> {
    pub const fn new(contents: T) -> Self {
        Self {
            borrowed: AtomicBool::new(false),
            cell: UnsafeCell::new(contents),
        }
    }

    /// Claims the cell, panicking if it is already claimed.
    pub fn borrow_mut(&self) -> StaticRef<'_, T> {
        let already = self.borrowed.swap(true, Ordering::Acquire);
        if already {
            panic!();
        }
        StaticRef { cell: self }
    }
}

/// Exclusive borrow of a [`StaticCell`], released on drop.
pub struct StaticRef<'a, T> {
    cell: &'a StaticCell<T>,
}

impl<T> Deref for StaticRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the borrowed flag grants exclusivity until drop.
        unsafe { &*self.cell.cell.get() }
    }
}

impl<T> DerefMut for StaticRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: as above.
        unsafe { &mut *self.cell.cell.get() }
    }
}

impl<T> Drop for StaticRef<'_, T> {
    fn drop(&mut self) {
        self.cell.borrowed.store(false, Ordering::Release);
    }
}
