// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flags: the simplest waitable.
//!
//! One task owns the flag and waits on it; anybody else raises it. The
//! bit is consumed by the successful wait, so each `set` is one wake.
//! Setting an already-set flag is idempotent.

use crate::task::Task;
use crate::waitable::{Waitable, WaitableKind};

/// A single-bit, edge-style waitable. `Copy` -- hand copies to whoever
/// needs to signal the owner.
#[derive(Copy, Clone)]
pub struct Flag {
    owner: Option<&'static Task>,
    mask: u32,
}

impl Flag {
    pub fn new(owner: &'static Task) -> Flag {
        let mut flag = Flag::empty();
        flag.init(owner);
        flag
    }

    /// An unbound flag, for building arrays. Bind each element with
    /// [`Flag::init`] before sharing or setting it.
    pub const fn empty() -> Flag {
        Flag {
            owner: None,
            mask: 0,
        }
    }

    /// Binds the flag to its owner, claiming an event bit. Once only.
    pub fn init(&mut self, owner: &'static Task) {
        assert!(!self.is_initialized());
        let bit = owner.query_bit_number(WaitableKind::Flag);
        self.owner = Some(owner);
        self.mask = 1 << bit;
    }

    pub fn is_initialized(&self) -> bool {
        self.mask != 0
    }

    /// Raises the flag in the owner's event vector.
    pub fn set(&self) {
        match self.owner {
            Some(owner) => owner.set_event_bits(self.mask),
            None => panic!("flag set before init"),
        }
    }

    pub fn clear(&self) {
        match self.owner {
            Some(owner) => owner.clear_event_bits(self.mask),
            None => panic!("flag cleared before init"),
        }
    }
}

impl Waitable for Flag {
    fn mask(&self) -> u32 {
        self.mask
    }

    fn kind(&self) -> WaitableKind {
        WaitableKind::Flag
    }
}
