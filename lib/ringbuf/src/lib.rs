// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed trace ring buffers.
//!
//! A module that has something worth recording declares a buffer of typed
//! entries and appends to it from its hot paths; a debugger (or a test)
//! reads the buffer back out. There is no formatting and no I/O, which is
//! what makes this affordable in paths that run thousands of times a
//! second.
//!
//! ```ignore
//! #[derive(Copy, Clone, PartialEq)]
//! enum Trace {
//!     None,
//!     StaleRecordDropped(u32),
//! }
//! ringbuf!(Trace, 16, Trace::None);
//!
//! fn on_stale(run_id: u32) {
//!     ringbuf_entry!(Trace::StaleRecordDropped(run_id));
//! }
//! ```

#![cfg_attr(target_os = "none", no_std)]

/// Re-export the bits the macro expansions lean on, so they resolve
/// regardless of what the declaring module has in scope.
pub use kapi::critical_section;
pub use kapi::util::StaticCell;

/// Declares a ring buffer in the current module.
///
/// `ringbuf!(Type, N, expr)` makes a module-local buffer holding `N`
/// entries of `Type`, all initialized to `expr`. Give it an explicit name
/// with `ringbuf!(NAME, Type, N, expr)` if one module needs several.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::StaticCell<$crate::Ringbuf<$t, $n>> =
            $crate::StaticCell::new($crate::Ringbuf {
                last: None,
                buffer: [$init; $n],
            });
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: ($t, usize) = ($init, $n);
    };
    ($t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: ($t, usize) = ($init, $n);
    };
}

/// Appends an entry to a ring buffer declared with [`ringbuf!`].
///
/// The append happens inside a kernel critical section, so entries from
/// concurrent tasks cannot trample the same slot.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:ident, $payload:expr) => {{
        let payload = $payload;
        $crate::critical_section(|| {
            $buf.borrow_mut().entry(payload);
        });
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:ident, $payload:expr) => {{
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

///
/// A ring buffer of parametrized size. In practice, instantiating this
/// directly is strange -- see the [`ringbuf!`] macro.
///
#[derive(Debug)]
pub struct Ringbuf<T: Copy, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [T; N],
}

impl<T: Copy, const N: usize> Ringbuf<T, N> {
    pub fn entry(&mut self, payload: T) {
        let ndx = match self.last {
            None => 0,
            Some(last) => {
                if last + 1 >= self.buffer.len() {
                    0
                } else {
                    last + 1
                }
            }
        };

        self.buffer[ndx] = payload;
        self.last = Some(ndx);
    }
}
