// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed bindings over the preemptive kernel this library runs on.
//!
//! Everything above this crate talks to the kernel exclusively through the
//! types and free functions defined here: threads, event flag groups,
//! mutexes, bounded message queues, critical sections, sleeping and
//! yielding. Two ports implement the same surface:
//!
//! - `target_os = "none"`: `extern "C"` bindings to a CMSIS-RTOS2 flavoured
//!   kernel. Nothing in this port is ever exercised on a workstation; it is
//!   the shape the linker resolves against the platform glue.
//! - hosted (everything else): a std-backed rendition -- threads for tasks,
//!   mutex/condvar pairs for event groups and queues, and a process-global
//!   re-entrant lock standing in for the kernel critical section. This port
//!   exists so the full stack runs under `cargo test`.
//!
//! The split follows the dependency gating the rest of this workspace uses
//! for kernel-facing code.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

use alloc::boxed::Box;

#[macro_use]
extern crate bitflags;

pub mod util;

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        #[path = "port/cmsis.rs"]
        mod port;
    } else {
        #[path = "port/hosted.rs"]
        mod port;
    }
}

/// Number of event bits a single group reliably supports. The kernel keeps
/// the bits above this for itself.
pub const EVENT_BITS_SUPPORTED: u32 = 24;

/// Fixed thread priority, from idle upward.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Priority {
    Idle,
    Low,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    Realtime,
}

/// How long a blocking kernel call may wait. Ticks are milliseconds; the
/// target port asserts a 1 kHz tick at init.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Timeout {
    Forever,
    Ticks(u32),
}

/// Kernel status codes we can meaningfully get back from a call. The values
/// match the target kernel's `osStatus_t` so the port can map them with
/// `FromPrimitive`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, num_derive::FromPrimitive)]
pub enum KernelError {
    Unknown = -1,
    Timeout = -2,
    Resource = -3,
    Parameter = -4,
    NoMemory = -5,
    Isr = -6,
}

bitflags! {
    /// Options for `EventGroup::wait`. The bit values coincide with the
    /// target kernel's wait flags, so the port passes them straight through.
    pub struct WaitOpts: u32 {
        /// Wait until every requested bit is set, not just any of them.
        const ALL = 1;
        /// Leave the bits set when the wait is satisfied.
        const NO_CLEAR = 2;
    }
}

/// A group of event flag bits tasks can block on.
///
/// `set` is callable from any context the kernel allows, including ISRs; the
/// blocking `wait` belongs to the task that owns the group.
pub struct EventGroup {
    inner: port::EventGroup,
}

impl EventGroup {
    pub fn new() -> Self {
        Self {
            inner: port::EventGroup::new(),
        }
    }

    /// Sets `bits` in the group, waking waiters whose condition is now met.
    pub fn set(&self, bits: u32) {
        self.inner.set(bits);
    }

    pub fn clear(&self, bits: u32) {
        self.inner.clear(bits);
    }

    /// Non-blocking snapshot of the current bit state.
    pub fn get(&self) -> u32 {
        self.inner.get()
    }

    /// Blocks until the bits in `mask` satisfy `opts`, or the timeout runs
    /// out. On success returns the full bit state observed at the moment the
    /// condition was met, before any clearing took place. Unless
    /// `WaitOpts::NO_CLEAR` is given, the waited-for bits are cleared.
    pub fn wait(
        &self,
        mask: u32,
        opts: WaitOpts,
        timeout: Timeout,
    ) -> Result<u32, KernelError> {
        self.inner.wait(mask, opts, timeout)
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// A plain kernel mutex. No ordering discipline, no recursion; the layers
/// above add policy.
pub struct RawMutex {
    inner: port::Mutex,
}

impl RawMutex {
    pub fn new() -> Self {
        Self {
            inner: port::Mutex::new(),
        }
    }

    pub fn acquire(&self, timeout: Timeout) -> Result<(), KernelError> {
        self.inner.acquire(timeout)
    }

    /// Releases the mutex. Releasing a mutex this task does not hold is a
    /// programmer error and asserts.
    pub fn release(&self) {
        self.inner.release();
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity FIFO of `Copy` messages.
///
/// `put` with `Timeout::Ticks(0)` is the ISR-safe form on the target.
pub struct MessageQueue<T: Copy + Send + 'static> {
    inner: port::Queue<T>,
}

impl<T: Copy + Send + 'static> MessageQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: port::Queue::new(capacity),
        }
    }

    pub fn put(&self, value: T, timeout: Timeout) -> Result<(), KernelError> {
        self.inner.put(value, timeout)
    }

    pub fn get(&self, timeout: Timeout) -> Result<T, KernelError> {
        self.inner.get(timeout)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A detached, `Copy` handle that can report the queue's occupancy
    /// without borrowing the queue itself.
    pub fn count_probe(&self) -> CountProbe {
        CountProbe {
            inner: self.inner.count_probe(),
        }
    }
}

/// See [`MessageQueue::count_probe`].
#[derive(Copy, Clone)]
pub struct CountProbe {
    inner: port::CountProbe,
}

impl CountProbe {
    pub fn count(&self) -> usize {
        self.inner.count()
    }
}

/// Opaque handle for a spawned kernel thread. Threads here are never joined
/// or destroyed, so the handle is only good for identity and debugging.
pub struct TaskHandle {
    #[allow(dead_code)]
    inner: port::TaskHandle,
}

/// Spawns a kernel thread. The hosted port ignores `priority` and
/// `stack_bytes` (the host's defaults are far larger than anything an
/// embedded task would ask for).
pub fn spawn(
    name: &'static str,
    priority: Priority,
    stack_bytes: usize,
    main: Box<dyn FnOnce() + Send + 'static>,
) -> TaskHandle {
    TaskHandle {
        inner: port::spawn(name, priority, stack_bytes, main),
    }
}

/// Sleeps the calling thread for at least `ms` milliseconds.
pub fn sleep_ms(ms: u32) {
    port::sleep_ms(ms);
}

pub fn yield_now() {
    port::yield_now();
}

/// Runs `f` inside a kernel critical section.
///
/// On the target this masks the scheduler (peripheral interrupts of higher
/// priority keep running); hosted it is a process-global re-entrant lock, so
/// it additionally excludes the simulated interrupt threads. Do not block
/// inside.
pub fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    port::critical_section(f)
}

/// Remaining stack headroom of the calling thread in bytes, where the
/// kernel can tell us. The hosted port cannot.
pub fn stack_high_watermark_bytes() -> Option<u32> {
    port::stack_high_watermark_bytes()
}
