// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Corral: cooperative concurrency for small systems on a preemptive
//! kernel.
//!
//! The kernel underneath preempts; this layer makes the pieces compose.
//! Each [`Task`] owns an event-bit vector, and everything a task can block
//! on -- a [`Flag`] another task raises, a bounded [`Queue`] of messages, a
//! microsecond [`Timer`] -- is a *waitable* occupying one bit of it. A task
//! blocks on any one waitable, on a conjunction, or on a disjunction of
//! them with a single wait call.
//!
//! Timers multiplex onto one 32-bit hardware timer; durations beyond the
//! hardware range are chopped into chunks and re-armed from task context
//! by a relay task, so interrupt handlers stay short. Shared data goes in
//! a [`Pool`]; cross-cutting locking uses the ordered [`Mutex`], whose
//! per-task ID discipline makes lock cycles unrepresentable.
//!
//! Call [`init`] exactly once, before creating any task that uses timers
//! or the clock:
//!
//! ```ignore
//! corral::init();
//! let worker = Task::create("worker", Priority::Normal, 4096);
//! let tick = Timer::new(worker);
//! worker.start(move |task| loop {
//!     tick.start(500_000);
//!     task.wait(&tick);
//!     // ...
//! });
//! ```
//!
//! Everything is built at startup and lives forever; nothing here
//! allocates after init.

#![cfg_attr(target_os = "none", no_std)]

extern crate alloc;

use core::sync::atomic::{AtomicBool, Ordering};

pub mod config;
mod flag;
mod pool;
mod queue;
mod relay;
mod sync;
mod task;
pub mod time;
mod timer;
mod waitable;

pub use flag::Flag;
pub use kapi::Priority;
pub use pool::Pool;
pub use queue::Queue;
pub use sync::{Mutex, MutexSection, SimpleMutex, SimpleMutexSection};
pub use task::Task;
pub use timer::{Timer, MAX_HW_TIME_DEFAULT, OVERHEAD_COMPENSATION_US};
pub use waitable::{Waitable, WaitableKind};

static INITED: AtomicBool = AtomicBool::new(false);

/// Brings up the process-wide services, in order: the monotonic clock and
/// its accumulation task, the virtual timer multiplexer, and the
/// long-timer relay task. Call exactly once, before user tasks exist.
pub fn init() {
    let was = INITED.swap(true, Ordering::SeqCst);
    assert!(!was);

    monoclock::start();
    time::start_clock_task();
    timermux::init();
    relay::start_relay_task();
}
