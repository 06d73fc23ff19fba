// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Microsecond software timers.
//!
//! A timer is a waitable: start it, then wait on it (or fold it into a
//! `wait_any` with other waitables). One-shot or periodic, with 64-bit
//! durations -- anything beyond what the 32-bit hardware timer can hold is
//! *chopped* into hardware-sized chunks. The interrupt for each chunk only
//! enqueues a record; the relay task re-arms the next chunk from task
//! context, where taking the multiplexer's critical section is fine.
//!
//! Every start and stop bumps the timer's run-ID. Records still in flight
//! from before the bump carry the old ID and are dropped by the relay, so
//! a stale chunk can never fire a restarted or stopped timer. From one
//! start to its delivery (or stop), the run-ID never changes.
//!
//! For sleeps of a millisecond and up, prefer the kernel's own delay over
//! burning a timer slot.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64};
use core::sync::atomic::Ordering::{Relaxed, SeqCst};

use timermux::{MIN_WAIT_US, TIMER_HANDLE_NONE};

use crate::relay;
use crate::task::Task;
use crate::waitable::{Waitable, WaitableKind};

/// Longest wait a single hardware arm can carry, in microseconds.
pub const MAX_HW_TIME_DEFAULT: u32 = u32::MAX;

/// Fixed scheduling-cost compensation subtracted from short durations.
pub const OVERHEAD_COMPENSATION_US: u64 = 50;

pub(crate) struct TimerInner {
    owner: &'static Task,
    mask: u32,
    /// Multiplexer slot; `TIMER_HANDLE_NONE` until the first start.
    handle: AtomicI32,
    periodic: AtomicBool,
    /// True while a > `max_hw_time` wait is being driven chunk by chunk.
    chopping: AtomicBool,
    /// Total requested duration of the current run.
    total_us: AtomicU64,
    /// Duration the currently-armed hardware chunk covers.
    chunk_us: AtomicU64,
    /// Sum of the chunks that have already fired this run.
    fired_so_far_us: AtomicU64,
    run_id: AtomicU32,
    /// Normally the hardware maximum; tests lower it to exercise chopping
    /// without waiting out a real 2^32 µs.
    max_hw_time: AtomicU32,
}

/// A software timer bound to its owner task. `Copy`: the handle is a
/// pointer to state that lives forever.
#[derive(Copy, Clone)]
pub struct Timer {
    inner: &'static TimerInner,
}

impl Timer {
    /// Claims an event bit on `owner`. The multiplexer slot is taken
    /// lazily on first start, so declaring many timers costs nothing
    /// until they run.
    pub fn new(owner: &'static Task) -> Timer {
        let bit = owner.query_bit_number(WaitableKind::Timer);
        let inner = Box::leak(Box::new(TimerInner {
            owner,
            mask: 1 << bit,
            handle: AtomicI32::new(TIMER_HANDLE_NONE),
            periodic: AtomicBool::new(false),
            chopping: AtomicBool::new(false),
            total_us: AtomicU64::new(0),
            chunk_us: AtomicU64::new(0),
            fired_so_far_us: AtomicU64::new(0),
            run_id: AtomicU32::new(0),
            max_hw_time: AtomicU32::new(MAX_HW_TIME_DEFAULT),
        }));
        Timer { inner }
    }

    /// Arms a one-shot wait of `duration_us`. Restarting a running timer
    /// cancels the pending fire; only the new duration is ever observed.
    pub fn start(&self, duration_us: u64) {
        self.begin(duration_us, false);
    }

    /// Arms a periodic fire every `period_us` until stopped.
    pub fn start_periodic(&self, period_us: u64) {
        self.begin(period_us, true);
    }

    /// Cancels the timer and the owner's pending bit. In-flight interrupt
    /// records die against the bumped run-ID.
    pub fn stop(&self) {
        let inner = self.inner;
        inner.run_id.fetch_add(1, SeqCst);
        let handle = inner.handle.load(Relaxed);
        if timermux::is_valid(handle) {
            timermux::stop_timer(handle);
        }
        inner.owner.clear_event_bits(inner.mask);
        inner.total_us.store(0, Relaxed);
        inner.chunk_us.store(0, Relaxed);
        inner.chopping.store(false, Relaxed);
    }

    /// Starts the timer and blocks the owner on it. Call from the owner
    /// task only.
    pub fn sleep_us(&self, duration_us: u64) {
        self.start(duration_us);
        self.inner.owner.wait(self);
    }

    /// Lowers the per-chunk hardware ceiling. A test hook: chopping paths
    /// become reachable in milliseconds instead of ages.
    pub fn set_max_hw_time(&self, max_hw_time_us: u32) {
        self.inner.max_hw_time.store(max_hw_time_us, Relaxed);
    }

    pub fn max_hw_time(&self) -> u32 {
        self.inner.max_hw_time.load(Relaxed)
    }

    pub fn is_long_chopping_active(&self) -> bool {
        self.inner.chopping.load(Relaxed)
    }

    /// Microseconds of the current run already covered by fired chunks.
    pub fn fired_so_far_us(&self) -> u64 {
        self.inner.fired_so_far_us.load(Relaxed)
    }

    fn begin(&self, duration_us: u64, periodic: bool) {
        let inner = self.inner;
        inner.run_id.fetch_add(1, SeqCst);
        self.create_if_needed();
        assert!(duration_us >= MIN_WAIT_US);
        inner.periodic.store(periodic, Relaxed);
        self.handle_start(duration_us);
    }

    fn create_if_needed(&self) {
        let inner = self.inner;
        if timermux::is_valid(inner.handle.load(Relaxed)) {
            return;
        }
        let handle = match timermux::create_timer(
            inner.owner.name(),
            timer_interrupt,
            inner as *const TimerInner as *mut (),
        ) {
            Some(h) => h,
            None => panic!("timer capacity exhausted"),
        };
        inner.handle.store(handle, Relaxed);
    }

    fn handle_start(&self, duration_us: u64) {
        let inner = self.inner;
        // Drop any leftover bit from an earlier run.
        inner.owner.clear_event_bits(inner.mask);

        inner.total_us.store(duration_us, Relaxed);
        inner.fired_so_far_us.store(0, Relaxed);

        let max_hw = u64::from(inner.max_hw_time.load(Relaxed));
        let handle = inner.handle.load(Relaxed);

        if duration_us <= max_hw {
            // Fits in one hardware arm; the multiplexer handles periodic
            // re-arming by itself.
            inner.chopping.store(false, Relaxed);
            let chunk = if duration_us <= OVERHEAD_COMPENSATION_US {
                1
            } else {
                duration_us - OVERHEAD_COMPENSATION_US
            };
            inner.chunk_us.store(chunk, Relaxed);
            timermux::start_timer(
                handle,
                chunk as u32,
                inner.periodic.load(Relaxed),
            );
        } else {
            // Chop: arm one maximal chunk, one-shot; the relay drives the
            // rest. Periodicity is replayed at the chopping level, not the
            // hardware level.
            inner.chopping.store(true, Relaxed);
            inner.chunk_us.store(max_hw, Relaxed);
            timermux::start_timer(handle, max_hw as u32, false);
        }
    }

    /// Relay-side continuation of a chopped wait. Returns false when the
    /// record was stale and nothing happened.
    pub(crate) fn rearm_to_continue_long_timing(
        &self,
        relayed_run_id: u32,
    ) -> bool {
        let inner = self.inner;
        if inner.run_id.load(SeqCst) != relayed_run_id {
            // The run this chunk belonged to was stopped or restarted.
            return false;
        }

        let fired = inner.fired_so_far_us.load(Relaxed)
            + inner.chunk_us.load(Relaxed);
        inner.fired_so_far_us.store(fired, Relaxed);

        let total = inner.total_us.load(Relaxed);
        let mut left = total.saturating_sub(fired);
        if left < MIN_WAIT_US {
            // Not enough remainder for another hardware round trip.
            inner.fired_so_far_us.store(total, Relaxed);
            left = 0;
        }

        if left == 0 {
            if inner.periodic.load(Relaxed) {
                // Chopped periodic: wind up the whole duration again.
                self.start_periodic(total);
            } else {
                inner.chopping.store(false, Relaxed);
            }
            inner.owner.set_event_bits(inner.mask);
        } else {
            let chunk = left.min(u64::from(inner.max_hw_time.load(Relaxed)));
            inner.chunk_us.store(chunk, Relaxed);
            let handle = inner.handle.load(Relaxed);
            timermux::start_timer(handle, chunk as u32, false);
            // A stop may have slipped in between the staleness check and
            // the arm just issued; its run-ID bump is the tell.
            if inner.run_id.load(SeqCst) != relayed_run_id {
                timermux::stop_timer(handle);
                return false;
            }
        }
        true
    }

    /// Final delivery: raise the owner's bit. Relay context.
    pub(crate) fn deliver(&self) {
        self.inner.owner.set_event_bits(self.inner.mask);
    }

    pub(crate) fn run_id(&self) -> u32 {
        self.inner.run_id.load(SeqCst)
    }
}

impl Waitable for Timer {
    fn mask(&self) -> u32 {
        self.inner.mask
    }

    fn kind(&self) -> WaitableKind {
        WaitableKind::Timer
    }
}

/// Multiplexer callback, interrupt context: hand everything to the relay.
/// Chunked waits need their next chunk armed; finished waits get their
/// bit delivered in queue order rather than at interrupt priority.
fn timer_interrupt(arg: *mut ()) {
    // Safety: `arg` is the leaked TimerInner this slot was created with.
    let inner: &'static TimerInner =
        unsafe { &*(arg as *const TimerInner) };
    let timer = Timer { inner };
    let run_id = inner.run_id.load(SeqCst);
    if inner.chopping.load(Relaxed) {
        relay::request_rearm(timer, run_id);
    } else {
        relay::request_deliver(timer, run_id);
    }
}
