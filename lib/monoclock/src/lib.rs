// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Monotonic microsecond timebase.
//!
//! The hardware gives us a free-running 32-bit cycle counter; this module
//! widens it to 64 bits. A single writer -- the clock task upstream -- calls
//! [`accumulate`] often enough that the counter cannot wrap between calls,
//! folding the counted cycles into a 64-bit total and zeroing the counter.
//! Readers combine `total + counter` lock-free under an even/odd sequence
//! counter: a torn read (sequence moved, or odd) is simply retried.
//!
//! Reads are safe from any task and, on the target, from interrupt
//! handlers: the one writer runs in task context, so an ISR can never
//! observe its own interrupted update.

#![cfg_attr(target_os = "none", no_std)]

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

static SEQ: AtomicU32 = AtomicU32::new(0);
static TOTAL: AtomicU64 = AtomicU64::new(0);

/// Starts the cycle counter. Call once, before the first reader.
pub fn start() {
    drv_cycle_counter::start();
}

/// Folds the counted cycles into the 64-bit total and restarts the
/// counter. Single writer only; the clock task owns this.
pub fn accumulate() {
    let seq = SEQ.load(Ordering::Relaxed);
    SEQ.store(seq.wrapping_add(1), Ordering::Release); // odd: update open
    let counted = u64::from(drv_cycle_counter::get());
    drv_cycle_counter::reset();
    TOTAL.fetch_add(counted, Ordering::Relaxed);
    SEQ.store(seq.wrapping_add(2), Ordering::Release); // even: update done
}

/// Total cycles since start.
pub fn total_cycles() -> u64 {
    loop {
        let before = SEQ.load(Ordering::Acquire);
        if before & 1 != 0 {
            // update in progress
            core::hint::spin_loop();
            continue;
        }
        let cycles = TOTAL.load(Ordering::Relaxed)
            + u64::from(drv_cycle_counter::get());
        if SEQ.load(Ordering::Acquire) == before {
            return cycles;
        }
    }
}

/// Microseconds since start.
pub fn now_us() -> u64 {
    total_cycles() * 1_000_000 / u64::from(drv_cycle_counter::clock_hz())
}

/// Milliseconds since start.
pub fn now_ms() -> u64 {
    total_cycles() * 1_000 / u64::from(drv_cycle_counter::clock_hz())
}

/// Whole seconds since start.
pub fn now_s() -> u64 {
    total_cycles() / u64::from(drv_cycle_counter::clock_hz())
}

/// How often the writer must run so the 32-bit counter cannot wrap
/// between two accumulations: half the wrap interval, in milliseconds.
pub fn ms_per_overflow_check() -> u32 {
    let overflow_secs =
        (1u64 << 31) / u64::from(drv_cycle_counter::clock_hz());
    ((overflow_secs * 1_000) / 2) as u32
}
