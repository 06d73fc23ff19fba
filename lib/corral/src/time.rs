// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Monotonic time since startup.
//!
//! The readings come from the lock-free accumulator in `monoclock`; this
//! module owns the task that keeps the accumulator fed. The task wakes at
//! half the cycle-counter wrap interval, so the 32-bit counter can never
//! wrap twice between accumulations even with scheduling slop on top.

use kapi::Priority;

use crate::task::Task;

/// Microseconds since startup. Monotonic, ISR-readable.
pub fn now_us() -> u64 {
    monoclock::now_us()
}

/// Milliseconds since startup.
pub fn now_ms() -> u64 {
    monoclock::now_ms()
}

/// Whole seconds since startup.
pub fn now_s() -> u64 {
    monoclock::now_s()
}

/// Spawns the clock accumulation task. Called from `init` only.
pub(crate) fn start_clock_task() {
    let task = Task::create("clock", Priority::Normal, 1200);
    task.start(|task| {
        kapi::sleep_ms(100);
        let interval_ms = monoclock::ms_per_overflow_check();
        loop {
            task.dump_stack_high_watermark_if_increased();
            monoclock::accumulate();
            kapi::sleep_ms(interval_ms);
        }
    });
}
