// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Free-running 32-bit CPU cycle counter.
//!
//! This is the raw timebase underneath the monotonic clock: `start()` once
//! at init, and from then on somebody upstream periodically folds
//! `get()`/`reset()` into a 64-bit total before the 32 bits can wrap.
//!
//! On Cortex-M targets this is the DWT cycle counter. On other bare-metal
//! targets the platform supplies the three functions. Hosted, the counter
//! is derived from `Instant` at a fixed simulated core clock, wrapping at
//! 32 bits like the real thing.

#![cfg_attr(target_os = "none", no_std)]

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "none"))] {
        use std::sync::Mutex;
        use std::time::Instant;

        /// Simulated core clock. High enough that microsecond conversions
        /// stay exact, low enough that the 32-bit counter behaves like
        /// real hardware (wrap roughly every 43 s).
        const SIM_CLOCK_HZ: u32 = 100_000_000;

        static BASE: Mutex<Option<Instant>> = Mutex::new(None);

        pub fn clock_hz() -> u32 {
            SIM_CLOCK_HZ
        }

        /// Starts the counter from zero. Idempotent.
        pub fn start() {
            let mut base = BASE.lock().unwrap();
            if base.is_none() {
                *base = Some(Instant::now());
            }
        }

        pub fn reset() {
            *BASE.lock().unwrap() = Some(Instant::now());
        }

        pub fn get() -> u32 {
            let base = BASE.lock().unwrap();
            let base = base.expect("cycle counter read before start");
            let nanos = base.elapsed().as_nanos();
            // cycles = ns * hz / 1e9, wrapped to the counter width
            ((nanos * SIM_CLOCK_HZ as u128) / 1_000_000_000) as u32
        }
    } else if #[cfg(target_arch = "arm")] {
        use cortex_m::peripheral::DWT;

        const CYCCNTENA: u32 = 1;

        extern "C" {
            // CMSIS-owned; set by the startup code from the PLL config.
            static SystemCoreClock: u32;
        }

        pub fn clock_hz() -> u32 {
            unsafe { SystemCoreClock }
        }

        fn regs() -> *mut cortex_m::peripheral::dwt::RegisterBlock {
            DWT::PTR as *mut _
        }

        /// Starts the counter from zero. Idempotent.
        pub fn start() {
            unsafe {
                (*regs()).cyccnt.write(0);
                let ctrl = (*regs()).ctrl.read();
                (*regs()).ctrl.write(ctrl | CYCCNTENA);
            }
        }

        pub fn reset() {
            unsafe {
                (*regs()).cyccnt.write(0);
            }
        }

        pub fn get() -> u32 {
            unsafe { (*regs()).cyccnt.read() }
        }
    } else {
        // Non-ARM bare metal: the platform provides the counter.
        extern "C" {
            fn cycle_counter_clock_hz() -> u32;
            fn start_cycle_count();
            fn reset_cycle_count();
            fn get_cycle_count() -> u32;
        }

        pub fn clock_hz() -> u32 {
            unsafe { cycle_counter_clock_hz() }
        }

        pub fn start() {
            unsafe { start_cycle_count() }
        }

        pub fn reset() {
            unsafe { reset_cycle_count() }
        }

        pub fn get() -> u32 {
            unsafe { get_cycle_count() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn counts_forward_and_resets() {
        start();
        start(); // idempotent
        reset();
        let a = get();
        thread::sleep(Duration::from_millis(10));
        let b = get();
        // 10 ms at 100 MHz is a million cycles; allow generous scheduler
        // slack on either side.
        assert!(b > a);
        assert!(b - a >= 500_000, "only {} cycles elapsed", b - a);
        reset();
        assert!(get() < 500_000);
    }
}
