// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot 32-bit hardware timer with a 1 µs tick.
//!
//! `fire_after_us(n)` arms the countdown; when it expires the registered
//! callback runs in interrupt context. `pause`/`resume` freeze and continue
//! the countdown; the timer multiplexer pauses the counter before taking
//! its critical section so the interrupt cannot land mid-update.
//!
//! On bare metal the five entry points bind to the platform's timer
//! peripheral glue. Hosted, a worker thread plays the part of the counter
//! and its interrupt; `pause()` additionally waits out a callback already
//! in flight, which is the exclusion a real pause gets for free from the
//! counter having stopped.

#![cfg_attr(target_os = "none", no_std)]

/// Interrupt callback: the opaque pointer is whatever was registered
/// alongside it.
pub type Callback = fn(*mut ());

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "none"))] {
        use std::sync::{Condvar, Mutex};
        use std::thread;
        use std::time::{Duration, Instant};

        struct State {
            started: bool,
            callback: Option<(Callback, *mut ())>,
            armed: bool,
            paused: bool,
            deadline: Option<Instant>,
            remaining: Duration,
            in_callback: bool,
            worker: Option<thread::ThreadId>,
        }

        // Safety: the raw user pointer is only handed back to the
        // registered callback, which owns its meaning.
        unsafe impl Send for State {}

        static STATE: Mutex<State> = Mutex::new(State {
            started: false,
            callback: None,
            armed: false,
            paused: false,
            deadline: None,
            remaining: Duration::ZERO,
            in_callback: false,
            worker: None,
        });
        static COND: Condvar = Condvar::new();

        fn worker() {
            let mut s = STATE.lock().unwrap();
            s.worker = Some(thread::current().id());
            loop {
                let now = Instant::now();
                let due = s.armed
                    && !s.paused
                    && s.deadline.map(|d| now >= d).unwrap_or(false);
                if due {
                    s.armed = false;
                    s.in_callback = true;
                    let cb = s.callback;
                    drop(s);
                    if let Some((f, user)) = cb {
                        f(user);
                    }
                    s = STATE.lock().unwrap();
                    s.in_callback = false;
                    COND.notify_all();
                    continue;
                }
                s = if let (true, false, Some(d)) =
                    (s.armed, s.paused, s.deadline)
                {
                    let wait = d.saturating_duration_since(now);
                    COND.wait_timeout(s, wait).unwrap().0
                } else {
                    COND.wait(s).unwrap()
                };
            }
        }

        /// Brings the timer up, stopped. Idempotent.
        pub fn init() {
            let mut s = STATE.lock().unwrap();
            if !s.started {
                s.started = true;
                thread::Builder::new()
                    .name("hw-timer".into())
                    .spawn(worker)
                    .unwrap();
            }
        }

        pub fn set_callback(callback: Callback, user: *mut ()) {
            let mut s = STATE.lock().unwrap();
            s.callback = Some((callback, user));
        }

        /// Programs the one-shot countdown. Replaces any countdown already
        /// in progress. While paused, the new countdown starts on resume.
        pub fn fire_after_us(delay_us: u32) {
            let dur = Duration::from_micros(u64::from(delay_us));
            let mut s = STATE.lock().unwrap();
            s.armed = true;
            if s.paused {
                s.remaining = dur;
                s.deadline = None;
            } else {
                s.deadline = Some(Instant::now() + dur);
            }
            COND.notify_all();
        }

        /// Freezes the countdown. Does not return while a callback is in
        /// flight.
        pub fn pause() {
            let mut s = STATE.lock().unwrap();
            if !s.paused {
                if let (true, Some(d)) = (s.armed, s.deadline) {
                    s.remaining =
                        d.saturating_duration_since(Instant::now());
                    s.deadline = None;
                }
                s.paused = true;
            }
            // A callback pausing the timer (reprogramming from interrupt
            // context) must not wait for itself to finish.
            let me = thread::current().id();
            while s.in_callback && s.worker != Some(me) {
                s = COND.wait(s).unwrap();
            }
        }

        pub fn resume() {
            let mut s = STATE.lock().unwrap();
            if s.paused {
                s.paused = false;
                if s.armed {
                    s.deadline = Some(Instant::now() + s.remaining);
                }
                COND.notify_all();
            }
        }

        pub fn is_running() -> bool {
            let s = STATE.lock().unwrap();
            s.armed && !s.paused
        }
    } else {
        extern "C" {
            fn hw_timer_init();
            fn hw_timer_set_callback(cb: Callback, user: *mut ());
            fn hw_timer_fire_after_us(delay_us: u32);
            fn hw_timer_pause();
            fn hw_timer_resume();
            fn hw_timer_is_running() -> u8;
        }

        pub fn init() {
            unsafe { hw_timer_init() }
        }

        pub fn set_callback(callback: Callback, user: *mut ()) {
            unsafe { hw_timer_set_callback(callback, user) }
        }

        pub fn fire_after_us(delay_us: u32) {
            unsafe { hw_timer_fire_after_us(delay_us) }
        }

        pub fn pause() {
            unsafe { hw_timer_pause() }
        }

        pub fn resume() {
            unsafe { hw_timer_resume() }
        }

        pub fn is_running() -> bool {
            unsafe { hw_timer_is_running() != 0 }
        }
    }
}
