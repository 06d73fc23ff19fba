// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Virtual timer multiplexer.
//!
//! One 32-bit one-shot hardware timer fans out to up to [`MAX_TIMERS`]
//! software timers. Scheduled entries sit on an intrusive singly-linked
//! list sorted by absolute due time; the hardware is always programmed for
//! the head. On interrupt (and opportunistically on every start/stop) the
//! due entries are collected off the head, their callbacks run, periodic
//! entries are re-inserted, and the hardware is re-armed for the new head.
//!
//! Locking discipline, in order: pause the hardware timer, then enter the
//! kernel critical section. Callbacks always run outside the critical
//! section and must confine themselves to ISR-safe work -- set an event
//! bit, enqueue a relay record, return.
//!
//! Insertion uses strict less-than, so entries sharing a due time fire in
//! the order they were scheduled.

#![cfg_attr(target_os = "none", no_std)]

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use indexpool::IndexPool;

/// Multiplexer capacity.
pub const MAX_TIMERS: usize = 100;

/// Shortest wait the stack will schedule, in microseconds. Below this the
/// arm/fire round trip costs more than the wait itself.
pub const MIN_WAIT_US: u64 = 100;

/// Entry callback: runs in interrupt context with the registered argument.
pub type TimerCallback = fn(*mut ());

/// Handle for a created timer; an index into the entry arena.
pub type TimerHandle = i32;

/// The never-valid handle value.
pub const TIMER_HANDLE_NONE: TimerHandle = -1;

const NONE: i32 = -1;

struct Entry {
    name: &'static str,
    callback: Option<TimerCallback>,
    user_arg: *mut (),
    /// One-shot duration, or the period when `periodic`. Microseconds.
    sleep_us: u32,
    /// Absolute due time, microseconds since clock start.
    wake_us: u64,
    next: i32,
    periodic: bool,
    running: bool,
}

impl Entry {
    const EMPTY: Entry = Entry {
        name: "",
        callback: None,
        user_arg: ptr::null_mut(),
        sleep_us: 0,
        wake_us: 0,
        next: NONE,
        periodic: false,
        running: false,
    };
}

/// Due entries popped off the list head, chained through the same `next`
/// links they used in the due list.
struct Fired {
    head: i32,
    tail: i32,
}

impl Fired {
    const fn new() -> Self {
        Self {
            head: NONE,
            tail: NONE,
        }
    }

    fn is_empty(&self) -> bool {
        self.head == NONE
    }
}

type CallbackList = heapless::Vec<(TimerCallback, *mut ()), MAX_TIMERS>;

struct MuxState {
    pool: IndexPool<MAX_TIMERS>,
    entries: [Entry; MAX_TIMERS],
    head: i32,
    hw_armed_for: i32,
}

impl MuxState {
    const fn new() -> Self {
        Self {
            pool: IndexPool::new(),
            entries: [Entry::EMPTY; MAX_TIMERS],
            head: NONE,
            hw_armed_for: NONE,
        }
    }

    /// Inserts `h` into the due list by ascending wake time. Returns true
    /// when `h` became the new head. Strict `<` keeps ties FIFO.
    fn insert_sorted(&mut self, h: i32) -> bool {
        let wake = self.entries[h as usize].wake_us;

        if self.head == NONE
            || wake < self.entries[self.head as usize].wake_us
        {
            self.entries[h as usize].next = self.head;
            self.head = h;
            return true;
        }

        let mut prev = self.head;
        let mut curr = self.entries[prev as usize].next;
        while curr != NONE && self.entries[curr as usize].wake_us <= wake {
            prev = curr;
            curr = self.entries[curr as usize].next;
        }
        self.entries[prev as usize].next = h;
        self.entries[h as usize].next = curr;
        false
    }

    /// Unlinks `h` from the due list if present.
    fn remove(&mut self, h: i32) {
        let mut prev = NONE;
        let mut curr = self.head;
        while curr != NONE {
            if curr == h {
                let next = self.entries[curr as usize].next;
                if prev == NONE {
                    self.head = next;
                } else {
                    self.entries[prev as usize].next = next;
                }
                self.entries[curr as usize].next = NONE;
                return;
            }
            prev = curr;
            curr = self.entries[curr as usize].next;
        }
    }

    /// Pops every entry with `wake_us <= now_us` off the head into `out`.
    fn collect_due(&mut self, now_us: u64, out: &mut Fired) {
        while self.head != NONE
            && self.entries[self.head as usize].wake_us <= now_us
        {
            let fired = self.head;
            self.head = self.entries[fired as usize].next;
            self.entries[fired as usize].next = NONE;
            if out.tail == NONE {
                out.head = fired;
            } else {
                self.entries[out.tail as usize].next = fired;
            }
            out.tail = fired;
        }
    }

    /// Snapshot of the fired entries' callbacks, taken under the lock so
    /// the invocations can happen outside it.
    fn callbacks_of(&self, fired: &Fired, out: &mut CallbackList) {
        let mut curr = fired.head;
        while curr != NONE {
            let e = &self.entries[curr as usize];
            if let Some(cb) = e.callback {
                out.push((cb, e.user_arg)).ok();
            }
            curr = e.next;
        }
    }

    /// Re-inserts fired periodic entries, staggered from `now_us` rather
    /// than their old due time: under load we prefer bounded latency over
    /// strict periodicity. One-shots are marked stopped.
    fn reschedule_fired(&mut self, fired: &Fired, now_us: u64) {
        let mut curr = fired.head;
        while curr != NONE {
            // insert_sorted rewrites `next`, so step first
            let next = self.entries[curr as usize].next;
            self.entries[curr as usize].next = NONE;
            let e = &self.entries[curr as usize];
            if e.periodic && e.running {
                let sleep = e.sleep_us;
                self.entries[curr as usize].wake_us =
                    now_us + u64::from(sleep);
                self.insert_sorted(curr);
            } else {
                self.entries[curr as usize].running = false;
            }
            curr = next;
        }
    }

    /// Reprograms the hardware for the current head, or pauses it when
    /// nothing is scheduled.
    fn reassign_hw(&mut self, now_us: u64) {
        if self.head == NONE {
            drv_hw_timer::pause();
            self.hw_armed_for = NONE;
            return;
        }
        self.hw_armed_for = self.head;
        let wake = self.entries[self.head as usize].wake_us;
        let delta = if wake > now_us { wake - now_us } else { 1 };
        let delay_us = if delta > u64::from(u32::MAX) {
            u32::MAX
        } else {
            delta as u32
        };
        drv_hw_timer::fire_after_us(delay_us);
    }
}

struct MuxCell(UnsafeCell<MuxState>);

// Safety: every access goes through `with_state`/`with_state_isr`, whose
// exclusion rules are described there.
unsafe impl Sync for MuxCell {}

static MUX: MuxCell = MuxCell(UnsafeCell::new(MuxState::new()));
static INITED: AtomicBool = AtomicBool::new(false);

/// Runs `f` with exclusive access to the multiplexer state from task
/// context. Mutating callers pause the hardware timer first, so the
/// interrupt path cannot run concurrently; the critical section excludes
/// other tasks.
fn with_state<R>(f: impl FnOnce(&mut MuxState) -> R) -> R {
    kapi::critical_section(|| unsafe { f(&mut *MUX.0.get()) })
}

/// Interrupt-path access. On the target the timer interrupt outranks every
/// task and cannot nest with itself, so no lock is taken there: mutating
/// task-context callers have paused the timer first.
#[cfg(target_os = "none")]
fn with_state_isr<R>(f: impl FnOnce(&mut MuxState) -> R) -> R {
    unsafe { f(&mut *MUX.0.get()) }
}

/// Hosted, the "interrupt" is just another thread and takes the same lock
/// as everyone else.
#[cfg(not(target_os = "none"))]
fn with_state_isr<R>(f: impl FnOnce(&mut MuxState) -> R) -> R {
    kapi::critical_section(|| unsafe { f(&mut *MUX.0.get()) })
}

/// Scheduling cost compensation subtracted from every requested duration,
/// derived from the core clock and the optimization level, the two things
/// that dominate how long the arm path takes.
fn estimated_overhead_us() -> u32 {
    let div: u32 = if cfg!(debug_assertions) {
        4_400_000
    } else {
        10_000_000
    };
    drv_cycle_counter::clock_hz() / div
}

fn run_callbacks(list: &CallbackList) {
    for &(cb, arg) in list.iter() {
        cb(arg);
    }
}

/// Brings up the hardware timer and routes its interrupt here. Called once
/// from system init, before any timer exists.
pub fn init() {
    let was = INITED.swap(true, Ordering::SeqCst);
    assert!(!was);
    drv_hw_timer::init();
    drv_hw_timer::set_callback(interrupt_handler, ptr::null_mut());
}

fn interrupt_handler(_user: *mut ()) {
    let now_us = monoclock::now_us();

    let mut fired = Fired::new();
    let mut callbacks = CallbackList::new();
    with_state_isr(|s| {
        s.collect_due(now_us, &mut fired);
        s.callbacks_of(&fired, &mut callbacks);
    });

    if fired.is_empty() {
        // Nothing due: either we raced a stop, or the interrupt landed a
        // whisker ahead of the clock. Re-arm for the head (minimum 1 µs)
        // and let the next interrupt collect it.
        with_state_isr(|s| {
            if s.head != NONE {
                s.reassign_hw(now_us);
            }
        });
        return;
    }

    run_callbacks(&callbacks);

    with_state_isr(|s| {
        s.reschedule_fired(&fired, now_us);
        s.reassign_hw(now_us);
    });
}

/// Allocates a timer slot. Returns `None` when all [`MAX_TIMERS`] are
/// taken.
pub fn create_timer(
    name: &'static str,
    callback: TimerCallback,
    user_arg: *mut (),
) -> Option<TimerHandle> {
    with_state(|s| {
        let h = s.pool.get_new()? as i32;
        let e = &mut s.entries[h as usize];
        e.name = name;
        e.callback = Some(callback);
        e.user_arg = user_arg;
        e.sleep_us = 0;
        e.wake_us = 0;
        e.next = NONE;
        e.periodic = false;
        e.running = false;
        Some(h)
    })
}

/// Stops and frees a timer slot. Normal systems preallocate their timers
/// at startup and never call this.
pub fn destroy_timer(handle: TimerHandle) {
    stop_timer(handle);
    with_state(|s| {
        assert!(s.pool.is_used(handle as usize));
        s.pool.release(handle as usize);
        s.entries[handle as usize] = Entry::EMPTY;
    });
}

/// Schedules `handle` to fire in `duration_us` (minus the fixed overhead
/// compensation), rescheduling it first if it was already running. With
/// `periodic`, the entry re-arms itself on every fire until stopped.
pub fn start_timer(handle: TimerHandle, duration_us: u32, periodic: bool) {
    let overhead = estimated_overhead_us();
    assert!(duration_us > overhead);
    let duration = duration_us - overhead;

    let now_us = monoclock::now_us();

    let mut fired = Fired::new();
    let mut callbacks = CallbackList::new();

    drv_hw_timer::pause();
    with_state(|s| {
        assert!(s.pool.is_used(handle as usize));

        if s.entries[handle as usize].running {
            s.remove(handle);
        }

        let e = &mut s.entries[handle as usize];
        e.sleep_us = duration;
        e.wake_us = now_us + u64::from(duration);
        e.periodic = periodic;
        e.running = true;

        let head_changed = s.insert_sorted(handle);
        s.collect_due(now_us, &mut fired);
        s.callbacks_of(&fired, &mut callbacks);
        if head_changed || !fired.is_empty() {
            s.reassign_hw(now_us);
        }
    });

    run_callbacks(&callbacks);

    let resume = with_state(|s| {
        s.reschedule_fired(&fired, now_us);
        s.reassign_hw(now_us);
        s.hw_armed_for != NONE
    });
    if resume {
        drv_hw_timer::resume();
    }
}

/// Cancels a scheduled timer. A no-op if it is not running.
pub fn stop_timer(handle: TimerHandle) {
    let now_us = monoclock::now_us();

    let mut fired = Fired::new();
    let mut callbacks = CallbackList::new();

    drv_hw_timer::pause();
    with_state(|s| {
        assert!(s.pool.is_used(handle as usize));
        s.entries[handle as usize].running = false;
        s.remove(handle);
        s.collect_due(now_us, &mut fired);
        s.callbacks_of(&fired, &mut callbacks);
    });

    run_callbacks(&callbacks);

    let resume = with_state(|s| {
        s.reschedule_fired(&fired, now_us);
        s.reassign_hw(now_us);
        s.hw_armed_for != NONE
    });
    if resume {
        drv_hw_timer::resume();
    }
}

pub fn is_timer_running(handle: TimerHandle) -> bool {
    with_state(|s| {
        assert!(s.pool.is_used(handle as usize));
        s.entries[handle as usize].running
    })
}

/// Whether `handle` refers to a created, not-yet-destroyed timer.
pub fn is_valid(handle: TimerHandle) -> bool {
    if handle < 0 {
        return false;
    }
    with_state(|s| s.pool.is_used(handle as usize))
}

/// The name a timer was created with.
pub fn timer_name(handle: TimerHandle) -> &'static str {
    with_state(|s| {
        assert!(s.pool.is_used(handle as usize));
        s.entries[handle as usize].name
    })
}

pub fn timers_in_use() -> usize {
    with_state(|s| s.pool.in_use())
}

pub fn capacity() -> usize {
    MAX_TIMERS
}
