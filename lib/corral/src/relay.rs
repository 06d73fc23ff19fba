// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The long-timer relay task.
//!
//! Two jobs moved out of the timer interrupt land here: re-arming the next
//! chunk of a chopped wait (which takes the multiplexer's critical section
//! -- the one the interrupt may already be inside), and delivering finished
//! timers' event bits in FIFO order instead of at interrupt priority.
//!
//! The interrupt side writes records into an owner-less bounded queue with
//! zero timeout. The queue is sized to absorb a burst from every timer
//! slot at once; losing a record would lose a timer fire, so a failed
//! write asserts. Records whose run-ID no longer matches their timer are
//! stale -- the timer was stopped or restarted after the record was queued
//! -- and are dropped.

use alloc::boxed::Box;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use kapi::Priority;
use ringbuf::{ringbuf, ringbuf_entry};

use crate::queue::Queue;
use crate::task::Task;
use crate::timer::Timer;

/// Relay queue depth: a full-capacity interrupt burst must fit.
const RELAY_QUEUE_DEPTH: usize = timermux::MAX_TIMERS;

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    None,
    StaleRearmDropped(u32),
    StaleDeliverDropped(u32),
}

ringbuf!(Trace, 16, Trace::None);

#[derive(Copy, Clone)]
enum RelayAction {
    Rearm,
    DeliverOnly,
}

#[derive(Copy, Clone)]
struct RelayRecord {
    timer: Timer,
    run_id: u32,
    action: RelayAction,
}

type RelayQueue = Queue<RelayRecord, RELAY_QUEUE_DEPTH>;

static QUEUE: AtomicPtr<RelayQueue> = AtomicPtr::new(ptr::null_mut());

fn queue() -> &'static RelayQueue {
    let q = QUEUE.load(Ordering::SeqCst);
    assert!(!q.is_null(), "relay used before init");
    // Safety: set once at init to a leaked allocation, never changed.
    unsafe { &*q }
}

/// Queues a continue-chopping request. Interrupt-safe, never blocks.
pub(crate) fn request_rearm(timer: Timer, run_id: u32) {
    let written = queue().write(RelayRecord {
        timer,
        run_id,
        action: RelayAction::Rearm,
    });
    assert!(written, "relay queue overflow");
}

/// Queues a final delivery. Interrupt-safe, never blocks.
pub(crate) fn request_deliver(timer: Timer, run_id: u32) {
    let written = queue().write(RelayRecord {
        timer,
        run_id,
        action: RelayAction::DeliverOnly,
    });
    assert!(written, "relay queue overflow");
}

/// Spawns the relay task. Called from `init` only.
pub(crate) fn start_relay_task() {
    // Owner-less on purpose: the producers are interrupt handlers, and an
    // owner bit would drag the kernel's deferred bit-set path into them.
    let relay_queue: &'static RelayQueue =
        Box::leak(Box::new(Queue::new(None, false)));
    let prev = QUEUE.swap(relay_queue as *const _ as *mut _, Ordering::SeqCst);
    assert!(prev.is_null());

    let task = Task::create("longTimerRelay", Priority::Normal, 1200);
    task.start(move |task| relay_main(task, relay_queue));
}

fn relay_main(task: &'static Task, relay_queue: &'static RelayQueue) -> ! {
    kapi::sleep_ms(1);
    loop {
        task.dump_stack_high_watermark_if_increased();

        let record = relay_queue.read();
        match record.action {
            RelayAction::Rearm => {
                let advanced = record
                    .timer
                    .rearm_to_continue_long_timing(record.run_id);
                if !advanced {
                    ringbuf_entry!(Trace::StaleRearmDropped(record.run_id));
                }
            }
            RelayAction::DeliverOnly => {
                if record.run_id == record.timer.run_id() {
                    record.timer.deliver();
                } else {
                    ringbuf_entry!(Trace::StaleDeliverDropped(
                        record.run_id
                    ));
                }
            }
        }
        kapi::yield_now();
    }
}
