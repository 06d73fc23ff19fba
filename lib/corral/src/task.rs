// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tasks: named units of execution that own waitables.
//!
//! A task's event-bit vector is the hub of this whole library. Every
//! waitable constructed for a task claims the next bit and is classified
//! as flag, queue or timer; the wait family then works purely on bit
//! masks. Blocking calls belong to the owning task; `set_event_bits` is
//! callable from anywhere the kernel allows, including interrupts.
//!
//! Platform note: on kernels that defer ISR-side event-bit sets through an
//! internal service task, that service's queue must be sized for the worst
//! concurrent burst of bit-sets per periodic timer interval.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use kapi::util::StaticCell;
use kapi::{EventGroup, Priority, Timeout, WaitOpts, EVENT_BITS_SUPPORTED};
use ringbuf::{ringbuf, ringbuf_entry};

use crate::config::MAX_MUTEX_NESTING;
use crate::waitable::{Waitable, WaitableKind};

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    None,
    StackBytesLeft(&'static str, u32),
}

ringbuf!(Trace, 16, Trace::None);

type MutexIdStack = heapless::Vec<u32, MAX_MUTEX_NESTING>;
type QueueProbes = [Option<kapi::CountProbe>; EVENT_BITS_SUPPORTED as usize];

pub struct Task {
    name: &'static str,
    priority: Priority,
    stack_bytes: usize,
    events: EventGroup,
    started: AtomicBool,
    nof_waitables: AtomicU32,
    flags_mask: AtomicU32,
    queues_mask: AtomicU32,
    timers_mask: AtomicU32,
    /// Bit state observed by the most recent wait on this task, consumed
    /// by `has_fired`. Owner-task access only.
    latest_result: AtomicU32,
    /// Occupancy probes for the queue bits, so waits can re-assert a queue
    /// bit exactly when the queue still holds elements.
    queue_probes: StaticCell<QueueProbes>,
    /// IDs of the mutexes this task currently holds, bottom to top.
    /// Strictly increasing; see `Mutex`.
    mutex_id_stack: StaticCell<MutexIdStack>,
    prev_stack_hwm: AtomicU32,
}

impl Task {
    /// Creates a task shell. The task does not run until [`Task::start`];
    /// construct its waitables in between. Tasks are never destroyed.
    pub fn create(
        name: &'static str,
        priority: Priority,
        stack_bytes: usize,
    ) -> &'static Task {
        Box::leak(Box::new(Task {
            name,
            priority,
            stack_bytes,
            events: EventGroup::new(),
            started: AtomicBool::new(false),
            nof_waitables: AtomicU32::new(0),
            flags_mask: AtomicU32::new(0),
            queues_mask: AtomicU32::new(0),
            timers_mask: AtomicU32::new(0),
            latest_result: AtomicU32::new(0),
            queue_probes: StaticCell::new(
                [None; EVENT_BITS_SUPPORTED as usize],
            ),
            mutex_id_stack: StaticCell::new(MutexIdStack::new()),
            prev_stack_hwm: AtomicU32::new(0),
        }))
    }

    /// Hands the task body to the kernel and lets it run.
    pub fn start(
        &'static self,
        main: impl FnOnce(&'static Task) + Send + 'static,
    ) {
        let was = self.started.swap(true, Ordering::SeqCst);
        assert!(!was);
        kapi::spawn(
            self.name,
            self.priority,
            self.stack_bytes,
            Box::new(move || main(self)),
        );
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Assigns the next event bit to a new waitable and classifies it.
    /// At most [`EVENT_BITS_SUPPORTED`] waitables fit on one task.
    pub(crate) fn query_bit_number(&self, kind: WaitableKind) -> u32 {
        let bit = self.nof_waitables.fetch_add(1, Ordering::SeqCst);
        assert!(bit < EVENT_BITS_SUPPORTED);
        let mask = 1 << bit;
        match kind {
            WaitableKind::Flag => {
                self.flags_mask.fetch_or(mask, Ordering::SeqCst)
            }
            WaitableKind::Queue => {
                self.queues_mask.fetch_or(mask, Ordering::SeqCst)
            }
            WaitableKind::Timer => {
                self.timers_mask.fetch_or(mask, Ordering::SeqCst)
            }
        };
        bit
    }

    pub(crate) fn register_queue_probe(
        &self,
        bit: u32,
        probe: kapi::CountProbe,
    ) {
        self.queue_probes.borrow_mut()[bit as usize] = Some(probe);
    }

    /// Sets event bits directly. Safe from any context the kernel's own
    /// set call supports, including interrupts.
    pub fn set_event_bits(&self, mask: u32) {
        self.events.set(mask);
    }

    pub fn clear_event_bits(&self, mask: u32) {
        self.events.clear(mask);
    }

    /// Blocks until this waitable fires, consuming its bit. For a queue
    /// waitable the bit is put back if the queue still holds elements.
    pub fn wait<W: Waitable>(&self, waitable: &W) {
        self.wait_all(waitable.mask());
    }

    /// Blocks until *all* bits in `mask` are set at once, then clears
    /// them -- except queue bits backed by a still-non-empty queue, which
    /// are re-asserted so the next wait fires immediately.
    pub fn wait_all(&self, mask: u32) {
        let result =
            match self.events.wait(mask, WaitOpts::ALL, Timeout::Forever) {
                Ok(bits) => bits,
                // A forever-wait has no legitimate failure.
                Err(_) => panic!(),
            };
        self.latest_result.store(result, Ordering::Relaxed);
        self.reassert_nonempty_queue_bits(result & mask);
    }

    /// Blocks until *any* bit in `mask` is set. Nothing is cleared; walk
    /// the candidates with [`Task::has_fired`] to identify and consume
    /// them one at a time.
    pub fn wait_any(&self, mask: u32) {
        let result = match self.events.wait(
            mask,
            WaitOpts::NO_CLEAR,
            Timeout::Forever,
        ) {
            Ok(bits) => bits,
            Err(_) => panic!(),
        };
        self.latest_result.store(result, Ordering::Relaxed);
    }

    /// Whether `waitable` was set in the result of the latest wait; if so,
    /// consumes its bit. A queue waitable's bit is left alone -- only a
    /// `read` may decide it, since the bit tracks queue occupancy.
    pub fn has_fired<W: Waitable>(&self, waitable: &W) -> bool {
        let mask = waitable.mask();
        let fired = self.latest_result.load(Ordering::Relaxed) & mask != 0;
        if fired && waitable.kind() != WaitableKind::Queue {
            self.events.clear(mask);
        }
        fired
    }

    /// Non-blocking peek at one waitable, without consuming anything.
    pub fn is_set<W: Waitable>(&self, waitable: &W) -> bool {
        self.is_all_set(waitable.mask())
    }

    /// Non-blocking: are all bits of `mask` currently set? Also refreshes
    /// the latest-wait cache, so `has_fired` works after a peek.
    pub fn is_all_set(&self, mask: u32) -> bool {
        let bits = self.events.get();
        self.latest_result.store(bits, Ordering::Relaxed);
        bits & mask == mask
    }

    /// Non-blocking: is any bit of `mask` currently set? Also refreshes
    /// the latest-wait cache.
    pub fn is_any_set(&self, mask: u32) -> bool {
        let bits = self.events.get();
        self.latest_result.store(bits, Ordering::Relaxed);
        bits & mask != 0
    }

    /// Event-bit masks of this task's waitables by kind, in registration
    /// order: (flags, queues, timers).
    pub fn kind_masks(&self) -> (u32, u32, u32) {
        (
            self.flags_mask.load(Ordering::Relaxed),
            self.queues_mask.load(Ordering::Relaxed),
            self.timers_mask.load(Ordering::Relaxed),
        )
    }

    fn reassert_nonempty_queue_bits(&self, fired: u32) {
        let queue_bits = fired & self.queues_mask.load(Ordering::Relaxed);
        if queue_bits == 0 {
            return;
        }
        let probes = self.queue_probes.borrow_mut();
        for bit in 0..EVENT_BITS_SUPPORTED {
            let mask = 1 << bit;
            if queue_bits & mask == 0 {
                continue;
            }
            if let Some(probe) = probes[bit as usize] {
                if probe.count() > 0 {
                    self.events.set(mask);
                }
            }
        }
    }

    // mutex-ID stack, used by `Mutex` from the owning task only

    pub(crate) fn mutex_stack_top(&self) -> u32 {
        // 0 is the reserved "stack empty" value.
        self.mutex_id_stack
            .borrow_mut()
            .last()
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn push_mutex_id(&self, id: u32) {
        let pushed = self.mutex_id_stack.borrow_mut().push(id).is_ok();
        assert!(pushed, "mutex nesting deeper than MAX_MUTEX_NESTING");
    }

    pub(crate) fn pop_mutex_id(&self) -> u32 {
        match self.mutex_id_stack.borrow_mut().pop() {
            Some(id) => id,
            None => panic!("mutex unlock with empty id stack"),
        }
    }

    /// Records shrinking stack headroom into the module trace buffer, for
    /// long-running tasks that want an early warning. A no-op where the
    /// kernel cannot report headroom.
    pub fn dump_stack_high_watermark_if_increased(&self) {
        let Some(left) = kapi::stack_high_watermark_bytes() else {
            return;
        };
        let prev = self.prev_stack_hwm.load(Ordering::Relaxed);
        if prev == 0 || left < prev {
            self.prev_stack_hwm.store(left, Ordering::Relaxed);
            ringbuf_entry!(Trace::StackBytesLeft(self.name, left));
        }
    }
}
