// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded message queues as waitables.
//!
//! The owner's event bit tracks "queue has elements" as a level, delivered
//! through re-asserted edges: a write sets it, a read re-asserts it while
//! elements remain and clears it when the queue drains, and the wait
//! family re-asserts it after consuming a wait. A `wait_any` that leaves
//! the queue unread therefore still fires on the next wait, with no
//! producer in between.
//!
//! A queue built with no owner never touches event bits at all. That is
//! the right shape for interrupt-side producers: the plain put is
//! ISR-safe, and no deferred bit-set machinery gets involved.

use kapi::{KernelError, MessageQueue, Timeout};

use crate::task::Task;
use crate::waitable::{Waitable, WaitableKind};

pub struct Queue<T: Copy + Send + 'static, const N: usize> {
    fifo: MessageQueue<T>,
    owner: Option<&'static Task>,
    mask: u32,
    write_timeout: Timeout,
}

impl<T: Copy + Send + 'static, const N: usize> Queue<T, N> {
    /// A queue of capacity `N`. With `block_on_full`, writers park until
    /// space frees up; otherwise a full queue rejects the write. Pass no
    /// owner for a queue written from interrupt handlers.
    pub fn new(owner: Option<&'static Task>, block_on_full: bool) -> Self {
        let fifo = MessageQueue::new(N);
        let mut mask = 0;
        if let Some(task) = owner {
            let bit = task.query_bit_number(WaitableKind::Queue);
            task.register_queue_probe(bit, fifo.count_probe());
            mask = 1 << bit;
        }
        Self {
            fifo,
            owner,
            mask,
            write_timeout: if block_on_full {
                Timeout::Forever
            } else {
                Timeout::Ticks(0)
            },
        }
    }

    /// Enqueues a copy of `value` and signals the owner. Returns false
    /// when the queue is full and this queue does not block on full.
    pub fn write(&self, value: T) -> bool {
        match self.fifo.put(value, self.write_timeout) {
            Ok(()) => {
                if let Some(task) = self.owner {
                    task.set_event_bits(self.mask);
                }
                true
            }
            Err(KernelError::Resource) | Err(KernelError::Timeout) => false,
            Err(_) => panic!(),
        }
    }

    /// Dequeues one element, blocking while the queue is empty. Leaves the
    /// owner's bit mirroring the remaining occupancy.
    pub fn read(&self) -> T {
        let value = match self.fifo.get(Timeout::Forever) {
            Ok(v) => v,
            Err(_) => panic!(),
        };
        if let Some(task) = self.owner {
            if self.fifo.is_empty() {
                task.clear_event_bits(self.mask);
            } else {
                // Elements remain: put the bit back so the next wait on
                // this queue fires immediately.
                task.set_event_bits(self.mask);
            }
        }
        value
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    /// Drains the queue and drops the owner's bit.
    pub fn clear(&self) {
        while self.fifo.get(Timeout::Ticks(0)).is_ok() {}
        if let Some(task) = self.owner {
            task.clear_event_bits(self.mask);
        }
    }
}

impl<T: Copy + Send + 'static, const N: usize> Waitable for Queue<T, N> {
    fn mask(&self) -> u32 {
        self.mask
    }

    fn kind(&self) -> WaitableKind {
        WaitableKind::Queue
    }
}
