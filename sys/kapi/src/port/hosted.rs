// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hosted port: the kernel surface rebuilt on std.
//!
//! The point of this port is behavioral fidelity, not performance. Event
//! groups and queues are mutex/condvar pairs, tasks are threads, and the
//! kernel critical section is one process-global re-entrant lock -- which is
//! exactly the exclusion a uniprocessor scheduler lock provides, extended to
//! cover the threads that stand in for interrupt handlers.

use alloc::boxed::Box;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex as StdMutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::{KernelError, Priority, Timeout, WaitOpts};

fn deadline_of(timeout: Timeout) -> Option<Instant> {
    match timeout {
        Timeout::Forever => None,
        Timeout::Ticks(ms) => {
            Some(Instant::now() + Duration::from_millis(u64::from(ms)))
        }
    }
}

pub struct EventGroup {
    bits: StdMutex<u32>,
    cond: Condvar,
}

impl EventGroup {
    pub fn new() -> Self {
        Self {
            bits: StdMutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self, bits: u32) {
        let mut s = self.bits.lock().unwrap();
        *s |= bits;
        self.cond.notify_all();
    }

    pub fn clear(&self, bits: u32) {
        let mut s = self.bits.lock().unwrap();
        *s &= !bits;
    }

    pub fn get(&self) -> u32 {
        *self.bits.lock().unwrap()
    }

    pub fn wait(
        &self,
        mask: u32,
        opts: WaitOpts,
        timeout: Timeout,
    ) -> Result<u32, KernelError> {
        let deadline = deadline_of(timeout);
        let mut s = self.bits.lock().unwrap();
        loop {
            let satisfied = if opts.contains(WaitOpts::ALL) {
                *s & mask == mask
            } else {
                *s & mask != 0
            };
            if satisfied {
                let observed = *s;
                if !opts.contains(WaitOpts::NO_CLEAR) {
                    *s &= !mask;
                }
                return Ok(observed);
            }
            s = match deadline {
                None => self.cond.wait(s).unwrap(),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(KernelError::Timeout);
                    }
                    self.cond.wait_timeout(s, d - now).unwrap().0
                }
            };
        }
    }
}

pub struct Mutex {
    locked: StdMutex<bool>,
    cond: Condvar,
}

impl Mutex {
    pub fn new() -> Self {
        Self {
            locked: StdMutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn acquire(&self, timeout: Timeout) -> Result<(), KernelError> {
        let deadline = deadline_of(timeout);
        let mut locked = self.locked.lock().unwrap();
        while *locked {
            locked = match deadline {
                None => self.cond.wait(locked).unwrap(),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(KernelError::Timeout);
                    }
                    self.cond.wait_timeout(locked, d - now).unwrap().0
                }
            };
        }
        *locked = true;
        Ok(())
    }

    pub fn release(&self) {
        let mut locked = self.locked.lock().unwrap();
        assert!(*locked);
        *locked = false;
        self.cond.notify_one();
    }
}

struct QueueInner<T> {
    capacity: usize,
    fifo: StdMutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

pub struct Queue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T: Copy + Send + 'static> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                capacity,
                fifo: StdMutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            }),
        }
    }

    pub fn put(&self, value: T, timeout: Timeout) -> Result<(), KernelError> {
        let deadline = deadline_of(timeout);
        let mut fifo = self.inner.fifo.lock().unwrap();
        while fifo.len() >= self.inner.capacity {
            fifo = match deadline {
                None => self.inner.not_full.wait(fifo).unwrap(),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        // Matches the target kernel: a full queue with a
                        // zero timeout is a resource error, not a timeout.
                        return Err(if matches!(timeout, Timeout::Ticks(0)) {
                            KernelError::Resource
                        } else {
                            KernelError::Timeout
                        });
                    }
                    self.inner.not_full.wait_timeout(fifo, d - now).unwrap().0
                }
            };
        }
        fifo.push_back(value);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    pub fn get(&self, timeout: Timeout) -> Result<T, KernelError> {
        let deadline = deadline_of(timeout);
        let mut fifo = self.inner.fifo.lock().unwrap();
        loop {
            if let Some(v) = fifo.pop_front() {
                self.inner.not_full.notify_one();
                return Ok(v);
            }
            fifo = match deadline {
                None => self.inner.not_empty.wait(fifo).unwrap(),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(KernelError::Timeout);
                    }
                    self.inner.not_empty.wait_timeout(fifo, d - now).unwrap().0
                }
            };
        }
    }

    pub fn len(&self) -> usize {
        self.inner.fifo.lock().unwrap().len()
    }

    pub fn count_probe(&self) -> CountProbe {
        let inner = self.inner.clone();
        let f: Box<dyn Fn() -> usize + Send + Sync> =
            Box::new(move || inner.fifo.lock().unwrap().len());
        CountProbe {
            count: &*Box::leak(f),
        }
    }
}

#[derive(Copy, Clone)]
pub struct CountProbe {
    count: &'static (dyn Fn() -> usize + Send + Sync),
}

impl CountProbe {
    pub fn count(&self) -> usize {
        (self.count)()
    }
}

pub struct TaskHandle {
    #[allow(dead_code)]
    thread: thread::Thread,
}

pub fn spawn(
    name: &'static str,
    _priority: Priority,
    _stack_bytes: usize,
    main: Box<dyn FnOnce() + Send + 'static>,
) -> TaskHandle {
    // Priority and stack size are target concerns; host threads get the
    // platform defaults.
    let join = thread::Builder::new()
        .name(name.into())
        .spawn(main)
        .unwrap();
    let handle = TaskHandle {
        thread: join.thread().clone(),
    };
    // Tasks are never joined; let the thread run detached.
    drop(join);
    handle
}

pub fn sleep_ms(ms: u32) {
    thread::sleep(Duration::from_millis(u64::from(ms)));
}

pub fn yield_now() {
    thread::yield_now();
}

struct CritState {
    owner: Option<ThreadId>,
    depth: usize,
}

static CRIT_STATE: StdMutex<CritState> = StdMutex::new(CritState {
    owner: None,
    depth: 0,
});
static CRIT_COND: Condvar = Condvar::new();

struct CritExit;

impl Drop for CritExit {
    fn drop(&mut self) {
        let mut s = CRIT_STATE.lock().unwrap();
        s.depth -= 1;
        if s.depth == 0 {
            s.owner = None;
            CRIT_COND.notify_one();
        }
    }
}

pub fn critical_section<R>(f: impl FnOnce() -> R) -> R {
    let me = thread::current().id();
    {
        let mut s = CRIT_STATE.lock().unwrap();
        while s.depth > 0 && s.owner != Some(me) {
            s = CRIT_COND.wait(s).unwrap();
        }
        s.owner = Some(me);
        s.depth += 1;
    }
    // Drop-based exit so a panicking closure (a failing test assertion, for
    // instance) does not wedge every other thread.
    let _exit = CritExit;
    f()
}

pub fn stack_high_watermark_bytes() -> Option<u32> {
    None
}
