// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flag semantics through real tasks.

mod common;

use corral::{Flag, Pool, Priority, Task, Waitable};

#[test]
fn one_wake_per_set_no_spurious_wakes() {
    common::init_once();

    let listener = Task::create("flag_listener", Priority::Normal, 2048);
    let flag_hi = Flag::new(listener);
    let wakes: &'static Pool<u32> = Box::leak(Box::new(Pool::new(0)));

    listener.start(move |task| loop {
        task.wait(&flag_hi);
        wakes.atomic_update(|w| *w += 1);
    });

    for expected in 1..=5u32 {
        flag_hi.set();
        assert!(
            common::wait_until(move || wakes.read() == expected, 2_000),
            "wake {} never arrived",
            expected
        );
    }
    // and no extra wakes drip in afterwards
    common::sleep_ms(150);
    assert_eq!(wakes.read(), 5);
}

#[test]
fn set_before_wait_completes_immediately_and_clears() {
    common::init_once();

    let owner = Task::create("flag_selfcheck", Priority::Normal, 2048);
    let flag = Flag::new(owner);
    let outcome: &'static Pool<i32> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |task| {
        flag.set();
        flag.set(); // idempotent
        task.wait(&flag); // must not block
        if task.is_set(&flag) {
            outcome.write(-1); // bit should have been consumed
        } else {
            outcome.write(1);
        }
    });

    assert!(common::wait_until(move || outcome.read() != 0, 2_000));
    assert_eq!(outcome.read(), 1);
}

#[test]
fn deferred_init_allows_flag_arrays() {
    common::init_once();

    let owner = Task::create("flag_array", Priority::Normal, 2048);
    let mut flags = [Flag::empty(); 3];
    for f in flags.iter_mut() {
        assert!(!f.is_initialized());
        f.init(owner);
        assert!(f.is_initialized());
    }
    // distinct bits, all classified as flags
    let union = flags.iter().fold(0, |acc, f| {
        assert_eq!(acc & f.mask(), 0, "bit assigned twice");
        acc | f.mask()
    });
    let (flags_mask, queues_mask, timers_mask) = owner.kind_masks();
    assert_eq!(flags_mask, union);
    assert_eq!(queues_mask, 0);
    assert_eq!(timers_mask, 0);

    let done: &'static Pool<u32> = Box::leak(Box::new(Pool::new(0)));
    let [fa, fb, fc] = flags;
    owner.start(move |task| {
        task.wait_all(fa.mask() | fb.mask() | fc.mask());
        done.write(1);
    });

    // Raise them one by one; the wait_all must only release on the last.
    fa.set();
    fb.set();
    common::sleep_ms(100);
    assert_eq!(done.read(), 0, "wait_all released early");
    fc.set();
    assert!(common::wait_until(move || done.read() == 1, 2_000));
}

#[test]
fn wait_any_identifies_fired_flag() {
    common::init_once();

    let owner = Task::create("flag_waitany", Priority::Normal, 2048);
    let first = Flag::new(owner);
    let second = Flag::new(owner);
    let report: &'static Pool<u32> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |task| {
        task.wait_any(first.mask() | second.mask());
        let mut seen = 0;
        if task.has_fired(&first) {
            seen |= 1;
        }
        if task.has_fired(&second) {
            seen |= 2;
        }
        report.write(seen);
    });

    common::sleep_ms(50);
    second.set();
    assert!(common::wait_until(move || report.read() != 0, 2_000));
    assert_eq!(report.read(), 2);
}

#[test]
fn kind_masks_stay_disjoint_across_waitable_kinds() {
    common::init_once();

    let owner = Task::create("flag_kinds", Priority::Normal, 2048);
    let flag = Flag::new(owner);
    let queue: corral::Queue<u8, 2> = corral::Queue::new(Some(owner), false);
    let timer = corral::Timer::new(owner);

    let (flags_mask, queues_mask, timers_mask) = owner.kind_masks();
    assert_eq!(flags_mask & queues_mask, 0);
    assert_eq!(flags_mask & timers_mask, 0);
    assert_eq!(queues_mask & timers_mask, 0);
    assert_eq!(flags_mask, flag.mask());
    assert_eq!(queues_mask, queue.mask());
    assert_eq!(timers_mask, timer.mask());
    assert_eq!(
        flags_mask | queues_mask | timers_mask,
        flag.mask() | queue.mask() | timer.mask()
    );
}
