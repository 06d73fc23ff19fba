// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pool semantics: copy-in/copy-out and the atomic-update operators under
//! contention from several tasks.

mod common;

use corral::{Pool, Priority, Task};

#[derive(Copy, Clone, PartialEq, Debug)]
struct Pair {
    a: u64,
    b: u64,
}

#[test]
fn copy_in_copy_out_and_updates() {
    let pool = Pool::new(Pair { a: 1, b: 1 });
    assert_eq!(pool.read(), Pair { a: 1, b: 1 });

    pool.write(Pair { a: 5, b: 7 });
    assert_eq!(pool.read(), Pair { a: 5, b: 7 });

    pool.atomic_update(|p| p.a += 1);
    assert_eq!(pool.read(), Pair { a: 6, b: 7 });

    pool.atomic_update_with(|p, n| p.b += n, 3u64);
    assert_eq!(pool.read(), Pair { a: 6, b: 10 });

    let after = pool.read_atomic_update(|p| {
        p.a = 0;
        p.b = 0;
    });
    assert_eq!(after, Pair { a: 0, b: 0 });

    let after = pool.read_atomic_update_with(|p, n| p.a = n, 42u64);
    assert_eq!(after.a, 42);
}

const TASKS: u64 = 3;
const ITERATIONS: u64 = 1_000;

#[test]
fn atomic_update_survives_racing_tasks() {
    common::init_once();

    let protected: &'static Pool<Pair> =
        Box::leak(Box::new(Pool::new(Pair { a: 0, b: 0 })));
    // Same data, but raced through separate read and write calls: the
    // read-modify-write is no longer one unit, so increments get lost.
    let naive: &'static Pool<Pair> =
        Box::leak(Box::new(Pool::new(Pair { a: 0, b: 0 })));
    let done: &'static Pool<u64> = Box::leak(Box::new(Pool::new(0)));

    let names = ["pool_racer_0", "pool_racer_1", "pool_racer_2"];
    for name in names {
        let task = Task::create(name, Priority::Normal, 2048);
        task.start(move |_| {
            for _ in 0..ITERATIONS {
                protected.atomic_update(|p| {
                    p.a += 2;
                    p.b += 2;
                });
                let mut copy = naive.read();
                copy.a += 2;
                copy.b += 2;
                naive.write(copy);
            }
            done.atomic_update(|d| *d += 1);
        });
    }

    assert!(common::wait_until(move || done.read() == TASKS, 30_000));

    let p = protected.read();
    assert_eq!(p.a, TASKS * ITERATIONS * 2);
    assert_eq!(p.b, TASKS * ITERATIONS * 2);

    // The naive version may have lost updates to races, but never gained.
    let n = naive.read();
    assert!(n.a <= TASKS * ITERATIONS * 2);
    assert_eq!(n.a, n.b, "whole-struct copies kept the fields in step");
}
