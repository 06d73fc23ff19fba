// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Software timer behavior end to end: one-shots, wait_any/wait_all over
//! several timers, restart cancellation, periodics, and long waits chopped
//! through the relay.
//!
//! Timing assertions leave generous slack: the lower bounds check the
//! timer did not fire early (which the design forbids), the upper bounds
//! only catch order-of-magnitude breakage on a loaded machine.

mod common;

use corral::{time, Flag, Pool, Priority, Task, Timer, Waitable};

#[test]
fn one_shot_duration_and_single_fire() {
    common::init_once();

    let owner = Task::create("timer_oneshot", Priority::Normal, 4096);
    let timer = Timer::new(owner);
    let elapsed: &'static Pool<u64> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |task| {
        let t0 = time::now_us();
        timer.start(80_000);
        task.wait(&timer);
        elapsed.write(time::now_us() - t0);
    });

    assert!(common::wait_until(move || elapsed.read() != 0, 5_000));
    let us = elapsed.read();
    assert!(us >= 70_000, "fired early: {} us", us);
    assert!(us < 1_000_000, "took {} us", us);

    // one-shot: no second fire
    common::sleep_ms(200);
    assert!(!owner.is_set(&timer));
}

#[test]
fn wait_any_over_four_timers_each_fires_once() {
    common::init_once();

    let owner = Task::create("timer_waitany", Priority::Normal, 4096);
    let timers = [
        Timer::new(owner),
        Timer::new(owner),
        Timer::new(owner),
        Timer::new(owner),
    ];
    let durations = [60_000u64, 120_000, 180_000, 240_000];
    // firing order encoded as digits, e.g. 1234
    let order: &'static Pool<u32> = Box::leak(Box::new(Pool::new(0)));
    let fail: &'static Pool<i32> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |task| {
        let mask = timers.iter().fold(0, |acc, t| acc | t.mask());
        for (t, d) in timers.iter().zip(durations) {
            t.start(d);
        }
        let mut counts = [0u32; 4];
        let mut sequence = 0u32;
        while counts.iter().sum::<u32>() < 4 {
            task.wait_any(mask);
            for (i, t) in timers.iter().enumerate() {
                if task.has_fired(t) {
                    counts[i] += 1;
                    sequence = sequence * 10 + (i as u32 + 1);
                }
            }
        }
        if counts != [1, 1, 1, 1] {
            fail.write(-1);
        }
        order.write(sequence);
    });

    assert!(common::wait_until(move || order.read() != 0, 10_000));
    assert_eq!(fail.read(), 0, "a timer fired other than exactly once");
    // 60 ms gaps dwarf host jitter, so arrival order matches durations
    assert_eq!(order.read(), 1234);
}

#[test]
fn wait_all_releases_at_longest_timer() {
    common::init_once();

    let owner = Task::create("timer_waitall", Priority::Normal, 4096);
    let timers = [
        Timer::new(owner),
        Timer::new(owner),
        Timer::new(owner),
        Timer::new(owner),
    ];
    let durations = [60_000u64, 120_000, 180_000, 240_000];
    let elapsed: &'static Pool<u64> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |task| {
        let mask = timers.iter().fold(0, |acc, t| acc | t.mask());
        let t0 = time::now_us();
        for (t, d) in timers.iter().zip(durations) {
            t.start(d);
        }
        task.wait_all(mask);
        elapsed.write(time::now_us() - t0);
    });

    assert!(common::wait_until(move || elapsed.read() != 0, 10_000));
    let us = elapsed.read();
    assert!(us >= 220_000, "released before the longest timer: {}", us);
    assert!(us < 2_000_000);
}

#[test]
fn restart_cancels_first_duration() {
    common::init_once();

    let owner = Task::create("timer_restart", Priority::Normal, 4096);
    let timer = Timer::new(owner);
    let elapsed: &'static Pool<u64> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |task| {
        let t0 = time::now_us();
        timer.start(600_000);
        timer.start(90_000); // supersedes; only this one may be observed
        task.wait(&timer);
        elapsed.write(time::now_us() - t0);
    });

    assert!(common::wait_until(move || elapsed.read() != 0, 5_000));
    let us = elapsed.read();
    assert!(us >= 80_000, "fired early: {}", us);
    assert!(us < 400_000, "observed the cancelled duration: {}", us);

    // the cancelled 600 ms arm must never fire
    common::sleep_ms(700);
    assert!(!owner.is_set(&timer));
}

#[test]
fn periodic_fires_steadily_until_stopped() {
    common::init_once();

    let owner = Task::create("timer_periodic", Priority::Normal, 4096);
    let timer = Timer::new(owner);
    const SAMPLES: usize = 10;
    const PERIOD_US: u64 = 40_000;
    // worst inter-arrival delta, reported after SAMPLES fires
    let report: &'static Pool<(u64, u64)> =
        Box::leak(Box::new(Pool::new((0, 0))));

    owner.start(move |task| {
        timer.start_periodic(PERIOD_US);
        let mut prev = time::now_us();
        let mut worst = 0u64;
        let mut total = 0u64;
        for _ in 0..SAMPLES {
            task.wait(&timer);
            let now = time::now_us();
            let delta = now - prev;
            worst = worst.max(delta);
            total += delta;
            prev = now;
        }
        timer.stop();
        report.write((total, worst));
    });

    assert!(
        common::wait_until(move || report.read().0 != 0, 15_000),
        "periodic timer starved"
    );
    let (total, worst) = report.read();
    let mean = total / SAMPLES as u64;
    assert!(mean >= PERIOD_US * 3 / 4, "mean {} too fast", mean);
    assert!(mean < PERIOD_US * 4, "mean {} too slow", mean);
    assert!(worst < 1_000_000, "a period stalled for {} us", worst);

    // stopped: no further fires
    common::sleep_ms(200);
    assert!(!owner.is_set(&timer));
}

#[test]
fn long_wait_chops_through_relay() {
    common::init_once();

    let owner = Task::create("timer_chop", Priority::Normal, 4096);
    let timer = Timer::new(owner);
    let report: &'static Pool<(u64, bool, u64)> =
        Box::leak(Box::new(Pool::new((0, true, 0))));

    owner.start(move |task| {
        // 50 ms per hardware arm: 170 ms takes chunks 50+50+50+20.
        timer.set_max_hw_time(50_000);
        let t0 = time::now_us();
        timer.start(170_000);
        let chopping_seen = timer.is_long_chopping_active();
        task.wait(&timer);
        let us = time::now_us() - t0;
        report.write((us, chopping_seen, timer.fired_so_far_us()));
    });

    assert!(common::wait_until(move || report.read().0 != 0, 10_000));
    let (us, chopping_seen, accounted) = report.read();
    assert!(chopping_seen, "a wait beyond one hardware arm must chop");
    assert!(us >= 150_000, "fired early: {}", us);
    assert!(us < 2_000_000);
    assert_eq!(accounted, 170_000, "chunks must add up to the request");
    assert!(!timer.is_long_chopping_active());
}

#[test]
fn boundary_durations_around_max_hw_time() {
    common::init_once();

    let owner = Task::create("timer_boundary", Priority::Normal, 4096);
    let exact = Timer::new(owner);
    let above = Timer::new(owner);
    let report: &'static Pool<(bool, bool, u64)> =
        Box::leak(Box::new(Pool::new((true, false, 0))));

    owner.start(move |task| {
        // duration == max: a single hardware arm, no chopping
        exact.set_max_hw_time(100_000);
        exact.start(100_000);
        let exact_chopped = exact.is_long_chopping_active();
        task.wait(&exact);

        // duration == max + 1: chopping, one maximal arm plus remainder
        above.set_max_hw_time(100_000);
        let t0 = time::now_us();
        above.start(100_001);
        let above_chopped = above.is_long_chopping_active();
        task.wait(&above);
        let us = time::now_us() - t0;
        report.write((exact_chopped, above_chopped, us));
    });

    assert!(common::wait_until(move || report.read().2 != 0, 10_000));
    let (exact_chopped, above_chopped, us) = report.read();
    assert!(!exact_chopped, "duration == max must use a single arm");
    assert!(above_chopped, "duration == max + 1 must chop");
    assert!(us >= 90_000);
    assert!(us < 1_500_000);
    assert_eq!(above.fired_so_far_us(), 100_001);
}

#[test]
fn stop_mid_chunk_never_fires() {
    common::init_once();

    let owner = Task::create("timer_stop", Priority::Normal, 4096);
    let timer = Timer::new(owner);
    let park = Flag::new(owner);
    let armed: &'static Pool<bool> = Box::leak(Box::new(Pool::new(false)));

    owner.start(move |task| {
        timer.set_max_hw_time(30_000);
        timer.start(150_000);
        armed.write(true);
        // park on a flag nobody raises; the checks below watch the timer
        // bit from outside
        task.wait(&park);
    });

    assert!(common::wait_until(move || armed.read(), 2_000));
    common::sleep_ms(50); // a chunk or two into the chop
    timer.stop();
    assert!(!timer.is_long_chopping_active());

    // across what would have been the remaining chunks and well past the
    // full duration: the bit must never appear
    for _ in 0..12 {
        common::sleep_ms(50);
        assert!(!owner.is_set(&timer), "stopped timer fired");
    }
}

#[test]
fn wait_any_mixes_timers_and_flags() {
    common::init_once();

    let owner = Task::create("timer_mixed", Priority::Normal, 4096);
    let timer = Timer::new(owner);
    let flag = Flag::new(owner);
    let outcome: &'static Pool<i32> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |task| {
        // round 1: only the flag is raised
        task.wait_any(timer.mask() | flag.mask());
        let flag_first =
            task.has_fired(&flag) && !task.has_fired(&timer);

        // round 2: only the timer runs
        timer.start(60_000);
        task.wait_any(timer.mask() | flag.mask());
        let timer_second =
            task.has_fired(&timer) && !task.has_fired(&flag);

        outcome.write(match (flag_first, timer_second) {
            (true, true) => 1,
            (false, _) => -1,
            (_, false) => -2,
        });
    });

    common::sleep_ms(50);
    flag.set();
    assert!(common::wait_until(move || outcome.read() != 0, 5_000));
    assert_eq!(outcome.read(), 1);
}

#[test]
fn sleep_us_blocks_for_the_duration() {
    common::init_once();

    let owner = Task::create("timer_sleep", Priority::Normal, 4096);
    let timer = Timer::new(owner);
    let elapsed: &'static Pool<u64> = Box::leak(Box::new(Pool::new(0)));

    owner.start(move |_| {
        let t0 = time::now_us();
        timer.sleep_us(70_000);
        elapsed.write(time::now_us() - t0);
    });

    assert!(common::wait_until(move || elapsed.read() != 0, 5_000));
    let us = elapsed.read();
    assert!(us >= 60_000, "woke early: {}", us);
    assert!(us < 1_000_000);
}
