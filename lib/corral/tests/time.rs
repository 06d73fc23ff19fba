// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Monotonic clock behavior through the public time interface.

mod common;

use corral::time;

#[test]
fn advances_with_real_time() {
    common::init_once();

    let t0 = time::now_us();
    common::sleep_ms(50);
    let t1 = time::now_us();
    let elapsed = t1 - t0;
    // 50 ms of wall time, with slack for scheduling on either side
    assert!(elapsed >= 40_000, "only {} us elapsed", elapsed);
    assert!(elapsed < 5_000_000);
}

#[test]
fn readings_are_monotonic() {
    common::init_once();

    let mut prev = time::now_us();
    for _ in 0..50_000 {
        let now = time::now_us();
        assert!(now >= prev, "time went backward: {} -> {}", prev, now);
        prev = now;
    }
}

#[test]
fn unit_conversions_agree() {
    common::init_once();

    // ms sampled after us can only be equal or later
    let us = time::now_us();
    let ms = time::now_ms();
    assert!(ms * 1_000 + 999 >= us);

    let s = time::now_s();
    let ms2 = time::now_ms();
    assert!(s * 1_000 <= ms2);
    assert!(ms2 / 1_000 >= s);
}
