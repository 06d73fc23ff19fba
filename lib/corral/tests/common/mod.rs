// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared scaffolding for the integration tests.

#![allow(dead_code)]

use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

/// Process-wide `corral::init`, callable from every test in a binary.
pub fn init_once() {
    static ONCE: Once = Once::new();
    ONCE.call_once(corral::init);
}

/// Polls `predicate` until it holds or `timeout_ms` passes.
pub fn wait_until(predicate: impl Fn() -> bool, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    predicate()
}

pub fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}
