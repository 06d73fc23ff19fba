// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time tunables. The defaults suit the systems this library was
//! written for; change them here, not at call sites.

/// Deepest mutex nesting any single task may reach. Each task tracks its
/// held mutex IDs on a stack of this depth.
pub const MAX_MUTEX_NESTING: usize = 20;

/// Mutex ID for a logger shared across the whole system: high, so it can
/// be taken below arbitrarily deep existing nestings.
pub const MUTEX_ID_LOGGER: u32 = 1 << 30;
