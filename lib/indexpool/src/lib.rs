// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-capacity allocator for dense integer handles.
//!
//! The pool hands out the indices `0..N` as reusable tokens. Allocation,
//! targeted claim, release and the used-check are all O(1); iterating over
//! the tokens currently in use is O(number in use). There is no storage
//! behind the tokens -- callers index their own arrays with them.
//!
//! Internally the pool keeps a free list and its inverse: `free_list` is a
//! permutation of `0..N` whose first `used` entries are the tokens in use,
//! and `slot_of[token]` is that token's position in the permutation.
//! Allocation and release swap tokens across the `used` boundary.

#![cfg_attr(target_os = "none", no_std)]

const UNDEFINED: i32 = -1;

pub struct IndexPool<const N: usize> {
    used: i32,
    free_list: [i32; N],
    slot_of: [i32; N],
}

/// Iteration state for [`IndexPool::first`] / [`IndexPool::next`].
///
/// The cursor stays valid when the token it just yielded is released; the
/// next call re-clamps to the shrunken in-use region and continues without
/// skipping or repeating survivors.
pub struct Cursor(i32);

impl Cursor {
    pub const fn new() -> Self {
        Cursor(UNDEFINED)
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> IndexPool<N> {
    pub const fn new() -> Self {
        let mut free_list = [0i32; N];
        let mut slot_of = [0i32; N];
        let mut i = 0;
        while i < N {
            free_list[i] = i as i32;
            slot_of[i] = i as i32;
            i += 1;
        }
        Self {
            used: 0,
            free_list,
            slot_of,
        }
    }

    /// Takes the next free token, or `None` when all `N` are in use.
    pub fn get_new(&mut self) -> Option<usize> {
        if self.used as usize >= N {
            return None;
        }
        let token = self.free_list[self.used as usize];
        self.used += 1;
        Some(token as usize)
    }

    /// Reserves a specific token. Fails if it is already in use.
    pub fn claim(&mut self, index: usize) -> bool {
        assert!(index < N);

        let slot = self.slot_of[index];
        if slot < self.used {
            return false;
        }

        // Swap the requested token with whichever free token currently sits
        // at the boundary, then grow the in-use region over it.
        let boundary = self.used;
        let other = self.free_list[boundary as usize];

        self.free_list[slot as usize] = other;
        self.free_list[boundary as usize] = index as i32;
        self.slot_of[other as usize] = slot;
        self.slot_of[index] = boundary;

        self.used += 1;
        true
    }

    /// Returns a token to the pool.
    pub fn release(&mut self, index: usize) {
        assert!(self.is_used(index));

        self.used -= 1;

        // Move the last in-use token into the released token's slot and park
        // the released token just past the boundary.
        let boundary = self.used;
        let last = self.free_list[boundary as usize];
        let slot = self.slot_of[index];

        self.free_list[slot as usize] = last;
        self.free_list[boundary as usize] = index as i32;
        self.slot_of[last as usize] = slot;
        self.slot_of[index] = boundary;
    }

    pub fn is_used(&self, index: usize) -> bool {
        index < N && self.slot_of[index] < self.used
    }

    pub fn in_use(&self) -> usize {
        self.used as usize
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn is_full(&self) -> bool {
        self.used as usize == N
    }

    /// Starts an iteration over the tokens in use, yielding the first one.
    pub fn first(&self, cursor: &mut Cursor) -> Option<usize> {
        if self.used == 0 {
            cursor.0 = UNDEFINED;
            return None;
        }
        let at = self.used - 1;
        let token = self.free_list[at as usize];
        cursor.0 = if at == 0 { UNDEFINED } else { at - 1 };
        Some(token as usize)
    }

    /// Yields the next in-use token, or `None` when the iteration is done.
    pub fn next(&self, cursor: &mut Cursor) -> Option<usize> {
        if cursor.0 == UNDEFINED {
            return None;
        }
        let mut at = cursor.0;
        if at >= self.used {
            // Tokens were released since the last step; fall back to the new
            // top of the in-use region.
            if self.used == 0 {
                cursor.0 = UNDEFINED;
                return None;
            }
            at = self.used - 1;
        }
        let token = self.free_list[at as usize];
        cursor.0 = if at == 0 { UNDEFINED } else { at - 1 };
        Some(token as usize)
    }
}

impl<const N: usize> Default for IndexPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_then_refuses() {
        let mut pool = IndexPool::<4>::new();
        let mut got = [false; 4];
        for _ in 0..4 {
            got[pool.get_new().unwrap()] = true;
        }
        assert!(got.iter().all(|&g| g));
        assert!(pool.is_full());
        assert_eq!(pool.get_new(), None);
    }

    #[test]
    fn release_makes_token_reusable() {
        let mut pool = IndexPool::<3>::new();
        let a = pool.get_new().unwrap();
        let b = pool.get_new().unwrap();
        let c = pool.get_new().unwrap();
        pool.release(b);
        assert!(!pool.is_used(b));
        assert!(pool.is_used(a) && pool.is_used(c));
        assert_eq!(pool.get_new(), Some(b));
    }

    #[test]
    fn claim_reserves_and_rejects() {
        let mut pool = IndexPool::<5>::new();
        assert!(pool.claim(3));
        assert!(pool.is_used(3));
        assert!(!pool.claim(3));
        // get_new must now skirt around the claimed token
        for _ in 0..4 {
            let t = pool.get_new().unwrap();
            assert_ne!(t, 3);
        }
        assert!(pool.is_full());
    }

    #[test]
    fn iteration_visits_every_used_token_once() {
        let mut pool = IndexPool::<6>::new();
        for _ in 0..4 {
            pool.get_new().unwrap();
        }
        pool.release(1);

        let mut seen = [0u32; 6];
        let mut cur = Cursor::new();
        let mut token = pool.first(&mut cur);
        while let Some(t) = token {
            seen[t] += 1;
            token = pool.next(&mut cur);
        }
        assert_eq!(seen[1], 0);
        assert_eq!(seen[0], 1);
        assert_eq!(seen[2], 1);
        assert_eq!(seen[3], 1);
    }

    #[test]
    fn iteration_survives_release_of_current_token() {
        let mut pool = IndexPool::<8>::new();
        for _ in 0..6 {
            pool.get_new().unwrap();
        }

        // Release every token as it comes up, the pattern the iterator
        // explicitly supports.
        let mut visited = 0;
        let mut cur = Cursor::new();
        let mut token = pool.first(&mut cur);
        while let Some(t) = token {
            pool.release(t);
            visited += 1;
            token = pool.next(&mut cur);
        }
        assert_eq!(visited, 6);
        assert!(pool.is_empty());
    }

    #[test]
    fn counters_track() {
        let mut pool = IndexPool::<2>::new();
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 2);
        let a = pool.get_new().unwrap();
        assert_eq!(pool.in_use(), 1);
        pool.release(a);
        assert!(pool.is_empty());
    }
}
