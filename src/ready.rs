//! # Ready-Priority Bitmap
//!
//! One bit per priority level, bit `p` set iff at least one task at priority
//! `p` is runnable. The scheduler consults it on every reschedule, so picking
//! the highest set bit must not be a scan over priority levels.
//!
//! With optimised selection (the default) every priority fits in one 32-bit
//! word and the lookup is a single count-leading-zeros. With the
//! `generic-task-selection` feature the set spans as many words as
//! `MAX_PRIORITIES` needs and the lookup walks the words top-down, still
//! using one bit scan per word.
//!
//! Each set carries a priority limit, `MAX_PRIORITIES` by default or the
//! `max_priorities` of a [`PortConfig`]; touching a priority at or above it
//! halts.
//!
//! The bitmap is shared scheduler state: mutate it only inside a critical
//! section, e.g. through a [`CriticalCell`](crate::sync::CriticalCell).

use crate::config::{PortConfig, MAX_PRIORITIES, USE_OPTIMISED_TASK_SELECTION};
use crate::error::{halt, InvariantViolation};
use crate::types::PriorityIndex;

const WORD_BITS: usize = u32::BITS as usize;

/// Words backing the ready set.
pub const READY_WORDS: usize = (MAX_PRIORITIES as usize + WORD_BITS - 1) / WORD_BITS;

const _: () = assert!(!USE_OPTIMISED_TASK_SELECTION || READY_WORDS == 1);

/// Index of the most significant set bit of `bits`.
///
/// `bits` must be non-zero. The scheduler always keeps the idle task ready,
/// so this is never asked about an empty set; [`ReadyPriorities::highest_ready`]
/// checks the precondition.
#[inline(always)]
pub const fn highest_ready_priority(bits: u32) -> PriorityIndex {
    (31 - bits.leading_zeros()) as PriorityIndex
}

/// Set of priorities that currently have a runnable task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPriorities {
    words: [u32; READY_WORDS],
    limit: PriorityIndex,
}

impl ReadyPriorities {
    /// Empty set accepting every priority below `MAX_PRIORITIES`.
    pub const fn new() -> Self {
        Self::with_limit(MAX_PRIORITIES)
    }

    /// Empty set accepting priorities `0..limit`.
    ///
    /// # Panics
    /// If `limit` is 0 or above `MAX_PRIORITIES`.
    pub const fn with_limit(limit: PriorityIndex) -> Self {
        assert!(
            limit > 0 && limit <= MAX_PRIORITIES,
            "ready set limit must be within 1..=MAX_PRIORITIES"
        );
        Self {
            words: [0; READY_WORDS],
            limit,
        }
    }

    /// Empty set sized for `config.max_priorities`.
    pub const fn for_config(config: &PortConfig) -> Self {
        Self::with_limit(config.max_priorities)
    }

    /// Number of priority levels this set accepts.
    #[inline]
    pub fn limit(&self) -> PriorityIndex {
        self.limit
    }

    /// Mark `priority` as having a runnable task. Idempotent.
    #[inline]
    pub fn record_ready(&mut self, priority: PriorityIndex) {
        let (word, mask) = self.locate(priority);
        self.words[word] |= mask;
    }

    /// Mark `priority` as having no runnable task. Idempotent.
    #[inline]
    pub fn reset_ready(&mut self, priority: PriorityIndex) {
        let (word, mask) = self.locate(priority);
        self.words[word] &= !mask;
    }

    #[inline]
    pub fn is_ready(&self, priority: PriorityIndex) -> bool {
        let (word, mask) = self.locate(priority);
        self.words[word] & mask != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    pub fn clear(&mut self) {
        self.words = [0; READY_WORDS];
    }

    /// Priorities 0..32 as a raw word.
    #[inline]
    pub fn bits(&self) -> u32 {
        self.words[0]
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Highest priority with a runnable task.
    ///
    /// Halts on an empty set.
    #[inline]
    pub fn highest_ready(&self) -> PriorityIndex {
        if USE_OPTIMISED_TASK_SELECTION {
            self.highest_ready_optimised()
        } else {
            self.highest_ready_generic()
        }
    }

    #[inline(always)]
    fn highest_ready_optimised(&self) -> PriorityIndex {
        let bits = self.words[0];
        if bits == 0 {
            halt(InvariantViolation::EmptyReadySet);
        }
        highest_ready_priority(bits)
    }

    fn highest_ready_generic(&self) -> PriorityIndex {
        for (index, &word) in self.words.iter().enumerate().rev() {
            if word != 0 {
                return (index * WORD_BITS) as PriorityIndex + highest_ready_priority(word);
            }
        }
        halt(InvariantViolation::EmptyReadySet)
    }

    #[inline(always)]
    fn locate(&self, priority: PriorityIndex) -> (usize, u32) {
        if priority >= self.limit {
            halt(InvariantViolation::PriorityOutOfRange { priority });
        }
        let bit = priority as usize;
        (bit / WORD_BITS, 1 << (bit % WORD_BITS))
    }
}

impl Default for ReadyPriorities {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG;

    fn xorshift(state: &mut u32) -> u32 {
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        *state = x;
        x
    }

    #[test]
    fn test_highest_ready_priority_word() {
        assert_eq!(highest_ready_priority(1), 0);
        assert_eq!(highest_ready_priority(0b1010_0000), 7);
        assert_eq!(highest_ready_priority(u32::MAX), 31);
        assert_eq!(highest_ready_priority(1 << 31), 31);
    }

    #[test]
    fn test_record_reset_sequence() {
        let mut ready = ReadyPriorities::new();
        for p in [2, 5, 5, 9] {
            ready.record_ready(p);
        }
        ready.reset_ready(5);
        assert_eq!(ready.highest_ready(), 9);

        ready.reset_ready(9);
        assert_eq!(ready.highest_ready(), 2);

        ready.reset_ready(2);
        assert!(ready.is_empty());
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut ready = ReadyPriorities::new();
        ready.record_ready(4);
        let once = ready;
        ready.record_ready(4);
        assert_eq!(ready, once);
        assert_eq!(ready.bits(), 1 << 4);
    }

    #[test]
    fn test_reset_then_record_round_trip() {
        let mut ready = ReadyPriorities::new();
        for p in [0, 3, 11] {
            ready.record_ready(p);
        }

        for p in [0, 3, 7, 11] {
            let before = ready;
            ready.reset_ready(p);
            ready.record_ready(p);
            if before.is_ready(p) {
                assert_eq!(ready, before);
            } else {
                // Round trip of a clear bit leaves it set afterwards
                assert!(ready.is_ready(p));
                ready.reset_ready(p);
                assert_eq!(ready, before);
            }
        }
    }

    #[test]
    fn test_order_does_not_matter() {
        let mut forward = ReadyPriorities::new();
        let mut backward = ReadyPriorities::new();
        let set = [1, 4, 6, 13, 20];
        for &p in set.iter() {
            forward.record_ready(p);
        }
        for &p in set.iter().rev() {
            backward.record_ready(p);
        }
        assert_eq!(forward, backward);
        assert_eq!(forward.highest_ready(), 20);
    }

    #[test]
    fn test_highest_matches_largest_recorded() {
        let mut seed = 0x2545_F491;
        let mut ready = ReadyPriorities::new();
        let mut shadow = [false; MAX_PRIORITIES as usize];

        for _ in 0..2000 {
            let p = (xorshift(&mut seed) % MAX_PRIORITIES as u32) as PriorityIndex;
            if xorshift(&mut seed) & 1 == 0 {
                ready.record_ready(p);
                shadow[p as usize] = true;
            } else {
                ready.reset_ready(p);
                shadow[p as usize] = false;
            }

            match shadow.iter().rposition(|&set| set) {
                Some(top) => assert_eq!(ready.highest_ready() as usize, top),
                None => assert!(ready.is_empty()),
            }
        }
    }

    #[test]
    fn test_generic_and_optimised_agree() {
        let mut ready = ReadyPriorities::new();
        ready.record_ready(0);
        ready.record_ready(MAX_PRIORITIES - 1);
        assert_eq!(ready.highest_ready_generic(), MAX_PRIORITIES - 1);
        if READY_WORDS == 1 {
            assert_eq!(ready.highest_ready_optimised(), ready.highest_ready_generic());
        }
    }

    #[test]
    fn test_clear() {
        let mut ready = ReadyPriorities::new();
        ready.record_ready(3);
        ready.clear();
        assert!(ready.is_empty());
        assert_eq!(ready.words().len(), READY_WORDS);
    }

    #[test]
    #[should_panic(expected = "empty ready set")]
    fn test_highest_of_empty_set_halts() {
        ReadyPriorities::new().highest_ready();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_priority_out_of_range_halts() {
        ReadyPriorities::new().record_ready(MAX_PRIORITIES);
    }

    #[test]
    fn test_configured_limit_bounds_priorities() {
        let cfg = CONFIG.with_max_priorities(4);
        let mut ready = ReadyPriorities::for_config(&cfg);
        assert_eq!(ready.limit(), 4);

        ready.record_ready(3);
        assert_eq!(ready.highest_ready(), 3);

        ready.clear();
        assert!(ready.is_empty());
        assert_eq!(ready.limit(), 4);
    }

    #[test]
    #[should_panic(expected = "priority 4 out of range")]
    fn test_record_at_configured_limit_halts() {
        let mut ready = ReadyPriorities::for_config(&CONFIG.with_max_priorities(4));
        ready.record_ready(4);
    }

    #[test]
    #[should_panic(expected = "priority 7 out of range")]
    fn test_query_above_configured_limit_halts() {
        ReadyPriorities::with_limit(4).is_ready(7);
    }

    #[test]
    #[should_panic(expected = "within 1..=MAX_PRIORITIES")]
    fn test_limit_above_capacity_rejected() {
        ReadyPriorities::with_limit(MAX_PRIORITIES + 1);
    }
}
