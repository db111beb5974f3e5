//! # Primitive Types
//!
//! Fixed representations the scheduler core's arithmetic relies on: stack
//! cells, base types, tick counters, priorities and core ids, plus the stack
//! growth direction and alignment of this port.
//!
//! The tick width is picked by the `tick-16`, `tick-32` or `tick-64`
//! feature. The counter must be readable in a single bus operation so the
//! scheduler can sample the current tick without a critical section; the
//! build refuses a width the target cannot load atomically.

use core::sync::atomic::Ordering;

use crate::config::{TICK_RATE_HZ, TICK_WIDTH};

#[cfg(not(any(feature = "tick-16", feature = "tick-32", feature = "tick-64")))]
compile_error!(
    "no tick type width selected: enable exactly one of the `tick-16`, `tick-32` or `tick-64` features"
);

#[cfg(all(feature = "tick-64", not(target_has_atomic = "64")))]
compile_error!("`tick-64` requires 64-bit atomics on this target; the tick count must be readable in one operation");

/// Smallest addressable unit of a task stack.
pub type StackType = u8;

/// Signed scheduler arithmetic type.
pub type BaseType = i8;

/// Unsigned scheduler arithmetic type.
pub type UBaseType = u8;

/// Integer wide enough to hold a pointer.
pub type PointerSizeType = usize;

/// Task priority, `0 <= p < MAX_PRIORITIES`.
pub type PriorityIndex = UBaseType;

/// Index of the executing core, always 0 on single-core builds.
pub type CoreId = usize;

#[cfg(feature = "tick-64")]
pub type TickType = u64;
#[cfg(feature = "tick-64")]
type AtomicTick = core::sync::atomic::AtomicU64;

#[cfg(all(feature = "tick-32", not(feature = "tick-64")))]
pub type TickType = u32;
#[cfg(all(feature = "tick-32", not(feature = "tick-64")))]
type AtomicTick = core::sync::atomic::AtomicU32;

#[cfg(all(feature = "tick-16", not(feature = "tick-32"), not(feature = "tick-64")))]
pub type TickType = u16;
#[cfg(all(feature = "tick-16", not(feature = "tick-32"), not(feature = "tick-64")))]
type AtomicTick = core::sync::atomic::AtomicU16;

const _: () = assert!(TickType::BITS == TICK_WIDTH.bits());

/// Delay value meaning "block forever". Never a legal finite delay.
pub const MAX_DELAY: TickType = !0;

/// `true` for any delay other than [`MAX_DELAY`].
#[inline]
pub const fn is_finite_delay(ticks: TickType) -> bool {
    ticks != MAX_DELAY
}

/// Convert milliseconds to ticks, rounding down.
///
/// Saturates one below [`MAX_DELAY`] so a long finite delay never turns
/// into "wait forever".
pub fn ticks_from_ms(ms: u64) -> TickType {
    let ticks = ms.saturating_mul(TICK_RATE_HZ as u64) / 1000;
    let limit = (MAX_DELAY - 1) as u64;
    ticks.min(limit) as TickType
}

// ---------------------------------------------------------------------------
// Tick counter
// ---------------------------------------------------------------------------

/// Scheduler tick count, wrapping modulo 2^width.
///
/// Written by the tick interrupt, read from anywhere without entering a
/// critical section.
pub struct TickCounter {
    count: AtomicTick,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicTick::new(0),
        }
    }

    /// Current tick.
    #[inline]
    pub fn now(&self) -> TickType {
        self.count.load(Ordering::Acquire)
    }

    /// Advance by one tick and return the new count. Wraps at the width.
    #[inline]
    pub fn increment(&self) -> TickType {
        self.count.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn set(&self, ticks: TickType) {
        self.count.store(ticks, Ordering::Release);
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Stack layout
// ---------------------------------------------------------------------------

/// Direction in which task stacks grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackGrowth {
    /// Toward lower addresses.
    Down,
    /// Toward higher addresses.
    Up,
}

impl StackGrowth {
    /// Signed step per push: -1 or +1.
    pub const fn step(self) -> BaseType {
        match self {
            StackGrowth::Down => -1,
            StackGrowth::Up => 1,
        }
    }
}

pub const STACK_GROWTH: StackGrowth = StackGrowth::Down;

/// Required alignment of stack pointer values, in bytes.
pub const BYTE_ALIGNMENT: usize = 8;

pub const BYTE_ALIGNMENT_MASK: usize = BYTE_ALIGNMENT - 1;

/// Align a stack pointer value away from the end it grows toward.
#[inline]
pub const fn align_stack_pointer(addr: PointerSizeType) -> PointerSizeType {
    match STACK_GROWTH {
        StackGrowth::Down => addr & !BYTE_ALIGNMENT_MASK,
        StackGrowth::Up => (addr + BYTE_ALIGNMENT_MASK) & !BYTE_ALIGNMENT_MASK,
    }
}

/// Stack memory of one task, `N` cells long.
///
/// Owned by exactly one task for the task's whole lifetime.
#[repr(C, align(8))]
pub struct TaskStack<const N: usize> {
    cells: [StackType; N],
}

const _: () = assert!(core::mem::align_of::<TaskStack<1>>() >= BYTE_ALIGNMENT);

impl<const N: usize> TaskStack<N> {
    pub const fn new() -> Self {
        Self { cells: [0; N] }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn cells_mut(&mut self) -> &mut [StackType] {
        &mut self.cells
    }

    /// First stack pointer of a fresh task: the aligned end of the buffer
    /// opposite to the growth direction.
    pub fn initial_top(&mut self) -> *mut StackType {
        let base = self.cells.as_mut_ptr();
        match STACK_GROWTH {
            StackGrowth::Down => {
                let end = base.wrapping_add(N);
                end.wrapping_sub(end as usize & BYTE_ALIGNMENT_MASK)
            }
            // The buffer itself is aligned, so its start already is.
            StackGrowth::Up => base,
        }
    }
}

impl<const N: usize> Default for TaskStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
