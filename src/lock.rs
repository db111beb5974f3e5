//! # Task Lock / ISR Lock
//!
//! Two independent recursive spin locks guarding scheduler state when more
//! than one core runs scheduler code:
//!
//! - **Task Lock**: taken by task-context code (ready lists, the ready
//!   bitmap, delayed-task structures).
//! - **ISR Lock**: taken for the same data from interrupt context.
//!
//! Keeping them apart lets a core holding only the Task Lock still take an
//! interrupt that needs just the ISR Lock.
//!
//! Both locks are owned per core and re-entrant: the owning core may acquire
//! again, and the lock is handed to another core only after as many releases
//! as acquires. Acquire spins without a timeout.

use core::fmt;
use core::hint;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::error::{halt, InvariantViolation};
use crate::types::CoreId;

const NO_OWNER: usize = usize::MAX;

/// Which lock of the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockId {
    Task,
    Isr,
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockId::Task => f.write_str("task lock"),
            LockId::Isr => f.write_str("ISR lock"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recursive spin lock
// ---------------------------------------------------------------------------

/// Spin lock owned by a core, re-entrant for that core.
pub struct RecursiveSpinLock {
    id: LockId,
    owner: AtomicUsize,
    /// Only touched by the owning core.
    depth: AtomicU32,
}

impl RecursiveSpinLock {
    pub const fn new(id: LockId) -> Self {
        Self {
            id,
            owner: AtomicUsize::new(NO_OWNER),
            depth: AtomicU32::new(0),
        }
    }

    /// Take the lock for `core`, spinning while another core holds it.
    ///
    /// Halts if the owner's recursive count would wrap.
    pub fn acquire(&self, core: CoreId) {
        if self.owner.load(Ordering::Acquire) == core {
            let depth = match self.depth.load(Ordering::Relaxed).checked_add(1) {
                Some(depth) => depth,
                None => halt(InvariantViolation::LockOverflow { lock: self.id, core }),
            };
            self.depth.store(depth, Ordering::Relaxed);
            return;
        }

        while self
            .owner
            .compare_exchange_weak(NO_OWNER, core, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.owner.load(Ordering::Relaxed) != NO_OWNER {
                hint::spin_loop();
            }
        }
        self.depth.store(1, Ordering::Relaxed);
    }

    /// Give back one acquisition.
    ///
    /// Halts if `core` does not hold the lock, which also covers releasing
    /// more often than acquiring.
    pub fn release(&self, core: CoreId) {
        if self.owner.load(Ordering::Relaxed) != core {
            halt(InvariantViolation::LockNotHeld { lock: self.id, core });
        }

        let depth = self.depth.load(Ordering::Relaxed) - 1;
        self.depth.store(depth, Ordering::Relaxed);
        if depth == 0 {
            self.owner.store(NO_OWNER, Ordering::Release);
        }
    }

    /// Core currently holding the lock.
    pub fn owner(&self) -> Option<CoreId> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            core => Some(core),
        }
    }

    pub fn is_held(&self) -> bool {
        self.owner().is_some()
    }

    pub fn is_held_by(&self, core: CoreId) -> bool {
        self.owner() == Some(core)
    }

    /// Outstanding acquisitions by the owner, 0 when free.
    /// Only meaningful when called from the owning core.
    pub fn depth(&self) -> u32 {
        if self.is_held() {
            self.depth.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Lock pair
// ---------------------------------------------------------------------------

/// The Task Lock and ISR Lock of a multi-core build.
pub struct LockPair {
    task: RecursiveSpinLock,
    isr: RecursiveSpinLock,
}

impl LockPair {
    pub const fn new() -> Self {
        Self {
            task: RecursiveSpinLock::new(LockId::Task),
            isr: RecursiveSpinLock::new(LockId::Isr),
        }
    }

    #[inline]
    pub fn get(&self, lock: LockId) -> &RecursiveSpinLock {
        match lock {
            LockId::Task => &self.task,
            LockId::Isr => &self.isr,
        }
    }

    /// Block `core` until `lock` is free or already held by `core`.
    #[inline]
    pub fn acquire(&self, lock: LockId, core: CoreId) {
        self.get(lock).acquire(core);
    }

    #[inline]
    pub fn release(&self, lock: LockId, core: CoreId) {
        self.get(lock).release(core);
    }

    pub fn is_held(&self, lock: LockId) -> bool {
        self.get(lock).is_held()
    }
}

impl Default for LockPair {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
