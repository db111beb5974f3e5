//! # Synchronization Primitives
//!
//! Closure-based access to shared scheduler state. Every piece of state the
//! scheduler shares between cores or with interrupt handlers (the ready
//! bitmap first of all) must be touched only inside a critical section;
//! [`CriticalCell`] makes that the only way to reach it.
//!
//! # Usage
//! ```ignore
//! static READY: CriticalCell<ReadyPriorities> = CriticalCell::new(ReadyPriorities::new());
//!
//! let core = PORT.current_core();
//! let next = READY.with(&core, |ready| {
//!     ready.record_ready(3);
//!     ready.highest_ready()
//! });
//! ```

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::Port;
use crate::error::{halt, InvariantViolation};
use crate::port::{CoreContext, NestingStore};
use crate::types::CoreId;

/// Proof that a critical section is open on a core for `'cs`.
pub struct CriticalToken<'cs> {
    core: CoreId,
    _section: PhantomData<&'cs ()>,
}

impl CriticalToken<'_> {
    /// Core that opened the section.
    pub fn core(&self) -> CoreId {
        self.core
    }
}

/// Execute a closure within a critical section on `core`.
///
/// Keep the closure short: on a single core it runs with preemption
/// suspended, on several it also holds the Task and ISR locks.
#[inline]
pub fn critical_section<P, S, R>(
    core: &CoreContext<'_, P, S>,
    f: impl FnOnce(&CriticalToken<'_>) -> R,
) -> R
where
    P: Port,
    S: NestingStore,
{
    core.critical(|| {
        f(&CriticalToken {
            core: core.id(),
            _section: PhantomData,
        })
    })
}

/// Interrupt-context counterpart of [`critical_section`].
#[inline]
pub fn critical_section_from_isr<P, S, R>(
    core: &CoreContext<'_, P, S>,
    f: impl FnOnce(&CriticalToken<'_>) -> R,
) -> R
where
    P: Port,
    S: NestingStore,
{
    let mask = core.enter_critical_from_isr();
    let result = f(&CriticalToken {
        core: core.id(),
        _section: PhantomData,
    });
    core.exit_critical_from_isr(mask);
    result
}

// ---------------------------------------------------------------------------
// Critical cell
// ---------------------------------------------------------------------------

/// Scheduler data reachable only from inside a critical section.
///
/// Critical sections on any core exclude each other, so a borrow inside one
/// is exclusive. Borrowing the same cell again before the first borrow ends
/// (from a nested section) halts instead of aliasing.
pub struct CriticalCell<T> {
    value: UnsafeCell<T>,
    borrowed: AtomicBool,
}

// Safety: the value is only handed out as `&mut T` inside a critical
// section, and the `borrowed` flag rejects overlapping borrows.
unsafe impl<T: Send> Sync for CriticalCell<T> {}

impl<T> CriticalCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            borrowed: AtomicBool::new(false),
        }
    }

    /// Open a critical section on `core` and lend the value to `f`.
    pub fn with<P, S, R>(&self, core: &CoreContext<'_, P, S>, f: impl FnOnce(&mut T) -> R) -> R
    where
        P: Port,
        S: NestingStore,
    {
        critical_section(core, |cs| self.borrow(cs, f))
    }

    /// Lend the value to `f` inside an already open critical section.
    pub fn borrow<R>(&self, _cs: &CriticalToken<'_>, f: impl FnOnce(&mut T) -> R) -> R {
        if self.borrowed.swap(true, Ordering::Acquire) {
            halt(InvariantViolation::ReentrantBorrow);
        }
        // Safety: exclusive per the critical section plus the flag above.
        let result = f(unsafe { &mut *self.value.get() });
        self.borrowed.store(false, Ordering::Release);
        result
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
