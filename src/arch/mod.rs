//! # Architecture Abstraction Layer
//!
//! The hardware boundary of the port layer. A [`Port`] backend supplies the
//! few primitives the scheduler-facing code needs: suspending preemption on
//! a core, saving/restoring an interrupt mask, identifying the executing
//! core and requesting a dispatch. Which backend is used is decided where
//! the [`PortLayer`](crate::port::PortLayer) is built, not at call sites.
//!
//! - [`noop::NoOpPort`]: no real concurrency to suppress.
//! - [`host::HostPort`]: simulated masking and dispatch for host runs.
//! - [`cortex_m4::CortexM4Port`]: PRIMASK masking and PendSV dispatch
//!   (bare-metal ARM only).

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
pub mod host;
pub mod noop;

use crate::types::CoreId;

/// Interrupt state saved by [`Port::set_interrupt_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptMask {
    was_enabled: bool,
}

impl InterruptMask {
    pub const fn new(was_enabled: bool) -> Self {
        Self { was_enabled }
    }

    /// Whether interrupts were enabled before the mask was set.
    #[inline]
    pub const fn was_enabled(self) -> bool {
        self.was_enabled
    }
}

/// Capabilities a backend provides to the port layer.
///
/// Interrupt operations act on the core passed in, which is always the
/// calling core; hardware backends ignore the argument since a core can only
/// mask its own interrupts.
pub trait Port: Sync {
    /// Stop preemption on `core` until [`Port::enable_interrupts`].
    fn disable_interrupts(&self, core: CoreId);

    fn enable_interrupts(&self, core: CoreId);

    /// Mask interrupts and return the previous state.
    fn set_interrupt_mask(&self, core: CoreId) -> InterruptMask;

    /// Restore the state returned by [`Port::set_interrupt_mask`].
    fn clear_interrupt_mask(&self, core: CoreId, mask: InterruptMask);

    /// Core executing the caller.
    fn core_id(&self) -> CoreId;

    /// Ask the dispatch mechanism to reschedule `core` at its next safe
    /// preemption point. Never switches context itself.
    fn yield_core(&self, core: CoreId);
}
