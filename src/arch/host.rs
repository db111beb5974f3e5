//! # Host Port
//!
//! Simulated backend for running scheduler code on a hosted target, where
//! there are no interrupts to mask. Each simulated core has an
//! "interrupts enabled" flag that critical sections clear and restore, and a
//! counter of yield requests. An optional dispatch hook stands in for the
//! external context-switch mechanism and is called on every yield request.
//!
//! The host has no notion of which simulated core is executing, so
//! [`Port::core_id`] reports core 0; multi-core simulations name their core
//! explicitly through [`PortLayer::core`](crate::port::PortLayer::core).

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::{InterruptMask, Port};
use crate::config::MAX_CORES;
use crate::types::CoreId;

#[allow(clippy::declare_interior_mutable_const)]
const ENABLED: AtomicBool = AtomicBool::new(true);
#[allow(clippy::declare_interior_mutable_const)]
const NO_REQUESTS: AtomicU32 = AtomicU32::new(0);

pub struct HostPort {
    interrupts_enabled: [AtomicBool; MAX_CORES],
    yield_requests: [AtomicU32; MAX_CORES],
    dispatch: Option<fn(CoreId)>,
}

impl HostPort {
    pub const fn new() -> Self {
        Self {
            interrupts_enabled: [ENABLED; MAX_CORES],
            yield_requests: [NO_REQUESTS; MAX_CORES],
            dispatch: None,
        }
    }

    /// Host port calling `hook` with the target core on every yield request.
    pub const fn with_dispatch(hook: fn(CoreId)) -> Self {
        let mut port = Self::new();
        port.dispatch = Some(hook);
        port
    }

    pub fn interrupts_enabled(&self, core: CoreId) -> bool {
        self.interrupts_enabled[core].load(Ordering::Acquire)
    }

    /// Yield requests delivered to `core` so far.
    pub fn yield_requests(&self, core: CoreId) -> u32 {
        self.yield_requests[core].load(Ordering::Acquire)
    }

    /// Consume the pending yield requests of `core`, as a simulated
    /// dispatcher would at its next preemption point.
    pub fn take_yield_requests(&self, core: CoreId) -> u32 {
        self.yield_requests[core].swap(0, Ordering::AcqRel)
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for HostPort {
    fn disable_interrupts(&self, core: CoreId) {
        self.interrupts_enabled[core].store(false, Ordering::Release);
    }

    fn enable_interrupts(&self, core: CoreId) {
        self.interrupts_enabled[core].store(true, Ordering::Release);
    }

    fn set_interrupt_mask(&self, core: CoreId) -> InterruptMask {
        InterruptMask::new(self.interrupts_enabled[core].swap(false, Ordering::AcqRel))
    }

    fn clear_interrupt_mask(&self, core: CoreId, mask: InterruptMask) {
        if mask.was_enabled() {
            self.enable_interrupts(core);
        }
    }

    fn core_id(&self) -> CoreId {
        0
    }

    fn yield_core(&self, core: CoreId) {
        self.yield_requests[core].fetch_add(1, Ordering::AcqRel);
        log::trace!("host dispatch requested on core {}", core);
        if let Some(dispatch) = self.dispatch {
            dispatch(core);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
