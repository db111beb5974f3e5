//! # No-op Port
//!
//! Backend for substrates without real concurrency to suppress: every
//! masking operation is empty, there is one core, and yield requests are
//! dropped because nothing else can be dispatched.

use super::{InterruptMask, Port};
use crate::types::CoreId;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPort;

impl Port for NoOpPort {
    #[inline(always)]
    fn disable_interrupts(&self, _core: CoreId) {}

    #[inline(always)]
    fn enable_interrupts(&self, _core: CoreId) {}

    #[inline(always)]
    fn set_interrupt_mask(&self, _core: CoreId) -> InterruptMask {
        InterruptMask::new(true)
    }

    #[inline(always)]
    fn clear_interrupt_mask(&self, _core: CoreId, _mask: InterruptMask) {}

    #[inline(always)]
    fn core_id(&self) -> CoreId {
        0
    }

    #[inline(always)]
    fn yield_core(&self, _core: CoreId) {}
}
