//! # Cortex-M4 Port
//!
//! Hardware backend for the ARM Cortex-M4 (Thumb-2, single core).
//!
//! - Critical sections mask interrupts through PRIMASK (`cpsid i` /
//!   `cpsie i`).
//! - A yield request pends PendSV. PendSV runs at the lowest exception
//!   priority, so the dispatch happens once no other handler is active and
//!   interrupts are unmasked again, i.e. at the next safe preemption point.
//! - SysTick provides the scheduler tick.
//!
//! The PendSV and SysTick handlers themselves belong to the kernel that
//! embeds this port (see `src/main.rs` for a minimal one).

use cortex_m::interrupt;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::register::primask;

use super::{InterruptMask, Port};
use crate::config::TICK_RATE_HZ;
use crate::types::CoreId;

/// Core clock after reset on the STM32F4 (16 MHz HSI).
pub const DEFAULT_CORE_CLOCK_HZ: u32 = 16_000_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct CortexM4Port;

impl Port for CortexM4Port {
    #[inline]
    fn disable_interrupts(&self, _core: CoreId) {
        interrupt::disable();
    }

    #[inline]
    fn enable_interrupts(&self, _core: CoreId) {
        unsafe { interrupt::enable() }
    }

    #[inline]
    fn set_interrupt_mask(&self, _core: CoreId) -> InterruptMask {
        let was_enabled = primask::read().is_active();
        interrupt::disable();
        InterruptMask::new(was_enabled)
    }

    #[inline]
    fn clear_interrupt_mask(&self, _core: CoreId, mask: InterruptMask) {
        if mask.was_enabled() {
            unsafe { interrupt::enable() }
        }
    }

    #[inline]
    fn core_id(&self) -> CoreId {
        0
    }

    #[inline]
    fn yield_core(&self, _core: CoreId) {
        trigger_pendsv();
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_RATE_HZ` from the processor clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST, core_clock_hz: u32) {
    let reload = core_clock_hz / TICK_RATE_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend the PendSV exception.
///
/// Sets PENDSVSET (bit 28) in the Interrupt Control and State Register.
#[inline]
pub fn trigger_pendsv() {
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

// ---------------------------------------------------------------------------
// Exception priorities
// ---------------------------------------------------------------------------

/// Put PendSV and SysTick at the lowest priority so a dispatch never
/// preempts an application interrupt handler.
pub fn set_interrupt_priorities() {
    unsafe {
        // SHPR3: bits [23:16] PendSV, [31:24] SysTick
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}
