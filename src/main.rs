//! # EqOS Port Demo Firmware
//!
//! Drives the port layer on a Cortex-M4 the way a scheduler core would,
//! without a real task switcher:
//!
//! | Source | Action |
//! |--------|--------|
//! | SysTick | Advances the tick; every `TIME_SLICE` ticks readies the sporadic priority and requests a yield |
//! | main loop | Picks the highest ready priority inside a critical section, "runs" it, retires the sporadic priority |
//! | PendSV | Stands in for the dispatcher and counts dispatch requests |
//!
//! Build with `cargo build --release --features firmware --target thumbv7em-none-eabihf`.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::{entry, exception};
use panic_halt as _;

use eqos_port::arch::cortex_m4::{self, CortexM4Port};
use eqos_port::sync::critical_section_from_isr;
use eqos_port::types::PriorityIndex;
use eqos_port::{CriticalCell, PortLayer, ReadyPriorities, TickCounter, TickType, CONFIG};

const IDLE_PRIORITY: PriorityIndex = 0;
const BACKGROUND_PRIORITY: PriorityIndex = 2;
const SPORADIC_PRIORITY: PriorityIndex = 5;

/// Ticks between sporadic activations.
const TIME_SLICE: TickType = 10;

static PORT: PortLayer<CortexM4Port> = PortLayer::new(CortexM4Port, CONFIG);
static TICKS: TickCounter = TickCounter::new();
static READY: CriticalCell<ReadyPriorities> =
    CriticalCell::new(ReadyPriorities::for_config(&CONFIG));
static DISPATCHES: AtomicU32 = AtomicU32::new(0);

#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();

    let core = PORT.current_core();
    READY.with(&core, |ready| {
        ready.record_ready(IDLE_PRIORITY);
        ready.record_ready(BACKGROUND_PRIORITY);
    });

    cortex_m4::set_interrupt_priorities();
    cortex_m4::configure_systick(&mut cp.SYST, cortex_m4::DEFAULT_CORE_CLOCK_HZ);

    loop {
        let running = READY.with(&core, |ready| ready.highest_ready());

        if running == SPORADIC_PRIORITY {
            // Sporadic work done, back to waiting for the next activation
            READY.with(&core, |ready| ready.reset_ready(SPORADIC_PRIORITY));
            core.request_yield();
        }

        cortex_m::asm::wfi();
    }
}

#[exception]
fn SysTick() {
    let now = TICKS.increment();
    if now % TIME_SLICE == 0 {
        let core = PORT.current_core();
        critical_section_from_isr(&core, |cs| {
            READY.borrow(cs, |ready| ready.record_ready(SPORADIC_PRIORITY));
        });
        core.request_yield();
    }
}

#[exception]
fn PendSV() {
    DISPATCHES.fetch_add(1, Ordering::Relaxed);
}
