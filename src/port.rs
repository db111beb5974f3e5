//! # Port Layer
//!
//! The operations the scheduler core calls to get race-free task dispatch:
//! nesting critical sections, the Task/ISR lock pair and yield requests.
//!
//! ## Ownership
//!
//! A [`PortLayer`] owns everything this layer keeps: the backend, the
//! resolved [`PortConfig`], the per-core critical nesting counts, the
//! [`LockPair`] and per-core pending-yield flags. Scheduler code reaches it
//! through a [`CoreContext`], one per core, which names its core explicitly:
//!
//! ```text
//! PortLayer ──core(id)──► CoreContext ──► enter_critical / exit_critical
//!    │                                    request_yield / acquire / release
//!    ├── Port backend (mask, dispatch)
//!    ├── NestingStore (depth per core)
//!    └── LockPair (Task Lock, ISR Lock)
//! ```
//!
//! ## Critical sections
//!
//! ```text
//!   Unlocked ──enter──► Locked(1) ──enter──► Locked(2) ...
//!      ▲                   │                    │
//!      └───────exit────────┘◄───────exit────────┘
//! ```
//!
//! Single core: the outermost entry suspends preemption through the
//! backend and the outermost exit resumes it. The lock pair is never
//! touched.
//!
//! Multiple cores: masking local interrupts does not keep other cores out,
//! so the outermost entry also takes the Task Lock and then the ISR Lock,
//! and the outermost exit releases them in reverse order before unmasking.
//! The `_from_isr` variants take only the ISR Lock.
//!
//! An unmatched exit halts.
//!
//! ## Yield requests
//!
//! A yield requested while the requesting core is inside a critical
//! section is held back and issued by the outermost exit, the next point
//! at which the core may be preempted.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::arch::{InterruptMask, Port};
use crate::config::{PortConfig, MAX_CORES};
use crate::error::{halt, ConfigError, InvariantViolation};
use crate::lock::{LockId, LockPair};
use crate::ready::ReadyPriorities;
use crate::types::CoreId;

#[allow(clippy::declare_interior_mutable_const)]
const ZERO_DEPTH: AtomicU32 = AtomicU32::new(0);
#[allow(clippy::declare_interior_mutable_const)]
const NOT_PENDING: AtomicBool = AtomicBool::new(false);

// ---------------------------------------------------------------------------
// Nesting storage
// ---------------------------------------------------------------------------

/// Where critical nesting depth lives.
///
/// Called whenever a core's depth changes. A scheduler that keeps the count
/// per task (so it travels with the task across a context switch) implements
/// this over its task control blocks.
pub trait NestingStore: Sync {
    fn load(&self, core: CoreId) -> u32;
    fn store(&self, core: CoreId, depth: u32);
}

/// Default store: one counter per core.
pub struct CoreNesting {
    depth: [AtomicU32; MAX_CORES],
}

impl CoreNesting {
    pub const fn new() -> Self {
        Self {
            depth: [ZERO_DEPTH; MAX_CORES],
        }
    }
}

impl Default for CoreNesting {
    fn default() -> Self {
        Self::new()
    }
}

impl NestingStore for CoreNesting {
    #[inline]
    fn load(&self, core: CoreId) -> u32 {
        self.depth[core].load(Ordering::Relaxed)
    }

    #[inline]
    fn store(&self, core: CoreId, depth: u32) {
        self.depth[core].store(depth, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Port layer
// ---------------------------------------------------------------------------

/// State owned by the port layer, shared by all cores.
pub struct PortLayer<P: Port, S: NestingStore = CoreNesting> {
    port: P,
    config: PortConfig,
    nesting: S,
    locks: LockPair,
    yield_pending: [AtomicBool; MAX_CORES],
}

impl<P: Port> PortLayer<P, CoreNesting> {
    /// Build a port layer, usable in `static` initializers.
    ///
    /// # Panics
    /// If `config` is invalid. In a `static` or `const` this is a build
    /// error.
    pub const fn new(port: P, config: PortConfig) -> Self {
        Self::with_nesting_store(port, CoreNesting::new(), config)
    }

    /// Build a port layer, reporting an invalid configuration.
    pub fn try_new(port: P, config: PortConfig) -> Result<Self, ConfigError> {
        Self::try_with_nesting_store(port, CoreNesting::new(), config)
    }
}

impl<P: Port, S: NestingStore> PortLayer<P, S> {
    pub const fn with_nesting_store(port: P, nesting: S, config: PortConfig) -> Self {
        config.assert_valid();
        Self {
            port,
            config,
            nesting,
            locks: LockPair::new(),
            yield_pending: [NOT_PENDING; MAX_CORES],
        }
    }

    pub fn try_with_nesting_store(
        port: P,
        nesting: S,
        config: PortConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        log::debug!(
            "port layer: {} priorities, {} core(s), {} ticks, {} task selection",
            config.max_priorities,
            config.cores,
            config.tick_width,
            if config.optimised_task_selection { "optimised" } else { "generic" },
        );
        Ok(Self::with_nesting_store(port, nesting, config))
    }

    /// Context for `core`. Halts if `core` is not configured.
    pub fn core(&self, core: CoreId) -> CoreContext<'_, P, S> {
        self.check_core(core);
        CoreContext { layer: self, id: core }
    }

    /// Context for the core the backend reports as executing.
    pub fn current_core(&self) -> CoreContext<'_, P, S> {
        self.core(self.port.core_id())
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockPair {
        &self.locks
    }

    pub fn nesting_store(&self) -> &S {
        &self.nesting
    }

    /// Empty ready set bounded by the configured priority count.
    pub fn ready_set(&self) -> ReadyPriorities {
        ReadyPriorities::for_config(&self.config)
    }

    fn check_core(&self, core: CoreId) {
        if core >= self.config.cores {
            halt(InvariantViolation::CoreOutOfRange {
                core,
                cores: self.config.cores,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Per-core context
// ---------------------------------------------------------------------------

/// The port layer as seen from one core.
pub struct CoreContext<'a, P: Port, S: NestingStore = CoreNesting> {
    layer: &'a PortLayer<P, S>,
    id: CoreId,
}

impl<P: Port, S: NestingStore> Clone for CoreContext<'_, P, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Port, S: NestingStore> Copy for CoreContext<'_, P, S> {}

impl<'a, P: Port, S: NestingStore> CoreContext<'a, P, S> {
    #[inline]
    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn layer(&self) -> &'a PortLayer<P, S> {
        self.layer
    }

    /// Open (or nest) a critical section on this core.
    ///
    /// Task context only; interrupt handlers use the `_from_isr` pair.
    pub fn enter_critical(&self) {
        let layer = self.layer;
        let depth = if layer.config.is_multi_core() {
            layer.port.disable_interrupts(self.id);
            let depth = self.nesting_depth();
            if depth == 0 {
                layer.locks.acquire(LockId::Task, self.id);
                layer.locks.acquire(LockId::Isr, self.id);
            }
            depth
        } else {
            let depth = self.nesting_depth();
            if depth == 0 {
                layer.port.disable_interrupts(self.id);
            }
            depth
        };
        self.store_depth(self.deeper(depth));
    }

    /// Close one level. The outermost exit resumes preemption.
    pub fn exit_critical(&self) {
        let layer = self.layer;
        let depth = self.shallower();
        if depth > 0 {
            return;
        }
        if layer.config.is_multi_core() {
            layer.locks.release(LockId::Isr, self.id);
            layer.locks.release(LockId::Task, self.id);
        }
        layer.port.enable_interrupts(self.id);
        self.deliver_pending_yield();
    }

    /// Interrupt-context entry. Returns the mask to hand back to
    /// [`CoreContext::exit_critical_from_isr`].
    pub fn enter_critical_from_isr(&self) -> InterruptMask {
        let layer = self.layer;
        let mask = layer.port.set_interrupt_mask(self.id);
        if layer.config.is_multi_core() {
            let depth = self.nesting_depth();
            if depth == 0 {
                layer.locks.acquire(LockId::Isr, self.id);
            }
            self.store_depth(self.deeper(depth));
        }
        mask
    }

    pub fn exit_critical_from_isr(&self, mask: InterruptMask) {
        let layer = self.layer;
        let mut outermost = true;
        if layer.config.is_multi_core() {
            outermost = self.shallower() == 0;
            if outermost {
                layer.locks.release(LockId::Isr, self.id);
            }
        }
        layer.port.clear_interrupt_mask(self.id, mask);
        if outermost && mask.was_enabled() {
            self.deliver_pending_yield();
        }
    }

    /// Run `f` inside a critical section.
    #[inline]
    pub fn critical<R>(&self, f: impl FnOnce() -> R) -> R {
        self.enter_critical();
        let result = f();
        self.exit_critical();
        result
    }

    #[inline]
    pub fn nesting_depth(&self) -> u32 {
        self.layer.nesting.load(self.id)
    }

    #[inline]
    pub fn in_critical(&self) -> bool {
        self.nesting_depth() > 0
    }

    /// Ask for the running task on this core to be re-evaluated.
    pub fn request_yield(&self) {
        if self.in_critical() {
            self.layer.yield_pending[self.id].store(true, Ordering::Release);
        } else {
            self.layer.port.yield_core(self.id);
        }
    }

    /// Ask `target` to reschedule, e.g. after readying a task that should
    /// preempt what `target` runs. On a single-core build the only valid
    /// target is this core.
    pub fn request_yield_core(&self, target: CoreId) {
        self.layer.check_core(target);
        if target == self.id {
            self.request_yield();
        } else {
            log::trace!("core {} requests yield on core {}", self.id, target);
            self.layer.port.yield_core(target);
        }
    }

    /// Whether a yield is waiting for this core's outermost exit.
    pub fn yield_pending(&self) -> bool {
        self.layer.yield_pending[self.id].load(Ordering::Acquire)
    }

    /// Take `lock` for this core, spinning while another core holds it.
    #[inline]
    pub fn acquire(&self, lock: LockId) {
        self.layer.locks.acquire(lock, self.id);
    }

    #[inline]
    pub fn release(&self, lock: LockId) {
        self.layer.locks.release(lock, self.id);
    }

    fn deliver_pending_yield(&self) {
        if self.layer.yield_pending[self.id].swap(false, Ordering::AcqRel) {
            self.layer.port.yield_core(self.id);
        }
    }

    fn deeper(&self, depth: u32) -> u32 {
        match depth.checked_add(1) {
            Some(depth) => depth,
            None => halt(InvariantViolation::NestingOverflow { core: self.id }),
        }
    }

    /// Decrement and store the depth, returning the new value.
    fn shallower(&self) -> u32 {
        let depth = self.nesting_depth();
        if depth == 0 {
            halt(InvariantViolation::NestingUnderflow { core: self.id });
        }
        self.store_depth(depth - 1);
        depth - 1
    }

    #[inline]
    fn store_depth(&self, depth: u32) {
        self.layer.nesting.store(self.id, depth);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::arch::host::HostPort;
    use crate::arch::noop::NoOpPort;
    use crate::config::CONFIG;
    use core::cell::UnsafeCell;
    use core::sync::atomic::AtomicUsize;
    use std::thread;

    const IDLE: usize = usize::MAX;

    fn single_core() -> PortLayer<HostPort> {
        PortLayer::try_new(HostPort::new(), CONFIG.with_cores(1)).unwrap()
    }

    fn multi_core(cores: usize) -> PortLayer<HostPort> {
        PortLayer::try_new(HostPort::new(), CONFIG.with_cores(cores)).unwrap()
    }

    fn xorshift(state: &mut u32) -> u32 {
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        *state = x;
        x
    }

    /// Records every persisted depth, like a scheduler storing the count in
    /// the running task's TCB.
    struct TaskNesting {
        depth: AtomicU32,
        persisted: AtomicU32,
    }

    impl NestingStore for TaskNesting {
        fn load(&self, _core: CoreId) -> u32 {
            self.depth.load(Ordering::Relaxed)
        }

        fn store(&self, _core: CoreId, depth: u32) {
            self.persisted.fetch_add(1, Ordering::Relaxed);
            self.depth.store(depth, Ordering::Relaxed);
        }
    }

    struct Shared(UnsafeCell<u64>);
    unsafe impl Sync for Shared {}

    static STATIC_LAYER: PortLayer<NoOpPort> = PortLayer::new(NoOpPort, CONFIG);

    #[test]
    fn test_nested_critical_unlocks_on_outermost_exit() {
        let layer = single_core();
        let core = layer.core(0);

        core.enter_critical();
        core.enter_critical();
        core.exit_critical();
        assert!(core.in_critical());
        assert!(!layer.port().interrupts_enabled(0));

        core.exit_critical();
        assert_eq!(core.nesting_depth(), 0);
        assert!(layer.port().interrupts_enabled(0));
    }

    #[test]
    fn test_single_core_never_touches_locks() {
        let layer = single_core();
        let core = layer.current_core();
        assert_eq!(core.id(), 0);

        core.critical(|| {
            assert!(!layer.locks().is_held(LockId::Task));
            assert!(!layer.locks().is_held(LockId::Isr));
        });

        let mask = core.enter_critical_from_isr();
        assert!(!layer.locks().is_held(LockId::Isr));
        assert_eq!(core.nesting_depth(), 0);
        core.exit_critical_from_isr(mask);
        assert!(layer.port().interrupts_enabled(0));
    }

    #[test]
    fn test_isr_entry_inside_task_critical_keeps_mask() {
        let layer = single_core();
        let core = layer.core(0);
        core.enter_critical();
        let mask = core.enter_critical_from_isr();
        assert!(!mask.was_enabled());
        core.exit_critical_from_isr(mask);
        assert!(!layer.port().interrupts_enabled(0));
        core.exit_critical();
        assert!(layer.port().interrupts_enabled(0));
    }

    #[test]
    #[should_panic(expected = "critical nesting underflow on core 0")]
    fn test_unmatched_exit_halts() {
        let layer = single_core();
        let core = layer.core(0);
        core.enter_critical();
        core.exit_critical();
        core.exit_critical();
    }

    #[test]
    fn test_yield_inside_critical_is_deferred() {
        let layer = single_core();
        let core = layer.core(0);

        core.enter_critical();
        core.enter_critical();
        core.request_yield();
        core.request_yield();
        assert!(core.yield_pending());
        assert_eq!(layer.port().yield_requests(0), 0);

        core.exit_critical();
        assert_eq!(layer.port().yield_requests(0), 0);
        core.exit_critical();
        assert_eq!(layer.port().yield_requests(0), 1);
        assert!(!core.yield_pending());
    }

    #[test]
    fn test_yield_outside_critical_is_immediate() {
        let layer = single_core();
        let core = layer.core(0);
        core.request_yield();
        core.request_yield_core(0);
        assert_eq!(layer.port().yield_requests(0), 2);
    }

    #[test]
    #[should_panic(expected = "core 1 out of range (1 configured)")]
    fn test_cross_core_yield_on_single_core_halts() {
        let layer = single_core();
        layer.core(0).request_yield_core(1);
    }

    #[test]
    fn test_multi_core_critical_takes_both_locks() {
        let layer = multi_core(2);
        let core = layer.core(1);

        core.enter_critical();
        assert!(layer.locks().get(LockId::Task).is_held_by(1));
        assert!(layer.locks().get(LockId::Isr).is_held_by(1));
        assert!(!layer.port().interrupts_enabled(1));

        core.enter_critical();
        core.exit_critical();
        assert!(layer.locks().is_held(LockId::Task));

        core.exit_critical();
        assert!(!layer.locks().is_held(LockId::Task));
        assert!(!layer.locks().is_held(LockId::Isr));
        assert!(layer.port().interrupts_enabled(1));
    }

    #[test]
    fn test_multi_core_isr_critical_takes_isr_lock_only() {
        let layer = multi_core(2);
        let core = layer.core(0);

        let mask = core.enter_critical_from_isr();
        assert_eq!(core.nesting_depth(), 1);
        assert!(layer.locks().get(LockId::Isr).is_held_by(0));
        assert!(!layer.locks().is_held(LockId::Task));

        core.exit_critical_from_isr(mask);
        assert_eq!(core.nesting_depth(), 0);
        assert!(!layer.locks().is_held(LockId::Isr));
        assert!(layer.port().interrupts_enabled(0));
    }

    #[test]
    fn test_isr_critical_not_blocked_by_task_lock_holder() {
        let layer = multi_core(2);
        layer.core(0).acquire(LockId::Task);

        thread::scope(|s| {
            s.spawn(|| {
                let core = layer.core(1);
                let mask = core.enter_critical_from_isr();
                core.exit_critical_from_isr(mask);
            })
            .join()
            .unwrap();
        });

        assert!(layer.locks().get(LockId::Task).is_held_by(0));
        layer.core(0).release(LockId::Task);
    }

    #[test]
    fn test_cross_core_yield_reaches_target() {
        let layer = multi_core(3);
        let core = layer.core(0);
        core.critical(|| core.request_yield_core(2));
        assert_eq!(layer.port().yield_requests(2), 1);
        assert_eq!(layer.port().yield_requests(0), 0);
    }

    #[test]
    fn test_multi_core_mutual_exclusion_under_stress() {
        const CORES: usize = 4;
        const ROUNDS: u64 = 2_000;

        let layer = multi_core(CORES);
        let occupant = AtomicUsize::new(IDLE);
        let counter = Shared(UnsafeCell::new(0));

        thread::scope(|s| {
            for id in 0..CORES {
                let layer = &layer;
                let occupant = &occupant;
                let counter = &counter;
                s.spawn(move || {
                    let core = layer.core(id);
                    let mut seed = 0xA5A5_5A5A ^ (id as u32 + 1);
                    for _ in 0..ROUNDS {
                        let nesting = 1 + xorshift(&mut seed) % 3;
                        for _ in 0..nesting {
                            core.enter_critical();
                        }
                        let previous = occupant.swap(id, Ordering::SeqCst);
                        assert!(previous == IDLE, "core {} entered while core {} inside", id, previous);
                        unsafe { *counter.0.get() += 1 };
                        occupant.store(IDLE, Ordering::SeqCst);
                        for _ in 0..nesting {
                            core.exit_critical();
                        }
                        assert_eq!(core.nesting_depth(), 0);
                    }
                });
            }
        });

        assert_eq!(unsafe { *counter.0.get() }, CORES as u64 * ROUNDS);
        assert!(!layer.locks().is_held(LockId::Task));
    }

    #[test]
    fn test_task_and_isr_sections_exclude_across_cores() {
        const CORES: usize = 4;
        const ROUNDS: u64 = 2_000;

        let layer = multi_core(CORES);
        let occupant = AtomicUsize::new(IDLE);
        let counter = Shared(UnsafeCell::new(0));

        let occupy = |id: usize| {
            let _ = &counter;
            let previous = occupant.swap(id, Ordering::SeqCst);
            assert!(previous == IDLE, "core {} entered while core {} inside", id, previous);
            unsafe { *counter.0.get() += 1 };
        };

        thread::scope(|s| {
            for id in 0..CORES {
                let layer = &layer;
                let occupant = &occupant;
                let counter = &counter;
                let occupy = &occupy;
                s.spawn(move || {
                    let core = layer.core(id);
                    let mut seed = 0x1357_9BDF ^ ((id as u32 + 1) << 8);
                    for _ in 0..ROUNDS {
                        match xorshift(&mut seed) % 3 {
                            0 => {
                                let mask = core.enter_critical_from_isr();
                                occupy(id);
                                occupant.store(IDLE, Ordering::SeqCst);
                                core.exit_critical_from_isr(mask);
                            }
                            1 => {
                                core.enter_critical();
                                occupy(id);
                                occupant.store(IDLE, Ordering::SeqCst);
                                core.exit_critical();
                            }
                            _ => {
                                // Interrupt taken while the task holds the section
                                core.enter_critical();
                                occupy(id);
                                let mask = core.enter_critical_from_isr();
                                assert_eq!(occupant.load(Ordering::SeqCst), id);
                                unsafe { *counter.0.get() += 1 };
                                core.exit_critical_from_isr(mask);
                                assert!(layer.locks().get(LockId::Isr).is_held_by(id));
                                occupant.store(IDLE, Ordering::SeqCst);
                                core.exit_critical();
                            }
                        }
                        assert_eq!(core.nesting_depth(), 0);
                    }
                });
            }
        });

        let mut expected = 0;
        for id in 0..CORES {
            let mut seed = 0x1357_9BDF ^ ((id as u32 + 1) << 8);
            for _ in 0..ROUNDS {
                expected += if xorshift(&mut seed) % 3 == 2 { 2 } else { 1 };
            }
        }
        assert_eq!(unsafe { *counter.0.get() }, expected);
        assert!(!layer.locks().is_held(LockId::Task));
        assert!(!layer.locks().is_held(LockId::Isr));
    }

    #[test]
    fn test_ready_set_follows_configured_priorities() {
        let layer = PortLayer::try_new(HostPort::new(), CONFIG.with_max_priorities(4)).unwrap();
        let mut ready = layer.ready_set();
        assert_eq!(ready.limit(), 4);
        ready.record_ready(3);
        assert_eq!(ready.highest_ready(), 3);
    }

    #[test]
    #[should_panic(expected = "priority 20 out of range")]
    fn test_ready_set_rejects_priority_beyond_config() {
        let layer = PortLayer::try_new(HostPort::new(), CONFIG.with_max_priorities(4)).unwrap();
        let core = layer.core(0);
        let mut ready = layer.ready_set();
        core.critical(|| ready.record_ready(20));
    }

    #[test]
    fn test_nesting_store_receives_every_change() {
        let store = TaskNesting {
            depth: AtomicU32::new(0),
            persisted: AtomicU32::new(0),
        };
        let layer = PortLayer::try_with_nesting_store(HostPort::new(), store, CONFIG.with_cores(2))
            .unwrap();
        let core = layer.core(0);
        core.enter_critical();
        core.enter_critical();
        core.exit_critical();
        core.exit_critical();
        assert_eq!(layer.nesting_store().persisted.load(Ordering::Relaxed), 4);
        assert_eq!(layer.nesting_store().depth.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_try_new_rejects_invalid_config() {
        let result = PortLayer::try_new(NoOpPort, CONFIG.with_cores(0));
        assert!(matches!(result, Err(ConfigError::NoCores)));
    }

    #[test]
    fn test_static_noop_layer() {
        let core = STATIC_LAYER.current_core();
        core.critical(|| assert_eq!(core.nesting_depth(), 1));
        core.request_yield();
        assert!(!core.in_critical());
        assert_eq!(STATIC_LAYER.config(), &CONFIG);
    }
}
