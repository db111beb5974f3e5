//! # EqOS Port Layer
//!
//! The hardware/port contract a preemptive priority scheduler relies on to
//! stay portable across processors and threading substrates.
//!
//! ## Overview
//!
//! The scheduler core (ready/blocked lists, time slicing, tick accounting)
//! and the context-switch mechanism live outside this crate. What they need
//! from the port is small but must be exact:
//!
//! - **Fixed representations** for stack cells, tick counts and priorities
//! - **O(1) selection** of the highest priority with a runnable task
//! - **Nesting critical sections** that suspend preemption
//! - **A Task Lock / ISR Lock pair** once several cores share scheduler state
//! - **A yield trigger** asking the dispatcher to run
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                 Scheduler core (external)              │
//! ├────────────────────────────────────────────────────────┤
//! │            Port Layer (port.rs, sync.rs)               │
//! │   enter/exit_critical · request_yield · acquire/release│
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Ready Set   │   Lock Pair        │  Configuration    │
//! │  ready.rs    │   lock.rs          │  config.rs        │
//! │  ─ record    │   ─ Task Lock      │  ─ PortConfig     │
//! │  ─ reset     │   ─ ISR Lock       │  ─ build checks   │
//! │  ─ highest   │                    │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │            Primitive Types (types.rs)                  │
//! │    TickType · StackType · PriorityIndex · CoreId       │
//! ├────────────────────────────────────────────────────────┤
//! │            Backends (arch/)                            │
//! │    NoOpPort · HostPort · CortexM4Port                  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Control Flow
//!
//! 1. The scheduler enters a critical section before touching ready or
//!    blocked structures
//! 2. It records/resets ready priorities and asks for the highest one
//! 3. It requests a yield when the running task should be re-evaluated;
//!    inside a critical section the request waits for the outermost exit
//! 4. On multi-core builds the critical section also holds the lock pair,
//!    and `request_yield_core` reaches other cores
//!
//! ## Configuration
//!
//! - Features `tick-16` / `tick-32` (default) / `tick-64` pick the tick width
//! - Feature `generic-task-selection` turns off the single-word bit scan
//! - `config::MAX_PRIORITIES` and `config::NUMBER_OF_CORES` set the limits
//!
//! Unsupported combinations fail the build.
//!
//! ## Failure Model
//!
//! Nothing here returns a runtime error. Invariant violations (unmatched
//! critical exit, releasing a lock not held, selecting from an empty ready
//! set) log and halt via [`error::halt`].

#![no_std]

pub mod arch;
pub mod config;
pub mod error;
pub mod lock;
pub mod port;
pub mod ready;
pub mod sync;
pub mod types;

pub use arch::{InterruptMask, Port};
pub use config::{PortConfig, TickWidth, CONFIG};
pub use error::{ConfigError, InvariantViolation};
pub use lock::{LockId, LockPair};
pub use port::{CoreContext, CoreNesting, NestingStore, PortLayer};
pub use ready::ReadyPriorities;
pub use sync::CriticalCell;
pub use types::{CoreId, PriorityIndex, TickCounter, TickType, MAX_DELAY};
