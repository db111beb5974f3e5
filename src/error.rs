//! # Port Layer Errors
//!
//! Two kinds of failure exist at this layer and neither is recoverable:
//!
//! - [`ConfigError`]: an invalid build-time option combination. Reported by
//!   [`PortConfig::validate`](crate::config::PortConfig::validate) and turned
//!   into a build failure for the crate's own configuration.
//! - [`InvariantViolation`]: scheduler bookkeeping has been corrupted
//!   (nesting underflow, releasing a lock that is not held, selecting from an
//!   empty ready set, ...). These go through [`halt`], which logs and stops.
//!
//! No port operation returns a failure value to the scheduler.

use core::fmt;

use crate::config::TickWidth;
use crate::lock::LockId;
use crate::types::{CoreId, PriorityIndex, UBaseType};

/// Invalid port configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_priorities` is zero; the idle task needs at least one level.
    NoPriorities,
    /// Optimised selection is limited to one machine word of priorities.
    TooManyPrioritiesForBitmap { max_priorities: UBaseType },
    /// More priorities than the ready set compiled into this build holds.
    ExceedsReadyCapacity { max_priorities: UBaseType },
    /// At least one core is required.
    NoCores,
    /// More cores than `MAX_CORES`.
    TooManyCores { cores: usize },
    /// Tick counter width other than 16, 32 or 64 bits.
    UnsupportedTickWidth { bits: u32 },
    /// Tick width differs from the one selected by the `tick-*` features.
    TickWidthMismatch { configured: TickWidth },
    /// Selection mode differs from the `generic-task-selection` feature.
    TaskSelectionMismatch { optimised: bool },
}

impl ConfigError {
    /// Static description, usable from `const` panics.
    pub const fn message(&self) -> &'static str {
        match self {
            ConfigError::NoPriorities => "configuration must define at least one priority level",
            ConfigError::TooManyPrioritiesForBitmap { .. } => {
                "optimised task selection supports at most 32 priorities; \
                 reduce MAX_PRIORITIES or enable `generic-task-selection`"
            }
            ConfigError::ExceedsReadyCapacity { .. } => {
                "max_priorities exceeds the ready set capacity (MAX_PRIORITIES) of this build"
            }
            ConfigError::NoCores => "configuration must define at least one core",
            ConfigError::TooManyCores { .. } => "core count exceeds MAX_CORES",
            ConfigError::UnsupportedTickWidth { .. } => {
                "unsupported tick type width; use 16, 32 or 64 bits"
            }
            ConfigError::TickWidthMismatch { .. } => {
                "tick width differs from the one this build was compiled with"
            }
            ConfigError::TaskSelectionMismatch { .. } => {
                "task selection mode differs from the one this build was compiled with"
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TooManyPrioritiesForBitmap { max_priorities }
            | ConfigError::ExceedsReadyCapacity { max_priorities } => {
                write!(f, "{} (got {})", self.message(), max_priorities)
            }
            ConfigError::TooManyCores { cores } => write!(f, "{} (got {})", self.message(), cores),
            ConfigError::UnsupportedTickWidth { bits } => {
                write!(f, "{} (got {})", self.message(), bits)
            }
            ConfigError::TickWidthMismatch { configured } => {
                write!(f, "{} (got {})", self.message(), configured)
            }
            ConfigError::TaskSelectionMismatch { optimised } => {
                let mode = if *optimised { "optimised" } else { "generic" };
                write!(f, "{} (got {})", self.message(), mode)
            }
            _ => f.write_str(self.message()),
        }
    }
}

/// Corrupted scheduler or port bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// `exit_critical` without a matching `enter_critical`.
    NestingUnderflow { core: CoreId },
    /// Critical nesting counter wrapped.
    NestingOverflow { core: CoreId },
    /// Release of a lock the core does not hold, including one release
    /// more than the number of acquires.
    LockNotHeld { lock: LockId, core: CoreId },
    /// Recursive acquire count of a lock wrapped.
    LockOverflow { lock: LockId, core: CoreId },
    /// Highest-priority lookup on a ready set with no bits set.
    EmptyReadySet,
    /// Priority beyond the ready set capacity.
    PriorityOutOfRange { priority: PriorityIndex },
    /// Core id outside the configured core count.
    CoreOutOfRange { core: CoreId, cores: usize },
    /// A critical cell borrowed again before the first borrow ended.
    ReentrantBorrow,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::NestingUnderflow { core } => {
                write!(f, "critical nesting underflow on core {}", core)
            }
            InvariantViolation::NestingOverflow { core } => {
                write!(f, "critical nesting overflow on core {}", core)
            }
            InvariantViolation::LockNotHeld { lock, core } => {
                write!(f, "{} released by core {} which does not hold it", lock, core)
            }
            InvariantViolation::LockOverflow { lock, core } => {
                write!(f, "{} nesting overflow on core {}", lock, core)
            }
            InvariantViolation::EmptyReadySet => f.write_str("highest priority of an empty ready set"),
            InvariantViolation::PriorityOutOfRange { priority } => {
                write!(f, "priority {} out of range", priority)
            }
            InvariantViolation::CoreOutOfRange { core, cores } => {
                write!(f, "core {} out of range ({} configured)", core, cores)
            }
            InvariantViolation::ReentrantBorrow => f.write_str("critical cell borrowed re-entrantly"),
        }
    }
}

/// Stop on an invariant violation.
///
/// Logs the violation, then panics. Firmware links `panic-halt`, so the
/// core parks; host builds unwind, which lets tests observe the violation.
#[cold]
#[inline(never)]
#[track_caller]
pub fn halt(violation: InvariantViolation) -> ! {
    log::error!("port invariant violated: {}", violation);
    panic!("port invariant violated: {}", violation)
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
