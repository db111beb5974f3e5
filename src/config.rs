//! # Port Configuration
//!
//! Build-time options for the port layer, resolved once into a typed
//! [`PortConfig`]. The build's own configuration, [`CONFIG`], is checked in
//! a `const` item at the bottom of this file: an unsupported combination
//! (optimised selection with more than 32 priorities, zero cores, ...) stops
//! the build with a descriptive message instead of producing undefined
//! runtime behavior.
//!
//! The tick counter width comes from the `tick-16` / `tick-32` / `tick-64`
//! features, optimised ready-task selection is switched off by the
//! `generic-task-selection` feature, and the remaining limits are plain
//! constants below.

use core::fmt;

use crate::error::ConfigError;
use crate::types::UBaseType;

/// Number of task priority levels. Priority 0 is the idle level; higher
/// values take precedence.
pub const MAX_PRIORITIES: UBaseType = 32;

/// Number of execution cores sharing scheduler state.
/// Set above 1 to get the Task Lock / ISR Lock critical sections.
pub const NUMBER_OF_CORES: usize = 1;

/// Upper bound on cores for any configuration. Sizes the per-core nesting
/// and yield-pending records, so it must cover `NUMBER_OF_CORES`.
pub const MAX_CORES: usize = 8;

/// Scheduler tick frequency in Hz.
pub const TICK_RATE_HZ: u32 = 1000;

/// Widest priority count the optimised selector supports: one bit per
/// priority in a single 32-bit word.
pub const OPTIMISED_PRIORITY_LIMIT: UBaseType = 32;

/// Whether the ready set is searched with a single count-leading-zeros.
pub const USE_OPTIMISED_TASK_SELECTION: bool = !cfg!(feature = "generic-task-selection");

/// Tick counter width selected through cargo features. The widest enabled
/// feature wins; enabling none is rejected in `types.rs`.
pub const TICK_WIDTH: TickWidth = if cfg!(feature = "tick-64") {
    TickWidth::Bits64
} else if cfg!(feature = "tick-32") {
    TickWidth::Bits32
} else {
    TickWidth::Bits16
};

// ---------------------------------------------------------------------------
// Tick width
// ---------------------------------------------------------------------------

/// Supported widths of the scheduler tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickWidth {
    Bits16,
    Bits32,
    Bits64,
}

impl TickWidth {
    /// Map a bit count onto a supported width.
    pub const fn from_bits(bits: u32) -> Result<Self, ConfigError> {
        match bits {
            16 => Ok(TickWidth::Bits16),
            32 => Ok(TickWidth::Bits32),
            64 => Ok(TickWidth::Bits64),
            _ => Err(ConfigError::UnsupportedTickWidth { bits }),
        }
    }

    pub const fn bits(self) -> u32 {
        match self {
            TickWidth::Bits16 => 16,
            TickWidth::Bits32 => 32,
            TickWidth::Bits64 => 64,
        }
    }

    /// Largest counter value, which doubles as the "wait forever" sentinel.
    pub const fn max_value(self) -> u64 {
        match self {
            TickWidth::Bits16 => u16::MAX as u64,
            TickWidth::Bits32 => u32::MAX as u64,
            TickWidth::Bits64 => u64::MAX,
        }
    }
}

impl fmt::Display for TickWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

// ---------------------------------------------------------------------------
// Typed configuration
// ---------------------------------------------------------------------------

/// Port layer configuration, resolved once at startup.
///
/// Every field mirrors one of the build-time options above. Tests and
/// host simulations build their own values (e.g. a four-core layout) with
/// the `with_*` helpers; [`PortConfig::validate`] applies the same rules
/// the build applies to [`CONFIG`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Number of priority levels in use.
    pub max_priorities: UBaseType,
    /// Number of cores running scheduler code.
    pub cores: usize,
    /// Width of the tick counter.
    pub tick_width: TickWidth,
    /// Single-word bit-scan selection of the highest ready priority.
    pub optimised_task_selection: bool,
}

impl PortConfig {
    pub const fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }

    pub const fn with_max_priorities(mut self, max_priorities: UBaseType) -> Self {
        self.max_priorities = max_priorities;
        self
    }

    pub const fn with_optimised_task_selection(mut self, enabled: bool) -> Self {
        self.optimised_task_selection = enabled;
        self
    }

    /// Check the option combination.
    ///
    /// # Errors
    /// - [`ConfigError::NoPriorities`] if `max_priorities` is 0
    /// - [`ConfigError::TooManyPrioritiesForBitmap`] if optimised selection
    ///   is enabled with more than 32 priorities
    /// - [`ConfigError::ExceedsReadyCapacity`] if the ready set compiled
    ///   into this build cannot hold `max_priorities` levels
    /// - [`ConfigError::NoCores`] / [`ConfigError::TooManyCores`] if `cores`
    ///   is outside `1..=MAX_CORES`
    /// - [`ConfigError::TickWidthMismatch`] if `tick_width` is not the width
    ///   the `tick-*` features compiled in ([`TICK_WIDTH`])
    /// - [`ConfigError::TaskSelectionMismatch`] if `optimised_task_selection`
    ///   disagrees with [`USE_OPTIMISED_TASK_SELECTION`]
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.max_priorities == 0 {
            return Err(ConfigError::NoPriorities);
        }
        if self.optimised_task_selection && self.max_priorities > OPTIMISED_PRIORITY_LIMIT {
            return Err(ConfigError::TooManyPrioritiesForBitmap {
                max_priorities: self.max_priorities,
            });
        }
        if self.max_priorities > MAX_PRIORITIES {
            return Err(ConfigError::ExceedsReadyCapacity {
                max_priorities: self.max_priorities,
            });
        }
        if self.cores == 0 {
            return Err(ConfigError::NoCores);
        }
        if self.cores > MAX_CORES {
            return Err(ConfigError::TooManyCores { cores: self.cores });
        }
        if self.tick_width.bits() != TICK_WIDTH.bits() {
            return Err(ConfigError::TickWidthMismatch {
                configured: self.tick_width,
            });
        }
        if self.optimised_task_selection != USE_OPTIMISED_TASK_SELECTION {
            return Err(ConfigError::TaskSelectionMismatch {
                optimised: self.optimised_task_selection,
            });
        }
        Ok(())
    }

    /// Panic with the error message if the configuration is invalid.
    /// Evaluated in a `const` context this becomes a build failure.
    pub const fn assert_valid(&self) {
        if let Err(err) = self.validate() {
            panic!("{}", err.message());
        }
    }

    #[inline]
    pub const fn is_multi_core(&self) -> bool {
        self.cores > 1
    }
}

/// The configuration this crate was built with.
pub const CONFIG: PortConfig = PortConfig {
    max_priorities: MAX_PRIORITIES,
    cores: NUMBER_OF_CORES,
    tick_width: TICK_WIDTH,
    optimised_task_selection: USE_OPTIMISED_TASK_SELECTION,
};

const _: () = CONFIG.assert_valid();

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
