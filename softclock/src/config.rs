//! Clock configuration.
//!
//! The scheduler itself only counts ticks. The configured tick rate is what
//! turns real-time intervals into tick delays and what paces the bundled
//! [`Clock`](crate::clock::Clock) driver.

use std::time::Duration;

/// Highest supported tick rate: one tick per nanosecond.
pub const MAX_HZ: u32 = 1_000_000_000;

/// Tick rate used when none is given (10ms ticks).
pub const DEFAULT_HZ: u32 = 100;

/// Error building a [`ClockConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `hz` was zero.
    #[error("tick rate must be at least 1 Hz")]
    ZeroHz,
    /// `hz` exceeds one tick per nanosecond.
    #[error("tick rate {hz} Hz exceeds the maximum of {max} Hz")]
    HzTooHigh { hz: u32, max: u32 },
}

/// Tick rate and starting point of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Ticks per second.
    hz: u32,

    /// Value of the tick counter when the scheduler is created.
    ///
    /// Starting close to `i32::MAX` makes the counter wrap early, which is a
    /// cheap way to shake out code that compares ticks directly.
    ///
    /// **Default**: 0
    pub initial_tick: i32,

    /// Number of timer slots reserved up front.
    ///
    /// The slot arena grows past this on demand.
    ///
    /// **Default**: 64
    pub initial_capacity: usize,
}

impl ClockConfig {
    /// Creates a configuration ticking at `hz`.
    ///
    /// # Errors
    ///
    /// Returns an error if `hz` is zero or above [`MAX_HZ`].
    pub fn new(hz: u32) -> Result<Self, ConfigError> {
        if hz == 0 {
            return Err(ConfigError::ZeroHz);
        }
        if hz > MAX_HZ {
            return Err(ConfigError::HzTooHigh { hz, max: MAX_HZ });
        }
        Ok(Self {
            hz,
            ..Self::default()
        })
    }

    /// Ticks per second.
    #[must_use]
    pub const fn hz(&self) -> u32 {
        self.hz
    }

    /// Length of one tick in whole nanoseconds.
    #[must_use]
    pub const fn tick_nanos(&self) -> u64 {
        MAX_HZ as u64 / self.hz as u64
    }

    /// Length of one tick.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        Duration::from_nanos(self.tick_nanos())
    }

    /// Builder-style setter for the starting tick.
    #[must_use]
    pub const fn with_initial_tick(mut self, tick: i32) -> Self {
        self.initial_tick = tick;
        self
    }

    /// Builder-style setter for the reserved slot count.
    #[must_use]
    pub const fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            hz: DEFAULT_HZ,
            initial_tick: 0,
            initial_capacity: 64,
        }
    }
}
