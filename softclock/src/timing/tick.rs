//! Tick-space coordinate type for the scheduler.
//!
//! The scheduler counts time on a discrete tick lattice held in a wrapping
//! `i32`. A tick value on its own has no order: `i32::MAX` is immediately
//! followed by `i32::MIN`. Two ticks can only be compared by looking at the
//! sign of their wrapping difference, which is meaningful as long as the two
//! values lie within half the range (`i32::MAX` ticks) of each other. A
//! deadline is a non-negative delay added to the current tick, so it is
//! within that distance when scheduled; a deadline left overdue can drift
//! further back, which is why the scheduler orders its set by a separate
//! non-wrapping count.

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};

/// A point on the wrapping tick lattice.
///
/// Deliberately not `PartialOrd`: use [`Tick::since`], [`Tick::is_due`] or
/// [`Tick::cmp_relative`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Tick(i32);

impl Tick {
    /// Tick zero.
    pub const ZERO: Self = Self(0);

    /// Creates a tick from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// The tick that follows this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Adds a relative number of ticks, wrapping on overflow.
    #[inline]
    #[must_use]
    pub const fn wrapping_add(self, ticks: i32) -> Self {
        Self(self.0.wrapping_add(ticks))
    }

    /// Signed distance from `reference` to `self` (`self - reference`, wrapping).
    ///
    /// Positive means `self` lies in the future of `reference`; zero or negative
    /// means it has been reached.
    #[inline]
    #[must_use]
    pub const fn since(self, reference: Self) -> i32 {
        self.0.wrapping_sub(reference.0)
    }

    /// Whether a deadline at `self` has been reached at tick `now`.
    #[inline]
    #[must_use]
    pub const fn is_due(self, now: Self) -> bool {
        self.since(now) <= 0
    }

    /// Orders two deadlines relative to each other.
    ///
    /// Only a total order while all compared values sit within half the range
    /// of one another.
    #[inline]
    #[must_use]
    pub fn cmp_relative(self, other: Self) -> Ordering {
        self.since(other).cmp(&0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<i32> for Tick {
    #[inline]
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<Tick> for i32 {
    #[inline]
    fn from(tick: Tick) -> Self {
        tick.0
    }
}
