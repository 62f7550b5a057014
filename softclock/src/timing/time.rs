//! Minimal time units and strongly-typed durations, plus their conversion to
//! scheduler ticks.
use core::marker::PhantomData;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Marker trait for a time unit.
pub trait TimeUnit {
    /// Human-readable name for debugging.
    const NAME: &'static str;
    /// Length of one unit in nanoseconds.
    const NANOS: u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Nanos {}
impl TimeUnit for Nanos {
    const NAME: &'static str = "ns";
    const NANOS: u64 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Micros {}
impl TimeUnit for Micros {
    const NAME: &'static str = "us";
    const NANOS: u64 = 1_000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Millis {}
impl TimeUnit for Millis {
    const NAME: &'static str = "ms";
    const NANOS: u64 = 1_000_000;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Seconds {}
impl TimeUnit for Seconds {
    const NAME: &'static str = "s";
    const NANOS: u64 = 1_000_000_000;
}

/// Strongly-typed duration in a given unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Duration<U: TimeUnit>(pub u64, PhantomData<U>);

impl<U: TimeUnit> Duration<U> {
    /// Create a new duration.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value, PhantomData)
    }

    /// Return the raw value.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Total length in nanoseconds.
    #[inline]
    pub const fn as_nanos(&self) -> u128 {
        self.0 as u128 * U::NANOS as u128
    }
}

impl Duration<Seconds> {
    /// Convenience constructor for seconds.
    #[inline]
    pub const fn from_secs(value: u64) -> Self {
        Self::new(value)
    }
}

impl Duration<Millis> {
    /// Convenience constructor for milliseconds.
    #[inline]
    pub const fn from_millis(value: u64) -> Self {
        Self::new(value)
    }
}

impl Duration<Micros> {
    /// Convenience constructor for microseconds.
    #[inline]
    pub const fn from_micros(value: u64) -> Self {
        Self::new(value)
    }
}

impl Duration<Nanos> {
    /// Convenience constructor for nanoseconds.
    #[inline]
    pub const fn from_nanos(value: u64) -> Self {
        Self::new(value)
    }
}

impl<U: TimeUnit> From<Duration<U>> for std::time::Duration {
    fn from(d: Duration<U>) -> Self {
        let nanos = d.as_nanos();
        let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
        // Remainder of a division by 1e9 always fits.
        #[allow(clippy::cast_possible_truncation)]
        let subsec = (nanos % NANOS_PER_SEC) as u32;
        std::time::Duration::new(secs, subsec)
    }
}

/// Converts a length in nanoseconds to whole ticks at `hz`.
///
/// Rounds down and saturates at `i32::MAX`, the longest delay a deadline can
/// carry.
#[inline]
#[must_use]
pub fn nanos_to_ticks(nanos: u128, hz: u32) -> i32 {
    let ticks = nanos.saturating_mul(u128::from(hz)) / NANOS_PER_SEC;
    i32::try_from(ticks).unwrap_or(i32::MAX)
}

/// Converts a typed duration to whole ticks at `hz`.
#[inline]
#[must_use]
pub fn ticks_for<U: TimeUnit>(delay: Duration<U>, hz: u32) -> i32 {
    nanos_to_ticks(delay.as_nanos(), hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_are_exact_multiples_of_hz() {
        assert_eq!(ticks_for(Duration::from_secs(3), 100), 300);
        assert_eq!(ticks_for(Duration::from_secs(1), 1024), 1024);
    }

    #[test]
    fn sub_tick_intervals_round_down() {
        // 100 Hz: one tick is 10ms.
        assert_eq!(ticks_for(Duration::from_millis(9), 100), 0);
        assert_eq!(ticks_for(Duration::from_millis(10), 100), 1);
        assert_eq!(ticks_for(Duration::from_millis(25), 100), 2);
        assert_eq!(ticks_for(Duration::from_micros(9_999), 100), 0);
        assert_eq!(ticks_for(Duration::from_nanos(20_000_000), 100), 2);
    }

    #[test]
    fn long_intervals_saturate() {
        assert_eq!(ticks_for(Duration::from_secs(u64::MAX), 100), i32::MAX);
        let just_over = (i64::from(i32::MAX) / 100 + 1).unsigned_abs();
        assert_eq!(ticks_for(Duration::from_secs(just_over), 100), i32::MAX);
    }

    #[test]
    fn converts_to_std_duration() {
        let d: std::time::Duration = Duration::from_millis(1_500).into();
        assert_eq!(d, std::time::Duration::from_millis(1_500));
        assert_eq!(Millis::NAME, "ms");
    }
}
