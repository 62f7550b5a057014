//! Timing primitives: the wrapping tick type, time units, and the timer
//! scheduler built on them.

mod queue;
mod scheduler;
mod slab;
mod snapshot;
mod tick;
mod time;

pub use scheduler::{Callback, TimerHandle, TimerScheduler, TimerState};
pub use snapshot::{PendingSnapshot, PendingTimer};
pub use tick::Tick;
pub use time::{Duration, Micros, Millis, Nanos, Seconds, TimeUnit, nanos_to_ticks, ticks_for};
