//! Tick-driven one-shot timers.
//!
//! A [`TimerScheduler`] keeps every pending timer in one set ordered by
//! deadline. A tick source advances its wrapping counter with
//! [`TimerScheduler::tick_advance`]; a deferred context fires whatever is due
//! with [`TimerScheduler::drain`], running callbacks without holding the
//! scheduler lock so they can schedule and cancel timers themselves.
//!
//! [`Clock`] bundles both contexts as a pair of threads for programs that do
//! not bring their own.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use softclock::{TimerScheduler, TimerState};
//!
//! let scheduler = TimerScheduler::default();
//! let fired = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&fired);
//! let timer = scheduler.bind(move |_, _| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! scheduler.schedule(timer, 2);
//! for _ in 0..2 {
//!     if scheduler.tick_advance() {
//!         scheduler.drain();
//!     }
//! }
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! assert_eq!(scheduler.state(timer), TimerState::Triggered);
//! ```

pub mod clock;
pub mod config;
pub mod timing;
pub mod trace;

pub use clock::{Clock, ClockError, ClockStats};
pub use config::{ClockConfig, ConfigError};
pub use timing::{PendingSnapshot, PendingTimer, Tick, TimerHandle, TimerScheduler, TimerState};
pub use trace::init_tracing;
